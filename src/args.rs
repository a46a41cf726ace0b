use reqwest::Url;
use std::{path::PathBuf, time::Duration};

use sourcify_sync::api::ClientOptions;
use sourcify_sync::processor::ProcessorOptions;

#[derive(clap::Parser)]
#[command(name = "sourcify-sync")]
#[command(version)]
#[command(about = "Reconcile a local Solidity corpus against a Sourcify-compatible registry")]
#[command(long_about = "
A command-line tool for reconciling a local corpus of Solidity contract
sources against a Sourcify-compatible verification registry.

The find phase scans the corpus, checks each contract against the registry
and records the ones the registry doesn't know about. The submit phase
recompiles those contracts and submits them for verification. All state is
persisted per chain under the data directory, so interrupted runs resume
from their last checkpoint.

Examples:
  # Discover missing contracts on mainnet
  sourcify-sync find --network mainnet --corpus ./contracts

  # Review, then submit the missing set
  SOURCIFY_SYNC_SUBMIT=1 sourcify-sync submit --network mainnet

  # Both phases against a custom registry
  sourcify-sync run --url https://sourcify.example.com/server \\
    --chain-id 137 --corpus ./contracts --enable-submission

  # Inspect persisted progress
  sourcify-sync status --network mainnet
")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Scan the corpus and record contracts missing from the registry
    ///
    /// Walks the corpus folder by folder, skipping contracts the local cache
    /// already knows to be verified, and checks the rest against the
    /// registry. The resulting missing set is written to the data directory
    /// for later review and submission.
    Find(FindArgs),

    /// Compile and submit the recorded missing contracts
    ///
    /// Loads the missing set produced by an earlier find run, recompiles
    /// each contract and submits it for verification in bounded concurrent
    /// batches. Refuses to run unless submission is explicitly enabled.
    Submit(SubmitArgs),

    /// Run the find phase and then the submit phase
    Run(RunArgs),

    /// Print persisted progress and submission statistics
    Status(StatusArgs),

    /// Drop the local verification cache
    ///
    /// Forces the next find run to re-check every contract against the
    /// registry. The missing set and submission log are left untouched.
    ClearCache(ClearCacheArgs),
}

#[derive(clap::Args)]
pub struct FindArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Corpus root; each subfolder holds <address>[_<ContractName>].sol files
    #[arg(
        long,
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = "."
    )]
    pub corpus: PathBuf,
}

#[derive(clap::Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub processing: ProcessingArgs,
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Corpus root; each subfolder holds <address>[_<ContractName>].sol files
    #[arg(
        long,
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = "."
    )]
    pub corpus: PathBuf,

    #[command(flatten)]
    pub processing: ProcessingArgs,
}

#[derive(clap::Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(clap::Args)]
pub struct ClearCacheArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(clap::Args)]
pub struct CommonArgs {
    /// Network preset (mainnet, sepolia). If not specified, --url and
    /// --chain-id are required
    #[arg(long, value_enum)]
    pub network: Option<NetworkKind>,

    #[command(flatten)]
    pub registry: Registry,

    /// Directory holding per-chain pipeline state
    #[arg(
        long,
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = "data"
    )]
    pub data_dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub timeout: u64,

    /// Minimum spacing between registry requests in milliseconds; 0 disables
    /// throttling
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub min_request_interval: u64,

    /// Retry budget for transient failures; 429 responses have their own cap
    #[arg(long, value_name = "COUNT", default_value_t = 3)]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub min_retry_delay: u64,

    /// Attempt full-match submission
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub try_full_match: bool,

    /// Fall back to partial-match submission when the full match is rejected
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub try_partial_match: bool,
}

impl CommonArgs {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout),
            min_request_interval: Duration::from_millis(self.min_request_interval),
            max_retries: self.max_retries,
            min_retry_delay: Duration::from_millis(self.min_retry_delay),
            try_full_match: self.try_full_match,
            try_partial_match: self.try_partial_match,
        }
    }
}

#[derive(clap::Args)]
pub struct ProcessingArgs {
    /// Contracts processed concurrently per batch
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub batch_delay: u64,

    /// Path to the solc binary
    #[arg(long, value_name = "PATH", value_hint = clap::ValueHint::FilePath, default_value = "solc")]
    pub solc: PathBuf,

    /// Actually submit contracts. Without this (or SOURCIFY_SYNC_SUBMIT=1)
    /// the submit phase refuses to run, so a find run can be reviewed first
    #[arg(
        long,
        env = "SOURCIFY_SYNC_SUBMIT",
        value_parser = clap::builder::FalseyValueParser::new(),
        action = clap::ArgAction::SetTrue
    )]
    pub enable_submission: bool,
}

impl ProcessingArgs {
    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay),
        }
    }
}

#[derive(clap::ValueEnum, Clone)]
pub enum NetworkKind {
    /// Ethereum mainnet
    Mainnet,

    /// Sepolia testnet
    Sepolia,
}

#[derive(Clone)]
pub struct Registry {
    /// Registry server URL
    pub url: Url,
    /// EIP-155 chain id the corpus belongs to
    pub chain_id: u64,
}

impl clap::FromArgMatches for Registry {
    fn from_arg_matches(matches: &clap::ArgMatches) -> Result<Self, clap::Error> {
        let url = matches
            .get_one::<Url>("url")
            .ok_or_else(|| {
                clap::Error::raw(
                    clap::error::ErrorKind::MissingRequiredArgument,
                    "registry URL is required when not using predefined networks",
                )
            })?
            .clone();
        let chain_id = *matches.get_one::<u64>("chain_id").ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::MissingRequiredArgument,
                "chain id is required when not using predefined networks",
            )
        })?;

        Ok(Self { url, chain_id })
    }

    fn from_arg_matches_mut(matches: &mut clap::ArgMatches) -> Result<Self, clap::Error> {
        Self::from_arg_matches(matches)
    }

    fn update_from_arg_matches(&mut self, matches: &clap::ArgMatches) -> Result<(), clap::Error> {
        let mut matches = matches.clone();
        self.update_from_arg_matches_mut(&mut matches)
    }

    fn update_from_arg_matches_mut(
        &mut self,
        matches: &mut clap::ArgMatches,
    ) -> Result<(), clap::Error> {
        let updated = Self::from_arg_matches(matches)?;
        self.url = updated.url;
        self.chain_id = updated.chain_id;
        Ok(())
    }
}

fn registry_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        clap::Arg::new("url")
            .long("url")
            .help("Registry server URL (required when --network is not specified)")
            .value_hint(clap::ValueHint::Url)
            .value_parser(Url::parse)
            .default_value_ifs([
                ("network", "mainnet", "https://sourcify.dev/server"),
                ("network", "sepolia", "https://sourcify.dev/server"),
            ])
            .required_unless_present("network"),
    )
    .arg(
        clap::Arg::new("chain_id")
            .long("chain-id")
            .help("EIP-155 chain id (required when --network is not specified)")
            .value_parser(clap::value_parser!(u64))
            .default_value_ifs([
                ("network", "mainnet", "1"),
                ("network", "sepolia", "11155111"),
            ])
            .required_unless_present("network"),
    )
}

// Can't derive the default value logic, hence hand rolled instance
impl clap::Args for Registry {
    fn augment_args(cmd: clap::Command) -> clap::Command {
        registry_args(cmd)
    }

    fn augment_args_for_update(cmd: clap::Command) -> clap::Command {
        registry_args(cmd)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_network_preset_supplies_url_and_chain() {
        let args = Args::parse_from(["sourcify-sync", "find", "--network", "mainnet"]);
        let Commands::Find(find) = args.command else {
            panic!("expected find command");
        };
        assert_eq!(
            find.common.registry.url.as_str(),
            "https://sourcify.dev/server"
        );
        assert_eq!(find.common.registry.chain_id, 1);
    }

    #[test]
    fn test_sepolia_preset_chain_id() {
        let args = Args::parse_from(["sourcify-sync", "status", "--network", "sepolia"]);
        let Commands::Status(status) = args.command else {
            panic!("expected status command");
        };
        assert_eq!(status.common.registry.chain_id, 11_155_111);
    }

    #[test]
    fn test_custom_registry_requires_chain_id() {
        let result = Args::try_parse_from([
            "sourcify-sync",
            "find",
            "--url",
            "https://sourcify.example.com/server",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_registry_with_chain_id() {
        let args = Args::parse_from([
            "sourcify-sync",
            "run",
            "--url",
            "https://sourcify.example.com/server",
            "--chain-id",
            "137",
            "--corpus",
            "contracts",
            "--batch-size",
            "5",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.common.registry.chain_id, 137);
        assert_eq!(run.processing.batch_size, 5);
        assert!(!run.processing.enable_submission);
    }

    #[test]
    fn test_match_flags_parse_explicit_values() {
        let args = Args::parse_from([
            "sourcify-sync",
            "find",
            "--network",
            "mainnet",
            "--try-partial-match",
            "false",
        ]);
        let Commands::Find(find) = args.command else {
            panic!("expected find command");
        };
        let options = find.common.client_options();
        assert!(options.try_full_match);
        assert!(!options.try_partial_match);
    }
}
