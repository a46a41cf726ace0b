mod args;
use crate::args::{Args, Commands, CommonArgs, ProcessingArgs};

use clap::Parser;
use log::info;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;

use sourcify_sync::{
    api::{ApiClient, ApiClientError},
    cache::{CacheError, VerificationCache},
    chain,
    compiler::SolcCompiler,
    finder::{Finder, FinderError, ScanOutcome},
    processor::{ProcessOutcome, Processor, ProcessorError},
    state::{ContractRecord, StateError, StateStore},
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiClientError),

    #[error(transparent)]
    Finder(#[from] FinderError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Submission is disabled. Review the missing set, then pass --enable-submission or set SOURCIFY_SYNC_SUBMIT=1")]
    SubmissionDisabled,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args { command } = Args::parse();
    match command {
        Commands::Find(args) => {
            let (client, store, mut cache) = open(&args.common)?;
            let outcome = find(&client, &store, &mut cache, &args.corpus).await?;
            report_scan(&outcome, &store);
        }
        Commands::Submit(args) => {
            if !args.processing.enable_submission {
                return Err(CliError::SubmissionDisabled.into());
            }
            let (client, store, mut cache) = open(&args.common)?;
            let records = store.load_missing()?;
            submit(&client, &store, &mut cache, &records, &args.processing).await?;
        }
        Commands::Run(args) => {
            let (client, store, mut cache) = open(&args.common)?;
            let outcome = find(&client, &store, &mut cache, &args.corpus).await?;
            report_scan(&outcome, &store);
            if outcome.missing.is_empty() {
                info!("registry already has every contract in the corpus");
            } else {
                submit(&client, &store, &mut cache, &outcome.missing, &args.processing).await?;
            }
        }
        Commands::Status(args) => {
            status(&args.common)?;
        }
        Commands::ClearCache(args) => {
            clear_cache(&args.common)?;
        }
    }
    Ok(())
}

fn open(common: &CommonArgs) -> Result<(ApiClient, StateStore, VerificationCache), CliError> {
    let chain_id = common.registry.chain_id;
    info!(
        "registry {} / chain {} ({})",
        common.registry.url,
        chain_id,
        chain::chain_name(chain_id)
    );

    let client = ApiClient::new(common.registry.url.clone(), chain_id, common.client_options())?;
    let store = StateStore::new(&common.data_dir, chain_id);
    store.ensure_dir()?;
    let cache = VerificationCache::load(store.verification_cache_path())?;
    Ok((client, store, cache))
}

async fn find(
    client: &ApiClient,
    store: &StateStore,
    cache: &mut VerificationCache,
    corpus: &Path,
) -> Result<ScanOutcome, CliError> {
    let mut finder = Finder::new(client, cache, store);
    Ok(finder.scan(corpus).await?)
}

fn report_scan(outcome: &ScanOutcome, store: &StateStore) {
    let progress = &outcome.progress;
    println!(
        "Scanned {} contracts: {} already verified, {} missing, {} errors",
        progress.processed, progress.matching, progress.missing, progress.errors
    );
    if !outcome.missing.is_empty() {
        println!(
            "Missing set written to {}",
            store.missing_contracts_path().display()
        );
    }
}

async fn submit(
    client: &ApiClient,
    store: &StateStore,
    cache: &mut VerificationCache,
    records: &[ContractRecord],
    processing: &ProcessingArgs,
) -> Result<(), CliError> {
    if !processing.enable_submission {
        return Err(CliError::SubmissionDisabled);
    }
    if records.is_empty() {
        println!("Missing set is empty, nothing to submit");
        return Ok(());
    }

    let compiler = SolcCompiler::new(processing.solc.clone());
    let shutdown = shutdown_flag();
    let mut processor = Processor::new(
        client,
        &compiler,
        cache,
        store,
        processing.processor_options(),
        shutdown,
    );
    let ProcessOutcome {
        progress,
        interrupted,
    } = processor.process_missing(records).await?;

    println!(
        "Processed {} contracts: {} submitted, {} failed, {} already verified, {} errors",
        progress.processed, progress.successful, progress.failed, progress.matching, progress.errors
    );
    if interrupted {
        println!("Run was interrupted; re-run submit to continue from the checkpoint");
    }
    Ok(())
}

/// Flipped by Ctrl-C; checked at batch boundaries so the current batch
/// always finishes and persists.
fn shutdown_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing the current batch");
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}

fn status(common: &CommonArgs) -> Result<(), CliError> {
    let store = StateStore::new(&common.data_dir, common.registry.chain_id);

    match store.load_finder_progress()? {
        Some(progress) => println!(
            "Find:   {}/{} processed, {} matching, {} missing, {} errors, {} rate limited (started {})",
            progress.processed,
            progress.total,
            progress.matching,
            progress.missing,
            progress.errors,
            progress.rate_limited,
            progress.start_time
        ),
        None => println!("Find:   no run recorded"),
    }

    match store.load_processor_progress()? {
        Some(progress) => println!(
            "Submit: {}/{} processed, {} submitted, {} failed, {} matching, {} errors (started {})",
            progress.processed,
            progress.total,
            progress.successful,
            progress.failed,
            progress.matching,
            progress.errors,
            progress.start_time
        ),
        None => println!("Submit: no run recorded"),
    }

    match store.load_submission_stats()? {
        Some(stats) => println!(
            "Log:    {} submissions recorded, {} successful, {} failed",
            stats.total, stats.successful, stats.failed
        ),
        None => println!("Log:    no submissions recorded"),
    }
    Ok(())
}

fn clear_cache(common: &CommonArgs) -> Result<(), CliError> {
    let store = StateStore::new(&common.data_dir, common.registry.chain_id);
    let mut cache = VerificationCache::load(store.verification_cache_path())?;
    let dropped = cache.len();
    cache.clear()?;
    println!("Dropped {dropped} cached verification entries");
    Ok(())
}
