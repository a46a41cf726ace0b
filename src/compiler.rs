//! Compiler Adapter: drives `solc --standard-json` as an external process.
//! The toolchain itself is opaque to the pipeline; this module only shapes
//! the input document and folds the diagnostics into a structured result.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, process::Stdio};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::metadata::OptimizerInfo;

#[derive(Clone, Debug)]
pub struct CompileInput {
    pub file_name: String,
    pub contract_name: String,
    /// SPDX-normalized source text; exactly what gets submitted later.
    pub source: String,
    pub compiler_version: String,
    pub evm_version: String,
    pub optimizer: OptimizerInfo,
}

#[derive(Clone, Debug)]
pub struct CompiledContract {
    pub abi: serde_json::Value,
    pub bytecode: String,
    /// solc's own metadata output, when the binary provides one.
    pub metadata: Option<String>,
    pub compiler_version: String,
}

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("failed to run solc at {solc}: {source}")]
    Spawn {
        solc: PathBuf,
        source: std::io::Error,
    },

    #[error("solc exited with {status}: {stderr}")]
    Aborted {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to parse solc output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("compilation of {contract_name} failed:\n{}", diagnostics.join("\n"))]
    Compilation {
        contract_name: String,
        diagnostics: Vec<String>,
    },

    #[error("contract {contract_name} not present in compiler output. Available: {}", available.join(", "))]
    MissingContract {
        contract_name: String,
        available: Vec<String>,
    },
}

/// Seam between the Contract Processor and the compiler toolchain.
#[async_trait]
pub trait Compile {
    async fn compile(&self, input: &CompileInput) -> Result<CompiledContract, CompilerError>;
}

pub struct SolcCompiler {
    solc: PathBuf,
}

impl SolcCompiler {
    pub fn new(solc: PathBuf) -> Self {
        Self { solc }
    }
}

#[async_trait]
impl Compile for SolcCompiler {
    async fn compile(&self, input: &CompileInput) -> Result<CompiledContract, CompilerError> {
        let standard_json = StandardJsonInput::from_input(input);
        let request = serde_json::to_vec(&standard_json)?;

        debug!(
            "compiling {} ({}) with solc {}",
            input.file_name, input.contract_name, input.compiler_version
        );

        let mut child = Command::new(&self.solc)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompilerError::Spawn {
                solc: self.solc.clone(),
                source,
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(&request)
                .await
                .map_err(|source| CompilerError::Spawn {
                    solc: self.solc.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CompilerError::Spawn {
                solc: self.solc.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompilerError::Aborted {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let parsed: StandardJsonOutput = serde_json::from_slice(&output.stdout)?;
        select_contract(parsed, input)
    }
}

/// Folds a parsed standard-json output into the requested contract, or a
/// [`CompilerError::Compilation`] carrying the error-severity diagnostics.
/// Warnings alone never fail a compilation.
fn select_contract(
    output: StandardJsonOutput,
    input: &CompileInput,
) -> Result<CompiledContract, CompilerError> {
    let diagnostics: Vec<String> = output
        .errors
        .iter()
        .filter(|diagnostic| diagnostic.severity == "error")
        .map(Diagnostic::render)
        .collect();
    if !diagnostics.is_empty() {
        return Err(CompilerError::Compilation {
            contract_name: input.contract_name.clone(),
            diagnostics,
        });
    }

    let mut file_contracts = output
        .contracts
        .into_iter()
        .find(|(file, _)| file == &input.file_name)
        .map(|(_, contracts)| contracts)
        .unwrap_or_default();

    let selected = match file_contracts.remove(&input.contract_name) {
        Some(contract) => contract,
        // Filename-derived names don't always match the declaration; a
        // single-contract file is unambiguous anyway
        None => match file_contracts.pop_first() {
            Some((name, contract)) if file_contracts.is_empty() => {
                debug!(
                    "contract {} not found, using sole output {name}",
                    input.contract_name
                );
                contract
            }
            entry => {
                let mut available: Vec<String> = entry.map(|(name, _)| name).into_iter().collect();
                available.extend(file_contracts.into_keys());
                return Err(CompilerError::MissingContract {
                    contract_name: input.contract_name.clone(),
                    available,
                });
            }
        },
    };

    Ok(CompiledContract {
        abi: selected.abi,
        bytecode: selected.evm.bytecode.object,
        metadata: selected.metadata,
        compiler_version: input.compiler_version.clone(),
    })
}

#[derive(Debug, Serialize)]
struct StandardJsonInput {
    language: String,
    sources: BTreeMap<String, SourceContent>,
    settings: StandardJsonSettings,
}

#[derive(Debug, Serialize)]
struct SourceContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StandardJsonSettings {
    optimizer: OptimizerInfo,
    evm_version: String,
    output_selection: serde_json::Value,
}

impl StandardJsonInput {
    fn from_input(input: &CompileInput) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            input.file_name.clone(),
            SourceContent {
                content: input.source.clone(),
            },
        );

        Self {
            language: "Solidity".to_string(),
            sources,
            settings: StandardJsonSettings {
                optimizer: input.optimizer.clone(),
                evm_version: input.evm_version.clone(),
                output_selection: serde_json::json!({
                    "*": { "*": ["abi", "evm.bytecode.object", "metadata"] }
                }),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StandardJsonOutput {
    #[serde(default)]
    errors: Vec<Diagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    severity: String,
    message: String,
    #[serde(rename = "formattedMessage")]
    formatted_message: Option<String>,
}

impl Diagnostic {
    fn render(&self) -> String {
        self.formatted_message
            .clone()
            .unwrap_or_else(|| self.message.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ContractOutput {
    abi: serde_json::Value,
    metadata: Option<String>,
    evm: EvmOutput,
}

#[derive(Debug, Deserialize)]
struct EvmOutput {
    bytecode: BytecodeOutput,
}

#[derive(Debug, Deserialize)]
struct BytecodeOutput {
    object: String,
}
