//! Compiler output and descriptor file parsing
//!
//! Normalizes what solc and vyper print into [`CompilerOutput`], and reads
//! pre-built descriptor files into [`InterfaceDescriptor`]s.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use kiln_core::config::CompilerConfig;
use kiln_core::{AbiItem, CompilerOutput, InterfaceDescriptor};

use crate::error::{Error, Result};

// ============================================================================
// solc standard JSON
// ============================================================================

/// Build the standard JSON input for compiling one source file
pub fn solc_standard_input(source_key: &str, content: &str, settings: &CompilerConfig) -> serde_json::Value {
    let mut solc_settings = serde_json::json!({
        "optimizer": {
            "enabled": settings.optimize,
            "runs": settings.optimizer_runs,
        },
        "outputSelection": {
            "*": { "*": ["abi", "evm.bytecode.object"] }
        }
    });
    if let Some(evm_version) = &settings.evm_version {
        solc_settings["evmVersion"] = serde_json::Value::String(evm_version.clone());
    }

    serde_json::json!({
        "language": "Solidity",
        "sources": { source_key: { "content": content } },
        "settings": solc_settings,
    })
}

#[derive(Debug, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, SolcContract>>,
}

#[derive(Debug, Deserialize)]
struct SolcDiagnostic {
    severity: String,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "formattedMessage")]
    formatted_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    #[serde(default)]
    abi: Vec<AbiItem>,
    #[serde(default)]
    evm: Option<SolcEvm>,
}

#[derive(Debug, Deserialize)]
struct SolcEvm {
    #[serde(default)]
    bytecode: Option<SolcBytecode>,
}

#[derive(Debug, Deserialize)]
struct SolcBytecode {
    #[serde(default)]
    object: String,
}

/// Parse solc standard JSON output for `contract_name` in `source_key`
///
/// Returns the compiler diagnostics on failure. When the file has no contract
/// named after it but exactly one contract, that contract is used.
pub fn parse_solc_output(
    json: &str,
    source_key: &str,
    contract_name: &str,
) -> std::result::Result<CompilerOutput, Vec<String>> {
    let output: SolcOutput = serde_json::from_str(json)
        .map_err(|e| vec![format!("unreadable solc output: {}", e)])?;

    let errors: Vec<String> = output
        .errors
        .iter()
        .filter(|d| d.severity == "error")
        .map(|d| {
            d.formatted_message
                .as_deref()
                .unwrap_or(&d.message)
                .trim()
                .to_string()
        })
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut contracts = output
        .contracts
        .into_iter()
        .find(|(key, _)| key == source_key)
        .map(|(_, contracts)| contracts)
        .ok_or_else(|| vec![format!("solc produced no contracts for {}", source_key)])?;

    let contract = match contracts.remove(contract_name) {
        Some(contract) => contract,
        None if contracts.len() == 1 => contracts
            .into_values()
            .next()
            .ok_or_else(|| vec![format!("no contract named {}", contract_name)])?,
        None => {
            let found: Vec<&str> = contracts.keys().map(String::as_str).collect();
            return Err(vec![format!(
                "no contract named {} in {} (found: {})",
                contract_name,
                source_key,
                found.join(", ")
            )]);
        }
    };

    let object = contract
        .evm
        .and_then(|evm| evm.bytecode)
        .map(|b| b.object)
        .unwrap_or_default();

    Ok(CompilerOutput {
        abi: contract.abi,
        bytecode: prefixed_hex(&object),
    })
}

// ============================================================================
// vyper -f abi,bytecode
// ============================================================================

/// Parse `vyper -f abi,bytecode` stdout: the ABI line, then the bytecode line
pub fn parse_vyper_output(stdout: &str) -> std::result::Result<CompilerOutput, Vec<String>> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let abi_line = lines
        .next()
        .ok_or_else(|| vec!["vyper produced no output".to_string()])?;
    let abi: Vec<AbiItem> = serde_json::from_str(abi_line)
        .map_err(|e| vec![format!("unreadable vyper ABI: {}", e)])?;

    let bytecode = lines
        .next()
        .ok_or_else(|| vec!["vyper produced no bytecode".to_string()])?;

    Ok(CompilerOutput {
        abi,
        bytecode: prefixed_hex(bytecode),
    })
}

/// Diagnostics from a failed compiler run: its stderr lines, or the exit status
pub fn stderr_diagnostics(program: &str, stderr: &str, code: Option<i32>) -> Vec<String> {
    let lines: Vec<String> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if lines.is_empty() {
        match code {
            Some(code) => vec![format!("{} exited with status {}", program, code)],
            None => vec![format!("{} was terminated by a signal", program)],
        }
    } else {
        lines
    }
}

fn prefixed_hex(object: &str) -> String {
    if object.is_empty() || object.starts_with("0x") {
        object.to_string()
    } else {
        format!("0x{}", object)
    }
}

// ============================================================================
// Descriptor files
// ============================================================================

#[derive(Debug, Deserialize)]
struct ArtifactHeader {
    #[serde(default, rename = "contractName")]
    contract_name: Option<String>,
}

/// Read a descriptor file: a bare ABI array or an artifact with `abi`
///
/// The descriptor is named by `contractName` when present, else the file stem.
pub fn parse_descriptor_file(path: &Path) -> Result<InterfaceDescriptor> {
    let contents = std::fs::read_to_string(path)?;
    let invalid = |message: String| Error::InvalidDescriptor {
        path: path.to_path_buf(),
        message,
    };

    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

    let declared = match &value {
        serde_json::Value::Object(_) => {
            serde_json::from_value::<ArtifactHeader>(value.clone())
                .ok()
                .and_then(|h| h.contract_name)
        }
        _ => None,
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("file name is not valid UTF-8".to_string()))?;
    let name = declared.unwrap_or_else(|| stem.to_string());

    InterfaceDescriptor::from_value(name, value).map_err(|e| invalid(e.to_string()))
}
