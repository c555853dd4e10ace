//! Integration tests for the store → extractor → generator chain
//!
//! A fixed-output adapter stands in for the real compilers.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use kiln_codegen::output::WriteStatus;
use kiln_codegen::{ArtifactStore, Error, Extractor, Generator, ToolchainAdapter};
use kiln_core::{
    AbiItem, CancelToken, CompiledArtifact, CompilerOutput, Config, Language, SourceUnit,
};

const DRIPPER: &str = r#"[
  {"type":"constructor","inputs":[{"name":"_token","type":"address"}],"stateMutability":"nonpayable"},
  {"type":"function","name":"drip","inputs":[],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"token","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}
]"#;

const ESCROW: &str = r#"[
  {"type":"constructor","inputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"token","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"},
  {"type":"function","name":"locked__end","inputs":[{"name":"_addr","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
]"#;

const VENDOR_ARTIFACT: &str = r#"{
  "contractName": "ERC20",
  "abi": [
    {"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
  ]
}"#;

#[derive(Default)]
struct JsonAdapter {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolchainAdapter for JsonAdapter {
    fn language(&self) -> Language {
        Language::Vyper
    }

    fn flags(&self) -> Vec<String> {
        vec![]
    }

    async fn compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        _cancel: &CancelToken,
    ) -> kiln_codegen::Result<CompiledArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let abi: Vec<AbiItem> = serde_json::from_str(&unit.content)?;
        let output = CompilerOutput {
            abi,
            bytecode: "0x".to_string(),
        };
        Ok(CompiledArtifact::new(unit, version, &[], output))
    }
}

fn project(interfaces: &str, bindings: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "name: shibui-dao\ninterfaces:\n  path: abis\n{}bindings:\n  out_dir: bindings\n{}",
        interfaces, bindings
    );
    let config = Config::from_yaml(&yaml, dir.path()).unwrap();
    (dir, config)
}

async fn compiled_store(config: &Config) -> ArtifactStore {
    let store = ArtifactStore::open(&config.cache_dir()).unwrap();
    let adapter = JsonAdapter::default();
    for (path, abi) in [
        ("contracts/RewardDripper.vy", DRIPPER),
        ("contracts/VotingEscrow.vy", ESCROW),
    ] {
        let unit = SourceUnit::new(config.resolve(path), Language::Vyper, abi);
        store
            .get_or_compile(&unit, "0.3.1", &adapter, &CancelToken::new())
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_extract_and_generate_selection_with_externals() {
    let (dir, config) = project(
        "  clear: true\n  only: [VotingEscrow, RewardDripper]\n",
        "  target: ethers-v5\n  external_artifacts: [\"vendor/**/*.json\"]\n",
    );
    std::fs::create_dir_all(dir.path().join("vendor/tokens")).unwrap();
    std::fs::write(dir.path().join("vendor/tokens/erc20.json"), VENDOR_ARTIFACT).unwrap();

    let store = compiled_store(&config).await;
    let extractor = Extractor::new(&config);
    let externals = extractor.load_externals().unwrap();
    let only = config.pipeline.interfaces.only.clone();
    let descriptors = extractor.extract(&only, &store, externals).unwrap();

    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["VotingEscrow", "RewardDripper", "ERC20"]);

    let paths = extractor.write(&descriptors, &only).unwrap();
    assert_eq!(paths.len(), 3);
    assert!(dir.path().join("abis/ERC20.json").exists());

    let generator = Generator::from_config(&config).unwrap();
    let outcome = generator.generate(&descriptors).unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.outputs.len(), 3);
    assert!(dir.path().join("bindings/ERC20.ts").exists());

    let again = extractor.load_externals().unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].name, "ERC20");
}

#[tokio::test]
async fn test_flattened_interface_generates_one_binding() {
    let (dir, config) = project(
        "  flat: true\n  flat_name: Shibui\n  only: [VotingEscrow, RewardDripper]\n",
        "  target: rust\n",
    );

    let store = compiled_store(&config).await;
    let extractor = Extractor::new(&config);
    let only = config.pipeline.interfaces.only.clone();
    let descriptors = extractor.extract(&only, &store, vec![]).unwrap();

    assert_eq!(descriptors.len(), 1);
    let merged = &descriptors[0];
    assert_eq!(merged.name, "Shibui");
    let functions: Vec<&str> = merged.functions().map(|f| f.name.as_str()).collect();
    // `token` appears in both artifacts with one shape and is merged
    assert_eq!(functions.iter().filter(|n| **n == "token").count(), 1);
    assert!(functions.contains(&"drip"));
    assert!(functions.contains(&"locked__end"));
    assert!(!merged.items.iter().any(|i| matches!(i, AbiItem::Constructor(_))));

    extractor.write(&descriptors, &only).unwrap();
    assert!(dir.path().join("abis/Shibui.json").exists());
    assert!(!dir.path().join("abis/VotingEscrow.json").exists());

    let generator = Generator::from_config(&config).unwrap();
    let outcome = generator.generate(&descriptors).unwrap();
    assert_eq!(outcome.outputs[0].status, WriteStatus::Written);
    let code = std::fs::read_to_string(dir.path().join("bindings/shibui.rs")).unwrap();
    assert!(code.contains("pub struct DripCall"));
    let index = std::fs::read_to_string(dir.path().join("bindings/mod.rs")).unwrap();
    assert!(index.contains("pub mod shibui ;"));
}

#[tokio::test]
async fn test_selection_error_reports_every_missing_name() {
    let (_dir, config) = project("  only: [Gone, VotingEscrow, Missing]\n", "");
    let store = compiled_store(&config).await;
    let extractor = Extractor::new(&config);

    let err = extractor
        .extract(&config.pipeline.interfaces.only, &store, vec![])
        .unwrap_err();
    match err {
        Error::Selection { names } => assert_eq!(names, vec!["Gone", "Missing"]),
        other => panic!("Expected Selection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_reopen_serves_cached_artifacts() {
    let (_dir, config) = project("", "");
    drop(compiled_store(&config).await);

    let store = ArtifactStore::open(&config.cache_dir()).unwrap();
    let adapter = Arc::new(JsonAdapter::default());
    let unit = SourceUnit::new(
        config.resolve("contracts/VotingEscrow.vy"),
        Language::Vyper,
        ESCROW,
    );
    let artifact = store
        .get_or_compile(&unit, "0.3.1", adapter.as_ref(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(artifact.name, "VotingEscrow");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.names(), vec!["RewardDripper", "VotingEscrow"]);
}
