//! Integration tests for configuration loading and source discovery
//!
//! Tests use temporary directories with real file fixtures to verify:
//! - Loading from a directory or an explicit file
//! - Hardhat-style aliases for interface and binding options
//! - Validation errors
//! - Path resolution against the project root
//! - Source discovery and fingerprints

use tempfile::TempDir;

use kiln_core::config::Dialect;
use kiln_core::{Config, Error, Fingerprint, Language, SourceUnit};

/// Helper to create a temporary project directory with a `contracts/` tree.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("contracts/gauges")).unwrap();
    dir
}

const FULL_CONFIG: &str = r#"
name: shibui-dao
sources: contracts
compilers:
  vyper:
    version: "0.3.1"
  solidity:
    version: "0.8.9"
    optimizer_runs: 1000
build:
  cache_dir: .kiln/cache
  concurrency: 2
  compiler_timeout_secs: 30
interfaces:
  path: abis
  run_on_compile: true
  clear: true
  flat: true
  only: [VotingEscrow, RewardsOnlyGauge, RewardDripper]
bindings:
  out_dir: bindings
  target: rust
  always_generate_overloads: true
  external_artifacts: ["vendor/*.json"]
"#;

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_from_directory() {
    let dir = setup_project();
    std::fs::write(dir.path().join("kiln.yaml"), FULL_CONFIG).unwrap();

    let config = Config::load(dir.path()).unwrap();
    let p = &config.pipeline;

    assert_eq!(p.name, "shibui-dao");
    assert_eq!(config.base_path, dir.path());
    assert_eq!(p.build.concurrency, 2);
    assert_eq!(p.build.compiler_timeout().unwrap().as_secs(), 30);
    assert_eq!(config.compiler(Language::Vyper).unwrap().version, "0.3.1");
    assert_eq!(config.compiler(Language::Solidity).unwrap().optimizer_runs, 1000);
    assert!(p.interfaces.flat);
    assert_eq!(p.interfaces.flat_name, "Interface");
    assert_eq!(
        p.interfaces.only,
        vec!["VotingEscrow", "RewardsOnlyGauge", "RewardDripper"]
    );
    assert_eq!(p.bindings.target, Dialect::Rust);
    assert_eq!(p.bindings.external_artifacts, vec!["vendor/*.json"]);
}

#[test]
fn test_load_from_explicit_file() {
    let dir = setup_project();
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(&path, "name: explicit\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.pipeline.name, "explicit");
    assert_eq!(config.base_path, dir.path());
}

#[test]
fn test_load_missing_config() {
    let dir = setup_project();
    match Config::load(dir.path()) {
        Err(Error::ConfigNotFound { path }) => assert!(path.ends_with("kiln.yaml")),
        other => panic!("Expected ConfigNotFound, got {other:?}"),
    }
}

#[test]
fn test_hardhat_style_aliases() {
    let yaml = r#"
name: aliased
abi_exporter:
  outputPath: abis
  runOnCompile: true
  clearStale: true
  flatten: false
  selection: [VotingEscrow]
typechain:
  outDir: types
  target: ethers-v5
  alwaysGenerateOverloads: true
  externalArtifacts: ["abis/*.json"]
"#;
    let config = Config::from_yaml(yaml, "/project").unwrap();
    let p = &config.pipeline;

    assert!(p.interfaces.run_on_compile);
    assert!(p.interfaces.clear);
    assert_eq!(p.interfaces.only, vec!["VotingEscrow"]);
    assert_eq!(p.bindings.out_dir, "types");
    assert!(p.bindings.always_generate_overloads);
    assert_eq!(p.bindings.external_artifacts, vec!["abis/*.json"]);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ("name: x\nbuild:\n  concurrency: 0\n", "concurrency"),
        ("name: x\ncompilers:\n  vyper:\n    version: \"\"\n", "compilers.vyper.version"),
        ("name: x\ninterfaces:\n  only: [A, B, A]\n", "'A'"),
        ("name: x\ninterfaces:\n  spacing: 32\n", "spacing"),
        ("name: x\ninterfaces:\n  flat: true\n  flat_name: \" \"\n", "flat_name"),
    ];

    for (yaml, needle) in cases {
        match Config::from_yaml(yaml, ".") {
            Err(Error::ConfigInvalid { message }) => {
                assert!(message.contains(needle), "{message:?} should mention {needle}")
            }
            other => panic!("Expected ConfigInvalid for {yaml:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_unknown_binding_target_is_parse_error() {
    let err = Config::from_yaml("name: x\nbindings:\n  target: web3-v1\n", ".").unwrap_err();
    assert!(matches!(err, Error::ConfigParse(_)));
}

#[test]
fn test_unconfigured_compiler() {
    let config = Config::from_yaml("name: x\ncompilers:\n  vyper:\n    version: \"0.3.1\"\n", ".")
        .unwrap();
    let err = config.compiler(Language::Solidity).unwrap_err();
    assert!(err.to_string().contains("compilers.solidity"));
}

// =============================================================================
// Paths and sources
// =============================================================================

#[test]
fn test_paths_resolve_against_project_root() {
    let dir = setup_project();
    std::fs::write(dir.path().join("kiln.yaml"), FULL_CONFIG).unwrap();
    let config = Config::load(dir.path()).unwrap();

    assert_eq!(config.sources_dir(), dir.path().join("contracts"));
    assert_eq!(config.cache_dir(), dir.path().join(".kiln/cache"));
    assert_eq!(config.interfaces_dir(), dir.path().join("abis"));
    assert_eq!(config.bindings_dir(), dir.path().join("bindings"));
    assert_eq!(config.resolve("/abs/path"), std::path::PathBuf::from("/abs/path"));
}

#[test]
fn test_discover_and_fingerprint_sources() {
    let dir = setup_project();
    std::fs::write(dir.path().join("kiln.yaml"), FULL_CONFIG).unwrap();
    std::fs::write(dir.path().join("contracts/VotingEscrow.vy"), "# @version 0.3.1\n").unwrap();
    std::fs::write(
        dir.path().join("contracts/gauges/RewardsOnlyGauge.vy"),
        "# @version 0.3.1\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("contracts/notes.txt"), "not a contract").unwrap();

    let config = Config::load(dir.path()).unwrap();
    let units: Vec<SourceUnit> = config
        .discover_sources()
        .unwrap()
        .iter()
        .map(|p| SourceUnit::read(p).unwrap())
        .collect();

    let names: Vec<&str> = units.iter().map(|u| u.artifact_name()).collect();
    assert_eq!(names, vec!["VotingEscrow", "RewardsOnlyGauge"]);

    // Identical content and version share a fingerprint regardless of path
    let a = Fingerprint::compute(&units[0], "0.3.1", &[]);
    let b = Fingerprint::compute(&units[1], "0.3.1", &[]);
    let c = Fingerprint::compute(&units[0], "0.3.2", &[]);
    assert_eq!(a, b);
    assert_ne!(a, c);
}
