//! Content-addressed artifact store
//!
//! The store is the only place recompilation is decided. An artifact is
//! reused exactly when its fingerprint matches the requested (source, compiler
//! version, flags) triple; otherwise the stale entry is dropped and the adapter
//! is invoked. Concurrent requests for one fingerprint share a single compile.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OnceCell;

use kiln_core::{CancelToken, CompiledArtifact, Fingerprint, SourceUnit};

use crate::error::{Error, Result};
use crate::toolchain::ToolchainAdapter;

/// Subdirectory of the cache directory holding artifacts
const ARTIFACTS_SUBDIR: &str = "artifacts";

/// File extension of stored artifacts
const ARTIFACT_EXT: &str = "json";

type Outcome = std::result::Result<Arc<CompiledArtifact>, Arc<Error>>;
type Slot = Arc<OnceCell<Outcome>>;

/// Counters describing store activity since it was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Requests answered from the store
    pub hits: usize,
    /// Requests that found no fresh artifact
    pub misses: usize,
    /// Adapter invocations
    pub compiles: usize,
    /// Adapter invocations that failed
    pub failures: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    compiles: AtomicUsize,
    failures: AtomicUsize,
}

/// Artifact store backed by `<cache_dir>/artifacts/<name>.json`
///
/// At most one artifact per name is live. An artifact becomes visible to
/// lookups only after its file has been fully written and renamed into place.
pub struct ArtifactStore {
    dir: PathBuf,
    index: RwLock<BTreeMap<String, Arc<CompiledArtifact>>>,
    inflight: Mutex<HashMap<Fingerprint, Slot>>,
    counters: Counters,
}

impl ArtifactStore {
    /// Open (or create) the store under `cache_dir`
    ///
    /// Unreadable artifact files are ignored and will be recompiled.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        let dir = cache_dir.join(ARTIFACTS_SUBDIR);
        std::fs::create_dir_all(&dir)?;

        let mut index = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != ARTIFACT_EXT) {
                continue;
            }
            match Self::load_artifact(&path) {
                Some(artifact) => {
                    index.insert(artifact.name.clone(), Arc::new(artifact));
                }
                None => tracing::debug!("Ignoring unreadable artifact: {}", path.display()),
            }
        }

        tracing::debug!("Opened artifact store with {} entries", index.len());
        Ok(Self {
            dir,
            index: RwLock::new(index),
            inflight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        })
    }

    fn load_artifact(path: &Path) -> Option<CompiledArtifact> {
        let contents = std::fs::read_to_string(path).ok()?;
        let artifact: CompiledArtifact = serde_json::from_str(&contents).ok()?;
        let stem = path.file_stem()?.to_str()?;
        (artifact.name == stem).then_some(artifact)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, ARTIFACT_EXT))
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<CompiledArtifact>>> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_index(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<CompiledArtifact>>> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Live artifact for `name`, regardless of freshness
    pub fn lookup(&self, name: &str) -> Option<Arc<CompiledArtifact>> {
        self.read_index().get(name).cloned()
    }

    /// Live artifact for `name` whose fingerprint is `fingerprint`
    pub fn fresh(&self, name: &str, fingerprint: &Fingerprint) -> Option<Arc<CompiledArtifact>> {
        self.read_index()
            .get(name)
            .filter(|artifact| artifact.fingerprint == *fingerprint)
            .cloned()
    }

    /// Whether the live artifact for `name` has fingerprint `fingerprint`
    pub fn is_fresh(&self, name: &str, fingerprint: &Fingerprint) -> bool {
        self.fresh(name, fingerprint).is_some()
    }

    /// Names of all live artifacts, sorted
    pub fn names(&self) -> Vec<String> {
        self.read_index().keys().cloned().collect()
    }

    /// Activity counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            compiles: self.counters.compiles.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Return the artifact for `unit`, compiling only on a fingerprint miss
    pub async fn get_or_compile(
        &self,
        unit: &SourceUnit,
        version: &str,
        adapter: &dyn ToolchainAdapter,
        cancel: &CancelToken,
    ) -> Result<Arc<CompiledArtifact>> {
        let fingerprint = Fingerprint::compute(unit, version, &adapter.flags());
        let name = unit.artifact_name();

        if let Some(hit) = self.fresh(name, &fingerprint) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache hit: {} ({})", name, fingerprint.short());
            return Ok(hit);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let slot = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            inflight.entry(fingerprint.clone()).or_default().clone()
        };

        let outcome = slot
            .get_or_init(|| self.compile_and_publish(unit, version, adapter, &fingerprint, cancel))
            .await
            .clone();

        self.release(&fingerprint, &slot);
        outcome.map_err(|e| e.duplicate(&unit.path))
    }

    async fn compile_and_publish(
        &self,
        unit: &SourceUnit,
        version: &str,
        adapter: &dyn ToolchainAdapter,
        fingerprint: &Fingerprint,
        cancel: &CancelToken,
    ) -> Outcome {
        let name = unit.artifact_name();

        // Published by an earlier holder of this slot
        if let Some(hit) = self.fresh(name, fingerprint) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        if self.lookup(name).is_some() {
            tracing::debug!("Cache stale: {} ({})", name, fingerprint.short());
            self.invalidate(name).map_err(Arc::new)?;
        } else {
            tracing::debug!("Cache miss: {} ({})", name, fingerprint.short());
        }

        self.counters.compiles.fetch_add(1, Ordering::Relaxed);
        let artifact = match adapter.compile(unit, version, cancel).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                return Err(Arc::new(e));
            }
        };

        if artifact.fingerprint != *fingerprint || artifact.name != name {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(Arc::new(Error::Cache(format!(
                "{} adapter returned artifact '{}' ({}) for '{}' ({})",
                adapter.language(),
                artifact.name,
                artifact.fingerprint.short(),
                name,
                fingerprint.short()
            ))));
        }

        self.publish(artifact).map_err(Arc::new)
    }

    fn release(&self, fingerprint: &Fingerprint, slot: &Slot) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            inflight.remove(fingerprint);
        }
    }

    /// Write the artifact atomically, then make it visible
    fn publish(&self, artifact: CompiledArtifact) -> Result<Arc<CompiledArtifact>> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut file, &artifact)?;
        file.persist(self.path_for(&artifact.name))
            .map_err(|e| Error::Io(e.error))?;

        let artifact = Arc::new(artifact);
        self.write_index()
            .insert(artifact.name.clone(), Arc::clone(&artifact));
        tracing::debug!(
            "Stored artifact {} ({})",
            artifact.name,
            artifact.fingerprint.short()
        );
        Ok(artifact)
    }

    /// Drop the artifact for `name`; returns whether one existed
    pub fn invalidate(&self, name: &str) -> Result<bool> {
        let removed = self.write_index().remove(name).is_some();
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(removed)
    }

    /// Evict every artifact whose name is not in `live`; returns evicted names
    pub fn retain(&self, live: &HashSet<String>) -> Result<Vec<String>> {
        let evicted: Vec<String> = self
            .names()
            .into_iter()
            .filter(|name| !live.contains(name))
            .collect();
        for name in &evicted {
            tracing::debug!("Evicting artifact {}", name);
            self.invalidate(name)?;
        }
        Ok(evicted)
    }

    /// Drop every artifact
    pub fn clear(&self) -> Result<()> {
        for name in self.names() {
            self.invalidate(&name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::AbiAdapter;
    use kiln_core::Language;
    use std::time::Duration;

    const GAUGE_ABI: &str = r#"[{"type":"function","name":"claim_rewards","inputs":[],"outputs":[],"stateMutability":"nonpayable"}]"#;

    fn unit(content: &str) -> SourceUnit {
        SourceUnit::new("contracts/RewardsOnlyGauge.vy", Language::Vyper, content)
    }

    #[tokio::test]
    async fn test_second_request_is_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();

        let first = store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
            .await
            .unwrap();
        let second = store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
            .await
            .unwrap();

        assert_eq!(adapter.calls(), 1);
        assert_eq!(first.fingerprint, second.fingerprint);
        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses, stats.compiles), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_version_change_recompiles_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();

        let old = store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
            .await
            .unwrap();
        let new = store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.7", &adapter, &cancel)
            .await
            .unwrap();

        assert_eq!(adapter.calls(), 2);
        assert_ne!(old.fingerprint, new.fingerprint);
        assert_eq!(store.names(), vec!["RewardsOnlyGauge"]);
        assert_eq!(store.lookup("RewardsOnlyGauge").unwrap().compiler_version, "0.3.7");
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();
        {
            let store = ArtifactStore::open(dir.path()).unwrap();
            store
                .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
                .await
                .unwrap();
        }

        let store = ArtifactStore::open(dir.path()).unwrap();
        store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
            .await
            .unwrap();
        assert_eq!(adapter.calls(), 1);
    }

    #[test]
    fn test_open_ignores_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(ARTIFACTS_SUBDIR)).unwrap();
        std::fs::write(dir.path().join("artifacts/Broken.json"), "{oops").unwrap();
        std::fs::write(dir.path().join("artifacts/.tmp123"), "partial").unwrap();

        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();

        for _ in 0..2 {
            let err = store
                .get_or_compile(&unit("not an abi"), "0.3.1", &adapter, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Compile { .. }));
        }
        assert_eq!(adapter.calls(), 2);
        assert_eq!(store.stats().failures, 2);
        assert!(store.lookup("RewardsOnlyGauge").is_none());
    }

    #[tokio::test]
    async fn test_failed_recompile_drops_stale_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();

        store
            .get_or_compile(&unit(GAUGE_ABI), "0.3.1", &adapter, &cancel)
            .await
            .unwrap();
        assert!(
            store
                .get_or_compile(&unit("broken"), "0.3.1", &adapter, &cancel)
                .await
                .is_err()
        );
        assert!(store.lookup("RewardsOnlyGauge").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_one_compile() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path()).unwrap());
        let adapter = Arc::new(AbiAdapter::new(Language::Vyper).with_delay(Duration::from_millis(50)));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let adapter = Arc::clone(&adapter);
            tasks.spawn(async move {
                store
                    .get_or_compile(&unit(GAUGE_ABI), "0.3.1", adapter.as_ref(), &CancelToken::new())
                    .await
                    .map(|a| a.fingerprint.clone())
            });
        }

        let mut fingerprints = HashSet::new();
        while let Some(result) = tasks.join_next().await {
            fingerprints.insert(result.unwrap().unwrap());
        }
        assert_eq!(fingerprints.len(), 1);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_compile_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper).with_delay(Duration::from_secs(5));
        let cancel = CancelToken::new();

        let gauge = unit(GAUGE_ABI);
        let request = store.get_or_compile(&gauge, "0.3.1", &adapter, &cancel);
        let timed_out = tokio::time::timeout(Duration::from_millis(20), request).await;
        assert!(timed_out.is_err());

        assert!(store.lookup("RewardsOnlyGauge").is_none());
        let files: Vec<_> = std::fs::read_dir(dir.path().join(ARTIFACTS_SUBDIR))
            .unwrap()
            .collect();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_retain_and_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let adapter = AbiAdapter::new(Language::Vyper);
        let cancel = CancelToken::new();

        for name in ["VotingEscrow", "RewardDripper"] {
            let unit = SourceUnit::new(format!("{}.vy", name), Language::Vyper, "[]");
            store
                .get_or_compile(&unit, "0.3.1", &adapter, &cancel)
                .await
                .unwrap();
        }

        let live: HashSet<String> = ["VotingEscrow".to_string()].into_iter().collect();
        assert_eq!(store.retain(&live).unwrap(), vec!["RewardDripper"]);
        assert_eq!(store.names(), vec!["VotingEscrow"]);
        assert!(!dir.path().join("artifacts/RewardDripper.json").exists());

        assert!(store.invalidate("VotingEscrow").unwrap());
        assert!(!store.invalidate("VotingEscrow").unwrap());
    }
}
