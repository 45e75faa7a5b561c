use crate::common::{IrisAuthError, Result};
use crate::core::extractor::{l2_normalize, Signature, SIGNATURE_LEN};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const SNAPSHOT_VERSION: u32 = 1;
const UNIT_NORM_TOLERANCE: f32 = 1e-4;

type Records = HashMap<String, Signature>;

/// Identity -> signature store.
///
/// The in-memory map is authoritative while the process runs; the snapshot
/// file exists only to survive restarts and is rewritten in full on every
/// mutation. Mutators serialize on the write lock (persisting while holding
/// it, so two rewrites can never interleave); readers share the read lock
/// and observe the map before or after a mutation, never mid-write.
pub struct EnrollmentStore {
    snapshot_path: PathBuf,
    records: RwLock<Records>,
}

impl EnrollmentStore {
    /// Open a store backed by the given snapshot path.
    ///
    /// A missing, corrupt, or wrong-version snapshot starts the store
    /// empty; the service must not refuse to start over a stale file.
    pub fn open(snapshot_path: &Path) -> Result<Self> {
        if let Some(parent) = snapshot_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records = load_snapshot(snapshot_path);
        if !records.is_empty() {
            tracing::info!(count = records.len(), "loaded enrolled identities");
        }

        Ok(Self {
            snapshot_path: snapshot_path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Insert or overwrite a record, then rewrite the snapshot.
    ///
    /// The in-memory update always lands; a persist failure is returned so
    /// the caller can surface it, and a later successful mutation will
    /// reconcile the file.
    pub fn put(&self, identity: &str, mut signature: Signature) -> Result<()> {
        if signature.len() != SIGNATURE_LEN {
            return Err(IrisAuthError::InvalidSignature(format!(
                "expected {} dimensions, got {}",
                SIGNATURE_LEN,
                signature.len()
            )));
        }

        let norm = signature.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < UNIT_NORM_TOLERANCE {
            return Err(IrisAuthError::InvalidSignature(
                "signature norm is zero".into(),
            ));
        }
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            l2_normalize(&mut signature);
        }

        let mut records = self
            .records
            .write()
            .map_err(|_| IrisAuthError::Storage("store lock poisoned".into()))?;
        records.insert(identity.to_string(), signature);
        persist(&self.snapshot_path, &records)
    }

    pub fn get(&self, identity: &str) -> Option<Signature> {
        self.records.read().ok()?.get(identity).cloned()
    }

    /// Remove a record; `Ok(false)` for an unknown identity, with no
    /// snapshot rewrite in that case.
    pub fn remove(&self, identity: &str) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|_| IrisAuthError::Storage("store lock poisoned".into()))?;
        if records.remove(identity).is_none() {
            return Ok(false);
        }
        persist(&self.snapshot_path, &records)?;
        Ok(true)
    }

    pub fn identities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

fn load_snapshot(path: &Path) -> Records {
    if !path.exists() {
        return Records::new();
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read snapshot, starting empty");
            return Records::new();
        }
    };

    match bincode::deserialize::<(u32, Records)>(&data) {
        Ok((SNAPSHOT_VERSION, records)) => records,
        Ok((version, _)) => {
            tracing::warn!(version, "unsupported snapshot version, starting empty");
            Records::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed snapshot, starting empty");
            Records::new()
        }
    }
}

/// Rewrite the whole store: serialize, write to a sibling temp file, rename
/// into place. A crash mid-write leaves the previous snapshot intact.
fn persist(path: &Path, records: &Records) -> Result<()> {
    let encoded = bincode::serialize(&(SNAPSHOT_VERSION, records))
        .map_err(|e| IrisAuthError::Persist(format!("failed to serialize snapshot: {}", e)))?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, encoded)
        .map_err(|e| IrisAuthError::Persist(format!("failed to write snapshot: {}", e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| IrisAuthError::Persist(format!("failed to replace snapshot: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_snapshot(tag: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "irisauth-store-{}-{}-{}.bin",
            tag,
            std::process::id(),
            n
        ))
    }

    fn unit_signature(seed: f32) -> Signature {
        let mut v: Signature = (0..SIGNATURE_LEN).map(|i| seed + i as f32 * 0.01).collect();
        l2_normalize(&mut v);
        v
    }

    #[test]
    fn put_get_remove_round_trip() {
        let path = temp_snapshot("roundtrip");
        let store = EnrollmentStore::open(&path).unwrap();

        let sig = unit_signature(0.5);
        store.put("alice", sig.clone()).unwrap();
        assert_eq!(store.get("alice").unwrap(), sig);
        assert_eq!(store.identities(), vec!["alice".to_string()]);

        assert!(store.remove("alice").unwrap());
        assert!(store.get("alice").is_none());
        assert!(store.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn reload_from_snapshot_preserves_records() {
        let path = temp_snapshot("reload");
        let sig = unit_signature(1.2);
        {
            let store = EnrollmentStore::open(&path).unwrap();
            store.put("bob", sig.clone()).unwrap();
        }

        let reloaded = EnrollmentStore::open(&path).unwrap();
        let stored = reloaded.get("bob").unwrap();
        assert_eq!(stored.len(), SIGNATURE_LEN);
        for (a, b) in stored.iter().zip(sig.iter()) {
            assert!((a - b).abs() < 1e-6);
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let path = temp_snapshot("corrupt");
        fs::write(&path, b"definitely not bincode").unwrap();

        let store = EnrollmentStore::open(&path).unwrap();
        assert!(store.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_snapshot_starts_empty() {
        let path = temp_snapshot("missing");
        let store = EnrollmentStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn removing_unknown_identity_is_a_no_op() {
        let path = temp_snapshot("noop");
        let store = EnrollmentStore::open(&path).unwrap();

        assert!(!store.remove("ghost").unwrap());
        // No mutation happened, so no snapshot was written
        assert!(!path.exists());
    }

    #[test]
    fn rejects_wrong_dimensionality() {
        let path = temp_snapshot("shortsig");
        let store = EnrollmentStore::open(&path).unwrap();

        let err = store.put("carol", vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, IrisAuthError::InvalidSignature(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_zero_norm_signature() {
        let path = temp_snapshot("zerosig");
        let store = EnrollmentStore::open(&path).unwrap();

        let err = store.put("dave", vec![0.0; SIGNATURE_LEN]).unwrap_err();
        assert!(matches!(err, IrisAuthError::InvalidSignature(_)));
    }

    #[test]
    fn renormalizes_drifted_signature() {
        let path = temp_snapshot("drift");
        let store = EnrollmentStore::open(&path).unwrap();

        let mut drifted = unit_signature(0.7);
        for v in drifted.iter_mut() {
            *v *= 3.0;
        }
        store.put("erin", drifted).unwrap();

        let stored = store.get("erin").unwrap();
        let norm = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm = {}", norm);

        let _ = fs::remove_file(&path);
    }
}
