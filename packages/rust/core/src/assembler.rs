//! Run directory writer.
//!
//! Every file lands atomically (temp file, then rename) and is checksummed
//! so `run.json` can list what a run produced:
//!
//! ```text
//! <output_root>/<run_id>/
//! ├── run.json
//! ├── report.md
//! ├── research/{candidates,corpus}.json
//! ├── product/product.<lang>.{json,md}
//! └── funnel/{blueprint.<lang>.json,page_brief.md}
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use funnelport_artifacts::sha256_hex;
use funnelport_shared::{
    ArtifactEntry, CURRENT_SCHEMA_VERSION, FunnelError, Result, RunId, RunRecord,
};

pub const RECORD_FILE: &str = "run.json";
pub const REPORT_FILE: &str = "report.md";

/// Output directory of one run.
#[derive(Debug, Clone)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    /// Create `<output_root>/<id>/`.
    pub fn create(output_root: &Path, id: &RunId) -> Result<Self> {
        let root = output_root.join(id.to_string());
        std::fs::create_dir_all(&root).map_err(|e| FunnelError::io(&root, e))?;
        debug!(path = %root.display(), "run directory created");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to `rel_path` under the run directory.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn write_artifact(&self, rel_path: &str, bytes: &[u8]) -> Result<ArtifactEntry> {
        let target = self.root.join(rel_path);
        write_atomic(&target, bytes)?;
        Ok(ArtifactEntry {
            path: rel_path.to_string(),
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len(),
        })
    }

    /// Pretty JSON with a trailing newline.
    pub fn write_json<T: Serialize>(&self, rel_path: &str, data: &T) -> Result<ArtifactEntry> {
        let mut json = serde_json::to_vec_pretty(data)
            .map_err(|e| FunnelError::validation(format!("JSON serialization failed: {e}")))?;
        json.push(b'\n');
        self.write_artifact(rel_path, &json)
    }

    /// Rewrite `run.json`. The record itself is not listed as an artifact.
    pub fn persist_record(&self, record: &RunRecord) -> Result<()> {
        self.write_json(RECORD_FILE, record).map(|_| ())
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| FunnelError::validation(format!("no parent for {}", target.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| FunnelError::io(parent, e))?;

    let filename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{filename}.tmp"));
    std::fs::write(&temp, bytes).map_err(|e| FunnelError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| FunnelError::io(target, e))?;

    debug!(path = %target.display(), "wrote file");
    Ok(())
}

/// Read and validate a run directory's `run.json`.
pub fn load_record(run_dir: &Path) -> Result<RunRecord> {
    let path = run_dir.join(RECORD_FILE);
    if !path.exists() {
        return Err(FunnelError::validation(format!("missing {}", path.display())));
    }
    let content = std::fs::read_to_string(&path).map_err(|e| FunnelError::io(&path, e))?;
    let record: RunRecord = serde_json::from_str(&content)
        .map_err(|e| FunnelError::validation(format!("invalid {RECORD_FILE}: {e}")))?;

    if record.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(FunnelError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            record.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }
    Ok(record)
}

/// Check every listed artifact exists with its recorded checksum.
pub fn verify_artifacts(run_dir: &Path, record: &RunRecord) -> Result<()> {
    for artifact in &record.artifacts {
        let path = run_dir.join(&artifact.path);
        let bytes = std::fs::read(&path).map_err(|e| FunnelError::io(&path, e))?;
        if sha256_hex(&bytes) != artifact.sha256 {
            return Err(FunnelError::validation(format!(
                "checksum mismatch for {}",
                artifact.path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use funnelport_shared::Workflow;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("fp-assembler-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn writes_nested_artifacts_with_checksums() {
        let dir = RunDir::create(&temp_root(), &RunId::new()).unwrap();
        let entry = dir.write_artifact("product/product.en.md", b"# Title\n").unwrap();

        assert_eq!(entry.path, "product/product.en.md");
        assert_eq!(entry.size_bytes, 8);
        assert_eq!(entry.sha256, sha256_hex(b"# Title\n"));
        let on_disk = std::fs::read(dir.path().join("product/product.en.md")).unwrap();
        assert_eq!(on_disk, b"# Title\n");
        assert!(!dir.path().join("product/.product.en.md.tmp").exists());
    }

    #[test]
    fn rewrite_replaces_content() {
        let dir = RunDir::create(&temp_root(), &RunId::new()).unwrap();
        dir.write_artifact("report.md", b"first").unwrap();
        let second = dir.write_artifact("report.md", b"second").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("report.md")).unwrap(), "second");
        assert_eq!(second.size_bytes, 6);
    }

    #[test]
    fn record_round_trips_and_verifies() {
        let id = RunId::new();
        let dir = RunDir::create(&temp_root(), &id).unwrap();
        let mut record = RunRecord::new(id.clone(), Workflow::Research, Utc::now());
        record.record_artifact(dir.write_json("research/candidates.json", &vec!["a", "b"]).unwrap());
        dir.persist_record(&record).unwrap();

        let loaded = load_record(dir.path()).unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.artifacts, record.artifacts);
        verify_artifacts(dir.path(), &loaded).unwrap();

        std::fs::write(dir.path().join("research/candidates.json"), "[]").unwrap();
        let err = verify_artifacts(dir.path(), &loaded).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn missing_or_foreign_record_is_rejected() {
        let root = temp_root();
        std::fs::create_dir_all(&root).unwrap();
        assert!(load_record(&root).unwrap_err().to_string().contains("missing"));

        std::fs::write(root.join(RECORD_FILE), r#"{"schema_version": 1}"#).unwrap();
        assert!(load_record(&root).unwrap_err().to_string().contains("invalid"));
    }
}
