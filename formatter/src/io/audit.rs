//! Audit artifact: one JSON record per processed input.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::snapshot::Snapshot;
use crate::pipeline::{Artifacts, Summary};

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord<'a> {
    pub engine: &'a str,
    pub dry_run: bool,
    pub input: String,
    pub input_sha256: String,
    /// RFC 3339, UTC.
    pub generated_at: String,
    pub pre: &'a Snapshot,
    pub post: &'a Snapshot,
    pub summary: &'a Summary,
    pub warnings: &'a [String],
    pub artifacts: &'a Artifacts,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lowercase hex SHA-256 of a file's bytes.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Write the record as pretty JSON (temp file + rename).
pub fn write_audit(path: &Path, record: &AuditRecord<'_>) -> Result<()> {
    debug!(path = %path.display(), "writing audit record");
    let mut buf = serde_json::to_string_pretty(record).context("serialize audit record")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("audit path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp audit {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace audit {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::pipeline::StepSummary;

    #[test]
    fn hashes_known_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("a.txt");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            sha256_file(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn record_is_pretty_json_with_trailing_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("a.audit.json");
        let snapshot = Snapshot {
            paragraph_count: 3,
            ..Snapshot::default()
        };
        let summary = Summary {
            steps: vec![StepSummary {
                name: "Body".to_string(),
                modifications: 3,
                warnings: Vec::new(),
            }],
            total_modifications: 3,
        };
        let record = AuditRecord {
            engine: "docx",
            dry_run: true,
            input: "a.docx".to_string(),
            input_sha256: "00".to_string(),
            generated_at: timestamp(),
            pre: &snapshot,
            post: &snapshot,
            summary: &summary,
            warnings: &[],
            artifacts: &Artifacts::default(),
        };
        write_audit(&path, &record).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with("}\n"));
        let value: Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["engine"], "docx");
        assert_eq!(value["pre"]["paragraph_count"], 3);
        assert_eq!(value["summary"]["steps"][0]["name"], "Body");
        assert_eq!(value["summary"]["total_modifications"], 3);
        assert!(value["generated_at"].as_str().is_some_and(|t| t.ends_with('Z')));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
