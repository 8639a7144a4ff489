//! Input expansion for batch runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Expand input patterns into files, keeping first-seen order.
///
/// An existing path is taken literally, even if it contains glob
/// metacharacters. Anything else is a glob pattern; a pattern matching
/// nothing is logged and skipped.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    for pattern in patterns {
        let matches = if Path::new(pattern).exists() {
            vec![PathBuf::from(pattern)]
        } else {
            glob_files(pattern)?
        };
        if matches.is_empty() {
            warn!(pattern = %pattern, "input pattern matched no files");
        }
        for path in matches {
            if seen.insert(path.clone()) {
                inputs.push(path);
            }
        }
    }
    debug!(count = inputs.len(), "expanded inputs");
    Ok(inputs)
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).with_context(|| format!("invalid input pattern '{pattern}'"))?;
    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) => warn!(err = %err, "unreadable path while expanding inputs"),
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn expands_globs_in_order_without_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["b.docx", "a.docx", "notes.txt"] {
            fs::write(temp.path().join(name), "x").expect("write");
        }
        let dir = temp.path().display().to_string();
        let patterns = vec![
            format!("{dir}/b.docx"),
            format!("{dir}/*.docx"),
            format!("{dir}/*.pdf"),
        ];
        let inputs = expand_inputs(&patterns).expect("expand");
        let names: Vec<_> = inputs
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.docx", "a.docx"]);
    }

    #[test]
    fn existing_path_with_brackets_is_literal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("act [final].docx");
        fs::write(&path, "x").expect("write");
        let inputs = expand_inputs(&[path.display().to_string()]).expect("expand");
        assert_eq!(inputs, vec![path]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(expand_inputs(&["[".to_string()]).is_err());
    }
}
