// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Single-line progress tokens backing resumable runs. The file holds the
//! uid of the last document whose batch was fully flushed; it is rewritten
//! after every flush and removed on clean completion.

use anyhow::{Context, Result};
use std::path::Path;

pub fn read_last_processed_uid(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read progress file {path:?}"))?;
    let trimmed = contents.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn save_progress(path: &Path, uid: &str) -> Result<()> {
    std::fs::write(path, uid).with_context(|| format!("Failed to write progress file {path:?}"))
}

pub fn clear_progress(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove progress file {path:?}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_a_uid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("matching_progress.txt");
        assert_eq!(read_last_processed_uid(&path).unwrap(), None);

        save_progress(&path, "abc123").unwrap();
        assert_eq!(read_last_processed_uid(&path).unwrap(), Some("abc123".to_string()));

        save_progress(&path, "def456").unwrap();
        assert_eq!(read_last_processed_uid(&path).unwrap(), Some("def456".to_string()));

        clear_progress(&path).unwrap();
        assert_eq!(read_last_processed_uid(&path).unwrap(), None);
        // Clearing twice is fine.
        clear_progress(&path).unwrap();
    }

    #[test]
    fn empty_file_reads_as_no_progress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_last_processed_uid(&path).unwrap(), None);
    }
}
