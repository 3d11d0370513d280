//! Persisted circuit index entries.
//!
//! Each destination's index is a pretty-printed JSON array that is replaced
//! whole on every run. Writes go to a sibling temp file first and are renamed
//! into place, so readers never see a partial index.

use crate::error::{CircuitIndexError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One circuit in a destination's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitEntry {
    /// Stable `HW-<timestamp>` identifier
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Path relative to the circuits directory, e.g. `djerba/loop.gpx`
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub description: String,
    /// Total length, e.g. `"4.2 km"`
    #[serde(default)]
    pub distance: String,
    #[serde(default = "default_true")]
    pub is_official: bool,
    #[serde(default = "default_true")]
    pub has_real_track: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default)]
    pub poi_ids: Vec<String>,
    /// User-set travel mode, carried over between runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CircuitEntry {
    /// Filename part of the stored relative path.
    pub fn file_name(&self) -> Option<&str> {
        Path::new(&self.file).file_name().and_then(|name| name.to_str())
    }
}

/// Load a destination's previous index.
///
/// Never fails: a missing file is an empty index, an unparsable one is
/// discarded with a warning, and individual entries that do not look like
/// circuit entries are dropped.
pub fn load_previous_index(path: &Path, destination: &str) -> Vec<CircuitEntry> {
    if !path.exists() {
        return Vec::new();
    }
    match try_load_previous_index(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not parse existing index for '{}', starting fresh: {}", destination, e);
            Vec::new()
        }
    }
}

/// Load a previous index, failing if the file is not a JSON array.
pub fn try_load_previous_index(path: &Path) -> Result<Vec<CircuitEntry>> {
    let content = fs::read_to_string(path).map_err(|e| CircuitIndexError::io(path, e))?;
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|e| CircuitIndexError::json(path, e))?;

    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<CircuitEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Dropping entry {} of {}: {}", i, path.display(), e);
                None
            }
        })
        .collect())
}

/// Serialize entries the way they are persisted: a two-space indented JSON array.
pub fn render_index(entries: &[CircuitEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).map_err(|e| CircuitIndexError::json("<index>", e))
}

/// Replace the index file at `path` with `entries`.
pub fn write_index(path: &Path, entries: &[CircuitEntry]) -> Result<()> {
    write_atomic(path, render_index(entries)?.as_bytes())
}

/// Write `content` to a temp file beside `path`, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, content).map_err(|e| CircuitIndexError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CircuitIndexError::io(path, e)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
