//! Action log entries and the on-disk recording layout
//!
//! ```text
//! <root>/action_records.jsonl
//! <root>/iteration_<k>/action_<i>/html_before_action-target_<t>-repeat_<r>.html
//! <root>/iteration_<k>/action_<i>/screenshot_before_action-target_<t>-repeat_<r>.png
//! ```

use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const RECORDS_FILE: &str = "action_records.jsonl";

/// One concrete action invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Pass over the task's action list
    pub task_repeat_index: usize,

    /// Position of the action in its task
    pub action_index: usize,

    /// Run of this action within the pass
    pub action_repeat_index: usize,

    /// Position of the target in the action's target list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target_index: Option<usize>,

    /// Target as written in the task book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,

    /// Outer HTML of the resolved element before the action ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target_element: Option<String>,

    /// Whatever the action returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<Value>,
}

/// Where one snapshot goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotKey {
    pub iteration: usize,
    pub action: usize,
    pub target: usize,
    pub repeat: usize,
}

impl SnapshotKey {
    fn dir(&self, root: &Path) -> PathBuf {
        root.join(format!("iteration_{}", self.iteration)).join(format!("action_{}", self.action))
    }

    fn suffix(&self) -> String {
        format!("before_action-target_{}-repeat_{}", self.target, self.repeat)
    }
}

/// Writes snapshots and the action log under one root directory
#[derive(Debug, Clone)]
pub struct ActionRecorder {
    root: PathBuf,
}

impl ActionRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn html_path(&self, key: SnapshotKey) -> PathBuf {
        key.dir(&self.root).join(format!("html_{}.html", key.suffix()))
    }

    pub fn screenshot_path(&self, key: SnapshotKey) -> PathBuf {
        key.dir(&self.root).join(format!("screenshot_{}.png", key.suffix()))
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    pub fn write_html(&self, key: SnapshotKey, html: &str) -> Result<PathBuf> {
        let path = self.html_path(key);
        write_creating_dirs(&path, html.as_bytes())?;
        Ok(path)
    }

    pub fn write_screenshot(&self, key: SnapshotKey, png: &[u8]) -> Result<PathBuf> {
        let path = self.screenshot_path(key);
        write_creating_dirs(&path, png)?;
        Ok(path)
    }

    /// Write `records` as JSON lines, replacing any previous log
    pub fn write_records(&self, records: &[ActionRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.records_path();
        let mut writer = BufWriter::new(File::create(&path)?);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Parse a log written by [`ActionRecorder::write_records`]
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<ActionRecord>> {
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(BrowserError::from))
            .collect()
    }
}

fn write_creating_dirs(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}
