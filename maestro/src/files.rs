//! Per-agent file-change tracking: read/modified path sets accumulated from
//! post-tool hooks, rendered into a dossier when a command finishes.

use crate::git::{self, FileStatus};
use crate::summarizer::Summarizer;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;
use ws_event::utc_now_rfc3339;

/// Tools whose payloads can modify files (when they carry a path).
const FILE_MODIFYING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "Bash"];
const FILE_READING_TOOLS: &[&str] = &["Read"];

/// Diff text embedded in summarization prompts is capped here.
const DIFF_PROMPT_CAP: usize = 2000;

#[derive(Clone, Debug, Serialize)]
pub struct FileChange {
    pub path: String,
    pub absolute_path: String,
    pub status: String,
    pub lines_added: u32,
    pub lines_removed: u32,
    pub diff: Option<String>,
    pub summary: Option<String>,
    pub agent_id: String,
    pub agent_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileRead {
    pub path: String,
    pub absolute_path: String,
    pub line_count: usize,
    pub agent_id: String,
    pub agent_name: String,
}

#[derive(Default)]
struct TrackerState {
    modified: HashSet<String>,
    read: HashSet<String>,
    /// Last tool input seen per modified path.
    details: HashMap<String, Value>,
}

pub struct FileTracker {
    agent_id: Uuid,
    agent_name: String,
    working_dir: PathBuf,
    state: Mutex<TrackerState>,
}

impl FileTracker {
    pub fn new(agent_id: Uuid, agent_name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_id,
            agent_name: agent_name.into(),
            working_dir: working_dir.into(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Classifies one tool invocation. Write/Edit/MultiEdit/Bash payloads
    /// carrying a `file_path` count as modifications, Read as a read;
    /// everything else is ignored. Paths are deduplicated by set membership.
    pub fn observe_tool(&self, tool_name: &str, tool_input: &Value) {
        let Some(file_path) = tool_input.get("file_path").and_then(Value::as_str) else {
            return;
        };
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("file tracker lock poisoned: {e}");
                return;
            }
        };
        if FILE_MODIFYING_TOOLS.contains(&tool_name) {
            state.modified.insert(file_path.to_string());
            state
                .details
                .entry(file_path.to_string())
                .or_insert_with(|| json!({"tool_name": tool_name, "tool_input": tool_input}));
        } else if FILE_READING_TOOLS.contains(&tool_name) {
            state.read.insert(file_path.to_string());
        }
    }

    pub fn modified_files(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.modified.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn read_files(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.read.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_activity(&self) -> bool {
        self.state
            .lock()
            .map(|s| !s.modified.is_empty() || !s.read.is_empty())
            .unwrap_or(false)
    }

    fn display_path(&self, abs: &Path) -> String {
        abs.strip_prefix(&self.working_dir)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| abs.to_string_lossy().into_owned())
    }

    /// Builds the per-file change records: diff, stats, status, and a
    /// best-effort one-line summary.
    pub async fn generate_file_changes(&self, summarizer: &Summarizer) -> Vec<FileChange> {
        let (paths, details) = {
            let state = match self.state.lock() {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            };
            (
                state.modified.iter().cloned().collect::<Vec<_>>(),
                state.details.clone(),
            )
        };

        let mut changes = Vec::new();
        for path in paths {
            let abs = git::resolve_absolute_path(&path, &self.working_dir);
            let diff = git::file_diff(&path, &self.working_dir).await;
            let (added, removed) = diff.as_deref().map(git::parse_diff_stats).unwrap_or((0, 0));
            let status = if git::is_git_repository(&self.working_dir) {
                git::file_status(&path, &self.working_dir).await
            } else {
                FileStatus::Modified
            };

            let tool_name = details
                .get(&path)
                .and_then(|d| d.get("tool_name"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            let summary = self
                .summarize_change(summarizer, &path, diff.as_deref(), &tool_name)
                .await;

            changes.push(FileChange {
                path: self.display_path(&abs),
                absolute_path: abs.to_string_lossy().into_owned(),
                status: status.as_str().to_string(),
                lines_added: added,
                lines_removed: removed,
                diff,
                summary: Some(summary),
                agent_id: self.agent_id.to_string(),
                agent_name: self.agent_name.clone(),
            });
        }
        changes
    }

    async fn summarize_change(
        &self,
        summarizer: &Summarizer,
        path: &str,
        diff: Option<&str>,
        tool_name: &str,
    ) -> String {
        let basename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let Some(diff) = diff.filter(|d| !d.trim().is_empty()) else {
            return format!("{tool_name} operation on {basename}");
        };

        let truncated = if diff.len() > DIFF_PROMPT_CAP {
            let mut end = DIFF_PROMPT_CAP;
            while !diff.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}\n[...truncated]", &diff[..end])
        } else {
            diff.to_string()
        };
        let details = format!("File: {basename}\nTool: {tool_name}\nDiff:\n{truncated}");
        let summary = summarizer
            .summarize_event(&json!({"details": details}), "FileChange")
            .await;
        if summary == "File changed" {
            // Summarizer fell back; derive a heuristic line instead.
            let (added, removed) = git::parse_diff_stats(diff);
            return format!("Modified {basename} (+{added} -{removed} lines)");
        }
        summary.chars().take(200).collect()
    }

    /// Read-file records with line counts.
    pub async fn generate_read_files(&self) -> Vec<FileRead> {
        let paths = self.read_files();
        let mut reads = Vec::new();
        for path in paths {
            let abs = git::resolve_absolute_path(&path, &self.working_dir);
            let line_count = git::count_file_lines(&path, &self.working_dir).await;
            reads.push(FileRead {
                path: self.display_path(&abs),
                absolute_path: abs.to_string_lossy().into_owned(),
                line_count,
                agent_id: self.agent_id.to_string(),
                agent_name: self.agent_name.clone(),
            });
        }
        reads
    }

    /// The dossier merged into the closing text block's payload and carried
    /// by the `FileTrackingBlock` broadcast.
    pub fn dossier(changes: &[FileChange], reads: &[FileRead]) -> Value {
        json!({
            "file_changes": changes,
            "read_files": reads,
            "total_files_modified": changes.len(),
            "total_files_read": reads.len(),
            "generated_at": utc_now_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FileTracker {
        FileTracker::new(Uuid::new_v4(), "worker1", "/tmp")
    }

    #[test]
    fn write_tool_tracks_one_unique_modified_path() {
        let t = tracker();
        t.observe_tool("Write", &json!({"file_path": "X"}));
        t.observe_tool("Write", &json!({"file_path": "X"}));
        assert_eq!(t.modified_files(), vec!["X".to_string()]);
        assert!(t.read_files().is_empty());
    }

    #[test]
    fn read_tool_tracks_read_set() {
        let t = tracker();
        t.observe_tool("Read", &json!({"file_path": "src/lib.rs"}));
        assert_eq!(t.read_files(), vec!["src/lib.rs".to_string()]);
        assert!(t.modified_files().is_empty());
    }

    #[test]
    fn unknown_tools_and_pathless_payloads_are_ignored() {
        let t = tracker();
        t.observe_tool("Glob", &json!({"file_path": "X"}));
        t.observe_tool("Write", &json!({"content": "no path"}));
        assert!(!t.has_activity());
    }

    #[test]
    fn first_tool_input_is_kept_per_path() {
        let t = tracker();
        t.observe_tool("Write", &json!({"file_path": "X", "content": "v1"}));
        t.observe_tool("Edit", &json!({"file_path": "X", "content": "v2"}));
        let state = t.state.lock().unwrap();
        assert_eq!(state.details["X"]["tool_name"], "Write");
    }

    #[test]
    fn dossier_shape() {
        let d = FileTracker::dossier(&[], &[]);
        assert_eq!(d["total_files_modified"], 0);
        assert_eq!(d["total_files_read"], 0);
        assert!(d["generated_at"].is_string());
    }
}
