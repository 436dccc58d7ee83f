//! Git helpers for the file-change tracker: unified diffs, diff stats, and
//! working-tree status, all via the `git` binary with short timeouts.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Working-tree status of one tracked path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Created,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Created => "created",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
        }
    }
}

/// True when `dir` or any ancestor contains a `.git` directory.
pub fn is_git_repository(dir: &Path) -> bool {
    let mut current = dir.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return true;
        }
        if !current.pop() {
            return false;
        }
    }
}

/// Resolves `file_path` to an absolute path under `working_dir`, following
/// symlinks when the target exists.
pub fn resolve_absolute_path(file_path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    let joined = if path.is_absolute() { path.to_path_buf() } else { working_dir.join(path) };
    joined.canonicalize().unwrap_or(joined)
}

async fn run_git(args: &[&str], cwd: &Path) -> Option<std::process::Output> {
    let fut = Command::new("git").args(args).current_dir(cwd).output();
    match tokio::time::timeout(GIT_TIMEOUT, fut).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            tracing::warn!("git {:?} failed to spawn: {e}", args.first());
            None
        }
        Err(_) => {
            tracing::warn!("git {:?} timed out", args.first());
            None
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    path.strip_prefix(&base)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

/// Unified diff for a file against HEAD. Untracked files are diffed against
/// `/dev/null` so new content still shows up. `None` when git is unusable.
pub async fn file_diff(file_path: &str, working_dir: &Path) -> Option<String> {
    if !is_git_repository(working_dir) {
        return None;
    }
    let abs = resolve_absolute_path(file_path, working_dir);
    let rel = relative_to(&abs, working_dir);

    let output = run_git(&["diff", "HEAD", "--", &rel], working_dir).await?;
    if output.status.success() {
        let diff = String::from_utf8_lossy(&output.stdout).into_owned();
        if !diff.trim().is_empty() {
            return Some(diff);
        }
        // Empty diff: likely untracked. `git diff --no-index` exits 1 when
        // the files differ, which is the expected case here.
        let output = run_git(&["diff", "--no-index", "/dev/null", &rel], working_dir).await?;
        let code = output.status.code().unwrap_or(-1);
        if code == 0 || code == 1 {
            return Some(String::from_utf8_lossy(&output.stdout).into_owned());
        }
    }
    None
}

/// Counts added/removed lines in a unified diff, excluding the `+++`/`---`
/// file headers.
pub fn parse_diff_stats(diff: &str) -> (u32, u32) {
    let mut added = 0;
    let mut removed = 0;
    for line in diff.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }
    (added, removed)
}

/// Status from `git status --porcelain`: `??`/`A` are created, `D` deleted,
/// anything else tracked counts as modified. A missing file is deleted.
pub async fn file_status(file_path: &str, working_dir: &Path) -> FileStatus {
    let abs = resolve_absolute_path(file_path, working_dir);
    if !abs.exists() {
        return FileStatus::Deleted;
    }
    let rel = relative_to(&abs, working_dir);

    let Some(output) = run_git(&["status", "--porcelain", "--", &rel], working_dir).await else {
        return FileStatus::Modified;
    };
    if !output.status.success() {
        return FileStatus::Modified;
    }
    let line = String::from_utf8_lossy(&output.stdout);
    let code: Vec<char> = line.chars().take(2).collect();
    if code.len() < 2 {
        return FileStatus::Modified;
    }
    if code[0] == '?' && code[1] == '?' {
        return FileStatus::Created;
    }
    if code[0] == 'A' || code[1] == 'A' {
        return FileStatus::Created;
    }
    if code[0] == 'D' || code[1] == 'D' {
        return FileStatus::Deleted;
    }
    FileStatus::Modified
}

/// Total lines in a file; 0 when unreadable.
pub async fn count_file_lines(file_path: &str, working_dir: &Path) -> usize {
    let abs = resolve_absolute_path(file_path, working_dir);
    match tokio::fs::read_to_string(&abs).await {
        Ok(content) => content.lines().count(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_stats_skip_file_headers() {
        let diff = "\
--- a/foo.rs
+++ b/foo.rs
@@ -1,3 +1,4 @@
-old line
+new line
+another new line
 context
";
        assert_eq!(parse_diff_stats(diff), (2, 1));
    }

    #[test]
    fn diff_stats_empty_input() {
        assert_eq!(parse_diff_stats(""), (0, 0));
    }

    #[test]
    fn absolute_paths_pass_through() {
        let wd = Path::new("/tmp");
        assert_eq!(
            resolve_absolute_path("/etc/hosts", wd),
            Path::new("/etc/hosts").canonicalize().unwrap_or_else(|_| "/etc/hosts".into())
        );
    }

    #[test]
    fn relative_paths_resolve_under_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_absolute_path("sub/file.txt", dir.path());
        assert!(resolved.ends_with("sub/file.txt"));
        assert!(resolved.is_absolute());
    }

    #[tokio::test]
    async fn missing_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_status("nope.txt", dir.path()).await, FileStatus::Deleted);
    }

    #[tokio::test]
    async fn count_lines_of_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(count_file_lines("missing.txt", dir.path()).await, 0);
    }

    #[tokio::test]
    async fn count_lines_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\n").unwrap();
        assert_eq!(count_file_lines("f.txt", dir.path()).await, 3);
    }

    #[test]
    fn non_repo_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        // A temp dir may live under a repo-less path; only assert the
        // positive case deterministically.
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(nested.join(".git")).unwrap();
        assert!(is_git_repository(&nested));
    }
}
