//! Host probe backed by `sysinfo`, `statvfs` and a work directory walk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;
use walkdir::WalkDir;

use crate::domain::errors::ProbeError;
use crate::domain::ports::{DiskUsage, OutputActivity, ResourceProbe};

/// Samples one payload: its process tree and its work directory.
///
/// Every sample runs on the blocking pool; the caller bounds it with the
/// probe timeout.
#[derive(Clone)]
pub struct SystemProbe {
    workdir: PathBuf,
    pid: u32,
    output_files: Arc<Vec<String>>,
    /// Files the watchdog itself writes under `workdir`; never payload output
    ignored: Arc<Vec<PathBuf>>,
    /// Kept across samples so CPU usage has a previous reading to diff against
    system: Arc<Mutex<System>>,
}

/// Totals from one walk of the work directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub total_bytes: u64,
    pub largest_output: u64,
    pub newest_output: Option<SystemTime>,
}

impl SystemProbe {
    /// `output_files` restricts output activity to matching file names; empty
    /// means every file under `workdir` counts.
    pub fn new(workdir: impl Into<PathBuf>, pid: u32, output_files: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            pid,
            output_files: Arc::new(output_files),
            ignored: Arc::new(Vec::new()),
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Leave `paths` out of output activity. They still count as disk usage.
    #[must_use]
    pub fn with_ignored(mut self, paths: Vec<PathBuf>) -> Self {
        self.ignored = Arc::new(paths);
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run `f` against the refreshed process table on the blocking pool.
    async fn with_process_tree<T, F>(&self, f: F) -> Result<T, ProbeError>
    where
        T: Send + 'static,
        F: FnOnce(&System, &[Pid]) -> T + Send + 'static,
    {
        let system = Arc::clone(&self.system);
        let root = self.pid;

        tokio::task::spawn_blocking(move || {
            let mut sys = system
                .lock()
                .map_err(|e| ProbeError::Unavailable(format!("process table lock poisoned: {e}")))?;
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::new().with_memory().with_cpu(),
            );

            let tree = process_tree(&sys, Pid::from_u32(root));
            if tree.is_empty() {
                return Err(ProbeError::ProcessNotFound(root));
            }
            Ok(f(&sys, &tree))
        })
        .await
        .map_err(|e| ProbeError::Unavailable(format!("probe task failed: {e}")))?
    }
}

#[async_trait]
impl ResourceProbe for SystemProbe {
    async fn disk_usage(&self) -> Result<DiskUsage, ProbeError> {
        let workdir = self.workdir.clone();

        tokio::task::spawn_blocking(move || {
            let stat = nix::sys::statvfs::statvfs(workdir.as_path())
                .map_err(|e| ProbeError::Io(std::io::Error::from(e)))?;
            #[allow(clippy::unnecessary_cast)]
            let available = stat.blocks_available() as u64 * stat.fragment_size() as u64;
            let used = walk(&workdir, &[], &[]).ok().map(|stats| stats.total_bytes);

            trace!(workdir = %workdir.display(), available, used = ?used, "disk sampled");
            Ok(DiskUsage { available, used })
        })
        .await
        .map_err(|e| ProbeError::Unavailable(format!("probe task failed: {e}")))?
    }

    async fn memory_used(&self) -> Result<u64, ProbeError> {
        self.with_process_tree(|sys, tree| {
            tree.iter()
                .filter_map(|pid| sys.process(*pid))
                .map(sysinfo::Process::memory)
                .sum()
        })
        .await
    }

    async fn cpu_used(&self) -> Result<f32, ProbeError> {
        self.with_process_tree(|sys, tree| {
            tree.iter()
                .filter_map(|pid| sys.process(*pid))
                .map(sysinfo::Process::cpu_usage)
                .sum()
        })
        .await
    }

    async fn output_activity(&self) -> Result<OutputActivity, ProbeError> {
        let workdir = self.workdir.clone();
        let output_files = Arc::clone(&self.output_files);
        let ignored = Arc::clone(&self.ignored);

        tokio::task::spawn_blocking(move || {
            let stats = walk(&workdir, &output_files, &ignored)?;
            Ok(OutputActivity {
                last_modified: stats.newest_output.map(DateTime::<Utc>::from),
                largest_file: stats.largest_output,
            })
        })
        .await
        .map_err(|e| ProbeError::Unavailable(format!("probe task failed: {e}")))?
    }
}

/// `root` and all of its descendants currently in the process table.
fn process_tree(sys: &System, root: Pid) -> Vec<Pid> {
    if sys.process(root).is_none() {
        return Vec::new();
    }

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut tree = Vec::new();
    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        tree.push(pid);
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().copied());
        }
    }
    tree
}

/// Walk `root`, summing every file and tracking the output files.
///
/// Unreadable entries below the root are skipped; only an unreadable root is
/// an error. Symlinks are not followed. Paths in `ignored` count towards the
/// total but never as output.
pub fn walk(
    root: &Path,
    output_files: &[String],
    ignored: &[PathBuf],
) -> Result<WalkStats, ProbeError> {
    let mut stats = WalkStats::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(ProbeError::Io(e.into())),
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        stats.total_bytes = stats.total_bytes.saturating_add(metadata.len());

        if ignored.iter().any(|path| path == entry.path()) {
            continue;
        }
        let counts = output_files.is_empty()
            || output_files
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == name.as_str());
        if counts {
            stats.largest_output = stats.largest_output.max(metadata.len());
            if let Ok(modified) = metadata.modified() {
                stats.newest_output = Some(
                    stats
                        .newest_output
                        .map_or(modified, |newest| newest.max(modified)),
                );
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::JobState;
    use crate::infrastructure::journal::{JobJournal, JournalEntry};
    use tempfile::TempDir;

    #[test]
    fn test_walk_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.log"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.root"), vec![0u8; 300]).unwrap();

        let stats = walk(dir.path(), &[], &[]).unwrap();
        assert_eq!(stats.total_bytes, 400);
        assert_eq!(stats.largest_output, 300);
        assert!(stats.newest_output.is_some());
    }

    #[test]
    fn test_walk_filters_output_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("payload.stdout"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("big.tmp"), vec![0u8; 1000]).unwrap();

        let stats = walk(dir.path(), &["payload.stdout".to_string()], &[]).unwrap();
        assert_eq!(stats.total_bytes, 1010);
        assert_eq!(stats.largest_output, 10);
    }

    #[test]
    fn test_walk_missing_root_errors() {
        assert!(matches!(
            walk(Path::new("/nonexistent/workdir"), &[], &[]),
            Err(ProbeError::Io(_))
        ));
    }

    #[test]
    fn test_walk_skips_ignored_files_as_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("payload.out"), vec![0u8; 10]).unwrap();
        let journal = dir.path().join("pilot_journal.jsonl");
        std::fs::write(&journal, vec![0u8; 500]).unwrap();

        let stats = walk(dir.path(), &[], &[journal]).unwrap();
        assert_eq!(stats.total_bytes, 510);
        assert_eq!(stats.largest_output, 10);
    }

    #[tokio::test]
    async fn test_journal_writes_are_not_output_activity() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("payload.out");
        std::fs::write(&output, b"event 1\n").unwrap();
        let an_hour_ago = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&output)
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();

        let journal_path = dir.path().join("pilot_journal.jsonl");
        let journal = JobJournal::open(&journal_path).await.unwrap();
        let state = JobState::new("1", "SCORE", Utc::now());
        journal
            .record(&JournalEntry::measurement(&state, Utc::now()))
            .unwrap();

        let probe = SystemProbe::new(dir.path(), std::process::id(), vec![])
            .with_ignored(vec![journal_path]);
        let half_an_hour_ago = Utc::now() - chrono::Duration::minutes(30);
        let activity = probe.output_activity().await.unwrap();
        assert!(activity.last_modified.unwrap() < half_an_hour_ago);

        let unfiltered = SystemProbe::new(dir.path(), std::process::id(), vec![]);
        let activity = unfiltered.output_activity().await.unwrap();
        assert!(activity.last_modified.unwrap() > half_an_hour_ago);
    }

    #[tokio::test]
    async fn test_own_process_is_visible() {
        let dir = TempDir::new().unwrap();
        let probe = SystemProbe::new(dir.path(), std::process::id(), vec![]);

        assert!(probe.memory_used().await.unwrap() > 0);
        assert!(probe.cpu_used().await.unwrap() >= 0.0);
        assert!(probe.disk_usage().await.unwrap().available > 0);
    }

    #[tokio::test]
    async fn test_missing_process_is_reported() {
        let dir = TempDir::new().unwrap();
        let probe = SystemProbe::new(dir.path(), u32::MAX - 1, vec![]);
        assert!(matches!(
            probe.memory_used().await,
            Err(ProbeError::ProcessNotFound(_))
        ));
    }
}
