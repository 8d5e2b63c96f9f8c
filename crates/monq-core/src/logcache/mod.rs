//! The bounded in-memory index over the monitoring history.
//!
//! One mutex guards the index, the message count and eviction. Queries go
//! through [`LogCache::apply`], which locks, lazily rebuilds the file
//! index after a rotation, and hands out a view. Entries are loaded on
//! demand per class mask; a cap on cached messages is enforced by a
//! three-phase purge that never touches the in-mask entries of the file a
//! query is currently reading.

pub mod entry;
pub mod logfile;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::core::MonitoringCore;
use entry::{LogClasses, LogEntry};
use logfile::{CachePressure, LogKey, LogRestrictions, Logfile, log_eviction_shortfall};

/// Re-check the cache pressure only after this many additional messages.
const CHECK_CYCLE: usize = 1000;

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct CacheInner {
    files: BTreeMap<i64, Logfile>,
    num_cached: usize,
    num_at_last_check: usize,
    last_index_update: Option<i64>,
}

impl CacheInner {
    fn update(&mut self, core: &dyn MonitoringCore) {
        if !self.files.is_empty()
            && core.last_logfile_rotation() <= self.last_index_update.unwrap_or(i64::MIN)
        {
            return;
        }
        info!("updating log file index");
        self.files.clear();
        self.num_cached = 0;
        self.num_at_last_check = 0;
        self.last_index_update = Some(epoch_now());

        let paths = core.paths();
        self.add_to_index(&paths.history_file, true);
        match std::fs::read_dir(&paths.history_archive_directory) {
            Ok(dir) => {
                for dir_entry in dir.flatten() {
                    self.add_to_index(&dir_entry.path(), false);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "updating log file index"),
        }
        if self.files.is_empty() {
            warn!(
                history_file = %paths.history_file.display(),
                "no log file found"
            );
        }
    }

    fn add_to_index(&mut self, path: &Path, watch: bool) {
        match Logfile::new(path, watch) {
            Ok(log_file) => {
                let since = log_file.since();
                if self.files.contains_key(&since) {
                    // the user copied files around by hand
                    warn!(path = %path.display(), "ignoring duplicate log file");
                } else {
                    self.files.insert(since, log_file);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no such log file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring log file"),
        }
    }
}

/// The pressure hook active while one file loads. That file is detached
/// from the map, so the purge can walk every *other* file freely.
struct EvictionCx<'x> {
    files: &'x mut BTreeMap<i64, Logfile>,
    num_cached: &'x mut usize,
    num_at_last_check: &'x mut usize,
    max_cached: usize,
    current_since: i64,
}

impl EvictionCx<'_> {
    fn within_budget(&mut self) -> bool {
        if *self.num_cached <= self.max_cached {
            *self.num_at_last_check = *self.num_cached;
            return true;
        }
        false
    }
}

impl CachePressure for EvictionCx<'_> {
    fn message_added(&mut self, current: &mut Logfile, query_classes: LogClasses) {
        *self.num_cached += 1;
        if *self.num_cached <= self.max_cached {
            return;
        }
        // freeing costs CPU; skip the attempt until the cache has grown by
        // a full cycle since the last one
        if *self.num_cached < *self.num_at_last_check + CHECK_CYCLE {
            return;
        }

        // [1] flush whole files older than the one being read, oldest first
        let older: Vec<i64> = self
            .files
            .keys()
            .copied()
            .filter(|k| *k < self.current_since)
            .collect();
        for key in older {
            let Some(file) = self.files.get_mut(&key) else {
                continue;
            };
            if file.size() > 0 {
                *self.num_cached -= file.free_messages(LogClasses::all());
                if self.within_budget() {
                    return;
                }
            }
        }

        // [2] from the current file onwards, drop the classes the current
        // query does not need
        let droppable = !query_classes;
        if !(current.classes_read() & droppable).is_empty() {
            debug!(file = %current.path().display(), "freeing classes outside the query mask");
            *self.num_cached -= current.free_messages(droppable);
            if self.within_budget() {
                return;
            }
        }
        let newer: Vec<i64> = self
            .files
            .keys()
            .copied()
            .filter(|k| *k > self.current_since)
            .collect();
        for key in &newer {
            let Some(file) = self.files.get_mut(key) else {
                continue;
            };
            if file.size() > 0 && !(file.classes_read() & droppable).is_empty() {
                *self.num_cached -= file.free_messages(droppable);
                if self.within_budget() {
                    return;
                }
            }
        }

        // [3] flush whole files newer than the current one, oldest first
        for key in &newer {
            let Some(file) = self.files.get_mut(key) else {
                continue;
            };
            if file.size() > 0 {
                debug!(file = %file.path().display(), entries = file.size(), "flushing newer log file");
                *self.num_cached -= file.free_messages(LogClasses::all());
                if self.within_budget() {
                    return;
                }
            }
        }

        *self.num_at_last_check = *self.num_cached;
        log_eviction_shortfall(*self.num_cached, self.max_cached);
    }
}

/// The locked view handed to `apply` callbacks.
pub struct LogFiles<'a> {
    inner: &'a mut CacheInner,
    max_cached_messages: usize,
}

impl LogFiles<'_> {
    pub fn is_empty(&self) -> bool {
        self.inner.files.is_empty()
    }

    /// Index keys (first-entry timestamps), oldest first.
    pub fn keys(&self) -> Vec<i64> {
        self.inner.files.keys().copied().collect()
    }

    pub fn num_cached(&self) -> usize {
        self.inner.num_cached
    }

    pub fn watched(&self, key: i64) -> bool {
        self.inner
            .files
            .get(&key)
            .map(|f| f.watched())
            .unwrap_or(false)
    }

    /// Entries of one file, loading the requested classes first. The
    /// returned map stays valid until the next `entries` call; eviction
    /// during the load never drops in-mask entries of this file.
    pub fn entries(
        &mut self,
        key: i64,
        restrictions: &LogRestrictions,
    ) -> Option<&BTreeMap<LogKey, LogEntry>> {
        let mut file = self.inner.files.remove(&key)?;
        {
            let mut cx = EvictionCx {
                files: &mut self.inner.files,
                num_cached: &mut self.inner.num_cached,
                num_at_last_check: &mut self.inner.num_at_last_check,
                max_cached: self.max_cached_messages,
                current_since: key,
            };
            file.load(restrictions, &mut cx);
        }
        self.inner.files.insert(key, file);
        self.inner.files.get(&key).map(|f| f.entries())
    }
}

#[derive(Debug, Default)]
pub struct LogCache {
    inner: Mutex<CacheInner>,
}

impl LogCache {
    pub fn new() -> LogCache {
        LogCache::default()
    }

    /// Run `f` with a locked, up-to-date view of the index.
    pub fn apply<R>(&self, core: &dyn MonitoringCore, f: impl FnOnce(&mut LogFiles) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        inner.update(core);
        let mut view = LogFiles {
            inner: &mut inner,
            max_cached_messages: core.limits().max_cached_messages,
        };
        f(&mut view)
    }

    pub fn num_cached_messages(&self, core: &dyn MonitoringCore) -> usize {
        self.apply(core, |view| view.num_cached())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use super::*;
    use crate::testing::TestCore;

    fn write_log_file(path: &Path, start: i64, count: usize) {
        let mut f = std::fs::File::create(path).unwrap();
        for i in 0..count {
            writeln!(
                f,
                "[{}] HOST ALERT: h{};DOWN;HARD;1;output {i}",
                start + i as i64,
                i % 7
            )
            .unwrap();
        }
    }

    fn core_with_history(dir: &Path, archives: &[(i64, usize)], current: (i64, usize)) -> TestCore {
        let archive_dir = dir.join("archive");
        std::fs::create_dir_all(&archive_dir).unwrap();
        for (i, (start, count)) in archives.iter().enumerate() {
            write_log_file(&archive_dir.join(format!("history-{i}.log")), *start, *count);
        }
        let history = dir.join("history");
        write_log_file(&history, current.0, current.1);
        let mut core = TestCore::new();
        core.paths.history_file = history;
        core.paths.history_archive_directory = archive_dir;
        core
    }

    fn alert_restrictions() -> LogRestrictions {
        LogRestrictions {
            max_lines_per_log_file: 1_000_000,
            classes: LogClasses::ALERT,
        }
    }

    #[test]
    fn index_is_keyed_by_first_entry_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_with_history(dir.path(), &[(1000, 5), (2000, 5)], (3000, 5));
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            assert_eq!(files.keys(), vec![1000, 2000, 3000]);
            assert!(files.watched(3000));
            assert!(!files.watched(1000));
        });
    }

    #[test]
    fn entries_load_lazily_and_count_into_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_with_history(dir.path(), &[(1000, 10)], (2000, 3));
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            assert_eq!(files.num_cached(), 0);
            let entries = files.entries(1000, &alert_restrictions()).unwrap();
            assert_eq!(entries.len(), 10);
            assert_eq!(files.num_cached(), 10);
            // a second access does not double-count
            let entries = files.entries(1000, &alert_restrictions()).unwrap();
            assert_eq!(entries.len(), 10);
            assert_eq!(files.num_cached(), 10);
        });
    }

    #[test]
    fn eviction_flushes_older_files_first() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_with_history(
            dir.path(),
            &[(10_000, 1200), (20_000, 1200)],
            (30_000, 1200),
        );
        let mut core = core;
        core.limits.max_cached_messages = 1500;
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            for key in files.keys() {
                files.entries(key, &alert_restrictions());
            }
            assert!(
                files.num_cached() <= 1500,
                "still {} cached",
                files.num_cached()
            );
            // the newest (current) file survived intact
            let entries = files.entries(30_000, &alert_restrictions()).unwrap();
            assert_eq!(entries.len(), 1200);
        });
    }

    #[test]
    fn a_single_file_may_exceed_the_cap_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_history(dir.path(), &[], (10_000, 2200));
        core.limits.max_cached_messages = 1000;
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            let entries = files.entries(10_000, &alert_restrictions()).unwrap();
            // nothing else to evict: the file in use is never truncated
            assert_eq!(entries.len(), 2200);
        });
    }

    #[test]
    fn unparseable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_history(dir.path(), &[(1000, 3)], (2000, 3));
        std::fs::write(
            core.paths.history_archive_directory.join("garbage"),
            "not a log line\n",
        )
        .unwrap();
        core.limits.max_cached_messages = 1000;
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            assert_eq!(files.keys(), vec![1000, 2000]);
        });
    }

    #[test]
    fn rotation_triggers_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_history(dir.path(), &[], (1000, 3));
        let cache = LogCache::new();
        cache.apply(&core, |files| {
            assert_eq!(files.keys(), vec![1000]);
        });
        // a new archive appears and the core reports a rotation
        write_log_file(
            &core.paths.history_archive_directory.join("history-9.log"),
            500,
            3,
        );
        cache.apply(&core, |files| {
            // no rotation signal: the stale index stays
            assert_eq!(files.keys(), vec![1000]);
        });
        core.last_rotation = epoch_now() + 10;
        cache.apply(&core, |files| {
            assert_eq!(files.keys(), vec![500, 1000]);
        });
    }
}
