//! One history file and its in-memory entries.
//!
//! Entries are keyed by `(timestamp, line number)` and present only for the
//! classes that have been loaded so far (`classes_read`). The current
//! history file is *watched*: it may grow, so appended lines are picked up
//! from the remembered read position on every load.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use super::entry::{LogClasses, LogEntry};

/// Key of one entry: strictly chronological, line number breaking ties.
pub type LogKey = (i64, usize);

/// What a query asks the cache to load.
#[derive(Debug, Clone, Copy)]
pub struct LogRestrictions {
    pub max_lines_per_log_file: usize,
    pub classes: LogClasses,
}

/// Callback target for per-insertion cache pressure checks. Implemented by
/// the cache, which may free entries of *other* files while one file loads.
pub trait CachePressure {
    fn message_added(&mut self, current: &mut Logfile, query_classes: LogClasses);
}

#[derive(Debug)]
pub struct Logfile {
    path: PathBuf,
    since: i64,
    watch: bool,
    read_pos: u64,
    lineno: usize,
    classes_read: LogClasses,
    entries: BTreeMap<LogKey, LogEntry>,
}

impl Logfile {
    /// Probe the file's first line for the index key. Unreadable files and
    /// files without a parseable first timestamp are errors; the cache
    /// skips them.
    pub fn new(path: &Path, watch: bool) -> io::Result<Logfile> {
        let file = File::open(path)?;
        let mut first_line = String::new();
        BufReader::new(file).read_line(&mut first_line)?;
        let entry = LogEntry::parse(0, first_line.trim_end().to_string()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cannot determine first timestamp of {}: {e}", path.display()),
            )
        })?;
        Ok(Logfile {
            path: path.to_path_buf(),
            since: entry.time(),
            watch,
            read_pos: 0,
            lineno: 0,
            classes_read: LogClasses::empty(),
            entries: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn since(&self) -> i64 {
        self.since
    }

    pub fn watched(&self) -> bool {
        self.watch
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn classes_read(&self) -> LogClasses {
        self.classes_read
    }

    pub fn entries(&self) -> &BTreeMap<LogKey, LogEntry> {
        &self.entries
    }

    /// Drop all in-memory entries of the given classes. Returns how many
    /// were freed.
    pub fn free_messages(&mut self, classes: LogClasses) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !classes.contains(entry.class().as_mask()));
        self.classes_read &= !classes;
        before - self.entries.len()
    }

    /// Make sure all classes of `restrictions` are in memory, then expose
    /// the entries. The pressure callback runs after every insertion.
    pub fn load(&mut self, restrictions: &LogRestrictions, pressure: &mut dyn CachePressure) {
        let missing = restrictions.classes & !self.classes_read;
        if self.watch {
            let mut file = match File::open(&self.path) {
                Ok(f) => BufReader::new(f),
                Err(e) => {
                    info!(path = %self.path.display(), error = %e, "cannot open log file");
                    return;
                }
            };
            if self.lineno == 0 {
                self.read_pos = 0;
            }
            // the file may have grown; finish the classes we already track
            if !self.classes_read.is_empty() {
                if file.seek(SeekFrom::Start(self.read_pos)).is_ok() {
                    let classes = self.classes_read;
                    self.load_range(&mut file, classes, restrictions, pressure);
                    self.read_pos = file.stream_position().unwrap_or(self.read_pos);
                }
            }
            if !missing.is_empty() {
                if file.seek(SeekFrom::Start(0)).is_ok() {
                    self.lineno = 0;
                    self.load_range(&mut file, missing, restrictions, pressure);
                    self.classes_read |= missing;
                    self.read_pos = file.stream_position().unwrap_or(self.read_pos);
                }
            }
        } else {
            if missing.is_empty() {
                return;
            }
            let mut file = match File::open(&self.path) {
                Ok(f) => BufReader::new(f),
                Err(e) => {
                    info!(path = %self.path.display(), error = %e, "cannot open log file");
                    return;
                }
            };
            self.lineno = 0;
            self.load_range(&mut file, missing, restrictions, pressure);
            self.classes_read |= missing;
        }
    }

    fn load_range(
        &mut self,
        file: &mut BufReader<File>,
        classes: LogClasses,
        restrictions: &LogRestrictions,
        pressure: &mut dyn CachePressure,
    ) {
        let mut line = String::new();
        loop {
            line.clear();
            match file.read_line(&mut line) {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) => {
                    info!(path = %self.path.display(), error = %e, "error reading log file");
                    return;
                }
            }
            if self.lineno >= restrictions.max_lines_per_log_file {
                error!(
                    path = %self.path.display(),
                    max = restrictions.max_lines_per_log_file,
                    "too many lines in log file, ignoring the rest"
                );
                return;
            }
            self.lineno += 1;
            if self.process_log_line(self.lineno, line.trim_end_matches(['\n', '\r']), classes) {
                pressure.message_added(self, restrictions.classes);
            }
        }
    }

    fn process_log_line(&mut self, lineno: usize, line: &str, classes: LogClasses) -> bool {
        let entry = match LogEntry::parse(lineno, line.to_string()) {
            Ok(entry) => entry,
            // invalid lines are simply dropped
            Err(_) => return false,
        };
        if !classes.contains(entry.class().as_mask()) {
            return false;
        }
        let key = (entry.time(), entry.lineno());
        if self.entries.contains_key(&key) {
            // the line number makes keys unique; a duplicate means the file
            // changed underneath us
            error!(line = entry.message(), "strange duplicate log line");
            return false;
        }
        self.entries.insert(key, entry);
        true
    }
}

impl std::fmt::Display for Logfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "log file {} (starts at timestamp {})",
            self.path.display(),
            self.since
        )
    }
}

/// Debug helper used when the eviction cannot free enough.
pub(super) fn log_eviction_shortfall(num_cached: usize, max_cached: usize) {
    debug!(
        loaded = num_cached,
        max = max_cached,
        "cannot unload more messages"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct NoPressure;

    impl CachePressure for NoPressure {
        fn message_added(&mut self, _current: &mut Logfile, _query_classes: LogClasses) {}
    }

    fn write_log(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    fn restrictions(classes: LogClasses) -> LogRestrictions {
        LogRestrictions {
            max_lines_per_log_file: 1000,
            classes,
        }
    }

    #[test]
    fn since_is_the_first_entry_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "history",
            &["[1000] HOST ALERT: a;UP;HARD;1;fine", "[1500] whatever"],
        );
        let lf = Logfile::new(&path, false).unwrap();
        assert_eq!(lf.since(), 1000);
        assert!(Logfile::new(&dir.path().join("history2"), false).is_err());
    }

    #[test]
    fn loads_only_requested_classes_and_tops_up_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "history",
            &[
                "[1000] HOST ALERT: a;DOWN;HARD;1;x",
                "[1001] some info line",
                "[1002] SERVICE ALERT: a;S;OK;HARD;1;y",
            ],
        );
        let mut lf = Logfile::new(&path, false).unwrap();
        lf.load(&restrictions(LogClasses::ALERT), &mut NoPressure);
        assert_eq!(lf.size(), 2);
        assert_eq!(lf.classes_read(), LogClasses::ALERT);

        lf.load(&restrictions(LogClasses::ALERT | LogClasses::INFO), &mut NoPressure);
        assert_eq!(lf.size(), 3);

        // a second identical load is a no-op
        lf.load(&restrictions(LogClasses::ALERT | LogClasses::INFO), &mut NoPressure);
        assert_eq!(lf.size(), 3);
    }

    #[test]
    fn watched_file_picks_up_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "history", &["[1000] HOST ALERT: a;DOWN;HARD;1;x"]);
        let mut lf = Logfile::new(&path, true).unwrap();
        lf.load(&restrictions(LogClasses::ALERT), &mut NoPressure);
        assert_eq!(lf.size(), 1);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "[1100] HOST ALERT: b;UP;HARD;1;ok").unwrap();
        drop(f);

        lf.load(&restrictions(LogClasses::ALERT), &mut NoPressure);
        assert_eq!(lf.size(), 2);
    }

    #[test]
    fn free_messages_removes_only_the_given_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "history",
            &[
                "[1000] HOST ALERT: a;DOWN;HARD;1;x",
                "[1001] some info line",
            ],
        );
        let mut lf = Logfile::new(&path, false).unwrap();
        lf.load(&restrictions(LogClasses::ALERT | LogClasses::INFO), &mut NoPressure);
        assert_eq!(lf.size(), 2);
        let freed = lf.free_messages(LogClasses::INFO);
        assert_eq!(freed, 1);
        assert_eq!(lf.size(), 1);
        assert_eq!(lf.classes_read(), LogClasses::ALERT);
    }

    #[test]
    fn replaying_the_same_file_twice_yields_identical_keys() {
        let dir = tempfile::tempdir().unwrap();
        let lines = [
            "[1000] HOST ALERT: a;DOWN;HARD;1;x",
            "[1000] SERVICE ALERT: a;S;OK;HARD;1;y",
            "[1002] HOST ALERT: b;UP;HARD;1;z",
        ];
        let path = write_log(dir.path(), "history", &lines);
        let mut lf = Logfile::new(&path, false).unwrap();
        lf.load(&restrictions(LogClasses::ALERT), &mut NoPressure);
        let first: Vec<LogKey> = lf.entries().keys().copied().collect();
        lf.free_messages(LogClasses::all());
        lf.load(&restrictions(LogClasses::ALERT), &mut NoPressure);
        let second: Vec<LogKey> = lf.entries().keys().copied().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![(1000, 1), (1000, 2), (1002, 3)]);
    }

    #[test]
    fn line_cap_truncates_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let lines: Vec<String> = (0..10)
            .map(|i| format!("[{}] HOST ALERT: h{i};UP;HARD;1;ok", 1000 + i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let path = write_log(dir.path(), "history", &refs);
        let mut lf = Logfile::new(&path, false).unwrap();
        lf.load(
            &LogRestrictions {
                max_lines_per_log_file: 4,
                classes: LogClasses::ALERT,
            },
            &mut NoPressure,
        );
        assert_eq!(lf.size(), 4);
    }
}
