//! The monitoring-core adapter.
//!
//! The engine never talks to the monitoring core directly; it sees this
//! read-only trait. The daemon implements it over its embedded object
//! mirror, tests over an in-memory double.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::counters::Counters;
use crate::logcache::LogCache;
use crate::model::{Comment, CommentMap, Downtime, DowntimeMap, ObjectGraph};
use crate::triggers::Triggers;
use crate::user::{GroupAuthorization, ServiceAuthorization};

/// Filesystem locations handed to the engine at startup.
#[derive(Debug, Clone, Default)]
pub struct CorePaths {
    pub query_socket: PathBuf,
    pub history_file: PathBuf,
    pub history_archive_directory: PathBuf,
    pub log_file: PathBuf,
    pub crash_reports_directory: PathBuf,
    pub license_usage_history_file: PathBuf,
    pub inventory_directory: PathBuf,
    pub structured_status_directory: PathBuf,
    pub robotmk_html_log_directory: PathBuf,
    pub logwatch_directory: PathBuf,
    pub prediction_directory: PathBuf,
    pub event_console_status_socket: PathBuf,
    pub state_file_created_file: PathBuf,
    pub licensed_state_file: PathBuf,
    pub rrd_multiple_directory: PathBuf,
}

/// Resource limits for one process.
#[derive(Debug, Clone, Copy)]
pub struct CoreLimits {
    pub max_cached_messages: usize,
    pub max_lines_per_log_file: usize,
    pub max_response_size: usize,
}

impl Default for CoreLimits {
    fn default() -> Self {
        CoreLimits {
            max_cached_messages: 500_000,
            max_lines_per_log_file: 1_000_000,
            max_response_size: 100 * 1024 * 1024,
        }
    }
}

/// Wire encoding of non-ASCII payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataEncoding {
    #[default]
    Utf8,
    Latin1,
    Mixed,
}

/// One-row snapshot for the `status` table.
#[derive(Debug, Clone, Default)]
pub struct ProgramStatus {
    pub program_version: String,
    pub program_start: i64,
    pub pid: i64,
    pub last_command_check: i64,
    pub last_log_rotation: i64,
    pub interval_length: i64,
    pub enable_notifications: bool,
    pub execute_service_checks: bool,
    pub execute_host_checks: bool,
    pub accept_passive_service_checks: bool,
    pub accept_passive_host_checks: bool,
    pub enable_event_handlers: bool,
    pub enable_flap_detection: bool,
    pub process_performance_data: bool,
    pub edition: String,
    pub num_queued_notifications: i64,
    pub num_queued_alerts: i64,
}

/// A command definition, independent of the monitoring core flavor.
#[derive(Debug, Clone, Default)]
pub struct CommandDef {
    pub name: String,
    pub command_line: String,
}

/// Read-only view onto the monitoring core.
///
/// Comments and downtimes are the only mutable pieces; the core mutates
/// them from its own callbacks. `with_comments`/`with_downtimes` run a
/// closure under the adapter's lock and are what tables use while
/// answering. `comments_unlocked`/`downtimes_unlocked` hand out an owned
/// snapshot instead, for callers that must not hold the adapter's lock
/// while they keep working (e.g. code that re-enters the core).
pub trait MonitoringCore: Send + Sync {
    fn graph(&self) -> &ObjectGraph;

    fn with_comments(&self, f: &mut dyn FnMut(&CommentMap));
    fn with_downtimes(&self, f: &mut dyn FnMut(&DowntimeMap));
    fn comments_unlocked(&self) -> Vec<Comment>;
    fn downtimes_unlocked(&self) -> Vec<Downtime>;

    fn commands(&self) -> Vec<CommandDef>;
    fn find_command(&self, name: &str) -> Option<CommandDef> {
        self.commands().into_iter().find(|c| c.name == name)
    }

    fn paths(&self) -> &CorePaths;
    fn limits(&self) -> &CoreLimits;
    fn data_encoding(&self) -> DataEncoding {
        DataEncoding::Utf8
    }
    fn status(&self) -> ProgramStatus;

    fn service_authorization(&self) -> ServiceAuthorization {
        ServiceAuthorization::Loose
    }
    fn group_authorization(&self) -> GroupAuthorization {
        GroupAuthorization::Loose
    }

    /// Timestamp of the last history-file rotation, driving lazy index
    /// rebuilds in the log cache.
    fn last_logfile_rotation(&self) -> i64;

    /// Hand an external command line to the core.
    fn submit_command(&self, command: &str);
}

/// Everything a query execution needs besides the parsed request: the core,
/// the process-wide services, and the termination flag polled at every
/// streaming step.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub core: &'a dyn MonitoringCore,
    pub counters: &'a Counters,
    pub triggers: &'a Triggers,
    pub log_cache: &'a LogCache,
    pub should_terminate: &'a AtomicBool,
}

impl<'a> ExecContext<'a> {
    pub fn graph(&self) -> &'a ObjectGraph {
        self.core.graph()
    }
}
