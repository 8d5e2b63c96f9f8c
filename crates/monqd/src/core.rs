//! The daemon's embedded monitoring-core adapter.
//!
//! The live object graph is mirrored here by whatever feeds the daemon;
//! the query engine only ever sees the read-only trait. Comments and
//! downtimes are the mutable part, updated through the registration calls
//! and protected by one mutex.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use monq_core::core::{
    CommandDef, CoreLimits, CorePaths, DataEncoding, MonitoringCore, ProgramStatus,
};
use monq_core::model::{Comment, CommentMap, Downtime, DowntimeMap, ObjectGraph};
use monq_core::user::{GroupAuthorization, ServiceAuthorization};

use crate::config::Config;

type CommandHandler = Box<dyn Fn(&str) + Send + Sync>;

pub struct EmbeddedCore {
    graph: ObjectGraph,
    comments: Mutex<CommentMap>,
    downtimes: Mutex<DowntimeMap>,
    commands: Vec<CommandDef>,
    paths: CorePaths,
    limits: CoreLimits,
    data_encoding: DataEncoding,
    service_authorization: ServiceAuthorization,
    group_authorization: GroupAuthorization,
    edition: String,
    program_start: i64,
    last_logfile_rotation: AtomicI64,
    last_command_check: AtomicI64,
    /// Sink for external commands. The embedding installs its own; the
    /// default only logs.
    command_handler: Mutex<Option<CommandHandler>>,
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl EmbeddedCore {
    pub fn new(config: &Config) -> EmbeddedCore {
        EmbeddedCore {
            graph: ObjectGraph::new(),
            comments: Mutex::new(CommentMap::new()),
            downtimes: Mutex::new(DowntimeMap::new()),
            commands: Vec::new(),
            paths: config.paths.clone(),
            limits: config.limits,
            data_encoding: config.data_encoding,
            service_authorization: config.service_authorization,
            group_authorization: config.group_authorization,
            edition: config.edition.clone(),
            program_start: epoch_now(),
            last_logfile_rotation: AtomicI64::new(0),
            last_command_check: AtomicI64::new(0),
            command_handler: Mutex::new(None),
        }
    }

    pub fn note_logfile_rotation(&self) {
        self.last_logfile_rotation
            .store(epoch_now(), Ordering::Relaxed);
    }
}

/// Callbacks driven by the embedding core. Standalone runs never call
/// them; they are the registration surface an embedding wires up.
#[allow(dead_code)]
impl EmbeddedCore {
    /// Install the mirrored object graph. Done once at startup, before
    /// the socket opens; the engine relies on the graph being immutable
    /// afterwards.
    pub fn set_graph(&mut self, graph: ObjectGraph) {
        self.graph = graph;
    }

    pub fn set_commands(&mut self, commands: Vec<CommandDef>) {
        self.commands = commands;
    }

    pub fn set_command_handler(&self, handler: CommandHandler) {
        *self.command_handler.lock().unwrap() = Some(handler);
    }

    pub fn register_comment(&self, comment: Comment) {
        self.comments.lock().unwrap().insert(comment.id, comment);
    }

    pub fn unregister_comment(&self, id: u64) {
        self.comments.lock().unwrap().remove(&id);
    }

    pub fn register_downtime(&self, downtime: Downtime) {
        self.downtimes.lock().unwrap().insert(downtime.id, downtime);
    }

    pub fn unregister_downtime(&self, id: u64) {
        self.downtimes.lock().unwrap().remove(&id);
    }
}

impl MonitoringCore for EmbeddedCore {
    fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    fn with_comments(&self, f: &mut dyn FnMut(&CommentMap)) {
        f(&self.comments.lock().unwrap());
    }

    fn with_downtimes(&self, f: &mut dyn FnMut(&DowntimeMap)) {
        f(&self.downtimes.lock().unwrap());
    }

    fn comments_unlocked(&self) -> Vec<Comment> {
        self.comments.lock().unwrap().values().cloned().collect()
    }

    fn downtimes_unlocked(&self) -> Vec<Downtime> {
        self.downtimes.lock().unwrap().values().cloned().collect()
    }

    fn commands(&self) -> Vec<CommandDef> {
        self.commands.clone()
    }

    fn paths(&self) -> &CorePaths {
        &self.paths
    }

    fn limits(&self) -> &CoreLimits {
        &self.limits
    }

    fn data_encoding(&self) -> DataEncoding {
        self.data_encoding
    }

    fn status(&self) -> ProgramStatus {
        ProgramStatus {
            program_version: env!("CARGO_PKG_VERSION").to_string(),
            program_start: self.program_start,
            pid: std::process::id() as i64,
            last_command_check: self.last_command_check.load(Ordering::Relaxed),
            last_log_rotation: self.last_logfile_rotation.load(Ordering::Relaxed),
            interval_length: 60,
            enable_notifications: true,
            execute_service_checks: true,
            execute_host_checks: true,
            accept_passive_service_checks: true,
            accept_passive_host_checks: true,
            enable_event_handlers: true,
            enable_flap_detection: true,
            process_performance_data: false,
            edition: self.edition.clone(),
            num_queued_notifications: 0,
            num_queued_alerts: 0,
        }
    }

    fn service_authorization(&self) -> ServiceAuthorization {
        self.service_authorization
    }

    fn group_authorization(&self) -> GroupAuthorization {
        self.group_authorization
    }

    fn last_logfile_rotation(&self) -> i64 {
        self.last_logfile_rotation.load(Ordering::Relaxed)
    }

    fn submit_command(&self, command: &str) {
        self.last_command_check.store(epoch_now(), Ordering::Relaxed);
        match &*self.command_handler.lock().unwrap() {
            Some(handler) => {
                info!(command, "submitting external command");
                handler(command);
            }
            None => warn!(command, "no monitoring core attached, dropping command"),
        }
    }
}
