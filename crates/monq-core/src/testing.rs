//! In-memory test double of the monitoring core and a request driver.
//!
//! Compiled unconditionally so the daemon crate can reuse it in its own
//! tests.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use crate::core::{
    CommandDef, CoreLimits, CorePaths, ExecContext, MonitoringCore, ProgramStatus,
};
use crate::counters::Counters;
use crate::model::{
    Comment, CommentMap, Downtime, DowntimeMap, ObjectGraph,
};
use crate::output::OutputBuffer;
use crate::store::Store;
use crate::triggers::Triggers;
use crate::user::{GroupAuthorization, ServiceAuthorization};

pub struct TestCore {
    pub graph: ObjectGraph,
    comments: Mutex<CommentMap>,
    downtimes: Mutex<DowntimeMap>,
    pub commands: Vec<CommandDef>,
    pub paths: CorePaths,
    pub limits: CoreLimits,
    pub status: ProgramStatus,
    pub last_rotation: i64,
    pub service_auth: ServiceAuthorization,
    pub group_auth: GroupAuthorization,
    submitted: Mutex<Vec<String>>,
}

impl Default for TestCore {
    fn default() -> Self {
        TestCore::new()
    }
}

impl TestCore {
    pub fn new() -> TestCore {
        TestCore {
            graph: ObjectGraph::new(),
            comments: Mutex::new(CommentMap::new()),
            downtimes: Mutex::new(DowntimeMap::new()),
            commands: Vec::new(),
            paths: CorePaths::default(),
            limits: CoreLimits::default(),
            status: ProgramStatus::default(),
            last_rotation: 0,
            service_auth: ServiceAuthorization::Loose,
            group_auth: GroupAuthorization::Loose,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn add_comment(&self, comment: Comment) {
        self.comments.lock().unwrap().insert(comment.id, comment);
    }

    pub fn add_downtime(&self, downtime: Downtime) {
        self.downtimes.lock().unwrap().insert(downtime.id, downtime);
    }

    pub fn submitted_commands(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

impl MonitoringCore for TestCore {
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

    fn status(&self) -> ProgramStatus {
        self.status.clone()
    }

    fn service_authorization(&self) -> ServiceAuthorization {
        self.service_auth
    }

    fn group_authorization(&self) -> GroupAuthorization {
        self.group_auth
    }

    fn last_logfile_rotation(&self) -> i64 {
        self.last_rotation
    }

    fn submit_command(&self, command: &str) {
        self.submitted.lock().unwrap().push(command.to_string());
    }
}

/// Bundles the process-wide services a query execution borrows, so tests
/// can build an [`ExecContext`] in one line.
pub struct TestEnv {
    pub core: TestCore,
    pub counters: Counters,
    pub triggers: Triggers,
    pub log_cache: crate::logcache::LogCache,
    pub should_terminate: AtomicBool,
}

impl Default for TestEnv {
    fn default() -> Self {
        TestEnv::new()
    }
}

impl TestEnv {
    pub fn new() -> TestEnv {
        TestEnv {
            core: TestCore::new(),
            counters: Counters::new(),
            triggers: Triggers::new(),
            log_cache: crate::logcache::LogCache::new(),
            should_terminate: AtomicBool::new(false),
        }
    }

    pub fn ctx(&self) -> ExecContext<'_> {
        ExecContext {
            core: &self.core,
            counters: &self.counters,
            triggers: &self.triggers,
            log_cache: &self.log_cache,
            should_terminate: &self.should_terminate,
        }
    }
}

/// Drive one textual request through a store and return the raw response
/// bytes, exactly as they would hit the socket.
pub fn run_request(store: &Store, core: &TestCore, request: &str) -> Vec<u8> {
    let mut lines = request.lines();
    let command_line = lines.next().unwrap_or_default();
    let table_name = command_line.strip_prefix("GET").unwrap_or("").trim();
    let headers: Vec<String> = lines
        .take_while(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();

    let counters = Counters::new();
    let triggers = Triggers::new();
    let should_terminate = AtomicBool::new(false);
    let ctx = ExecContext {
        core,
        counters: &counters,
        triggers: &triggers,
        log_cache: store.log_cache(),
        should_terminate: &should_terminate,
    };
    let mut output = OutputBuffer::new();
    store.answer_get_request(&ctx, &headers, &mut output, table_name);
    let mut response = Vec::new();
    output
        .flush(&mut response)
        .expect("writing to a vector cannot fail");
    response
}

/// `run_request` as a string, for the common all-text assertions.
pub fn run_request_str(store: &Store, core: &TestCore, request: &str) -> String {
    String::from_utf8_lossy(&run_request(store, core, request)).into_owned()
}
