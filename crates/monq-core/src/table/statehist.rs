//! The `statehist` table: per-object state timelines reconstructed from
//! the history log.
//!
//! The replay walks alert, program and state entries chronologically and
//! keeps a state record per host and service. Every observable transition
//! emits the previous sub-interval through the query pipeline; the window
//! end emits the final one. Sub-intervals are non-overlapping and cover
//! the query window exactly, modulo the one-second closed-interval
//! boundary.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::filter::Filter;
use crate::logcache::entry::{LogClasses, LogEntry, LogEntryKind, TimeperiodTransition};
use crate::logcache::logfile::LogRestrictions;
use crate::model::{Host, Service};
use crate::query::Query;
use crate::row::RowRef;
use crate::table::{ColumnSet, Table, hosts, lookup_column, services};
use crate::user::User;
use crate::value::{ColumnType, Value};

/// Objects appearing mid-window start unmonitored only after this grace
/// period, which covers the core's startup gap.
const UNMONITORED_GRACE_SECS: i64 = 600;

/// The per-object record during replay, and the row of the table.
pub struct HostServiceState<'a> {
    pub is_host: bool,
    pub host: Option<&'a Host>,
    pub service: Option<&'a Service>,
    pub host_name: String,
    pub service_description: String,

    /// Time of the last log event applied to this record.
    pub time: i64,
    pub lineno: i64,
    pub from: i64,
    pub until: i64,
    pub duration: i64,
    pub duration_part: f64,

    /// -1 unmonitored, otherwise the host or service state.
    pub state: i64,
    pub host_down: i64,
    pub in_downtime: i64,
    pub in_host_downtime: i64,
    pub is_flapping: i64,
    pub in_notification_period: i64,
    pub notification_period: String,
    pub in_service_period: i64,
    pub service_period: String,
    pub debug_info: String,
    pub log_output: String,
    pub long_log_output: String,

    pub duration_ok: i64,
    pub duration_part_ok: f64,
    pub duration_warning: i64,
    pub duration_part_warning: f64,
    pub duration_critical: i64,
    pub duration_part_critical: f64,
    pub duration_unknown: i64,
    pub duration_part_unknown: f64,
    pub duration_unmonitored: i64,
    pub duration_part_unmonitored: f64,

    pub has_vanished: bool,
    pub last_known_time: i64,
    pub may_no_longer_exist: bool,
}

impl<'a> HostServiceState<'a> {
    fn new(
        host: Option<&'a Host>,
        service: Option<&'a Service>,
        host_name: String,
        service_description: String,
    ) -> HostServiceState<'a> {
        HostServiceState {
            is_host: service_description.is_empty(),
            host,
            service,
            host_name,
            service_description,
            time: 0,
            lineno: 0,
            from: 0,
            until: 0,
            duration: 0,
            duration_part: 0.0,
            state: 0,
            host_down: 0,
            in_downtime: 0,
            in_host_downtime: 0,
            is_flapping: 0,
            in_notification_period: 1,
            notification_period: String::new(),
            in_service_period: 1,
            service_period: String::new(),
            debug_info: String::new(),
            log_output: String::new(),
            long_log_output: String::new(),
            duration_ok: 0,
            duration_part_ok: 0.0,
            duration_warning: 0,
            duration_part_warning: 0.0,
            duration_critical: 0,
            duration_part_critical: 0.0,
            duration_unknown: 0,
            duration_part_unknown: 0.0,
            duration_unmonitored: 0,
            duration_part_unmonitored: 0.0,
            has_vanished: false,
            last_known_time: 0,
            may_no_longer_exist: false,
        }
    }

    fn compute_per_state_durations(&mut self, query_timeframe: i64) {
        self.duration = self.until - self.from;
        self.duration_part = self.duration as f64 / query_timeframe as f64;

        self.duration_ok = 0;
        self.duration_part_ok = 0.0;
        self.duration_warning = 0;
        self.duration_part_warning = 0.0;
        self.duration_critical = 0;
        self.duration_part_critical = 0.0;
        self.duration_unknown = 0;
        self.duration_part_unknown = 0.0;
        self.duration_unmonitored = 0;
        self.duration_part_unmonitored = 0.0;

        match self.state {
            -1 => {
                self.duration_unmonitored = self.duration;
                self.duration_part_unmonitored = self.duration_part;
            }
            0 => {
                self.duration_ok = self.duration;
                self.duration_part_ok = self.duration_part;
            }
            1 => {
                self.duration_warning = self.duration;
                self.duration_part_warning = self.duration_part;
            }
            2 => {
                self.duration_critical = self.duration;
                self.duration_part_critical = self.duration_part;
            }
            3 => {
                self.duration_unknown = self.duration;
                self.duration_part_unknown = self.duration_part;
            }
            _ => {}
        }
    }
}

fn state_col<F>(set: &mut ColumnSet, name: &str, description: &str, ty: ColumnType, f: F)
where
    F: for<'a> Fn(&'a HostServiceState<'a>, &ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    set.add(Column::new(
        name,
        description,
        ty,
        extract_fn(move |row, ctx| match row {
            RowRef::StateHist(s) => f(s, ctx),
            _ => ty.default_value(),
        }),
    ));
}

fn project_current_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::StateHist(s) => s.host.map(RowRef::Host),
        _ => None,
    }
}

fn project_current_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::StateHist(s) => s.service.map(RowRef::Service),
        _ => None,
    }
}

pub fn add_columns(set: &mut ColumnSet) {
    state_col(set, "time", "Time of the log event (seconds since 1/1/1970)", ColumnType::Time, |s, _| {
        Value::Time(s.time)
    });
    state_col(set, "lineno", "The number of the line in the log file", ColumnType::Int, |s, _| {
        Value::Int(s.lineno)
    });
    state_col(set, "from", "Start time of state (seconds since 1/1/1970)", ColumnType::Time, |s, _| {
        Value::Time(s.from)
    });
    state_col(set, "until", "End time of state (seconds since 1/1/1970)", ColumnType::Time, |s, _| {
        Value::Time(s.until)
    });
    state_col(set, "duration", "Duration of state (until - from)", ColumnType::Int, |s, _| {
        Value::Int(s.duration)
    });
    state_col(
        set,
        "duration_part",
        "Duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part),
    );
    state_col(
        set,
        "state",
        "The state of the host or service in question - OK(0) / WARNING(1) / CRITICAL(2) / UNKNOWN(3) / UNMONITORED(-1)",
        ColumnType::Int,
        |s, _| Value::Int(s.state),
    );
    state_col(set, "host_down", "Shows if the host of this service is down", ColumnType::Int, |s, _| {
        Value::Int(s.host_down)
    });
    state_col(set, "in_downtime", "Shows if the host or service is in downtime", ColumnType::Int, |s, _| {
        Value::Int(s.in_downtime)
    });
    state_col(
        set,
        "in_host_downtime",
        "Shows if the host of this service is in downtime",
        ColumnType::Int,
        |s, _| Value::Int(s.in_host_downtime),
    );
    state_col(set, "is_flapping", "Shows if the host or service is flapping", ColumnType::Int, |s, _| {
        Value::Int(s.is_flapping)
    });
    state_col(
        set,
        "in_notification_period",
        "Shows if the host or service is within its notification period",
        ColumnType::Int,
        |s, _| Value::Int(s.in_notification_period),
    );
    state_col(
        set,
        "notification_period",
        "The notification period of the host or service in question",
        ColumnType::String,
        |s, _| Value::Str(s.notification_period.clone()),
    );
    state_col(
        set,
        "in_service_period",
        "Shows if the host or service is within its service period",
        ColumnType::Int,
        |s, _| Value::Int(s.in_service_period),
    );
    state_col(
        set,
        "service_period",
        "The service period of the host or service in question",
        ColumnType::String,
        |s, _| Value::Str(s.service_period.clone()),
    );
    state_col(set, "debug_info", "Debug information", ColumnType::String, |s, _| {
        Value::Str(s.debug_info.clone())
    });
    state_col(set, "host_name", "Host name", ColumnType::String, |s, _| {
        Value::Str(s.host_name.clone())
    });
    state_col(set, "service_description", "Description of the service", ColumnType::String, |s, _| {
        Value::Str(s.service_description.clone())
    });
    state_col(set, "log_output", "Logfile output relevant for this state", ColumnType::String, |s, _| {
        Value::Str(s.log_output.clone())
    });
    state_col(
        set,
        "long_log_output",
        "Complete logfile output relevant for this state",
        ColumnType::String,
        |s, _| Value::Str(s.long_log_output.clone()),
    );
    state_col(set, "duration_ok", "OK duration of state (until - from)", ColumnType::Int, |s, _| {
        Value::Int(s.duration_ok)
    });
    state_col(
        set,
        "duration_part_ok",
        "OK duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part_ok),
    );
    state_col(
        set,
        "duration_warning",
        "WARNING duration of state (until - from)",
        ColumnType::Int,
        |s, _| Value::Int(s.duration_warning),
    );
    state_col(
        set,
        "duration_part_warning",
        "WARNING duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part_warning),
    );
    state_col(
        set,
        "duration_critical",
        "CRITICAL duration of state (until - from)",
        ColumnType::Int,
        |s, _| Value::Int(s.duration_critical),
    );
    state_col(
        set,
        "duration_part_critical",
        "CRITICAL duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part_critical),
    );
    state_col(
        set,
        "duration_unknown",
        "UNKNOWN duration of state (until - from)",
        ColumnType::Int,
        |s, _| Value::Int(s.duration_unknown),
    );
    state_col(
        set,
        "duration_part_unknown",
        "UNKNOWN duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part_unknown),
    );
    state_col(
        set,
        "duration_unmonitored",
        "UNMONITORED duration of state (until - from)",
        ColumnType::Int,
        |s, _| Value::Int(s.duration_unmonitored),
    );
    state_col(
        set,
        "duration_part_unmonitored",
        "UNMONITORED duration part in regard to the query timeframe",
        ColumnType::Double,
        |s, _| Value::Double(s.duration_part_unmonitored),
    );
}

pub struct TableStateHistory {
    columns: ColumnSet,
}

impl TableStateHistory {
    pub fn new() -> TableStateHistory {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns);
        hosts::add_columns(&mut columns, "current_host_", project_current_host);
        services::add_columns(&mut columns, "current_service_", project_current_service, false);
        TableStateHistory { columns }
    }
}

impl Default for TableStateHistory {
    fn default() -> Self {
        TableStateHistory::new()
    }
}

type StateKey = (String, String);

/// Sub-filter over current-object columns, used to blacklist services the
/// query can never report.
fn object_filter(query: &Query<'_>) -> Filter {
    query.partial_filter("current host/service columns", &|column| {
        column.starts_with("current_")
            || column.starts_with("host_")
            || column.starts_with("service_")
    })
}

/// Emit the record's sub-interval `[from, until]` and advance `from`.
/// Returns false when the query wants no more rows.
fn emit<'a>(
    query: &mut Query<'_>,
    user: &User<'_>,
    ctx: &ExecContext<'a>,
    query_timeframe: i64,
    state: &mut HostServiceState<'a>,
) -> bool {
    state.compute_per_state_durations(query_timeframe);
    let authorized = user.is_authorized_for_object(state.host, state.service, false);
    let keep_going = !authorized || query.process_row(RowRef::StateHist(state), ctx);
    state.from = state.until;
    keep_going
}

/// Apply one log entry to one record, emitting the previous sub-interval
/// on every observable transition. Returns whether anything changed (host
/// transitions propagate to the host's services).
#[allow(clippy::too_many_arguments)]
fn update_state<'a>(
    query: &mut Query<'_>,
    user: &User<'_>,
    ctx: &ExecContext<'a>,
    query_timeframe: i64,
    entry: &LogEntry,
    state: &mut HostServiceState<'a>,
    only_update: bool,
    notification_periods: &HashMap<String, i64>,
    abort: &mut bool,
) -> bool {
    let mut changed = true;
    let mut emit_now = |query: &mut Query<'_>, state: &mut HostServiceState<'a>, abort: &mut bool| {
        if !only_update && !emit(query, user, ctx, query_timeframe, state) {
            *abort = true;
        }
    };

    // revive a vanished object: report its last known state up to the
    // restart, then restart it as unmonitored
    if entry.kind() != LogEntryKind::TimeperiodTransition && state.has_vanished {
        state.time = state.last_known_time;
        state.until = state.last_known_time;
        emit_now(query, state, abort);
        state.may_no_longer_exist = false;
        state.has_vanished = false;
        state.state = -1;
        state.debug_info = "UNMONITORED".to_string();
        state.in_downtime = 0;
        state.is_flapping = 0;
        state.log_output = String::new();
        state.long_log_output = String::new();
        state.in_notification_period = *notification_periods
            .get(&state.notification_period)
            .unwrap_or(&1);
        state.in_service_period = *notification_periods
            .get(&state.service_period)
            .unwrap_or(&1);
    }

    state.time = entry.time();
    state.lineno = entry.lineno() as i64;
    state.until = entry.time();
    if entry.kind() != LogEntryKind::TimeperiodTransition {
        state.may_no_longer_exist = false;
    }

    match entry.kind() {
        LogEntryKind::StateHost | LogEntryKind::StateHostInitial | LogEntryKind::AlertHost => {
            if state.is_host {
                if state.state != entry.state() {
                    emit_now(query, state, abort);
                    state.state = entry.state();
                    state.host_down = i64::from(entry.state() > 0);
                    state.debug_info = "HOST STATE".to_string();
                } else {
                    changed = false;
                }
            } else if state.host_down != i64::from(entry.state() > 0) {
                emit_now(query, state, abort);
                state.host_down = i64::from(entry.state() > 0);
                state.debug_info = "SVC HOST STATE".to_string();
            }
        }
        LogEntryKind::StateService
        | LogEntryKind::StateServiceInitial
        | LogEntryKind::AlertService => {
            if state.state != entry.state() {
                emit_now(query, state, abort);
                state.debug_info = "SVC ALERT".to_string();
                state.state = entry.state();
            }
        }
        LogEntryKind::DowntimeAlertHost => {
            let active = i64::from(entry.state_type().starts_with("STARTED"));
            if state.in_host_downtime != active {
                emit_now(query, state, abort);
                state.debug_info = if state.is_host {
                    "HOST DOWNTIME".to_string()
                } else {
                    "SVC HOST DOWNTIME".to_string()
                };
                state.in_host_downtime = active;
                if state.is_host {
                    state.in_downtime = active;
                }
            } else {
                changed = false;
            }
        }
        LogEntryKind::DowntimeAlertService => {
            let active = i64::from(entry.state_type().starts_with("STARTED"));
            if state.in_downtime != active {
                emit_now(query, state, abort);
                state.debug_info = "DOWNTIME SERVICE".to_string();
                state.in_downtime = active;
            }
        }
        LogEntryKind::FlappingHost | LogEntryKind::FlappingService => {
            let active = i64::from(entry.state_type().starts_with("STARTED"));
            if state.is_flapping != active {
                emit_now(query, state, abort);
                state.debug_info = "FLAPPING".to_string();
                state.is_flapping = active;
            } else {
                changed = false;
            }
        }
        LogEntryKind::TimeperiodTransition => {
            match TimeperiodTransition::parse(entry.options()) {
                Ok(transition) => {
                    if state.host.is_some() && transition.name == state.notification_period {
                        if transition.to != state.in_notification_period {
                            emit_now(query, state, abort);
                            state.debug_info = "TIMEPERIOD".to_string();
                            state.in_notification_period = transition.to;
                        }
                    }
                    if state.host.is_some() && transition.name == state.service_period {
                        if transition.to != state.in_service_period {
                            emit_now(query, state, abort);
                            state.debug_info = "TIMEPERIOD".to_string();
                            state.in_service_period = transition.to;
                        }
                    }
                }
                Err(e) => {
                    warn!(line = entry.message(), error = %e, "invalid TIMEPERIOD TRANSITION");
                }
            }
        }
        _ => {}
    }

    if entry.kind() != LogEntryKind::TimeperiodTransition {
        // the core writes "(null)" for missing initial-state output
        let fix_me = matches!(
            entry.kind(),
            LogEntryKind::StateHostInitial | LogEntryKind::StateServiceInitial
        ) && entry.plugin_output() == "(null)";
        state.log_output = if fix_me {
            String::new()
        } else {
            entry.plugin_output().to_string()
        };
        state.long_log_output = entry.long_plugin_output();
    }

    changed
}

impl Table for TableStateHistory {
    fn name(&self) -> &'static str {
        "statehist"
    }

    fn prefix(&self) -> &'static str {
        "statehist_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn column(&self, name: &str) -> Result<std::sync::Arc<Column>, String> {
        // joined current-data columns carry a `current_` prefix
        lookup_column(self.name(), self.prefix(), &self.columns, name).or_else(|_| {
            lookup_column(
                self.name(),
                self.prefix(),
                &self.columns,
                &format!("current_{name}"),
            )
        })
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let Some(since) = query.greatest_lower_bound("time") else {
            query.invalid_request("Start of timeframe required. e.g. Filter: time > 1234567890");
            return;
        };
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        // both filter bounds are inclusive; the window is half-open
        let until = query.least_upper_bound("time").unwrap_or(now) + 1;
        let query_timeframe = until - since - 1;
        if query_timeframe <= 0 {
            return;
        }
        let object_filter = object_filter(query);
        let restrictions = LogRestrictions {
            max_lines_per_log_file: ctx.core.limits().max_lines_per_log_file,
            classes: LogClasses::ALERT | LogClasses::PROGRAM | LogClasses::STATE,
        };

        ctx.log_cache.apply(ctx.core, |files| {
            if files.is_empty() {
                return;
            }
            let keys = files.keys();
            // the newest file starting before the window also carries the
            // state at the window start
            let start_index = keys.iter().rposition(|k| *k < since).unwrap_or(0);
            if keys[start_index] >= until {
                return;
            }

            let graph = ctx.graph();
            let mut state_info: BTreeMap<StateKey, HostServiceState<'_>> = BTreeMap::new();
            let mut blacklist: HashSet<StateKey> = HashSet::new();
            let mut notification_periods: HashMap<String, i64> = HashMap::new();
            let mut only_update = true;
            let mut in_initial_states = false;
            let mut abort = false;

            'files: for key in &keys[start_index..] {
                let Some(entries) = files.entries(*key, &restrictions) else {
                    continue;
                };
                for entry in entries.values() {
                    if abort {
                        break 'files;
                    }
                    if entry.time() >= until {
                        break 'files;
                    }
                    if only_update && entry.time() >= since {
                        // start of the window: every tracked object begins
                        // its first real sub-interval here
                        for state in state_info.values_mut() {
                            state.from = since;
                            state.until = since;
                        }
                        only_update = false;
                    }
                    if in_initial_states
                        && !matches!(
                            entry.kind(),
                            LogEntryKind::StateHostInitial | LogEntryKind::StateServiceInitial
                        )
                    {
                        // end of the initial-state batch: whatever was not
                        // confirmed has vanished
                        for state in state_info.values_mut() {
                            if state.may_no_longer_exist {
                                state.has_vanished = true;
                            }
                        }
                        in_initial_states = false;
                    }

                    match entry.kind() {
                        LogEntryKind::AlertHost
                        | LogEntryKind::StateHost
                        | LogEntryKind::StateHostInitial
                        | LogEntryKind::DowntimeAlertHost
                        | LogEntryKind::FlappingHost
                        | LogEntryKind::AlertService
                        | LogEntryKind::StateService
                        | LogEntryKind::StateServiceInitial
                        | LogEntryKind::DowntimeAlertService
                        | LogEntryKind::FlappingService => {
                            let is_service = !entry.service_description().is_empty();
                            let entry_host = graph.find_host(entry.host_name());
                            let entry_service = graph
                                .find_service(entry.host_name(), entry.service_description());
                            // objects unknown to the current core are not
                            // tracked
                            if entry_host.is_none() || (is_service && entry_service.is_none()) {
                                continue;
                            }
                            let state_key: StateKey = (
                                entry.host_name().to_string(),
                                entry.service_description().to_string(),
                            );
                            if blacklist.contains(&state_key) {
                                continue;
                            }

                            if !state_info.contains_key(&state_key) {
                                let mut state = HostServiceState::new(
                                    entry_host,
                                    entry_service,
                                    entry.host_name().to_string(),
                                    entry.service_description().to_string(),
                                );
                                // hosts are never filtered out here, they
                                // may be needed for their services
                                if is_service
                                    && !object_filter.accepts(
                                        RowRef::StateHist(&state),
                                        ctx,
                                        query.timezone_offset(),
                                    )
                                {
                                    blacklist.insert(state_key);
                                    continue;
                                }
                                state.from = since;
                                state.notification_period = match (state.service, state.host) {
                                    (Some(svc), _) => svc.notification_period.clone(),
                                    (None, Some(host)) => host.notification_period.clone(),
                                    _ => String::new(),
                                };
                                state.service_period = match (state.service, state.host) {
                                    (Some(svc), _) => svc.service_period.clone(),
                                    (None, Some(host)) => host.service_period.clone(),
                                    _ => String::new(),
                                };
                                state.in_notification_period = *notification_periods
                                    .get(&state.notification_period)
                                    .unwrap_or(&1);
                                state.in_service_period = *notification_periods
                                    .get(&state.service_period)
                                    .unwrap_or(&1);
                                if is_service {
                                    let host_key: StateKey =
                                        (entry.host_name().to_string(), String::new());
                                    if let Some(host_state) = state_info.get(&host_key) {
                                        state.in_host_downtime = host_state.in_host_downtime;
                                        state.host_down = host_state.host_down;
                                    }
                                }
                                // objects appearing well into the window
                                // were unmonitored before this entry
                                if !only_update && entry.time() - since > UNMONITORED_GRACE_SECS {
                                    state.debug_info = "UNMONITORED ".to_string();
                                    state.state = -1;
                                }
                                state_info.insert(state_key.clone(), state);
                            }

                            let Some(state) = state_info.get_mut(&state_key) else {
                                continue;
                            };
                            let changed = update_state(
                                query,
                                user,
                                ctx,
                                query_timeframe,
                                entry,
                                state,
                                only_update,
                                &notification_periods,
                                &mut abort,
                            );

                            // a host transition also gates all its services
                            if changed
                                && matches!(
                                    entry.kind(),
                                    LogEntryKind::AlertHost
                                        | LogEntryKind::StateHost
                                        | LogEntryKind::DowntimeAlertHost
                                )
                            {
                                let service_keys: Vec<StateKey> = state_info
                                    .keys()
                                    .filter(|(host, svc)| {
                                        host.as_str() == entry.host_name() && !svc.is_empty()
                                    })
                                    .cloned()
                                    .collect();
                                for service_key in service_keys {
                                    if let Some(service_state) = state_info.get_mut(&service_key) {
                                        update_state(
                                            query,
                                            user,
                                            ctx,
                                            query_timeframe,
                                            entry,
                                            service_state,
                                            only_update,
                                            &notification_periods,
                                            &mut abort,
                                        );
                                    }
                                }
                            }
                        }
                        LogEntryKind::TimeperiodTransition => {
                            match TimeperiodTransition::parse(entry.options()) {
                                Ok(transition) => {
                                    notification_periods
                                        .insert(transition.name.clone(), transition.to);
                                    for state in state_info.values_mut() {
                                        update_state(
                                            query,
                                            user,
                                            ctx,
                                            query_timeframe,
                                            entry,
                                            state,
                                            only_update,
                                            &notification_periods,
                                            &mut abort,
                                        );
                                    }
                                }
                                Err(e) => {
                                    warn!(
                                        line = entry.message(),
                                        error = %e,
                                        "invalid TIMEPERIOD TRANSITION"
                                    );
                                }
                            }
                        }
                        LogEntryKind::LogInitialStates => {
                            // after a core restart every object has to be
                            // confirmed by an initial-state entry
                            for state in state_info.values_mut() {
                                if !state.has_vanished {
                                    state.last_known_time = entry.time();
                                    state.may_no_longer_exist = true;
                                }
                            }
                            in_initial_states = true;
                        }
                        _ => {}
                    }
                }
            }

            if !abort {
                for state in state_info.values_mut() {
                    if state.may_no_longer_exist {
                        // no trace since the last restart: report the last
                        // known state, then a terminal unmonitored interval
                        state.time = state.last_known_time;
                        state.until = state.last_known_time;
                        if !emit(query, user, ctx, query_timeframe, state) {
                            return;
                        }
                        state.state = -1;
                        state.debug_info = "UNMONITORED".to_string();
                        state.log_output = String::new();
                        state.long_log_output = String::new();
                    }
                    state.time = until - 1;
                    state.until = state.time;
                    if !emit(query, user, ctx, query_timeframe, state) {
                        return;
                    }
                }
            }
        });
    }
}
