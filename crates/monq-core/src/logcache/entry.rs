//! Parsing and classification of monitoring history lines.
//!
//! A line looks like `[1590000000] HOST ALERT: web01;DOWN;HARD;1;timed out`.
//! The entry owns the line; all textual fields are byte ranges into it, so
//! a parsed entry costs one allocation.

use std::ops::Range;

use bitflags::bitflags;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogLineError {
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("unknown state name '{0}'")]
    BadState(String),
}

/// Log entry classes. The numeric values are wire protocol: clients filter
/// with `Filter: class = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogClass {
    Info = 0,
    Alert = 1,
    Program = 2,
    Notification = 3,
    PassiveCheck = 4,
    ExtCommand = 5,
    State = 6,
    AlertHandlers = 8,
}

bitflags! {
    /// Bitmap over [`LogClass`] used to restrict loading and iteration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogClasses: u32 {
        const INFO = 1 << 0;
        const ALERT = 1 << 1;
        const PROGRAM = 1 << 2;
        const NOTIFICATION = 1 << 3;
        const PASSIVE_CHECK = 1 << 4;
        const EXT_COMMAND = 1 << 5;
        const STATE = 1 << 6;
        const ALERT_HANDLERS = 1 << 8;
    }
}

impl LogClass {
    pub fn as_mask(self) -> LogClasses {
        LogClasses::from_bits_truncate(1 << (self as u32))
    }
}

impl LogClasses {
    /// Mask from the 32-value set a `class` filter admits.
    pub fn from_value_set(set: u32) -> LogClasses {
        LogClasses::from_bits_truncate(set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntryKind {
    None,
    AlertHost,
    AlertService,
    DowntimeAlertHost,
    DowntimeAlertService,
    StateHost,
    StateHostInitial,
    StateService,
    StateServiceInitial,
    FlappingHost,
    FlappingService,
    AcknowledgeAlertHost,
    AcknowledgeAlertService,
    TimeperiodTransition,
    CoreStarting,
    CoreStopping,
    LogVersion,
    LogInitialStates,
}

pub fn parse_host_state(name: &str) -> Option<i64> {
    match name {
        "UP" | "RECOVERY" => Some(0),
        "DOWN" => Some(1),
        "UNREACHABLE" => Some(2),
        _ => None,
    }
}

pub fn parse_service_state(name: &str) -> Option<i64> {
    match name {
        "OK" | "RECOVERY" => Some(0),
        "WARNING" => Some(1),
        "CRITICAL" => Some(2),
        "UNKNOWN" => Some(3),
        _ => None,
    }
}

/// Notifications carry states like `CUSTOM (DOWN)`; fall back to the name
/// inside the parentheses.
fn parse_notification_state(name: &str, host: bool) -> i64 {
    let direct = if host {
        parse_host_state(name)
    } else {
        parse_service_state(name)
    };
    direct
        .or_else(|| {
            let inner = name.split_once('(')?.1.split_once(')')?.0;
            if host {
                parse_host_state(inner)
            } else {
                parse_service_state(inner)
            }
        })
        .unwrap_or(0)
}

enum Param {
    HostName,
    SvcDesc,
    HostState,
    SvcState,
    IntState,
    NotificationHostState,
    NotificationSvcState,
    StateType,
    Attempt,
    Comment,
    CommandName,
    ContactName,
    PluginOutput,
    LongPluginOutput,
}

#[derive(Debug)]
pub struct LogEntry {
    lineno: usize,
    time: i64,
    class: LogClass,
    kind: LogEntryKind,
    message: String,
    type_: Range<usize>,
    options: Range<usize>,
    host_name: Range<usize>,
    service_description: Range<usize>,
    command_name: Range<usize>,
    contact_name: Range<usize>,
    state: i64,
    state_type: Range<usize>,
    attempt: i64,
    comment: Range<usize>,
    plugin_output: Range<usize>,
    long_plugin_output: Range<usize>,
}

impl LogEntry {
    /// Parse one history line. Malformed lines are errors and silently
    /// dropped by the caller.
    pub fn parse(lineno: usize, line: String) -> Result<LogEntry, LogLineError> {
        let bytes = line.as_bytes();
        if bytes.first() != Some(&b'[') {
            return Err(LogLineError::MissingTimestamp);
        }
        let close = line.find(']').ok_or(LogLineError::MissingTimestamp)?;
        let time: i64 = line[1..close]
            .parse()
            .map_err(|_| LogLineError::MissingTimestamp)?;
        let text_start = (close + 2).min(line.len());

        let mut entry = LogEntry {
            lineno,
            time,
            class: LogClass::Info,
            kind: LogEntryKind::None,
            type_: text_start..line.len(),
            options: line.len()..line.len(),
            host_name: 0..0,
            service_description: 0..0,
            command_name: 0..0,
            contact_name: 0..0,
            state: 0,
            state_type: 0..0,
            attempt: 0,
            comment: 0..0,
            plugin_output: 0..0,
            long_plugin_output: 0..0,
            message: line,
        };
        entry.classify(text_start)?;
        Ok(entry)
    }

    fn classify(&mut self, text_start: usize) -> Result<(), LogLineError> {
        let text = &self.message[text_start..];
        let (type_name, options_start) = match text.find(": ") {
            Some(pos) => (&text[..pos], text_start + pos + 2),
            None => (text, self.message.len()),
        };
        let type_end = text_start + type_name.len();
        self.type_ = text_start..type_end;
        self.options = options_start..self.message.len();

        use LogEntryKind as K;
        use Param::*;
        let (class, kind, params): (LogClass, LogEntryKind, &[Param]) = match type_name {
            "HOST ALERT" => (
                LogClass::Alert,
                K::AlertHost,
                &[HostName, HostState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "INITIAL HOST STATE" => (
                LogClass::State,
                K::StateHostInitial,
                &[HostName, HostState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "CURRENT HOST STATE" => (
                LogClass::State,
                K::StateHost,
                &[HostName, HostState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "SERVICE ALERT" => (
                LogClass::Alert,
                K::AlertService,
                &[HostName, SvcDesc, SvcState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "INITIAL SERVICE STATE" => (
                LogClass::State,
                K::StateServiceInitial,
                &[HostName, SvcDesc, SvcState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "CURRENT SERVICE STATE" => (
                LogClass::State,
                K::StateService,
                &[HostName, SvcDesc, SvcState, StateType, Attempt, PluginOutput, LongPluginOutput],
            ),
            "HOST DOWNTIME ALERT" => {
                (LogClass::Alert, K::DowntimeAlertHost, &[HostName, StateType, Comment])
            }
            "SERVICE DOWNTIME ALERT" => (
                LogClass::Alert,
                K::DowntimeAlertService,
                &[HostName, SvcDesc, StateType, Comment],
            ),
            "HOST FLAPPING ALERT" => {
                (LogClass::Alert, K::FlappingHost, &[HostName, StateType, Comment])
            }
            "SERVICE FLAPPING ALERT" => (
                LogClass::Alert,
                K::FlappingService,
                &[HostName, SvcDesc, StateType, Comment],
            ),
            "HOST ACKNOWLEDGE ALERT" => (
                LogClass::Alert,
                K::AcknowledgeAlertHost,
                &[HostName, StateType, ContactName, Comment],
            ),
            "SERVICE ACKNOWLEDGE ALERT" => (
                LogClass::Alert,
                K::AcknowledgeAlertService,
                &[HostName, SvcDesc, StateType, ContactName, Comment],
            ),
            "TIMEPERIOD TRANSITION" => (LogClass::State, K::TimeperiodTransition, &[]),
            "HOST NOTIFICATION" => (
                LogClass::Notification,
                K::None,
                &[ContactName, HostName, NotificationHostState, CommandName, PluginOutput],
            ),
            "SERVICE NOTIFICATION" => (
                LogClass::Notification,
                K::None,
                &[ContactName, HostName, SvcDesc, NotificationSvcState, CommandName, PluginOutput],
            ),
            "HOST NOTIFICATION RESULT" | "HOST NOTIFICATION PROGRESS" => (
                LogClass::Notification,
                K::None,
                &[ContactName, HostName, NotificationHostState, CommandName, PluginOutput, LongPluginOutput],
            ),
            "SERVICE NOTIFICATION RESULT" | "SERVICE NOTIFICATION PROGRESS" => (
                LogClass::Notification,
                K::None,
                &[ContactName, HostName, SvcDesc, NotificationSvcState, CommandName, PluginOutput, LongPluginOutput],
            ),
            "PASSIVE HOST CHECK" => (
                LogClass::PassiveCheck,
                K::None,
                &[HostName, IntState, PluginOutput],
            ),
            "PASSIVE SERVICE CHECK" => (
                LogClass::PassiveCheck,
                K::None,
                &[HostName, SvcDesc, IntState, PluginOutput],
            ),
            "EXTERNAL COMMAND" => (LogClass::ExtCommand, K::None, &[]),
            "HOST ALERT HANDLER STARTED" | "HOST ALERT HANDLER STOPPED" => (
                LogClass::AlertHandlers,
                K::None,
                &[HostName, CommandName, PluginOutput],
            ),
            "SERVICE ALERT HANDLER STARTED" | "SERVICE ALERT HANDLER STOPPED" => (
                LogClass::AlertHandlers,
                K::None,
                &[HostName, SvcDesc, CommandName, PluginOutput],
            ),
            "LOG VERSION" => (LogClass::Program, K::LogVersion, &[]),
            _ => {
                let lower = text.to_ascii_lowercase();
                if lower.starts_with("logging initial states")
                    || lower.starts_with("logging intitial states")
                {
                    (LogClass::Program, K::LogInitialStates, &[])
                } else if lower.contains("starting...") || lower.contains("active mode...") {
                    (LogClass::Program, K::CoreStarting, &[])
                } else if lower.contains("shutting down...")
                    || lower.contains("bailing out")
                    || lower.contains("standby mode...")
                {
                    (LogClass::Program, K::CoreStopping, &[])
                } else {
                    (LogClass::Info, K::None, &[])
                }
            }
        };
        self.class = class;
        self.kind = kind;
        self.assign_fields(params)
    }

    fn assign_fields(&mut self, params: &[Param]) -> Result<(), LogLineError> {
        if params.is_empty() {
            return Ok(());
        }
        let options = self.options.clone();
        let mut start = options.start;
        let mut fields: Vec<Range<usize>> = Vec::with_capacity(params.len());
        let text = self.message[options.clone()].to_string();
        for (i, part) in text.split(';').enumerate() {
            if i + 1 == params.len() {
                // last parameter swallows remaining separators
                fields.push(start..options.end);
                break;
            }
            fields.push(start..start + part.len());
            start += part.len() + 1;
            if fields.len() == params.len() {
                break;
            }
        }
        for (param, range) in params.iter().zip(fields) {
            let field = self.message[range.clone()].to_string();
            match param {
                Param::HostName => self.host_name = range,
                Param::SvcDesc => self.service_description = range,
                Param::HostState => {
                    self.state = parse_host_state(&field)
                        .ok_or_else(|| LogLineError::BadState(field.clone()))?;
                }
                Param::SvcState => {
                    self.state = parse_service_state(&field)
                        .ok_or_else(|| LogLineError::BadState(field.clone()))?;
                }
                Param::IntState => self.state = field.parse().unwrap_or(0),
                Param::NotificationHostState => {
                    self.state = parse_notification_state(&field, true);
                    self.state_type = range;
                }
                Param::NotificationSvcState => {
                    self.state = parse_notification_state(&field, false);
                    self.state_type = range;
                }
                Param::StateType => self.state_type = range,
                Param::Attempt => self.attempt = field.parse().unwrap_or(0),
                Param::Comment => self.comment = range,
                Param::CommandName => self.command_name = range,
                Param::ContactName => self.contact_name = range,
                Param::PluginOutput => self.plugin_output = range,
                Param::LongPluginOutput => self.long_plugin_output = range,
            }
        }
        Ok(())
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn class(&self) -> LogClass {
        self.class
    }

    pub fn kind(&self) -> LogEntryKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn slice(&self, range: &Range<usize>) -> &str {
        &self.message[range.clone()]
    }

    pub fn type_name(&self) -> &str {
        self.slice(&self.type_)
    }

    pub fn options(&self) -> &str {
        self.slice(&self.options)
    }

    pub fn host_name(&self) -> &str {
        self.slice(&self.host_name)
    }

    pub fn service_description(&self) -> &str {
        self.slice(&self.service_description)
    }

    pub fn command_name(&self) -> &str {
        self.slice(&self.command_name)
    }

    pub fn contact_name(&self) -> &str {
        self.slice(&self.contact_name)
    }

    pub fn state(&self) -> i64 {
        self.state
    }

    pub fn state_type(&self) -> &str {
        self.slice(&self.state_type)
    }

    pub fn attempt(&self) -> i64 {
        self.attempt
    }

    pub fn comment(&self) -> &str {
        self.slice(&self.comment)
    }

    pub fn plugin_output(&self) -> &str {
        self.slice(&self.plugin_output)
    }

    /// Long output is stored with escaped newlines in the history file.
    pub fn long_plugin_output(&self) -> String {
        self.slice(&self.long_plugin_output).replace("\\n", "\n")
    }
}

/// `TIMEPERIOD TRANSITION: name;from;to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeperiodTransition {
    pub name: String,
    pub from: i64,
    pub to: i64,
}

impl TimeperiodTransition {
    pub fn parse(options: &str) -> Result<TimeperiodTransition, String> {
        let fields: Vec<&str> = options.split(';').collect();
        if fields.len() != 3 {
            return Err(format!("expected 3 arguments, got {}", fields.len()));
        }
        Ok(TimeperiodTransition {
            name: fields[0].to_string(),
            from: fields[1].trim().parse().map_err(|_| "bad 'from' value")?,
            to: fields[2].trim().parse().map_err(|_| "bad 'to' value")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> LogEntry {
        LogEntry::parse(1, line.to_string()).unwrap()
    }

    #[test]
    fn host_alert_fields() {
        let e = parse("[1590000000] HOST ALERT: web01;DOWN;HARD;3;timed out");
        assert_eq!(e.time(), 1590000000);
        assert_eq!(e.class(), LogClass::Alert);
        assert_eq!(e.kind(), LogEntryKind::AlertHost);
        assert_eq!(e.type_name(), "HOST ALERT");
        assert_eq!(e.host_name(), "web01");
        assert_eq!(e.state(), 1);
        assert_eq!(e.state_type(), "HARD");
        assert_eq!(e.attempt(), 3);
        assert_eq!(e.plugin_output(), "timed out");
    }

    #[test]
    fn service_alert_keeps_semicolons_in_the_last_field() {
        let e = parse("[1590000000] SERVICE ALERT: web01;HTTP;CRITICAL;SOFT;1;conn refused");
        assert_eq!(e.kind(), LogEntryKind::AlertService);
        assert_eq!(e.service_description(), "HTTP");
        assert_eq!(e.state(), 2);
        let e = parse(
            "[1590000000] SERVICE ALERT: web01;HTTP;OK;HARD;1;out;with;semicolons;long tail",
        );
        assert_eq!(e.plugin_output(), "out");
        assert_eq!(e.long_plugin_output(), "with;semicolons;long tail");
    }

    #[test]
    fn downtime_flapping_and_acknowledgement() {
        let e = parse("[1] HOST DOWNTIME ALERT: web01;STARTED; maintenance window");
        assert_eq!(e.kind(), LogEntryKind::DowntimeAlertHost);
        assert_eq!(e.state_type(), "STARTED");
        let e = parse("[1] SERVICE FLAPPING ALERT: web01;HTTP;STOPPED; ok again");
        assert_eq!(e.kind(), LogEntryKind::FlappingService);
        let e = parse("[1] SERVICE ACKNOWLEDGE ALERT: web01;HTTP;STARTED;admin;on it");
        assert_eq!(e.kind(), LogEntryKind::AcknowledgeAlertService);
        assert_eq!(e.contact_name(), "admin");
        assert_eq!(e.comment(), "on it");
    }

    #[test]
    fn state_entries_and_program_markers() {
        let e = parse("[1] INITIAL HOST STATE: web01;UP;HARD;1;ok");
        assert_eq!(e.kind(), LogEntryKind::StateHostInitial);
        assert_eq!(e.class(), LogClass::State);
        let e = parse("[1] TIMEPERIOD TRANSITION: workhours;0;1");
        assert_eq!(e.kind(), LogEntryKind::TimeperiodTransition);
        let tpt = TimeperiodTransition::parse(e.options()).unwrap();
        assert_eq!(tpt.name, "workhours");
        assert_eq!(tpt.to, 1);
        let e = parse("[1] LOG VERSION: 2.0");
        assert_eq!(e.kind(), LogEntryKind::LogVersion);
        let e = parse("[1] logging initial states");
        assert_eq!(e.kind(), LogEntryKind::LogInitialStates);
        let e = parse("[1] Caught SIGTERM, shutting down...");
        assert_eq!(e.kind(), LogEntryKind::CoreStopping);
        assert_eq!(e.class(), LogClass::Program);
    }

    #[test]
    fn notifications_and_passive_checks() {
        let e = parse("[1] SERVICE NOTIFICATION: admin;web01;HTTP;CRITICAL;notify-email;down");
        assert_eq!(e.class(), LogClass::Notification);
        assert_eq!(e.contact_name(), "admin");
        assert_eq!(e.command_name(), "notify-email");
        assert_eq!(e.state(), 2);
        let e = parse("[1] HOST NOTIFICATION: admin;web01;CUSTOM (DOWN);notify-sms;x");
        assert_eq!(e.state(), 1);
        let e = parse("[1] PASSIVE SERVICE CHECK: web01;disk;2;88% used");
        assert_eq!(e.class(), LogClass::PassiveCheck);
        assert_eq!(e.state(), 2);
    }

    #[test]
    fn external_commands_and_info() {
        let e = parse("[1] EXTERNAL COMMAND: ACKNOWLEDGE_SVC_PROBLEM;web01;HTTP;1");
        assert_eq!(e.class(), LogClass::ExtCommand);
        assert_eq!(e.options(), "ACKNOWLEDGE_SVC_PROBLEM;web01;HTTP;1");
        let e = parse("[1] something nobody classified");
        assert_eq!(e.class(), LogClass::Info);
        assert_eq!(e.kind(), LogEntryKind::None);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(LogEntry::parse(1, "no timestamp".to_string()).is_err());
        assert!(LogEntry::parse(1, "[x] HOST ALERT: a;UP;HARD;1;ok".to_string()).is_err());
        assert!(LogEntry::parse(1, "[1] HOST ALERT: a;FUNKY;HARD;1;ok".to_string()).is_err());
    }

    #[test]
    fn class_masks() {
        assert_eq!(LogClass::Alert.as_mask(), LogClasses::ALERT);
        assert_eq!(
            LogClasses::from_value_set(0b1000110),
            LogClasses::ALERT | LogClasses::STATE | LogClasses::PROGRAM
        );
    }
}
