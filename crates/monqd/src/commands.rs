//! External-command dispatch.
//!
//! `COMMAND [<epoch>] <NAME>;<args>` lines never produce a response body.
//! Most names go verbatim to the monitoring core under one global mutex;
//! `EC_*` names go to the event console, two housekeeping names are
//! handled locally, and `LOG`/`ROTATE_LOGFILE` are renamed for the core.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use monq_core::core::MonitoringCore;

/// One parsed command: the optional bracketed timestamp is kept for the
/// core, the name decides the routing.
#[derive(Debug, PartialEq, Eq)]
pub struct ExternalCommand {
    prefix: String,
    name: String,
    arguments: String,
}

impl ExternalCommand {
    pub fn parse(line: &str) -> Result<ExternalCommand, String> {
        let line = line.trim_start();
        let (prefix, rest) = match line.strip_prefix('[') {
            Some(after) => match after.find(']') {
                Some(pos) => (
                    format!("[{}]", &after[..pos]),
                    after[pos + 1..].trim_start(),
                ),
                None => return Err(format!("missing ']' in command '{line}'")),
            },
            None => (String::new(), line),
        };
        if rest.is_empty() {
            return Err(format!("empty command in '{line}'"));
        }
        let (name, arguments) = match rest.find(';') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        Ok(ExternalCommand {
            prefix,
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Positional arguments, i.e. the `;`-separated fields after the name.
    pub fn args(&self) -> Vec<&str> {
        self.arguments
            .strip_prefix(';')
            .map(|s| s.split(';').collect())
            .unwrap_or_default()
    }

    fn with_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}{}", name, self.arguments)
        } else {
            format!("{} {}{}", self.prefix, name, self.arguments)
        }
    }

    fn to_line(&self) -> String {
        self.with_name(&self.name)
    }
}

pub struct CommandDispatcher {
    /// Commands reach the core strictly serialized.
    command_mutex: Mutex<()>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        CommandDispatcher::new()
    }
}

impl CommandDispatcher {
    pub fn new() -> CommandDispatcher {
        CommandDispatcher {
            command_mutex: Mutex::new(()),
        }
    }

    pub fn dispatch(&self, core: &dyn MonitoringCore, line: &str) {
        let command = match ExternalCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "ignoring malformed command");
                return;
            }
        };
        match command.name() {
            "MK_LOGWATCH_ACKNOWLEDGE" => self.mk_logwatch_acknowledge(core, &command),
            "DEL_CRASH_REPORT" => self.del_crash_report(core, &command),
            name if name.starts_with("EC_") => {
                // the event console speaks its own protocol; errors are
                // deliberately invisible to the client
                let forwarded = format!("COMMAND {}{}", &name[3..], command.arguments);
                send_to_event_console(&core.paths().event_console_status_socket, &forwarded);
            }
            // the core has no LOG or ROTATE_LOGFILE command of its own
            "LOG" => self.forward(core, command.with_name("_LOG")),
            "ROTATE_LOGFILE" => self.forward(core, command.with_name("_ROTATE_LOGFILE")),
            _ => self.forward(core, command.to_line()),
        }
    }

    fn forward(&self, core: &dyn MonitoringCore, line: String) {
        let _serialized = self.command_mutex.lock().unwrap();
        debug!(command = %line, "forwarding command to the core");
        core.submit_command(&line);
    }

    fn mk_logwatch_acknowledge(&self, core: &dyn MonitoringCore, command: &ExternalCommand) {
        let args = command.args();
        let [host, file] = args.as_slice() else {
            warn!("MK_LOGWATCH_ACKNOWLEDGE expects 2 arguments");
            return;
        };
        let directory = &core.paths().logwatch_directory;
        if directory.as_os_str().is_empty() {
            return;
        }
        // logwatch spool files encode slashes in the original path
        let file = file.replace(['/', '\\'], "_");
        if host.contains(['/', '.']) {
            warn!(host, "suspicious host name in MK_LOGWATCH_ACKNOWLEDGE");
            return;
        }
        let path = directory.join(host).join(file);
        match std::fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "acknowledged logwatch file"),
            Err(e) => info!(path = %path.display(), error = %e, "cannot acknowledge logwatch file"),
        }
    }

    fn del_crash_report(&self, core: &dyn MonitoringCore, command: &ExternalCommand) {
        let args = command.args();
        let [id] = args.as_slice() else {
            warn!("DEL_CRASH_REPORT expects 1 argument");
            return;
        };
        let directory = &core.paths().crash_reports_directory;
        if directory.as_os_str().is_empty() || id.contains(['/', '.']) {
            return;
        }
        let path = directory.join(id);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!(id, "deleted crash report"),
            Err(e) => info!(id, error = %e, "cannot delete crash report"),
        }
    }
}

/// Fire-and-forget delivery to the event console: connect, send the text
/// plus a terminating blank line, hang up. A refused connection is only a
/// log line.
fn send_to_event_console(socket_path: &Path, text: &str) {
    if socket_path.as_os_str().is_empty() {
        info!("event console disabled, ignoring command");
        return;
    }
    match UnixStream::connect(socket_path) {
        Ok(mut stream) => {
            if let Err(e) = stream.write_all(format!("{text}\n\n").as_bytes()) {
                warn!(socket = %socket_path.display(), error = %e, "cannot send to event console");
            }
        }
        Err(e) => {
            warn!(socket = %socket_path.display(), error = %e, "cannot reach event console");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monq_core::testing::TestCore;

    #[test]
    fn parse_with_and_without_timestamp() {
        let c = ExternalCommand::parse("[1700000000] SCHEDULE_HOST_CHECK;web01;1700000100").unwrap();
        assert_eq!(c.name(), "SCHEDULE_HOST_CHECK");
        assert_eq!(c.args(), vec!["web01", "1700000100"]);
        assert_eq!(
            c.to_line(),
            "[1700000000] SCHEDULE_HOST_CHECK;web01;1700000100"
        );

        let c = ExternalCommand::parse("DISABLE_NOTIFICATIONS").unwrap();
        assert_eq!(c.name(), "DISABLE_NOTIFICATIONS");
        assert!(c.args().is_empty());
        assert!(ExternalCommand::parse("[123 NO_BRACKET").is_err());
        assert!(ExternalCommand::parse("[123] ").is_err());
    }

    #[test]
    fn ordinary_commands_reach_the_core_verbatim() {
        let core = TestCore::new();
        let dispatcher = CommandDispatcher::new();
        dispatcher.dispatch(&core, "[1700000000] SCHEDULE_HOST_CHECK;web01;1700000100");
        assert_eq!(
            core.submitted_commands(),
            vec!["[1700000000] SCHEDULE_HOST_CHECK;web01;1700000100".to_string()]
        );
    }

    #[test]
    fn log_and_rotate_are_renamed_for_the_core() {
        let core = TestCore::new();
        let dispatcher = CommandDispatcher::new();
        dispatcher.dispatch(&core, "[1] LOG;hello");
        dispatcher.dispatch(&core, "[2] ROTATE_LOGFILE");
        assert_eq!(
            core.submitted_commands(),
            vec!["[1] _LOG;hello".to_string(), "[2] _ROTATE_LOGFILE".to_string()]
        );
    }

    #[test]
    fn event_console_commands_do_not_reach_the_core() {
        let core = TestCore::new();
        let dispatcher = CommandDispatcher::new();
        // no event console socket configured: the command vanishes quietly
        dispatcher.dispatch(&core, "[1700000000] EC_UPDATE;1;foo;bar");
        assert!(core.submitted_commands().is_empty());
    }

    #[test]
    fn local_commands_validate_their_arity() {
        let core = TestCore::new();
        let dispatcher = CommandDispatcher::new();
        dispatcher.dispatch(&core, "[1] MK_LOGWATCH_ACKNOWLEDGE;onlyhost");
        dispatcher.dispatch(&core, "[1] DEL_CRASH_REPORT");
        assert!(core.submitted_commands().is_empty());
    }
}
