//! Startup configuration.
//!
//! The daemon is configured the way the in-core module always was: a list
//! of whitespace-separated `key=value` options. A bare token (no `=`) sets
//! the query-socket path. Unknown keys warn and are ignored so that old
//! and new option sets stay interchangeable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use monq_core::core::{CoreLimits, CorePaths, DataEncoding};
use monq_core::user::{GroupAuthorization, ServiceAuthorization};

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: CorePaths,
    pub limits: CoreLimits,
    pub debug_level: u8,
    pub num_client_threads: usize,
    pub thread_stack_size: usize,
    pub query_timeout: Duration,
    pub idle_timeout: Duration,
    pub service_authorization: ServiceAuthorization,
    pub group_authorization: GroupAuthorization,
    pub data_encoding: DataEncoding,
    pub edition: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: CorePaths::default(),
            limits: CoreLimits::default(),
            debug_level: 0,
            num_client_threads: 10,
            thread_stack_size: 1024 * 1024,
            query_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            service_authorization: ServiceAuthorization::Loose,
            group_authorization: GroupAuthorization::Loose,
            data_encoding: DataEncoding::Utf8,
            edition: "raw".to_string(),
        }
    }
}

fn parse_number(value: &str) -> Option<usize> {
    value.parse().ok()
}

/// Warn-and-skip check for configured directories, matching the module's
/// behavior: a missing path disables the feature instead of failing
/// startup.
fn check_path(what: &str, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if !path.exists() {
        warn!(what, path = value, "path not existing, disabling");
        return PathBuf::new();
    }
    path
}

impl Config {
    pub fn parse_arguments(arguments: &str) -> Config {
        let mut config = Config::default();
        for token in arguments.split_whitespace() {
            match token.split_once('=') {
                None => {
                    config.paths.query_socket = PathBuf::from(token);
                }
                Some((key, value)) => config.apply(key, value),
            }
        }
        config.finish();
        config
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "debug" => self.debug_level = value.parse().unwrap_or(0),
            "max_cached_messages" => {
                if let Some(n) = parse_number(value) {
                    self.limits.max_cached_messages = n;
                }
            }
            "max_lines_per_logfile" => {
                if let Some(n) = parse_number(value) {
                    self.limits.max_lines_per_log_file = n;
                }
            }
            "max_response_size" => {
                if let Some(n) = parse_number(value) {
                    self.limits.max_response_size = n;
                }
            }
            "thread_stack_size" => {
                if let Some(n) = parse_number(value) {
                    self.thread_stack_size = n;
                }
            }
            "num_client_threads" => match parse_number(value) {
                Some(n) if n > 0 && n <= 1000 => self.num_client_threads = n,
                _ => warn!(value, "num_client_threads must be > 0 and <= 1000"),
            },
            "query_timeout" => match parse_number(value) {
                Some(ms) => self.query_timeout = Duration::from_millis(ms as u64),
                None => warn!(value, "query_timeout must be >= 0"),
            },
            "idle_timeout" => match parse_number(value) {
                Some(ms) => self.idle_timeout = Duration::from_millis(ms as u64),
                None => warn!(value, "idle_timeout must be >= 0"),
            },
            "service_authorization" => match value {
                "strict" => self.service_authorization = ServiceAuthorization::Strict,
                "loose" => self.service_authorization = ServiceAuthorization::Loose,
                _ => warn!(value, "invalid service authorization mode, allowed are strict and loose"),
            },
            "group_authorization" => match value {
                "strict" => self.group_authorization = GroupAuthorization::Strict,
                "loose" => self.group_authorization = GroupAuthorization::Loose,
                _ => warn!(value, "invalid group authorization mode, allowed are strict and loose"),
            },
            "log_file" => self.paths.log_file = PathBuf::from(value),
            "history_file" => self.paths.history_file = PathBuf::from(value),
            "history_archive" => self.paths.history_archive_directory = PathBuf::from(value),
            "crash_reports_path" => {
                self.paths.crash_reports_directory = check_path("crash reports directory", value);
            }
            "license_usage_history_path" => {
                self.paths.license_usage_history_file =
                    check_path("license usage history file", value);
            }
            "mk_inventory_path" => {
                self.paths.inventory_directory = check_path("inventory directory", value);
            }
            "structured_status_path" => {
                self.paths.structured_status_directory =
                    check_path("structured status directory", value);
            }
            "robotmk_html_log_path" => {
                self.paths.robotmk_html_log_directory =
                    check_path("robotmk html log directory", value);
            }
            "mk_logwatch_path" => {
                self.paths.logwatch_directory = check_path("logwatch directory", value);
            }
            "prediction_path" => {
                self.paths.prediction_directory = check_path("prediction directory", value);
            }
            "mkeventd_socket" => {
                self.paths.event_console_status_socket = PathBuf::from(value);
            }
            "state_file_created_file" => {
                self.paths.state_file_created_file = PathBuf::from(value);
            }
            "licensed_state_file" => {
                self.paths.licensed_state_file = PathBuf::from(value);
            }
            "pnp_path" => {
                self.paths.rrd_multiple_directory = check_path("RRD multiple directory", value);
            }
            "data_encoding" => match value {
                "utf8" => self.data_encoding = DataEncoding::Utf8,
                "latin1" => self.data_encoding = DataEncoding::Latin1,
                "mixed" => self.data_encoding = DataEncoding::Mixed,
                _ => warn!(value, "invalid data_encoding, allowed are utf8, latin1 and mixed"),
            },
            "edition" => self.edition = value.to_string(),
            _ => warn!(key, value, "ignoring invalid option"),
        }
    }

    /// Derive the defaults that hang off other settings.
    fn finish(&mut self) {
        if self.paths.query_socket.as_os_str().is_empty() {
            self.paths.query_socket = PathBuf::from("/usr/local/monq/var/rw/live");
        }
        let socket_dir = self
            .paths
            .query_socket
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if self.paths.event_console_status_socket.as_os_str().is_empty() {
            self.paths.event_console_status_socket = socket_dir.join("mkeventd/status");
        }
        if self.paths.log_file.as_os_str().is_empty() {
            self.paths.log_file = socket_dir.join("monq.log");
        }
        if self.paths.history_archive_directory.as_os_str().is_empty() {
            if let Some(dir) = self.paths.history_file.parent() {
                self.paths.history_archive_directory = dir.join("archive");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_sets_the_socket_path() {
        let config = Config::parse_arguments("/omd/sites/x/tmp/run/live debug=2");
        assert_eq!(
            config.paths.query_socket,
            PathBuf::from("/omd/sites/x/tmp/run/live")
        );
        assert_eq!(config.debug_level, 2);
    }

    #[test]
    fn numeric_limits_are_applied() {
        let config = Config::parse_arguments(
            "max_cached_messages=1000 max_lines_per_logfile=50 max_response_size=4096 \
             num_client_threads=3 query_timeout=500 idle_timeout=1000",
        );
        assert_eq!(config.limits.max_cached_messages, 1000);
        assert_eq!(config.limits.max_lines_per_log_file, 50);
        assert_eq!(config.limits.max_response_size, 4096);
        assert_eq!(config.num_client_threads, 3);
        assert_eq!(config.query_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
    }

    #[test]
    fn out_of_range_thread_count_keeps_the_default() {
        let config = Config::parse_arguments("num_client_threads=0");
        assert_eq!(config.num_client_threads, 10);
        let config = Config::parse_arguments("num_client_threads=2000");
        assert_eq!(config.num_client_threads, 10);
    }

    #[test]
    fn authorization_modes() {
        let config =
            Config::parse_arguments("service_authorization=strict group_authorization=strict");
        assert_eq!(config.service_authorization, ServiceAuthorization::Strict);
        assert_eq!(config.group_authorization, GroupAuthorization::Strict);
        let config = Config::parse_arguments("service_authorization=bogus");
        assert_eq!(config.service_authorization, ServiceAuthorization::Loose);
    }

    #[test]
    fn event_console_socket_defaults_next_to_the_query_socket() {
        let config = Config::parse_arguments("/run/monq/live");
        assert_eq!(
            config.paths.event_console_status_socket,
            PathBuf::from("/run/monq/mkeventd/status")
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::parse_arguments("livecheck=yes whatever=1");
        assert_eq!(config.num_client_threads, 10);
    }
}
