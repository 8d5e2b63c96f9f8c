//! The table registry and the entry point for `GET` requests.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::ExecContext;
use crate::logcache::LogCache;
use crate::output::{OutputBuffer, ResponseCode};
use crate::parser::ParsedQuery;
use crate::query::Query;
use crate::table::by_group::{TableHostsByGroup, TableServicesByGroup, TableServicesByHostGroup};
use crate::table::columns::TableColumns;
use crate::table::commands::TableCommands;
use crate::table::comments::TableComments;
use crate::table::contactgroups::TableContactGroups;
use crate::table::contacts::TableContacts;
use crate::table::downtimes::TableDowntimes;
use crate::table::hostgroups::TableHostGroups;
use crate::table::hosts::TableHosts;
use crate::table::labels::TableLabels;
use crate::table::log::TableLog;
use crate::table::servicegroups::TableServiceGroups;
use crate::table::services::TableServices;
use crate::table::statehist::TableStateHistory;
use crate::table::status::TableStatus;
use crate::table::timeperiods::TableTimeperiods;
use crate::table::{Table, TableDummy};
use crate::trial::TrialManager;
use crate::user::User;

pub struct Store {
    tables: BTreeMap<&'static str, Box<dyn Table>>,
    dummy: TableDummy,
    log_cache: LogCache,
    trial: Option<TrialManager>,
}

impl Store {
    pub fn new() -> Store {
        let mut tables: Vec<Box<dyn Table>> = vec![
            Box::new(TableCommands::new()),
            Box::new(TableComments::new()),
            Box::new(TableContactGroups::new()),
            Box::new(TableContacts::new()),
            Box::new(TableDowntimes::new()),
            Box::new(TableHostGroups::new()),
            Box::new(TableHosts::new()),
            Box::new(TableHostsByGroup::new()),
            Box::new(TableLabels::new()),
            Box::new(TableLog::new()),
            Box::new(TableServiceGroups::new()),
            Box::new(TableServices::new()),
            Box::new(TableServicesByGroup::new()),
            Box::new(TableServicesByHostGroup::new()),
            Box::new(TableStateHistory::new()),
            Box::new(TableStatus::new()),
            Box::new(TableTimeperiods::new()),
        ];
        // the meta table is built last so it can describe all the others
        // (and itself)
        let refs: Vec<&dyn Table> = tables.iter().map(|t| t.as_ref()).collect();
        let columns = TableColumns::new(&refs);
        drop(refs);
        tables.push(Box::new(columns));

        Store {
            tables: tables.into_iter().map(|t| (t.name(), t)).collect(),
            dummy: TableDummy::new(),
            log_cache: LogCache::new(),
            trial: None,
        }
    }

    pub fn with_trial_manager(mut self, trial: TrialManager) -> Store {
        self.trial = Some(trial);
        self
    }

    pub fn log_cache(&self) -> &LogCache {
        &self.log_cache
    }

    pub fn table(&self, name: &str) -> Option<&dyn Table> {
        self.tables.get(name).map(|t| t.as_ref())
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.keys().copied().collect()
    }

    fn find_table(&self, output: &mut OutputBuffer, name: &str) -> &dyn Table {
        // even with an unknown table the headers are parsed, so that a
        // ResponseHeader line still frames the error reply
        if name.is_empty() {
            output.set_error(
                ResponseCode::InvalidRequest,
                "Invalid GET request, missing table name",
            );
            return &self.dummy;
        }
        match self.tables.get(name) {
            Some(table) => table.as_ref(),
            None => {
                output.set_error(
                    ResponseCode::NotFound,
                    format!("Invalid GET request, no such table '{name}'"),
                );
                &self.dummy
            }
        }
    }

    /// Answer one `GET` request. Returns whether the connection should be
    /// kept alive.
    pub fn answer_get_request(
        &self,
        ctx: &ExecContext<'_>,
        lines: &[String],
        output: &mut OutputBuffer,
        table_name: &str,
    ) -> bool {
        let table = self.find_table(output, table_name);
        let parsed = ParsedQuery::parse(
            lines,
            || table.column_set().all(),
            |name| table.column(name),
        );
        let user = User::from_name(
            ctx.graph(),
            parsed.user.as_deref(),
            ctx.core.service_authorization(),
            ctx.core.group_authorization(),
        );
        let mut query = Query::new(
            parsed,
            output,
            table.name(),
            ctx.core.limits().max_response_size,
        );
        if let Some(trial) = &self.trial {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            if let Err(e) = trial.validate_service_count(now, ctx.graph().services().len()) {
                query.payload_too_large(e.to_string());
            }
        }
        query.process(table, &user, ctx)
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::model::{Comment, Host, HostGroup, Service};
    use crate::testing::{TestCore, TestEnv, run_request, run_request_str};

    fn small_world() -> TestCore {
        let mut core = TestCore::new();
        let g = &mut core.graph;
        let foo = g.insert_host(Host {
            name: "foo".into(),
            state: 2,
            has_been_checked: true,
            ..Host::default()
        });
        let bar = g.insert_host(Host {
            name: "bar".into(),
            state: 0,
            has_been_checked: true,
            ..Host::default()
        });
        g.insert_host_group(HostGroup {
            name: "linux".into(),
            members: vec![bar],
            ..HostGroup::default()
        });
        for (host, description, state) in [
            (foo, "HTTP", 0),
            (foo, "SSH", 0),
            (foo, "DISK", 2),
            (bar, "HTTP", 0),
            (bar, "LOAD", 2),
        ] {
            g.insert_service(Service {
                host,
                description: description.into(),
                state,
                has_been_checked: true,
                ..Service::default()
            });
        }
        core
    }

    fn write_history(core: &mut TestCore, lines: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history");
        let mut f = std::fs::File::create(&history).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        core.paths.history_file = history;
        core.paths.history_archive_directory = dir.path().join("archive");
        dir
    }

    #[test]
    fn named_columns_filtered_by_name() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(&store, &core, "GET hosts\nColumns: name state\nFilter: name = foo\n\n");
        assert_eq!(body, "foo;2\n");
    }

    #[test]
    fn default_columns_come_with_headers_and_are_sorted() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(&store, &core, "GET contactgroups\n\n");
        assert_eq!(body.lines().next().unwrap(), "alias;members;name");
    }

    #[test]
    fn stats_count_services_by_state() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(
            &store,
            &core,
            "GET services\nStats: state = 0\nStats: state = 2\n\n",
        );
        assert_eq!(body, "3;2\n");
    }

    #[test]
    fn stats_group_by_pre_rendered_columns() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(
            &store,
            &core,
            "GET services\nColumns: host_name\nStats: state = 0\n\n",
        );
        let mut lines: Vec<&str> = body.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["bar;1", "foo;2"]);
    }

    #[test]
    fn limit_caps_the_row_count() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(&store, &core, "GET services\nColumns: description\nLimit: 2\n\n");
        assert_eq!(body.lines().count(), 2);
        let body = run_request_str(&store, &core, "GET services\nColumns: description\nLimit: 0\n\n");
        assert_eq!(body, "");
    }

    #[test]
    fn group_membership_filter_uses_the_group_index() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(&store, &core, "GET hosts\nColumns: name\nFilter: groups >= linux\n\n");
        assert_eq!(body, "bar\n");
    }

    #[test]
    fn unknown_table_is_not_found_with_fixed16() {
        let store = Store::new();
        let core = small_world();
        let response = run_request_str(
            &store,
            &core,
            "GET nosuch\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("404 "), "{response}");
        assert!(response.contains("no such table"), "{response}");
        // without fixed16 the error is invisible
        let response = run_request(&store, &core, "GET nosuch\n\n");
        assert!(response.is_empty());
    }

    #[test]
    fn fixed16_frames_a_successful_body() {
        let store = Store::new();
        let core = small_world();
        let response = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name\nFilter: name = foo\nResponseHeader: fixed16\n\n",
        );
        assert_eq!(response, "200           4\nfoo\n");
    }

    #[test]
    fn parse_errors_are_reported_before_any_rows() {
        let store = Store::new();
        let core = small_world();
        let response = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name\nAnd: 5\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("452 "), "{response}");
        assert!(!response.contains("foo"));
    }

    #[test]
    fn json_output_format() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name state\nFilter: name = foo\nOutputFormat: json\n\n",
        );
        assert_eq!(body, "[[\"foo\",2]]\n");
    }

    #[test]
    fn order_by_sorts_and_applies_the_limit_after_sorting() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(
            &store,
            &core,
            "GET services\nColumns: description\nOrderBy: description desc\nLimit: 2\n\n",
        );
        assert_eq!(body, "SSH\nLOAD\n");
    }

    #[test]
    fn auth_user_gates_rows() {
        let store = Store::new();
        let mut core = TestCore::new();
        let alice = core.graph.insert_contact(crate::model::Contact {
            name: "alice".into(),
            ..Default::default()
        });
        core.graph.insert_host(Host {
            name: "mine".into(),
            contacts: vec![alice],
            ..Host::default()
        });
        core.graph.insert_host(Host {
            name: "other".into(),
            ..Host::default()
        });
        let body = run_request_str(&store, &core, "GET hosts\nColumns: name\nAuthUser: alice\n\n");
        assert_eq!(body, "mine\n");
        // an unknown user sees nothing at all
        let body = run_request_str(&store, &core, "GET hosts\nColumns: name\nAuthUser: eve\n\n");
        assert_eq!(body, "");
    }

    #[test]
    fn comments_join_their_host_columns() {
        let store = Store::new();
        let core = small_world();
        let host = core.graph.find_host("foo").unwrap().id;
        core.add_comment(Comment {
            id: 42,
            host,
            service: None,
            author: "admin".into(),
            comment: "looking into it".into(),
            entry_time: 1000,
            entry_type: crate::model::COMMENT_ENTRY_USER,
            persistent: true,
            expires: false,
            expire_time: 0,
        });
        let body = run_request_str(
            &store,
            &core,
            "GET comments\nColumns: id author host_name host_state\n\n",
        );
        assert_eq!(body, "42;admin;foo;2\n");
    }

    #[test]
    fn columns_meta_table_has_one_row_per_installed_column() {
        let store = Store::new();
        let core = TestCore::new();
        let body = run_request_str(&store, &core, "GET columns\nColumns: table name\n\n");
        let rows: Vec<&str> = body.lines().collect();
        let mut expected = 0;
        for name in store.table_names() {
            expected += store.table(name).unwrap().column_set().all().len();
        }
        assert_eq!(rows.len(), expected);
        assert!(rows.contains(&"hosts;name"));
        assert!(rows.contains(&"columns;table"));
        // no duplicates
        let mut sorted = rows.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), rows.len());
    }

    #[test]
    fn log_table_serves_the_query_window_newest_first() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(
            &mut core,
            &[
                "[500] HOST ALERT: foo;DOWN;HARD;1;early",
                "[1500] HOST ALERT: foo;DOWN;HARD;1;in window",
                "[1600] SERVICE ALERT: foo;HTTP;CRITICAL;HARD;1;also in window",
                "[2500] HOST ALERT: foo;UP;HARD;1;late",
            ],
        );
        let body = run_request_str(
            &store,
            &core,
            "GET log\nColumns: time type\nFilter: time >= 1000\nFilter: time < 2000\nAnd: 2\n\n",
        );
        assert_eq!(body, "1600;SERVICE ALERT\n1500;HOST ALERT\n");
    }

    #[test]
    fn log_class_filter_limits_loading_to_the_value_set() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(
            &mut core,
            &[
                "[1000] HOST ALERT: foo;DOWN;HARD;1;x",
                "[1100] some chatter",
                "[1200] EXTERNAL COMMAND: DISABLE_NOTIFICATIONS",
            ],
        );
        let body = run_request_str(
            &store,
            &core,
            "GET log\nColumns: time class\nFilter: time >= 0\nFilter: class = 1\n\n",
        );
        assert_eq!(body, "1000;1\n");
    }

    #[test]
    fn statehist_replays_transitions_into_sub_intervals() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(
            &mut core,
            &[
                "[10] HOST ALERT: foo;DOWN;HARD;1;went down",
                "[60] HOST ALERT: foo;UP;HARD;1;back up",
            ],
        );
        let body = run_request_str(
            &store,
            &core,
            "GET statehist\nColumns: host_name duration state\n\
             Filter: time >= 0\nFilter: time < 100\nAnd: 2\nFilter: host_name = foo\n\n",
        );
        // [0,10] initial, [10,60] down, [60,99] up again (the window is
        // closed at second resolution, so the final interval ends at 99)
        assert_eq!(body, "foo;10;0\nfoo;50;1\nfoo;39;0\n");
    }


    #[test]
    fn statehist_marks_unconfirmed_objects_as_vanished_after_a_restart() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(
            &mut core,
            &[
                "[100] HOST ALERT: foo;DOWN;HARD;1;went down",
                "[200] logging initial states",
                "[201] INITIAL HOST STATE: foo;DOWN;HARD;1;still down",
                "[300] logging initial states",
                "[301] INITIAL HOST STATE: bar;UP;HARD;1;fine",
            ],
        );
        let body = run_request_str(
            &store,
            &core,
            "GET statehist\nColumns: host_name duration state\n\
             Filter: time >= 0\nFilter: time < 400\nAnd: 2\nFilter: host_name = foo\n\n",
        );
        // confirmed after the first restart, unconfirmed after the second:
        // the last known state ends at the second marker, the rest of the
        // window is unmonitored
        assert_eq!(body, "foo;100;0\nfoo;200;1\nfoo;99;-1\n");
    }

    #[test]
    fn statehist_requires_a_lower_time_bound() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(&mut core, &["[10] HOST ALERT: foo;DOWN;HARD;1;x"]);
        let response = run_request_str(
            &store,
            &core,
            "GET statehist\nColumns: host_name\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("452 "), "{response}");
        assert!(response.contains("Start of timeframe required"), "{response}");
    }

    #[test]
    fn statehist_durations_sum_to_the_window() {
        let store = Store::new();
        let mut core = small_world();
        let _dir = write_history(
            &mut core,
            &[
                "[100010] HOST ALERT: foo;DOWN;HARD;1;a",
                "[100200] HOST ALERT: foo;UNREACHABLE;HARD;1;b",
                "[100700] HOST ALERT: foo;UP;HARD;1;c",
            ],
        );
        let body = run_request_str(
            &store,
            &core,
            "GET statehist\nColumns: duration\n\
             Filter: time >= 100000\nFilter: time <= 101000\nAnd: 2\nFilter: host_name = foo\n\n",
        );
        let total: i64 = body.lines().map(|l| l.parse::<i64>().unwrap()).sum();
        // closed interval arithmetic: [since, until + 1) minus one second
        assert_eq!(total, 1000);
    }

    #[test]
    fn contradictory_wait_condition_with_zero_timeout_is_invalid() {
        let store = Store::new();
        let core = small_world();
        let response = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name\nWaitConditionOr: 0\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("452 "), "{response}");
        assert!(response.contains("hang forever"), "{response}");
    }

    #[test]
    fn satisfied_wait_condition_does_not_block() {
        let store = Store::new();
        let core = small_world();
        let body = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name\nFilter: name = foo\n\
             WaitObject: foo\nWaitCondition: state = 2\nWaitTimeout: 5000\n\n",
        );
        assert_eq!(body, "foo\n");
    }

    #[test]
    fn keepalive_header_is_passed_through() {
        let store = Store::new();
        let core = small_world();
        let env = TestEnv::new();
        let ctx = crate::core::ExecContext {
            core: &core,
            counters: &env.counters,
            triggers: &env.triggers,
            log_cache: store.log_cache(),
            should_terminate: &env.should_terminate,
        };
        let mut output = crate::output::OutputBuffer::new();
        let keepalive =
            store.answer_get_request(&ctx, &["KeepAlive: on".to_string()], &mut output, "hosts");
        assert!(keepalive);
        let mut output = crate::output::OutputBuffer::new();
        let keepalive = store.answer_get_request(&ctx, &[], &mut output, "hosts");
        assert!(!keepalive);
    }

    #[test]
    fn response_size_cap_fails_the_query() {
        let store = Store::new();
        let mut core = small_world();
        core.limits.max_response_size = 8;
        let response = run_request_str(
            &store,
            &core,
            "GET services\nColumns: description\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("413 "), "{response}");
    }

    #[test]
    fn expired_trial_over_limit_rejects_queries() {
        use crate::trial::TrialManager;
        let store = Store::new().with_trial_manager(TrialManager::new(0, false));
        let core = small_world();
        // 5 services stay below the cap: the query is fine
        let response = run_request_str(
            &store,
            &core,
            "GET hosts\nColumns: name\nFilter: name = foo\nResponseHeader: fixed16\n\n",
        );
        assert!(response.starts_with("200 "), "{response}");
    }
}
