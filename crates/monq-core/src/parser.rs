//! The line-oriented request parser.
//!
//! Each header line is `Name: arguments`. Errors never abort the parse;
//! the first one is recorded on the query and reported before any rows, so
//! later headers (notably `ResponseHeader:`) still take effect.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::column::Column;
use crate::filter::{ColumnFilter, Filter, FilterKind, RelOp};
use crate::output::ResponseHeaderMode;
use crate::render::{CsvSeparators, OutputFormat};
use crate::stats::{AggregationKind, StatsColumn};
use crate::triggers::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

pub struct OrderBy {
    pub column: Arc<Column>,
    /// Entry of a dict column, `OrderBy: col.key`.
    pub key: Option<String>,
    pub direction: OrderDirection,
}

pub struct ParsedQuery {
    pub error: Option<String>,
    pub all_column_names: HashSet<String>,
    pub columns: Vec<Arc<Column>>,
    pub filter: Filter,
    pub wait_condition: Filter,
    pub stats_columns: Vec<StatsColumn>,
    pub show_column_headers: bool,
    pub limit: Option<usize>,
    pub time_limit: Option<(u64, Instant)>,
    pub separators: CsvSeparators,
    pub output_format: OutputFormat,
    pub keepalive: bool,
    pub response_header: ResponseHeaderMode,
    pub user: Option<String>,
    pub wait_timeout: Duration,
    pub wait_trigger: Trigger,
    pub wait_object: Option<String>,
    pub timezone_offset: i64,
    pub order_by: Vec<OrderBy>,
}

fn next_string_argument<'x>(line: &mut &'x str) -> Result<&'x str, String> {
    *line = line.trim_start();
    if line.is_empty() {
        return Err("missing argument".to_string());
    }
    let end = line
        .find(char::is_whitespace)
        .unwrap_or(line.len());
    let argument = &line[..end];
    *line = &line[end..];
    Ok(argument)
}

fn next_non_negative_integer(line: &mut &str) -> Result<i64, String> {
    let argument = next_string_argument(line)?;
    argument
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| "expected non-negative integer".to_string())
}

fn check_no_arguments(line: &str) -> Result<(), String> {
    if line.trim().is_empty() {
        Ok(())
    } else {
        Err("superfluous argument(s)".to_string())
    }
}

fn pop_n(stack: &mut Vec<Filter>, n: usize) -> Result<Vec<Filter>, String> {
    if stack.len() < n {
        return Err(format!(
            "cannot combine filters: expecting {} filter{}, but only {} {} on stack",
            n,
            if n == 1 { "" } else { "s" },
            stack.len(),
            if stack.len() == 1 { "is" } else { "are" }
        ));
    }
    Ok(stack.split_off(stack.len() - n))
}

impl ParsedQuery {
    pub fn parse(
        lines: &[String],
        all_columns: impl Fn() -> Vec<Arc<Column>>,
        make_column: impl Fn(&str) -> Result<Arc<Column>, String>,
    ) -> ParsedQuery {
        let mut q = ParsedQuery {
            error: None,
            all_column_names: HashSet::new(),
            columns: Vec::new(),
            filter: Filter::tautology(),
            wait_condition: Filter::tautology(),
            stats_columns: Vec::new(),
            show_column_headers: true,
            limit: None,
            time_limit: None,
            separators: CsvSeparators::default(),
            output_format: OutputFormat::BrokenCsv,
            keepalive: false,
            response_header: ResponseHeaderMode::Off,
            user: None,
            wait_timeout: Duration::ZERO,
            wait_trigger: Trigger::All,
            wait_object: None,
            timezone_offset: 0,
            order_by: Vec::new(),
        };

        let mut filters: Vec<Filter> = Vec::new();
        let mut wait_conditions: Vec<Filter> = Vec::new();

        for line in lines {
            let (header, mut args) = match line.find(':') {
                Some(pos) => (&line[..pos], &line[pos + 1..]),
                None => (line.as_str(), ""),
            };
            args = args.trim_start();
            let result = match header {
                "Filter" => q.parse_filter_line(args, FilterKind::Row, &mut filters, &make_column),
                "Or" => Self::parse_and_or_line(args, false, &mut filters),
                "And" => Self::parse_and_or_line(args, true, &mut filters),
                "Negate" => Self::parse_negate_line(args, &mut filters),
                "StatsOr" => q.parse_stats_and_or_line(args, false),
                "StatsAnd" => q.parse_stats_and_or_line(args, true),
                "StatsNegate" => q.parse_stats_negate_line(args),
                "Stats" => q.parse_stats_line(args, &make_column),
                "Columns" => q.parse_columns_line(args, &make_column),
                "ColumnHeaders" => q.parse_column_headers_line(args),
                "Limit" => q.parse_limit_line(args),
                "Timelimit" => q.parse_time_limit_line(args),
                "AuthUser" => {
                    q.user = Some(args.to_string());
                    Ok(())
                }
                "Separators" => q.parse_separators_line(args),
                "OutputFormat" => q.parse_output_format_line(args),
                "ResponseHeader" => q.parse_response_header_line(args),
                "KeepAlive" => q.parse_keep_alive_line(args),
                "WaitCondition" => {
                    q.parse_filter_line(args, FilterKind::WaitCondition, &mut wait_conditions, &make_column)
                }
                "WaitConditionAnd" => Self::parse_and_or_line(args, true, &mut wait_conditions),
                "WaitConditionOr" => Self::parse_and_or_line(args, false, &mut wait_conditions),
                "WaitConditionNegate" => Self::parse_negate_line(args, &mut wait_conditions),
                "WaitTrigger" => q.parse_wait_trigger_line(args),
                "WaitObject" => {
                    q.wait_object = Some(args.to_string());
                    Ok(())
                }
                "WaitTimeout" => q.parse_wait_timeout_line(args),
                "Localtime" => q.parse_localtime_line(args),
                "OrderBy" => q.parse_order_by_line(args, &make_column),
                _ => Err("undefined request header".to_string()),
            };
            if let Err(message) = result {
                if q.error.is_none() {
                    q.error = Some(format!("while processing header '{header}': {message}"));
                }
            }
        }

        if q.columns.is_empty() && q.stats_columns.is_empty() {
            for column in all_columns() {
                q.all_column_names.insert(column.name().to_string());
                q.columns.push(column);
            }
            q.show_column_headers = true;
        }

        q.filter = Filter::combine_and(filters);
        q.wait_condition = Filter::combine_and(wait_conditions);
        q
    }

    fn parse_filter_line(
        &mut self,
        mut args: &str,
        kind: FilterKind,
        stack: &mut Vec<Filter>,
        make_column: &impl Fn(&str) -> Result<Arc<Column>, String>,
    ) -> Result<(), String> {
        let column_name = next_string_argument(&mut args)?.to_string();
        let op = RelOp::from_name(next_string_argument(&mut args)?)?;
        let value = args.trim_start();
        let column = make_column(&column_name)?;
        stack.push(Filter::Column(ColumnFilter::new(kind, column, op, value)?));
        self.all_column_names.insert(column_name);
        Ok(())
    }

    fn parse_and_or_line(mut args: &str, and: bool, stack: &mut Vec<Filter>) -> Result<(), String> {
        let number = next_non_negative_integer(&mut args)? as usize;
        let popped = pop_n(stack, number)?;
        stack.push(if and {
            Filter::combine_and(popped)
        } else {
            Filter::combine_or(popped)
        });
        Ok(())
    }

    fn parse_negate_line(args: &str, stack: &mut Vec<Filter>) -> Result<(), String> {
        check_no_arguments(args)?;
        let popped = pop_n(stack, 1)?;
        stack.push(popped[0].negate());
        Ok(())
    }

    fn parse_stats_line(
        &mut self,
        mut args: &str,
        make_column: &impl Fn(&str) -> Result<Arc<Column>, String>,
    ) -> Result<(), String> {
        // first token is either an aggregation operator or a column name
        let first = next_string_argument(&mut args)?;
        match AggregationKind::from_name(first) {
            Some(kind) => {
                let column_name = next_string_argument(&mut args)?.to_string();
                let column = make_column(&column_name)?;
                self.stats_columns.push(StatsColumn::Operation { kind, column });
                self.all_column_names.insert(column_name);
            }
            None => {
                let column_name = first.to_string();
                let op = RelOp::from_name(next_string_argument(&mut args)?)?;
                let value = args.trim_start();
                let column = make_column(&column_name)?;
                self.stats_columns.push(StatsColumn::Count(Filter::Column(
                    ColumnFilter::new(FilterKind::Stats, column, op, value)?,
                )));
                self.all_column_names.insert(column_name);
            }
        }
        // stats queries traditionally come without column headers
        self.show_column_headers = false;
        Ok(())
    }

    fn parse_stats_and_or_line(&mut self, mut args: &str, and: bool) -> Result<(), String> {
        let number = next_non_negative_integer(&mut args)? as usize;
        if self.stats_columns.len() < number {
            return Err(format!(
                "cannot combine filters: expecting {} filters, but only {} are on stack",
                number,
                self.stats_columns.len()
            ));
        }
        let popped = self
            .stats_columns
            .split_off(self.stats_columns.len() - number);
        let filters: Vec<Filter> = popped.into_iter().map(|sc| sc.steal_filter()).collect();
        self.stats_columns.push(StatsColumn::Count(if and {
            Filter::combine_and(filters)
        } else {
            Filter::combine_or(filters)
        }));
        Ok(())
    }

    fn parse_stats_negate_line(&mut self, args: &str) -> Result<(), String> {
        check_no_arguments(args)?;
        let Some(top) = self.stats_columns.pop() else {
            return Err(
                "cannot combine filters: expecting 1 filter, but only 0 are on stack".to_string(),
            );
        };
        self.stats_columns
            .push(StatsColumn::Count(top.steal_filter().negate()));
        Ok(())
    }

    fn parse_columns_line(
        &mut self,
        args: &str,
        make_column: &impl Fn(&str) -> Result<Arc<Column>, String>,
    ) -> Result<(), String> {
        for column_name in args.split_whitespace() {
            // unknown names become null columns so that column lists stay
            // compatible between sites running different versions
            let column = make_column(column_name).unwrap_or_else(|_| Column::null(column_name));
            self.columns.push(column);
            self.all_column_names.insert(column_name.to_string());
        }
        self.show_column_headers = false;
        Ok(())
    }

    fn parse_column_headers_line(&mut self, mut args: &str) -> Result<(), String> {
        match next_string_argument(&mut args)? {
            "on" => self.show_column_headers = true,
            "off" => self.show_column_headers = false,
            _ => return Err("expected 'on' or 'off'".to_string()),
        }
        Ok(())
    }

    fn parse_limit_line(&mut self, mut args: &str) -> Result<(), String> {
        self.limit = Some(next_non_negative_integer(&mut args)? as usize);
        Ok(())
    }

    fn parse_time_limit_line(&mut self, mut args: &str) -> Result<(), String> {
        let duration = next_non_negative_integer(&mut args)? as u64;
        self.time_limit = Some((duration, Instant::now() + Duration::from_secs(duration)));
        Ok(())
    }

    fn parse_separators_line(&mut self, mut args: &str) -> Result<(), String> {
        let dataset = next_non_negative_integer(&mut args)? as u8;
        let field = next_non_negative_integer(&mut args)? as u8;
        let list = next_non_negative_integer(&mut args)? as u8;
        let host_service = next_non_negative_integer(&mut args)? as u8;
        self.separators = CsvSeparators::from_bytes(dataset, field, list, host_service);
        Ok(())
    }

    fn parse_output_format_line(&mut self, mut args: &str) -> Result<(), String> {
        self.output_format = match next_string_argument(&mut args)? {
            "CSV" => OutputFormat::Csv,
            "csv" => OutputFormat::BrokenCsv,
            "json" => OutputFormat::Json,
            // "python" is an alias kept for older clients
            "python" | "python3" => OutputFormat::Python,
            _ => {
                return Err(
                    "missing/invalid output format, use one of 'CSV', 'csv', 'json', 'python', 'python3'"
                        .to_string(),
                );
            }
        };
        Ok(())
    }

    fn parse_response_header_line(&mut self, mut args: &str) -> Result<(), String> {
        match next_string_argument(&mut args)? {
            "off" => self.response_header = ResponseHeaderMode::Off,
            "fixed16" => self.response_header = ResponseHeaderMode::Fixed16,
            _ => return Err("expected 'off' or 'fixed16'".to_string()),
        }
        Ok(())
    }

    fn parse_keep_alive_line(&mut self, mut args: &str) -> Result<(), String> {
        match next_string_argument(&mut args)? {
            "on" => self.keepalive = true,
            "off" => self.keepalive = false,
            _ => return Err("expected 'on' or 'off'".to_string()),
        }
        Ok(())
    }

    fn parse_wait_trigger_line(&mut self, mut args: &str) -> Result<(), String> {
        self.wait_trigger = Trigger::from_name(next_string_argument(&mut args)?)?;
        Ok(())
    }

    fn parse_wait_timeout_line(&mut self, mut args: &str) -> Result<(), String> {
        let millis = next_non_negative_integer(&mut args)? as u64;
        self.wait_timeout = Duration::from_millis(millis);
        Ok(())
    }

    fn parse_localtime_line(&mut self, mut args: &str) -> Result<(), String> {
        let client_now = next_non_negative_integer(&mut args)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        // Round to half hours: both clocks are assumed to be synchronized,
        // the remaining difference is the time zone.
        let offset = ((client_now - now) as f64 / 1800.0).round() as i64 * 1800;
        if offset.abs() >= 24 * 3600 {
            return Err("timezone difference greater than or equal to 24 hours".to_string());
        }
        self.timezone_offset = offset;
        Ok(())
    }

    fn parse_order_by_line(
        &mut self,
        mut args: &str,
        make_column: &impl Fn(&str) -> Result<Arc<Column>, String>,
    ) -> Result<(), String> {
        let spec = next_string_argument(&mut args)?;
        let direction = match args.trim() {
            "" | "asc" => OrderDirection::Ascending,
            "desc" => OrderDirection::Descending,
            _ => return Err("expected 'asc' or 'desc'".to_string()),
        };
        let (column_name, key) = match spec.find('.') {
            Some(dot) => (&spec[..dot], Some(spec[dot + 1..].to_string())),
            None => (spec, None),
        };
        self.order_by.push(OrderBy {
            column: make_column(column_name)?,
            key,
            direction,
        });
        Ok(())
    }

    pub fn do_stats(&self) -> bool {
        !self.stats_columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::extract_fn;
    use crate::model::Host;
    use crate::render::OutputFormat;
    use crate::row::RowRef;
    use crate::stats::StatsColumn;
    use crate::testing::TestEnv;
    use crate::value::{ColumnType, Value};

    fn make_column(name: &str) -> Result<Arc<Column>, String> {
        match name {
            "name" => Ok(Column::new(
                "name",
                "",
                ColumnType::String,
                extract_fn(|row, _| match row {
                    RowRef::Host(h) => Value::Str(h.name.clone()),
                    _ => Value::Null,
                }),
            )),
            "state" => Ok(Column::new(
                "state",
                "",
                ColumnType::Int,
                extract_fn(|row, _| match row {
                    RowRef::Host(h) => Value::Int(h.state),
                    _ => Value::Null,
                }),
            )),
            "time" => Ok(Column::new(
                "time",
                "",
                ColumnType::Time,
                extract_fn(|row, _| match row {
                    RowRef::Host(h) => Value::Time(h.last_check),
                    _ => Value::Null,
                }),
            )),
            _ => Err(format!("table 'hosts' has no column '{name}'")),
        }
    }

    fn all_columns() -> Vec<Arc<Column>> {
        vec![make_column("name").unwrap(), make_column("state").unwrap()]
    }

    fn parse(lines: &[&str]) -> ParsedQuery {
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        ParsedQuery::parse(&lines, all_columns, make_column)
    }

    fn host(name: &str, state: i64) -> Host {
        Host {
            name: name.to_string(),
            state,
            ..Host::default()
        }
    }

    #[test]
    fn stats_line_builds_one_counting_column() {
        let q = parse(&["Stats: state = 2"]);
        assert!(q.error.is_none());
        assert_eq!(q.stats_columns.len(), 1);
        let StatsColumn::Count(filter) = &q.stats_columns[0] else {
            panic!("expected a counting stats column");
        };
        let crate::filter::Filter::Column(cf) = filter else {
            panic!("expected a column filter");
        };
        assert_eq!(cf.kind(), crate::filter::FilterKind::Stats);
        assert_eq!(cf.op(), RelOp::Equal);
        assert_eq!(cf.value(), "2");
        // stats queries default to headers off
        assert!(!q.show_column_headers);
    }

    #[test]
    fn stats_aggregation_form() {
        let q = parse(&["Stats: avg state"]);
        assert!(q.error.is_none());
        assert!(matches!(
            q.stats_columns[0],
            StatsColumn::Operation { kind: crate::stats::AggregationKind::Avg, .. }
        ));
    }

    #[test]
    fn and_combination_accepts_iff_both_accept() {
        let env = TestEnv::new();
        let ctx = env.ctx();
        let q = parse(&["Filter: name = web01", "Filter: state = 2", "And: 2"]);
        assert!(q.error.is_none());
        assert!(q.filter.accepts(RowRef::Host(&host("web01", 2)), &ctx, 0));
        assert!(!q.filter.accepts(RowRef::Host(&host("web01", 0)), &ctx, 0));
        assert!(!q.filter.accepts(RowRef::Host(&host("db01", 2)), &ctx, 0));
    }

    #[test]
    fn or_and_negate_combinations() {
        let env = TestEnv::new();
        let ctx = env.ctx();
        let q = parse(&["Filter: state = 0", "Filter: state = 2", "Or: 2", "Negate:"]);
        assert!(q.error.is_none());
        assert!(!q.filter.accepts(RowRef::Host(&host("h", 0)), &ctx, 0));
        assert!(q.filter.accepts(RowRef::Host(&host("h", 1)), &ctx, 0));
        assert!(!q.filter.accepts(RowRef::Host(&host("h", 2)), &ctx, 0));
    }

    #[test]
    fn negate_on_empty_stack_is_a_recorded_error() {
        let q = parse(&["Negate:"]);
        let error = q.error.expect("expected a recorded error");
        assert!(error.contains("Negate"), "{error}");
        assert!(q.filter.is_tautology());
    }

    #[test]
    fn stack_underflow_is_a_recorded_error() {
        let q = parse(&["Filter: state = 0", "Filter: state = 1", "And: 3"]);
        let error = q.error.expect("expected a recorded error");
        assert!(error.contains("expecting 3 filters"), "{error}");
    }

    #[test]
    fn unknown_header_is_a_recorded_error() {
        let q = parse(&["Bogus: 1"]);
        assert!(q.error.unwrap().contains("undefined request header"));
    }

    #[test]
    fn unknown_filter_column_is_an_error_but_unknown_output_column_is_null() {
        let q = parse(&["Filter: nosuch = 1"]);
        assert!(q.error.is_some());

        let q = parse(&["Columns: name nosuch"]);
        assert!(q.error.is_none());
        assert_eq!(q.columns.len(), 2);
        assert_eq!(q.columns[1].name(), "nosuch");
        assert_eq!(q.columns[1].column_type(), ColumnType::Null);
    }

    #[test]
    fn without_columns_all_columns_are_selected_with_headers() {
        let q = parse(&[]);
        assert_eq!(q.columns.len(), 2);
        assert!(q.show_column_headers);

        let q = parse(&["Columns: name"]);
        assert_eq!(q.columns.len(), 1);
        assert!(!q.show_column_headers);
    }

    #[test]
    fn options_and_limits() {
        let q = parse(&[
            "ColumnHeaders: on",
            "Limit: 42",
            "OutputFormat: json",
            "KeepAlive: on",
            "ResponseHeader: fixed16",
            "Separators: 10 59 44 124",
            "AuthUser: alice",
        ]);
        assert!(q.error.is_none());
        assert_eq!(q.limit, Some(42));
        assert_eq!(q.output_format, OutputFormat::Json);
        assert!(q.keepalive);
        assert_eq!(q.response_header, crate::output::ResponseHeaderMode::Fixed16);
        assert_eq!(q.separators, CsvSeparators::default());
        assert_eq!(q.user.as_deref(), Some("alice"));
    }

    #[test]
    fn output_format_names() {
        assert_eq!(parse(&["OutputFormat: CSV"]).output_format, OutputFormat::Csv);
        assert_eq!(parse(&["OutputFormat: csv"]).output_format, OutputFormat::BrokenCsv);
        assert_eq!(parse(&["OutputFormat: python"]).output_format, OutputFormat::Python);
        assert!(parse(&["OutputFormat: xml"]).error.is_some());
    }

    #[test]
    fn localtime_rounds_to_half_hours_and_rejects_a_day() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let q = parse(&[&format!("Localtime: {}", now + 3500)]);
        assert!(q.error.is_none());
        assert_eq!(q.timezone_offset, 3600);

        let q = parse(&[&format!("Localtime: {}", now + 200)]);
        assert_eq!(q.timezone_offset, 0);

        let q = parse(&[&format!("Localtime: {}", now + 24 * 3600 + 1800)]);
        assert!(q.error.unwrap().contains("24 hours"));
    }

    #[test]
    fn wait_headers() {
        let q = parse(&[
            "WaitObject: web01",
            "WaitTimeout: 1500",
            "WaitTrigger: check",
            "WaitCondition: state = 0",
        ]);
        assert!(q.error.is_none());
        assert_eq!(q.wait_object.as_deref(), Some("web01"));
        assert_eq!(q.wait_timeout, Duration::from_millis(1500));
        assert_eq!(q.wait_trigger, Trigger::Check);
        assert!(!q.wait_condition.is_tautology());
        assert!(parse(&["WaitTrigger: nonsense"]).error.is_some());
    }

    #[test]
    fn stats_connectives_combine_counting_predicates() {
        let q = parse(&[
            "Stats: state = 0",
            "Stats: state = 2",
            "StatsOr: 2",
            "StatsNegate:",
        ]);
        assert!(q.error.is_none());
        assert_eq!(q.stats_columns.len(), 1);
        let q = parse(&["StatsAnd: 2"]);
        assert!(q.error.is_some());
    }

    #[test]
    fn order_by_directions_and_dict_keys() {
        let q = parse(&["OrderBy: state desc", "OrderBy: name"]);
        assert!(q.error.is_none());
        assert_eq!(q.order_by.len(), 2);
        assert_eq!(q.order_by[0].direction, OrderDirection::Descending);
        assert_eq!(q.order_by[1].direction, OrderDirection::Ascending);
        assert!(q.order_by[1].key.is_none());

        let q = parse(&["OrderBy: state.site asc"]);
        assert_eq!(q.order_by[0].key.as_deref(), Some("site"));
        assert!(parse(&["OrderBy: state sideways"]).error.is_some());
    }
}
