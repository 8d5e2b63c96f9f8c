//! Execution of one parsed query against one table.
//!
//! The table drives row production and feeds each candidate row through
//! `process_row`, which applies the filter, enforces limits and either
//! renders directly, buffers for ordering, or aggregates into stats
//! groups.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use crate::core::ExecContext;
use crate::output::{OutputBuffer, ResponseCode};
use crate::parser::{OrderDirection, ParsedQuery};
use crate::render::{Renderer, make_renderer};
use crate::row::RowRef;
use crate::stats::Aggregator;
use crate::table::Table;
use crate::user::User;
use crate::value::Value;

pub struct Query<'q> {
    parsed: ParsedQuery,
    output: &'q mut OutputBuffer,
    table_name: &'static str,
    max_response_size: usize,
    renderer: Box<dyn Renderer>,
    current_line: usize,
    stats_group_index: HashMap<Vec<u8>, usize>,
    stats_groups: Vec<(Vec<u8>, Vec<Aggregator>)>,
    ordered_rows: Vec<(Vec<Value>, Vec<u8>)>,
    ordered_bytes: usize,
}

impl<'q> Query<'q> {
    pub fn new(
        parsed: ParsedQuery,
        output: &'q mut OutputBuffer,
        table_name: &'static str,
        max_response_size: usize,
    ) -> Query<'q> {
        let renderer = make_renderer(parsed.output_format, &parsed.separators, false);
        Query {
            parsed,
            output,
            table_name,
            max_response_size,
            renderer,
            current_line: 0,
            stats_group_index: HashMap::new(),
            stats_groups: Vec::new(),
            ordered_rows: Vec::new(),
            ordered_bytes: 0,
        }
    }

    pub fn parsed(&self) -> &ParsedQuery {
        &self.parsed
    }

    pub fn timezone_offset(&self) -> i64 {
        self.parsed.timezone_offset
    }

    pub fn invalid_request(&mut self, message: impl Into<String>) {
        self.output
            .set_error(ResponseCode::InvalidRequest, message.into());
    }

    pub fn bad_gateway(&mut self, message: impl Into<String>) {
        self.output
            .set_error(ResponseCode::BadGateway, message.into());
    }

    pub fn payload_too_large(&mut self, message: impl Into<String>) {
        self.output
            .set_error(ResponseCode::PayloadTooLarge, message.into());
    }

    fn do_stats(&self) -> bool {
        !self.parsed.stats_columns.is_empty()
    }

    /// Run the query. Returns whether the connection should be kept alive.
    pub fn process(&mut self, table: &dyn Table, user: &User<'_>, ctx: &ExecContext<'_>) -> bool {
        let started = Instant::now();
        self.output.set_response_header(self.parsed.response_header);
        if let Some(error) = self.parsed.error.take() {
            self.output.set_error(ResponseCode::InvalidRequest, error);
        }
        self.do_wait(table, ctx);
        if self.output.error().is_none() {
            self.renderer.begin_query(self.output.data());
            self.emit_column_headers();
            table.answer_query(self, user, ctx);
            self.finish();
            self.renderer.end_query(self.output.data());
        }
        info!(
            table = self.table_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = self.output.len(),
            "processed request"
        );
        self.parsed.keepalive
    }

    fn emit_column_headers(&mut self) {
        if !self.parsed.show_column_headers {
            return;
        }
        self.renderer.begin_row(self.output.data());
        for column in &self.parsed.columns {
            self.renderer.output(
                self.output.data(),
                &Value::Str(column.name().to_string()),
                0,
            );
        }
        for i in 1..=self.parsed.stats_columns.len() {
            self.renderer
                .output(self.output.data(), &Value::Str(format!("stats_{i}")), 0);
        }
        self.renderer.end_row(self.output.data());
    }

    /// Feed one candidate row. Returns false when the table should stop
    /// producing rows.
    pub fn process_row<'a>(&mut self, row: RowRef<'a>, ctx: &ExecContext<'a>) -> bool {
        if ctx.should_terminate.load(Ordering::Relaxed) {
            self.output
                .set_error(ResponseCode::PayloadTooLarge, "core is shutting down");
            return false;
        }
        if self.output.len() + self.ordered_bytes > self.max_response_size {
            self.output.set_error(
                ResponseCode::PayloadTooLarge,
                format!(
                    "maximum response size of {} bytes exceeded",
                    self.max_response_size
                ),
            );
            return false;
        }
        let tz = self.parsed.timezone_offset;
        if !self.parsed.filter.accepts(row, ctx, tz) {
            return true;
        }

        // with an ordering in effect the limit is applied after the sort
        if self.parsed.order_by.is_empty() {
            self.current_line += 1;
            if let Some(limit) = self.parsed.limit {
                if self.current_line > limit {
                    return false;
                }
            }
        }

        // a query hitting its time limit fails instead of silently
        // truncating the answer
        if let Some((duration, deadline)) = self.parsed.time_limit {
            if Instant::now() >= deadline {
                self.output.set_error(
                    ResponseCode::PayloadTooLarge,
                    format!("maximum query time of {duration} seconds exceeded"),
                );
                return false;
            }
        }

        if self.do_stats() {
            let fragment = self.render_fragment(row, ctx);
            let aggregators = self.aggregators_for(fragment);
            for aggregator in aggregators {
                aggregator.consume(row, ctx, tz);
            }
        } else if !self.parsed.order_by.is_empty() {
            let keys: Vec<Value> = self
                .parsed
                .order_by
                .iter()
                .map(|ob| {
                    let value = ob.column.value(row, ctx);
                    match &ob.key {
                        Some(key) => value.dict_entry(key),
                        None => value,
                    }
                })
                .collect();
            let fragment = self.render_fragment(row, ctx);
            self.ordered_bytes += fragment.len();
            self.ordered_rows.push((keys, fragment));
        } else {
            self.renderer.begin_row(self.output.data());
            for column in &self.parsed.columns {
                let value = column.value(row, ctx);
                self.renderer.output(self.output.data(), &value, tz);
            }
            self.renderer.end_row(self.output.data());
        }
        true
    }

    /// Pre-render the non-stats columns of a row. For stats queries the
    /// result is the group key; for ordered queries the buffered row body.
    fn render_fragment<'a>(&self, row: RowRef<'a>, ctx: &ExecContext<'a>) -> Vec<u8> {
        let mut fragment = Vec::new();
        let mut renderer = make_renderer(self.parsed.output_format, &self.parsed.separators, true);
        renderer.begin_row(&mut fragment);
        for column in &self.parsed.columns {
            let value = column.value(row, ctx);
            renderer.output(&mut fragment, &value, self.parsed.timezone_offset);
        }
        renderer.end_row(&mut fragment);
        fragment
    }

    fn aggregators_for(&mut self, fragment: Vec<u8>) -> &mut Vec<Aggregator> {
        let index = match self.stats_group_index.get(&fragment) {
            Some(index) => *index,
            None => {
                let aggregators = self
                    .parsed
                    .stats_columns
                    .iter()
                    .map(|sc| sc.make_aggregator())
                    .collect();
                self.stats_groups.push((fragment.clone(), aggregators));
                let index = self.stats_groups.len() - 1;
                self.stats_group_index.insert(fragment, index);
                index
            }
        };
        &mut self.stats_groups[index].1
    }

    fn finish(&mut self) {
        let tz = self.parsed.timezone_offset;
        if self.do_stats() {
            for (fragment, aggregators) in &self.stats_groups {
                self.renderer.begin_row(self.output.data());
                if !fragment.is_empty() {
                    self.renderer.output_fragment(self.output.data(), fragment);
                }
                for aggregator in aggregators {
                    self.renderer
                        .output(self.output.data(), &aggregator.value(), tz);
                }
                self.renderer.end_row(self.output.data());
            }
        } else if !self.parsed.order_by.is_empty() {
            let directions: Vec<OrderDirection> =
                self.parsed.order_by.iter().map(|ob| ob.direction).collect();
            self.ordered_rows.sort_by(|(a, _), (b, _)| {
                for (i, direction) in directions.iter().enumerate() {
                    let ord = a[i].cmp_for_sort(&b[i]);
                    let ord = match direction {
                        OrderDirection::Ascending => ord,
                        OrderDirection::Descending => ord.reverse(),
                    };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
            if let Some(limit) = self.parsed.limit {
                self.ordered_rows.truncate(limit);
            }
            for (_, fragment) in &self.ordered_rows {
                self.renderer.begin_row(self.output.data());
                self.renderer.output_fragment(self.output.data(), fragment);
                self.renderer.end_row(self.output.data());
            }
        }
    }

    fn do_wait(&mut self, table: &dyn Table, ctx: &ExecContext<'_>) {
        if self.parsed.wait_condition.is_contradiction() && self.parsed.wait_timeout.is_zero() {
            self.invalid_request("waiting for WaitCondition would hang forever");
            return;
        }
        if self.parsed.wait_condition.is_tautology() {
            return;
        }
        let row = match self.parsed.wait_object.as_deref() {
            Some(key) if !key.is_empty() => table.get_row(key, ctx),
            _ => table.default_row(ctx),
        };
        let Some(row) = row else {
            self.invalid_request("missing WaitObject");
            return;
        };
        let condition = &self.parsed.wait_condition;
        let tz = self.parsed.timezone_offset;
        ctx.triggers.wait_for(
            self.parsed.wait_trigger,
            self.parsed.wait_timeout,
            ctx.should_terminate,
            || condition.accepts(row, ctx, tz),
        );
    }

    // Restriction lookups used by tables for index selection. Logged so an
    // unexpected full scan can be explained from the debug log.

    pub fn string_value_restriction(&self, column: &str) -> Option<String> {
        self.parsed.filter.string_value_restriction(column)
    }

    pub fn greatest_lower_bound(&self, column: &str) -> Option<i64> {
        let result = self
            .parsed
            .filter
            .greatest_lower_bound(column, self.parsed.timezone_offset);
        match result {
            Some(bound) => debug!(
                table = self.table_name,
                column,
                bound,
                time = %format_epoch(bound),
                "greatest lower bound"
            ),
            None => debug!(table = self.table_name, column, "no greatest lower bound"),
        }
        result
    }

    pub fn least_upper_bound(&self, column: &str) -> Option<i64> {
        let result = self
            .parsed
            .filter
            .least_upper_bound(column, self.parsed.timezone_offset);
        match result {
            Some(bound) => debug!(
                table = self.table_name,
                column,
                bound,
                time = %format_epoch(bound),
                "least upper bound"
            ),
            None => debug!(table = self.table_name, column, "no least upper bound"),
        }
        result
    }

    pub fn value_set_least_upper_bound(&self, column: &str) -> Option<u32> {
        let result = self
            .parsed
            .filter
            .value_set_least_upper_bound(column, self.parsed.timezone_offset);
        match result {
            Some(set) => debug!(
                table = self.table_name,
                column,
                set = %format!("{set:#b}"),
                "value set restriction"
            ),
            None => debug!(table = self.table_name, column, "no value set restriction"),
        }
        result
    }

    pub fn partial_filter(
        &self,
        what: &str,
        predicate: &dyn Fn(&str) -> bool,
    ) -> crate::filter::Filter {
        let result = self.parsed.filter.partial_filter(predicate);
        debug!(table = self.table_name, what, filter = %result, "partial filter");
        result
    }
}

fn format_epoch(epoch: i64) -> String {
    match Utc.timestamp_opt(epoch, 0) {
        chrono::LocalResult::Single(t) => t.to_rfc3339(),
        _ => format!("@{epoch}"),
    }
}
