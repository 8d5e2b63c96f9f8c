//! The filter algebra.
//!
//! Filters are immutable trees combined by the parser's postfix
//! connectives. Besides row evaluation they derive *restrictions* — bounds,
//! value sets and string equalities — that tables may use to pick an index
//! instead of scanning. Restrictions are best effort: `None` merely
//! disables an optimization, a returned value is a hard promise.

pub mod matcher;
pub mod op;

use std::fmt;
use std::sync::Arc;

use crate::column::Column;
use crate::core::ExecContext;
use crate::row::RowRef;

pub use matcher::Matcher;
pub use op::RelOp;

/// Where a filter came from; carried for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Row,
    Stats,
    WaitCondition,
}

#[derive(Clone)]
pub struct ColumnFilter {
    kind: FilterKind,
    column: Arc<Column>,
    op: RelOp,
    value: String,
    matcher: Arc<Matcher>,
}

impl ColumnFilter {
    pub fn new(
        kind: FilterKind,
        column: Arc<Column>,
        op: RelOp,
        value: &str,
    ) -> Result<ColumnFilter, String> {
        let matcher = Matcher::build(column.column_type(), op, value)?;
        Ok(ColumnFilter {
            kind,
            column,
            op,
            value: value.to_string(),
            matcher: Arc::new(matcher),
        })
    }

    pub fn column_name(&self) -> &str {
        self.column.name()
    }

    pub fn op(&self) -> RelOp {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    fn accepts<'a>(&self, row: RowRef<'a>, ctx: &ExecContext<'a>, timezone_offset: i64) -> bool {
        let value = self.column.value(row, ctx);
        self.matcher.accepts(self.op, &value, timezone_offset)
    }

    fn negated(&self) -> ColumnFilter {
        ColumnFilter {
            kind: self.kind,
            column: Arc::clone(&self.column),
            op: self.op.negated(),
            value: self.value.clone(),
            matcher: Arc::clone(&self.matcher),
        }
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column.name(), self.op, self.value)
    }
}

/// A filter tree. `And` of nothing is the tautology, `Or` of nothing the
/// contradiction; negation flips operators at the leaves and dualizes the
/// connectives, so no dedicated node is needed.
#[derive(Clone)]
pub enum Filter {
    Column(ColumnFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn tautology() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn contradiction() -> Filter {
        Filter::Or(Vec::new())
    }

    /// Combine per the `And:`/`Or:` headers. A single operand stays as is.
    pub fn combine_and(mut filters: Vec<Filter>) -> Filter {
        if filters.len() == 1 {
            filters.pop().unwrap()
        } else {
            Filter::And(filters)
        }
    }

    pub fn combine_or(mut filters: Vec<Filter>) -> Filter {
        if filters.len() == 1 {
            filters.pop().unwrap()
        } else {
            Filter::Or(filters)
        }
    }

    pub fn is_tautology(&self) -> bool {
        match self {
            Filter::Column(_) => false,
            Filter::And(fs) => fs.iter().all(|f| f.is_tautology()),
            Filter::Or(fs) => fs.iter().any(|f| f.is_tautology()),
        }
    }

    pub fn is_contradiction(&self) -> bool {
        match self {
            Filter::Column(_) => false,
            Filter::And(fs) => fs.iter().any(|f| f.is_contradiction()),
            Filter::Or(fs) => fs.iter().all(|f| f.is_contradiction()),
        }
    }

    pub fn accepts<'a>(&self, row: RowRef<'a>, ctx: &ExecContext<'a>, timezone_offset: i64) -> bool {
        match self {
            Filter::Column(cf) => cf.accepts(row, ctx, timezone_offset),
            Filter::And(fs) => fs.iter().all(|f| f.accepts(row, ctx, timezone_offset)),
            Filter::Or(fs) => fs.iter().any(|f| f.accepts(row, ctx, timezone_offset)),
        }
    }

    pub fn negate(&self) -> Filter {
        match self {
            Filter::Column(cf) => Filter::Column(cf.negated()),
            Filter::And(fs) => Filter::Or(fs.iter().map(|f| f.negate()).collect()),
            Filter::Or(fs) => Filter::And(fs.iter().map(|f| f.negate()).collect()),
        }
    }

    /// Largest value below which the filter definitely rejects everything.
    pub fn greatest_lower_bound(&self, column_name: &str, timezone_offset: i64) -> Option<i64> {
        match self {
            Filter::Column(cf) => {
                if cf.column_name() != column_name {
                    return None;
                }
                let reference = cf.matcher.int_ref(timezone_offset)?;
                match cf.op {
                    RelOp::Equal | RelOp::GreaterOrEqual => Some(reference),
                    RelOp::Greater => Some(reference + 1),
                    _ => None,
                }
            }
            Filter::And(fs) => fs
                .iter()
                .filter_map(|f| f.greatest_lower_bound(column_name, timezone_offset))
                .max(),
            Filter::Or(_) => None,
        }
    }

    /// Smallest value above which the filter definitely rejects everything.
    pub fn least_upper_bound(&self, column_name: &str, timezone_offset: i64) -> Option<i64> {
        match self {
            Filter::Column(cf) => {
                if cf.column_name() != column_name {
                    return None;
                }
                let reference = cf.matcher.int_ref(timezone_offset)?;
                match cf.op {
                    RelOp::Equal | RelOp::LessOrEqual => Some(reference),
                    RelOp::Less => Some(reference - 1),
                    _ => None,
                }
            }
            Filter::And(fs) => fs
                .iter()
                .filter_map(|f| f.least_upper_bound(column_name, timezone_offset))
                .min(),
            Filter::Or(_) => None,
        }
    }

    /// Admissible small values 0..32, evaluated bit by bit at the leaves,
    /// intersected under `And` and unioned under `Or`.
    pub fn value_set_least_upper_bound(
        &self,
        column_name: &str,
        timezone_offset: i64,
    ) -> Option<u32> {
        match self {
            Filter::Column(cf) => {
                if cf.column_name() != column_name {
                    return None;
                }
                let reference = cf.matcher.int_ref(timezone_offset)?;
                let mut set = 0u32;
                for bit in 0..32i64 {
                    if cf.op.eval_int(bit, reference) {
                        set |= 1 << bit;
                    }
                }
                Some(set)
            }
            Filter::And(fs) => fs
                .iter()
                .filter_map(|f| f.value_set_least_upper_bound(column_name, timezone_offset))
                .reduce(|a, b| a & b),
            Filter::Or(fs) => {
                let mut set = 0u32;
                for f in fs {
                    set |= f.value_set_least_upper_bound(column_name, timezone_offset)?;
                }
                Some(set)
            }
        }
    }

    /// A literal the column must equal (or, for list columns, contain).
    pub fn string_value_restriction(&self, column_name: &str) -> Option<String> {
        match self {
            Filter::Column(cf) => {
                if cf.column_name() != column_name {
                    return None;
                }
                match (&*cf.matcher, cf.op) {
                    (Matcher::Str { .. }, RelOp::Equal) => Some(cf.value.clone()),
                    (Matcher::List { .. }, RelOp::GreaterOrEqual) => Some(cf.value.clone()),
                    _ => None,
                }
            }
            Filter::And(fs) => fs
                .iter()
                .find_map(|f| f.string_value_restriction(column_name)),
            Filter::Or(fs) => {
                let mut restriction: Option<String> = None;
                for f in fs {
                    let r = f.string_value_restriction(column_name)?;
                    match &restriction {
                        None => restriction = Some(r),
                        Some(existing) if *existing == r => {}
                        Some(_) => return None,
                    }
                }
                restriction
            }
        }
    }

    /// The conjunction of sub-filters that mention only columns accepted by
    /// `predicate`; everything else is treated as true.
    pub fn partial_filter(&self, predicate: &dyn Fn(&str) -> bool) -> Filter {
        match self {
            Filter::Column(cf) => {
                if predicate(cf.column_name()) {
                    self.clone()
                } else {
                    Filter::tautology()
                }
            }
            Filter::And(fs) => Filter::And(fs.iter().map(|f| f.partial_filter(predicate)).collect()),
            Filter::Or(_) => {
                if self.column_names().iter().all(|n| predicate(n)) {
                    self.clone()
                } else {
                    Filter::tautology()
                }
            }
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_column_names(&mut names);
        names
    }

    fn collect_column_names(&self, out: &mut Vec<String>) {
        match self {
            Filter::Column(cf) => out.push(cf.column_name().to_string()),
            Filter::And(fs) | Filter::Or(fs) => {
                for f in fs {
                    f.collect_column_names(out);
                }
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Column(cf) => write!(f, "{cf}"),
            Filter::And(fs) => {
                write!(f, "(and")?;
                for sub in fs {
                    write!(f, " {sub}")?;
                }
                write!(f, ")")
            }
            Filter::Or(fs) => {
                write!(f, "(or")?;
                for sub in fs {
                    write!(f, " {sub}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::extract_fn;
    use crate::model::Host;
    use crate::testing::TestEnv;
    use crate::value::{ColumnType, Value};

    fn state_column() -> Arc<Column> {
        Column::new(
            "state",
            "",
            ColumnType::Int,
            extract_fn(|row, _| match row {
                RowRef::Host(h) => Value::Int(h.state),
                _ => Value::Null,
            }),
        )
    }

    fn time_column() -> Arc<Column> {
        Column::new(
            "time",
            "",
            ColumnType::Time,
            extract_fn(|row, _| match row {
                RowRef::Host(h) => Value::Time(h.last_check),
                _ => Value::Null,
            }),
        )
    }

    fn name_column() -> Arc<Column> {
        Column::new(
            "name",
            "",
            ColumnType::String,
            extract_fn(|row, _| match row {
                RowRef::Host(h) => Value::Str(h.name.clone()),
                _ => Value::Null,
            }),
        )
    }

    fn groups_column() -> Arc<Column> {
        Column::new(
            "groups",
            "",
            ColumnType::List,
            extract_fn(|_, _| Value::List(vec!["linux".to_string(), "web".to_string()])),
        )
    }

    fn state_filter(op: &str, value: &str) -> Filter {
        Filter::Column(
            ColumnFilter::new(
                FilterKind::Row,
                state_column(),
                RelOp::from_name(op).unwrap(),
                value,
            )
            .unwrap(),
        )
    }

    fn time_filter(op: &str, value: &str) -> Filter {
        Filter::Column(
            ColumnFilter::new(
                FilterKind::Row,
                time_column(),
                RelOp::from_name(op).unwrap(),
                value,
            )
            .unwrap(),
        )
    }

    fn name_filter(op: &str, value: &str) -> Filter {
        Filter::Column(
            ColumnFilter::new(
                FilterKind::Row,
                name_column(),
                RelOp::from_name(op).unwrap(),
                value,
            )
            .unwrap(),
        )
    }

    #[test]
    fn equality_pins_both_bounds() {
        let f = state_filter("=", "2");
        assert_eq!(f.greatest_lower_bound("state", 0), Some(2));
        assert_eq!(f.least_upper_bound("state", 0), Some(2));
        assert_eq!(f.greatest_lower_bound("other", 0), None);
    }

    #[test]
    fn strict_comparisons_tighten_by_one() {
        assert_eq!(state_filter(">", "5").greatest_lower_bound("state", 0), Some(6));
        assert_eq!(state_filter("<", "5").least_upper_bound("state", 0), Some(4));
        assert_eq!(state_filter(">=", "5").greatest_lower_bound("state", 0), Some(5));
        assert_eq!(state_filter("<=", "5").least_upper_bound("state", 0), Some(5));
        assert_eq!(state_filter(">", "5").least_upper_bound("state", 0), None);
    }

    #[test]
    fn time_bounds_are_shifted_into_utc() {
        let f = time_filter(">=", "3600");
        assert_eq!(f.greatest_lower_bound("time", 0), Some(3600));
        assert_eq!(f.greatest_lower_bound("time", 1800), Some(1800));
    }

    #[test]
    fn and_combines_bounds_with_max_and_min() {
        let f = Filter::And(vec![time_filter(">=", "1000"), time_filter("<", "2000")]);
        assert_eq!(f.greatest_lower_bound("time", 0), Some(1000));
        assert_eq!(f.least_upper_bound("time", 0), Some(1999));

        let g = Filter::And(vec![state_filter(">=", "1"), state_filter(">=", "3")]);
        assert_eq!(g.greatest_lower_bound("state", 0), Some(3));
        // only one side present: the present one wins
        let h = Filter::And(vec![state_filter(">=", "1"), name_filter("=", "foo")]);
        assert_eq!(h.greatest_lower_bound("state", 0), Some(1));
    }

    #[test]
    fn or_refuses_bounds_and_merges_value_sets() {
        let f = Filter::Or(vec![state_filter("=", "0"), state_filter("=", "2")]);
        assert_eq!(f.greatest_lower_bound("state", 0), None);
        assert_eq!(f.least_upper_bound("state", 0), None);
        assert_eq!(f.value_set_least_upper_bound("state", 0), Some(0b101));
    }

    #[test]
    fn and_intersects_value_sets() {
        let f = Filter::And(vec![state_filter(">=", "1"), state_filter("<=", "2")]);
        assert_eq!(f.value_set_least_upper_bound("state", 0), Some(0b110));
    }

    #[test]
    fn string_restriction_rules() {
        assert_eq!(
            name_filter("=", "foo").string_value_restriction("name"),
            Some("foo".to_string())
        );
        assert_eq!(name_filter("!=", "foo").string_value_restriction("name"), None);
        assert_eq!(name_filter("=", "foo").string_value_restriction("alias"), None);

        // Or restricts only when every branch names the same literal
        let same = Filter::Or(vec![name_filter("=", "foo"), name_filter("=", "foo")]);
        assert_eq!(same.string_value_restriction("name"), Some("foo".to_string()));
        let different = Filter::Or(vec![name_filter("=", "foo"), name_filter("=", "bar")]);
        assert_eq!(different.string_value_restriction("name"), None);

        // list membership restricts too
        let member = Filter::Column(
            ColumnFilter::new(FilterKind::Row, groups_column(), RelOp::GreaterOrEqual, "linux")
                .unwrap(),
        );
        assert_eq!(member.string_value_restriction("groups"), Some("linux".to_string()));
    }

    #[test]
    fn double_negation_accepts_the_same_rows() {
        let env = TestEnv::new();
        let ctx = env.ctx();
        let f = Filter::And(vec![
            state_filter(">=", "1"),
            Filter::Or(vec![name_filter("=", "web01"), name_filter("~", "^db")]),
        ]);
        let double = f.negate().negate();
        for (name, state) in [("web01", 0), ("web01", 1), ("db07", 2), ("mail", 3)] {
            let host = Host {
                name: name.to_string(),
                state,
                ..Host::default()
            };
            let row = RowRef::Host(&host);
            assert_eq!(f.accepts(row, &ctx, 0), double.accepts(row, &ctx, 0), "{name}/{state}");
        }
    }

    #[test]
    fn empty_connectives_are_tautology_and_contradiction() {
        let env = TestEnv::new();
        let ctx = env.ctx();
        let host = Host::default();
        assert!(Filter::tautology().is_tautology());
        assert!(Filter::contradiction().is_contradiction());
        assert!(Filter::tautology().accepts(RowRef::Host(&host), &ctx, 0));
        assert!(!Filter::contradiction().accepts(RowRef::Host(&host), &ctx, 0));
        assert!(Filter::tautology().negate().is_contradiction());
    }

    #[test]
    fn partial_filter_keeps_only_named_columns() {
        let f = Filter::And(vec![time_filter(">=", "1000"), name_filter("=", "web01")]);
        let partial = f.partial_filter(&|col| col == "name");
        assert_eq!(partial.string_value_restriction("name"), Some("web01".to_string()));
        assert_eq!(partial.greatest_lower_bound("time", 0), None);

        // an Or mixing named and unnamed columns degrades to the tautology
        let mixed = Filter::Or(vec![time_filter(">=", "1000"), name_filter("=", "web01")]);
        assert!(mixed.partial_filter(&|col| col == "name").is_tautology());
    }
}
