//! Stats columns and their aggregations.

use std::sync::Arc;

use crate::column::Column;
use crate::core::ExecContext;
use crate::filter::Filter;
use crate::row::RowRef;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Sum,
    Min,
    Max,
    Avg,
    Std,
    SumInv,
    AvgInv,
}

impl AggregationKind {
    pub fn from_name(name: &str) -> Option<AggregationKind> {
        match name {
            "sum" => Some(AggregationKind::Sum),
            "min" => Some(AggregationKind::Min),
            "max" => Some(AggregationKind::Max),
            "avg" => Some(AggregationKind::Avg),
            "std" => Some(AggregationKind::Std),
            "suminv" => Some(AggregationKind::SumInv),
            "avginv" => Some(AggregationKind::AvgInv),
            _ => None,
        }
    }
}

/// Scalar accumulator shared by all aggregation kinds. Std keeps a sum of
/// squares so one pass suffices.
#[derive(Debug, Default, Clone)]
pub struct AggregationState {
    count: u32,
    sum: f64,
    sum_of_squares: f64,
}

impl AggregationState {
    pub fn update(&mut self, kind: AggregationKind, value: f64) {
        match kind {
            AggregationKind::Sum => self.sum += value,
            AggregationKind::Min => {
                if self.count == 0 || value < self.sum {
                    self.sum = value;
                }
            }
            AggregationKind::Max => {
                if self.count == 0 || value > self.sum {
                    self.sum = value;
                }
            }
            AggregationKind::Avg => self.sum += value,
            AggregationKind::Std => {
                self.sum += value;
                self.sum_of_squares += value * value;
            }
            AggregationKind::SumInv => self.sum += 1.0 / value,
            AggregationKind::AvgInv => self.sum += 1.0 / value,
        }
        self.count += 1;
    }

    pub fn value(&self, kind: AggregationKind) -> f64 {
        match kind {
            AggregationKind::Sum
            | AggregationKind::Min
            | AggregationKind::Max
            | AggregationKind::SumInv => self.sum,
            AggregationKind::Avg | AggregationKind::AvgInv => self.sum / self.count as f64,
            AggregationKind::Std => {
                let mean = self.sum / self.count as f64;
                (self.sum_of_squares / self.count as f64 - mean * mean).sqrt()
            }
        }
    }
}

/// One `Stats:` header: either a counting predicate or an aggregation over
/// a column.
pub enum StatsColumn {
    Count(Filter),
    Operation {
        kind: AggregationKind,
        column: Arc<Column>,
    },
}

impl StatsColumn {
    /// Hand the predicate over to a `StatsAnd`/`StatsOr` combination. An
    /// aggregation column has no predicate of its own and contributes the
    /// tautology.
    pub fn steal_filter(self) -> Filter {
        match self {
            StatsColumn::Count(filter) => filter,
            StatsColumn::Operation { .. } => Filter::tautology(),
        }
    }

    pub fn make_aggregator(&self) -> Aggregator {
        match self {
            StatsColumn::Count(filter) => Aggregator::Count {
                filter: filter.clone(),
                count: 0,
            },
            StatsColumn::Operation { kind, column } => Aggregator::Operation {
                kind: *kind,
                column: Arc::clone(column),
                state: AggregationState::default(),
            },
        }
    }
}

pub enum Aggregator {
    Count {
        filter: Filter,
        count: u64,
    },
    Operation {
        kind: AggregationKind,
        column: Arc<Column>,
        state: AggregationState,
    },
}

impl Aggregator {
    pub fn consume<'a>(&mut self, row: RowRef<'a>, ctx: &ExecContext<'a>, timezone_offset: i64) {
        match self {
            Aggregator::Count { filter, count } => {
                if filter.accepts(row, ctx, timezone_offset) {
                    *count += 1;
                }
            }
            Aggregator::Operation { kind, column, state } => {
                state.update(*kind, column.value(row, ctx).as_f64());
            }
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Aggregator::Count { count, .. } => Value::Int(*count as i64),
            Aggregator::Operation { kind, state, .. } => Value::Double(state.value(*kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: AggregationKind, inputs: &[f64]) -> f64 {
        let mut state = AggregationState::default();
        for &v in inputs {
            state.update(kind, v);
        }
        state.value(kind)
    }

    #[test]
    fn aggregation_kind_names() {
        assert_eq!(AggregationKind::from_name("sum"), Some(AggregationKind::Sum));
        assert_eq!(AggregationKind::from_name("avginv"), Some(AggregationKind::AvgInv));
        assert_eq!(AggregationKind::from_name("count"), None);
    }

    #[test]
    fn simple_aggregations() {
        let inputs = [3.0, 1.0, 2.0];
        assert_eq!(run(AggregationKind::Sum, &inputs), 6.0);
        assert_eq!(run(AggregationKind::Min, &inputs), 1.0);
        assert_eq!(run(AggregationKind::Max, &inputs), 3.0);
        assert_eq!(run(AggregationKind::Avg, &inputs), 2.0);
    }

    #[test]
    fn inverse_aggregations() {
        let inputs = [2.0, 4.0];
        assert_eq!(run(AggregationKind::SumInv, &inputs), 0.75);
        assert_eq!(run(AggregationKind::AvgInv, &inputs), 0.375);
    }

    #[test]
    fn std_is_the_population_deviation() {
        let result = run(AggregationKind::Std, &[2.0, 4.0]);
        assert!((result - 1.0).abs() < 1e-9);
    }

    #[test]
    fn min_handles_negative_values_after_start() {
        assert_eq!(run(AggregationKind::Min, &[5.0, -3.0, 4.0]), -3.0);
        assert_eq!(run(AggregationKind::Max, &[-5.0, -3.0]), -3.0);
    }
}
