//! Column value taxonomy.
//!
//! Every column extracts one of these variants from a row. Renderers and
//! aggregators dispatch on the variant, filters on the declared column type.

use std::cmp::Ordering;

/// Declared type of a column, as reported by the `columns` meta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Int,
    Double,
    Time,
    List,
    DictStr,
    DictDouble,
    Blob,
    Null,
}

impl ColumnType {
    /// Wire name used by the `columns` meta table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Double => "double",
            ColumnType::Time => "time",
            ColumnType::List => "list",
            ColumnType::DictStr => "dict",
            ColumnType::DictDouble => "dictdouble",
            ColumnType::Blob => "blob",
            ColumnType::Null => "null",
        }
    }

    /// Value produced when a join projection has no target, e.g. the
    /// `current_host_name` of a log line about a vanished host.
    pub fn default_value(&self) -> Value {
        match self {
            ColumnType::String => Value::Str(String::new()),
            ColumnType::Int => Value::Int(0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::Time => Value::Time(0),
            ColumnType::List => Value::List(Vec::new()),
            ColumnType::DictStr => Value::DictStr(Vec::new()),
            ColumnType::DictDouble => Value::DictDouble(Vec::new()),
            ColumnType::Blob => Value::Blob(Vec::new()),
            ColumnType::Null => Value::Null,
        }
    }
}

/// A single extracted cell.
///
/// `Time` is UTC epoch seconds; the timezone offset of the query is added
/// only at render time. `Sublists` carries richer list records (comments
/// and downtimes with info) that render as nested lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Double(f64),
    Time(i64),
    List(Vec<String>),
    Sublists(Vec<Vec<Value>>),
    DictStr(Vec<(String, String)>),
    DictDouble(Vec<(String, f64)>),
    Blob(Vec<u8>),
    Null,
}

impl Value {
    pub fn from_bool(b: bool) -> Value {
        Value::Int(if b { 1 } else { 0 })
    }

    /// Numeric view used by aggregations (suminv et al. divide by this).
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(i) | Value::Time(i) => *i as f64,
            Value::Double(d) => *d,
            Value::Str(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(s) => s,
            _ => "",
        }
    }

    /// Ordering used by `OrderBy`: numeric where both sides are numeric,
    /// lexicographic otherwise.
    pub fn cmp_for_sort(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) | (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) => {
                let (x, y) = (a.as_f64(), b.as_f64());
                if x != y {
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                } else {
                    a.as_str().cmp(b.as_str())
                }
            }
        }
    }

    /// Entry of a dict column addressed by `OrderBy: col.key`.
    pub fn dict_entry(&self, key: &str) -> Value {
        match self {
            Value::DictStr(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| Value::Str(v.clone()))
                .unwrap_or(Value::Str(String::new())),
            Value::DictDouble(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| Value::Double(*v))
                .unwrap_or(Value::Double(0.0)),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_numeric_for_numbers_and_lexicographic_for_strings() {
        assert_eq!(Value::Int(2).cmp_for_sort(&Value::Int(10)), Ordering::Less);
        assert_eq!(
            Value::Str("2".into()).cmp_for_sort(&Value::Str("10".into())),
            Ordering::Greater
        );
        assert_eq!(
            Value::Double(1.5).cmp_for_sort(&Value::Double(1.5)),
            Ordering::Equal
        );
    }

    #[test]
    fn dict_entry_lookup_falls_back_to_empty() {
        let v = Value::DictStr(vec![("site".into(), "alpha".into())]);
        assert_eq!(v.dict_entry("site"), Value::Str("alpha".into()));
        assert_eq!(v.dict_entry("missing"), Value::Str(String::new()));
    }
}
