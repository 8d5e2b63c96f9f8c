//! Typed right-hand sides for column filters.
//!
//! A matcher is compiled once from the operator and the textual argument
//! when the filter is built, so row evaluation does no parsing. Regex
//! arguments are compiled here; a bad pattern is a request error.

use regex::{Regex, RegexBuilder};

use super::op::RelOp;
use crate::value::{ColumnType, Value};

/// Parse of a dict argument: `KEY VALUE`, each part optionally
/// single-quoted with `''` as the escape for a literal quote.
fn parse_dict_argument(raw: &str) -> (String, String) {
    fn quoted(rest: &str) -> (String, &str) {
        // caller has stripped the opening quote
        let mut out = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if let Some(&(_, '\'')) = chars.peek() {
                    chars.next();
                    out.push('\'');
                } else {
                    return (out, &rest[i + 1..]);
                }
            } else {
                out.push(c);
            }
        }
        // unterminated quote swallows the rest
        (out, "")
    }

    let s = raw.trim_start();
    if s.is_empty() {
        return (String::new(), String::new());
    }
    let (key, rest) = if let Some(stripped) = s.strip_prefix('\'') {
        quoted(stripped)
    } else {
        match s.find(char::is_whitespace) {
            Some(pos) => (s[..pos].to_string(), &s[pos..]),
            None => (s.to_string(), ""),
        }
    };
    let rest = rest.trim_start();
    let value = if let Some(stripped) = rest.strip_prefix('\'') {
        quoted(stripped).0
    } else {
        rest.to_string()
    };
    (key, value)
}

#[derive(Debug)]
pub enum Matcher {
    Int {
        rhs: i64,
    },
    Double {
        rhs: f64,
    },
    Time {
        rhs: i64,
    },
    Str {
        rhs: String,
        pattern: Option<Regex>,
    },
    List {
        rhs: String,
        pattern: Option<Regex>,
    },
    Dict {
        key: String,
        value: String,
        pattern: Option<Regex>,
    },
    Null,
}

fn compile_pattern(op: RelOp, raw: &str) -> Result<Option<Regex>, String> {
    let icase = matches!(op, RelOp::MatchesIcase | RelOp::DoesntMatchIcase);
    if matches!(
        op,
        RelOp::Matches | RelOp::DoesntMatch | RelOp::MatchesIcase | RelOp::DoesntMatchIcase
    ) {
        RegexBuilder::new(raw)
            .case_insensitive(icase)
            .build()
            .map(Some)
            .map_err(|e| format!("invalid regular expression: {e}"))
    } else {
        Ok(None)
    }
}

impl Matcher {
    pub fn build(ty: ColumnType, op: RelOp, raw: &str) -> Result<Matcher, String> {
        match ty {
            ColumnType::Int => Ok(Matcher::Int {
                rhs: raw.trim().parse().unwrap_or(0),
            }),
            ColumnType::Double | ColumnType::DictDouble => Ok(Matcher::Double {
                rhs: raw.trim().parse().unwrap_or(0.0),
            }),
            ColumnType::Time => Ok(Matcher::Time {
                rhs: raw.trim().parse().unwrap_or(0),
            }),
            ColumnType::String => Ok(Matcher::Str {
                rhs: raw.to_string(),
                pattern: compile_pattern(op, raw)?,
            }),
            ColumnType::List => Ok(Matcher::List {
                rhs: raw.to_string(),
                pattern: compile_pattern(op, raw)?,
            }),
            ColumnType::DictStr => {
                let (key, value) = parse_dict_argument(raw);
                let pattern = compile_pattern(op, &value)?;
                Ok(Matcher::Dict {
                    key,
                    value,
                    pattern,
                })
            }
            ColumnType::Blob => Err("cannot filter on blob columns".to_string()),
            ColumnType::Null => Ok(Matcher::Null),
        }
    }

    /// The comparison reference for bound derivation, shifted into UTC for
    /// time columns.
    pub fn int_ref(&self, timezone_offset: i64) -> Option<i64> {
        match self {
            Matcher::Int { rhs } => Some(*rhs),
            Matcher::Time { rhs } => Some(rhs - timezone_offset),
            _ => None,
        }
    }

    fn eval_str(op: RelOp, lhs: &str, rhs: &str, pattern: Option<&Regex>) -> bool {
        match op {
            RelOp::Equal => lhs == rhs,
            RelOp::NotEqual => lhs != rhs,
            RelOp::EqualIcase => lhs.eq_ignore_ascii_case(rhs),
            RelOp::NotEqualIcase => !lhs.eq_ignore_ascii_case(rhs),
            RelOp::Matches | RelOp::MatchesIcase => {
                pattern.map(|p| p.is_match(lhs)).unwrap_or(false)
            }
            RelOp::DoesntMatch | RelOp::DoesntMatchIcase => {
                pattern.map(|p| !p.is_match(lhs)).unwrap_or(false)
            }
            RelOp::Less => lhs < rhs,
            RelOp::GreaterOrEqual => lhs >= rhs,
            RelOp::Greater => lhs > rhs,
            RelOp::LessOrEqual => lhs <= rhs,
        }
    }

    /// Membership semantics for list columns: `>=` contains, `<` does not
    /// contain, `<=`/`>` the case-insensitive pair, `=` with an empty
    /// argument tests emptiness, the regex family matches any element.
    fn eval_list(op: RelOp, items: &[String], rhs: &str, pattern: Option<&Regex>) -> bool {
        match op {
            RelOp::Equal if rhs.is_empty() => items.is_empty(),
            RelOp::NotEqual if rhs.is_empty() => !items.is_empty(),
            RelOp::Equal | RelOp::NotEqual => false,
            RelOp::GreaterOrEqual => items.iter().any(|i| i == rhs),
            RelOp::Less => !items.iter().any(|i| i == rhs),
            RelOp::LessOrEqual => items.iter().any(|i| i.eq_ignore_ascii_case(rhs)),
            RelOp::Greater => !items.iter().any(|i| i.eq_ignore_ascii_case(rhs)),
            RelOp::Matches | RelOp::MatchesIcase => pattern
                .map(|p| items.iter().any(|i| p.is_match(i)))
                .unwrap_or(false),
            RelOp::DoesntMatch | RelOp::DoesntMatchIcase => pattern
                .map(|p| !items.iter().any(|i| p.is_match(i)))
                .unwrap_or(false),
            RelOp::EqualIcase | RelOp::NotEqualIcase => false,
        }
    }

    pub fn accepts(&self, op: RelOp, value: &Value, timezone_offset: i64) -> bool {
        // op is a parameter (not stored) so a negated filter can reuse the
        // compiled matcher unchanged.
        match self {
            Matcher::Int { rhs } => {
                let lhs = match value {
                    Value::Int(i) => *i,
                    other => other.as_f64() as i64,
                };
                op.eval_int(lhs, *rhs)
            }
            Matcher::Double { rhs } => {
                let lhs = value.as_f64();
                match op {
                    RelOp::Equal => lhs == *rhs,
                    RelOp::NotEqual => lhs != *rhs,
                    RelOp::Less => lhs < *rhs,
                    RelOp::GreaterOrEqual => lhs >= *rhs,
                    RelOp::Greater => lhs > *rhs,
                    RelOp::LessOrEqual => lhs <= *rhs,
                    _ => false,
                }
            }
            Matcher::Time { rhs } => {
                let lhs = match value {
                    Value::Time(t) => *t,
                    other => other.as_f64() as i64,
                };
                op.eval_int(lhs + timezone_offset, *rhs)
            }
            Matcher::Str { rhs, pattern } => {
                Matcher::eval_str(op, value.as_str(), rhs, pattern.as_ref())
            }
            Matcher::List { rhs, pattern } => match value {
                Value::List(items) => Matcher::eval_list(op, items, rhs, pattern.as_ref()),
                Value::Sublists(records) => {
                    // richer records compare on their first element
                    let names: Vec<String> = records
                        .iter()
                        .filter_map(|r| r.first())
                        .map(|v| v.as_str().to_string())
                        .collect();
                    Matcher::eval_list(op, &names, rhs, pattern.as_ref())
                }
                _ => false,
            },
            Matcher::Dict {
                key,
                value: rhs,
                pattern,
            } => {
                if key.is_empty() {
                    return match value {
                        Value::DictStr(entries) => match op {
                            RelOp::Equal => entries.is_empty(),
                            RelOp::NotEqual => !entries.is_empty(),
                            _ => false,
                        },
                        _ => false,
                    };
                }
                let entry = value.dict_entry(key);
                Matcher::eval_str(op, entry.as_str(), rhs, pattern.as_ref())
            }
            Matcher::Null => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(ty: ColumnType, op: &str, raw: &str, value: Value) -> bool {
        let op = RelOp::from_name(op).unwrap();
        Matcher::build(ty, op, raw).unwrap().accepts(op, &value, 0)
    }

    #[test]
    fn string_operators() {
        assert!(accepts(ColumnType::String, "=", "foo", Value::Str("foo".into())));
        assert!(!accepts(ColumnType::String, "=", "foo", Value::Str("bar".into())));
        assert!(accepts(ColumnType::String, "=~", "FOO", Value::Str("foo".into())));
        assert!(accepts(ColumnType::String, "~", "^f.o$", Value::Str("foo".into())));
        assert!(accepts(ColumnType::String, "~~", "^F.O$", Value::Str("foo".into())));
        assert!(accepts(ColumnType::String, "!~", "^b", Value::Str("foo".into())));
        assert!(accepts(ColumnType::String, "<", "m", Value::Str("abc".into())));
    }

    #[test]
    fn bad_regex_is_a_build_error() {
        assert!(Matcher::build(ColumnType::String, RelOp::Matches, "[").is_err());
    }

    #[test]
    fn int_comparisons_and_masks() {
        assert!(accepts(ColumnType::Int, ">=", "2", Value::Int(2)));
        assert!(!accepts(ColumnType::Int, ">", "2", Value::Int(2)));
        // flags 0b101: superset of 0b100, intersects 0b001
        assert!(accepts(ColumnType::Int, "~", "4", Value::Int(5)));
        assert!(accepts(ColumnType::Int, "~~", "1", Value::Int(5)));
        assert!(accepts(ColumnType::Int, "!~~", "2", Value::Int(5)));
    }

    #[test]
    fn time_comparison_shifts_the_stored_value_by_the_tz_offset() {
        let op = RelOp::GreaterOrEqual;
        let m = Matcher::build(ColumnType::Time, op, "1800").unwrap();
        // stored 0 + offset 1800 == rhs 1800
        assert!(m.accepts(op, &Value::Time(0), 1800));
        assert!(!m.accepts(op, &Value::Time(0), 0));
    }

    #[test]
    fn list_membership() {
        let groups = Value::List(vec!["linux".into(), "web".into()]);
        assert!(accepts(ColumnType::List, ">=", "linux", groups.clone()));
        assert!(!accepts(ColumnType::List, ">=", "windows", groups.clone()));
        assert!(accepts(ColumnType::List, "<", "windows", groups.clone()));
        assert!(accepts(ColumnType::List, "<=", "LINUX", groups.clone()));
        assert!(accepts(ColumnType::List, "~", "^li", groups.clone()));
        assert!(accepts(ColumnType::List, "=", "", Value::List(vec![])));
        assert!(!accepts(ColumnType::List, "=", "", groups));
    }

    #[test]
    fn dict_key_value_with_quoting() {
        let labels = Value::DictStr(vec![
            ("env".into(), "prod".into()),
            ("rock'n".into(), "rock'n roll".into()),
        ]);
        assert!(accepts(ColumnType::DictStr, "=", "env prod", labels.clone()));
        assert!(accepts(ColumnType::DictStr, "=", "   env    prod", labels.clone()));
        assert!(!accepts(ColumnType::DictStr, "=", "env prod ", labels.clone()));
        assert!(accepts(
            ColumnType::DictStr,
            "=",
            "'rock''n' 'rock''n roll'",
            labels.clone()
        ));
        assert!(accepts(ColumnType::DictStr, "=", "", Value::DictStr(vec![])));
        assert!(!accepts(ColumnType::DictStr, "=", "", labels));
    }
}
