//! Relational operators.
//!
//! Twelve operators, paired as negations. On integer and time columns the
//! regex family re-reads as bit-set relations: superset, subset and
//! intersection tests.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    /// Regex match; superset on bitmask values.
    Matches,
    DoesntMatch,
    /// Case-insensitive equality; subset on bitmask values.
    EqualIcase,
    NotEqualIcase,
    /// Case-insensitive regex match; intersection on bitmask values.
    MatchesIcase,
    DoesntMatchIcase,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
}

impl RelOp {
    pub fn from_name(name: &str) -> Result<RelOp, String> {
        match name {
            "=" => Ok(RelOp::Equal),
            "!=" => Ok(RelOp::NotEqual),
            "~" => Ok(RelOp::Matches),
            "!~" => Ok(RelOp::DoesntMatch),
            "=~" => Ok(RelOp::EqualIcase),
            "!=~" => Ok(RelOp::NotEqualIcase),
            "~~" => Ok(RelOp::MatchesIcase),
            "!~~" => Ok(RelOp::DoesntMatchIcase),
            "<" => Ok(RelOp::Less),
            ">=" => Ok(RelOp::GreaterOrEqual),
            ">" => Ok(RelOp::Greater),
            "<=" => Ok(RelOp::LessOrEqual),
            _ => Err(format!("invalid relational operator '{name}'")),
        }
    }

    /// The operator accepting exactly the complementary rows.
    pub fn negated(self) -> RelOp {
        match self {
            RelOp::Equal => RelOp::NotEqual,
            RelOp::NotEqual => RelOp::Equal,
            RelOp::Matches => RelOp::DoesntMatch,
            RelOp::DoesntMatch => RelOp::Matches,
            RelOp::EqualIcase => RelOp::NotEqualIcase,
            RelOp::NotEqualIcase => RelOp::EqualIcase,
            RelOp::MatchesIcase => RelOp::DoesntMatchIcase,
            RelOp::DoesntMatchIcase => RelOp::MatchesIcase,
            RelOp::Less => RelOp::GreaterOrEqual,
            RelOp::GreaterOrEqual => RelOp::Less,
            RelOp::Greater => RelOp::LessOrEqual,
            RelOp::LessOrEqual => RelOp::Greater,
        }
    }

    /// Comparison of two ordered integers under this operator, with the
    /// bitmask reinterpretation of the regex family.
    pub fn eval_int(self, x: i64, y: i64) -> bool {
        match self {
            RelOp::Equal => x == y,
            RelOp::NotEqual => x != y,
            RelOp::Matches => (x & y) == y,
            RelOp::DoesntMatch => (x & y) != y,
            RelOp::EqualIcase => (x & y) == x,
            RelOp::NotEqualIcase => (x & y) != x,
            RelOp::MatchesIcase => (x & y) != 0,
            RelOp::DoesntMatchIcase => (x & y) == 0,
            RelOp::Less => x < y,
            RelOp::GreaterOrEqual => x >= y,
            RelOp::Greater => x > y,
            RelOp::LessOrEqual => x <= y,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Equal => "=",
            RelOp::NotEqual => "!=",
            RelOp::Matches => "~",
            RelOp::DoesntMatch => "!~",
            RelOp::EqualIcase => "=~",
            RelOp::NotEqualIcase => "!=~",
            RelOp::MatchesIcase => "~~",
            RelOp::DoesntMatchIcase => "!~~",
            RelOp::Less => "<",
            RelOp::GreaterOrEqual => ">=",
            RelOp::Greater => ">",
            RelOp::LessOrEqual => "<=",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_parses_its_display_form() {
        for op in [
            RelOp::Equal,
            RelOp::NotEqual,
            RelOp::Matches,
            RelOp::DoesntMatch,
            RelOp::EqualIcase,
            RelOp::NotEqualIcase,
            RelOp::MatchesIcase,
            RelOp::DoesntMatchIcase,
            RelOp::Less,
            RelOp::GreaterOrEqual,
            RelOp::Greater,
            RelOp::LessOrEqual,
        ] {
            assert_eq!(RelOp::from_name(&op.to_string()).unwrap(), op);
            assert_eq!(op.negated().negated(), op);
        }
    }

    #[test]
    fn bitmask_relations() {
        // x=0b110 contains y=0b100, intersects 0b010, is subset of 0b111
        assert!(RelOp::Matches.eval_int(0b110, 0b100));
        assert!(!RelOp::Matches.eval_int(0b110, 0b001));
        assert!(RelOp::EqualIcase.eval_int(0b110, 0b111));
        assert!(RelOp::MatchesIcase.eval_int(0b110, 0b010));
        assert!(RelOp::DoesntMatchIcase.eval_int(0b110, 0b001));
    }
}
