//! Textual parameter binding.
//!
//! Livy has no parameterised-statement primitive, so bindings are rendered
//! into SQL literals and substituted into `%s` placeholders. The rendered
//! text is NOT escaped: never bind untrusted input through this path.

use crate::error::{LivyError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone};

/// A value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// SQL null, rendered as `''`
    Null,
    /// Boolean, rendered numerically (`1.0` / `0.0`)
    Bool(bool),
    /// Integer, rendered as a float literal
    Integer(i64),
    /// Float or decimal
    Float(f64),
    /// Timestamp, rendered as a quoted literal with millisecond precision
    Timestamp(NaiveDateTime),
    /// Anything else, rendered as a quoted string
    Text(String),
}

impl Binding {
    /// Render this value as SQL literal text.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "''".to_string(),
            Self::Bool(value) => float_literal(if *value { 1.0 } else { 0.0 }),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(value) => float_literal(*value as f64),
            Self::Float(value) => float_literal(*value),
            Self::Timestamp(value) => format!("'{}'", value.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::Text(value) => format!("'{value}'"),
        }
    }
}

fn float_literal(value: f64) -> String {
    format!("{value:?}")
}

impl From<Option<Self>> for Binding {
    fn from(value: Option<Self>) -> Self {
        value.unwrap_or(Self::Null)
    }
}

impl From<bool> for Binding {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Binding {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Binding {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Binding {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDateTime> for Binding {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Binding {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Timestamp(value.naive_local())
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Substitute rendered bindings into `%s` placeholders.
///
/// `%%` renders a literal `%`. Placeholder and binding counts must match.
///
/// # Errors
///
/// Returns [`LivyError::Validation`] on a count mismatch or an unsupported
/// `%` directive.
pub fn substitute(sql: &str, bindings: &[Binding]) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut values = bindings.iter();
    let mut chars = sql.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let value = values.next().ok_or_else(|| {
                    LivyError::Validation("not enough arguments for format string".to_string())
                })?;
                out.push_str(&value.to_literal());
            }
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(LivyError::Validation(format!(
                    "unsupported format character '{other}'"
                )));
            }
            None => {
                return Err(LivyError::Validation("incomplete format".to_string()));
            }
        }
    }

    if values.next().is_some() {
        return Err(LivyError::Validation(
            "not all arguments converted during string formatting".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn ts(ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 7, ms)
            .unwrap()
    }

    #[test]
    fn literals_by_type() {
        assert_eq!(Binding::Null.to_literal(), "''");
        assert_eq!(Binding::Integer(42).to_literal(), "42.0");
        assert_eq!(Binding::Float(2.5).to_literal(), "2.5");
        assert_eq!(Binding::Bool(true).to_literal(), "1.0");
        assert_eq!(Binding::from("abc").to_literal(), "'abc'");
        assert_eq!(
            Binding::Timestamp(ts(123)).to_literal(),
            "'2024-03-09 14:05:07.123'"
        );
    }

    #[test]
    fn timestamps_truncate_to_milliseconds() {
        let precise = ts(0)
            .checked_add_signed(chrono::Duration::microseconds(456_789))
            .unwrap();
        assert_eq!(
            Binding::from(precise).to_literal(),
            "'2024-03-09 14:05:07.456'"
        );
    }

    #[test]
    fn substitutes_in_order() {
        let sql = substitute(
            "select * from t where id = %s and name = %s and note = %s",
            &[Binding::from(7), Binding::from("x"), Binding::Null],
        )
        .unwrap();
        assert_eq!(sql, "select * from t where id = 7.0 and name = 'x' and note = ''");
    }

    #[test]
    fn percent_escape() {
        let sql = substitute("select '100%%' as pct, %s", &[Binding::from(1)]).unwrap();
        assert_eq!(sql, "select '100%' as pct, 1.0");
    }

    #[test]
    fn count_mismatch_is_rejected() {
        assert!(substitute("select %s, %s", &[Binding::from(1)]).is_err());
        assert!(substitute("select %s", &[Binding::from(1), Binding::from(2)]).is_err());
        assert!(substitute("select %d", &[Binding::from(1)]).is_err());
    }

    proptest! {
        #[test]
        fn float_literals_round_trip(value in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
            let literal = Binding::Float(value).to_literal();
            let parsed: f64 = literal.parse().unwrap();
            prop_assert_eq!(parsed, value);
        }

        #[test]
        fn integer_literals_round_trip(value in -(1_i64 << 52)..(1_i64 << 52)) {
            let literal = Binding::Integer(value).to_literal();
            let parsed: f64 = literal.parse().unwrap();
            #[allow(clippy::cast_possible_truncation)]
            let back = parsed as i64;
            prop_assert_eq!(back, value);
        }

        #[test]
        fn timestamp_literals_round_trip_to_the_millisecond(
            secs in 0_i64..4_102_444_800,
            nanos in 0_u32..1_000_000_000,
        ) {
            let value = DateTime::from_timestamp(secs, nanos).unwrap().naive_utc();
            let literal = Binding::Timestamp(value).to_literal();
            let inner = literal.trim_matches('\'');
            let parsed = NaiveDateTime::parse_from_str(inner, "%Y-%m-%d %H:%M:%S%.3f").unwrap();
            let delta = (value - parsed).num_microseconds().unwrap();
            prop_assert!((0..1000).contains(&delta));
        }
    }
}
