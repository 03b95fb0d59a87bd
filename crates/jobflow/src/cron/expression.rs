// crates/jobflow/src/cron/expression.rs
//
// Five-field cron syntax: minute hour day-of-month month day-of-week.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Static description of one cron column.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub min: u32,
    pub max: u32,
    pub names: &'static [&'static str],
    pub names_base: u32,
}

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

pub const FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "minutes",
        min: 0,
        max: 59,
        names: &[],
        names_base: 0,
    },
    FieldSpec {
        name: "hours",
        min: 0,
        max: 23,
        names: &[],
        names_base: 0,
    },
    FieldSpec {
        name: "day_of_month",
        min: 1,
        max: 31,
        names: &[],
        names_base: 0,
    },
    FieldSpec {
        name: "month",
        min: 1,
        max: 12,
        names: MONTH_NAMES,
        names_base: 1,
    },
    FieldSpec {
        name: "day_of_week",
        min: 0,
        max: 6,
        names: WEEKDAY_NAMES,
        names_base: 0,
    },
];

/// One parsed cron column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronField {
    Wildcard,
    Exactly {
        value: u32,
    },
    Range {
        start: u32,
        end: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<u32>,
    },
    Member {
        values: Vec<u32>,
    },
    Unrecognized {
        token: String,
    },
}

impl CronField {
    /// Parses a single component for the given column. Never fails: anything
    /// outside the grammar becomes `Unrecognized` and is reported by `validate`.
    pub fn parse(component: &str, spec: &FieldSpec) -> Self {
        if component == "*" {
            return CronField::Wildcard;
        }

        let mut s = component.to_string();
        for (i, name) in spec.names.iter().enumerate() {
            s = s.replace(name, &(spec.names_base + i as u32).to_string());
        }
        s = s.replace('*', &format!("{}-{}", spec.min, spec.max));

        if let Some(v) = parse_number(&s) {
            return CronField::Exactly { value: v };
        }

        if let Some((range, interval)) = s.split_once('/') {
            if let (Some((start, end)), Some(k)) = (parse_range(range), parse_number(interval)) {
                return CronField::Range {
                    start,
                    end,
                    interval: Some(k),
                };
            }
        } else if let Some((start, end)) = parse_range(&s) {
            return CronField::Range {
                start,
                end,
                interval: None,
            };
        }

        if s.contains(',') {
            let values: Option<Vec<u32>> = s.split(',').map(parse_number).collect();
            if let Some(values) = values {
                return CronField::Member { values };
            }
        }

        CronField::Unrecognized { token: s }
    }

    /// Range-checks a parsed field. `component` is the text as written by the
    /// user and is quoted back in the messages.
    pub fn validate(&self, component: &str, spec: &FieldSpec) -> Vec<String> {
        let name = spec.name;
        let in_range = |v: u32| v >= spec.min && v <= spec.max;
        let mut errors = Vec::new();

        match self {
            CronField::Wildcard => {}
            CronField::Unrecognized { .. } => {
                errors.push(format!("{name} value '{component}' is unrecognized"));
            }
            CronField::Exactly { value } => {
                if !in_range(*value) {
                    errors.push(format!("{name} value '{component}' is out of range"));
                }
            }
            CronField::Range {
                start,
                end,
                interval,
            } => {
                if *start < spec.min {
                    errors.push(format!(
                        "{name} range value '{component}' starts out of range"
                    ));
                }
                if *end > spec.max {
                    errors.push(format!("{name} range value '{component}' ends out of range"));
                }
                if start > end {
                    errors.push(format!(
                        "{name} range value '{component}' ends before it starts"
                    ));
                }
                if *interval == Some(0) {
                    errors.push(format!(
                        "{name} range value '{component}' has a zero interval"
                    ));
                }
            }
            CronField::Member { values } => {
                if values.iter().any(|v| !in_range(*v)) {
                    errors.push(format!(
                        "{name} list '{component}' contains out of range element(s)"
                    ));
                }
            }
        }

        errors
    }

    pub fn matches(&self, v: u32) -> bool {
        match self {
            CronField::Wildcard => true,
            CronField::Exactly { value } => *value == v,
            CronField::Range {
                start,
                end,
                interval,
            } => {
                if v < *start || v > *end {
                    return false;
                }
                match interval {
                    None => true,
                    Some(0) => false,
                    Some(k) => (v - start) % k == 0,
                }
            }
            CronField::Member { values } => values.contains(&v),
            CronField::Unrecognized { .. } => false,
        }
    }
}

/// Digit strings too large for `u32` saturate so they fail the range check.
fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.parse().unwrap_or(u32::MAX))
}

fn parse_range(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once('-')?;
    Some((parse_number(a)?, parse_number(b)?))
}

/// Expands the `@` shorthands; anything else is returned unchanged.
pub fn resolve_alias(s: &str) -> &str {
    match s {
        "@hourly" => "0 * * * *",
        "@daily" => "0 0 * * *",
        "@weekly" => "0 0 * * 0",
        "@monthly" => "0 0 1 * *",
        "@yearly" | "@annually" => "0 0 1 1 *",
        other => other,
    }
}

/// A parsed and validated five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CronExpression {
    fields: Vec<CronField>,
}

impl CronExpression {
    /// Parses `source`, returning every validation message on failure.
    pub fn parse(source: &str) -> Result<Self, Vec<String>> {
        let resolved = resolve_alias(source.trim());
        let components: Vec<&str> = resolved.split_whitespace().collect();
        if components.len() != FIELDS.len() {
            return Err(vec!["must have five components (m h dm m dw)".to_string()]);
        }

        let mut fields = Vec::with_capacity(FIELDS.len());
        let mut errors = Vec::new();
        for (component, spec) in components.iter().zip(FIELDS.iter()) {
            let field = CronField::parse(component, spec);
            errors.extend(field.validate(component, spec));
            fields.push(field);
        }

        if errors.is_empty() {
            Ok(Self { fields })
        } else {
            Err(errors)
        }
    }

    pub fn fields(&self) -> &[CronField] {
        &self.fields
    }

    pub fn minutes(&self) -> &CronField {
        &self.fields[0]
    }

    pub fn hours(&self) -> &CronField {
        &self.fields[1]
    }

    pub fn day_of_month(&self) -> &CronField {
        &self.fields[2]
    }

    pub fn month(&self) -> &CronField {
        &self.fields[3]
    }

    pub fn day_of_week(&self) -> &CronField {
        &self.fields[4]
    }

    /// True when every column matches `t` at minute resolution.
    pub fn is_due(&self, t: DateTime<Utc>) -> bool {
        let vector = [
            t.minute(),
            t.hour(),
            t.day(),
            t.month(),
            t.weekday().num_days_from_sunday(),
        ];
        self.fields.len() == vector.len()
            && self
                .fields
                .iter()
                .zip(vector.iter())
                .all(|(field, v)| field.matches(*v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn parse(s: &str) -> CronExpression {
        CronExpression::parse(s).unwrap()
    }

    fn errors(s: &str) -> Vec<String> {
        CronExpression::parse(s).unwrap_err()
    }

    #[test]
    fn requires_five_components() {
        assert!(CronExpression::parse("* * * * *").is_ok());
        assert!(CronExpression::parse(" *  * * *      *   ").is_ok());
        assert_eq!(errors("* * * *"), vec!["must have five components (m h dm m dw)"]);
        assert!(CronExpression::parse("* * * * * *").is_err());
        assert!(CronExpression::parse("").is_err());
    }

    #[test]
    fn single_numbers_are_exact() {
        let c = parse("1 2 3 4 5");
        assert_eq!(c.minutes(), &CronField::Exactly { value: 1 });
        assert_eq!(c.hours(), &CronField::Exactly { value: 2 });
        assert_eq!(c.day_of_month(), &CronField::Exactly { value: 3 });
        assert_eq!(c.month(), &CronField::Exactly { value: 4 });
        assert_eq!(c.day_of_week(), &CronField::Exactly { value: 5 });
    }

    #[test]
    fn oversized_numbers_are_out_of_range() {
        assert_eq!(
            errors("99999999999 * * * *"),
            vec!["minutes value '99999999999' is out of range"]
        );
        assert_eq!(
            errors("* 1-99999999999 * * *"),
            vec!["hours range value '1-99999999999' ends out of range"]
        );
    }

    #[test]
    fn star_with_interval_expands_to_full_range() {
        let c = parse("*/15 */2 */3 */3 */2");
        assert_eq!(
            c.minutes(),
            &CronField::Range {
                start: 0,
                end: 59,
                interval: Some(15)
            }
        );
        assert_eq!(
            c.day_of_month(),
            &CronField::Range {
                start: 1,
                end: 31,
                interval: Some(3)
            }
        );
        assert_eq!(
            c.day_of_week(),
            &CronField::Range {
                start: 0,
                end: 6,
                interval: Some(2)
            }
        );
    }

    #[test]
    fn lists_and_names() {
        assert_eq!(
            parse("1,4,6 * * * *").minutes(),
            &CronField::Member {
                values: vec![1, 4, 6]
            }
        );
        assert_eq!(
            parse("* * * NOV,DEC *").month(),
            &CronField::Member {
                values: vec![11, 12]
            }
        );
        assert_eq!(parse("* * * JAN *").month(), &CronField::Exactly { value: 1 });
        assert_eq!(
            parse("* * * FEB-DEC/2 *").month(),
            &CronField::Range {
                start: 2,
                end: 12,
                interval: Some(2)
            }
        );
        assert_eq!(
            parse("* * * * TUE,FRI").day_of_week(),
            &CronField::Member { values: vec![2, 5] }
        );
        assert_eq!(parse("* * * * SUN").day_of_week(), &CronField::Exactly { value: 0 });
    }

    #[test]
    fn names_only_apply_in_their_own_column() {
        assert_eq!(errors("MAY * * * *"), vec!["minutes value 'MAY' is unrecognized"]);
        assert_eq!(
            errors("* * WED * *"),
            vec!["day_of_month value 'WED' is unrecognized"]
        );
    }

    #[test]
    fn out_of_range_messages() {
        assert_eq!(
            errors("* * * * 100"),
            vec!["day_of_week value '100' is out of range"]
        );
        assert_eq!(
            errors("* * * 0-100 *"),
            vec![
                "month range value '0-100' starts out of range",
                "month range value '0-100' ends out of range"
            ]
        );
        assert_eq!(
            errors("* * 10-40/2 * *"),
            vec!["day_of_month range value '10-40/2' ends out of range"]
        );
        assert_eq!(
            errors("* * * DEC-JAN *"),
            vec!["month range value 'DEC-JAN' ends before it starts"]
        );
        assert_eq!(
            errors("* 10,20,30,40 * * *"),
            vec!["hours list '10,20,30,40' contains out of range element(s)"]
        );
        assert_eq!(
            errors("*/0 * * * *"),
            vec!["minutes range value '*/0' has a zero interval"]
        );
    }

    #[test]
    fn aliases_match_their_expansion() {
        assert_eq!(parse("@daily"), parse("0 0 * * *"));
        assert_eq!(parse("@hourly"), parse("0 * * * *"));
        assert_eq!(parse("@weekly"), parse("0 0 * * 0"));
        assert_eq!(parse("@monthly"), parse("0 0 1 * *"));
        assert_eq!(parse("@yearly"), parse("0 0 1 1 *"));
        assert_eq!(parse("@annually"), parse("0 0 1 1 *"));
    }

    #[test]
    fn range_with_interval_matches_every_third() {
        let f = CronField::Range {
            start: 1,
            end: 59,
            interval: Some(3),
        };
        for v in [1, 4, 7, 10, 58] {
            assert!(f.matches(v), "{v} should match");
        }
        for v in [0, 2, 3, 5, 6, 8, 9, 59] {
            assert!(!f.matches(v), "{v} should not match");
        }
    }

    #[test]
    fn every_minute_is_always_due() {
        let c = parse("* * * * *");
        let mut t = Utc.with_ymd_and_hms(2024, 2, 28, 22, 0, 0).unwrap();
        for _ in 0..(60 * 30) {
            assert!(c.is_due(t));
            t += Duration::minutes(7);
        }
    }

    #[test]
    fn due_checks_every_column() {
        // 2024-03-04 is a Monday.
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        assert!(parse("30 9 4 3 1").is_due(t));
        assert!(parse("*/15 8-17 * MAR MON-FRI").is_due(t));
        assert!(!parse("31 9 4 3 1").is_due(t));
        assert!(!parse("30 9 * * SUN").is_due(t));
        assert!(parse("@daily").is_due(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()));
        assert!(!parse("@daily").is_due(t));
    }
}
