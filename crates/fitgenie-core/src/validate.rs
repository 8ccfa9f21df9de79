//! Structural validation of a candidate plan against the prompt schema.
//!
//! Every rule is checked independently and all defects are collected, in a
//! fixed order, so callers see every problem at once.

use serde::Serialize;
use serde_json::Value;

/// Outcome of validating one candidate plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub defects: Vec<String>,
}

impl ValidationVerdict {
    fn from_defects(defects: Vec<String>) -> Self {
        Self {
            valid: defects.is_empty(),
            defects,
        }
    }

    /// A failed verdict with a single defect, used when no candidate could
    /// be extracted at all.
    pub fn single_defect(defect: impl Into<String>) -> Self {
        Self::from_defects(vec![defect.into()])
    }
}

/// Validate a candidate plan.
///
/// Rules, in reporting order:
/// 1. The candidate must be present.
/// 2. `plan` must be present; nested plan rules are skipped when it is not.
/// 3. `plan.type` is a string, `plan.durationWeeks` and
///    `plan.workoutDaysPerWeek` are numbers, `plan.exercises` is an array.
/// 4. If `nutrition` is present, `nutrition.dailyCalories` is a number and
///    `nutrition.macros` is present.
///
/// "Present" means truthy: `null`, `false`, `0` and `""` count as absent.
pub fn validate(candidate: Option<&Value>) -> ValidationVerdict {
    let Some(candidate) = candidate.filter(|c| truthy(c)) else {
        return ValidationVerdict::single_defect("plan data is empty");
    };

    let mut defects = Vec::new();

    match present(candidate, "plan") {
        None => defects.push("missing \"plan\" object".to_owned()),
        Some(plan) => {
            if !plan.get("type").is_some_and(Value::is_string) {
                defects.push("plan.type must be a string".to_owned());
            }
            if !plan.get("durationWeeks").is_some_and(Value::is_number) {
                defects.push("plan.durationWeeks must be a number".to_owned());
            }
            if !plan.get("workoutDaysPerWeek").is_some_and(Value::is_number) {
                defects.push("plan.workoutDaysPerWeek must be a number".to_owned());
            }
            if !plan.get("exercises").is_some_and(Value::is_array) {
                defects.push("plan.exercises must be an array".to_owned());
            }
        }
    }

    if let Some(nutrition) = present(candidate, "nutrition") {
        if !nutrition.get("dailyCalories").is_some_and(Value::is_number) {
            defects.push("nutrition.dailyCalories must be a number".to_owned());
        }
        if present(nutrition, "macros").is_none() {
            defects.push("nutrition.macros is missing".to_owned());
        }
    }

    ValidationVerdict::from_defects(defects)
}

fn present<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| truthy(v))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
