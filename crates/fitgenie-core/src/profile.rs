//! User profile snapshot consumed by the prompt builder.

use serde_json::Value;

/// Profile attributes of the requesting user.
///
/// Every field is optional. Missing, empty, or zero-valued attributes are
/// rendered with a fallback default by [`crate::prompt`], never rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserContext {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<String>,
    pub goals: Vec<String>,
    pub diet_type: Option<String>,
    pub fitness_level: Option<String>,
}

impl UserContext {
    /// Read a profile from loosely-shaped JSON (camelCase keys).
    ///
    /// Each attribute is read independently; a value of the wrong type is
    /// treated as absent rather than failing the whole profile. The diet
    /// type is accepted either as `dietType` or nested as
    /// `dietaryPreferences.type`.
    pub fn from_json(value: &Value) -> Self {
        let text = |key: &str| non_empty(value.get(key).and_then(Value::as_str));

        let goals = value
            .get("goals")
            .and_then(Value::as_array)
            .map(|goals| {
                goals
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let diet_type = text("dietType").or_else(|| {
            non_empty(
                value
                    .pointer("/dietaryPreferences/type")
                    .and_then(Value::as_str),
            )
        });

        Self {
            age: value
                .get("age")
                .and_then(Value::as_u64)
                .and_then(|a| u32::try_from(a).ok())
                .filter(|a| *a > 0),
            gender: text("gender"),
            height_cm: positive(value.get("heightCm")),
            weight_kg: positive(value.get("weightKg")),
            activity_level: text("activityLevel"),
            goals,
            diet_type,
            fitness_level: text("fitnessLevel"),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

fn positive(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0)
}
