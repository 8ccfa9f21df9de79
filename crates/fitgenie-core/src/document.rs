//! Typed, read-only view of a stored plan payload.
//!
//! Stored payloads have already passed [`crate::validate`], but only the
//! fields that validation checks are guaranteed. Everything here is
//! optional so any payload can be rendered.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct PlanDocument {
    pub plan: Option<WorkoutPlan>,
    pub nutrition: Option<Nutrition>,
    pub rationale: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkoutPlan {
    pub plan_type: Option<String>,
    pub duration_weeks: Option<f64>,
    pub workout_days_per_week: Option<f64>,
    pub exercises: Vec<WorkoutDay>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkoutDay {
    pub day: Option<String>,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, Default)]
pub struct Exercise {
    pub name: Option<String>,
    pub category: Option<String>,
    pub sets: Option<f64>,
    /// Either a count or a range such as `"8-10"`, kept as written.
    pub reps: Option<String>,
    pub weight_kg: Option<f64>,
    pub duration_sec: Option<f64>,
    pub tempo: Option<String>,
    pub rest_seconds: Option<f64>,
    pub equipment: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Nutrition {
    pub daily_calories: Option<f64>,
    pub macros: Option<Macros>,
    pub meals: Vec<Meal>,
}

#[derive(Debug, Clone, Default)]
pub struct Macros {
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Meal {
    pub name: Option<String>,
    pub items: Vec<String>,
    pub calories: Option<f64>,
}

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, or strings that parse as one (`"3"`).
fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Objects inside the array at `key`; other entries are skipped.
fn objects<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn strings(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

impl PlanDocument {
    /// Interpret a payload field by field. Fields of the wrong type are
    /// dropped individually; a non-object payload is an empty document.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            plan: obj
                .get("plan")
                .and_then(Value::as_object)
                .map(WorkoutPlan::from_object),
            nutrition: obj
                .get("nutrition")
                .and_then(Value::as_object)
                .map(Nutrition::from_object),
            rationale: text(obj, "rationale"),
            warnings: strings(obj, "warnings"),
        }
    }

    /// Plain-text rendering for terminals.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(plan) = &self.plan {
            out.push_str(&format!(
                "{} plan: {} weeks, {} days/week\n",
                plan.plan_type.as_deref().unwrap_or("Workout"),
                num(plan.duration_weeks),
                num(plan.workout_days_per_week),
            ));
            for day in &plan.exercises {
                out.push_str(&format!("\n  {}\n", day.day.as_deref().unwrap_or("Day")));
                for exercise in &day.exercises {
                    out.push_str(&format!("    - {}\n", exercise.summary()));
                }
            }
        }

        if let Some(nutrition) = &self.nutrition {
            out.push_str(&format!(
                "\nNutrition: {} kcal/day\n",
                num(nutrition.daily_calories)
            ));
            if let Some(m) = &nutrition.macros {
                out.push_str(&format!(
                    "  protein {}g, carbs {}g, fat {}g\n",
                    num(m.protein_g),
                    num(m.carbs_g),
                    num(m.fat_g)
                ));
            }
            for meal in &nutrition.meals {
                out.push_str("  ");
                out.push_str(meal.name.as_deref().unwrap_or("Meal"));
                if let Some(kcal) = meal.calories {
                    out.push_str(&format!(" ({} kcal)", num(Some(kcal))));
                }
                if !meal.items.is_empty() {
                    out.push_str(&format!(": {}", meal.items.join(", ")));
                }
                out.push('\n');
            }
        }

        if let Some(rationale) = &self.rationale {
            out.push_str(&format!("\nWhy: {rationale}\n"));
        }
        for warning in &self.warnings {
            out.push_str(&format!("! {warning}\n"));
        }

        out
    }
}

impl WorkoutPlan {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            plan_type: text(obj, "type"),
            duration_weeks: number(obj, "durationWeeks"),
            workout_days_per_week: number(obj, "workoutDaysPerWeek"),
            exercises: objects(obj, "exercises").map(WorkoutDay::from_object).collect(),
        }
    }
}

impl WorkoutDay {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            day: text(obj, "day"),
            exercises: objects(obj, "exercises").map(Exercise::from_object).collect(),
        }
    }
}

impl Nutrition {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            daily_calories: number(obj, "dailyCalories"),
            macros: obj
                .get("macros")
                .and_then(Value::as_object)
                .map(|m| Macros {
                    protein_g: number(m, "proteinG"),
                    carbs_g: number(m, "carbsG"),
                    fat_g: number(m, "fatG"),
                }),
            meals: objects(obj, "meals")
                .map(|m| Meal {
                    name: text(m, "name"),
                    items: strings(m, "items"),
                    calories: number(m, "calories"),
                })
                .collect(),
        }
    }
}

impl Exercise {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            name: text(obj, "name"),
            category: text(obj, "category"),
            sets: number(obj, "sets"),
            reps: text(obj, "reps"),
            weight_kg: number(obj, "weightKg"),
            duration_sec: number(obj, "durationSec"),
            tempo: text(obj, "tempo"),
            rest_seconds: number(obj, "restSeconds"),
            equipment: text(obj, "equipment"),
            notes: text(obj, "notes"),
        }
    }

    /// One-line description, e.g. `Goblet squat [legs] 3 x 8-10, rest 90s`.
    pub fn summary(&self) -> String {
        let mut line = self.name.clone().unwrap_or_else(|| "Exercise".to_owned());
        if let Some(category) = &self.category {
            line.push_str(&format!(" [{category}]"));
        }
        match (self.sets, &self.reps) {
            (Some(sets), Some(reps)) => line.push_str(&format!(" {} x {reps}", num(Some(sets)))),
            (Some(sets), None) => line.push_str(&format!(" {} sets", num(Some(sets)))),
            (None, Some(reps)) => line.push_str(&format!(" {reps} reps")),
            (None, None) => {}
        }
        if let Some(secs) = self.duration_sec {
            line.push_str(&format!(" for {}s", num(Some(secs))));
        }
        if let Some(kg) = self.weight_kg {
            line.push_str(&format!(" @ {}kg", num(Some(kg))));
        }
        if let Some(rest) = self.rest_seconds {
            line.push_str(&format!(", rest {}s", num(Some(rest))));
        }
        line
    }
}

fn num(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_owned(), |v| v.to_string())
}
