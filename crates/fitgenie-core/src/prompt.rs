//! Prompt construction for plan generation.
//!
//! Renders the fixed plan schema and the user's profile into the text sent
//! to the model. Pure logic: the same inputs always produce byte-identical
//! output, so the validator can rely on exactly the fields promised here.


use crate::profile::UserContext;

/// Version tag embedded in every prompt. Bump when [`PLAN_SCHEMA`] changes.
pub const SCHEMA_VERSION: &str = "1.0";

/// JSON schema description the model is told to follow.
pub const PLAN_SCHEMA: &str = r#"{
  "plan": {
    "type": "string",
    "durationWeeks": "number",
    "workoutDaysPerWeek": "number",
    "exercises": [
      {
        "day": "string",
        "exercises": [
          {
            "name": "string",
            "category": "string",
            "sets": "number?",
            "reps": "string?",
            "weightKg": "number?",
            "durationSec": "number?",
            "tempo": "string?",
            "restSeconds": "number?",
            "equipment": "string?",
            "notes": "string?"
          }
        ]
      }
    ]
  },
  "nutrition": {
    "dailyCalories": "number",
    "macros": { "proteinG": "number", "carbsG": "number", "fatG": "number" },
    "meals": [ { "name": "string", "items": ["string"], "calories": "number" } ]
  },
  "rationale": "string",
  "warnings": ["string"]
}"#;

/// Fallbacks for profile attributes the user has not filled in.
const UNKNOWN: &str = "Unknown";
const DEFAULT_ACTIVITY_LEVEL: &str = "moderate";
const DEFAULT_GOALS: &str = "general fitness";
const DEFAULT_DIET: &str = "balanced";
const DEFAULT_FITNESS_LEVEL: &str = "beginner";

/// Build the system prompt: role, output contract, schema, user context.
pub fn build_system_prompt(context: Option<&UserContext>) -> String {
    let empty = UserContext::default();
    let ctx = context.unwrap_or(&empty);

    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You are FitGenie, a personal fitness assistant. \
         You must respond only with valid JSON following the EXACT schema described below. \
         Do not output any explanatory text outside JSON.\n\n",
    );

    prompt.push_str(&format!("SCHEMA_VERSION: {SCHEMA_VERSION}\n"));
    prompt.push_str(PLAN_SCHEMA);
    prompt.push_str("\n\n");

    prompt.push_str("USER CONTEXT:\n");
    prompt.push_str(&format!("- Age: {}\n", display_or(ctx.age, UNKNOWN)));
    prompt.push_str(&format!("- Gender: {}\n", ctx.gender.as_deref().unwrap_or(UNKNOWN)));
    prompt.push_str(&format!("- Height: {} cm\n", display_or(ctx.height_cm, UNKNOWN)));
    prompt.push_str(&format!("- Weight: {} kg\n", display_or(ctx.weight_kg, UNKNOWN)));
    prompt.push_str(&format!(
        "- Activity Level: {}\n",
        ctx.activity_level.as_deref().unwrap_or(DEFAULT_ACTIVITY_LEVEL)
    ));
    let goals = if ctx.goals.is_empty() {
        DEFAULT_GOALS.to_owned()
    } else {
        ctx.goals.join(", ")
    };
    prompt.push_str(&format!("- Goals: {goals}\n"));
    prompt.push_str(&format!(
        "- Dietary Preferences: {}\n",
        ctx.diet_type.as_deref().unwrap_or(DEFAULT_DIET)
    ));
    prompt.push_str(&format!(
        "- Fitness Level: {}\n",
        ctx.fitness_level.as_deref().unwrap_or(DEFAULT_FITNESS_LEVEL)
    ));
    prompt.push('\n');

    prompt.push_str(
        "Generate practical exercises available with bodyweight + common equipment. \
         Keep exercises safe and suitable for the user's fitness level.\n\n",
    );
    prompt.push_str(
        "Return ONLY valid JSON that matches the schema. \
         If something is unknown, fill with sensible defaults.",
    );

    prompt
}

/// Build the full text sent to the model for one user request.
pub fn build_prompt(context: Option<&UserContext>, message: &str) -> String {
    let mut prompt = build_system_prompt(context);
    prompt.push_str("\n\nUSER REQUEST: ");
    prompt.push_str(message);
    prompt
}

fn display_or<T: std::fmt::Display>(value: Option<T>, fallback: &str) -> String {
    value.map_or_else(|| fallback.to_owned(), |v| v.to_string())
}
