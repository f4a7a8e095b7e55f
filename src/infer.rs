use crate::models::{FlagType, Variants};
use serde_json::Value;

/// Guess the flag type of an imported flag from its variants.
///
/// Only the first variant is inspected. A document whose first variant
/// doesn't represent the intended type is mis-inferred; that's accepted.
pub fn infer_flag_type(variants: &Variants) -> FlagType {
    match variants.values().next() {
        Some(Value::Bool(_)) => FlagType::Boolean,
        Some(Value::Number(_)) => FlagType::Number,
        Some(Value::Object(_)) | Some(Value::Array(_)) => FlagType::Object,
        _ => FlagType::String,
    }
}
