//! The rule model: flags and their targeting logic as the editors see them.
//!
//! These types carry no wire-format meaning on their own. See
//! [`compiler`](crate::compiler) and [`decompiler`](crate::decompiler) for the
//! translation to and from the document representation.

use crate::id::IdSource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use tracing::warn;

/// Variant name to value, in insertion order.
pub type Variants = Map<String, Value>;

/// Flag metadata, in insertion order.
///
/// Values are kept scalar (bool, number or string).
pub type Metadata = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagState {
    Enabled,
    Disabled,
}

impl FlagState {
    pub fn toggled(self) -> Self {
        match self {
            FlagState::Enabled => FlagState::Disabled,
            FlagState::Disabled => FlagState::Enabled,
        }
    }
}

/// Declared value type of a flag's variants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagType {
    Boolean,
    String,
    Number,
    Object,
}

impl FlagType {
    /// Variants a flag starts out with after switching to this type
    pub fn default_variants(self) -> Variants {
        let mut variants = Variants::new();
        match self {
            FlagType::Boolean => {
                variants.insert("on".into(), true.into());
                variants.insert("off".into(), false.into());
            }
            FlagType::String => {
                variants.insert("variant_a".into(), "value_a".into());
                variants.insert("variant_b".into(), "value_b".into());
            }
            FlagType::Number => {
                variants.insert("low".into(), 0.into());
                variants.insert("high".into(), 100.into());
            }
            FlagType::Object => {
                variants.insert("default".into(), Value::Object(Map::new()));
            }
        }
        variants
    }

    /// Parse raw editor text into a variant value of this type.
    ///
    /// Never fails: text that doesn't fit the type collapses to the
    /// type's zero value.
    pub fn parse_value(self, raw: &str) -> Value {
        match self {
            FlagType::Boolean => Value::Bool(raw == "true"),
            FlagType::Number => Value::Number(parse_number(raw).unwrap_or_else(|| 0.into())),
            FlagType::Object => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            FlagType::String => Value::String(raw.to_owned()),
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagType::Boolean => "boolean",
            FlagType::String => "string",
            FlagType::Number => "number",
            FlagType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Parse numeric text, preferring an integer representation.
///
/// Empty text counts as zero. Non-finite values are rejected.
fn parse_number(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.into());
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Some(int.into());
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Parse raw editor text into a scalar metadata value
pub fn parse_metadata_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if !raw.trim().is_empty() => parse_number(raw)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_owned())),
        _ => Value::String(raw.to_owned()),
    }
}

/// Comparison operators a condition can use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    In,
    EndsWith,
    StartsWith,
    SemVer,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::EndsWith,
        Operator::StartsWith,
        Operator::SemVer,
    ];

    /// Key of this operator in the wire format
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::In => "in",
            Operator::EndsWith => "ends_with",
            Operator::StartsWith => "starts_with",
            Operator::SemVer => "sem_ver",
        }
    }

    /// Look up an operator by its wire key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == key)
    }
}

/// Operator text coming from a select box.
///
/// Anything unrecognized (including `fractional`) becomes `==`.
impl From<&str> for Operator {
    fn from(key: &str) -> Self {
        Operator::from_key(key).unwrap_or_else(|| {
            warn!(operator = %key, "unrecognized operator, using ==");
            Operator::Eq
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetingCondition {
    pub id: String,
    /// Name of the context attribute to compare
    pub variable: String,
    pub operator: Operator,
    /// Comparison value. For `in` this is a comma-separated list.
    pub value: String,
}

impl TargetingCondition {
    /// Blank `==` condition, as added by the editor
    pub fn empty(ids: &dyn IdSource) -> Self {
        Self::new(ids, "", Operator::Eq, "")
    }

    pub fn new<V: Into<String>, S: Into<String>>(
        ids: &dyn IdSource,
        variable: V,
        operator: Operator,
        value: S,
    ) -> Self {
        Self {
            id: ids.next_id(),
            variable: variable.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Conditions are ANDed; the rule selects `variant` when all of them hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetingRule {
    pub id: String,
    pub conditions: Vec<TargetingCondition>,
    pub variant: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FractionalEntry {
    pub id: String,
    pub variant: String,
    /// Share out of 100
    pub weight: u32,
}

/// Targeting logic of a flag.
///
/// Either an if/else-if/else chain of `rules` falling back to
/// `default_variant`, or a `fractional` split. When `fractional` is set the
/// rules are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagTargeting {
    pub rules: Vec<TargetingRule>,
    pub fractional: Option<Vec<FractionalEntry>>,
    pub default_variant: String,
}

impl FlagTargeting {
    /// Targeting without any rules
    pub fn fallback<S: Into<String>>(default_variant: S) -> Self {
        Self {
            rules: Vec::new(),
            fractional: None,
            default_variant: default_variant.into(),
        }
    }

    /// No rules and no fractional entries
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.fractional.as_ref().map_or(true, Vec::is_empty)
    }
}

/// A single flag in the collection
#[derive(Clone, Debug, PartialEq)]
pub struct FlagEntry {
    pub key: String,
    pub state: FlagState,
    pub flag_type: FlagType,
    pub variants: Variants,
    pub default_variant: String,
    pub targeting: FlagTargeting,
    pub metadata: Metadata,
}

impl FlagEntry {
    /// An enabled boolean flag with `on`/`off` variants defaulting to `off`
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            state: FlagState::Enabled,
            flag_type: FlagType::Boolean,
            variants: FlagType::Boolean.default_variants(),
            default_variant: "off".into(),
            targeting: FlagTargeting::fallback("off"),
            metadata: Metadata::new(),
        }
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    /// Variant names in order
    pub fn variant_keys(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }
}

/// The whole flag collection plus document-level passthrough data
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlagSet {
    pub flags: Vec<FlagEntry>,
    /// Document `metadata`, passed through untouched
    pub global_metadata: Map<String, Value>,
    /// Document `$evaluators`, passed through untouched
    pub evaluators: Map<String, Value>,
}

impl FlagSet {
    pub fn flag(&self, key: &str) -> Option<&FlagEntry> {
        self.flags.iter().find(|f| f.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flag(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_flag_defaults() {
        let flag = FlagEntry::new("my_flag");
        assert_eq!(FlagState::Enabled, flag.state);
        assert_eq!(FlagType::Boolean, flag.flag_type);
        assert_eq!(json!({"on": true, "off": false}), Value::Object(flag.variants.clone()));
        assert_eq!(vec!["on", "off"], flag.variant_keys());
        assert_eq!("off", flag.default_variant);
        assert_eq!("off", flag.targeting.default_variant);
        assert!(flag.targeting.is_empty());
    }

    #[test]
    fn default_variants_per_type() {
        assert_eq!(
            json!({"variant_a": "value_a", "variant_b": "value_b"}),
            Value::Object(FlagType::String.default_variants())
        );
        assert_eq!(
            json!({"low": 0, "high": 100}),
            Value::Object(FlagType::Number.default_variants())
        );
        assert_eq!(
            json!({"default": {}}),
            Value::Object(FlagType::Object.default_variants())
        );
    }

    #[test]
    fn parse_variant_values() {
        assert_eq!(json!(true), FlagType::Boolean.parse_value("true"));
        assert_eq!(json!(false), FlagType::Boolean.parse_value("yes"));
        assert_eq!(json!(42), FlagType::Number.parse_value(" 42 "));
        assert_eq!(json!(1.5), FlagType::Number.parse_value("1.5"));
        assert_eq!(json!(0), FlagType::Number.parse_value("abc"));
        assert_eq!(json!(0), FlagType::Number.parse_value("NaN"));
        assert_eq!(json!(0), FlagType::Number.parse_value(""));
        assert_eq!(json!({"a": 1}), FlagType::Object.parse_value(r#"{"a": 1}"#));
        assert_eq!(json!({}), FlagType::Object.parse_value("{broken"));
        assert_eq!(json!(" raw "), FlagType::String.parse_value(" raw "));
    }

    #[test]
    fn parse_metadata_values() {
        assert_eq!(json!(true), parse_metadata_value("true"));
        assert_eq!(json!(false), parse_metadata_value("false"));
        assert_eq!(json!(3), parse_metadata_value("3"));
        assert_eq!(json!(0.25), parse_metadata_value("0.25"));
        assert_eq!(json!("team-a"), parse_metadata_value("team-a"));
        assert_eq!(json!(""), parse_metadata_value(""));
    }

    #[test]
    fn operator_lookup() {
        for op in Operator::ALL.iter() {
            assert_eq!(Some(*op), Operator::from_key(op.as_str()));
        }
        assert_eq!(None, Operator::from_key("fractional"));
        assert_eq!(Operator::Eq, Operator::from("fractional"));
        assert_eq!(Operator::SemVer, Operator::from("sem_ver"));
    }

    #[test]
    fn empty_fractional_counts_as_empty() {
        let mut targeting = FlagTargeting::fallback("off");
        targeting.fractional = Some(Vec::new());
        assert!(targeting.is_empty());
    }
}
