//! The flag document: the JSON file flag-evaluation servers read.
//!
//! ```json
//! {
//!   "$schema": "https://flagd.dev/schema/v0/flags.json",
//!   "flags": {
//!     "feature-x": {
//!       "state": "ENABLED",
//!       "variants": { "on": true, "off": false },
//!       "defaultVariant": "off",
//!       "targeting": { "if": [ ... ] }
//!     }
//!   }
//! }
//! ```
//!
//! Reading is lenient: missing or odd fields fall back to defaults instead of
//! failing, since documents are often edited by hand.

use crate::{
    compiler::compile_value,
    decompiler::decompile_with,
    id::{IdSource, UuidSource},
    infer::infer_flag_type,
    models::{FlagEntry, FlagSet, FlagState, Metadata, Variants},
};
use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, warn};

/// Schema reference written to exported documents
pub const SCHEMA_URL: &str = "https://flagd.dev/schema/v0/flags.json";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to parse JSON document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid flag document: missing 'flags' property")]
    MissingFlags,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top level of a flag document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub flags: Flags,

    /// Not interpreted, passed through as is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Not interpreted, passed through as is
    #[serde(rename = "$evaluators", default, skip_serializing_if = "Option::is_none")]
    pub evaluators: Option<Map<String, Value>>,
}

/// Flag definitions keyed by flag key, in document order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flags(pub Vec<(String, FlagDefinition)>);

/// A single flag as written in the document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    #[serde(default = "disabled", deserialize_with = "lenient_state")]
    pub state: FlagState,

    #[serde(default, deserialize_with = "lenient_object")]
    pub variants: Variants,

    #[serde(default, deserialize_with = "lenient_string")]
    pub default_variant: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Value>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_metadata"
    )]
    pub metadata: Option<Metadata>,
}

impl Default for FlagDefinition {
    fn default() -> Self {
        Self {
            state: FlagState::Disabled,
            variants: Variants::new(),
            default_variant: String::new(),
            targeting: None,
            metadata: None,
        }
    }
}

impl Document {
    /// Build the document for a flag collection.
    ///
    /// Empty targeting, metadata and evaluators are left out.
    pub fn from_flag_set(set: &FlagSet) -> Self {
        let flags = set
            .flags
            .iter()
            .map(|flag| (flag.key.clone(), FlagDefinition::from_entry(flag)))
            .collect();
        Self {
            schema: Some(SCHEMA_URL.to_owned()),
            flags: Flags(flags),
            metadata: Some(set.global_metadata.clone()).filter(|m| !m.is_empty()),
            evaluators: Some(set.evaluators.clone()).filter(|m| !m.is_empty()),
        }
    }

    /// Read the document into a flag collection with fresh UUID identity tokens
    pub fn into_flag_set(self) -> FlagSet {
        self.into_flag_set_with(&UuidSource)
    }

    /// [Document::into_flag_set] drawing identity tokens from `ids`
    pub fn into_flag_set_with(self, ids: &dyn IdSource) -> FlagSet {
        let flags = self
            .flags
            .0
            .into_iter()
            .map(|(key, def)| def.into_entry(key, ids))
            .collect();
        FlagSet {
            flags,
            global_metadata: self.metadata.unwrap_or_default(),
            evaluators: self.evaluators.unwrap_or_default(),
        }
    }

    /// Pretty-printed JSON with two-space indentation
    pub fn to_pretty_string(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

impl FlagDefinition {
    fn from_entry(flag: &FlagEntry) -> Self {
        Self {
            state: flag.state,
            variants: flag.variants.clone(),
            default_variant: flag.default_variant.clone(),
            targeting: compile_value(&flag.targeting),
            metadata: Some(flag.metadata.clone()).filter(|m| !m.is_empty()),
        }
    }

    fn into_entry(self, key: String, ids: &dyn IdSource) -> FlagEntry {
        let targeting = decompile_with(self.targeting.as_ref(), &self.default_variant, ids);
        FlagEntry {
            flag_type: infer_flag_type(&self.variants),
            key,
            state: self.state,
            variants: self.variants,
            default_variant: self.default_variant,
            targeting,
            metadata: self.metadata.unwrap_or_default(),
        }
    }
}

/// Parse document text.
///
/// A document without `flags` is rejected before anything else is read.
pub fn parse_document(text: &str) -> Result<Document, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("flags").map_or(true, Value::is_null) {
        return Err(ImportError::MissingFlags);
    }
    Ok(serde_json::from_value(value)?)
}

/// Parse document text straight into a flag collection
pub fn import_str(text: &str) -> Result<FlagSet, ImportError> {
    let set = parse_document(text)?.into_flag_set();
    info!(num_flags = set.flags.len(), "imported flag document");
    Ok(set)
}

/// Render a flag collection as document text
pub fn export_string(set: &FlagSet) -> Result<String, ExportError> {
    Document::from_flag_set(set).to_pretty_string()
}

impl Serialize for Flags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, def) in &self.0 {
            map.serialize_entry(key, def)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Flags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FlagsVisitor)
    }
}

struct FlagsVisitor;

impl<'de> Visitor<'de> for FlagsVisitor {
    type Value = Flags;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of flag definitions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut flags = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, raw)) = access.next_entry::<String, Value>()? {
            let def = if raw.is_object() {
                serde_json::from_value(raw).map_err(<A::Error as de::Error>::custom)?
            } else {
                warn!(%key, "flag definition is not an object, using defaults");
                FlagDefinition::default()
            };
            flags.push((key, def));
        }
        Ok(Flags(flags))
    }
}

fn disabled() -> FlagState {
    FlagState::Disabled
}

fn lenient_state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FlagState, D::Error> {
    let state = match Value::deserialize(deserializer)? {
        Value::String(s) if s == "ENABLED" => FlagState::Enabled,
        Value::String(s) if s == "DISABLED" => FlagState::Disabled,
        Value::Null => FlagState::Disabled,
        other => {
            warn!(state = %other, "unknown flag state, treating as DISABLED");
            FlagState::Disabled
        }
    };
    Ok(state)
}

fn lenient_object<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Variants, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Variants::new()),
        other => {
            warn!(value = %other, "expected an object, using an empty one");
            Ok(Variants::new())
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Metadata values are scalars; anything else is kept as its JSON text
fn lenient_metadata<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Metadata>, D::Error> {
    let map = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => return Ok(None),
    };
    let metadata = map
        .into_iter()
        .map(|(key, value)| match value {
            Value::Bool(_) | Value::Number(_) | Value::String(_) => (key, value),
            other => {
                warn!(%key, "non-scalar metadata value, keeping it as text");
                (key, Value::String(other.to_string()))
            }
        })
        .collect();
    Ok(Some(metadata))
}
