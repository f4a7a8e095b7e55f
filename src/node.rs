//! Typed view of the targeting expression found in flag documents.
//!
//! The wire format is a JSON-Logic style tree. Only the subset produced by the
//! [compiler](crate::compiler) is understood structurally:
//!
//! ```json
//! {"if": [<predicate>, "<variant>", <else>]}
//! {"and": [<predicate>, ...]}
//! {"<op>": [{"var": "<variable>"}, <value>]}
//! {"sem_ver": [{"var": "<variable>"}, ">=", "<version>"]}
//! {"fractional": [["<variant>", <weight>], ...]}
//! ```
//!
//! Everything else is kept around as an opaque [Value] so no information is
//! dropped while parsing.

use crate::models::Operator;
use serde_json::{json, Value};
use tracing::trace;

/// Comparator emitted for `sem_ver` conditions
pub const SEM_VER_COMPARATOR: &str = ">=";

/// Root of a flag's targeting expression
#[derive(Clone, Debug, PartialEq)]
pub enum Targeting {
    /// if/else-if/else chain
    Chain(IfNode),
    /// Weighted split across variants
    Fractional(Vec<Split>),
    /// Anything else, parsed as a bare predicate
    Other(Predicate),
}

/// `{"if": [condition, then, otherwise]}`
#[derive(Clone, Debug, PartialEq)]
pub struct IfNode {
    pub condition: Predicate,
    pub then: String,
    pub otherwise: Otherwise,
}

/// Else branch of an [IfNode]
#[derive(Clone, Debug, PartialEq)]
pub enum Otherwise {
    /// Next link of the chain
    Chain(Box<IfNode>),
    /// Terminal variant name
    Variant(String),
    /// Unsupported shape (or missing, as `null`)
    Other(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare(Comparison),
    And(Vec<Predicate>),
    Opaque(Value),
}

/// `{"<op>": [{"var": variable}, operand]}`
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub operator: Operator,
    pub variable: String,
    pub operand: Operand,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Text(String),
    List(Vec<String>),
}

/// One `[variant, weight]` pair of a fractional split
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub variant: String,
    pub weight: u32,
}

impl Targeting {
    /// Parse a targeting expression. Never fails.
    pub fn parse(value: &Value) -> Self {
        if let Some(entries) = value.get("fractional").and_then(Value::as_array) {
            return Targeting::Fractional(entries.iter().filter_map(Split::parse).collect());
        }
        match IfNode::parse(value) {
            Some(node) => Targeting::Chain(node),
            None => {
                trace!(%value, "targeting root is not an if-chain");
                Targeting::Other(Predicate::parse(value))
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Targeting::Chain(node) => node.to_value(),
            Targeting::Fractional(splits) => {
                let splits: Vec<Value> = splits.iter().map(Split::to_value).collect();
                json!({ "fractional": splits })
            }
            Targeting::Other(predicate) => predicate.to_value(),
        }
    }
}

impl IfNode {
    /// Parse `{"if": [...]}`, returns `None` for any other shape
    pub fn parse(value: &Value) -> Option<Self> {
        let args = value.get("if")?.as_array()?;
        let condition = Predicate::parse(args.get(0).unwrap_or(&Value::Null));
        let then = text(args.get(1).unwrap_or(&Value::Null));
        let otherwise = match args.get(2) {
            Some(Value::String(variant)) => Otherwise::Variant(variant.clone()),
            Some(other) => match IfNode::parse(other) {
                Some(next) => Otherwise::Chain(Box::new(next)),
                None => Otherwise::Other(other.clone()),
            },
            None => Otherwise::Other(Value::Null),
        };
        Some(Self {
            condition,
            then,
            otherwise,
        })
    }

    pub fn to_value(&self) -> Value {
        let otherwise = match &self.otherwise {
            Otherwise::Chain(next) => next.to_value(),
            Otherwise::Variant(variant) => Value::String(variant.clone()),
            Otherwise::Other(value) => value.clone(),
        };
        json!({ "if": [self.condition.to_value(), self.then, otherwise] })
    }
}

impl Predicate {
    /// Parse a condition node. Unknown shapes become [Predicate::Opaque].
    pub fn parse(value: &Value) -> Self {
        if let Some(children) = value.get("and").and_then(Value::as_array) {
            return Predicate::And(children.iter().map(Predicate::parse).collect());
        }
        for operator in Operator::ALL.iter().copied() {
            if let Some(args) = value.get(operator.as_str()).and_then(Value::as_array) {
                return Predicate::Compare(Comparison::from_args(operator, args));
            }
        }
        trace!(%value, "opaque condition");
        Predicate::Opaque(value.clone())
    }

    pub fn to_value(&self) -> Value {
        match self {
            Predicate::Compare(cmp) => cmp.to_value(),
            Predicate::And(children) => {
                let children: Vec<Value> = children.iter().map(Predicate::to_value).collect();
                json!({ "and": children })
            }
            Predicate::Opaque(value) => value.clone(),
        }
    }
}

impl Comparison {
    fn from_args(operator: Operator, args: &[Value]) -> Self {
        let variable = args
            .get(0)
            .and_then(|v| v.get("var"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        // sem_ver carries the comparator in between
        let operand = match operator {
            Operator::SemVer if args.len() > 2 => args.get(2),
            _ => args.get(1),
        };
        let operand = match operand {
            Some(Value::Array(items)) => Operand::List(items.iter().map(text).collect()),
            Some(value) => Operand::Text(text(value)),
            None => Operand::Text(String::new()),
        };
        Self {
            operator,
            variable,
            operand,
        }
    }

    pub fn to_value(&self) -> Value {
        let var = json!({ "var": self.variable });
        let operand = match &self.operand {
            Operand::Text(text) => Value::String(text.clone()),
            Operand::List(items) => items.iter().cloned().map(Value::String).collect(),
        };
        let args = match self.operator {
            Operator::SemVer => json!([var, SEM_VER_COMPARATOR, operand]),
            _ => json!([var, operand]),
        };
        let mut node = serde_json::Map::new();
        node.insert(self.operator.as_str().to_owned(), args);
        Value::Object(node)
    }
}

impl Split {
    fn parse(value: &Value) -> Option<Self> {
        let pair = match value.as_array() {
            Some(pair) => pair,
            None => {
                trace!(%value, "skipping fractional entry that is not a pair");
                return None;
            }
        };
        let variant = text(pair.get(0).unwrap_or(&Value::Null));
        let weight = pair.get(1).map(weight).unwrap_or_default();
        Some(Self { variant, weight })
    }

    fn to_value(&self) -> Value {
        json!([self.variant, self.weight])
    }
}

/// Display text of a scalar: strings verbatim, `null` empty, rest as JSON
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Weight of a fractional entry, rounded and clamped into `u32`
fn weight(value: &Value) -> u32 {
    if let Some(int) = value.as_u64() {
        return int.min(u32::MAX as u64) as u32;
    }
    match value.as_f64() {
        Some(float) if float > 0.0 => float.round().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}
