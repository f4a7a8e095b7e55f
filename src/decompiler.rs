//! Reads a wire-format targeting tree back into the rule model.
//!
//! Best effort: the document may be hand-edited and half-typed, so nothing in
//! here fails. Shapes that can't be represented as rules are carried as a
//! condition holding the node's JSON text.

use crate::{
    id::{IdSource, UuidSource},
    models::{FlagTargeting, FractionalEntry, Operator, TargetingCondition, TargetingRule},
    node::{IfNode, Operand, Otherwise, Predicate, Targeting},
};
use serde_json::Value;
use tracing::trace;

/// Decompile a flag's targeting with fresh UUID identity tokens.
///
/// `fallback` is the default variant used unless the chain ends in one.
pub fn decompile(node: Option<&Value>, fallback: &str) -> FlagTargeting {
    decompile_with(node, fallback, &UuidSource)
}

/// [decompile] drawing identity tokens from `ids`
pub fn decompile_with(node: Option<&Value>, fallback: &str, ids: &dyn IdSource) -> FlagTargeting {
    let mut result = FlagTargeting::fallback(fallback);
    let value = match node {
        Some(value) if !is_blank(value) => value,
        _ => return result,
    };

    match Targeting::parse(value) {
        Targeting::Fractional(splits) => {
            let entries = splits
                .into_iter()
                .map(|split| FractionalEntry {
                    id: ids.next_id(),
                    variant: split.variant,
                    weight: split.weight,
                })
                .collect();
            result.fractional = Some(entries);
        }
        Targeting::Chain(node) => read_chain(node, ids, &mut result),
        Targeting::Other(predicate) => {
            // not a chain: keep the node as the condition of a single rule
            result.rules.push(TargetingRule {
                id: ids.next_id(),
                conditions: conditions(predicate, ids),
                variant: fallback.to_owned(),
            });
        }
    }
    result
}

fn read_chain(node: IfNode, ids: &dyn IdSource, result: &mut FlagTargeting) {
    let mut link = Some(node);
    while let Some(IfNode {
        condition,
        then,
        otherwise,
    }) = link.take()
    {
        result.rules.push(TargetingRule {
            id: ids.next_id(),
            conditions: conditions(condition, ids),
            variant: then,
        });
        match otherwise {
            Otherwise::Chain(next) => link = Some(*next),
            Otherwise::Variant(variant) => result.default_variant = variant,
            Otherwise::Other(value) => {
                trace!(%value, "else branch is not a variant, keeping fallback default");
            }
        }
    }
}

/// Flatten a predicate into ANDed conditions
fn conditions(predicate: Predicate, ids: &dyn IdSource) -> Vec<TargetingCondition> {
    let mut out = Vec::new();
    flatten(predicate, ids, &mut out);
    out
}

fn flatten(predicate: Predicate, ids: &dyn IdSource, out: &mut Vec<TargetingCondition>) {
    match predicate {
        Predicate::And(children) => {
            for child in children {
                flatten(child, ids, out);
            }
        }
        Predicate::Compare(cmp) => {
            let value = match cmp.operand {
                Operand::Text(text) => text,
                Operand::List(items) => items.join(", "),
            };
            out.push(TargetingCondition::new(ids, cmp.variable, cmp.operator, value));
        }
        Predicate::Opaque(node) => {
            out.push(TargetingCondition::new(ids, "", Operator::Eq, node.to_string()));
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
