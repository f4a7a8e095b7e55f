//! Translates the rule model into the wire-format targeting tree.

use crate::{
    models::{FlagTargeting, Operator, TargetingCondition, TargetingRule},
    node::{Comparison, IfNode, Operand, Otherwise, Predicate, Split, Targeting},
};
use serde_json::Value;

/// Build the targeting tree for a flag.
///
/// Returns `None` when there is nothing to target on, in which case the
/// document omits the `targeting` field. A non-empty fractional list wins
/// over any rules.
pub fn compile(targeting: &FlagTargeting) -> Option<Targeting> {
    if let Some(entries) = targeting.fractional.as_ref().filter(|e| !e.is_empty()) {
        let splits = entries
            .iter()
            .map(|entry| Split {
                variant: entry.variant.clone(),
                weight: entry.weight,
            })
            .collect();
        return Some(Targeting::Fractional(splits));
    }

    // fold from the last rule outwards, so the innermost else is the default
    let mut chain: Option<IfNode> = None;
    for rule in targeting.rules.iter().rev() {
        let otherwise = match chain.take() {
            Some(next) => Otherwise::Chain(Box::new(next)),
            None => Otherwise::Variant(targeting.default_variant.clone()),
        };
        chain = Some(IfNode {
            condition: compile_rule(rule),
            then: rule.variant.clone(),
            otherwise,
        });
    }
    chain.map(Targeting::Chain)
}

/// [compile] straight into JSON
pub fn compile_value(targeting: &FlagTargeting) -> Option<Value> {
    compile(targeting).map(|t| t.to_value())
}

fn compile_rule(rule: &TargetingRule) -> Predicate {
    match rule.conditions.as_slice() {
        [single] => compile_condition(single),
        conditions => Predicate::And(conditions.iter().map(compile_condition).collect()),
    }
}

fn compile_condition(condition: &TargetingCondition) -> Predicate {
    let operand = match condition.operator {
        Operator::In => Operand::List(
            condition
                .value
                .split(',')
                .map(|item| item.trim().to_owned())
                .collect(),
        ),
        _ => Operand::Text(condition.value.clone()),
    };
    Predicate::Compare(Comparison {
        operator: condition.operator,
        variable: condition.variable.clone(),
        operand,
    })
}
