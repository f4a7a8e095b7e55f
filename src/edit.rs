//! Edits the structured editors apply to a copy of a flag.
//!
//! Each operation mutates a [FlagEntry] or [FlagTargeting] in place; callers
//! hand the finished record back to the [Store](crate::store::Store) as a
//! whole.

use crate::{
    id::IdSource,
    models::{
        FlagEntry, FlagTargeting, FlagType, FractionalEntry, TargetingCondition, TargetingRule,
        Variants,
    },
};
use serde_json::Value;
use tracing::debug;

impl FlagEntry {
    /// Switch the flag to another type.
    ///
    /// Variants are replaced by the type's defaults and the default variant
    /// moves to the first of them.
    pub fn change_type(&mut self, flag_type: FlagType) {
        debug!(key = %self.key, from = %self.flag_type, to = %flag_type, "changing flag type");
        self.variants = flag_type.default_variants();
        let first = self.variants.keys().next().cloned().unwrap_or_default();
        self.flag_type = flag_type;
        self.set_default_variant(first);
    }

    /// Set the default variant of the flag and of its targeting
    pub fn set_default_variant<V: Into<String>>(&mut self, variant: V) {
        let variant = variant.into();
        self.targeting.default_variant = variant.clone();
        self.default_variant = variant;
    }

    pub fn toggle_state(&mut self) {
        self.state = self.state.toggled();
    }

    /// Add a variant from raw editor text.
    ///
    /// Returns `false` for a blank or already used name.
    pub fn add_variant(&mut self, name: &str, raw: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.variants.contains_key(name) {
            return false;
        }
        let value = self.flag_type.parse_value(raw);
        self.variants.insert(name.to_owned(), value);
        true
    }

    /// Replace a variant's value from raw editor text
    pub fn set_variant_value(&mut self, name: &str, raw: &str) {
        let value = self.flag_type.parse_value(raw);
        self.variants.insert(name.to_owned(), value);
    }

    pub fn remove_variant(&mut self, name: &str) -> Option<Value> {
        self.variants.shift_remove(name)
    }

    /// Rename a variant in place, keeping its position.
    ///
    /// Returns `false` for blank names, no-op renames, unknown variants and
    /// names already taken. References from rules and the default variant
    /// are left alone; the validator reports them.
    pub fn rename_variant(&mut self, old: &str, new: &str) -> bool {
        let new = new.trim();
        if new.is_empty() || new == old || !self.has_variant(old) || self.has_variant(new) {
            return false;
        }
        let variants = std::mem::take(&mut self.variants);
        self.variants = variants
            .into_iter()
            .map(|(k, v)| if k == old { (new.to_owned(), v) } else { (k, v) })
            .collect::<Variants>();
        debug!(key = %self.key, %old, %new, "renamed variant");
        true
    }
}

impl FlagTargeting {
    /// Append a rule with one blank condition selecting the first variant
    pub fn add_rule(&mut self, variants: &Variants, ids: &dyn IdSource) -> &mut TargetingRule {
        let variant = variants.keys().next().cloned().unwrap_or_default();
        self.rules.push(TargetingRule {
            id: ids.next_id(),
            conditions: vec![TargetingCondition::empty(ids)],
            variant,
        });
        let last = self.rules.len() - 1;
        &mut self.rules[last]
    }

    pub fn remove_rule(&mut self, rule_id: &str) {
        self.rules.retain(|r| r.id != rule_id);
    }

    pub fn rule_mut(&mut self, rule_id: &str) -> Option<&mut TargetingRule> {
        self.rules.iter_mut().find(|r| r.id == rule_id)
    }

    /// Append a blank condition to a rule, returns `false` if there's no such rule
    pub fn add_condition(&mut self, rule_id: &str, ids: &dyn IdSource) -> bool {
        match self.rule_mut(rule_id) {
            Some(rule) => {
                rule.conditions.push(TargetingCondition::empty(ids));
                true
            }
            None => false,
        }
    }

    pub fn remove_condition(&mut self, rule_id: &str, condition_id: &str) {
        if let Some(rule) = self.rule_mut(rule_id) {
            rule.conditions.retain(|c| c.id != condition_id);
        }
    }

    /// Switch between rules and a fractional split.
    ///
    /// Turning the split on creates one entry per variant with the whole
    /// weight on the first. Rules are kept either way.
    pub fn toggle_fractional(&mut self, variants: &Variants, ids: &dyn IdSource) {
        if self.fractional.take().is_some() {
            return;
        }
        let entries = variants
            .keys()
            .enumerate()
            .map(|(i, variant)| FractionalEntry {
                id: ids.next_id(),
                variant: variant.clone(),
                weight: if i == 0 { 100 } else { 0 },
            })
            .collect();
        self.fractional = Some(entries);
    }

    /// Add a zero-weight entry for the first variant not in the split yet
    pub fn add_fractional_entry(&mut self, variants: &Variants, ids: &dyn IdSource) {
        let entries = self.fractional.get_or_insert_with(Vec::new);
        let variant = variants
            .keys()
            .find(|k| !entries.iter().any(|e| &e.variant == *k))
            .or_else(|| variants.keys().next())
            .cloned()
            .unwrap_or_default();
        entries.push(FractionalEntry {
            id: ids.next_id(),
            variant,
            weight: 0,
        });
    }

    pub fn remove_fractional_entry(&mut self, entry_id: &str) {
        if let Some(entries) = &mut self.fractional {
            entries.retain(|e| e.id != entry_id);
        }
    }

    /// Sum of the fractional weights, `None` without a split
    pub fn fractional_total(&self) -> Option<u64> {
        self.fractional
            .as_ref()
            .map(|entries| entries.iter().map(|e| u64::from(e.weight)).sum())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        models::{FlagEntry, FlagType, Operator},
        test_utils::{FlagBuilder, SequentialIds},
    };
    use serde_json::{json, Value};

    #[test]
    fn change_type_resets_variants() {
        let mut flag = FlagEntry::new("typed");
        flag.change_type(FlagType::Number);
        assert_eq!(FlagType::Number, flag.flag_type);
        assert_eq!(json!({"low": 0, "high": 100}), Value::Object(flag.variants.clone()));
        assert_eq!("low", flag.default_variant);
        assert_eq!("low", flag.targeting.default_variant);
    }

    #[test]
    fn variants_edit_by_type() {
        let mut flag = FlagEntry::new("vars");
        assert!(flag.add_variant(" maybe ", "true"));
        assert!(!flag.add_variant("on", "false"));
        assert!(!flag.add_variant("  ", "false"));
        assert_eq!(Some(&json!(true)), flag.variants.get("maybe"));

        flag.set_variant_value("maybe", "nope");
        assert_eq!(Some(&json!(false)), flag.variants.get("maybe"));

        assert_eq!(Some(json!(false)), flag.remove_variant("maybe"));
        assert_eq!(vec!["on", "off"], flag.variant_keys());
    }

    #[test]
    fn rename_variant_keeps_order() {
        let mut flag = FlagBuilder::new("rename")
            .with_variants(vec![("a", 1), ("b", 2), ("c", 3)])
            .into_inner();
        assert!(flag.rename_variant("b", " beta "));
        assert_eq!(vec!["a", "beta", "c"], flag.variant_keys());
        assert_eq!(Some(&json!(2)), flag.variants.get("beta"));

        assert!(!flag.rename_variant("a", ""));
        assert!(!flag.rename_variant("missing", "z"));
        assert_eq!(vec!["a", "beta", "c"], flag.variant_keys());
    }

    #[test]
    fn rename_variant_onto_taken_name_is_refused() {
        let mut flag = FlagBuilder::new("rename")
            .with_variants(vec![("a", 1), ("b", 2), ("c", 3)])
            .into_inner();
        assert!(!flag.rename_variant("a", "c"));
        assert_eq!(vec!["a", "b", "c"], flag.variant_keys());
        assert_eq!(Some(&json!(1)), flag.variants.get("a"));
        assert_eq!(Some(&json!(3)), flag.variants.get("c"));
    }

    #[test]
    fn rules_and_conditions() {
        let ids = SequentialIds::default();
        let mut flag = FlagEntry::new("rules");
        let variants = flag.variants.clone();

        let rule_id = flag.targeting.add_rule(&variants, &ids).id.clone();
        let rule = &flag.targeting.rules[0];
        assert_eq!("on", rule.variant);
        assert_eq!(1, rule.conditions.len());
        assert_eq!(Operator::Eq, rule.conditions[0].operator);
        assert_eq!("", rule.conditions[0].variable);

        assert!(flag.targeting.add_condition(&rule_id, &ids));
        assert!(!flag.targeting.add_condition("unknown", &ids));
        let first_cond = flag.targeting.rules[0].conditions[0].id.clone();
        flag.targeting.remove_condition(&rule_id, &first_cond);
        assert_eq!(1, flag.targeting.rules[0].conditions.len());

        flag.targeting.remove_rule(&rule_id);
        assert!(flag.targeting.rules.is_empty());
    }

    #[test]
    fn toggle_fractional() {
        let ids = SequentialIds::default();
        let mut flag = FlagEntry::new("split");
        let variants = flag.variants.clone();

        flag.targeting.toggle_fractional(&variants, &ids);
        let pairs: Vec<(String, u32)> = flag
            .targeting
            .fractional
            .iter()
            .flatten()
            .map(|e| (e.variant.clone(), e.weight))
            .collect();
        assert_eq!(vec![("on".to_owned(), 100), ("off".to_owned(), 0)], pairs);
        assert_eq!(Some(100), flag.targeting.fractional_total());

        flag.targeting.toggle_fractional(&variants, &ids);
        assert!(flag.targeting.fractional.is_none());
        assert_eq!(None, flag.targeting.fractional_total());
    }

    #[test]
    fn fractional_entries_prefer_unused_variants() {
        let ids = SequentialIds::default();
        let mut flag = FlagEntry::new("split");
        let variants = flag.variants.clone();

        flag.targeting.add_fractional_entry(&variants, &ids);
        flag.targeting.add_fractional_entry(&variants, &ids);
        flag.targeting.add_fractional_entry(&variants, &ids);
        let names: Vec<&str> = flag
            .targeting
            .fractional
            .iter()
            .flatten()
            .map(|e| e.variant.as_str())
            .collect();
        assert_eq!(vec!["on", "off", "on"], names);

        let id = flag.targeting.fractional.as_ref().map(|e| e[0].id.clone());
        flag.targeting.remove_fractional_entry(&id.unwrap_or_default());
        assert_eq!(Some(0), flag.targeting.fractional_total());
        assert_eq!(2, flag.targeting.fractional.as_ref().map_or(0, Vec::len));
    }

    #[test]
    fn toggle_state() {
        let mut flag = FlagEntry::new("state");
        flag.toggle_state();
        assert_eq!(crate::models::FlagState::Disabled, flag.state);
    }
}
