use crate::{
    id::IdSource,
    models::{
        FlagEntry, FlagState, FractionalEntry, Operator, TargetingCondition, TargetingRule,
        Variants,
    },
};
use std::cell::Cell;

/// Deterministic [IdSource] handing out `id-1`, `id-2`, ...
#[derive(Default)]
pub struct SequentialIds(Cell<u64>);

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let next = self.0.get() + 1;
        self.0.set(next);
        format!("id-{}", next)
    }
}

pub struct FlagBuilder(FlagEntry);

impl Default for FlagBuilder {
    fn default() -> Self {
        Self(FlagEntry::new("my_test_flag"))
    }
}

#[allow(dead_code)]
impl FlagBuilder {
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self::default().with_key(key)
    }

    pub fn off(mut self) -> Self {
        self.0.state = FlagState::Disabled;
        self
    }

    pub fn on(mut self) -> Self {
        self.0.state = FlagState::Enabled;
        self
    }

    pub fn with_key<K: Into<String>>(mut self, key: K) -> Self {
        self.0.key = key.into();
        self
    }

    pub fn with_variants<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.0.variants = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<Variants>();
        self
    }

    pub fn with_default_variant<V: Into<String>>(mut self, variant: V) -> Self {
        let variant = variant.into();
        self.0.targeting.default_variant = variant.clone();
        self.0.default_variant = variant;
        self
    }

    pub fn add_rule(
        mut self,
        ids: &dyn IdSource,
        variant: &str,
        conditions: &[(&str, Operator, &str)],
    ) -> Self {
        let conditions = conditions
            .iter()
            .map(|(variable, operator, value)| {
                TargetingCondition::new(ids, *variable, *operator, *value)
            })
            .collect();
        self.0.targeting.rules.push(TargetingRule {
            id: ids.next_id(),
            conditions,
            variant: variant.into(),
        });
        self
    }

    pub fn with_fractional(mut self, ids: &dyn IdSource, entries: &[(&str, u32)]) -> Self {
        let entries = entries
            .iter()
            .map(|(variant, weight)| FractionalEntry {
                id: ids.next_id(),
                variant: (*variant).into(),
                weight: *weight,
            })
            .collect();
        self.0.targeting.fractional = Some(entries);
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.0.metadata.insert(key.into(), value.into());
        self
    }

    pub fn into_inner(self) -> FlagEntry {
        self.0
    }
}
