use crate::models::FlagEntry;
use regex::Regex;
use std::{fmt, sync::OnceLock};

static KEY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn key_pattern() -> &'static Regex {
    KEY_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid key pattern"))
}

/// Part of a flag a [Finding] refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Key,
    Variants,
    DefaultVariant,
    Targeting,
    Fractional,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Key => "key",
            Field::Variants => "variants",
            Field::DefaultVariant => "defaultVariant",
            Field::Targeting => "targeting",
            Field::Fractional => "fractional",
        };
        f.write_str(name)
    }
}

/// A defect found in a flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub field: Field,
    pub message: String,
}

impl Finding {
    fn new<M: Into<String>>(field: Field, message: M) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a flag for internal consistency.
///
/// Advisory only: findings are meant to be shown next to the editor, they
/// don't block editing or export. All checks run; findings come out in the
/// order key, variants, default variant, rules, fractional.
pub fn validate(flag: &FlagEntry) -> Vec<Finding> {
    let mut findings = Vec::new();

    if flag.key.trim().is_empty() {
        findings.push(Finding::new(Field::Key, "Flag key is required"));
    }
    if !key_pattern().is_match(&flag.key) {
        findings.push(Finding::new(
            Field::Key,
            "Flag key may only contain letters, numbers, hyphens, and underscores",
        ));
    }

    if flag.variants.is_empty() {
        findings.push(Finding::new(
            Field::Variants,
            "At least one variant is required",
        ));
    }

    if !flag.default_variant.is_empty() && !flag.has_variant(&flag.default_variant) {
        findings.push(Finding::new(
            Field::DefaultVariant,
            format!(
                "Default variant \"{}\" is not in variants",
                flag.default_variant
            ),
        ));
    }

    for rule in &flag.targeting.rules {
        if !flag.has_variant(&rule.variant) {
            findings.push(Finding::new(
                Field::Targeting,
                format!(
                    "Rule targets variant \"{}\" which does not exist",
                    rule.variant
                ),
            ));
        }
        for condition in &rule.conditions {
            if condition.variable.trim().is_empty() {
                findings.push(Finding::new(
                    Field::Targeting,
                    "Condition variable is required",
                ));
            }
        }
    }

    if let Some(entries) = &flag.targeting.fractional {
        let total: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
        if total != 100 {
            findings.push(Finding::new(
                Field::Fractional,
                format!(
                    "Fractional weights must sum to 100 (currently {})",
                    total
                ),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::{validate, Field};
    use crate::{
        models::Operator,
        test_utils::{FlagBuilder, SequentialIds},
    };

    #[test]
    fn valid_flag_has_no_findings() {
        let flag = FlagBuilder::new("ok-1")
            .with_variants(vec![("on", true), ("off", false)])
            .with_default_variant("off")
            .into_inner();
        assert!(validate(&flag).is_empty());
        assert_eq!(validate(&flag), validate(&flag));
    }

    #[test]
    fn key_checks_are_independent() {
        let flag = FlagBuilder::new("").into_inner();
        let findings = validate(&flag);
        assert_eq!(2, findings.len());
        assert!(findings.iter().all(|f| f.field == Field::Key));
        assert_eq!("Flag key is required", findings[0].message);

        let flag = FlagBuilder::new("has space").into_inner();
        let findings = validate(&flag);
        assert_eq!(1, findings.len());
        assert_eq!(
            "key: Flag key may only contain letters, numbers, hyphens, and underscores",
            findings[0].to_string()
        );
    }

    #[test]
    fn variant_references() {
        let ids = SequentialIds::default();
        let flag = FlagBuilder::new("refs")
            .with_variants(Vec::<(&str, bool)>::new())
            .with_default_variant("gone")
            .add_rule(&ids, "missing", &[("", Operator::Eq, "x")])
            .into_inner();
        let fields: Vec<Field> = validate(&flag).iter().map(|f| f.field).collect();
        assert_eq!(
            vec![
                Field::Variants,
                Field::DefaultVariant,
                Field::Targeting,
                Field::Targeting
            ],
            fields
        );
    }

    #[test]
    fn unset_default_variant_is_not_reported() {
        let flag = FlagBuilder::new("no-default")
            .with_default_variant("")
            .into_inner();
        assert!(validate(&flag).is_empty());
    }

    #[test]
    fn rule_without_variant_is_reported() {
        let ids = SequentialIds::default();
        let flag = FlagBuilder::new("no-rule-variant")
            .add_rule(&ids, "", &[("region", Operator::Eq, "eu")])
            .into_inner();
        let findings = validate(&flag);
        assert_eq!(1, findings.len());
        assert_eq!(Field::Targeting, findings[0].field);
        assert_eq!(
            "Rule targets variant \"\" which does not exist",
            findings[0].message
        );
    }

    #[test]
    fn blank_condition_variable() {
        let ids = SequentialIds::default();
        let flag = FlagBuilder::new("blank-var")
            .add_rule(
                &ids,
                "on",
                &[("region", Operator::Eq, "eu"), ("  ", Operator::In, "a,b")],
            )
            .into_inner();
        let findings = validate(&flag);
        assert_eq!(1, findings.len());
        assert_eq!(Field::Targeting, findings[0].field);
        assert_eq!("Condition variable is required", findings[0].message);
    }

    #[test]
    fn fractional_weights_must_sum_to_100() {
        let ids = SequentialIds::default();
        let flag = FlagBuilder::new("split")
            .with_fractional(&ids, &[("on", 60), ("off", 30)])
            .into_inner();
        let findings = validate(&flag);
        assert_eq!(1, findings.len());
        assert_eq!(Field::Fractional, findings[0].field);
        assert!(findings[0].message.contains("90"));

        let flag = FlagBuilder::new("split")
            .with_fractional(&ids, &[("on", 70), ("off", 30)])
            .into_inner();
        assert!(validate(&flag).is_empty());
    }
}
