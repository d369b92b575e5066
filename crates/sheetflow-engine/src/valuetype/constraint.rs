//! Compiled constraint predicates.

use regex::Regex;
use sheetflow_types::value::{Primitive, Value};

use crate::config::types::{ConstraintDecl, ConstraintRule, LengthDecl, RangeDecl};

#[derive(Debug, Clone)]
enum CompiledRule {
    Range(RangeDecl),
    Regex(Regex),
    Equals(Value),
    Allowlist(Vec<Value>),
    Denylist(Vec<Value>),
    Length(LengthDecl),
}

/// A named predicate over one typed value.
#[derive(Debug, Clone)]
pub struct Constraint {
    name: String,
    rule: CompiledRule,
}

impl Constraint {
    /// Compile a declaration, checking its parameters.
    ///
    /// # Errors
    ///
    /// Returns a description when the regex does not compile, bounds are
    /// inverted, or a candidate list is empty.
    pub fn compile(decl: &ConstraintDecl) -> Result<Self, String> {
        let context = format!("constraint '{}'", decl.name);
        let rule = match &decl.rule {
            ConstraintRule::Range(r) => {
                if let (Some(lo), Some(hi)) = (r.lower_bound, r.upper_bound) {
                    let empty = lo > hi
                        || (lo == hi && !(r.lower_bound_inclusive && r.upper_bound_inclusive));
                    if empty {
                        return Err(format!("{context}: range [{lo}, {hi}] admits no value"));
                    }
                }
                if r.lower_bound.is_none() && r.upper_bound.is_none() {
                    return Err(format!("{context}: range needs lowerBound or upperBound"));
                }
                CompiledRule::Range(*r)
            }
            ConstraintRule::Regex(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                let re = Regex::new(&anchored)
                    .map_err(|e| format!("{context}: invalid regex '{pattern}': {e}"))?;
                CompiledRule::Regex(re)
            }
            ConstraintRule::Equals(v) => CompiledRule::Equals(v.clone()),
            ConstraintRule::Allowlist(values) | ConstraintRule::Denylist(values)
                if values.is_empty() =>
            {
                return Err(format!("{context}: {} must not be empty", decl.rule.kind()));
            }
            ConstraintRule::Allowlist(values) => CompiledRule::Allowlist(values.clone()),
            ConstraintRule::Denylist(values) => CompiledRule::Denylist(values.clone()),
            ConstraintRule::Length(l) => {
                match (l.min_length, l.max_length) {
                    (None, None) => {
                        return Err(format!("{context}: length needs minLength or maxLength"))
                    }
                    (Some(min), Some(max)) if min > max => {
                        return Err(format!(
                            "{context}: minLength {min} exceeds maxLength {max}"
                        ))
                    }
                    _ => {}
                }
                CompiledRule::Length(*l)
            }
        };
        Ok(Self {
            name: decl.name.clone(),
            rule,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this constraint can be applied to values of `primitive`.
    ///
    /// # Errors
    ///
    /// Returns the reason the pairing is meaningless.
    pub fn check_applicable(&self, primitive: Primitive) -> Result<(), String> {
        let literal_fits = |v: &Value| {
            v.primitive() == primitive || (v.primitive().is_numeric() && primitive.is_numeric())
        };
        match &self.rule {
            CompiledRule::Range(_) if !primitive.is_numeric() => Err(format!(
                "range constraint '{}' cannot apply to {primitive}",
                self.name
            )),
            CompiledRule::Length(_) if primitive != Primitive::Text => Err(format!(
                "length constraint '{}' cannot apply to {primitive}",
                self.name
            )),
            CompiledRule::Equals(v) if !literal_fits(v) => Err(format!(
                "constraint '{}' compares with {} literal {v} but the type is {primitive}",
                self.name,
                v.primitive()
            )),
            CompiledRule::Allowlist(values) | CompiledRule::Denylist(values) => {
                match values.iter().find(|v| !literal_fits(v)) {
                    Some(v) => Err(format!(
                        "constraint '{}' lists {} literal {v} but the type is {primitive}",
                        self.name,
                        v.primitive()
                    )),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Evaluate the predicate against a value, using its display form for
    /// textual rules.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        self.accepts_cell(&value.to_string(), value)
    }

    /// Evaluate the predicate against a parsed cell.
    ///
    /// Regex and length rules see `text` as written in the cell, so `51.20`
    /// keeps its trailing zero; every other rule sees the typed `value`.
    #[must_use]
    pub fn accepts_cell(&self, text: &str, value: &Value) -> bool {
        match &self.rule {
            CompiledRule::Range(r) => value.as_f64().is_some_and(|v| within(r, v)),
            CompiledRule::Regex(re) => re.is_match(text),
            CompiledRule::Equals(expected) => value.typed_eq(expected),
            CompiledRule::Allowlist(values) => values.iter().any(|c| value.typed_eq(c)),
            CompiledRule::Denylist(values) => !values.iter().any(|c| value.typed_eq(c)),
            CompiledRule::Length(l) => {
                let len = text.chars().count();
                l.min_length.map_or(true, |min| len >= min)
                    && l.max_length.map_or(true, |max| len <= max)
            }
        }
    }
}

pub(crate) fn within(range: &RangeDecl, v: f64) -> bool {
    let above_lower = match range.lower_bound {
        None => true,
        Some(lo) if range.lower_bound_inclusive => v >= lo,
        Some(lo) => v > lo,
    };
    let below_upper = match range.upper_bound {
        None => true,
        Some(hi) if range.upper_bound_inclusive => v <= hi,
        Some(hi) => v < hi,
    };
    above_lower && below_upper
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn compile(yaml: &str) -> Constraint {
        let decl: ConstraintDecl = serde_yaml::from_str(yaml).unwrap();
        Constraint::compile(&decl).unwrap()
    }

    #[rstest]
    #[case(Value::Decimal(0.0001), true)]
    #[case(Value::Decimal(0.0), false)]
    #[case(Value::Integer(0), false)]
    #[case(Value::Decimal(-3.5), false)]
    #[case(Value::Integer(7), true)]
    fn exclusive_lower_bound(#[case] value: Value, #[case] accepted: bool) {
        let c = compile("name: Positive\nrange: { lowerBound: 0, lowerBoundInclusive: false }");
        assert_eq!(c.accepts(&value), accepted, "value {value}");
    }

    #[test]
    fn inclusive_upper_bound() {
        let c = compile("name: Pct\nrange: { lowerBound: 0, upperBound: 100 }");
        assert!(c.accepts(&Value::Integer(100)));
        assert!(c.accepts(&Value::Integer(0)));
        assert!(!c.accepts(&Value::Decimal(100.5)));
    }

    // `\s` demands one whitespace character after the comma, so the
    // unspaced pair is rejected.
    #[rstest]
    #[case("51.2, 6.7", true)]
    #[case("51.2,6.7", false)]
    #[case("51.2;6.7", false)]
    #[case("x51.2, 6.7", false)]
    #[case("51.2, 6.7x", false)]
    fn geo_pattern_as_documented(#[case] text: &str, #[case] accepted: bool) {
        let c = compile(r"name: GeoPattern
regex: '^\d{1,3}\.\d+,\s\d{1,3}\.\d+$'");
        assert_eq!(c.accepts(&Value::Text(text.into())), accepted, "text {text}");
    }

    #[rstest]
    #[case("51.2,6.7", true)]
    #[case("51.2, 6.7", true)]
    #[case("x51.2,6.7", false)]
    fn unanchored_regex_must_match_whole_value(#[case] text: &str, #[case] accepted: bool) {
        let c = compile(r"name: Geo
regex: '\d{1,3}\.\d+,\s?\d{1,3}\.\d+'");
        assert_eq!(c.accepts(&Value::Text(text.into())), accepted, "text {text}");
    }

    #[test]
    fn regex_on_numbers_sees_cell_text() {
        let c = compile(r"name: TwoPlaces
regex: '\d+\.\d{2}'");
        assert!(c.accepts_cell("51.20", &Value::Decimal(51.2)));
        assert!(!c.accepts_cell("51.2", &Value::Decimal(51.2)));
        assert!(!c.accepts(&Value::Decimal(51.2)));
    }

    #[test]
    fn equals_uses_typed_equality() {
        let c = compile("name: Zone\nequals: 1925");
        assert!(c.accepts(&Value::Integer(1925)));
        assert!(c.accepts(&Value::Decimal(1925.0)));
        assert!(!c.accepts(&Value::Integer(1926)));
        assert!(!c.accepts(&Value::Text("1925".into())));
    }

    #[test]
    fn allowlist_and_denylist() {
        let allow = compile("name: Mode\nallowlist: [bus, tram]");
        assert!(allow.accepts(&Value::Text("tram".into())));
        assert!(!allow.accepts(&Value::Text("ferry".into())));
        let deny = compile("name: NotZero\ndenylist: [0]");
        assert!(deny.accepts(&Value::Integer(3)));
        assert!(!deny.accepts(&Value::Decimal(0.0)));
    }

    #[test]
    fn length_counts_characters() {
        let c = compile("name: Code\nlength: { minLength: 2, maxLength: 3 }");
        assert!(c.accepts(&Value::Text("äöü".into())));
        assert!(!c.accepts(&Value::Text("a".into())));
        assert!(!c.accepts(&Value::Text("abcd".into())));
    }

    #[test]
    fn invalid_declarations_are_rejected() {
        for yaml in [
            "name: Bad\nregex: '(unclosed'",
            "name: Bad\nrange: { lowerBound: 5, upperBound: 1 }",
            "name: Bad\nrange: { lowerBound: 1, upperBound: 1, upperBoundInclusive: false }",
            "name: Bad\nrange: {}",
            "name: Bad\nallowlist: []",
            "name: Bad\nlength: { minLength: 4, maxLength: 2 }",
        ] {
            let decl: ConstraintDecl = serde_yaml::from_str(yaml).unwrap();
            assert!(Constraint::compile(&decl).is_err(), "accepted: {yaml}");
        }
    }

    #[test]
    fn applicability_follows_primitive() {
        let range = compile("name: R\nrange: { lowerBound: 0 }");
        assert!(range.check_applicable(Primitive::Decimal).is_ok());
        assert!(range.check_applicable(Primitive::Text).is_err());
        let length = compile("name: L\nlength: { maxLength: 3 }");
        assert!(length.check_applicable(Primitive::Integer).is_err());
        let equals = compile("name: E\nequals: 1925");
        assert!(equals.check_applicable(Primitive::Decimal).is_ok());
        assert!(equals.check_applicable(Primitive::Text).is_err());
        let regex = compile("name: X\nregex: '\\d+'");
        assert!(regex.check_applicable(Primitive::Integer).is_ok());
    }
}
