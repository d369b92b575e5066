//! Immutable registry of value types and constraints for one project load.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sheetflow_types::value::{Primitive, Value};

use crate::config::types::{ConstraintDecl, ValueTypeDecl};
use crate::valuetype::constraint::Constraint;

/// Why one cell failed its column's value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellRejection {
    /// The text is not a literal of the resolved primitive.
    Unparsable(Primitive),
    /// The first constraint of the refinement chain that failed.
    Constraint(String),
}

impl fmt::Display for CellRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsable(p) => write!(f, "not a valid {p}"),
            Self::Constraint(name) => write!(f, "violates {name}"),
        }
    }
}

/// A value type with its refinement chain flattened: base constraints
/// first, then each refinement's own.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    name: String,
    primitive: Primitive,
    constraints: Vec<Arc<Constraint>>,
}

impl ResolvedType {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn constraint_names(&self) -> impl Iterator<Item = &str> {
        self.constraints.iter().map(|c| c.name())
    }

    /// Parse raw cell text and check every constraint in order.
    ///
    /// # Errors
    ///
    /// Returns the first reason the cell is invalid.
    pub fn validate(&self, raw: &str) -> Result<Value, CellRejection> {
        let value = self
            .primitive
            .parse(raw)
            .ok_or(CellRejection::Unparsable(self.primitive))?;
        let text = if self.primitive == Primitive::Text {
            raw
        } else {
            raw.trim()
        };
        match self.constraints.iter().find(|c| !c.accepts_cell(text, &value)) {
            Some(failed) => Err(CellRejection::Constraint(failed.name().to_string())),
            None => Ok(value),
        }
    }
}

/// Named value types (including the four primitives) and constraints.
#[derive(Debug, Clone)]
pub struct ValueTypeRegistry {
    types: HashMap<String, Arc<ResolvedType>>,
    constraints: HashMap<String, Arc<Constraint>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

struct Resolver<'a> {
    decls: HashMap<&'a str, &'a ValueTypeDecl>,
    constraints: &'a HashMap<String, Arc<Constraint>>,
    resolved: HashMap<String, Arc<ResolvedType>>,
    state: HashMap<&'a str, Visit>,
    errors: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, name: &'a str, path: &mut Vec<&'a str>) -> Option<Arc<ResolvedType>> {
        if let Some(done) = self.resolved.get(name) {
            return Some(Arc::clone(done));
        }
        let decl = *self.decls.get(name)?;
        match self.state.get(name) {
            Some(Visit::InProgress) => {
                path.push(name);
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                self.errors.push(format!(
                    "value type cycle: {}",
                    path[start..].join(" -> ")
                ));
                path.pop();
                return None;
            }
            // Already failed.
            Some(Visit::Done) => return None,
            None => {}
        }
        self.state.insert(name, Visit::InProgress);
        path.push(name);

        let base = if let Some(primitive) = primitive_named(&decl.base) {
            Some(Arc::new(ResolvedType {
                name: primitive.as_str().to_string(),
                primitive,
                constraints: Vec::new(),
            }))
        } else if self.decls.contains_key(decl.base.as_str()) {
            self.resolve(decl.base.as_str(), path)
        } else {
            self.errors.push(format!(
                "value type '{name}': unknown base type '{}'",
                decl.base
            ));
            None
        };

        path.pop();
        self.state.insert(name, Visit::Done);
        let base = base?;

        let mut constraints = base.constraints.clone();
        let mut ok = true;
        for constraint_name in &decl.constraints {
            match self.constraints.get(constraint_name) {
                Some(c) => {
                    if let Err(e) = c.check_applicable(base.primitive) {
                        self.errors.push(format!("value type '{name}': {e}"));
                        ok = false;
                    }
                    constraints.push(Arc::clone(c));
                }
                None => {
                    self.errors.push(format!(
                        "value type '{name}': unknown constraint '{constraint_name}'"
                    ));
                    ok = false;
                }
            }
        }
        if !ok {
            return None;
        }

        let resolved = Arc::new(ResolvedType {
            name: name.to_string(),
            primitive: base.primitive,
            constraints,
        });
        self.resolved.insert(name.to_string(), Arc::clone(&resolved));
        Some(resolved)
    }
}

fn primitive_named(name: &str) -> Option<Primitive> {
    name.parse().ok()
}

impl ValueTypeRegistry {
    /// Compile constraints and resolve every value type.
    ///
    /// # Errors
    ///
    /// Returns every problem found: duplicate or invalid constraints,
    /// unknown references, incompatible constraint/primitive pairs and
    /// cyclic type definitions.
    pub fn build(
        constraints: &[ConstraintDecl],
        valuetypes: &[ValueTypeDecl],
    ) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        let mut compiled = HashMap::new();
        for decl in constraints {
            if decl.name.trim().is_empty() {
                errors.push("constraint with empty name".to_string());
                continue;
            }
            if compiled.contains_key(&decl.name) {
                errors.push(format!("duplicate constraint '{}'", decl.name));
                continue;
            }
            match Constraint::compile(decl) {
                Ok(c) => {
                    compiled.insert(decl.name.clone(), Arc::new(c));
                }
                Err(e) => errors.push(e),
            }
        }

        let mut decls = HashMap::new();
        for decl in valuetypes {
            if decl.name.trim().is_empty() {
                errors.push("value type with empty name".to_string());
            } else if primitive_named(&decl.name).is_some() {
                errors.push(format!(
                    "value type '{}' shadows a primitive type",
                    decl.name
                ));
            } else if decls.insert(decl.name.as_str(), decl).is_some() {
                errors.push(format!("duplicate value type '{}'", decl.name));
            }
        }

        let mut resolver = Resolver {
            decls,
            constraints: &compiled,
            resolved: HashMap::new(),
            state: HashMap::new(),
            errors,
        };
        for decl in valuetypes {
            let mut path = Vec::new();
            resolver.resolve(decl.name.as_str(), &mut path);
        }

        let Resolver {
            mut resolved,
            errors,
            ..
        } = resolver;
        if !errors.is_empty() {
            return Err(errors);
        }

        for primitive in Primitive::ALL {
            resolved.insert(
                primitive.as_str().to_string(),
                Arc::new(ResolvedType {
                    name: primitive.as_str().to_string(),
                    primitive,
                    constraints: Vec::new(),
                }),
            );
        }
        Ok(Self {
            types: resolved,
            constraints: compiled,
        })
    }

    /// Look up a value type (primitive names included).
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<ResolvedType>> {
        self.types.get(name).cloned()
    }

    #[must_use]
    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.get(name).map(AsRef::as_ref)
    }

    /// Number of registered value types, primitives included.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

impl Default for ValueTypeRegistry {
    /// A registry with only the primitives.
    fn default() -> Self {
        match Self::build(&[], &[]) {
            Ok(registry) => registry,
            Err(_) => Self {
                types: HashMap::new(),
                constraints: HashMap::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(yaml: &str) -> Result<ValueTypeRegistry, Vec<String>> {
        #[derive(serde::Deserialize)]
        struct Decls {
            #[serde(default)]
            constraints: Vec<ConstraintDecl>,
            #[serde(default)]
            valuetypes: Vec<ValueTypeDecl>,
        }
        let decls: Decls = serde_yaml::from_str(yaml).unwrap();
        ValueTypeRegistry::build(&decls.constraints, &decls.valuetypes)
    }

    #[test]
    fn primitives_are_always_registered() {
        let reg = ValueTypeRegistry::default();
        assert_eq!(reg.type_count(), 4);
        let int = reg.resolve("integer").unwrap();
        assert_eq!(int.validate(" 42 "), Ok(Value::Integer(42)));
        assert_eq!(
            int.validate("4x"),
            Err(CellRejection::Unparsable(Primitive::Integer))
        );
    }

    #[test]
    fn zone_type_requires_exact_value() {
        let reg = registry(
            "constraints:\n  - { name: Zone1925, equals: 1925 }\n\
             valuetypes:\n  - { name: Zone, base: integer, constraints: [Zone1925] }\n",
        )
        .unwrap();
        let zone = reg.resolve("Zone").unwrap();
        assert_eq!(zone.primitive(), Primitive::Integer);
        assert_eq!(zone.validate("1925"), Ok(Value::Integer(1925)));
        assert_eq!(
            zone.validate("1926"),
            Err(CellRejection::Constraint("Zone1925".into()))
        );
    }

    #[test]
    fn refinement_chain_checks_base_constraints_first() {
        let reg = registry(
            "constraints:\n  - { name: Positive, range: { lowerBound: 0, lowerBoundInclusive: false } }\n  - { name: Small, range: { upperBound: 10 } }\n\
             valuetypes:\n  - { name: PositiveDecimal, base: decimal, constraints: [Positive] }\n  - { name: SmallPositive, base: PositiveDecimal, constraints: [Small] }\n",
        )
        .unwrap();
        let t = reg.resolve("SmallPositive").unwrap();
        assert_eq!(t.constraint_names().collect::<Vec<_>>(), ["Positive", "Small"]);
        assert_eq!(
            t.validate("-1"),
            Err(CellRejection::Constraint("Positive".into()))
        );
        assert_eq!(t.validate("11"), Err(CellRejection::Constraint("Small".into())));
        assert_eq!(t.validate("3,5"), Ok(Value::Decimal(3.5)));
    }

    #[test]
    fn numeric_regex_keeps_written_digits() {
        let reg = registry(
            "constraints:\n  - { name: TwoPlaces, regex: '\\d+[.,]\\d{2}' }\n\
             valuetypes:\n  - { name: Price, base: decimal, constraints: [TwoPlaces] }\n",
        )
        .unwrap();
        let price = reg.resolve("Price").unwrap();
        assert_eq!(price.validate("51.20"), Ok(Value::Decimal(51.2)));
        assert_eq!(price.validate(" 3,50 "), Ok(Value::Decimal(3.5)));
        assert_eq!(
            price.validate("51.2"),
            Err(CellRejection::Constraint("TwoPlaces".into()))
        );
    }

    #[test]
    fn thousands_group_is_not_a_decimal() {
        let decimal = ValueTypeRegistry::default().resolve("decimal").unwrap();
        assert_eq!(
            decimal.validate("1,000"),
            Err(CellRejection::Unparsable(Primitive::Decimal))
        );
        assert_eq!(decimal.validate("1,5"), Ok(Value::Decimal(1.5)));
    }

    #[test]
    fn rejections_sort_unparsable_before_constraints() {
        let mut reasons = vec![
            CellRejection::Constraint("Zone1925".into()),
            CellRejection::Unparsable(Primitive::Decimal),
            CellRejection::Unparsable(Primitive::Integer),
        ];
        reasons.sort();
        assert_eq!(
            reasons,
            [
                CellRejection::Unparsable(Primitive::Integer),
                CellRejection::Unparsable(Primitive::Decimal),
                CellRejection::Constraint("Zone1925".into()),
            ]
        );
    }

    #[test]
    fn cycles_are_reported() {
        let errors = registry(
            "valuetypes:\n  - { name: A, base: B }\n  - { name: B, base: C }\n  - { name: C, base: A }\n",
        )
        .unwrap_err();
        assert!(
            errors.iter().any(|e| e.contains("cycle") && e.contains("A -> B -> C -> A")),
            "got: {errors:?}"
        );
    }

    #[test]
    fn unknown_references_and_incompatible_pairs_are_all_reported() {
        let errors = registry(
            "constraints:\n  - { name: Pos, range: { lowerBound: 0 } }\n\
             valuetypes:\n  - { name: Name, base: text, constraints: [Pos] }\n  - { name: Code, base: txt }\n  - { name: Id, base: integer, constraints: [Missing] }\n",
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3, "got: {errors:?}");
        assert!(errors.iter().any(|e| e.contains("cannot apply to text")));
        assert!(errors.iter().any(|e| e.contains("unknown base type 'txt'")));
        assert!(errors.iter().any(|e| e.contains("unknown constraint 'Missing'")));
    }

    #[test]
    fn duplicates_and_shadowing_are_rejected() {
        let errors = registry(
            "constraints:\n  - { name: C, equals: 1 }\n  - { name: C, equals: 2 }\n\
             valuetypes:\n  - { name: integer, base: text }\n",
        )
        .unwrap_err();
        assert!(errors.iter().any(|e| e.contains("duplicate constraint 'C'")));
        assert!(errors.iter().any(|e| e.contains("shadows a primitive")));
    }
}
