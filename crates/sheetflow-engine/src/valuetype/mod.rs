//! Value types, constraints and the registry that resolves them.

pub mod constraint;
pub mod registry;

pub use constraint::Constraint;
pub use registry::{CellRejection, ResolvedType, ValueTypeRegistry};
