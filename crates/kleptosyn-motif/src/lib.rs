//! KleptoSyn motif library.
//!
//! Tradecraft motifs are parameterized graph/temporal templates: role slots
//! bound to concrete entities at instantiation, directed edges between
//! roles, and a timing DAG over those edges. This crate owns the template
//! model, its validation, the distributions templates draw from, and the
//! catalog (built-ins plus JSON files).

pub mod builtin;
pub mod distribution;
pub mod library;
pub mod template;
pub mod validate;

pub use distribution::{Distribution, DistributionError};
pub use library::{LibraryError, MotifLibrary};
pub use template::{
    Cardinality, EdgeSpec, EntityKind, MotifShape, MotifTemplate, Relation, RoleSlot, TemporalSpec,
};
pub use validate::{validate, MotifDefinitionError, MotifRule, ValidatedTemplate};
