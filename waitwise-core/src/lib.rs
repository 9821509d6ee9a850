use thiserror::Error;

mod analytics;
mod config;
mod geo;
mod ledger;
mod policy;
mod prediction;

pub use analytics::*;
pub use config::*;
pub use geo::*;
pub use ledger::*;
pub use policy::*;
pub use prediction::*;

/// The type used to identify stored entities across the workspace.
pub type EntityId = i32;

/// Returned when a stored string does not name a known variant.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
