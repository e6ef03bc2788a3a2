//! Core HPO types

mod parameter;
mod trial;

// Re-export all public types
pub use parameter::{ParameterDomain, ParameterValue};
pub use trial::Trial;
