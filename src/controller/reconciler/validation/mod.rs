//! # Validation
//!
//! Validates Declaration desired states and duration strings.
//!
//! The same [`Validator`] backs the admission endpoint and the in-loop check,
//! so identical inputs always produce identical verdicts.

mod declaration;
mod duration;

pub use declaration::{ValidationError, ValidationLimits, Validator};
pub use duration::{parse_kubernetes_duration, validate_duration_interval};
