//!
//! Utility module for unit and encoding conversions.
//!
//! Re-exports wei/ether helpers, hex helpers and ABI argument coercion for use throughout the codebase.
/// Conversion helpers
pub mod conv;

pub use conv::*;
