/*!
 * Core Module
 * Shared types, limits and error classification
 */

pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use types::*;
