//! Layers, interfaces and their declaration documents.

pub mod ignore;
mod types;

pub use ignore::{IgnoreError, IgnoreRules};
pub use types::*;
