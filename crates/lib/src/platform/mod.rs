//! Platform-specific filesystem locations.

pub mod paths;
