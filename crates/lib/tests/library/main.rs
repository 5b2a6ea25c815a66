//! Library integration tests: full builds against layer trees on disk.

mod build_tests;
mod common;
mod regenerate_tests;
mod remote_tests;
mod wheelhouse_tests;
