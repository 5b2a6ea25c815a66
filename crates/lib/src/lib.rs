//! charmbuild-lib: layer composition and build manifests for charms
//!
//! This crate provides the pieces of a charm build:
//! - `entity`: locating layers and interfaces locally or remotely
//! - `flatten`: ordering the include graph base-first
//! - `tactics`: composing every path of the stack into an output tree
//! - `options`: merging and linting layer option schemas
//! - `manifest`: the content-addressed `.build.manifest`
//! - `build`: the phase pipeline tying them together

pub mod build;
pub mod consts;
pub mod entity;
pub mod flatten;
pub mod layer;
pub mod manifest;
pub mod options;
pub mod platform;
pub mod tactics;
pub mod util;
