mod build;
mod verify;

pub use build::{BuildArgs, cmd_build};
pub use verify::cmd_verify;
