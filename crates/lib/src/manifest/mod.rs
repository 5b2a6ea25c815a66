//! Build manifest: the content-addressed record of an output tree.
//!
//! Every file a build writes is recorded with the layer that produced it,
//! whether it was copied verbatim or generated, and its SHA-256 hash. The
//! manifest is read back on the next build to drop files that are no longer
//! produced and to recognise files a previous build generated.

mod store;
mod types;

pub use store::*;
pub use types::*;
