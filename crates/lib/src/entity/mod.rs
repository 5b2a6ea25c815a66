//! Entity location: turning layer and interface references into local
//! directories.

pub mod fetch;
mod locator;
pub mod resolve;
mod types;

pub use fetch::{FetchError, Fetcher, GitFetcher};
pub use locator::{EntityLocator, LocateError};
pub use resolve::{HttpResolver, ResolveError, Resolver, ResolverRecord};
pub use types::{EntityRef, EntityRefError, ResolvedEntity};
