//! pdq-core: the package dependency query engine.
//!
//! The engine answers three questions over a universe of packages and typed
//! dependency edges: what a package depends on, what depends on a package,
//! and which packages nothing depends on (optionally extended by the
//! ring-fence closure of packages that would become removable alongside
//! them).
//!
//! One invocation flows left to right:
//!
//! ```text
//! CatalogSource -> Catalog -> (cache read/write) -> DependencyGraph
//!               -> query::{depends, dependants, no_dependants} -> Listing
//! ```
//!
//! The catalog is loaded once (from the snapshot cache when its staleness
//! token still matches the feed), the graph is built once and never mutated,
//! and every query borrows it. Rendering of [`query::Listing`] values is the
//! caller's concern; this crate produces structured records only.
//!
//! # Conventions
//!
//! - **Errors**: typed ([`error::EngineError`] with stable `E####` codes);
//!   propagation by `?`, no panicking paths outside tests.
//! - **Logging**: `tracing` macros on load, build, and query paths.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fmri;
pub mod graph;
pub mod query;
pub mod ringfence;
pub mod source;

pub use cache::{CacheManager, CacheOptions, CacheStatus, LatestCache, LatestKey, LoadResult, LoadSource};
pub use catalog::{Catalog, CatalogSource, DependencyEdge, DependencyType, LoadWarning, PackageRecord};
pub use config::Config;
pub use error::{EngineError, ErrorCode};
pub use fmri::{Fmri, FmriError, Version};
pub use graph::{DependencyGraph, TypeFilter};
pub use query::{
    Listing, ListingMode, NamesEntry, Operation, QueryOpts, ResultFlag, ResultRecord,
    validate_options,
};
pub use ringfence::ring_fence;
pub use source::FeedDir;
