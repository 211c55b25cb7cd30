//! Source adapters for a media catalog.
//!
//! Each adapter fetches one anime or manga site and maps it onto the shared
//! model in [`types`]: series listings, details, episodes with their videos,
//! chapters with their pages. [`registry::SourceRegistry`] builds all of them.

pub mod config;
pub mod dates;
pub mod error;
pub mod extractors;
pub mod filters;
pub mod html;
pub mod http;
pub mod parallel;
pub mod providers;
pub mod quality;
pub mod registry;
pub mod themes;
pub mod types;

pub use error::{Result, SourceError};
pub use providers::{AnimeSource, MangaSource, SourceContext, SourceInfo};
pub use registry::{AnySource, SourceRegistry};
