//! Week/month change baselines from daily history.
//!
//! - [`model`] - Cached baseline records and the per-tab availability meta
//! - [`service`] - Fetching, caching and reading baselines

pub mod model;
pub mod service;


pub use model::{BaselineSet, BaselineTabMeta};
pub use service::BaselineService;
