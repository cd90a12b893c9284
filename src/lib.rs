pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod index;
pub mod join;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod prepare;
pub mod query;
pub mod rank;
pub mod sources;

pub use config::Config;
pub use error::{AffordError, Result};
pub use pipeline::{Pipeline, RankOutcome, RankReport, RankRequest};
