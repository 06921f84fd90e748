pub mod cli;
pub mod config;
mod db;
pub mod distance;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ivf;
pub mod kmeans;
mod metrics;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod types;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use service::{SearchService, SearchServiceBuilder};
