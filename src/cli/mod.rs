mod add;
mod export;
mod remove;
mod search;
pub mod server;
mod stats;

pub use add::*;
pub use export::*;
pub use remove::*;
pub use search::*;
pub use server::*;
pub use stats::*;

use clap::ValueEnum;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
