use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractorOptions, Opts};
use crate::error::Error;
use crate::service::SearchServiceBuilder;

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    /// 要删除的条目 ID
    #[arg(required = true)]
    pub ids: Vec<String>,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .open()
            .await?;

        for id in &self.ids {
            match service.remove(id).await {
                Ok(()) => println!("[OK] {id}"),
                Err(Error::NotFound(_)) => println!("[NOT FOUND] {id}"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
