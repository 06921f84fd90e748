use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{ExtractorOptions, IndexOptions, Opts, SearchOptions};
use crate::service::SearchServiceBuilder;
use crate::types::SearchResult;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let data = tokio::fs::read(&self.image).await?;

        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .index_options(self.index.clone())
            .search_options(self.search.clone())
            .open()
            .await?;

        let result =
            service.search(Arc::from(data), self.search.top_k, self.search.threshold).await?;
        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[SearchResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for r in result {
                println!("{:.4}\t{:.4}\t{}", r.score, r.distance, r.id);
            }
        }
    }
    Ok(())
}
