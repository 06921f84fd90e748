use anyhow::Result;
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{ExtractorOptions, IndexOptions, Opts};
use crate::service::SearchServiceBuilder;

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for StatsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .index_options(self.index.clone())
            .open()
            .await?;
        let stats = service.stats();

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Table => {
                println!("model : {}", service.extractor().model());
                println!("dim   : {}", stats.dim);
                println!("metric: {:?}", stats.metric);
                println!("len   : {}", stats.len);
                for (i, shard) in stats.shards.iter().enumerate() {
                    println!(
                        "shard {:>3}: len={} nlist={} trained={} imbalance={:.2}",
                        i, shard.len, shard.nlist, shard.trained, shard.imbalance
                    );
                }
            }
        }
        Ok(())
    }
}
