use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray_npy::write_npy;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractorOptions, Opts};
use crate::service::SearchServiceBuilder;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    /// 特征向量输出路径
    #[arg(short, long, default_value = "vectors.npy")]
    pub output: PathBuf,
    /// 条目 ID 输出路径，顺序与特征向量一致
    #[arg(long, default_value = "ids.json")]
    pub ids: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .open()
            .await?;
        let (ids, data) = service.export().await?;
        write_npy(&self.output, &data)?;
        std::fs::write(&self.ids, serde_json::to_vec(&ids)?)?;
        info!("导出成功：{} 个条目", ids.len());
        Ok(())
    }
}
