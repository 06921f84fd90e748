use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;

use crate::cli::SubCommandExtend;
use crate::config::{ExtractorOptions, IndexOptions, IngestOptions, Opts};
use crate::pipeline::{Ingestor, ScanOptions, task_scan};
use crate::service::SearchServiceBuilder;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub ingest: IngestOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp,gif,bmp")]
    pub suffix: String,
    /// 使用正则表达式将图片路径转换为条目 ID，默认使用图片路径
    /// 例：--replace '/path/to/image/(?<name>[0-9]+).jpg' '$name'
    #[arg(short, long, num_args = 2, value_names = ["REGEX", "REPLACE"], verbatim_doc_comment)]
    pub replace: Vec<String>,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let replace = match self.replace.as_slice() {
            [] => None,
            [re, replace] => Some((Regex::new(re)?, replace.clone())),
            _ => return Err(anyhow!("--replace 需要两个参数")),
        };
        let scan = ScanOptions::new(&self.suffix, replace).context("无效的后缀名")?;

        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .index_options(self.index.clone())
            .open()
            .await?;
        let ingestor = Ingestor::new(Arc::new(service), self.ingest.clone());

        // Ctrl-C 后停止扫描，已开始写入的图片会完成写入
        let cancel = ingestor.cancellation_token();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("收到中断信号，正在停止");
                    cancel.cancel();
                }
            }
        });

        let pb = ProgressBar::no_length().with_style(pb_style());
        let (t, rx) = task_scan(self.path.clone(), scan, pb.clone(), cancel);
        let report = ingestor.run(rx, Some(pb.clone())).await;
        let sent = t.await??;

        pb.finish_with_message("图片添加完成");
        info!(
            "共 {} 张图片：成功 {}，失败 {}，取消 {}",
            sent,
            report.indexed.len(),
            report.failed.len(),
            report.cancelled.len()
        );
        for (id, error) in &report.failed {
            println!("[ERR] {id}: {error}");
        }

        Ok(())
    }
}
