use std::path::{Path, PathBuf};

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::IngestJob;
use crate::error::Result;

/// 目录扫描参数
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 匹配文件后缀名的正则
    pub suffix: Regex,
    /// 将文件路径转换为条目 ID 的正则和替换字符串
    pub replace: Option<(Regex, String)>,
}

impl ScanOptions {
    /// 从逗号分隔的后缀名列表构建，忽略大小写
    pub fn new(suffix: &str, replace: Option<(Regex, String)>) -> Result<Self, regex::Error> {
        let suffix = Regex::new(&format!("(?i)^({})$", suffix.replace(',', "|")))?;
        Ok(Self { suffix, replace })
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| self.suffix.is_match(&ext.to_string_lossy()))
    }

    /// 计算文件对应的条目 ID
    pub fn item_id(&self, path: &str) -> String {
        match &self.replace {
            Some((re, replace)) => re.replace(path, replace.as_str()).into_owned(),
            None => path.to_owned(),
        }
    }
}

/// 扫描目录，将所有匹配的图片发送到通道中，返回发送的图片数量
pub fn task_scan(
    path: PathBuf,
    opts: ScanOptions,
    pb: ProgressBar,
    cancel: CancellationToken,
) -> (JoinHandle<Result<usize>>, Receiver<IngestJob>) {
    let (tx, rx) = channel(num_cpus::get() * 2);
    let t = tokio::spawn(async move { scan_directory(path, opts, tx, pb, cancel).await });
    (t, rx)
}

async fn scan_directory(
    path: PathBuf,
    opts: ScanOptions,
    tx: Sender<IngestJob>,
    pb: ProgressBar,
    cancel: CancellationToken,
) -> Result<usize> {
    info!("开始扫描目录: {}", path.display());
    let entries = spawn_blocking({
        let opts = opts.clone();
        move || {
            WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && opts.matches(entry.path()))
                .map(|entry| entry.path().to_string_lossy().to_string())
                .collect::<Vec<_>>()
        }
    })
    .await?;
    info!("扫描完成，共 {} 张图片", entries.len());

    pb.set_length(entries.len() as u64);

    let (opts, pb) = (&opts, &pb);
    let sent = futures::stream::iter(entries)
        .take_until(cancel.cancelled())
        .map(|entry| async move {
            let data = tokio::fs::read(&entry).await;
            (entry, data)
        })
        .buffered(16)
        .filter_map(|(entry, data)| async move {
            match data {
                Ok(data) => Some(IngestJob::new(opts.item_id(&entry), data).with_source(entry)),
                Err(e) => {
                    warn!("读取文件失败 {}: {}", entry, e);
                    pb.inc(1);
                    None
                }
            }
        })
        .fold(0, |sent, job| {
            let tx = tx.clone();
            async move { if tx.send(job).await.is_ok() { sent + 1 } else { sent } }
        })
        .await;

    Ok(sent)
}
