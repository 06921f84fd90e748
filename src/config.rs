use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::distance::Metric;
use crate::extractor::ModelKind;
use crate::ivf::QuantizerKind;

static CONF_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    ProjectDirs::from("", "vsearch", "vsearch")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".vsearch"))
});

#[derive(Parser, Debug, Clone)]
pub struct ExtractorOptions {
    /// 特征提取模型
    #[arg(long, value_enum, default_value_t = ModelKind::Combined)]
    pub model: ModelKind,
    /// 预处理时将图片缩放到的边长
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub input_size: u32,
    /// 缩略图特征的边长，维度为其平方
    #[arg(long, value_name = "SIDE", default_value_t = 16)]
    pub thumbnail_side: u32,
    /// 颜色直方图每个通道的分桶数量，维度为其立方
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub histogram_bins: u32,
    /// 允许的最大像素数量，超过则拒绝解码
    #[arg(long, value_name = "N", default_value_t = 40_000_000)]
    pub max_pixels: u64,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self::parse_from(["vsearch"])
    }
}

#[derive(Parser, Debug, Clone)]
pub struct IndexOptions {
    /// 距离度量
    #[arg(long, value_enum, default_value_t = Metric::Cosine)]
    pub metric: Metric,
    /// 索引分片数量
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub shards: usize,
    /// 分片向量数量达到该值时训练倒排索引，0 表示不自动训练
    #[arg(long, value_name = "N", default_value_t = 4096)]
    pub train_threshold: usize,
    /// 搜索的倒排列表数量
    #[arg(long, value_name = "N", default_value_t = 16)]
    pub nprobe: usize,
    /// 粗量化器类型
    #[arg(long, value_enum, default_value_t = QuantizerKind::Flat)]
    pub quantizer: QuantizerKind,
    /// K-means 最大迭代次数
    #[arg(long, value_name = "N", default_value_t = 25)]
    pub kmeans_iter: usize,
    /// HNSW 搜索时每次访问的节点数量
    #[arg(long, value_name = "N", default_value_t = 16)]
    pub ef_search: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::parse_from(["vsearch"])
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 返回的结果数量
    #[arg(short = 'k', long, value_name = "K", default_value_t = 10)]
    pub top_k: usize,
    /// 最低相似度，低于该值的结果会被过滤
    #[arg(long, value_name = "SCORE")]
    pub threshold: Option<f32>,
    /// 单张图片特征提取的超时时间，单位为毫秒
    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    pub extract_timeout: u64,
    /// 单次索引查询的超时时间，单位为毫秒
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    pub query_timeout: u64,
}

impl SearchOptions {
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout)
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::parse_from(["vsearch"])
    }
}

#[derive(Parser, Debug, Clone)]
pub struct IngestOptions {
    /// 同时处理的图片数量
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    pub concurrency: usize,
    /// 特征提取失败时的最大重试次数
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub max_retries: u32,
    /// 首次重试的等待时间，单位为毫秒，之后每次翻倍
    #[arg(long, value_name = "MS", default_value_t = 100)]
    pub retry_delay: u64,
    /// 重试等待时间的上限，单位为毫秒
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    pub max_retry_delay: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::parse_from(["vsearch"])
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "vsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// vsearch 配置文件目录
    #[arg(short, long, default_value_t = ConfDir::new(CONF_DIR.clone()))]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加目录中的图片到索引
    Add(AddCommand),
    /// 搜索相似图片
    Search(SearchCommand),
    /// 从索引中删除图片
    Remove(RemoveCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
    /// 显示索引统计信息
    Stats(StatsCommand),
    /// 导出所有特征向量
    Export(ExportCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("vsearch.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl std::fmt::Display for ConfDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
