mod flat;
mod hnsw;

use clap::ValueEnum;
pub use flat::FlatQuantizer;
pub use hnsw::HnswQuantizer;
use serde::Serialize;

use crate::distance::Metric;

/// 浮点向量的粗量化器，负责将向量分配到最接近的倒排列表
pub trait Quantizer: Send + Sync {
    /// 为单个向量搜索最接近的 k 个聚类中心，按距离升序返回其序号
    fn search(&self, x: &[f32], k: usize) -> Vec<usize>;

    /// 聚类中心数量
    fn nlist(&self) -> usize;

    /// 获取聚类中心，展平的 nlist * dim 数组
    fn centroids(&self) -> &[f32];

    /// 返回最接近的聚类中心
    fn assign(&self, x: &[f32]) -> usize {
        self.search(x, 1).first().copied().unwrap_or(0)
    }
}

/// 量化器类型
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizerKind {
    /// 暴力搜索聚类中心，结果精确
    Flat,
    /// 使用 HNSW 图搜索聚类中心，适合聚类中心较多的情况
    Hnsw,
}

impl QuantizerKind {
    /// 使用聚类中心构建量化器
    pub fn build(
        &self,
        centroids: Vec<f32>,
        dim: usize,
        metric: Metric,
        ef_search: usize,
    ) -> Box<dyn Quantizer> {
        match self {
            Self::Flat => Box::new(FlatQuantizer::new(centroids, dim, metric)),
            Self::Hnsw => Box::new(HnswQuantizer::new(centroids, dim, metric, ef_search)),
        }
    }
}
