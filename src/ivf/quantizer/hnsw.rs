use hnsw_rs::prelude::*;
use rayon::prelude::*;

use crate::distance::Metric;
use crate::ivf::Quantizer;

struct DistMetric(Metric);

impl Distance<f32> for DistMetric {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        self.0.distance(va, vb)
    }
}

/// 基于 HNSW 图的近似量化器
pub struct HnswQuantizer {
    hnsw: Hnsw<'static, f32, DistMetric>,
    centroids: Vec<f32>,
    dim: usize,
    ef_search: usize,
}

impl HnswQuantizer {
    pub fn new(centroids: Vec<f32>, dim: usize, metric: Metric, ef_search: usize) -> Self {
        assert_eq!(centroids.len() % dim, 0, "centroids size mismatch");
        let nlist = centroids.len() / dim;
        let hnsw = Hnsw::<f32, DistMetric>::new(32, nlist.max(1), 16, 128, DistMetric(metric));
        centroids.par_chunks_exact(dim).enumerate().for_each(|(i, chunk)| {
            hnsw.insert((chunk, i));
        });
        Self { hnsw, centroids, dim, ef_search }
    }
}

impl Quantizer for HnswQuantizer {
    fn search(&self, x: &[f32], k: usize) -> Vec<usize> {
        if k == 0 || self.centroids.is_empty() {
            return vec![];
        }
        // HNSW 搜索结果已按距离升序排列
        self.hnsw.search(x, k, self.ef_search.max(k)).iter().map(|n| n.d_id).collect()
    }

    fn nlist(&self) -> usize {
        self.centroids.len() / self.dim
    }

    fn centroids(&self) -> &[f32] {
        &self.centroids
    }
}
