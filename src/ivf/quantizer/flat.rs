use crate::distance::{Metric, knn};
use crate::ivf::Quantizer;

/// 精确量化器，逐一比较所有聚类中心
pub struct FlatQuantizer {
    centroids: Vec<f32>,
    dim: usize,
    metric: Metric,
}

impl FlatQuantizer {
    pub fn new(centroids: Vec<f32>, dim: usize, metric: Metric) -> Self {
        assert_eq!(centroids.len() % dim, 0, "centroids size mismatch");
        Self { centroids, dim, metric }
    }
}

impl Quantizer for FlatQuantizer {
    fn search(&self, x: &[f32], k: usize) -> Vec<usize> {
        knn(self.metric, x, &self.centroids, self.dim, k).into_iter().map(|(i, _)| i).collect()
    }

    fn nlist(&self) -> usize {
        self.centroids.len() / self.dim
    }

    fn centroids(&self) -> &[f32] {
        &self.centroids
    }
}
