use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::distance::{Metric, l2_normalize, l2_squared};

#[derive(Debug, Clone, Default)]
pub struct KMeansState {
    /// 所有向量到其聚类中心的距离平方和
    pub distsum: f32,
    /// 聚类中心，展平的 k * dim 数组
    pub centroids: Vec<f32>,
    /// 每个聚类中心包含的向量数量
    pub centroid_frequency: Vec<usize>,
}

/// Lloyd K-means 聚类
///
/// 参数：
/// - data: 输入向量，展平的 n * dim 数组
/// - dim: 向量维度
/// - k: 聚类中心数量，超过向量数量时会被截断
/// - max_iter: 最大迭代次数
/// - metric: 余弦距离下每轮会对中心点重新归一化（球面 K-means）
/// - seed: 随机种子，相同输入和种子得到相同结果
pub fn kmeans(
    data: &[f32],
    dim: usize,
    k: usize,
    max_iter: usize,
    metric: Metric,
    seed: u64,
) -> KMeansState {
    let n = data.len() / dim;
    let k = k.min(n);
    if n == 0 || k == 0 {
        return KMeansState::default();
    }

    let mut rng = StdRng::seed_from_u64(seed);

    // 随机选取 k 个向量作为初始聚类中心
    let mut centroids = Vec::with_capacity(k * dim);
    for i in rand::seq::index::sample(&mut rng, n, k) {
        centroids.extend_from_slice(&data[i * dim..(i + 1) * dim]);
    }

    let mut distance = f32::MAX;
    let mut centroid_frequency = vec![0; k];

    for iter in 0..max_iter {
        let (assignments, new_distance) = update_assignments(data, &centroids, dim);

        // 距离不再明显减小则认为已收敛
        if new_distance >= distance * (1.0 - 1e-4) {
            distance = distance.min(new_distance);
            break;
        }
        distance = new_distance;

        let (new_centroids, new_frequency): (Vec<Vec<f32>>, Vec<usize>) = (0..k)
            .into_par_iter()
            .map(|cluster_id| {
                let old = &centroids[cluster_id * dim..(cluster_id + 1) * dim];
                update_centroid(data, dim, &assignments, cluster_id, old, metric)
            })
            .unzip();
        centroids = new_centroids.concat();
        centroid_frequency = new_frequency;

        debug!(
            "第 {} 轮 - 不平衡度：{:.2} | 距离和：{:.4}",
            iter,
            imbalance_factor(&centroid_frequency),
            distance
        );
    }

    KMeansState { distsum: distance, centroids, centroid_frequency }
}

/// 将每个点分配给最近的聚类中心，返回聚类中心的序号和总距离
fn update_assignments(data: &[f32], centroids: &[f32], dim: usize) -> (Vec<usize>, f32) {
    let (assignments, distances): (Vec<_>, Vec<_>) = data
        .par_chunks_exact(dim)
        .map(|point| {
            let mut min_distance = f32::MAX;
            let mut best_cluster = 0;
            for (j, centroid) in centroids.chunks_exact(dim).enumerate() {
                let distance = l2_squared(point, centroid);
                if distance < min_distance {
                    min_distance = distance;
                    best_cluster = j;
                }
            }
            (best_cluster, min_distance)
        })
        .unzip();
    (assignments, distances.iter().sum())
}

/// 更新聚类中心为所有分配点的均值，空聚类保留原中心
fn update_centroid(
    data: &[f32],
    dim: usize,
    assignments: &[usize],
    cluster_id: usize,
    old: &[f32],
    metric: Metric,
) -> (Vec<f32>, usize) {
    let mut sum = vec![0.0; dim];
    let mut count = 0;
    for (point, &assignment) in data.chunks_exact(dim).zip(assignments) {
        if assignment == cluster_id {
            sum.iter_mut().zip(point).for_each(|(s, x)| *s += x);
            count += 1;
        }
    }

    if count == 0 {
        return (old.to_vec(), 0);
    }

    sum.iter_mut().for_each(|s| *s /= count as f32);
    if metric == Metric::Cosine {
        l2_normalize(&mut sum);
    }
    (sum, count)
}

/// 计算不平衡因子，1.0 为完全平衡
pub fn imbalance_factor(hist: &[usize]) -> f32 {
    let (mut tot, mut uf) = (0.0, 0.0);
    for h in hist {
        let h = *h as f32;
        tot += h;
        uf += h.powf(2.0);
    }
    uf * hist.len() as f32 / tot.powf(2.0)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    /// 生成 num_clusters 个簇的样本数据
    fn generate_clustered_data(n: usize, num_clusters: usize, dim: usize) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(42);
        let centers = (0..num_clusters * dim).map(|_| rng.random_range(-1.0..1.0)).collect::<Vec<f32>>();
        let mut data = Vec::with_capacity(n * dim);
        for i in 0..n {
            let c = i % num_clusters;
            for j in 0..dim {
                data.push(centers[c * dim + j] + rng.random_range(-0.01..0.01));
            }
        }
        data
    }

    #[test]
    fn test_kmeans_two_clusters() {
        let data = vec![
            0.0, 0.0, 0.1, 0.0, 0.0, 0.1, //
            10.0, 10.0, 10.1, 10.0, 10.0, 10.1,
        ];
        let ks = kmeans(&data, 2, 2, 50, Metric::Euclidean, 7);

        assert_eq!(ks.centroids.len(), 4);
        let mut freq = ks.centroid_frequency.clone();
        freq.sort();
        assert_eq!(freq, vec![3, 3]);

        let mut centers = ks.centroids.chunks(2).map(|c| c[0]).collect::<Vec<_>>();
        centers.sort_by(f32::total_cmp);
        assert!(centers[0] < 1.0);
        assert!(centers[1] > 9.0);
    }

    #[test]
    fn test_kmeans_single_cluster() {
        let data = vec![0.5f32; 8 * 4];
        let ks = kmeans(&data, 4, 1, 10, Metric::Euclidean, 0);
        assert_eq!(ks.centroids, vec![0.5; 4]);
        assert_eq!(ks.centroid_frequency, vec![8]);
    }

    #[test]
    fn test_kmeans_k_larger_than_n() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let ks = kmeans(&data, 2, 10, 10, Metric::Euclidean, 0);
        assert_eq!(ks.centroids.len(), 4);
    }

    #[test]
    fn test_kmeans_empty() {
        let ks = kmeans(&[], 4, 3, 10, Metric::Euclidean, 0);
        assert!(ks.centroids.is_empty());
    }

    #[test]
    fn test_kmeans_deterministic() {
        let data = generate_clustered_data(400, 8, 16);
        let a = kmeans(&data, 16, 8, 20, Metric::Euclidean, 3);
        let b = kmeans(&data, 16, 8, 20, Metric::Euclidean, 3);
        assert_eq!(a.centroids, b.centroids);
    }

    #[test]
    fn test_kmeans_cosine_centroids_normalized() {
        let mut data = generate_clustered_data(200, 4, 8);
        for v in data.chunks_exact_mut(8) {
            l2_normalize(v);
        }
        let ks = kmeans(&data, 8, 4, 20, Metric::Cosine, 1);
        for c in ks.centroids.chunks_exact(8) {
            assert!((crate::distance::norm(c) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_imbalance_factor() {
        assert_eq!(imbalance_factor(&[2, 2, 2]), 1.0);
        // (2² + 2² + 1²) * 3 / (2 + 2 + 1)² = 1.08
        assert!((imbalance_factor(&[2, 2, 1]) - 1.08).abs() < 0.01);
        assert!(imbalance_factor(&[0, 0]).is_nan());
    }
}
