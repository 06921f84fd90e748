use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 向量距离度量
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// 余弦距离，1 - cos
    Cosine,
    /// 欧氏距离
    Euclidean,
}

impl Metric {
    /// 计算两个向量的距离
    ///
    /// 余弦距离假定输入已经归一化，见 [`Metric::prepare`]
    #[inline(always)]
    pub fn distance(&self, va: &[f32], vb: &[f32]) -> f32 {
        match self {
            Self::Cosine => (1.0 - dot(va, vb)).max(0.0),
            Self::Euclidean => l2_squared(va, vb).sqrt(),
        }
    }

    /// 将距离转换为相似度，值越大越相似
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance),
        }
    }

    /// 将向量转换为索引内部的存储形式，余弦距离下会归一化
    pub fn prepare(&self, v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        if *self == Self::Cosine {
            l2_normalize(&mut v);
        }
        v
    }
}

#[inline(always)]
pub fn dot(va: &[f32], vb: &[f32]) -> f32 {
    va.iter().zip(vb).map(|(a, b)| a * b).sum()
}

#[inline(always)]
pub fn l2_squared(va: &[f32], vb: &[f32]) -> f32 {
    va.iter()
        .zip(vb)
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// 原地 L2 归一化，零向量保持不变
pub fn l2_normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

/// 计算向量 xq 和一组向量 codes 的距离，返回距离最小的 k 个 (序号, 距离)，按距离升序
///
/// codes 为展平的 n * dim 数组
pub fn knn(metric: Metric, xq: &[f32], codes: &[f32], dim: usize, k: usize) -> Vec<(usize, f32)> {
    let mut dis = codes
        .chunks_exact(dim)
        .enumerate()
        .map(|(i, code)| (i, metric.distance(xq, code)))
        .collect::<Vec<_>>();
    // 距离相同时保持原有顺序
    dis.sort_by(|a, b| a.1.total_cmp(&b.1));
    dis.truncate(k);
    dis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = Metric::Cosine.prepare(&[3.0, 4.0]);
        assert!(Metric::Cosine.distance(&v, &v) < 1e-6);
        assert!((Metric::Cosine.similarity(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let va = Metric::Cosine.prepare(&[1.0, 0.0]);
        let vb = Metric::Cosine.prepare(&[0.0, 2.0]);
        assert!((Metric::Cosine.distance(&va, &vb) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(Metric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(Metric::Euclidean.similarity(0.0), 1.0);
        assert_eq!(Metric::Euclidean.prepare(&[3.0, 4.0]), vec![3.0, 4.0]);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn test_knn_multiple_vectors() {
        let xq = [0.0, 0.0];
        // 距离分别为 2, 0, 1
        let codes = [2.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let r = knn(Metric::Euclidean, &xq, &codes, 2, 3);
        assert_eq!(r.iter().map(|x| x.0).collect::<Vec<_>>(), &[1, 2, 0]);
        assert_eq!(r.iter().map(|x| x.1).collect::<Vec<_>>(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_knn_k_limit() {
        let codes = [1.0, 1.0, 1.0, 1.0];
        let r = knn(Metric::Euclidean, &[0.0, 0.0], &codes, 2, 5);
        // 只有 2 个向量，距离相同时按原顺序
        assert_eq!(r.iter().map(|x| x.0).collect::<Vec<_>>(), &[0, 1]);
    }
}
