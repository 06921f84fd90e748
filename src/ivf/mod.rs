pub mod invlists;
pub mod quantizer;
mod utils;

use std::collections::HashMap;

pub use invlists::*;
use log::debug;
pub use quantizer::*;
use serde::Serialize;
use utoipa::ToSchema;
pub use utils::*;

use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::kmeans::kmeans;
use crate::types::ItemRecord;

/// 索引中的元数据
#[derive(Debug, Clone)]
struct Slot {
    id: String,
    source: Option<String>,
    created_at: i64,
    list_no: usize,
}

/// 单个搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub seq: u64,
    pub distance: f32,
}

/// 训练参数
#[derive(Debug, Clone, Copy)]
pub struct TrainParams {
    /// 聚类中心数量
    pub nlist: usize,
    /// K-means 最大迭代次数
    pub max_iter: usize,
    pub quantizer: QuantizerKind,
    /// HNSW 量化器搜索时访问的节点数量
    pub ef_search: usize,
    pub seed: u64,
}

/// 倒排索引统计信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShardStats {
    /// 向量数量
    pub len: usize,
    /// 倒排列表数量
    pub nlist: usize,
    /// 是否已训练
    pub trained: bool,
    /// 倒排列表不平衡度，未训练时为 1
    pub imbalance: f32,
}

/// 倒排文件索引
///
/// 未训练时所有向量位于同一个倒排列表中，搜索结果精确；
/// 训练后向量按最近的聚类中心划分，搜索时只扫描 nprobe 个列表
pub struct IvfIndex {
    dim: usize,
    metric: Metric,
    quantizer: Option<Box<dyn Quantizer>>,
    invlists: ArrayInvertedLists,
    /// 条目 ID 到序号的映射
    keys: HashMap<String, u64>,
    /// 序号到元数据的映射
    slots: HashMap<u64, Slot>,
    /// 上次训练时的向量数量
    trained_len: usize,
}

impl IvfIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            quantizer: None,
            invlists: ArrayInvertedLists::new(1, dim),
            keys: HashMap::new(),
            slots: HashMap::new(),
            trained_len: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn nlist(&self) -> usize {
        self.invlists.nlist()
    }

    pub fn is_trained(&self) -> bool {
        self.quantizer.is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    /// 检查向量维度
    pub fn check_dim(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        Ok(())
    }

    /// 添加一个条目，seq 必须单调递增。如果 ID 已存在则替换旧记录，返回是否发生了替换
    pub fn insert(&mut self, seq: u64, record: ItemRecord) -> Result<bool> {
        self.check_dim(&record.embedding)?;
        let code = self.metric.prepare(&record.embedding);

        let replaced = self.remove(&record.id);

        let list_no = match &self.quantizer {
            Some(q) => q.assign(&code),
            None => 0,
        };
        self.invlists.add_entry(list_no, seq, &code);
        self.keys.insert(record.id.clone(), seq);
        self.slots.insert(
            seq,
            Slot { id: record.id, source: record.source, created_at: record.created_at, list_no },
        );
        Ok(replaced)
    }

    /// 删除一个条目，返回其是否存在
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(seq) = self.keys.remove(id) else {
            return false;
        };
        if let Some(slot) = self.slots.remove(&seq) {
            self.invlists.remove_entry(slot.list_no, seq);
        }
        true
    }

    /// 获取一个条目，返回的向量为索引内部的存储形式
    pub fn get(&self, id: &str) -> Option<ItemRecord> {
        let seq = self.keys.get(id)?;
        let slot = self.slots.get(seq)?;
        let code = self.invlists.get_code(slot.list_no, *seq)?;
        Some(ItemRecord {
            id: slot.id.clone(),
            embedding: code.to_vec(),
            source: slot.source.clone(),
            created_at: slot.created_at,
        })
    }

    /// 搜索最近的 k 个条目，扫描 nprobe 个倒排列表
    pub fn search(&self, query: &[f32], k: usize, nprobe: usize) -> Result<Vec<Hit>> {
        self.check_dim(query)?;
        let query = self.metric.prepare(query);
        let lists = match &self.quantizer {
            Some(q) => q.search(&query, nprobe.max(1).min(q.nlist())),
            None => vec![0],
        };
        Ok(self.scan(&query, k, &lists))
    }

    /// 扫描所有倒排列表，结果精确
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.check_dim(query)?;
        let query = self.metric.prepare(query);
        let lists = (0..self.nlist()).collect::<Vec<_>>();
        Ok(self.scan(&query, k, &lists))
    }

    fn scan(&self, query: &[f32], k: usize, lists: &[usize]) -> Vec<Hit> {
        let candidates = lists.iter().map(|&list_no| self.invlists.list_len(list_no)).sum::<usize>();
        let mut topk = TopKNeighbors::new(k.min(candidates));
        for &list_no in lists {
            let (ids, codes) = self.invlists.get_list(list_no);
            for (&seq, code) in ids.iter().zip(codes.chunks_exact(self.dim)) {
                topk.push(Neighbor { seq, distance: self.metric.distance(query, code) });
            }
        }
        topk.into_sorted_vec()
            .into_iter()
            .filter_map(|n| {
                let slot = self.slots.get(&n.seq)?;
                Some(Hit { id: slot.id.clone(), seq: n.seq, distance: n.distance })
            })
            .collect()
    }

    /// 是否需要（重新）训练
    ///
    /// 未训练的索引在达到 threshold 时训练，已训练的索引在规模增长到上次训练的 4 倍时重新训练。
    /// threshold 为 0 时不自动训练
    pub fn needs_training(&self, threshold: usize) -> bool {
        if threshold == 0 {
            return false;
        }
        match self.is_trained() {
            false => self.len() >= threshold,
            true => self.len() >= self.trained_len.saturating_mul(4),
        }
    }

    /// 使用当前所有向量训练聚类中心，并重新划分倒排列表
    pub fn train(&mut self, params: TrainParams) {
        let n = self.len();
        let nlist = params.nlist.min(n);
        if nlist < 2 {
            return;
        }

        let (ids, codes) = self.invlists.take_all();
        let ks = kmeans(&codes, self.dim, nlist, params.max_iter, self.metric, params.seed);
        debug!("训练完成：{} 个向量，{} 个聚类中心，距离和 {:.4}", n, nlist, ks.distsum);

        let quantizer = params.quantizer.build(ks.centroids, self.dim, self.metric, params.ef_search);
        let mut invlists = ArrayInvertedLists::new(quantizer.nlist(), self.dim);
        for (&seq, code) in ids.iter().zip(codes.chunks_exact(self.dim)) {
            let list_no = quantizer.assign(code);
            invlists.add_entry(list_no, seq, code);
            if let Some(slot) = self.slots.get_mut(&seq) {
                slot.list_no = list_no;
            }
        }

        self.invlists = invlists;
        self.quantizer = Some(quantizer);
        self.trained_len = n;
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            len: self.len(),
            nlist: self.nlist(),
            trained: self.is_trained(),
            imbalance: if self.is_empty() { 1.0 } else { self.invlists.imbalance() },
        }
    }

    /// 按写入顺序导出所有条目
    pub fn records(&self) -> Vec<(u64, ItemRecord)> {
        let mut seqs = self.slots.keys().copied().collect::<Vec<_>>();
        seqs.sort_unstable();
        seqs.into_iter()
            .filter_map(|seq| {
                let slot = self.slots.get(&seq)?;
                self.get(&slot.id).map(|r| (seq, r))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> ItemRecord {
        ItemRecord::new(id, embedding)
    }

    fn params(nlist: usize) -> TrainParams {
        TrainParams { nlist, max_iter: 20, quantizer: QuantizerKind::Flat, ef_search: 16, seed: 0 }
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = IvfIndex::new(2, Metric::Euclidean);
        index.insert(0, record("a", vec![0.0, 0.0])).unwrap();
        index.insert(1, record("b", vec![1.0, 0.0])).unwrap();
        let hits = index.search(&[0.9, 0.0], 1, 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        assert!((hits[0].distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_replace_keeps_size() {
        let mut index = IvfIndex::new(2, Metric::Euclidean);
        assert!(!index.insert(0, record("a", vec![0.0, 0.0])).unwrap());
        assert!(index.insert(1, record("a", vec![5.0, 5.0])).unwrap());
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").unwrap().embedding, vec![5.0, 5.0]);
        assert_eq!(index.search_exact(&[0.0, 0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let mut index = IvfIndex::new(2, Metric::Euclidean);
        index.insert(0, record("a", vec![0.0, 0.0])).unwrap();
        let err = index.insert(1, record("a", vec![1.0, 2.0, 3.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.get("a").unwrap().embedding, vec![0.0, 0.0]);
    }

    #[test]
    fn test_remove_after_training() {
        let mut index = IvfIndex::new(1, Metric::Euclidean);
        for i in 0..20 {
            index.insert(i, record(&i.to_string(), vec![i as f32])).unwrap();
        }
        index.train(params(4));
        assert!(index.is_trained());
        assert_eq!(index.nlist(), 4);
        assert_eq!(index.len(), 20);

        assert!(index.remove("7"));
        assert!(!index.remove("7"));
        assert_eq!(index.invlists.len(), 19);
        let hits = index.search_exact(&[7.0], 20).unwrap();
        assert_eq!(hits.len(), 19);
        assert!(hits.iter().all(|h| h.id != "7"));
    }

    #[test]
    fn test_search_trained_finds_self() {
        let mut index = IvfIndex::new(2, Metric::Euclidean);
        for i in 0..100u64 {
            let x = (i % 10) as f32 * 10.0;
            let y = (i / 10) as f32 * 10.0;
            index.insert(i, record(&format!("p{i}"), vec![x, y])).unwrap();
        }
        index.train(params(10));
        for i in [0u64, 37, 99] {
            let r = index.get(&format!("p{i}")).unwrap();
            let hits = index.search(&r.embedding, 1, 2).unwrap();
            assert_eq!(hits[0].id, format!("p{i}"));
            assert_eq!(hits[0].distance, 0.0);
        }
    }

    #[test]
    fn test_needs_training() {
        let mut index = IvfIndex::new(1, Metric::Euclidean);
        assert!(!index.needs_training(0));
        for i in 0..8 {
            index.insert(i, record(&i.to_string(), vec![i as f32])).unwrap();
        }
        assert!(index.needs_training(8));
        index.train(params(2));
        assert!(!index.needs_training(8));
        for i in 8..32 {
            index.insert(i, record(&i.to_string(), vec![i as f32])).unwrap();
        }
        assert!(index.needs_training(8));
    }

    #[test]
    fn test_records_in_insert_order() {
        let mut index = IvfIndex::new(1, Metric::Euclidean);
        index.insert(3, record("x", vec![1.0])).unwrap();
        index.insert(5, record("y", vec![2.0])).unwrap();
        index.insert(8, record("x", vec![3.0])).unwrap();
        let ids = index.records().into_iter().map(|(_, r)| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["y", "x"]);
    }
}
