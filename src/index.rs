use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::IndexOptions;
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::ivf::{Hit, IvfIndex, ShardStats, TrainParams};
use crate::types::ItemRecord;
use crate::utils::{read_lock, write_lock};

/// 索引统计信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IndexStats {
    /// 向量维度
    pub dim: usize,
    pub metric: Metric,
    /// 条目总数
    pub len: usize,
    /// 每个分片的统计信息
    pub shards: Vec<ShardStats>,
}

/// 分片倒排索引
///
/// 条目按 ID 的 blake3 哈希分配到各个分片，每个分片有独立的读写锁，
/// 写入只会阻塞所在的分片
pub struct ShardedIndex {
    dim: usize,
    options: IndexOptions,
    shards: Vec<RwLock<IvfIndex>>,
    /// 写入序号，用于在距离相同时按写入顺序排序
    seq: AtomicU64,
}

impl ShardedIndex {
    pub fn new(dim: usize, options: &IndexOptions) -> Self {
        let shards = (0..options.shards.max(1))
            .map(|_| RwLock::new(IvfIndex::new(dim, options.metric)))
            .collect();
        Self { dim, options: options.clone(), shards, seq: AtomicU64::new(0) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.options.metric
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 计算 ID 所在的分片
    pub fn shard_of(&self, id: &str) -> usize {
        let hash = blake3::hash(id.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(bytes) % self.shards.len() as u64) as usize
    }

    pub fn check_dim(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| read_lock(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| read_lock(s).is_empty())
    }

    pub fn contains(&self, id: &str) -> bool {
        read_lock(&self.shards[self.shard_of(id)]).contains(id)
    }

    pub fn get(&self, id: &str) -> Option<ItemRecord> {
        read_lock(&self.shards[self.shard_of(id)]).get(id)
    }

    /// 写入一个条目，ID 已存在时替换旧记录，返回是否发生了替换
    ///
    /// 分片达到训练阈值时会在持有写锁的情况下完成训练
    pub fn insert(&self, record: ItemRecord) -> Result<bool> {
        self.check_dim(&record.embedding)?;
        let shard_no = self.shard_of(&record.id);
        let mut shard = write_lock(&self.shards[shard_no]);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let replaced = shard.insert(seq, record)?;
        if shard.needs_training(self.options.train_threshold) {
            self.train_shard(shard_no, &mut shard);
        }
        Ok(replaced)
    }

    /// 批量写入，所有向量通过维度检查后才会写入。分片在全部写入完成后再检查是否需要训练
    pub fn insert_batch(&self, records: Vec<ItemRecord>) -> Result<()> {
        for record in &records {
            self.check_dim(&record.embedding)?;
        }

        let mut groups = vec![vec![]; self.shards.len()];
        for record in records {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            groups[self.shard_of(&record.id)].push((seq, record));
        }

        groups.into_par_iter().enumerate().try_for_each(|(shard_no, group)| {
            if group.is_empty() {
                return Ok(());
            }
            let mut shard = write_lock(&self.shards[shard_no]);
            for (seq, record) in group {
                shard.insert(seq, record)?;
            }
            if shard.needs_training(self.options.train_threshold) {
                self.train_shard(shard_no, &mut shard);
            }
            Ok(())
        })
    }

    /// 删除一个条目，返回其是否存在
    pub fn remove(&self, id: &str) -> bool {
        write_lock(&self.shards[self.shard_of(id)]).remove(id)
    }

    /// 使用默认的 nprobe 搜索
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.query_with(query, k, self.options.nprobe)
    }

    /// 在每个分片中搜索 nprobe 个倒排列表，合并所有分片的结果
    pub fn query_with(&self, query: &[f32], k: usize, nprobe: usize) -> Result<Vec<Hit>> {
        self.check_dim(query)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }
        let hits = self
            .shards
            .par_iter()
            .map(|shard| read_lock(shard).search(query, k, nprobe))
            .collect::<Result<Vec<_>>>()?;
        Ok(merge_hits(hits, k))
    }

    /// 精确搜索，扫描所有倒排列表
    pub fn query_exact(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.check_dim(query)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }
        let hits = self
            .shards
            .par_iter()
            .map(|shard| read_lock(shard).search_exact(query, k))
            .collect::<Result<Vec<_>>>()?;
        Ok(merge_hits(hits, k))
    }

    /// 强制训练所有分片
    pub fn train(&self) {
        self.shards.par_iter().enumerate().for_each(|(shard_no, shard)| {
            let mut shard = write_lock(shard);
            self.train_shard(shard_no, &mut shard);
        });
    }

    fn train_shard(&self, shard_no: usize, shard: &mut IvfIndex) {
        let nlist = nlist_for(shard.len());
        info!("训练分片 {}：{} 个向量，{} 个倒排列表", shard_no, shard.len(), nlist);
        shard.train(TrainParams {
            nlist,
            max_iter: self.options.kmeans_iter,
            quantizer: self.options.quantizer,
            ef_search: self.options.ef_search,
            seed: shard_no as u64,
        });
    }

    pub fn stats(&self) -> IndexStats {
        let shards = self.shards.iter().map(|s| read_lock(s).stats()).collect::<Vec<_>>();
        IndexStats {
            dim: self.dim,
            metric: self.metric(),
            len: shards.iter().map(|s| s.len).sum(),
            shards,
        }
    }

    /// 计算近似搜索相对精确搜索的召回率
    ///
    /// queries 为展平的 n * dim 数组
    pub fn recall(&self, queries: &[f32], k: usize) -> Result<f32> {
        let (mut found, mut total) = (0usize, 0usize);
        for query in queries.chunks(self.dim) {
            let exact = self.query_exact(query, k)?;
            let approx = self.query(query, k)?;
            let approx = approx.iter().map(|h| h.seq).collect::<HashSet<_>>();
            total += exact.len();
            found += exact.iter().filter(|h| approx.contains(&h.seq)).count();
        }
        debug!("召回率：{}/{}", found, total);
        if total == 0 {
            return Ok(1.0);
        }
        Ok(found as f32 / total as f32)
    }

    /// 按写入顺序导出所有条目
    pub fn records(&self) -> Vec<ItemRecord> {
        let mut records = self.shards.iter().flat_map(|s| read_lock(s).records()).collect::<Vec<_>>();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, r)| r).collect()
    }
}

/// 倒排列表数量，约为 4 * sqrt(n)
pub fn nlist_for(n: usize) -> usize {
    ((4.0 * (n as f64).sqrt()) as usize).clamp(1, n.max(1))
}

fn merge_hits(hits: Vec<Vec<Hit>>, k: usize) -> Vec<Hit> {
    let mut hits = hits.into_iter().flatten().collect::<Vec<_>>();
    hits.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
        CmpOrdering::Equal => a.seq.cmp(&b.seq),
        ord => ord,
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(shards: usize, train_threshold: usize) -> IndexOptions {
        IndexOptions {
            metric: Metric::Euclidean,
            shards,
            train_threshold,
            ..IndexOptions::default()
        }
    }

    #[test]
    fn test_nlist_for() {
        assert_eq!(nlist_for(0), 1);
        assert_eq!(nlist_for(1), 1);
        assert_eq!(nlist_for(4), 4);
        assert_eq!(nlist_for(100), 40);
        assert_eq!(nlist_for(10000), 400);
    }

    #[test]
    fn test_shard_of_stable() {
        let index = ShardedIndex::new(2, &options(8, 0));
        let a = index.shard_of("cat1");
        assert_eq!(a, index.shard_of("cat1"));
        assert!(a < 8);
    }

    #[test]
    fn test_query_merges_shards() {
        let index = ShardedIndex::new(1, &options(4, 0));
        for i in 0..20 {
            index.insert(ItemRecord::new(format!("i{i}"), vec![i as f32])).unwrap();
        }
        let hits = index.query(&[10.2], 3).unwrap();
        let ids = hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["i10", "i11", "i9"]);
    }

    #[test]
    fn test_oversized_k() {
        let index = ShardedIndex::new(2, &options(2, 0));
        index.insert(ItemRecord::new("a", vec![1.0, 0.0])).unwrap();
        index.insert(ItemRecord::new("b", vec![0.0, 1.0])).unwrap();
        for k in [1usize << 40, usize::MAX] {
            assert_eq!(index.query(&[1.0, 0.0], k).unwrap().len(), 2);
            assert_eq!(index.query_exact(&[1.0, 0.0], k).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_tie_break_by_insert_order() {
        let index = ShardedIndex::new(1, &options(4, 0));
        for id in ["c", "a", "d", "b"] {
            index.insert(ItemRecord::new(id, vec![1.0])).unwrap();
        }
        let ids = index.query(&[1.0], 4).unwrap().into_iter().map(|h| h.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "a", "d", "b"]);

        // 替换后视为新写入
        index.insert(ItemRecord::new("c", vec![1.0])).unwrap();
        let ids = index.query(&[1.0], 4).unwrap().into_iter().map(|h| h.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_auto_training() {
        let index = ShardedIndex::new(1, &options(1, 16));
        for i in 0..15 {
            index.insert(ItemRecord::new(format!("i{i}"), vec![i as f32])).unwrap();
        }
        assert!(!index.stats().shards[0].trained);
        index.insert(ItemRecord::new("i15", vec![15.0])).unwrap();
        let stats = index.stats();
        assert!(stats.shards[0].trained);
        assert_eq!(stats.shards[0].nlist, 16);
        assert_eq!(stats.len, 16);
    }

    #[test]
    fn test_insert_batch_rejects_whole_batch() {
        let index = ShardedIndex::new(2, &options(2, 0));
        let records = vec![ItemRecord::new("a", vec![0.0, 0.0]), ItemRecord::new("b", vec![0.0])];
        assert!(matches!(
            index.insert_batch(records),
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_records_in_insert_order() {
        let index = ShardedIndex::new(1, &options(3, 0));
        let records = (0..10).map(|i| ItemRecord::new(format!("i{i}"), vec![i as f32])).collect();
        index.insert_batch(records).unwrap();
        let ids = index.records().into_iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, (0..10).map(|i| format!("i{i}")).collect::<Vec<_>>());
    }
}
