use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use ndarray::Array2;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::config::{ConfDir, ExtractorOptions, IndexOptions, SearchOptions};
use crate::db::{Database, crud, init_db};
use crate::error::{Error, Result};
use crate::extractor::{FeatureExtractor, ImageExtractor};
use crate::index::{IndexStats, ShardedIndex};
use crate::metrics;
use crate::types::{ItemRecord, SearchResult};

/// 打开 [`SearchService`]
pub struct SearchServiceBuilder {
    conf_dir: ConfDir,
    extractor_opts: ExtractorOptions,
    index_opts: IndexOptions,
    search_opts: SearchOptions,
    extractor: Option<Arc<dyn FeatureExtractor>>,
}

impl SearchServiceBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self {
            conf_dir,
            extractor_opts: ExtractorOptions::default(),
            index_opts: IndexOptions::default(),
            search_opts: SearchOptions::default(),
            extractor: None,
        }
    }

    pub fn extractor_options(mut self, opts: ExtractorOptions) -> Self {
        self.extractor_opts = opts;
        self
    }

    pub fn index_options(mut self, opts: IndexOptions) -> Self {
        self.index_opts = opts;
        self
    }

    pub fn search_options(mut self, opts: SearchOptions) -> Self {
        self.search_opts = opts;
        self
    }

    /// 使用自定义的特征提取器，此时忽略 [`ExtractorOptions`]
    pub fn extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// 打开数据库，并用其中的所有条目重建索引
    pub async fn open(self) -> Result<SearchService> {
        tokio::fs::create_dir_all(self.conf_dir.path()).await?;

        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(ImageExtractor::new(self.extractor_opts)?),
        };
        let dim = extractor.dim();
        if dim == 0 {
            return Err(Error::InvalidInput(format!(
                "extractor {} produces empty vectors",
                extractor.model()
            )));
        }

        let db = init_db(self.conf_dir.database()).await?;
        for stored in crud::stored_dims(&db).await? {
            if stored as usize != dim {
                return Err(Error::DimensionMismatch { expected: stored as usize, actual: dim });
            }
        }

        let index = Arc::new(ShardedIndex::new(dim, &self.index_opts));
        let records = crud::all_items(&db)
            .await?
            .into_iter()
            .map(ItemRecord::from)
            .collect::<Vec<_>>();
        let count = records.len();
        spawn_blocking({
            let index = index.clone();
            move || index.insert_batch(records)
        })
        .await??;
        info!("载入 {} 个条目，模型 {}，维度 {}", count, extractor.model(), dim);
        metrics::set_index_size(count);

        let commit_locks = (0..index.shard_count()).map(|_| Mutex::new(())).collect();

        Ok(SearchService { db, index, extractor, search: self.search_opts, commit_locks })
    }
}

/// 图片搜索服务
pub struct SearchService {
    db: Database,
    index: Arc<ShardedIndex>,
    extractor: Arc<dyn FeatureExtractor>,
    search: SearchOptions,
    /// 每个分片一把锁，保证同一分片的数据库和索引按相同顺序写入
    commit_locks: Vec<Mutex<()>>,
}

impl SearchService {
    pub fn index(&self) -> &ShardedIndex {
        &self.index
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn search_options(&self) -> &SearchOptions {
        &self.search
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// 在阻塞线程中提取特征，超出时间预算返回 [`Error::Timeout`]
    ///
    /// 超时后提取线程不会被中断，但其结果会被丢弃
    pub async fn extract(&self, data: Arc<[u8]>) -> Result<Vec<f32>> {
        let extractor = self.extractor.clone();
        let budget = self.search.extract_timeout();
        let task = spawn_blocking(move || extractor.extract(&data));
        match timeout(budget, task).await {
            Ok(r) => r?,
            Err(_) => Err(Error::Timeout("extraction", budget)),
        }
    }

    /// 写入数据库后再写入索引，返回是否替换了旧记录
    ///
    /// 数据库写入失败时不会修改索引
    pub async fn commit(&self, record: ItemRecord) -> Result<bool> {
        self.index.check_dim(&record.embedding)?;
        let _guard = self.commit_locks[self.index.shard_of(&record.id)].lock().await;

        crud::upsert_item(&self.db, &record).await?;
        let index = self.index.clone();
        let replaced = spawn_blocking(move || index.insert(record)).await??;
        metrics::set_index_size(self.index.len());
        Ok(replaced)
    }

    /// 提取图片特征并写入
    pub async fn index_image(
        &self,
        id: &str,
        data: Arc<[u8]>,
        source: Option<String>,
    ) -> Result<bool> {
        if id.is_empty() {
            return Err(Error::InvalidInput("id must not be empty".into()));
        }
        let embedding = self.extract(data).await?;
        self.commit(ItemRecord::new(id, embedding).with_source(source)).await
    }

    /// 删除条目，不存在时返回 [`Error::NotFound`]
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.commit_locks[self.index.shard_of(id)].lock().await;
        let stored = crud::delete_item(&self.db, id).await?;
        let indexed = self.index.remove(id);
        metrics::set_index_size(self.index.len());
        match stored || indexed {
            true => Ok(()),
            false => Err(Error::NotFound(id.to_owned())),
        }
    }

    /// 搜索与图片相似的条目
    ///
    /// 特征提取阶段的错误会被包装为 [`Error::Extraction`]
    pub async fn search(
        &self,
        data: Arc<[u8]>,
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let result = match self.extract(data).await.map_err(Error::into_extraction) {
            Ok(embedding) => self.search_embedding(embedding, k, threshold).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(result) => {
                metrics::inc_search_count("OK");
                metrics::observe_search_duration(start.elapsed().as_secs_f32());
                if let Some(best) = result.first() {
                    metrics::observe_search_max_score(best.score);
                }
            }
            Err(e) => metrics::inc_search_count(e.code()),
        }
        result
    }

    /// 使用已有的向量搜索，结果按距离升序，相似度低于 threshold 的结果会被过滤
    pub async fn search_embedding(
        &self,
        embedding: Vec<f32>,
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        self.index.check_dim(&embedding)?;
        if k == 0 || self.index.is_empty() {
            return Ok(vec![]);
        }

        let index = self.index.clone();
        let budget = self.search.query_timeout();
        let task = spawn_blocking(move || index.query(&embedding, k));
        let hits = match timeout(budget, task).await {
            Ok(r) => r??,
            Err(_) => return Err(Error::Timeout("query", budget)),
        };

        let metric = self.index.metric();
        let result = hits
            .into_iter()
            .map(|hit| SearchResult {
                score: metric.similarity(hit.distance),
                distance: hit.distance,
                id: hit.id,
            })
            .filter(|r| threshold.is_none_or(|t| r.score >= t))
            .collect::<Vec<_>>();
        debug!("搜索完成：{} 个结果", result.len());
        Ok(result)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub async fn get(&self, id: &str) -> Result<Option<ItemRecord>> {
        Ok(crud::get_item(&self.db, id).await?.map(ItemRecord::from))
    }

    /// 按写入顺序导出所有条目的 ID 和原始向量
    pub async fn export(&self) -> Result<(Vec<String>, Array2<f32>)> {
        let rows = crud::all_items(&self.db).await?;
        let mut ids = Vec::with_capacity(rows.len());
        let mut data = Vec::with_capacity(rows.len() * self.dim());
        for row in rows {
            data.extend(row.embedding());
            ids.push(row.id);
        }
        let arr = Array2::from_shape_vec((ids.len(), self.dim()), data)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok((ids, arr))
    }
}
