use serde::Serialize;
use utoipa::ToSchema;

use crate::utils::unix_now;

/// 索引中的一个条目
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    /// 条目 ID，由调用方指定
    pub id: String,
    pub embedding: Vec<f32>,
    /// 图片来源，例如文件路径或 URL
    pub source: Option<String>,
    /// 写入时间，unix 时间戳（秒）
    pub created_at: i64,
}

impl ItemRecord {
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { id: id.into(), embedding, source: None, created_at: unix_now() }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }
}

/// 搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchResult {
    /// 条目 ID
    pub id: String,
    /// 相似度，越大越相似
    pub score: f32,
    /// 与查询向量的距离
    pub distance: f32,
}
