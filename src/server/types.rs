use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::Serialize;
use utoipa::ToSchema;

use crate::index::IndexStats;

/// 写入请求参数
#[derive(TryFromMultipart)]
pub struct IndexRequest {
    pub id: String,
    pub file: Bytes,
    pub source: Option<String>,
}

/// 写入表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct IndexForm {
    /// 条目 ID，已存在时替换旧记录
    pub id: String,
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 图片来源
    pub source: Option<String>,
}

/// 写入响应
#[derive(Debug, Serialize, ToSchema)]
pub struct IndexResponse {
    pub id: String,
}

/// 搜索请求参数
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    pub file: Bytes,
    pub k: Option<usize>,
    pub threshold: Option<f32>,
}

/// 搜索表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 返回的结果数量
    pub k: Option<usize>,
    /// 最低相似度
    pub threshold: Option<f32>,
}

/// 索引统计信息
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// 特征提取模型
    pub model: String,
    pub index: IndexStats,
}
