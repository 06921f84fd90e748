use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum_typed_multipart::TypedMultipart;
use log::info;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::error::Error;
use crate::metrics;
use crate::types::SearchResult;

/// 添加一张图片，ID 已存在时替换旧记录
#[utoipa::path(
    post,
    path = "/index",
    request_body(content = IndexForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, body = IndexResponse),
        (status = 401, body = super::error::ErrorBody),
        (status = 422, body = super::error::ErrorBody),
    )
)]
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<IndexRequest>,
) -> Result<(StatusCode, Json<IndexResponse>)> {
    info!("正在添加图片: {}", data.id);
    state.service.index_image(&data.id, Arc::from(data.file.as_ref()), data.source).await?;
    Ok((StatusCode::CREATED, Json(IndexResponse { id: data.id })))
}

/// 搜索一张图片
#[utoipa::path(
    post,
    path = "/search",
    request_body(content = SearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = Vec<SearchResult>),
        (status = 422, body = super::error::ErrorBody),
        (status = 504, body = super::error::ErrorBody),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<SearchRequest>,
) -> Result<Json<Vec<SearchResult>>> {
    let opts = state.service.search_options();
    let k = data.k.unwrap_or(opts.top_k);
    let threshold = data.threshold.or(opts.threshold);

    info!("正在搜索上传图片");
    let result = state.service.search(Arc::from(data.file.as_ref()), k, threshold).await?;
    Ok(Json(result))
}

/// 删除一张图片，图片不存在时同样返回 204
#[utoipa::path(
    delete,
    path = "/index/{id}",
    params(("id" = String, Path, description = "条目 ID")),
    responses(
        (status = 204),
        (status = 401, body = super::error::ErrorBody),
    )
)]
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    match state.service.remove(&id).await {
        Ok(()) => info!("已删除: {}", id),
        Err(Error::NotFound(_)) => info!("删除不存在的条目: {}", id),
        Err(e) => return Err(e.into()),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// 获取索引统计信息
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, body = StatsResponse),
    )
)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        model: state.service.extractor().model().to_owned(),
        index: state.service.stats(),
    })
}

/// 导出 prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, content_type = "text/plain", body = String),
    )
)]
pub async fn metrics_handler() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], metrics::gather_text())
}
