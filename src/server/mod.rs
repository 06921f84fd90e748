mod api;
mod auth;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::{AppError, ErrorBody, status_of};
pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::index_handler,
        api::search_handler,
        api::delete_handler,
        api::stats_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::IndexForm,
        types::IndexResponse,
        types::SearchForm,
        types::StatsResponse,
        crate::types::SearchResult,
        crate::index::IndexStats,
        crate::ivf::ShardStats,
        crate::distance::Metric,
        error::ErrorBody,
    ))
)]
pub struct ApiDoc;

/// 上传限制：10M
pub const BODY_LIMIT: usize = 1024 * 1024 * 10;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    // 写入和删除需要鉴权
    let protected = Router::new()
        .route("/index", post(api::index_handler))
        .route("/index/{id}", delete(api::delete_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    Router::new()
        .route("/search", post(api::search_handler))
        .route("/stats", get(api::stats_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(protected)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}
