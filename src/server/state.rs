use std::sync::Arc;

use crate::service::SearchService;

/// 应用状态
pub struct AppState {
    /// 搜索服务
    pub service: Arc<SearchService>,
    /// 鉴权 token，为空时不鉴权
    pub token: Option<String>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(service: Arc<SearchService>, token: Option<String>) -> Arc<Self> {
        Arc::new(AppState { service, token: token.filter(|t| !t.is_empty()) })
    }
}
