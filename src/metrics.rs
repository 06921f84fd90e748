use std::sync::LazyLock;

use prometheus::*;

static METRIC_SEARCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("vs_search_count", "count of search requests", &["status"])
        .expect("failed to register vs_search_count")
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("vs_search_duration", "duration of the per-image search in seconds")
        .expect("failed to register vs_search_duration")
});

static METRIC_SEARCH_MAX_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "vs_search_max_score",
        "best similarity score of the per-image search",
        (1..=20).map(|x| x as f64 * 0.05).collect()
    )
    .expect("failed to register vs_search_max_score")
});

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("vs_ingest_count", "count of ingested images", &["outcome"])
        .expect("failed to register vs_ingest_count")
});

static METRIC_INGEST_RETRY: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("vs_ingest_retry", "count of extraction retries")
        .expect("failed to register vs_ingest_retry")
});

static METRIC_INDEX_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("vs_index_size", "number of vectors in the index")
        .expect("failed to register vs_index_size")
});

/// 记录一次搜索，status 为错误码或 "OK"
pub fn inc_search_count(status: &str) {
    METRIC_SEARCH_COUNT.with_label_values(&[status]).inc();
}

pub fn observe_search_duration(duration: f32) {
    METRIC_SEARCH_DURATION.observe(duration as f64);
}

pub fn observe_search_max_score(score: f32) {
    METRIC_SEARCH_MAX_SCORE.observe(score as f64);
}

/// outcome 为 indexed、failed 或 cancelled
pub fn inc_ingest_count(outcome: &str) {
    METRIC_INGEST_COUNT.with_label_values(&[outcome]).inc();
}

pub fn inc_ingest_retry() {
    METRIC_INGEST_RETRY.inc();
}

pub fn set_index_size(size: usize) {
    METRIC_INDEX_SIZE.set(size as i64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather()).unwrap_or_else(|e| format!("# {e}\n"))
}
