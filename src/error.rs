use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// 搜索引擎的错误类型
///
/// 所有错误都可以在请求边界处恢复，通过 [`Error::code`] 区分类别
#[derive(Debug, Error)]
pub enum Error {
    /// 图片数据无法解码
    #[error("failed to decode image: {0}")]
    Decode(String),
    /// 向量维度与索引不一致
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// 查询时特征提取失败
    #[error("feature extraction failed: {0}")]
    Extraction(#[source] Box<Error>),
    /// 删除不存在的条目
    #[error("item not found: {0}")]
    NotFound(String),
    /// 超出时间预算
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    /// 请求参数错误
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 返回对外暴露的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Extraction(_) => "EXTRACTION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(..) => "TIMEOUT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) | Self::Migrate(_) => "STORAGE_ERROR",
            Self::Task(_) | Self::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否由调用方的输入造成
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::Decode(_) | Self::DimensionMismatch { .. } | Self::InvalidInput(_) => true,
            Self::Extraction(inner) => inner.is_input_error(),
            _ => false,
        }
    }

    /// 重试后可能成功的错误
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(..) | Self::Task(_) | Self::Io(_) | Self::Storage(_) => true,
            Self::Extraction(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// 将特征提取阶段的错误包装为 [`Error::Extraction`]，超时保持原样
    pub fn into_extraction(self) -> Self {
        match self {
            Self::Timeout(..) | Self::Extraction(_) => self,
            other => Self::Extraction(Box::new(other)),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_wraps_inner_code() {
        let err = Error::Decode("bad header".into()).into_extraction();
        assert_eq!(err.code(), "EXTRACTION_ERROR");
        assert!(err.is_input_error());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("bad header"));
    }

    #[test]
    fn test_timeout_is_not_wrapped() {
        let err = Error::Timeout("extraction", Duration::from_millis(5)).into_extraction();
        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.is_transient());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch { expected: 4, actual: 3 };
        assert_eq!(err.to_string(), "dimension mismatch: expected 4, got 3");
        assert!(err.is_input_error());
    }
}
