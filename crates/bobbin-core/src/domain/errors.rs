//! Errors - エラー型と分類
//!
//! - `DedupError`: 重複排除レイヤー自身のエラー（store 障害、ロック待ちタイムアウトなど）
//! - `JobError`: ワーカー本体が返すエラー（リトライ可否の分類付き）

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（Redis などの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("idempotency store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to obtain lock {key} within {waited:?}")]
    LockTimeout { key: String, waited: Duration },

    #[error("unknown deduplication strategy: {0}")]
    UnknownStrategy(String),

    #[error("worker not registered: {0}")]
    WorkerNotFound(String),

    #[error("malformed payload or cookie: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(String),
}

impl DedupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DedupError::StoreUnavailable(_) => ErrorKind::Infrastructure,
            DedupError::LockTimeout { .. } | DedupError::Queue(_) => ErrorKind::Transient,
            DedupError::UnknownStrategy(_)
            | DedupError::WorkerNotFound(_)
            | DedupError::Codec(_) => ErrorKind::Permanent,
        }
    }
}

impl From<redis::RedisError> for DedupError {
    fn from(err: redis::RedisError) -> Self {
        DedupError::StoreUnavailable(err.to_string())
    }
}

/// JobError はワーカー本体のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    kind: ErrorKind,
    message: String,
}

impl JobError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != ErrorKind::Permanent
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobError (kind: {:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for JobError {}

impl From<DedupError> for JobError {
    fn from(err: DedupError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_transient() {
        let err = DedupError::LockTimeout {
            key: "k".into(),
            waited: Duration::from_millis(10),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);

        let job_err = JobError::from(err);
        assert!(job_err.is_retryable());
        assert!(job_err.message().contains("failed to obtain lock k"));
    }

    #[test]
    fn permanent_job_errors_are_not_retryable() {
        assert!(!JobError::permanent("gone").is_retryable());
        assert!(JobError::transient("flaky").is_retryable());
    }
}
