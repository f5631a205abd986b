use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use thiserror::Error;

/// MongoDB 唯一索引冲突
const DUPLICATE_KEY_CODE: i32 = 11000;
/// MongoDB 事务写冲突
const WRITE_CONFLICT_CODE: i32 = 112;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// 乐观锁版本不一致，重新读取后可重试
    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),

    #[error(transparent)]
    MongoError(#[from] mongodb::error::Error),

    #[error(transparent)]
    BsonSerialization(#[from] mongodb::bson::ser::Error),

    #[error(transparent)]
    BsonDeserialization(#[from] mongodb::bson::de::Error),

    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl AppError {
    /// 是否为可重试的临时错误（网络、事务冲突、乐观锁冲突）
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::VersionConflict(_) => true,
            AppError::MongoError(e) => {
                if e.contains_label(TRANSIENT_TRANSACTION_ERROR) || e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
                    return true;
                }
                match e.kind.as_ref() {
                    ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => true,
                    ErrorKind::Command(c) => c.code == WRITE_CONFLICT_CODE,
                    ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == WRITE_CONFLICT_CODE,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// 是否为唯一索引冲突（同一键已经写入过）
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            AppError::MongoError(e) => match e.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY_CODE,
                ErrorKind::Command(c) => c.code == DUPLICATE_KEY_CODE,
                ErrorKind::BulkWrite(b) => b
                    .write_errors
                    .as_ref()
                    .map(|errors| errors.iter().any(|w| w.code == DUPLICATE_KEY_CODE))
                    .unwrap_or(false),
                _ => false,
            },
            _ => false,
        }
    }
}
