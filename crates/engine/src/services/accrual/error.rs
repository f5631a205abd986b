use serde::Serialize;
use thiserror::Error;
use utils::AppError;

/// 单个仓位计息失败的分类
#[derive(Error, Debug)]
pub enum AccrualError {
    /// 仓位引用了不存在的账户等数据问题，不重试
    #[error("数据完整性错误: {0}")]
    DataIntegrity(String),

    /// 存储层错误（临时错误已在重试后仍失败）
    #[error("存储错误: {0}")]
    Storage(#[from] AppError),

    /// 计算结果为负等不应出现的状态，立即中止该单元
    #[error("不变量被破坏: {0}")]
    InvariantViolation(String),

    /// 计息已提交，但层级收益未全部发放；由本轮或下一轮收尾时的补发流程完成
    #[error("层级收益发放未完成: {0}")]
    PayoutIncomplete(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    DataIntegrity,
    Storage,
    InvariantViolation,
    PayoutIncomplete,
    /// 工作任务异常退出
    Aborted,
}

impl AccrualError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AccrualError::DataIntegrity(_) => FailureKind::DataIntegrity,
            AccrualError::Storage(_) => FailureKind::Storage,
            AccrualError::InvariantViolation(_) => FailureKind::InvariantViolation,
            AccrualError::PayoutIncomplete(_) => FailureKind::PayoutIncomplete,
        }
    }
}
