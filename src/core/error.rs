//! 统一错误处理模块
//!
//! 提供特效系统范围内的统一错误类型定义。
//!
//! ## 错误类型分层
//!
//! - **资源层错误** (`FxError`): 设备端资源生命周期和分配错误
//! - **配置层错误** (`config::ConfigError`): 配置解析和验证错误
//!
//! 设备上下文中的操作失败不会向帧驱动方传播：失败只会使所属的发射器
//! 进入惰性状态（停止模拟但保持可安全释放），其余资源集不受影响。

use thiserror::Error;

/// 特效系统核心错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FxError {
    /// Tile 分配失败（超出预分配上限）
    #[error("Tile allocation failed: requested {requested}, available {available}")]
    TileAllocationFailed { requested: u32, available: u32 },

    /// 非法的资源生命周期转换
    #[error("Invalid resource lifecycle transition: {op} on {state} resource")]
    InvalidLifecycle {
        op: &'static str,
        state: &'static str,
    },

    /// 未知的资源 ID
    #[error("Unknown GPU sprite resource: {0}")]
    UnknownResource(u64),

    /// 设备命令队列已断开
    #[error("Device command queue disconnected")]
    QueueDisconnected,
}

pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FxError::TileAllocationFailed {
            requested: 128,
            available: 100,
        };
        assert_eq!(
            err.to_string(),
            "Tile allocation failed: requested 128, available 100"
        );
    }

    #[test]
    fn test_lifecycle_error_display() {
        let err = FxError::InvalidLifecycle {
            op: "update",
            state: "released",
        };
        assert!(err.to_string().contains("update"));
        assert!(err.to_string().contains("released"));
    }
}
