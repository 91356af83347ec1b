//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 截图链路内的所有失败都在编排器边界被收敛为 `CaptureError`，不会以未处理的异常形式外泄。
//! 每个分支都带稳定的 `code()` 与所在阶段 `stage()`，便于日志检索与用户提示。

use crate::dom::DomError;
use crate::editor::EditorId;
use crate::raster::RasterError;

/// 截图统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 调用时没有挂载的编辑器；调用方应直接忽略。
    #[error("没有可截图的编辑器")]
    NoWidget,

    /// 等待或光栅化超过预算。
    #[error("渲染超时：{stage} 阶段超过 {budget_ms}ms")]
    RenderTimeout { stage: &'static str, budget_ms: u64 },

    /// 底层光栅化器失败，保留原始原因。
    #[error("光栅化失败：{0}")]
    Rasterization(#[source] RasterError),

    /// 同一编辑器已有截图在进行中（`OverlapPolicy::Reject`）。
    #[error("{0} 已有截图在进行中")]
    Busy(EditorId),

    #[error("文档操作失败：{0}")]
    Dom(#[from] DomError),

    #[error("配置错误：{0}")]
    InvalidConfig(String),

    #[error("内部状态异常：{0}")]
    Internal(String),
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWidget => "E_NO_WIDGET",
            Self::RenderTimeout { .. } => "E_RENDER_TIMEOUT",
            Self::Rasterization(_) => "E_RASTERIZE",
            Self::Busy(_) => "E_BUSY",
            Self::Dom(_) => "E_DOM",
            Self::InvalidConfig(_) => "E_CONFIG",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoWidget | Self::Busy(_) => "prepare",
            Self::RenderTimeout { stage, .. } => *stage,
            Self::Rasterization(_) => "rasterize",
            Self::Dom(_) => "clone",
            Self::InvalidConfig(_) | Self::Internal(_) => "config",
        }
    }

    /// 重试是否可能成功。`NoWidget` 与配置错误不可重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RenderTimeout { .. } | Self::Busy(_) | Self::Rasterization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_stages_are_stable() {
        let timeout = CaptureError::RenderTimeout {
            stage: "rasterize",
            budget_ms: 50,
        };
        assert_eq!(timeout.code(), "E_RENDER_TIMEOUT");
        assert_eq!(timeout.stage(), "rasterize");
        assert!(timeout.is_retryable());

        assert_eq!(CaptureError::NoWidget.code(), "E_NO_WIDGET");
        assert!(!CaptureError::NoWidget.is_retryable());
    }

    #[test]
    fn rasterization_keeps_cause() {
        use std::error::Error as _;

        let err = CaptureError::Rasterization(RasterError::Paint("boom".to_string()));
        let source = err.source().expect("cause should be attached");
        assert!(source.to_string().contains("boom"));
    }
}
