//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 各层有自己的错误枚举（`DomError`、`RasterError`、`CaptureError`、`ExportError`），
//! 在服务层与命令行入口统一收敛为 `AppError`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息，各层错误通过 `#[from]` 自动转换。
//! - `code()` / `stage()` 透传到底层错误，提示与日志使用同一套错误码。
//! - 实现 `Serialize` 将错误序列化为字符串，便于写入结构化提示。

use serde::Serialize;

use crate::capture::CaptureError;
use crate::dom::DomError;
use crate::export::ExportError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 截图流水线错误（失焦 / 克隆 / 光栅化）
    #[error("{0}")]
    Capture(#[from] CaptureError),

    /// 导出错误（编码 / 剪贴板 / 文件）
    #[error("{0}")]
    Export(#[from] ExportError),

    /// 文档操作失败（控件挂载等）
    #[error("文档操作失败: {0}")]
    Dom(#[from] DomError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件不可用
    #[error("设置文件不可用: {0}")]
    Settings(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Capture(e) => e.code(),
            Self::Export(e) => e.code(),
            Self::Dom(_) => "E_DOM",
            Self::Io(_) => "E_IO",
            Self::Settings(_) => "E_SETTINGS",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Capture(e) => e.stage(),
            Self::Export(e) => e.stage(),
            Self::Dom(_) => "prepare",
            Self::Io(_) | Self::Settings(_) => "settings",
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
