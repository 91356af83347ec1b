//! # 用户提示模块
//!
//! 每次导出都会产生一条对用户可见的提示：成功时给出结果，失败时点名失败原因，
//! 从不静默吞掉错误。提示经 `Notifier` 发出，命令行使用日志实现，测试使用录制实现。

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 一条用户提示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    /// 触发提示的操作（`copy_image` / `download_image` / `copy_source`）。
    pub action: &'static str,
    pub message: String,
    pub error_code: Option<&'static str>,
    pub stage: Option<&'static str>,
    /// 失败的底层原因。
    pub detail: Option<String>,
}

impl Notice {
    pub fn success(action: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            action,
            message: message.into(),
            error_code: None,
            stage: None,
            detail: None,
        }
    }

    pub fn failure(action: &'static str, message: impl Into<String>, error: &crate::error::AppError) -> Self {
        Self {
            level: NoticeLevel::Error,
            action,
            message: message.into(),
            error_code: Some(error.code()),
            stage: Some(error.stage()),
            detail: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// 写日志的提示通道。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => log::info!("🔔 {}", notice.message),
            NoticeLevel::Error => log::error!(
                "🔔 {}（code={} stage={} detail={}）",
                notice.message,
                notice.error_code.unwrap_or("-"),
                notice.stage.unwrap_or("-"),
                notice.detail.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// 记录全部提示，供测试断言。
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().ok().and_then(|n| n.last().cloned())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}
