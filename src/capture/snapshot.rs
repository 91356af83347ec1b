use std::time::Duration;

use chrono::{DateTime, Local};

use super::clone::CaptureTarget;
use crate::editor::EditorId;
use crate::raster::Bitmap;

/// 各阶段耗时。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTimings {
    pub blur_settle: Duration,
    pub clone_settle: Duration,
    pub rasterize: Duration,
    pub total: Duration,
}

/// 一次截图的结果。
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bitmap: Bitmap,
    /// 调用时刻的编辑器内容（LaTeX），导出文件名由它派生。
    pub content: String,
    pub target: CaptureTarget,
    pub editor: EditorId,
    pub captured_at: DateTime<Local>,
    pub timings: CaptureTimings,
}

impl Snapshot {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.bitmap.width(), self.bitmap.height())
    }
}
