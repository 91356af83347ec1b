//! # 配置模块
//!
//! ## 设计思路
//!
//! 将截图链路中所有“可调策略”集中到 `CaptureConfig`：缩放倍率、两段等待时长、
//! 等待策略、光栅化超时、并发策略与内容节点选择器。
//! 两段等待没有真正的完成信号，时长是经验值，在慢设备上是已知的不稳定来源，
//! 因此必须可配置。
//!
//! ## 实现思路
//!
//! - `Default` 给出参考行为：300 DPI（相对 96 DPI 基线）、失焦后等 250ms、克隆后等 100ms。
//! - `SettleProfile`（fast / balanced / patient）是高层语义，映射到等待时长组合。
//! - `infer_settle_profile` 从当前参数反推档位，便于展示。
//! - 支持 serde 序列化，可从 JSON 设置文件加载。

use serde::{Deserialize, Serialize};

use super::CaptureError;

/// 目标输出分辨率。
pub const TARGET_DPI: f32 = 300.0;
/// CSS 像素基线分辨率。
pub const BASELINE_DPI: f32 = 96.0;

/// 等待渲染落定的策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleStrategy {
    /// 固定等待整个预算。
    Fixed,
    /// 轮询探针，探针不可用时退回固定等待。
    #[default]
    Poll,
}

/// 同一编辑器上重叠截图请求的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// 排队等待上一次截图完成。
    #[default]
    Queue,
    /// 直接拒绝，返回 `CaptureError::Busy`。
    Reject,
    /// 不加保护，各自独立执行。
    Allow,
}

/// 截图配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 相对 CSS 像素的缩放倍率。
    pub dpi_scale: f32,
    /// 失焦后等待控件刷新的预算（毫秒）。
    pub post_blur_settle_ms: u64,
    /// 克隆赋值后等待克隆渲染的预算（毫秒）。
    pub clone_settle_ms: u64,
    pub settle_strategy: SettleStrategy,
    /// 轮询间隔（毫秒）。
    pub settle_poll_interval_ms: u64,
    /// 光栅化超时（毫秒）。
    pub raster_timeout_ms: u64,
    pub overlap_policy: OverlapPolicy,
    /// 封装子树内的内容节点选择器。
    pub inner_content_selector: String,
    /// 离屏容器的 left/top 偏移（CSS 像素）。
    pub offscreen_offset_px: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dpi_scale: TARGET_DPI / BASELINE_DPI,
            post_blur_settle_ms: 250,
            clone_settle_ms: 100,
            settle_strategy: SettleStrategy::Poll,
            settle_poll_interval_ms: 10,
            raster_timeout_ms: 10_000,
            overlap_policy: OverlapPolicy::Queue,
            inner_content_selector: ".ML__content".to_string(),
            offscreen_offset_px: -9999,
        }
    }
}

/// 等待档位。
///
/// - `Fast`：快速设备，等待最短
/// - `Balanced`：参考时长
/// - `Patient`：慢设备，宁可多等
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleProfile {
    Fast,
    Balanced,
    Patient,
}

impl SettleProfile {
    pub fn from_str(profile: &str) -> Result<Self, CaptureError> {
        match profile.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "patient" => Ok(Self::Patient),
            other => Err(CaptureError::InvalidConfig(format!(
                "未知等待档位：{}（可选：fast / balanced / patient）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Patient => "patient",
        }
    }

    fn delays(self) -> (u64, u64) {
        match self {
            Self::Fast => (120, 50),
            Self::Balanced => (250, 100),
            Self::Patient => (600, 250),
        }
    }
}

fn is_supported_selector(selector: &str) -> bool {
    let ident = selector.strip_prefix('.').unwrap_or(selector);
    !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl CaptureConfig {
    /// 校验参数合法性。
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.dpi_scale.is_finite() || self.dpi_scale <= 0.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "dpi_scale 必须是正数：{}",
                self.dpi_scale
            )));
        }
        if self.dpi_scale > 16.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "dpi_scale 不能大于 16：{}",
                self.dpi_scale
            )));
        }
        if self.raster_timeout_ms == 0 {
            return Err(CaptureError::InvalidConfig("raster_timeout_ms 不能为 0".to_string()));
        }
        if self.settle_poll_interval_ms == 0 {
            return Err(CaptureError::InvalidConfig(
                "settle_poll_interval_ms 不能为 0".to_string(),
            ));
        }
        if self.post_blur_settle_ms > 30_000 || self.clone_settle_ms > 30_000 {
            return Err(CaptureError::InvalidConfig(
                "等待预算不能超过 30000 毫秒".to_string(),
            ));
        }
        if !is_supported_selector(&self.inner_content_selector) {
            return Err(CaptureError::InvalidConfig(format!(
                "inner_content_selector 仅支持 .class 或标签名：{}",
                self.inner_content_selector
            )));
        }
        Ok(())
    }

    /// 从 JSON 文本解析并校验；缺省字段取默认值。
    pub fn from_json_str(text: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| CaptureError::InvalidConfig(format!("解析配置失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从当前等待时长反推档位。
    pub fn infer_settle_profile(&self) -> SettleProfile {
        if self.post_blur_settle_ms >= 600 || self.clone_settle_ms >= 250 {
            return SettleProfile::Patient;
        }
        if self.post_blur_settle_ms <= 120 && self.clone_settle_ms <= 50 {
            return SettleProfile::Fast;
        }
        SettleProfile::Balanced
    }

    pub fn apply_settle_profile(&mut self, profile: SettleProfile) {
        let (post_blur, clone) = profile.delays();
        self.post_blur_settle_ms = post_blur;
        self.clone_settle_ms = clone;
    }
}
