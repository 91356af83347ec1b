//! # 光栅化模块（raster）
//!
//! ## 设计思路
//!
//! 截图流水线只依赖 [`Rasterizer`] 这一接口：给定文档中的一个节点、背景与缩放倍率，
//! 异步返回完整的位图（不存在流式或部分结果）。
//!
//! - `layout`：测量目标节点的固有尺寸（inline 流式排版、宽度约束）
//! - `paint`：基于排版结果绘制 RGBA 像素，并提供默认实现 `LayoutRasterizer`
//!
//! ## 实现思路
//!
//! 排版在文档锁内完成并生成独立的布局树，绘制则放到阻塞线程执行，
//! 避免长时间持有文档锁或阻塞 async 运行时。

mod layout;
mod paint;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::dom::{DocumentHandle, DomError, NodeId};

pub use layout::{LayoutMetrics, measure_intrinsic_size};
pub use paint::LayoutRasterizer;

/// 光栅化错误。
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("目标节点未连接到文档：{0}")]
    Detached(NodeId),

    #[error("目标节点不可见（display:none / visibility:hidden）：{0}")]
    NotRendered(NodeId),

    #[error("目标节点尺寸为零：{width}x{height}")]
    EmptyArea { width: f32, height: f32 },

    #[error("参数错误：{0}")]
    InvalidOptions(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("绘制失败：{0}")]
    Paint(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// 截图背景：透明或固定颜色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Transparent,
    Color(Rgba<u8>),
}

impl Background {
    pub fn fill(&self) -> Rgba<u8> {
        match self {
            Self::Transparent => Rgba([0, 0, 0, 0]),
            Self::Color(color) => *color,
        }
    }
}

impl FromStr for Background {
    type Err = RasterError;

    /// 支持 `transparent`、常见 CSS 颜色名、`#rgb`、`#rrggbb`、`#rrggbbaa`。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        if value == "transparent" {
            return Ok(Self::Transparent);
        }
        parse_color(&value)
            .map(Self::Color)
            .ok_or_else(|| RasterError::InvalidOptions(format!("无法解析颜色：{}", value)))
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transparent => f.write_str("transparent"),
            Self::Color(Rgba([r, g, b, 255])) => write!(f, "#{:02x}{:02x}{:02x}", r, g, b),
            Self::Color(Rgba([r, g, b, a])) => write!(f, "#{:02x}{:02x}{:02x}{:02x}", r, g, b, a),
        }
    }
}

pub(crate) fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let named = match value {
        "white" => Some([255, 255, 255, 255]),
        "black" => Some([0, 0, 0, 255]),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 128, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        "yellow" => Some([255, 255, 0, 255]),
        "gray" | "grey" => Some([128, 128, 128, 255]),
        "lightgray" | "lightgrey" => Some([211, 211, 211, 255]),
        "lightgreen" => Some([144, 238, 144, 255]),
        _ => None,
    };
    if let Some(rgba) = named {
        return Some(Rgba(rgba));
    }

    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8, 0, 0, 255];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(Rgba(out))
        }
        6 | 8 => {
            let r = channel(&hex[0..2])?;
            let g = channel(&hex[2..4])?;
            let b = channel(&hex[4..6])?;
            let a = if hex.len() == 8 { channel(&hex[6..8])? } else { 255 };
            Some(Rgba([r, g, b, a]))
        }
        _ => None,
    }
}

/// 光栅化参数。
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub background: Background,
    /// 相对 CSS 像素的缩放倍率。
    pub scale: f32,
}

/// 内存中的 RGBA 位图，附带其来源的固有 CSS 尺寸与缩放倍率。
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: RgbaImage,
    css_width: f32,
    css_height: f32,
    scale: f32,
}

impl Bitmap {
    pub fn new(image: RgbaImage, css_width: f32, css_height: f32, scale: f32) -> Self {
        Self {
            image,
            css_width,
            css_height,
            scale,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 渲染时测得的固有尺寸（CSS 像素）。
    pub fn css_size(&self) -> (f32, f32) {
        (self.css_width, self.css_height)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.image
    }
}

/// 光栅化器：对文档节点执行排版与绘制，完成后一次性返回位图。
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(
        &self,
        doc: &DocumentHandle,
        target: NodeId,
        options: &RasterOptions,
    ) -> Result<Bitmap, RasterError>;
}
