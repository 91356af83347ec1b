//! 绘制与默认光栅化器
//!
//! 在文档锁内生成布局树，随后在阻塞线程中按缩放倍率绘制背景、元素底色与字形块。
//! 输出尺寸为 `ceil(固有尺寸 * scale)`。

use async_trait::async_trait;
use image::{Pixel, Rgba, RgbaImage};

use super::layout::{LayoutBox, LayoutMetrics, layout_target};
use super::{Background, Bitmap, RasterError, RasterOptions, Rasterizer};
use crate::dom::{DocumentHandle, NodeId};

/// 基于盒模型排版的参考光栅化器。
#[derive(Debug, Clone)]
pub struct LayoutRasterizer {
    metrics: LayoutMetrics,
    max_pixels: u64,
}

impl Default for LayoutRasterizer {
    fn default() -> Self {
        Self {
            metrics: LayoutMetrics::default(),
            max_pixels: 40_000_000,
        }
    }
}

impl LayoutRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: LayoutMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// 输出像素上限（`width * height`）。
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }
}

fn validate_scale(scale: f32) -> Result<(), RasterError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RasterError::InvalidOptions(format!("缩放倍率无效：{}", scale)));
    }
    Ok(())
}

fn fill_rect(image: &mut RgbaImage, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
    if color.0[3] == 0 || width <= 0.0 || height <= 0.0 {
        return;
    }
    let x0 = x.floor().max(0.0) as u32;
    let y0 = y.floor().max(0.0) as u32;
    let x1 = ((x + width).ceil().max(0.0) as u32).min(image.width());
    let y1 = ((y + height).ceil().max(0.0) as u32).min(image.height());
    for py in y0..y1 {
        for px in x0..x1 {
            image.get_pixel_mut(px, py).blend(&color);
        }
    }
}

fn paint_box(image: &mut RgbaImage, layout: &LayoutBox, origin: (f32, f32), scale: f32) {
    let x = origin.0 + layout.x;
    let y = origin.1 + layout.y;

    if !layout.hidden {
        if let Some(color) = layout.background {
            fill_rect(
                image,
                x * scale,
                y * scale,
                layout.width * scale,
                layout.height * scale,
                color,
            );
        }
        if let Some(run) = &layout.glyphs {
            for (line_index, line) in run.lines.iter().enumerate() {
                let line_y = y + line_index as f32 * run.line_height;
                for (column, ch) in line.chars().enumerate() {
                    if ch.is_whitespace() {
                        continue;
                    }
                    let glyph_x = x + column as f32 * run.advance + run.advance * 0.15;
                    let glyph_y = line_y + run.line_height * 0.2;
                    fill_rect(
                        image,
                        glyph_x * scale,
                        glyph_y * scale,
                        run.advance * 0.7 * scale,
                        run.line_height * 0.6 * scale,
                        run.color,
                    );
                }
            }
        }
    }

    for child in &layout.children {
        paint_box(image, child, (x, y), scale);
    }
}

fn paint(layout: &LayoutBox, background: Background, scale: f32, width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, background.fill());
    paint_box(&mut image, layout, (0.0, 0.0), scale);
    image
}

#[async_trait]
impl Rasterizer for LayoutRasterizer {
    async fn rasterize(
        &self,
        doc: &DocumentHandle,
        target: NodeId,
        options: &RasterOptions,
    ) -> Result<Bitmap, RasterError> {
        validate_scale(options.scale)?;

        let metrics = self.metrics;
        let layout = doc.with(|d| {
            if !d.is_connected(target) {
                return Err(RasterError::Detached(target));
            }
            layout_target(d, target, &metrics)
        })??;

        if layout.width <= 0.0 || layout.height <= 0.0 {
            return Err(RasterError::EmptyArea {
                width: layout.width,
                height: layout.height,
            });
        }

        let scale = options.scale;
        let width = ((layout.width * scale).ceil() as u32).max(1);
        let height = ((layout.height * scale).ceil() as u32).max(1);
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(RasterError::ResourceLimit(format!(
                "输出像素过大：{}x{}（限制：{} 像素）",
                width, height, self.max_pixels
            )));
        }

        log::debug!(
            "🖌️ 开始绘制 - 固有尺寸 {:.1}x{:.1} 缩放 {:.4} 输出 {}x{}",
            layout.width,
            layout.height,
            scale,
            width,
            height
        );

        let background = options.background;
        let (css_width, css_height) = (layout.width, layout.height);
        let image = tokio::task::spawn_blocking(move || paint(&layout, background, scale, width, height))
            .await
            .map_err(|e| RasterError::Paint(format!("绘制线程执行失败：{}", e)))?;

        Ok(Bitmap::new(image, css_width, css_height, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached_text(doc: &DocumentHandle, text: &str) -> NodeId {
        doc.with(|d| {
            let span = d.create_element("span");
            let node = d.create_text(text);
            d.append_child(span, node).unwrap();
            let body = d.body();
            d.append_child(body, span).unwrap();
            span
        })
        .unwrap()
    }

    #[tokio::test]
    async fn output_is_intrinsic_size_times_scale() {
        let doc = DocumentHandle::new();
        let span = attached_text(&doc, "x^2+1");
        let options = RasterOptions {
            background: Background::Transparent,
            scale: 300.0 / 96.0,
        };

        let bitmap = LayoutRasterizer::new().rasterize(&doc, span, &options).await.unwrap();
        let (css_width, css_height) = bitmap.css_size();
        assert!((css_width - 48.0).abs() < 1e-3);
        assert!((css_height - 20.0).abs() < 1e-3);
        assert_eq!(bitmap.width(), (css_width * options.scale).ceil() as u32);
        assert_eq!(bitmap.height(), (css_height * options.scale).ceil() as u32);
        assert_eq!(bitmap.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[tokio::test]
    async fn solid_background_fills_corners_and_glyphs_are_inked() {
        let doc = DocumentHandle::new();
        let span = attached_text(&doc, "x");
        let options = RasterOptions {
            background: "white".parse().unwrap(),
            scale: 2.0,
        };

        let bitmap = LayoutRasterizer::new().rasterize(&doc, span, &options).await.unwrap();
        assert_eq!(bitmap.pixel(0, 0), Some([255, 255, 255, 255]));
        let center = bitmap.pixel(bitmap.width() / 2, bitmap.height() / 2).unwrap();
        assert_eq!(center, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn detached_target_is_rejected() {
        let doc = DocumentHandle::new();
        let span = doc.with(|d| d.create_element("span")).unwrap();
        let options = RasterOptions {
            background: Background::Transparent,
            scale: 1.0,
        };

        let result = LayoutRasterizer::new().rasterize(&doc, span, &options).await;
        assert!(matches!(result, Err(RasterError::Detached(_))));
    }

    #[tokio::test]
    async fn empty_target_and_bad_scale_are_rejected() {
        let doc = DocumentHandle::new();
        let span = attached_text(&doc, "");
        let rasterizer = LayoutRasterizer::new();

        let empty = rasterizer
            .rasterize(&doc, span, &RasterOptions { background: Background::Transparent, scale: 1.0 })
            .await;
        assert!(matches!(empty, Err(RasterError::EmptyArea { .. })));

        let bad_scale = rasterizer
            .rasterize(&doc, span, &RasterOptions { background: Background::Transparent, scale: f32::NAN })
            .await;
        assert!(matches!(bad_scale, Err(RasterError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn pixel_budget_is_enforced() {
        let doc = DocumentHandle::new();
        let span = attached_text(&doc, "a long enough formula");
        let rasterizer = LayoutRasterizer::new().with_max_pixels(100);
        let options = RasterOptions {
            background: Background::Transparent,
            scale: 3.0,
        };

        let result = rasterizer.rasterize(&doc, span, &options).await;
        assert!(matches!(result, Err(RasterError::ResourceLimit(_))));
    }
}
