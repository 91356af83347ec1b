//! 固有尺寸排版
//!
//! 一个足够小的 inline 流式排版：文本按固定字宽与行高测量，元素按行水平排列子节点，
//! `display:block` 的子元素独占一行。支持 `width`（px / % / auto）、`max-width`、
//! `height`（px）、`padding`（px）与 `font-size`（px）。
//! 宿主元素存在封装子树时，按封装子树而非轻 DOM 排版。

use image::Rgba;

use super::{RasterError, parse_color};
use crate::dom::{Document, DomError, NodeId, RenderTree};

/// 排版度量参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    /// 默认字号（CSS 像素）。
    pub font_size_px: f32,
    /// 字宽与字号之比。
    pub advance_ratio: f32,
    /// 行高与字号之比。
    pub line_height_ratio: f32,
    /// 没有确定宽度的祖先时，百分比宽度相对的视口宽度。
    pub viewport_width: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            font_size_px: 16.0,
            advance_ratio: 0.6,
            line_height_ratio: 1.25,
            viewport_width: 1280.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Inherited {
    font_size: f32,
    color: Rgba<u8>,
    hidden: bool,
}

#[derive(Debug, Clone)]
pub(super) struct GlyphRun {
    pub(super) lines: Vec<String>,
    pub(super) advance: f32,
    pub(super) line_height: f32,
    pub(super) color: Rgba<u8>,
}

/// 布局树节点，坐标相对父节点。
#[derive(Debug, Clone)]
pub(super) struct LayoutBox {
    pub(super) x: f32,
    pub(super) y: f32,
    pub(super) width: f32,
    pub(super) height: f32,
    pub(super) background: Option<Rgba<u8>>,
    pub(super) glyphs: Option<GlyphRun>,
    pub(super) hidden: bool,
    pub(super) children: Vec<LayoutBox>,
}

fn parse_px(value: &str) -> Option<f32> {
    let number = value.trim().strip_suffix("px").unwrap_or(value.trim());
    number.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

fn parse_percent(value: &str) -> Option<f32> {
    value
        .trim()
        .strip_suffix('%')
        .and_then(|n| n.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
}

/// 解析长度；`auto` / `none` / 无法识别的值返回 `None`。
fn resolve_length(value: Option<&str>, containing: f32) -> Option<f32> {
    let value = value?;
    if let Some(percent) = parse_percent(value) {
        return Some(containing * percent / 100.0);
    }
    match value.trim() {
        "auto" | "none" | "" => None,
        other => parse_px(other),
    }
}

fn parent_across_shadow(doc: &Document, id: NodeId) -> Option<NodeId> {
    doc.parent(id).or_else(|| doc.host(id))
}

/// 从祖先链推导继承样式与包含块宽度；祖先 `display:none` 时返回 `None`。
fn ancestor_context(
    doc: &Document,
    target: NodeId,
    metrics: &LayoutMetrics,
) -> Option<(Inherited, f32)> {
    let mut chain = Vec::new();
    let mut current = parent_across_shadow(doc, target);
    while let Some(id) = current {
        chain.push(id);
        current = parent_across_shadow(doc, id);
    }

    let mut inherited = Inherited {
        font_size: metrics.font_size_px,
        color: Rgba([0, 0, 0, 255]),
        hidden: false,
    };
    let mut containing = metrics.viewport_width;
    for id in chain.into_iter().rev() {
        if !doc.is_element(id) {
            continue;
        }
        if doc.style(id, "display") == Some("none") {
            return None;
        }
        inherited = apply_inherited(doc, id, inherited);
        if let Some(width) = resolve_length(doc.style(id, "width"), containing) {
            containing = width;
        }
    }
    Some((inherited, containing))
}

fn apply_inherited(doc: &Document, id: NodeId, parent: Inherited) -> Inherited {
    let font_size = doc
        .style(id, "font-size")
        .and_then(parse_px)
        .filter(|v| *v > 0.0)
        .unwrap_or(parent.font_size);
    let color = doc
        .style(id, "color")
        .and_then(|c| parse_color(&c.to_ascii_lowercase()))
        .unwrap_or(parent.color);
    let hidden = match doc.style(id, "visibility") {
        Some("hidden") => true,
        Some("visible") => false,
        _ => parent.hidden,
    };
    Inherited {
        font_size,
        color,
        hidden,
    }
}

fn layout_text(text: &str, inherited: Inherited, metrics: &LayoutMetrics) -> LayoutBox {
    let advance = inherited.font_size * metrics.advance_ratio;
    let line_height = inherited.font_size * metrics.line_height_ratio;
    let lines: Vec<String> = if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').map(|line| line.to_string()).collect()
    };
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    LayoutBox {
        x: 0.0,
        y: 0.0,
        width: widest as f32 * advance,
        height: lines.len() as f32 * line_height,
        background: None,
        glyphs: Some(GlyphRun {
            lines,
            advance,
            line_height,
            color: inherited.color,
        }),
        hidden: inherited.hidden,
        children: Vec::new(),
    }
}

fn layout_node(
    doc: &Document,
    id: NodeId,
    parent: Inherited,
    containing: f32,
    metrics: &LayoutMetrics,
) -> Option<LayoutBox> {
    if let Some(text) = doc.text(id) {
        return Some(layout_text(text, parent, metrics));
    }
    if !doc.is_element(id) || doc.style(id, "display") == Some("none") {
        return None;
    }

    let inherited = apply_inherited(doc, id, parent);
    let padding = doc
        .style(id, "padding")
        .and_then(parse_px)
        .unwrap_or(0.0)
        .max(0.0);
    let explicit_width = resolve_length(doc.style(id, "width"), containing);
    let max_width = resolve_length(doc.style(id, "max-width"), containing);
    let explicit_height = resolve_length(doc.style(id, "height"), 0.0);
    let child_containing = explicit_width.unwrap_or(containing);

    let sources: Vec<NodeId> = match doc.render_tree(id) {
        RenderTree::Present(root) => doc.children(root).to_vec(),
        RenderTree::Absent => doc.children(id).to_vec(),
    };

    let mut children = Vec::new();
    let mut row_x = 0.0f32;
    let mut row_y = 0.0f32;
    let mut row_height = 0.0f32;
    let mut content_width = 0.0f32;
    for child in sources {
        let Some(mut child_box) = layout_node(doc, child, inherited, child_containing, metrics) else {
            continue;
        };
        let is_block = doc.style(child, "display") == Some("block");
        if is_block && row_x > 0.0 {
            row_y += row_height;
            row_x = 0.0;
            row_height = 0.0;
        }
        child_box.x = padding + row_x;
        child_box.y = padding + row_y;
        row_x += child_box.width;
        row_height = row_height.max(child_box.height);
        content_width = content_width.max(row_x);
        if is_block {
            row_y += row_height;
            row_x = 0.0;
            row_height = 0.0;
        }
        children.push(child_box);
    }
    let content_height = row_y + row_height;

    let mut width = explicit_width.unwrap_or(content_width + padding * 2.0);
    if let Some(max) = max_width {
        width = width.min(max);
    }
    let height = explicit_height.unwrap_or(content_height + padding * 2.0);

    Some(LayoutBox {
        x: 0.0,
        y: 0.0,
        width: width.max(0.0),
        height: height.max(0.0),
        background: doc
            .style(id, "background-color")
            .and_then(|c| parse_color(&c.to_ascii_lowercase())),
        glyphs: None,
        hidden: inherited.hidden,
        children,
    })
}

/// 为目标节点生成布局树。
pub(super) fn layout_target(
    doc: &Document,
    target: NodeId,
    metrics: &LayoutMetrics,
) -> Result<LayoutBox, RasterError> {
    if !doc.contains(target) {
        return Err(RasterError::Dom(DomError::UnknownNode(target)));
    }
    let (inherited, containing) =
        ancestor_context(doc, target, metrics).ok_or(RasterError::NotRendered(target))?;
    let root = layout_node(doc, target, inherited, containing, metrics)
        .ok_or(RasterError::NotRendered(target))?;
    if root.hidden {
        return Err(RasterError::NotRendered(target));
    }
    Ok(root)
}

/// 测量节点的固有尺寸（CSS 像素），与光栅化使用同一套排版。
pub fn measure_intrinsic_size(
    doc: &Document,
    target: NodeId,
    metrics: &LayoutMetrics,
) -> Result<(f32, f32), RasterError> {
    let root = layout_target(doc, target, metrics)?;
    Ok((root.width, root.height))
}
