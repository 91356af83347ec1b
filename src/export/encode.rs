//! # 编码模块
//!
//! 位图统一编码为 PNG。MIME 类型不靠约定，而是从编码结果的魔数里识别（`infer`），
//! 编码器输出异常时能在写出前被发现。

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::ExportError;
use crate::raster::Bitmap;

pub const PNG_MIME: &str = "image/png";

/// 编码后的图片。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 把位图编码为 PNG。
pub fn encode_png(bitmap: &Bitmap) -> Result<EncodedImage, ExportError> {
    let (width, height) = (bitmap.width(), bitmap.height());
    if width == 0 || height == 0 {
        return Err(ExportError::EmptyPayload);
    }

    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(bitmap.as_rgba().as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| ExportError::EncodingFailed(format!("PNG 编码失败：{}", e)))?;

    if buf.is_empty() {
        return Err(ExportError::EncodingFailed("编码器没有产生任何数据".to_string()));
    }
    let mime = infer::get(&buf)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    if mime != PNG_MIME {
        return Err(ExportError::EncodingFailed(format!("编码结果类型异常：{}", mime)));
    }

    log::debug!("🗜️ PNG 编码完成 - {}x{} {}KB", width, height, buf.len() / 1024);
    Ok(EncodedImage {
        mime,
        bytes: Bytes::from(buf),
        width,
        height,
    })
}

/// `data:<mime>;base64,<payload>` 形式，供只接受 data URI 的保存通道使用。
pub fn to_data_uri(image: &EncodedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime,
        general_purpose::STANDARD.encode(&image.bytes)
    )
}
