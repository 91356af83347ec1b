//! # 导出模块（export）
//!
//! ## 设计思路
//!
//! 截图结果的去向与截图本身解耦：
//!
//! - `encode`：位图 → PNG（魔数校验 MIME），以及 data URI
//! - `filename`：由 LaTeX 派生安全文件名
//! - `clipboard_writer`：剪贴板通道（arboard + 重试）
//! - `file_save`：文件保存通道（目录写入，不覆盖同名文件）
//!
//! 外部协作者（系统剪贴板、文件系统）都藏在 `ClipboardSink` / `FileSaveSink` 之后，
//! 测试可以注入内存实现。

mod clipboard_writer;
mod encode;
mod error;
mod file_save;
mod filename;

use std::path::PathBuf;

pub use clipboard_writer::{ClipboardPayload, ClipboardRetryPolicy, ClipboardSink, SystemClipboard};
pub use encode::{EncodedImage, PNG_MIME, encode_png, to_data_uri};
pub use error::ExportError;
pub use file_save::{DirectorySink, FileSaveSink};
pub use filename::{FALLBACK_STEM, export_file_name, sanitize_filename};

use crate::raster::Bitmap;

/// 编码位图并作为单个 PNG 载荷写入剪贴板。
pub async fn export_to_clipboard<S>(sink: &S, bitmap: &Bitmap) -> Result<(), ExportError>
where
    S: ClipboardSink + ?Sized,
{
    let encoded = encode_png(bitmap)?;
    sink.write(ClipboardPayload::Png(encoded)).await
}

/// 编码位图，以 `name_source` 派生的安全文件名保存，返回最终路径。
pub async fn export_to_file<S>(sink: &S, bitmap: &Bitmap, name_source: &str) -> Result<PathBuf, ExportError>
where
    S: FileSaveSink + ?Sized,
{
    let encoded = encode_png(bitmap)?;
    let file_name = export_file_name(name_source, "png");
    sink.save(&encoded, &file_name).await
}
