/// 导出统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("剪贴板访问被拒绝：{0}")]
    ClipboardDenied(String),

    #[error("剪贴板忙：{0}")]
    ClipboardBusy(String),

    #[error("剪贴板写入失败：{0}")]
    Clipboard(String),

    #[error("图片编码失败：{0}")]
    EncodingFailed(String),

    /// 位图或编码结果为空，拒绝写出。
    #[error("导出内容为空")]
    EmptyPayload,

    #[error("文件写入失败：{0}")]
    FileSystem(#[from] std::io::Error),
}

impl ExportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClipboardDenied(_) => "E_CLIPBOARD_DENIED",
            Self::ClipboardBusy(_) => "E_CLIPBOARD_BUSY",
            Self::Clipboard(_) => "E_CLIPBOARD",
            Self::EncodingFailed(_) => "E_ENCODE",
            Self::EmptyPayload => "E_EMPTY_PAYLOAD",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::ClipboardDenied(_) | Self::ClipboardBusy(_) | Self::Clipboard(_) => "clipboard",
            Self::EncodingFailed(_) | Self::EmptyPayload => "encode",
            Self::FileSystem(_) => "save",
        }
    }
}
