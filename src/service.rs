//! # 服务层
//!
//! ## 设计思路
//!
//! `CaptureService` 是界面操作（复制图片 / 下载图片 / 复制 LaTeX）的唯一入口，
//! 持有截图编排器、两个导出通道与提示通道。生命周期由调用方（`main.rs` 或测试）管理，
//! 测试可以为每个用例创建独立实例并注入内存通道。
//!
//! ## 实现思路
//!
//! - 每个操作都产生一条提示：成功给出结果，失败点名原因。
//! - 没有挂载的编辑器（`NoWidget`）时静默返回 `Ok(None)`，只记 debug 日志。
//! - 失败在提示之后原样返回给调用方，方便命令行设置退出码。

use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::{CaptureConfig, CaptureCoordinator, CaptureError, SettleProfile, Snapshot};
use crate::editor::EditorHandle;
use crate::error::AppError;
use crate::export::{self, ClipboardPayload, ClipboardSink, FileSaveSink};
use crate::notify::{Notice, Notifier};
use crate::raster::{Background, Rasterizer};

pub const COPY_IMAGE_SUCCESS: &str = "Image copied to clipboard!";
pub const COPY_IMAGE_FAILURE: &str = "Unable to copy image to clipboard.";
pub const DOWNLOAD_IMAGE_FAILURE: &str = "Unable to save image.";
pub const COPY_SOURCE_FAILURE: &str = "Unable to copy LaTeX to clipboard.";

/// 截图导出服务。
pub struct CaptureService {
    coordinator: CaptureCoordinator,
    clipboard: Arc<dyn ClipboardSink>,
    files: Arc<dyn FileSaveSink>,
    notifier: Arc<dyn Notifier>,
    background: Background,
}

impl CaptureService {
    pub fn new(
        config: CaptureConfig,
        rasterizer: Arc<dyn Rasterizer>,
        clipboard: Arc<dyn ClipboardSink>,
        files: Arc<dyn FileSaveSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            coordinator: CaptureCoordinator::new(config, rasterizer)?,
            clipboard,
            files,
            notifier,
            background: Background::Transparent,
        })
    }

    /// 设置导出图片的背景（默认透明）。
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn background(&self) -> Background {
        self.background
    }

    pub fn coordinator(&self) -> &CaptureCoordinator {
        &self.coordinator
    }

    pub fn set_settle_profile(&self, profile: SettleProfile) -> Result<(), AppError> {
        Ok(self.coordinator.set_settle_profile(profile)?)
    }

    /// 截图；`NoWidget` 转为 `Ok(None)`。
    async fn capture_or_skip<E>(&self, editor: &E, action: &'static str) -> Result<Option<Snapshot>, AppError>
    where
        E: EditorHandle + ?Sized,
    {
        match self.coordinator.capture(editor, self.background).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(CaptureError::NoWidget) => {
                log::debug!("{}：没有挂载的编辑器，忽略", action);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn report<T>(&self, action: &'static str, failure: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(err) = &result {
            self.notifier.notify(Notice::failure(action, failure, err));
        }
        result
    }

    /// 截图并复制到剪贴板。
    pub async fn copy_image<E>(&self, editor: &E) -> Result<Option<Snapshot>, AppError>
    where
        E: EditorHandle + ?Sized,
    {
        const ACTION: &str = "copy_image";
        let result: Result<Option<Snapshot>, AppError> = async {
            let Some(snapshot) = self.capture_or_skip(editor, ACTION).await? else {
                return Ok(None);
            };
            export::export_to_clipboard(self.clipboard.as_ref(), &snapshot.bitmap).await?;
            Ok::<_, AppError>(Some(snapshot))
        }
        .await;

        let result = self.report(ACTION, COPY_IMAGE_FAILURE, result);
        if let Ok(Some(_)) = &result {
            self.notifier.notify(Notice::success(ACTION, COPY_IMAGE_SUCCESS));
        }
        result
    }

    /// 截图并保存为文件，文件名由调用时刻的 LaTeX 派生。
    pub async fn download_image<E>(&self, editor: &E) -> Result<Option<PathBuf>, AppError>
    where
        E: EditorHandle + ?Sized,
    {
        const ACTION: &str = "download_image";
        let result: Result<Option<PathBuf>, AppError> = async {
            let Some(snapshot) = self.capture_or_skip(editor, ACTION).await? else {
                return Ok(None);
            };
            let path = export::export_to_file(self.files.as_ref(), &snapshot.bitmap, &snapshot.content).await?;
            Ok::<_, AppError>(Some(path))
        }
        .await;

        let result = self.report(ACTION, DOWNLOAD_IMAGE_FAILURE, result);
        if let Ok(Some(path)) = &result {
            self.notifier
                .notify(Notice::success(ACTION, format!("Saved image to {}", path.display())));
        }
        result
    }

    /// 复制编辑器的 LaTeX 源码。
    pub async fn copy_source<E>(&self, editor: &E) -> Result<Option<String>, AppError>
    where
        E: EditorHandle + ?Sized,
    {
        const ACTION: &str = "copy_source";
        if editor.root().is_none() {
            log::debug!("{}：没有挂载的编辑器，忽略", ACTION);
            return Ok(None);
        }
        let latex = editor.content();
        let result = self
            .clipboard
            .write(ClipboardPayload::Text(latex.clone()))
            .await
            .map_err(AppError::from);

        self.report(ACTION, COPY_SOURCE_FAILURE, result)?;
        self.notifier
            .notify(Notice::success(ACTION, format!("Copied \"{}\" to clipboard.", latex)));
        Ok(Some(latex))
    }
}
