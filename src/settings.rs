//! 设置文件读写
//!
//! 设置以 JSON 保存，缺省字段取默认值，读入后立即校验截图参数。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capture::CaptureConfig;
use crate::error::AppError;
use crate::export::ClipboardRetryPolicy;

/// 应用设置。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub capture: CaptureConfig,
    pub clipboard: ClipboardRetryPolicy,
    /// 下载图片的默认目录。
    pub output_dir: Option<PathBuf>,
}

/// 读取设置文件；文件不存在时返回 `None`。
pub fn load_settings(path: &Path) -> Result<Option<AppSettings>, AppError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let parsed = serde_json::from_str::<AppSettings>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;
    parsed.capture.validate()?;

    log::debug!("⚙️ 已加载设置：{}", path.display());
    Ok(Some(parsed))
}

/// 读取设置文件，不存在时使用默认设置。
pub fn load_settings_or_default(path: &Path) -> Result<AppSettings, AppError> {
    Ok(load_settings(path)?.unwrap_or_default())
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), AppError> {
    settings.capture.validate()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
