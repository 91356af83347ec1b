//! # 文件保存模块
//!
//! ## 设计思路
//!
//! 保存通道只接收“编码好的载荷 + 已清洗的文件名”，不关心文件名从哪里来。
//! `DirectorySink` 把文件写进指定目录，目录不存在时自动创建；
//! 同名文件已存在时不覆盖，而是依次尝试 `name (1).png`、`name (2).png`……
//!
//! ## 实现思路
//!
//! - 用 `create_new` 打开文件，检查与创建是同一个系统调用，并发导出也不会互相覆盖。
//! - 文件 I/O 放到阻塞线程执行。
//! - 创建成功但写入失败时删除该文件，目录里不会留下截断的 PNG。

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{EncodedImage, ExportError};

/// 同名文件的最大编号，超过后放弃。
const MAX_NAME_SUFFIX: u32 = 9_999;

/// 文件保存通道。
#[async_trait]
pub trait FileSaveSink: Send + Sync {
    /// 保存并返回最终写入的路径。
    async fn save(&self, image: &EncodedImage, file_name: &str) -> Result<PathBuf, ExportError>;
}

/// 写入本地目录。
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `stem (n).ext` 形式的候选名。
fn numbered_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", file_name, n),
    }
}

/// 执行写入；失败时删除 `path`，只返回写入本身的错误。
fn fill_or_discard(path: &Path, write: impl FnOnce() -> std::io::Result<()>) -> Result<(), ExportError> {
    let Err(err) = write() else {
        return Ok(());
    };
    match fs::remove_file(path) {
        Ok(()) => log::warn!("🗑️ 写入失败，已删除不完整文件 - {}", path.display()),
        Err(cleanup) => log::error!("❌ 无法删除不完整文件 {}：{}", path.display(), cleanup),
    }
    Err(err.into())
}

fn write_unique(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    for n in 0..=MAX_NAME_SUFFIX {
        let path = dir.join(numbered_name(file_name, n));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                fill_or_discard(&path, || {
                    file.write_all(bytes)?;
                    file.sync_all()
                })?;
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(ExportError::FileSystem(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("目录中已有过多同名文件：{}", file_name),
    )))
}

#[async_trait]
impl FileSaveSink for DirectorySink {
    async fn save(&self, image: &EncodedImage, file_name: &str) -> Result<PathBuf, ExportError> {
        if image.is_empty() {
            return Err(ExportError::EmptyPayload);
        }
        let dir = self.dir.clone();
        let file_name = file_name.to_string();
        let bytes = image.bytes.clone();

        let path = tokio::task::spawn_blocking(move || write_unique(&dir, &file_name, &bytes))
            .await
            .map_err(|e| ExportError::FileSystem(std::io::Error::other(format!("线程执行失败：{}", e))))??;

        log::info!("💾 已保存图片 - {} ({}KB)", path.display(), image.len() / 1024);
        Ok(path)
    }
}
