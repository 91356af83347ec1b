//! # 文件名清洗
//!
//! 导出文件名由编辑器里的 LaTeX 派生，必须满足：
//! - 不含 `/ ? < > \ : * | "` 与控制字符
//! - 不是 `.`、`..` 或 Windows 设备名（`CON`、`COM1`……）
//! - 不以点或空格结尾
//! - 不超过 255 字节
//! - 非空：清洗后为空时使用固定名 `equation`

use once_cell::sync::Lazy;
use regex::Regex;

/// 清洗结果为空时的文件名主干。
pub const FALLBACK_STEM: &str = "equation";

const MAX_FILENAME_BYTES: usize = 255;

static ILLEGAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[/?<>\\:*|"]"#).expect("valid regex"));
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("valid regex"));
static RESERVED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.+$").expect("valid regex"));
static WINDOWS_RESERVED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(con|prn|aux|nul|com[0-9]|lpt[0-9])(\..*)?$").expect("valid regex")
});
static WINDOWS_TRAILING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[. ]+$").expect("valid regex"));

/// 按字符边界截断到 `max_bytes` 字节以内。
fn truncate_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn clean(source: &str, max_bytes: usize) -> String {
    let cleaned = ILLEGAL_RE.replace_all(source, "");
    let cleaned = CONTROL_RE.replace_all(&cleaned, "");
    let cleaned = WINDOWS_TRAILING_RE.replace(&cleaned, "");
    // 截断可能重新露出结尾的点或空格
    let truncated = truncate_bytes(&cleaned, max_bytes);
    let trimmed = WINDOWS_TRAILING_RE.replace(truncated, "");
    if RESERVED_RE.is_match(&trimmed) || WINDOWS_RESERVED_RE.is_match(&trimmed) {
        return String::new();
    }
    trimmed.into_owned()
}

/// 把任意文本清洗为安全的文件名（不含扩展名）；结果永不为空。
pub fn sanitize_filename(source: &str) -> String {
    let cleaned = clean(source, MAX_FILENAME_BYTES);
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned
    }
}

/// 导出用的完整文件名：`<清洗后的内容>.png`，总长不超过 255 字节。
pub fn export_file_name(source: &str, extension: &str) -> String {
    let budget = MAX_FILENAME_BYTES.saturating_sub(extension.len() + 1);
    let stem = clean(source, budget);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem.as_str() };
    format!("{}.{}", stem, extension)
}
