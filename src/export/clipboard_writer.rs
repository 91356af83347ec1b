//! # 剪贴板写入模块
//!
//! ## 设计思路
//!
//! 将与操作系统剪贴板交互的逻辑独立出来，便于隔离平台不稳定因素。
//! 每次写入只携带一个类型化的载荷（PNG 图片或纯文本），在阻塞线程中执行，
//! 避免阻塞 async 运行时。
//!
//! ## 实现思路
//!
//! - PNG 解码为 RGBA 的耗时工作放在打开剪贴板之前完成，持有剪贴板的窗口尽量短。
//! - 其他进程占用剪贴板时有限重试：指数退避 + 抖动，并受总预算约束。
//! - 失败按 `Busy / Transient / Fatal` 分类，Fatal（平台不支持、被拒绝）不重试。

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EncodedImage, ExportError};

/// 剪贴板载荷：每次写入恰好一种类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    Png(EncodedImage),
    Text(String),
}

impl ClipboardPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Png(_) => "image/png",
            Self::Text(_) => "text/plain",
        }
    }
}

/// 剪贴板写入通道。
#[async_trait]
pub trait ClipboardSink: Send + Sync {
    async fn write(&self, payload: ClipboardPayload) -> Result<(), ExportError>;
}

/// 剪贴板写入重试策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardRetryPolicy {
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_total_ms: u64,
}

impl Default for ClipboardRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay_ms: 40,
            max_delay_ms: 400,
            max_total_ms: 1_800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClipboardFailureKind {
    Busy,
    Transient,
    Fatal,
}

#[derive(Debug, Clone)]
pub(crate) struct ClipboardWriteFailure {
    kind: ClipboardFailureKind,
    message: String,
}

impl ClipboardWriteFailure {
    pub(crate) fn busy(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::Busy,
            message: message.into(),
        }
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::Transient,
            message: message.into(),
        }
    }

    pub(crate) fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ClipboardFailureKind::Fatal,
            message: message.into(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self.kind, ClipboardFailureKind::Busy | ClipboardFailureKind::Transient)
    }

    fn classify(operation: &str, err: arboard::Error) -> Self {
        let message = format!("{}：{}", operation, err);
        match err {
            arboard::Error::ClipboardOccupied => Self::busy(message),
            arboard::Error::ClipboardNotSupported | arboard::Error::ConversionFailure => {
                Self::fatal(message)
            }
            _ => Self::transient(message),
        }
    }
}

static JITTER_STATE: AtomicU64 = AtomicU64::new(0);

fn seed_jitter_state() -> u64 {
    let time_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let state = time_seed ^ ((std::process::id() as u64) << 32) ^ 0x9E37_79B9_7F4A_7C15;
    if state == 0 { 0xA5A5_5A5A_0123_4567 } else { state }
}

/// xorshift64，多线程下用 CAS 推进同一状态。
fn next_jitter_u64() -> u64 {
    let mut current = JITTER_STATE.load(Ordering::Relaxed);
    loop {
        let mut next = if current == 0 { seed_jitter_state() } else { current };
        next ^= next << 13;
        next ^= next >> 7;
        next ^= next << 17;

        match JITTER_STATE.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

pub(crate) fn compute_backoff_delay_with_jitter(base_delay_ms: u64, attempt: u32, max_delay_ms: u64) -> u64 {
    let exp = base_delay_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(8));
    let capped = exp.min(max_delay_ms.max(base_delay_ms));
    let jitter_bound = (capped / 3).max(1);
    capped.saturating_add(next_jitter_u64() % (jitter_bound + 1))
}

fn would_exceed_retry_budget(elapsed_ms: u64, wait_ms: u64, budget_ms: u64) -> bool {
    elapsed_ms.saturating_add(wait_ms) > budget_ms
}

/// 在当前（阻塞）线程中执行写入 + 重试。
pub(crate) fn write_with_retry<F>(policy: &ClipboardRetryPolicy, mut attempt_write: F) -> Result<(), ExportError>
where
    F: FnMut() -> Result<(), ClipboardWriteFailure>,
{
    let retry_count = policy.retries.max(1);
    let started = Instant::now();
    let mut last_failure: Option<ClipboardWriteFailure> = None;

    for attempt in 1..=retry_count {
        if attempt > 1 {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let wait_ms = compute_backoff_delay_with_jitter(
                policy.retry_delay_ms.max(1),
                attempt - 1,
                policy.max_delay_ms,
            );
            if would_exceed_retry_budget(elapsed_ms, wait_ms, policy.max_total_ms) {
                log::warn!(
                    "⏱️ 跳过第 {} 次重试：等待 {}ms 会超过预算 {}ms",
                    attempt,
                    wait_ms,
                    policy.max_total_ms
                );
                break;
            }
            log::debug!("🔄 重试 {}/{}，等待 {}ms（指数退避+抖动）", attempt, retry_count, wait_ms);
            std::thread::sleep(Duration::from_millis(wait_ms));
        }

        match attempt_write() {
            Ok(()) => {
                log::info!("✅ 剪贴板写入成功 (尝试 {})", attempt);
                return Ok(());
            }
            Err(failure) => {
                let retryable = failure.is_retryable();
                log::warn!(
                    "❌ 尝试 {} 失败: {}（kind={:?}, retryable={}）",
                    attempt,
                    failure.message,
                    failure.kind,
                    retryable
                );
                last_failure = Some(failure);
                if !retryable {
                    log::warn!("🛑 非可重试错误，提前终止重试");
                    break;
                }
            }
        }
    }

    match last_failure {
        Some(f) if f.kind == ClipboardFailureKind::Busy => Err(ExportError::ClipboardBusy(f.message)),
        Some(f) if f.kind == ClipboardFailureKind::Fatal => Err(ExportError::ClipboardDenied(f.message)),
        Some(f) => Err(ExportError::Clipboard(f.message)),
        None => Err(ExportError::Clipboard("未知错误".to_string())),
    }
}

/// 预解码好的剪贴板内容。
enum PreparedPayload {
    Image {
        width: usize,
        height: usize,
        rgba: Vec<u8>,
    },
    Text(String),
}

fn prepare(payload: ClipboardPayload) -> Result<PreparedPayload, ExportError> {
    match payload {
        ClipboardPayload::Png(png) => {
            if png.is_empty() {
                return Err(ExportError::EmptyPayload);
            }
            let rgba = image::load_from_memory(&png.bytes)
                .map_err(|e| ExportError::EncodingFailed(format!("PNG 解码失败：{}", e)))?
                .into_rgba8();
            Ok(PreparedPayload::Image {
                width: rgba.width() as usize,
                height: rgba.height() as usize,
                rgba: rgba.into_raw(),
            })
        }
        ClipboardPayload::Text(text) => Ok(PreparedPayload::Text(text)),
    }
}

fn try_system_write(prepared: &PreparedPayload) -> Result<(), ClipboardWriteFailure> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| ClipboardWriteFailure::classify("无法访问剪贴板", e))?;

    match prepared {
        PreparedPayload::Image { width, height, rgba } => clipboard
            .set_image(arboard::ImageData {
                width: *width,
                height: *height,
                bytes: Cow::Borrowed(rgba),
            })
            .map_err(|e| ClipboardWriteFailure::classify("写入图片失败", e)),
        PreparedPayload::Text(text) => clipboard
            .set_text(text.as_str())
            .map_err(|e| ClipboardWriteFailure::classify("写入文本失败", e)),
    }
}

/// 系统剪贴板（arboard）。
#[derive(Debug, Clone, Default)]
pub struct SystemClipboard {
    policy: ClipboardRetryPolicy,
}

impl SystemClipboard {
    pub fn new(policy: ClipboardRetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClipboardRetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ClipboardSink for SystemClipboard {
    async fn write(&self, payload: ClipboardPayload) -> Result<(), ExportError> {
        log::debug!("📋 准备写入剪贴板 - {}", payload.kind());
        let policy = self.policy;

        tokio::task::spawn_blocking(move || {
            let prepared = prepare(payload)?;
            write_with_retry(&policy, || try_system_write(&prepared))
        })
        .await
        .map_err(|e| ExportError::Clipboard(format!("线程执行失败：{}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> ClipboardRetryPolicy {
        ClipboardRetryPolicy {
            retries: 4,
            retry_delay_ms: 1,
            max_delay_ms: 4,
            max_total_ms: 500,
        }
    }

    #[test]
    fn backoff_delay_stays_within_expected_bounds() {
        let delay = compute_backoff_delay_with_jitter(100, 4, 900);
        assert!(delay >= 800, "delay should be at least exponential base");
        assert!(delay <= 1200, "delay should include bounded jitter only");
    }

    #[test]
    fn backoff_delay_respects_max_cap() {
        let delay = compute_backoff_delay_with_jitter(300, 8, 500);
        assert!(delay >= 500);
        assert!(delay <= 666);
    }

    #[test]
    fn retry_budget_checker_works() {
        assert!(would_exceed_retry_budget(1700, 120, 1800));
        assert!(!would_exceed_retry_budget(1600, 120, 1800));
    }

    #[test]
    fn busy_clipboard_is_retried_until_success() {
        let mut attempts = 0;
        let result = write_with_retry(&fast_policy(), || {
            attempts += 1;
            if attempts < 3 {
                Err(ClipboardWriteFailure::busy("occupied"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[test]
    fn fatal_failure_stops_immediately_as_denied() {
        let mut attempts = 0;
        let result = write_with_retry(&fast_policy(), || {
            attempts += 1;
            Err(ClipboardWriteFailure::fatal("not supported"))
        });
        assert_eq!(attempts, 1);
        assert!(matches!(result, Err(ExportError::ClipboardDenied(_))));
    }

    #[test]
    fn exhausted_busy_retries_report_busy() {
        let mut attempts = 0;
        let result = write_with_retry(&fast_policy(), || {
            attempts += 1;
            Err(ClipboardWriteFailure::busy("occupied"))
        });
        assert_eq!(attempts, 4);
        assert!(matches!(result, Err(ExportError::ClipboardBusy(_))));
    }

    #[test]
    fn transient_failures_report_generic_error() {
        let result = write_with_retry(&fast_policy(), || Err(ClipboardWriteFailure::transient("flaky")));
        assert!(matches!(result, Err(ExportError::Clipboard(message)) if message == "flaky"));
    }

    #[test]
    fn empty_png_payload_is_rejected_before_touching_clipboard() {
        let payload = ClipboardPayload::Png(EncodedImage {
            mime: "image/png",
            bytes: bytes::Bytes::new(),
            width: 0,
            height: 0,
        });
        assert!(matches!(prepare(payload), Err(ExportError::EmptyPayload)));
    }
}
