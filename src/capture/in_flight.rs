//! # 单编辑器并发保护
//!
//! 同一编辑器上的截图会争抢同一个控件的失焦与克隆状态。
//! 每个编辑器对应一把异步互斥锁，按 [`OverlapPolicy`] 决定排队、拒绝或放行。
//! 空闲条目在下一次获取时清理，注册表不会随编辑器数量无限增长。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use super::config::OverlapPolicy;
use super::CaptureError;
use crate::editor::EditorId;

/// 截图许可；离开作用域即释放。
#[derive(Debug)]
pub enum CapturePermit {
    Exclusive(OwnedMutexGuard<()>),
    /// `OverlapPolicy::Allow` 下不加锁。
    Unguarded,
}

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    locks: Mutex<HashMap<EditorId, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: EditorId) -> Result<Arc<tokio::sync::Mutex<()>>, CaptureError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| CaptureError::Internal("并发注册表锁已中毒".to_string()))?;
        // 只有注册表自己持有引用的条目是空闲的
        locks.retain(|key, lock| *key == id || Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    pub async fn acquire(&self, id: EditorId, policy: OverlapPolicy) -> Result<CapturePermit, CaptureError> {
        match policy {
            OverlapPolicy::Allow => Ok(CapturePermit::Unguarded),
            OverlapPolicy::Queue => {
                let lock = self.lock_for(id)?;
                if lock.try_lock().is_err() {
                    log::info!("⏳ {} 已有截图在进行中，排队等待", id);
                }
                Ok(CapturePermit::Exclusive(lock.lock_owned().await))
            }
            OverlapPolicy::Reject => {
                let lock = self.lock_for(id)?;
                lock.try_lock_owned()
                    .map(CapturePermit::Exclusive)
                    .map_err(|_| CaptureError::Busy(id))
            }
        }
    }

    /// 该编辑器当前是否有截图持有许可。
    pub fn in_flight(&self, id: EditorId) -> bool {
        let Ok(locks) = self.locks.lock() else {
            return false;
        };
        locks
            .get(&id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// 注册表中的条目数（含空闲条目）。
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
