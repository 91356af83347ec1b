//! # 渲染落定等待
//!
//! 控件渲染器不提供“刷新完成”事件。平台能给出探针时轮询探针，
//! 否则退回固定等待整个预算。超出预算只是降级，不视为失败。

use std::time::Duration;

use tokio::time::Instant;

use super::config::SettleStrategy;

/// 等待结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// 探针报告已落定。
    Settled(Duration),
    /// 固定等待完成（没有可用探针）。
    Elapsed(Duration),
    /// 预算耗尽时探针仍未落定。
    BudgetExceeded(Duration),
}

impl SettleOutcome {
    pub fn waited(&self) -> Duration {
        match self {
            Self::Settled(d) | Self::Elapsed(d) | Self::BudgetExceeded(d) => *d,
        }
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded(_))
    }
}

/// 等待渲染落定。
///
/// `probe` 返回 `Some(true)` 表示已落定，`Some(false)` 表示仍在渲染，
/// `None` 表示平台不提供信号，此时剩余预算按固定时长等待。
pub async fn await_render_settled<P>(
    mut probe: P,
    strategy: SettleStrategy,
    budget: Duration,
    poll_interval: Duration,
) -> SettleOutcome
where
    P: FnMut() -> Option<bool>,
{
    let started = Instant::now();

    if strategy == SettleStrategy::Fixed {
        tokio::time::sleep(budget).await;
        return SettleOutcome::Elapsed(started.elapsed());
    }

    let poll_interval = poll_interval.max(Duration::from_millis(1));
    loop {
        let elapsed = started.elapsed();
        match probe() {
            Some(true) => return SettleOutcome::Settled(elapsed),
            None => {
                tokio::time::sleep(budget.saturating_sub(elapsed)).await;
                return SettleOutcome::Elapsed(started.elapsed());
            }
            Some(false) if elapsed >= budget => return SettleOutcome::BudgetExceeded(elapsed),
            Some(false) => {
                tokio::time::sleep(poll_interval.min(budget - elapsed)).await;
            }
        }
    }
}
