//! # 截图模块（capture）
//!
//! ## 设计思路
//!
//! 把“失焦 → 等待落定 → 离屏克隆 → 光栅化 → 回收”拆成独立子模块：
//!
//! - `config`：可调参数与等待档位
//! - `settle`：渲染落定等待（轮询探针或固定等待）
//! - `clone`：离屏克隆的 RAII 守卫
//! - `in_flight`：单编辑器并发保护
//! - `coordinator`：编排整条流水线并记录阶段耗时
//! - `error/snapshot`：错误与结果模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! CaptureService（service.rs）
//!    ↓
//! coordinator.rs（配置快照 + 阶段耗时日志）
//!    ├─ in_flight.rs（排队 / 拒绝）
//!    ├─ settle.rs（失焦后等待）
//!    ├─ clone.rs（离屏克隆，Drop 回收）
//!    ├─ settle.rs（克隆渲染等待）
//!    └─ raster::Rasterizer（带超时）
//!    ↓
//! Snapshot → export
//! ```

mod clone;
mod config;
mod coordinator;
mod error;
mod in_flight;
mod settle;
mod snapshot;

pub use clone::{CaptureTarget, EphemeralClone};
pub use config::{
    BASELINE_DPI, CaptureConfig, OverlapPolicy, SettleProfile, SettleStrategy, TARGET_DPI,
};
pub use coordinator::CaptureCoordinator;
pub use error::CaptureError;
pub use in_flight::{CapturePermit, InFlightRegistry};
pub use settle::{SettleOutcome, await_render_settled};
pub use snapshot::{CaptureTimings, Snapshot};
