//! # 公式截图工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  调用方（main.rs 命令行 / 测试）                          │
//! │       │ copy_image / download_image / copy_source        │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↓ Result<Option<T>, AppError> + Notice
//! ┌───────┼──────────────────────────────────────────────────┐
//! │  ├─ service ───── CaptureService（入口 + 提示）            │
//! │  │                                                       │
//! │  ├─ capture ───── 失焦 → 落定等待 → 离屏克隆 → 光栅化      │
//! │  │   ├─ clone          EphemeralClone (RAII)             │
//! │  │   └─ in_flight      单编辑器排队 / 拒绝                │
//! │  │                                                       │
//! │  ├─ export ────── PNG 编码 · 剪贴板 · 文件保存 · 文件名    │
//! │  │                                                       │
//! │  ├─ editor ────── EditorHandle / MathField               │
//! │  ├─ raster ────── Rasterizer / LayoutRasterizer          │
//! │  └─ dom ───────── 宿主文档（含封装渲染子树）              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`dom`] | 节点树、封装子树、深拷贝与简单选择器 |
//! | [`editor`] | 编辑器句柄接口与内存参考控件 |
//! | [`raster`] | 排版测量与按倍率绘制位图 |
//! | [`capture`] | 截图编排、等待策略、临时克隆与并发保护 |
//! | [`export`] | 编码、剪贴板写入（含重试）、文件保存与文件名清洗 |
//! | [`notify`] | 面向用户的成功 / 失败提示 |
//! | [`service`] | 三个界面操作的统一入口 |
//! | [`settings`] | JSON 设置文件读写 |

pub mod error;
pub mod dom;
pub mod editor;
pub mod raster;
pub mod capture;
pub mod export;
pub mod notify;
pub mod service;
pub mod settings;
