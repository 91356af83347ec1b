//! # 截图编排模块
//!
//! ## 设计思路
//!
//! `CaptureCoordinator` 只负责流程编排与配置管理，不关心结果的去向（剪贴板或文件）。
//! 处理链路固定为：
//! 1. 检查控件是否挂载，读取配置快照并记下调用时刻的内容
//! 2. 获取单编辑器许可（排队 / 拒绝 / 放行）
//! 3. 失焦，等待控件去掉光标等聚焦态装饰
//! 4. 在离屏容器里建立深拷贝，把调用时刻的内容写回克隆，放开宽度约束
//! 5. 有封装渲染子树时把内容赋给克隆并等待克隆渲染
//! 6. 选出内容节点（或回退到克隆根），带超时光栅化
//! 7. 回收克隆（`EphemeralClone` 的 `Drop`）
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CaptureConfig>>` 支持运行时切换等待档位。
//! - 单次截图使用同一份配置快照，处理中途改配置不影响本次结果。
//! - 记录 `blur/clone/rasterize/total` 阶段耗时，便于诊断慢设备上的等待不足。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use super::clone::{CaptureTarget, EphemeralClone};
use super::config::{CaptureConfig, SettleProfile};
use super::in_flight::InFlightRegistry;
use super::settle::await_render_settled;
use super::snapshot::{CaptureTimings, Snapshot};
use super::CaptureError;
use crate::editor::{EditorHandle, EditorId};
use crate::raster::{Background, RasterOptions, Rasterizer};

/// 截图编排器。
pub struct CaptureCoordinator {
    config: Arc<RwLock<CaptureConfig>>,
    rasterizer: Arc<dyn Rasterizer>,
    in_flight: InFlightRegistry,
}

impl CaptureCoordinator {
    /// 根据初始配置创建编排器；配置非法时直接返回错误。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use std::sync::Arc;
    /// use mathpad_capture::capture::{CaptureConfig, CaptureCoordinator};
    /// use mathpad_capture::raster::LayoutRasterizer;
    ///
    /// let coordinator = CaptureCoordinator::new(CaptureConfig::default(), Arc::new(LayoutRasterizer::new()))?;
    /// # Ok::<(), mathpad_capture::capture::CaptureError>(())
    /// ```
    pub fn new(config: CaptureConfig, rasterizer: Arc<dyn Rasterizer>) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            rasterizer,
            in_flight: InFlightRegistry::new(),
        })
    }

    pub fn config_snapshot(&self) -> Result<CaptureConfig, CaptureError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| CaptureError::Internal("配置读取锁已中毒".to_string()))
    }

    /// 整体替换配置；新配置先校验。
    pub fn set_config(&self, config: CaptureConfig) -> Result<(), CaptureError> {
        config.validate()?;
        let mut current = self
            .config
            .write()
            .map_err(|_| CaptureError::Internal("配置写入锁已中毒".to_string()))?;
        *current = config;
        Ok(())
    }

    pub fn set_settle_profile(&self, profile: SettleProfile) -> Result<(), CaptureError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| CaptureError::Internal("配置写入锁已中毒".to_string()))?;
        config.apply_settle_profile(profile);

        log::info!(
            "⚙️ 已切换等待档位：{}（post_blur={}ms, clone={}ms）",
            profile.as_str(),
            config.post_blur_settle_ms,
            config.clone_settle_ms
        );
        Ok(())
    }

    pub fn get_settle_profile(&self) -> Result<SettleProfile, CaptureError> {
        Ok(self.config_snapshot()?.infer_settle_profile())
    }

    /// 该编辑器当前是否有截图在进行中。
    pub fn in_flight(&self, editor: EditorId) -> bool {
        self.in_flight.in_flight(editor)
    }

    /// 截图主入口：生成编辑器当前内容的高分辨率位图。
    ///
    /// 控件未挂载时返回 `CaptureError::NoWidget`，且不会创建任何临时节点。
    pub async fn capture<E>(&self, editor: &E, background: Background) -> Result<Snapshot, CaptureError>
    where
        E: EditorHandle + ?Sized,
    {
        if editor.root().is_none() {
            return Err(CaptureError::NoWidget);
        }
        let config = self.config_snapshot()?;
        let content = editor.content();
        let editor_id = editor.id();
        let total_start = Instant::now();

        let _permit = self.in_flight.acquire(editor_id, config.overlap_policy).await?;
        // 排队期间控件可能已被卸载
        let Some(source) = editor.root() else {
            return Err(CaptureError::NoWidget);
        };

        editor.blur();
        let blur_settle = await_render_settled(
            || editor.is_render_settled(),
            config.settle_strategy,
            Duration::from_millis(config.post_blur_settle_ms),
            Duration::from_millis(config.settle_poll_interval_ms),
        )
        .await;
        if blur_settle.is_budget_exceeded() {
            log::warn!(
                "⚠️ {} 失焦后渲染未在 {}ms 内落定，继续截图",
                editor_id,
                config.post_blur_settle_ms
            );
        }

        let doc = editor.document();
        let clone = EphemeralClone::create(doc, source, config.offscreen_offset_px)?;
        // 深拷贝取的是此刻的实时内容，等待期间的编辑不能进入结果
        editor.pin_clone_content(clone.root(), &content)?;
        clone.relax_width()?;
        clone.attach()?;

        let clone_start = Instant::now();
        if clone.render_tree()?.has_inner_render_tree() {
            editor.assign_clone_value(clone.root(), &content)?;
            let selector = config.inner_content_selector.as_str();
            let outcome = await_render_settled(
                || match clone.resolve_target(selector) {
                    Ok((_, CaptureTarget::InnerContent)) => Some(true),
                    Ok(_) => Some(false),
                    Err(_) => None,
                },
                config.settle_strategy,
                Duration::from_millis(config.clone_settle_ms),
                Duration::from_millis(config.settle_poll_interval_ms),
            )
            .await;
            if outcome.is_budget_exceeded() {
                log::warn!(
                    "⚠️ {} 克隆渲染未在 {}ms 内完成，回退到克隆根",
                    editor_id,
                    config.clone_settle_ms
                );
            }
        } else {
            log::debug!("{} 没有封装渲染子树，直接光栅化克隆根", editor_id);
        }
        let clone_settle = clone_start.elapsed();

        let (target_node, target) = clone.resolve_target(&config.inner_content_selector)?;
        let options = RasterOptions {
            background,
            scale: config.dpi_scale,
        };

        let raster_start = Instant::now();
        let bitmap = match tokio::time::timeout(
            Duration::from_millis(config.raster_timeout_ms),
            self.rasterizer.rasterize(doc, target_node, &options),
        )
        .await
        {
            Ok(Ok(bitmap)) => bitmap,
            Ok(Err(err)) => {
                log::error!("❌ {} 光栅化失败：{}", editor_id, err);
                return Err(CaptureError::Rasterization(err));
            }
            Err(_) => {
                log::error!(
                    "❌ {} 光栅化超过 {}ms，放弃本次截图",
                    editor_id,
                    config.raster_timeout_ms
                );
                return Err(CaptureError::RenderTimeout {
                    stage: "rasterize",
                    budget_ms: config.raster_timeout_ms,
                });
            }
        };
        let rasterize = raster_start.elapsed();
        drop(clone);

        let timings = CaptureTimings {
            blur_settle: blur_settle.waited(),
            clone_settle,
            rasterize,
            total: total_start.elapsed(),
        };
        log::info!(
            "📸 截图完成 - {} target={:?} size={}x{} blur={}ms clone={}ms rasterize={}ms total={}ms",
            editor_id,
            target,
            bitmap.width(),
            bitmap.height(),
            timings.blur_settle.as_millis(),
            timings.clone_settle.as_millis(),
            timings.rasterize.as_millis(),
            timings.total.as_millis()
        );

        Ok(Snapshot {
            bitmap,
            content,
            target,
            editor: editor_id,
            captured_at: chrono::Local::now(),
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::LayoutRasterizer;

    fn coordinator() -> CaptureCoordinator {
        CaptureCoordinator::new(CaptureConfig::default(), Arc::new(LayoutRasterizer::new()))
            .expect("coordinator init failed")
    }

    #[test]
    fn rejects_invalid_initial_config() {
        let config = CaptureConfig {
            dpi_scale: -2.0,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            CaptureCoordinator::new(config, Arc::new(LayoutRasterizer::new())),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn settle_profile_switch_is_visible_in_snapshot() {
        let coordinator = coordinator();
        assert_eq!(coordinator.get_settle_profile().unwrap(), SettleProfile::Balanced);

        coordinator.set_settle_profile(SettleProfile::Patient).unwrap();
        let config = coordinator.config_snapshot().unwrap();
        assert_eq!(config.post_blur_settle_ms, 600);
        assert_eq!(config.clone_settle_ms, 250);
        assert_eq!(coordinator.get_settle_profile().unwrap(), SettleProfile::Patient);
    }

    #[test]
    fn set_config_keeps_previous_value_on_error() {
        let coordinator = coordinator();
        let bad = CaptureConfig {
            raster_timeout_ms: 0,
            ..CaptureConfig::default()
        };
        assert!(coordinator.set_config(bad).is_err());
        assert_eq!(coordinator.config_snapshot().unwrap(), CaptureConfig::default());
    }
}
