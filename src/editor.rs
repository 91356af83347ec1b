//! # 公式编辑器句柄（editor）
//!
//! ## 设计思路
//!
//! 截图流水线把第三方公式编辑控件视为外部协作者，只通过 [`EditorHandle`] 访问：
//! 读取 LaTeX 内容、失焦、订阅内容变化、拿到可深拷贝的宿主节点，
//! 以及请求控件的渲染器把某个值渲染进克隆节点的封装子树。
//!
//! 控件渲染是异步的，且不提供“渲染完成”事件；`is_render_settled` 是可选探针，
//! 平台给不出信号时返回 `None`，调用方只能退回固定等待。
//!
//! ## 实现思路
//!
//! [`MathField`] 是内存中的参考控件，供命令行与测试使用：
//! - 宿主元素为 `math-field`，默认 `width:100%` 与 4px 内边距，轻 DOM 里保存 LaTeX 文本
//! - 封装子树里渲染 `.ML__content` 节点；聚焦时额外渲染 `.ML__caret`
//! - 每次状态变化都在 `render_latency` 之后异步重绘（tokio 任务）；
//!   没有运行时时同步重绘
//! - 内容变化通过 `tokio::sync::watch` 广播

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::dom::{Document, DocumentHandle, DomError, NodeId, RenderTree};

/// 内容节点的类名，截图时优先光栅化该节点。
pub const CONTENT_CLASS: &str = "ML__content";
/// 聚焦时渲染的光标节点类名。
pub const CARET_CLASS: &str = "ML__caret";

static NEXT_EDITOR_ID: AtomicU64 = AtomicU64::new(1);

/// 编辑器实例标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditorId(u64);

impl EditorId {
    pub fn next() -> Self {
        Self(NEXT_EDITOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for EditorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "editor-{}", self.0)
    }
}

/// 公式编辑控件的外部接口。
pub trait EditorHandle: Send + Sync {
    fn id(&self) -> EditorId;

    /// 控件所在文档。
    fn document(&self) -> &DocumentHandle;

    /// 宿主节点；控件未挂载时为 `None`。
    fn root(&self) -> Option<NodeId>;

    /// 当前内容（LaTeX）。
    fn content(&self) -> String;

    fn blur(&self);

    fn is_focused(&self) -> bool;

    /// 内容变化通知。
    fn subscribe(&self) -> watch::Receiver<String>;

    /// 把 `value` 同步写入克隆节点的轻 DOM，使克隆根本身与给定内容一致。
    ///
    /// 深拷贝复制的是拷贝时刻的实时内容；回退到克隆根截图时，以这里写入的值为准。
    fn pin_clone_content(&self, clone: NodeId, value: &str) -> Result<(), DomError>;

    /// 请求控件渲染器把 `value` 渲染进克隆节点的封装子树。
    ///
    /// 渲染异步完成，没有完成信号。
    fn assign_clone_value(&self, clone: NodeId, value: &str) -> Result<(), DomError>;

    /// 渲染是否已落定；平台不提供该信号时返回 `None`。
    fn is_render_settled(&self) -> Option<bool> {
        None
    }
}

/// `MathField` 构造参数。
#[derive(Debug, Clone)]
pub struct MathFieldOptions {
    /// 状态变化到封装子树更新之间的延迟。
    pub render_latency: Duration,
    /// 是否挂载封装渲染子树；为 `false` 时模拟渲染器尚未初始化的控件。
    pub render_tree: bool,
    /// 是否暴露渲染落定探针。
    pub expose_settle_probe: bool,
}

impl Default for MathFieldOptions {
    fn default() -> Self {
        Self {
            render_latency: Duration::from_millis(30),
            render_tree: true,
            expose_settle_probe: false,
        }
    }
}

struct MathFieldInner {
    id: EditorId,
    doc: DocumentHandle,
    host: Mutex<Option<NodeId>>,
    light_text: NodeId,
    focused: AtomicBool,
    pending_renders: AtomicUsize,
    content_tx: watch::Sender<String>,
    options: MathFieldOptions,
}

/// 内存中的参考公式编辑控件。
#[derive(Clone)]
pub struct MathField {
    inner: Arc<MathFieldInner>,
}

/// 把 `value` 渲染进宿主的封装子树（整体替换）。
fn render_into(doc: &mut Document, host: NodeId, value: &str, focused: bool) -> Result<(), DomError> {
    let RenderTree::Present(root) = doc.render_tree(host) else {
        return Ok(());
    };
    for child in doc.children(root).to_vec() {
        doc.remove_subtree(child)?;
    }

    let content = doc.create_element("span");
    doc.add_class(content, CONTENT_CLASS)?;
    doc.set_style(content, "padding", "2px")?;
    let text = doc.create_text(value);
    doc.append_child(content, text)?;
    doc.append_child(root, content)?;

    if focused {
        let caret = doc.create_element("span");
        doc.add_class(caret, CARET_CLASS)?;
        let bar = doc.create_text("|");
        doc.append_child(caret, bar)?;
        doc.append_child(content, caret)?;
    }
    Ok(())
}

impl MathField {
    /// 创建控件并挂载到 `parent` 下。
    pub fn mount(doc: &DocumentHandle, parent: NodeId, options: MathFieldOptions) -> Result<Self, DomError> {
        let (host, light_text) = doc.try_with(|d| {
            let host = d.create_element("math-field");
            d.set_style(host, "width", "100%")?;
            d.set_style(host, "display", "block")?;
            d.set_style(host, "padding", "4px")?;
            let light_text = d.create_text("");
            d.append_child(host, light_text)?;
            if options.render_tree {
                d.attach_shadow(host)?;
                render_into(d, host, "", false)?;
            }
            d.append_child(parent, host)?;
            Ok((host, light_text))
        })?;

        let (content_tx, _) = watch::channel(String::new());
        let field = Self {
            inner: Arc::new(MathFieldInner {
                id: EditorId::next(),
                doc: doc.clone(),
                host: Mutex::new(Some(host)),
                light_text,
                focused: AtomicBool::new(false),
                pending_renders: AtomicUsize::new(0),
                content_tx,
                options,
            }),
        };
        log::debug!("🧮 编辑器已挂载 - {} host={}", field.inner.id, host);
        Ok(field)
    }

    fn host(&self) -> Option<NodeId> {
        self.inner.host.lock().ok().and_then(|guard| *guard)
    }

    pub fn set_value(&self, value: &str) -> Result<(), DomError> {
        if let Some(host) = self.host() {
            let light_text = self.inner.light_text;
            self.inner.doc.try_with(|d| {
                if d.contains(host) {
                    d.set_text(light_text, value)?;
                }
                Ok(())
            })?;
        }
        self.inner.content_tx.send_replace(value.to_string());
        self.schedule_live_render();
        Ok(())
    }

    pub fn clear(&self) -> Result<(), DomError> {
        self.set_value("")
    }

    pub fn focus(&self) {
        self.inner.focused.store(true, Ordering::SeqCst);
        self.schedule_live_render();
    }

    /// 从文档中移除控件；之后 `root()` 返回 `None`。
    pub fn unmount(&self) -> Result<(), DomError> {
        let host = match self.inner.host.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => return Err(DomError::Poisoned),
        };
        if let Some(host) = host {
            self.inner.doc.try_with(|d| d.remove_subtree(host))?;
        }
        Ok(())
    }

    /// 按当前状态重绘宿主；延迟到期时读取最新状态，因此乱序完成也只会得到最终状态。
    fn schedule_live_render(&self) {
        let Some(host) = self.host() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let render = move |inner: &MathFieldInner| {
            let value = inner.content_tx.borrow().clone();
            let focused = inner.focused.load(Ordering::SeqCst);
            let result = inner.doc.try_with(|d| {
                if !d.contains(host) {
                    return Ok(());
                }
                render_into(d, host, &value, focused)
            });
            if let Err(err) = result {
                log::warn!("⚠️ 编辑器重绘失败 - {}：{}", inner.id, err);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                inner.pending_renders.fetch_add(1, Ordering::SeqCst);
                let latency = inner.options.render_latency;
                runtime.spawn(async move {
                    tokio::time::sleep(latency).await;
                    render(&*inner);
                    inner.pending_renders.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(_) => render(&*inner),
        }
    }
}

impl EditorHandle for MathField {
    fn id(&self) -> EditorId {
        self.inner.id
    }

    fn document(&self) -> &DocumentHandle {
        &self.inner.doc
    }

    fn root(&self) -> Option<NodeId> {
        self.host()
    }

    fn content(&self) -> String {
        self.inner.content_tx.borrow().clone()
    }

    fn blur(&self) {
        if self.inner.focused.swap(false, Ordering::SeqCst) {
            log::debug!("🔕 编辑器失焦 - {}", self.inner.id);
        }
        self.schedule_live_render();
    }

    fn is_focused(&self) -> bool {
        self.inner.focused.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> watch::Receiver<String> {
        self.inner.content_tx.subscribe()
    }

    fn pin_clone_content(&self, clone: NodeId, value: &str) -> Result<(), DomError> {
        self.inner.doc.try_with(|d| {
            let light_text = d
                .children(clone)
                .iter()
                .copied()
                .find(|child| d.text(*child).is_some());
            match light_text {
                Some(text) => d.set_text(text, value),
                None => {
                    let text = d.create_text(value);
                    d.append_child(clone, text)
                }
            }
        })
    }

    fn assign_clone_value(&self, clone: NodeId, value: &str) -> Result<(), DomError> {
        let doc = self.inner.doc.clone();
        let has_tree = doc.with(|d| d.render_tree(clone).has_inner_render_tree())?;
        if !has_tree {
            return Ok(());
        }

        let value = value.to_string();
        let render = move |doc: &DocumentHandle| {
            // 克隆可能已被回收，此时渲染直接作废
            let result = doc.try_with(|d| {
                if !d.contains(clone) {
                    return Ok(());
                }
                render_into(d, clone, &value, false)
            });
            if let Err(err) = result {
                log::debug!("克隆节点渲染作废：{}", err);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let latency = self.inner.options.render_latency;
                runtime.spawn(async move {
                    tokio::time::sleep(latency).await;
                    render(&doc);
                });
            }
            Err(_) => render(&doc),
        }
        Ok(())
    }

    fn is_render_settled(&self) -> Option<bool> {
        self.inner
            .options
            .expose_settle_probe
            .then(|| self.inner.pending_renders.load(Ordering::SeqCst) == 0)
    }
}
