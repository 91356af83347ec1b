//! # 临时克隆（RAII）
//!
//! ## 设计思路
//!
//! 截图不能扰动用户正在编辑的控件，因此所有样式调整与光栅化都发生在一个
//! 离屏的深拷贝上。`EphemeralClone` 独占这份拷贝及其容器：
//! 构造时插入文档，`Drop` 时摘除并释放整棵子树。
//! 成功、失败、超时以及 future 被取消，回收都会发生，单次截图的克隆不会活过该次截图。
//!
//! ## 实现思路
//!
//! - 容器使用 `position:absolute` + 大负偏移放到视口之外，而不是隐藏；
//!   光栅化器会跳过隐藏元素。
//! - 拷贝失败时在同一次文档锁内回滚容器，保证不留下空容器。

use crate::dom::{DocumentHandle, DomError, NodeId, RenderTree};

/// 实际被光栅化的节点类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// 封装子树内的内容节点。
    InnerContent,
    /// 回退：克隆根节点。
    CloneRoot,
}

/// 单次截图独占的离屏克隆。
pub struct EphemeralClone {
    doc: DocumentHandle,
    container: NodeId,
    root: NodeId,
}

impl EphemeralClone {
    /// 创建离屏容器并深拷贝 `source`。
    pub fn create(doc: &DocumentHandle, source: NodeId, offset_px: i32) -> Result<Self, DomError> {
        let (container, root) = doc.try_with(|d| {
            let container = d.create_element("div");
            let offset = format!("{}px", offset_px);
            d.set_style(container, "position", "absolute")?;
            d.set_style(container, "left", &offset)?;
            d.set_style(container, "top", &offset)?;
            d.set_style(container, "width", "auto")?;
            d.set_style(container, "pointer-events", "none")?;
            let body = d.body();
            d.append_child(body, container)?;

            match d.deep_clone(source) {
                Ok(root) => Ok((container, root)),
                Err(err) => {
                    d.remove_subtree(container)?;
                    Err(err)
                }
            }
        })?;

        log::debug!("🧬 已创建离屏克隆 - container={} root={}", container, root);
        Ok(Self {
            doc: doc.clone(),
            container,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// 去掉宽度约束，让克隆按内容的固有宽度排版。
    pub fn relax_width(&self) -> Result<(), DomError> {
        let root = self.root;
        self.doc.try_with(|d| {
            d.set_style(root, "width", "auto")?;
            d.set_style(root, "max-width", "none")
        })
    }

    /// 把克隆插入离屏容器。
    pub fn attach(&self) -> Result<(), DomError> {
        let (container, root) = (self.container, self.root);
        self.doc.try_with(|d| d.append_child(container, root))
    }

    pub fn render_tree(&self) -> Result<RenderTree, DomError> {
        let root = self.root;
        self.doc.with(|d| d.render_tree(root))
    }

    /// 选出要光栅化的节点：优先封装子树内的内容节点，否则回退到克隆根。
    pub fn resolve_target(&self, selector: &str) -> Result<(NodeId, CaptureTarget), DomError> {
        let root = self.root;
        self.doc.with(|d| {
            match d.render_tree(root).query_inner_content_node(d, selector) {
                Some(inner) => (inner, CaptureTarget::InnerContent),
                None => (root, CaptureTarget::CloneRoot),
            }
        })
    }
}

impl Drop for EphemeralClone {
    fn drop(&mut self) {
        let (container, root) = (self.container, self.root);
        let result = self.doc.try_with(|d| {
            let mut removed = 0;
            for node in [container, root] {
                if d.contains(node) {
                    removed += d.remove_subtree(node)?;
                }
            }
            Ok(removed)
        });
        match result {
            Ok(removed) => log::debug!("🧹 离屏克隆已回收 - 释放 {} 个节点", removed),
            Err(err) => log::error!("❌ 离屏克隆回收失败：{}", err),
        }
    }
}
