//! # 宿主文档模型（dom）
//!
//! ## 设计思路
//!
//! 截图流水线需要一个可操作的“宿主文档”：可以深拷贝编辑器节点、插入离屏容器、
//! 访问编辑器内部封装的渲染子树（shadow root），并在结束后完整回收。
//! 这里用一个基于 arena 的轻量文档模型承载这些能力，不依赖任何浏览器环境。
//!
//! ## 实现思路
//!
//! - 所有节点存放在槽位数组中，`NodeId` = 下标 + 代数。释放的槽位进入空闲链表供后续复用，
//!   同时代数加一；迟到的异步渲染拿着旧 `NodeId` 只会得到 `UnknownNode`，不会写进复用该槽位的新节点。
//!   长时间会话里反复截图、反复重绘，槽位数组只随同时存活的节点数增长。
//! - 封装子树（`ShadowRoot`）是宿主元素的独立子节点列表，只能通过 [`RenderTree`]
//!   能力接口访问，普通的子节点遍历不会穿透它。
//! - `deep_clone` 只复制“轻 DOM”；被复制的宿主元素会得到一个全新的空封装子树，
//!   对应自定义元素构造时自行挂载 shadow root 的行为，内部渲染状态不会被复制。
//! - `DocumentHandle` 以 `Arc<Mutex<Document>>` 共享文档，锁中毒时返回
//!   `DomError::Poisoned` 而不是 panic。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// 文档操作错误。
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("节点不存在：{0}")]
    UnknownNode(NodeId),

    #[error("节点不是元素：{0}")]
    NotAnElement(NodeId),

    #[error("层级结构错误：{0}")]
    HierarchyRequest(String),

    #[error("元素已挂载封装子树：{0}")]
    ShadowRootExists(NodeId),

    #[error("不支持的选择器：{0}")]
    UnsupportedSelector(String),

    #[error("文档锁已中毒")]
    Poisoned,
}

/// 文档节点标识（槽位下标 + 代数）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    classes: Vec<String>,
    style: BTreeMap<String, String>,
    shadow_root: Option<NodeId>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(ElementData),
    Text(String),
    /// 封装渲染子树的根，`host` 指回宿主元素。
    ShadowRoot { host: NodeId },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// 封装渲染子树的能力接口。
///
/// 两个分支显式处理：存在时可以在子树内查询内容节点，不存在时调用方回退到宿主本身。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTree {
    Present(NodeId),
    Absent,
}

impl RenderTree {
    pub fn has_inner_render_tree(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// 在封装子树内查询内容节点；子树不存在或选择器不受支持时返回 `None`。
    pub fn query_inner_content_node(&self, doc: &Document, selector: &str) -> Option<NodeId> {
        let Self::Present(root) = self else {
            return None;
        };
        match doc.query_selector(*root, selector) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("⚠️ 封装子树查询失败：{}", err);
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// 宿主文档。
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let body = Node {
            kind: NodeKind::Element(ElementData {
                tag: "body".to_string(),
                classes: Vec::new(),
                style: BTreeMap::new(),
                shadow_root: None,
            }),
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(body),
            }],
            free: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// 当前存活的节点数（含 body 与封装子树根）。
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// 已分配的槽位数（存活节点 + 空闲槽位）。
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// 释放槽位并递增代数，旧 `NodeId` 随之失效。
    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DomError::UnknownNode(id))
    }

    fn element(&self, id: NodeId) -> Result<&ElementData, DomError> {
        match &self.node(id)?.kind {
            NodeKind::Element(data) => Ok(data),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(data) => Ok(data),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Element(ElementData {
                tag: tag.to_ascii_lowercase(),
                classes: Vec::new(),
                style: BTreeMap::new(),
                shadow_root: None,
            }),
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_ok()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).ok().map(|data| data.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(text) => {
                *text = value.to_string();
                Ok(())
            }
            _ => Err(DomError::HierarchyRequest(format!("{} 不是文本节点", id))),
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let data = self.element_mut(id)?;
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
        }
        Ok(())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .map(|data| data.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?
            .style
            .insert(property.to_string(), value.trim().to_string());
        Ok(())
    }

    pub fn remove_style(&mut self, id: NodeId, property: &str) -> Result<(), DomError> {
        self.element_mut(id)?.style.remove(property);
        Ok(())
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.element(id)
            .ok()
            .and_then(|data| data.style.get(property))
            .map(|value| value.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// 封装子树根对应的宿主元素。
    pub fn host(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).ok()?.kind {
            NodeKind::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    pub fn is_shadow_root(&self, id: NodeId) -> bool {
        self.host(id).is_some()
    }

    /// 为元素挂载一个空的封装子树。
    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId, DomError> {
        if self.element(host)?.shadow_root.is_some() {
            return Err(DomError::ShadowRootExists(host));
        }
        let root = self.insert(Node {
            kind: NodeKind::ShadowRoot { host },
            parent: None,
            children: Vec::new(),
        });
        self.element_mut(host)?.shadow_root = Some(root);
        Ok(root)
    }

    pub fn render_tree(&self, host: NodeId) -> RenderTree {
        match self.element(host).ok().and_then(|data| data.shadow_root) {
            Some(root) => RenderTree::Present(root),
            None => RenderTree::Absent,
        }
    }

    /// 判断 `ancestor` 是否在 `node` 的祖先链上（跨越封装子树边界）。
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id).or_else(|| self.host(id));
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if matches!(self.node(parent)?.kind, NodeKind::Text(_)) {
            return Err(DomError::HierarchyRequest(format!(
                "文本节点 {} 不能包含子节点",
                parent
            )));
        }
        if self.is_shadow_root(child) {
            return Err(DomError::HierarchyRequest(format!(
                "封装子树根 {} 不能作为普通子节点",
                child
            )));
        }
        if child == self.body {
            return Err(DomError::HierarchyRequest("body 不能被移动".to_string()));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "{} 是 {} 的祖先，插入会形成环",
                child, parent
            )));
        }

        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// 将节点从父节点上摘下（节点本身保留，可再次插入）。
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|child| *child != id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// 摘下并释放整棵子树（含封装子树），返回释放的节点数。
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize, DomError> {
        if id == self.body {
            return Err(DomError::HierarchyRequest("body 不能被移除".to_string()));
        }
        self.detach(id)?;

        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            let Some(node) = self.release(current) else {
                continue;
            };
            stack.extend(node.children.iter().copied());
            if let NodeKind::Element(ElementData {
                shadow_root: Some(root),
                ..
            }) = node.kind
            {
                stack.push(root);
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// 深拷贝轻 DOM 子树，返回未挂载的新根。
    ///
    /// 被拷贝的宿主元素会得到一个空的封装子树；原子树中的渲染内容不会被复制。
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId, DomError> {
        let source = self.node(id)?.clone();
        let new_id = match &source.kind {
            NodeKind::Text(text) => self.create_text(text),
            NodeKind::ShadowRoot { .. } => {
                return Err(DomError::HierarchyRequest(format!(
                    "封装子树根 {} 不能被直接拷贝",
                    id
                )));
            }
            NodeKind::Element(data) => {
                let copy = self.insert(Node {
                    kind: NodeKind::Element(ElementData {
                        tag: data.tag.clone(),
                        classes: data.classes.clone(),
                        style: data.style.clone(),
                        shadow_root: None,
                    }),
                    parent: None,
                    children: Vec::new(),
                });
                if data.shadow_root.is_some() {
                    self.attach_shadow(copy)?;
                }
                copy
            }
        };

        for child in source.children {
            let child_copy = self.deep_clone(child)?;
            self.node_mut(child_copy)?.parent = Some(new_id);
            self.node_mut(new_id)?.children.push(child_copy);
        }
        Ok(new_id)
    }

    /// 节点是否连接到 body（跨越封装子树边界向上查找）。
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_inclusive_ancestor(self.body, id)
    }

    /// 在 `scope` 的子树内（不穿透嵌套封装子树）查找第一个匹配节点。
    ///
    /// 仅支持 `.class` 与标签名两种简单选择器。
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let selector = selector.trim();
        let matcher: Box<dyn Fn(NodeId) -> bool + '_> = if let Some(class) = selector.strip_prefix('.') {
            if class.is_empty() || !is_simple_ident(class) {
                return Err(DomError::UnsupportedSelector(selector.to_string()));
            }
            let class = class.to_string();
            Box::new(move |id| self.has_class(id, &class))
        } else if is_simple_ident(selector) {
            let tag = selector.to_ascii_lowercase();
            Box::new(move |id| self.tag(id) == Some(tag.as_str()))
        } else {
            return Err(DomError::UnsupportedSelector(selector.to_string()));
        };

        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if matcher(id) {
                return Ok(Some(id));
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        Ok(None)
    }

    /// 子树内全部文本拼接（不含封装子树）。
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(text) = self.text(current) {
                out.push_str(text);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }
}

fn is_simple_ident(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 可跨任务共享的文档句柄。
#[derive(Debug, Clone, Default)]
pub struct DocumentHandle(Arc<Mutex<Document>>);

impl DocumentHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在文档锁内执行一次读写操作。锁不会跨越 `.await` 持有。
    pub fn with<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Result<R, DomError> {
        let mut guard = self.0.lock().map_err(|_| DomError::Poisoned)?;
        Ok(f(&mut guard))
    }

    pub fn try_with<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, DomError>,
    ) -> Result<R, DomError> {
        self.with(f)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_content(doc: &mut Document) -> (NodeId, NodeId) {
        let host = doc.create_element("math-field");
        doc.set_style(host, "width", "100%").unwrap();
        let text = doc.create_text("x^2");
        doc.append_child(host, text).unwrap();
        let root = doc.attach_shadow(host).unwrap();
        let content = doc.create_element("span");
        doc.add_class(content, "ML__content").unwrap();
        doc.append_child(root, content).unwrap();
        (host, content)
    }

    #[test]
    fn deep_clone_copies_light_tree_but_not_render_tree_content() {
        let mut doc = Document::new();
        let (host, _) = host_with_content(&mut doc);

        let copy = doc.deep_clone(host).unwrap();
        assert_eq!(doc.tag(copy), Some("math-field"));
        assert_eq!(doc.style(copy, "width"), Some("100%"));
        assert_eq!(doc.text_content(copy), "x^2");

        let tree = doc.render_tree(copy);
        assert!(tree.has_inner_render_tree());
        assert_eq!(tree.query_inner_content_node(&doc, ".ML__content"), None);
        assert!(!doc.is_connected(copy));
    }

    #[test]
    fn query_does_not_pierce_render_tree_from_light_scope() {
        let mut doc = Document::new();
        let (host, content) = host_with_content(&mut doc);
        assert_eq!(doc.query_selector(host, ".ML__content").unwrap(), None);

        let tree = doc.render_tree(host);
        assert_eq!(tree.query_inner_content_node(&doc, ".ML__content"), Some(content));
    }

    #[test]
    fn connection_crosses_shadow_boundary() {
        let mut doc = Document::new();
        let (host, content) = host_with_content(&mut doc);
        assert!(!doc.is_connected(content));

        let body = doc.body();
        doc.append_child(body, host).unwrap();
        assert!(doc.is_connected(content));
    }

    #[test]
    fn remove_subtree_frees_every_node() {
        let mut doc = Document::new();
        let baseline = doc.node_count();
        let (host, _) = host_with_content(&mut doc);
        let body = doc.body();
        doc.append_child(body, host).unwrap();

        let removed = doc.remove_subtree(host).unwrap();
        assert_eq!(removed, 4);
        assert_eq!(doc.node_count(), baseline);
        assert!(doc.children(body).is_empty());
    }

    #[test]
    fn append_child_rejects_cycles() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();

        let result = doc.append_child(inner, outer);
        assert!(matches!(result, Err(DomError::HierarchyRequest(_))));
    }

    #[test]
    fn unsupported_selector_is_reported() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let result = doc.query_selector(div, "div > span");
        assert!(matches!(result, Err(DomError::UnsupportedSelector(_))));
    }

    #[test]
    fn freed_slots_are_reused_but_stale_ids_are_rejected() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let slots = doc.slot_count();
        doc.remove_subtree(a).unwrap();

        let b = doc.create_element("div");
        assert_eq!(b.index, a.index);
        assert_eq!(doc.slot_count(), slots);
        assert_ne!(a, b);
        assert!(!doc.contains(a));
        assert!(doc.contains(b));
        assert!(matches!(doc.set_style(a, "width", "1px"), Err(DomError::UnknownNode(_))));
        assert_eq!(doc.style(b, "width"), None);
    }

    #[test]
    fn churn_does_not_grow_the_arena() {
        let mut doc = Document::new();
        let body = doc.body();
        let (host, _) = host_with_content(&mut doc);
        doc.append_child(body, host).unwrap();
        let mut peak = None;

        for _ in 0..50 {
            let copy = doc.deep_clone(host).unwrap();
            doc.append_child(body, copy).unwrap();
            doc.remove_subtree(copy).unwrap();
            let slots = doc.slot_count();
            assert!(peak.is_none_or(|p| p == slots));
            peak = Some(slots);
        }
    }
}
