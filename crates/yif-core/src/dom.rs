//! Document abstraction
//!
//! The engine reads and writes the page only through [`Document`]. The trait
//! covers exactly what filtering needs: element enumeration in document
//! order, tag/attribute reads, navigation for selector combinators, the
//! inline `display` value, the two autoplay corrections and the structural
//! watch switch.
//!
//! [`MemoryDocument`] is an arena-backed tree implementing the trait. It
//! buffers inserted elements while a watch is connected, the way a
//! `MutationObserver` queues records, so callers drain batches with
//! [`MemoryDocument::take_records`].

use std::cell::Cell;
use std::fmt;
use std::hash::Hash;

use crate::selector::Selector;

// =============================================================================
// Document Trait
// =============================================================================

/// Element tree the engine operates on.
pub trait Document {
    /// Stable element handle. Equality is element identity.
    type Node: Clone + Eq + Hash + fmt::Debug;

    /// Path component of the current location (e.g. `/feed/subscriptions`).
    fn route_path(&self) -> String;

    /// Connected elements in document order, optionally narrowed to one
    /// lowercase tag name.
    fn elements(&self, tag: Option<&str>) -> Vec<Self::Node>;

    /// Lowercase tag name.
    fn tag_name(&self, node: &Self::Node) -> String;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// Parent element, if any.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Previous element sibling, if any.
    fn previous_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Child elements in order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Is the element still attached to the document?
    fn is_connected(&self, node: &Self::Node) -> bool;

    /// Host-native selector query (`querySelectorAll`), in document order.
    ///
    /// `None` means the host has no native query or rejected the selector;
    /// callers then enumerate [`Document::elements`] and match themselves.
    fn query_selector_all(&self, _selector: &str) -> Option<Vec<Self::Node>> {
        None
    }

    /// Inline `display` value, `None` when the element has none.
    fn inline_display(&self, node: &Self::Node) -> Option<String>;

    /// Set (`Some`) or remove (`None`) the inline `display` value.
    fn set_inline_display(&mut self, node: &Self::Node, value: Option<&str>);

    /// Clear the native media autoplay attribute.
    fn clear_autoplay(&mut self, node: &Self::Node);

    /// Simulate a single user activation (click).
    fn activate(&mut self, node: &Self::Node);

    /// Start delivering insertion batches for the whole tree.
    fn connect_watch(&mut self);

    /// Stop delivering insertion batches and drop anything queued.
    fn disconnect_watch(&mut self);

    fn has_class(&self, node: &Self::Node, class: &str) -> bool {
        self.attribute(node, "class")
            .map_or(false, |value| value.split_ascii_whitespace().any(|c| c == class))
    }

    /// Nearest ancestor-or-self with the given tag.
    fn closest(&self, node: &Self::Node, tag: &str) -> Option<Self::Node> {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if self.tag_name(&candidate) == tag {
                return Some(candidate);
            }
            current = self.parent(&candidate);
        }
        None
    }
}

// =============================================================================
// In-memory Document
// =============================================================================

/// Handle into a [`MemoryDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed element tree.
///
/// Node 0 is the `html` root; [`MemoryDocument::body`] is its only child at
/// construction. Removed nodes stay in the arena, detached, so stale handles
/// remain valid.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<ElementData>,
    body: NodeId,
    path: String,
    watching: bool,
    records: Vec<NodeId>,
    activations: Vec<NodeId>,
    native_queries: bool,
    query_calls: Cell<usize>,
}

impl MemoryDocument {
    /// Create an empty `html > body` document at the given route path.
    pub fn new(path: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            path: path.to_string(),
            watching: false,
            records: Vec::new(),
            activations: Vec::new(),
            native_queries: false,
            query_calls: Cell::new(0),
        };
        let root = doc.create_element("html", &[]);
        let body = doc.create_element("body", &[]);
        doc.attach(root, body);
        doc.body = body;
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn set_route_path(&mut self, path: &str) {
        self.path = path.to_string();
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                .collect(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` under `parent`, detaching it from any previous parent.
    ///
    /// When a watch is connected and the insertion point is connected, the
    /// child is queued as an inserted subtree.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.attach(parent, child);
        if self.watching && self.is_connected(parent) {
            self.records.push(child);
        }
    }

    /// Create an element and append it in one step.
    pub fn append(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let child = self.create_element(tag, attrs);
        self.append_child(parent, child);
        child
    }

    /// Detach a subtree from the tree. The handle stays valid.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let attrs = &mut self.nodes[node.index()].attrs;
        match attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attrs.push((name, value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.nodes[node.index()].attrs.retain(|(n, _)| n != name);
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.index()]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Is the node reachable from the root?
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes[current.index()].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Drain queued insertion records.
    pub fn take_records(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.records)
    }

    /// Elements activated through [`Document::activate`], in order.
    pub fn activations(&self) -> &[NodeId] {
        &self.activations
    }

    /// Answer [`Document::query_selector_all`] like a browser would.
    /// Off by default, so callers exercise their own matching.
    pub fn set_native_queries(&mut self, enabled: bool) {
        self.native_queries = enabled;
    }

    /// Native queries answered so far.
    pub fn query_calls(&self) -> usize {
        self.query_calls.get()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|c| *c != node);
        }
    }

    fn collect_elements(&self, node: NodeId, tag: Option<&str>, out: &mut Vec<NodeId>) {
        let data = &self.nodes[node.index()];
        if tag.map_or(true, |t| data.tag == t) {
            out.push(node);
        }
        for child in &data.children {
            self.collect_elements(*child, tag, out);
        }
    }
}

impl Document for MemoryDocument {
    type Node = NodeId;

    fn route_path(&self) -> String {
        self.path.clone()
    }

    fn elements(&self, tag: Option<&str>) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements(self.root(), tag, &mut out);
        out
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.nodes[node.index()].tag.clone()
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.get_attribute(*node, name).map(str::to_string)
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    fn previous_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.index()].parent?;
        let siblings = &self.nodes[parent.index()].children;
        let pos = siblings.iter().position(|c| c == node)?;
        pos.checked_sub(1).map(|i| siblings[i])
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes[node.index()].children.clone()
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        MemoryDocument::is_connected(self, *node)
    }

    fn query_selector_all(&self, selector: &str) -> Option<Vec<NodeId>> {
        if !self.native_queries {
            return None;
        }
        let selector = Selector::parse(selector).ok()?;
        self.query_calls.set(self.query_calls.get() + 1);
        Some(
            self.elements(selector.key_tag())
                .into_iter()
                .filter(|node| selector.matches(self, node))
                .collect(),
        )
    }

    fn inline_display(&self, node: &NodeId) -> Option<String> {
        let style = self.get_attribute(*node, "style")?;
        style_declarations(style)
            .filter(|(prop, _)| prop.eq_ignore_ascii_case("display"))
            .map(|(_, value)| value.to_string())
            .last()
    }

    fn set_inline_display(&mut self, node: &NodeId, value: Option<&str>) {
        let mut decls: Vec<String> = self
            .get_attribute(*node, "style")
            .map(|style| {
                style_declarations(style)
                    .filter(|(prop, _)| !prop.eq_ignore_ascii_case("display"))
                    .map(|(prop, value)| format!("{prop}: {value}"))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(value) = value {
            decls.push(format!("display: {value}"));
        }

        if decls.is_empty() {
            self.remove_attribute(*node, "style");
        } else {
            self.set_attribute(*node, "style", &format!("{};", decls.join("; ")));
        }
    }

    fn clear_autoplay(&mut self, node: &NodeId) {
        self.remove_attribute(*node, "autoplay");
    }

    /// Toggle-style controls flip `aria-pressed` like the host page does.
    fn activate(&mut self, node: &NodeId) {
        self.activations.push(*node);
        match self.get_attribute(*node, "aria-pressed") {
            Some("true") => self.set_attribute(*node, "aria-pressed", "false"),
            Some("false") => self.set_attribute(*node, "aria-pressed", "true"),
            _ => {}
        }
    }

    fn connect_watch(&mut self) {
        self.watching = true;
    }

    fn disconnect_watch(&mut self) {
        self.watching = false;
        self.records.clear();
    }
}

/// Split an inline style attribute into `(property, value)` pairs.
fn style_declarations(style: &str) -> impl Iterator<Item = (&str, &str)> {
    style.split(';').filter_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        let prop = prop.trim();
        let value = value.trim();
        if prop.is_empty() {
            None
        } else {
            Some((prop, value))
        }
    })
}
