//! Live DOM bindings: the page as a [`Document`], `setTimeout` as a
//! [`Scheduler`], and a `log` backend writing to the browser console.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::time::Duration;

use js_sys::{Array, Object, WeakMap};
use wasm_bindgen::prelude::*;
use web_sys::{
    Element, HtmlElement, HtmlMediaElement, MutationObserver, MutationObserverInit, MutationRecord,
    Window,
};
use yif_core::dom::Document;
use yif_core::watch::{Scheduler, TaskId};

/// Receives the element roots added by one mutation batch.
pub type InsertedSink = Rc<dyn Fn(Vec<Element>)>;

/// Receives the id of a timer that fired.
pub type TaskSink = Rc<dyn Fn(TaskId)>;

type ObserverCallback = Closure<dyn FnMut(Array, MutationObserver)>;

// =============================================================================
// Node Handle
// =============================================================================

/// Element plus a stable per-element id.
///
/// JS objects have no hashable identity on the Rust side, so each element is
/// tagged with an id through a `WeakMap` the first time it is seen.
#[derive(Debug, Clone)]
pub struct DomNode {
    id: u32,
    element: Element,
}

impl DomNode {
    pub fn element(&self) -> &Element {
        &self.element
    }
}

impl PartialEq for DomNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DomNode {}

impl Hash for DomNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// =============================================================================
// Browser Document
// =============================================================================

pub struct BrowserDocument {
    window: Window,
    document: web_sys::Document,
    ids: WeakMap,
    next_id: Cell<u32>,
    on_inserted: InsertedSink,
    callback: Option<ObserverCallback>,
    observer: Option<MutationObserver>,
}

impl BrowserDocument {
    pub fn new(window: Window, document: web_sys::Document, on_inserted: InsertedSink) -> Self {
        Self {
            window,
            document,
            ids: WeakMap::new(),
            next_id: Cell::new(0),
            on_inserted,
            callback: None,
            observer: None,
        }
    }

    /// Handle for an element, assigning an id on first sight.
    pub fn node(&self, element: Element) -> DomNode {
        let key: &Object = element.as_ref();
        let id = match self.ids.get(key).as_f64() {
            Some(id) => id as u32,
            None => {
                let id = self.next_id.get();
                self.next_id.set(id.wrapping_add(1));
                self.ids.set(key, &JsValue::from(id));
                id
            }
        };
        DomNode { id, element }
    }

    fn collect(&self, collection: web_sys::HtmlCollection) -> Vec<DomNode> {
        (0..collection.length())
            .filter_map(|i| collection.item(i))
            .map(|element| self.node(element))
            .collect()
    }

    fn observer_callback(&mut self) -> &ObserverCallback {
        let on_inserted = Rc::clone(&self.on_inserted);
        self.callback.get_or_insert_with(|| {
            Closure::new(move |records: Array, _observer: MutationObserver| {
                on_inserted(added_elements(&records));
            })
        })
    }
}

/// Element nodes added across a batch of mutation records. Text and comment
/// nodes are dropped.
fn added_elements(records: &Array) -> Vec<Element> {
    let mut elements = Vec::new();
    for record in records.iter() {
        let Ok(record) = record.dyn_into::<MutationRecord>() else {
            continue;
        };
        let added = record.added_nodes();
        for i in 0..added.length() {
            if let Some(element) = added.get(i).and_then(|node| node.dyn_into::<Element>().ok()) {
                elements.push(element);
            }
        }
    }
    elements
}

impl Document for BrowserDocument {
    type Node = DomNode;

    fn route_path(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn elements(&self, tag: Option<&str>) -> Vec<DomNode> {
        self.collect(self.document.get_elements_by_tag_name(tag.unwrap_or("*")))
    }

    fn tag_name(&self, node: &DomNode) -> String {
        node.element.local_name()
    }

    fn attribute(&self, node: &DomNode, name: &str) -> Option<String> {
        node.element.get_attribute(name)
    }

    fn parent(&self, node: &DomNode) -> Option<DomNode> {
        node.element.parent_element().map(|element| self.node(element))
    }

    fn previous_sibling(&self, node: &DomNode) -> Option<DomNode> {
        node.element
            .previous_element_sibling()
            .map(|element| self.node(element))
    }

    fn children(&self, node: &DomNode) -> Vec<DomNode> {
        self.collect(node.element.children())
    }

    fn is_connected(&self, node: &DomNode) -> bool {
        node.element.is_connected()
    }

    /// Only the matched elements get an id, not every element on the page.
    fn query_selector_all(&self, selector: &str) -> Option<Vec<DomNode>> {
        let list = match self.document.query_selector_all(selector) {
            Ok(list) => list,
            Err(e) => {
                log::debug!("Native query for '{}' rejected: {:?}", selector, e);
                return None;
            }
        };
        Some(
            (0..list.length())
                .filter_map(|i| list.get(i))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .map(|element| self.node(element))
                .collect(),
        )
    }

    fn inline_display(&self, node: &DomNode) -> Option<String> {
        let element = node.element.dyn_ref::<HtmlElement>()?;
        element
            .style()
            .get_property_value("display")
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn set_inline_display(&mut self, node: &DomNode, value: Option<&str>) {
        let Some(element) = node.element.dyn_ref::<HtmlElement>() else {
            return;
        };
        let style = element.style();
        let result = match value {
            Some(value) => style.set_property("display", value),
            None => style.remove_property("display").map(|_| ()),
        };
        if let Err(e) = result {
            log::debug!("Updating inline display failed: {:?}", e);
        }
    }

    fn clear_autoplay(&mut self, node: &DomNode) {
        if let Some(media) = node.element.dyn_ref::<HtmlMediaElement>() {
            media.set_autoplay(false);
        }
        if let Err(e) = node.element.remove_attribute("autoplay") {
            log::debug!("Removing autoplay attribute failed: {:?}", e);
        }
    }

    fn activate(&mut self, node: &DomNode) {
        if let Some(element) = node.element.dyn_ref::<HtmlElement>() {
            element.click();
        }
    }

    fn connect_watch(&mut self) {
        if self.observer.is_some() {
            return;
        }
        let Some(body) = self.document.body() else {
            log::warn!("No document body to observe");
            return;
        };

        let observer = match MutationObserver::new(self.observer_callback().as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                log::warn!("Creating MutationObserver failed: {:?}", e);
                return;
            }
        };

        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        if let Err(e) = observer.observe_with_options(&body, &options) {
            log::warn!("Observing document body failed: {:?}", e);
            return;
        }
        self.observer = Some(observer);
    }

    fn disconnect_watch(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}

// =============================================================================
// Timeout Scheduler
// =============================================================================

/// [`Scheduler`] backed by `window.setTimeout`.
///
/// A fired timer hands its id to the sink; the engine ignores ids it no
/// longer waits for, so a timer that fires after cancellation is harmless.
pub struct TimeoutScheduler {
    window: Window,
    next_id: u64,
    handles: HashMap<TaskId, i32>,
    on_fire: TaskSink,
}

impl TimeoutScheduler {
    pub fn new(window: Window, on_fire: TaskSink) -> Self {
        Self {
            window,
            next_id: 0,
            handles: HashMap::new(),
            on_fire,
        }
    }

    /// Forget the browser handle of a timer that already ran.
    pub fn fired(&mut self, task: TaskId) {
        self.handles.remove(&task);
    }
}

impl Scheduler for TimeoutScheduler {
    fn schedule(&mut self, delay: Duration) -> TaskId {
        let task = TaskId(self.next_id);
        self.next_id += 1;

        let on_fire = Rc::clone(&self.on_fire);
        let callback = Closure::once_into_js(move || on_fire(task));
        let timeout = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);

        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), timeout)
        {
            Ok(handle) => {
                self.handles.insert(task, handle);
            }
            Err(e) => log::warn!("setTimeout failed: {:?}", e),
        }
        task
    }

    fn cancel(&mut self, task: TaskId) {
        if let Some(handle) = self.handles.remove(&task) {
            self.window.clear_timeout_with_handle(handle);
        }
    }
}

// =============================================================================
// Console Logger
// =============================================================================

/// `log` backend forwarding to `console.*`.
pub struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[intention-filter] {}", record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}
