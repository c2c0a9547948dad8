//! Saved HTML pages loaded into a [`MemoryDocument`].
//!
//! Tokenizer-only build: no tree-construction quirks, just open/close
//! bookkeeping with void elements and raw-text elements handled.

use std::cell::RefCell;

use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use markup5ever::interface::Attribute;
use tendril::StrTendril;
use yif_core::dom::{Document, MemoryDocument, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct TreeSink {
    state: RefCell<TreeState>,
}

struct TreeState {
    doc: MemoryDocument,
    open: Vec<NodeId>,
}

impl TokenSink for TreeSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line: u64) -> TokenSinkResult<()> {
        if let Token::TagToken(Tag {
            kind,
            name,
            self_closing,
            attrs,
            ..
        }) = token
        {
            let name: &str = &name;
            let mut state = self.state.borrow_mut();
            match kind {
                TagKind::StartTag => {
                    state.open_element(name, &attrs, self_closing);
                    return raw_text_kind(name, self_closing)
                        .map_or(TokenSinkResult::Continue, TokenSinkResult::RawData);
                }
                TagKind::EndTag => state.close_element(name),
            }
        }
        TokenSinkResult::Continue
    }
}

impl TreeState {
    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or_else(|| self.doc.body())
    }

    fn open_element(&mut self, name: &str, attrs: &[Attribute], self_closing: bool) {
        let attrs: Vec<(String, String)> = attrs
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect();

        match name {
            "html" => self.apply_attrs(self.doc.root(), &attrs),
            "body" => {
                let body = self.doc.body();
                self.apply_attrs(body, &attrs);
                self.open = vec![body];
            }
            "head" => {
                let root = self.doc.root();
                let head = self.doc.create_element("head", &[]);
                self.doc.append_child(root, head);
                self.open.push(head);
            }
            _ => {
                let pairs: Vec<(&str, &str)> = attrs
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str()))
                    .collect();
                let parent = self.current();
                let element = self.doc.append(parent, name, &pairs);
                if !self_closing && !VOID_ELEMENTS.contains(&name) {
                    self.open.push(element);
                }
            }
        }
    }

    fn close_element(&mut self, name: &str) {
        let doc = &self.doc;
        let matched = self
            .open
            .iter()
            .rposition(|node| doc.tag_name(node) == name);
        // The body stays open at the bottom of the stack.
        if let Some(index) = matched.filter(|index| *index > 0) {
            self.open.truncate(index);
        }
    }

    fn apply_attrs(&mut self, node: NodeId, attrs: &[(String, String)]) {
        for (name, value) in attrs {
            self.doc.set_attribute(node, name, value);
        }
    }
}

fn raw_text_kind(name: &str, self_closing: bool) -> Option<RawKind> {
    if self_closing {
        return None;
    }
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

/// Parse an HTML page into a document located at `path`.
pub fn parse_document(html: &str, path: &str) -> MemoryDocument {
    let doc = MemoryDocument::new(path);
    let body = doc.body();
    let sink = TreeSink {
        state: RefCell::new(TreeState { doc, open: vec![body] }),
    };

    let tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let queue = BufferQueue::default();
    queue.push_back(StrTendril::from(html));

    let _ = tokenizer.feed(&queue);
    tokenizer.end();

    let state = tokenizer.sink.state.into_inner();
    log::debug!("Parsed {} elements from HTML", state.doc.len());
    state.doc
}
