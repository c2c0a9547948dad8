//! Intention Filter Core Library
//!
//! This crate provides the live filtering engine behind the Intention Filter
//! content script. It hides recommendation feeds, Shorts shelves, autoplay
//! controls and comment sections on a continuously re-rendering page, and
//! restores them exactly when a feature is switched off.
//!
//! # Architecture
//!
//! The engine never talks to a browser directly. It drives any tree that
//! implements [`dom::Document`] and defers rescans through any
//! [`watch::Scheduler`], so the same state machine runs against the live DOM
//! (see `yif-wasm`), against a parsed HTML snapshot (see `yif-cli`) and
//! against the in-memory tree used by the tests.
//!
//! # Modules
//!
//! - `types`: Feature flags and page context
//! - `selector`: CSS-subset selector parser and matcher
//! - `dom`: Document abstraction and the in-memory tree
//! - `rules`: Rule and rule set definitions
//! - `settings`: Settings snapshots, patches and stores
//! - `message`: Cross-context message shapes
//! - `watch`: Mutation watch and debounce scheduling
//! - `engine`: The filter engine state machine

pub mod dom;
pub mod engine;
pub mod message;
pub mod rules;
pub mod selector;
pub mod settings;
pub mod types;
pub mod watch;

// Re-export commonly used types
pub use dom::{Document, MemoryDocument, NodeId};
pub use engine::{FilterEngine, ScanReport, RESCAN_DELAY};
pub use message::{Channel, InboundMessage, MessageError};
pub use rules::{RouteScope, Rule, RuleAction, RuleSet};
pub use selector::{Selector, SelectorError};
pub use settings::{Settings, SettingsPatch, SettingsStore, StoreError};
pub use types::{FeatureFlag, FeatureSet, PageContext, Route};
pub use watch::{ManualScheduler, Scheduler, TaskId, WatchState};
