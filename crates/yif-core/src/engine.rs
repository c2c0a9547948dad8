//! The filter engine
//!
//! [`FilterEngine`] owns the document handle, the scheduler, the rule set,
//! the current settings snapshot and the set of elements it has hidden.
//! Every state change follows one of three triggers:
//!
//! 1. a configuration change (`configure`, `merge_changes`, `handle_message`)
//!    runs cancel, clear, replace, apply;
//! 2. a debounced rescan (`run_task`) runs one apply;
//! 3. `destroy` cancels, disconnects and clears.
//!
//! Hidden elements are tracked by identity together with the inline
//! `display` value they had before the engine touched them, so clearing puts
//! back exactly what the page had.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::dom::Document;
use crate::message::InboundMessage;
use crate::rules::{RuleAction, RuleSet};
use crate::settings::{Settings, SettingsPatch, SettingsStore};
use crate::types::{FeatureFlag, PageContext};
use crate::watch::{is_fresh_subtree, RescanSlot, Scheduler, TaskId, WatchState};

// =============================================================================
// Constants
// =============================================================================

/// Quiet period between the last qualifying mutation batch and the rescan.
pub const RESCAN_DELAY: Duration = Duration::from_millis(200);

/// Counters for one apply pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Elements newly hidden by this pass
    pub hidden: usize,
    /// Media elements whose autoplay attribute was cleared
    pub autoplay_cleared: usize,
    /// Pressed autoplay toggles activated once
    pub toggles_released: usize,
    /// Rules skipped because their selector failed to compile
    pub skipped_rules: usize,
}

impl ScanReport {
    /// Did the pass change the document?
    pub fn changed(&self) -> bool {
        self.hidden + self.autoplay_cleared + self.toggles_released > 0
    }

    /// Combine with the report of a later full configure pass. Autoplay
    /// corrections are one-shot and add up; hidden and skipped counts come
    /// from the later pass, which started from a clean slate.
    #[must_use]
    pub fn followed_by(self, later: ScanReport) -> ScanReport {
        ScanReport {
            hidden: later.hidden,
            autoplay_cleared: self.autoplay_cleared + later.autoplay_cleared,
            toggles_released: self.toggles_released + later.toggles_released,
            skipped_rules: later.skipped_rules,
        }
    }
}

#[derive(Debug, Clone)]
struct HiddenMark {
    prior_display: Option<String>,
    flag: FeatureFlag,
}

// =============================================================================
// Filter Engine
// =============================================================================

/// Live filtering state machine over a [`Document`].
pub struct FilterEngine<D: Document, S: Scheduler> {
    document: D,
    scheduler: S,
    rules: RuleSet,
    settings: Settings,
    hidden: HashMap<D::Node, HiddenMark>,
    watching: bool,
    rescan: RescanSlot,
    rescans: usize,
}

impl<D: Document, S: Scheduler> FilterEngine<D, S> {
    /// Create an idle engine with default settings. Nothing is applied and
    /// no watch is connected until `configure`/`start_watching`.
    pub fn new(document: D, scheduler: S, rules: RuleSet) -> Self {
        Self {
            document,
            scheduler,
            rules,
            settings: Settings::default(),
            hidden: HashMap::new(),
            watching: false,
            rescan: RescanSlot::default(),
            rescans: 0,
        }
    }

    /// Load settings from `store`, apply them and start watching.
    ///
    /// A failed read is logged and replaced by defaults.
    pub fn bootstrap<St>(document: D, scheduler: S, rules: RuleSet, store: &St) -> Self
    where
        St: SettingsStore + ?Sized,
    {
        let settings = store.get().unwrap_or_else(|e| {
            log::warn!("Loading settings from {} failed, using defaults: {}", store.name(), e);
            Settings::default()
        });

        let mut engine = Self::new(document, scheduler, rules);
        let report = engine.configure(settings);
        engine.start_watching();
        log::info!(
            "Filter engine started: {} rules, {} elements hidden",
            engine.rules.len(),
            report.hidden
        );
        engine
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Replace the active settings: cancel any pending rescan, clear every
    /// mark, swap the snapshot, then apply.
    pub fn configure(&mut self, settings: Settings) -> ScanReport {
        self.rescan.cancel(&mut self.scheduler);
        self.clear_filters();
        self.settings = settings;
        self.apply_filters()
    }

    /// [`FilterEngine::configure`] from a raw JSON object. Never fails.
    pub fn configure_value(&mut self, value: &Value) -> ScanReport {
        self.configure(Settings::from_value(value))
    }

    /// Merge a change notification. Returns `None` when no key was
    /// recognised and nothing ran.
    pub fn merge_changes(&mut self, patch: &SettingsPatch) -> Option<ScanReport> {
        if patch.is_empty() {
            return None;
        }
        Some(self.configure(self.settings.merged(patch)))
    }

    /// Handle a cross-context message. Returns whether it was acted on.
    pub fn handle_message(&mut self, raw: &Value) -> bool {
        self.dispatch_message(raw).is_some()
    }

    /// [`FilterEngine::handle_message`] returning the pass it triggered.
    pub fn dispatch_message(&mut self, raw: &Value) -> Option<ScanReport> {
        match InboundMessage::parse(raw) {
            Some(InboundMessage::UpdateSetting { flag, value }) => {
                log::debug!("Setting {} changed to {}", flag, value);
                Some(self.configure(self.settings.with(flag, value)))
            }
            None => {
                log::debug!("Ignoring unrecognised message: {}", raw);
                None
            }
        }
    }

    // =========================================================================
    // Apply / Clear
    // =========================================================================

    /// Run every active rule once and hide new matches.
    ///
    /// Already-hidden elements are excluded before selector evaluation, so a
    /// second pass over an unchanged document does nothing. Marks on
    /// elements the page has since detached are released first; connected
    /// elements are never unhidden here.
    pub fn apply_filters(&mut self) -> ScanReport {
        self.release_detached();
        let page = PageContext::from_path(&self.document.route_path());
        let mut report = ScanReport::default();

        let Self {
            document,
            rules,
            settings,
            hidden,
            ..
        } = self;

        for flag in settings.enabled().flags() {
            for rule in rules.rules_for(flag) {
                if !rule.applies_to(&page) {
                    continue;
                }
                let selector = match rule.selector() {
                    Ok(selector) => selector,
                    Err(e) => {
                        log::warn!("Skipping {} rule '{}': {}", flag, rule.source(), e);
                        report.skipped_rules += 1;
                        continue;
                    }
                };

                let matched: Vec<D::Node> = match document.query_selector_all(rule.source()) {
                    Some(nodes) => nodes
                        .into_iter()
                        .filter(|node| !hidden.contains_key(node))
                        .collect(),
                    None => document
                        .elements(selector.key_tag())
                        .into_iter()
                        .filter(|node| !hidden.contains_key(node))
                        .filter(|node| selector.matches(&*document, node))
                        .collect(),
                };

                for node in matched {
                    match rule.action() {
                        RuleAction::Hide => {
                            if mark_hidden(document, hidden, node, flag) {
                                report.hidden += 1;
                            }
                        }
                        RuleAction::HideClosest(tag) => {
                            if let Some(target) = document.closest(&node, tag) {
                                if mark_hidden(document, hidden, target, flag) {
                                    report.hidden += 1;
                                }
                            }
                        }
                        RuleAction::ClearAutoplay => {
                            document.clear_autoplay(&node);
                            report.autoplay_cleared += 1;
                        }
                        RuleAction::ReleaseToggle => {
                            document.activate(&node);
                            report.toggles_released += 1;
                        }
                    }
                }
            }
        }

        log::debug!("Scan on {:?}: {:?}", page.route, report);
        report
    }

    /// Drop marks on elements the page has detached, restoring their prior
    /// inline display so a re-inserted element is matched afresh.
    fn release_detached(&mut self) -> usize {
        let detached: Vec<D::Node> = self
            .hidden
            .keys()
            .filter(|node| !self.document.is_connected(node))
            .cloned()
            .collect();
        for node in &detached {
            if let Some(mark) = self.hidden.remove(node) {
                self.document
                    .set_inline_display(node, mark.prior_display.as_deref());
            }
        }
        if !detached.is_empty() {
            log::debug!("Released {} detached elements", detached.len());
        }
        detached.len()
    }

    /// Unhide every marked element, restoring its prior inline display.
    /// Returns how many were restored.
    pub fn clear_filters(&mut self) -> usize {
        let restored = self.hidden.len();
        for (node, mark) in self.hidden.drain() {
            self.document
                .set_inline_display(&node, mark.prior_display.as_deref());
        }
        restored
    }

    // =========================================================================
    // Mutation Watch
    // =========================================================================

    /// Connect the structural watch. Idempotent.
    pub fn start_watching(&mut self) {
        if !self.watching {
            self.document.connect_watch();
            self.watching = true;
        }
    }

    /// Deliver a batch of inserted subtree roots.
    ///
    /// Returns whether a rescan was (re)scheduled. Batches seen while the
    /// watch is disconnected, or holding only previously-filtered content,
    /// schedule nothing.
    pub fn on_mutations(&mut self, inserted: &[D::Node]) -> bool {
        if !self.watching {
            return false;
        }
        let qualifies = inserted
            .iter()
            .any(|node| is_fresh_subtree(&self.document, node, &self.hidden));
        if !qualifies {
            return false;
        }

        let task = self.rescan.arm(&mut self.scheduler, RESCAN_DELAY);
        log::trace!("Rescan {:?} scheduled", task);
        true
    }

    /// Run a scheduled task. Ids that are not the pending rescan (cancelled
    /// or superseded) are ignored.
    pub fn run_task(&mut self, task: TaskId) -> Option<ScanReport> {
        if !self.rescan.take(task) {
            log::trace!("Ignoring stale task {:?}", task);
            return None;
        }
        self.rescans += 1;
        log::debug!("Running rescan #{}", self.rescans);
        Some(self.apply_filters())
    }

    /// Cancel the pending rescan, disconnect the watch and clear every mark.
    /// Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.rescan.cancel(&mut self.scheduler);
        if self.watching {
            self.document.disconnect_watch();
            self.watching = false;
        }
        let restored = self.clear_filters();
        log::info!("Filter engine stopped, {} elements restored", restored);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    pub fn is_hidden(&self, node: &D::Node) -> bool {
        self.hidden.contains_key(node)
    }

    /// Hidden elements with the flag that hid each one. Unordered.
    pub fn hidden_elements(&self) -> impl Iterator<Item = (&D::Node, FeatureFlag)> {
        self.hidden.iter().map(|(node, mark)| (node, mark.flag))
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    pub fn watch_state(&self) -> WatchState {
        self.rescan.state()
    }

    /// Debounced rescans run so far.
    pub fn rescan_count(&self) -> usize {
        self.rescans
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}

/// Hide `node` unless already hidden, recording its prior inline display.
fn mark_hidden<D: Document>(
    document: &mut D,
    hidden: &mut HashMap<D::Node, HiddenMark>,
    node: D::Node,
    flag: FeatureFlag,
) -> bool {
    if hidden.contains_key(&node) {
        return false;
    }
    let prior_display = document.inline_display(&node);
    document.set_inline_display(&node, Some("none"));
    hidden.insert(node, HiddenMark { prior_display, flag });
    true
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::dom::{MemoryDocument, NodeId};
    use crate::rules::{RouteScope, Rule};
    use crate::settings::MemoryStore;
    use crate::watch::ManualScheduler;

    type Engine = FilterEngine<MemoryDocument, ManualScheduler>;

    fn rules() -> RuleSet {
        RuleSet::new([
            Rule::new(
                FeatureFlag::HideRecommendations,
                RouteScope::DiscoveryFeed,
                RuleAction::Hide,
                "ytd-rich-grid-renderer",
            ),
            Rule::hide(FeatureFlag::HideRecommendations, "ytd-watch-next-secondary-results-renderer"),
            Rule::hide(FeatureFlag::HideShorts, "ytd-reel-shelf-renderer"),
            Rule::hide(FeatureFlag::HideShorts, "ytd-rich-item-renderer[is-shorts]"),
            Rule::new(
                FeatureFlag::HideShorts,
                RouteScope::Any,
                RuleAction::HideClosest("ytd-guide-entry-renderer".into()),
                r#"ytd-guide-entry-renderer a[title="Shorts"]"#,
            ),
            Rule::new(FeatureFlag::DisableAutoplay, RouteScope::Any, RuleAction::ClearAutoplay, "video[autoplay]"),
            Rule::new(
                FeatureFlag::DisableAutoplay,
                RouteScope::Any,
                RuleAction::ReleaseToggle,
                r#"button[aria-label*="autoplay" i][aria-pressed="true"]"#,
            ),
            Rule::hide(FeatureFlag::HideComments, "ytd-comments#comments"),
        ])
    }

    fn engine_at(path: &str) -> Engine {
        Engine::new(MemoryDocument::new(path), ManualScheduler::new(), rules())
    }

    fn add(engine: &mut Engine, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let body = engine.document().body();
        engine.document_mut().append(body, tag, attrs)
    }

    /// Advance the virtual clock and fire whatever came due.
    fn tick(engine: &mut Engine, ms: u64) -> Vec<ScanReport> {
        let due = engine.scheduler_mut().advance(Duration::from_millis(ms));
        due.into_iter().filter_map(|task| engine.run_task(task)).collect()
    }

    /// Deliver the document's queued insertion records.
    fn flush(engine: &mut Engine) -> bool {
        let records = engine.document_mut().take_records();
        engine.on_mutations(&records)
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut engine = engine_at("/");
        let grid = add(&mut engine, "ytd-rich-grid-renderer", &[]);
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);

        let first = engine.configure(Settings::default());
        assert_eq!(first.hidden, 2);
        let marked: Vec<NodeId> = [grid, shelf].into_iter().filter(|n| engine.is_hidden(n)).collect();
        assert_eq!(marked, vec![grid, shelf]);

        let second = engine.apply_filters();
        assert_eq!(second, ScanReport::default());
        assert_eq!(engine.hidden_count(), 2);
    }

    #[test]
    fn test_clear_restores_prior_inline_display() {
        let mut engine = engine_at("/");
        let styled = add(&mut engine, "ytd-reel-shelf-renderer", &[("style", "display: block; color: red")]);
        let plain = add(&mut engine, "ytd-reel-shelf-renderer", &[]);

        engine.configure(Settings::default());
        assert_eq!(engine.document().inline_display(&styled).as_deref(), Some("none"));
        assert_eq!(engine.document().inline_display(&plain).as_deref(), Some("none"));

        assert_eq!(engine.clear_filters(), 2);
        assert_eq!(engine.document().inline_display(&styled).as_deref(), Some("block"));
        assert_eq!(engine.document().inline_display(&plain), None);
        assert_eq!(engine.hidden_count(), 0);
    }

    #[test]
    fn test_flag_isolation() {
        let mut engine = engine_at("/");
        let grid = add(&mut engine, "ytd-rich-grid-renderer", &[]);
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        engine.configure(Settings::default());

        let report = engine.configure(Settings::default().with(FeatureFlag::HideShorts, false));
        assert_eq!(report.hidden, 1);
        assert!(engine.is_hidden(&grid));
        assert!(!engine.is_hidden(&shelf));
        assert_eq!(engine.document().inline_display(&shelf), None);

        let flags: Vec<_> = engine.hidden_elements().map(|(_, flag)| flag).collect();
        assert_eq!(flags, vec![FeatureFlag::HideRecommendations]);
    }

    #[test]
    fn test_context_boundary() {
        let mut engine = engine_at("/feed/subscriptions");
        let grid = add(&mut engine, "ytd-rich-grid-renderer", &[]);
        engine.configure(Settings::default());
        assert!(!engine.is_hidden(&grid));

        engine.document_mut().set_route_path("/");
        engine.apply_filters();
        assert!(engine.is_hidden(&grid));
    }

    #[test]
    fn test_search_results_keep_grid() {
        let mut engine = engine_at("/results?search_query=rust");
        let grid = add(&mut engine, "ytd-rich-grid-renderer", &[]);
        let sidebar = add(&mut engine, "ytd-watch-next-secondary-results-renderer", &[]);
        engine.configure(Settings::default());
        assert!(!engine.is_hidden(&grid));
        assert!(engine.is_hidden(&sidebar));
    }

    #[test]
    fn test_debounce_collapses_bursts() {
        let mut engine = engine_at("/");
        engine.configure(Settings::default());
        engine.start_watching();

        let mut last_task = None;
        for _ in 0..10 {
            add(&mut engine, "ytd-reel-shelf-renderer", &[]);
            assert!(flush(&mut engine));
            if let WatchState::PendingRescan(task) = engine.watch_state() {
                last_task = Some(task);
            }
            assert!(tick(&mut engine, 15).is_empty());
        }
        assert_eq!(engine.scheduler().pending_count(), 1);

        // Last batch at t=135ms, so the rescan is due at t=335ms.
        let due = last_task.and_then(|task| engine.scheduler().due_at(task));
        assert_eq!(due, Some(Duration::from_millis(335)));

        // The loop left the clock at t=150ms.
        assert!(tick(&mut engine, 184).is_empty());
        let reports = tick(&mut engine, 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].hidden, 10);
        assert_eq!(engine.rescan_count(), 1);
        assert_eq!(engine.watch_state(), WatchState::Idle);
    }

    #[test]
    fn test_filtered_content_does_not_qualify() {
        let mut engine = engine_at("/");
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        engine.configure(Settings::default());
        engine.start_watching();

        // Re-inserting a hidden subtree is not new content.
        let body = engine.document().body();
        engine.document_mut().append_child(body, shelf);
        assert!(!flush(&mut engine));
        assert_eq!(engine.watch_state(), WatchState::Idle);

        // A plain leaf is.
        add(&mut engine, "span", &[]);
        assert!(flush(&mut engine));
    }

    #[test]
    fn test_batches_ignored_before_watching() {
        let mut engine = engine_at("/");
        let node = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        assert!(!engine.on_mutations(&[node]));
        assert_eq!(engine.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_detached_elements_are_released() {
        let mut engine = engine_at("/");
        engine.configure(Settings::default());

        for _ in 0..50 {
            let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
            assert_eq!(engine.apply_filters().hidden, 1);
            engine.document_mut().remove(shelf);
        }
        assert_eq!(engine.hidden_count(), 1);
        engine.apply_filters();
        assert_eq!(engine.hidden_count(), 0);

        // Re-inserting a released element hides it again from a clean state.
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[("style", "display: flex")]);
        engine.apply_filters();
        engine.document_mut().remove(shelf);
        engine.apply_filters();
        assert!(!engine.is_hidden(&shelf));
        assert_eq!(engine.document().inline_display(&shelf).as_deref(), Some("flex"));

        let body = engine.document().body();
        engine.document_mut().append_child(body, shelf);
        assert_eq!(engine.apply_filters().hidden, 1);
        assert!(engine.is_hidden(&shelf));
        engine.clear_filters();
        assert_eq!(engine.document().inline_display(&shelf).as_deref(), Some("flex"));
    }

    #[test]
    fn test_start_watching_is_idempotent() {
        let mut engine = engine_at("/");
        engine.start_watching();
        engine.start_watching();
        assert!(engine.is_watching());
        assert!(engine.document().is_watching());

        engine.destroy();
        assert!(!engine.document().is_watching());
    }

    #[test]
    fn test_configure_cancels_pending_rescan() {
        let mut engine = engine_at("/");
        engine.configure(Settings::default());
        engine.start_watching();
        add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        assert!(flush(&mut engine));

        let stale = match engine.watch_state() {
            WatchState::PendingRescan(task) => task,
            WatchState::Idle => panic!("expected a pending rescan"),
        };
        let report = engine.configure(Settings::default());
        assert_eq!(report.hidden, 1);
        assert_eq!(engine.watch_state(), WatchState::Idle);
        assert_eq!(engine.scheduler().pending_count(), 0);

        // A late-firing timer for the cancelled task is a no-op.
        assert_eq!(engine.run_task(stale), None);
        assert_eq!(engine.rescan_count(), 0);
    }

    #[test]
    fn test_teardown() {
        let mut engine = engine_at("/");
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[("style", "display: flex")]);
        engine.configure(Settings::default());
        engine.start_watching();
        add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        assert!(flush(&mut engine));

        engine.destroy();
        assert_eq!(engine.hidden_count(), 0);
        assert!(!engine.is_watching());
        assert!(!engine.document().is_watching());
        assert_eq!(engine.document().inline_display(&shelf).as_deref(), Some("flex"));

        add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        assert!(!flush(&mut engine));
        assert!(tick(&mut engine, 1_000).is_empty());
        assert_eq!(engine.rescan_count(), 0);

        engine.destroy();
        assert_eq!(engine.hidden_count(), 0);
    }

    #[test]
    fn test_autoplay_corrections_are_one_shot() {
        let mut engine = engine_at("/watch?v=abc");
        let video = add(&mut engine, "video", &[("autoplay", "")]);
        let toggle = add(
            &mut engine,
            "button",
            &[("aria-label", "Autoplay is on"), ("aria-pressed", "true")],
        );

        let report = engine.configure(Settings::default());
        assert_eq!(report.autoplay_cleared, 1);
        assert_eq!(report.toggles_released, 1);
        assert_eq!(report.hidden, 0);
        assert_eq!(engine.document().get_attribute(video, "autoplay"), None);
        assert_eq!(engine.document().get_attribute(toggle, "aria-pressed"), Some("false"));

        let again = engine.apply_filters();
        assert!(!again.changed());
        assert_eq!(engine.document().activations(), &[toggle]);
    }

    #[test]
    fn test_native_query_path_matches_fallback() {
        let build = |native: bool| {
            let mut engine = engine_at("/");
            engine.document_mut().set_native_queries(native);
            let body = engine.document().body();
            let grid = engine.document_mut().append(body, "ytd-rich-grid-renderer", &[]);
            let item = engine.document_mut().append(grid, "ytd-rich-item-renderer", &[("is-shorts", "")]);
            let entry = engine.document_mut().append(body, "ytd-guide-entry-renderer", &[]);
            engine.document_mut().append(entry, "a", &[("title", "Shorts")]);
            let report = engine.configure(Settings::default());
            (engine, report, [grid, item, entry])
        };

        let (fallback, fallback_report, nodes) = build(false);
        let (native, native_report, _) = build(true);

        assert_eq!(native_report, fallback_report);
        assert_eq!(fallback.document().query_calls(), 0);
        assert!(native.document().query_calls() > 0);
        for node in &nodes {
            assert!(native.is_hidden(node));
            assert!(fallback.is_hidden(node));
        }

        // Hidden elements are still excluded on the native path.
        let mut native = native;
        assert!(!native.apply_filters().changed());
    }

    #[test]
    fn test_report_followed_by_later_pass() {
        let first = ScanReport {
            hidden: 3,
            autoplay_cleared: 1,
            toggles_released: 1,
            skipped_rules: 0,
        };
        let later = ScanReport {
            hidden: 4,
            autoplay_cleared: 0,
            toggles_released: 0,
            skipped_rules: 1,
        };
        assert_eq!(
            first.followed_by(later),
            ScanReport {
                hidden: 4,
                autoplay_cleared: 1,
                toggles_released: 1,
                skipped_rules: 1,
            }
        );
    }

    #[test]
    fn test_hide_closest_targets_ancestor() {
        let mut engine = engine_at("/");
        let entry = add(&mut engine, "ytd-guide-entry-renderer", &[]);
        let link = engine.document_mut().append(entry, "a", &[("title", "Shorts")]);

        engine.configure(Settings::default());
        assert!(engine.is_hidden(&entry));
        assert!(!engine.is_hidden(&link));
    }

    #[test]
    fn test_invalid_rule_is_skipped() {
        let mut rules = rules();
        rules.extend([Rule::hide(FeatureFlag::HideShorts, "ytd-reel-shelf-renderer:has(a)")]);
        let mut engine = Engine::new(MemoryDocument::new("/"), ManualScheduler::new(), rules);
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);

        let report = engine.configure(Settings::default());
        assert_eq!(report.skipped_rules, 1);
        assert!(engine.is_hidden(&shelf));
    }

    #[test]
    fn test_handle_message() {
        let mut engine = engine_at("/watch");
        let comments = add(&mut engine, "ytd-comments", &[("id", "comments")]);
        engine.configure(Settings::default());
        assert!(!engine.is_hidden(&comments));

        let toggled = engine.handle_message(&json!({
            "action": "updateSetting",
            "setting": "hideComments",
            "value": true,
        }));
        assert!(toggled);
        assert!(engine.is_hidden(&comments));

        let pass = engine.dispatch_message(&json!({
            "action": "updateSetting",
            "setting": "hideShorts",
            "value": false,
        }));
        assert_eq!(pass.map(|report| report.hidden), Some(1));
        assert!(engine.settings().is_enabled(FeatureFlag::HideComments));

        assert!(!engine.handle_message(&json!({"action": "ping"})));
        assert!(!engine.handle_message(&json!({"action": "updateSetting", "setting": "volume", "value": true})));
        assert!(engine.is_hidden(&comments));
    }

    #[test]
    fn test_merge_changes() {
        let mut engine = engine_at("/");
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        engine.configure(Settings::default());

        let patch = SettingsPatch::from_storage_changes(&json!({
            "hideShorts": {"oldValue": true, "newValue": false},
        }));
        assert!(engine.merge_changes(&patch).is_some());
        assert!(!engine.is_hidden(&shelf));
        assert!(engine.settings().is_enabled(FeatureFlag::HideRecommendations));

        let unknown = SettingsPatch::from_storage_changes(&json!({"theme": {"newValue": "dark"}}));
        assert_eq!(engine.merge_changes(&unknown), None);
    }

    #[test]
    fn test_configure_value_fails_closed() {
        let mut engine = engine_at("/");
        let shelf = add(&mut engine, "ytd-reel-shelf-renderer", &[]);
        engine.configure_value(&json!({"hideShorts": "definitely"}));
        assert!(engine.is_hidden(&shelf));
        assert_eq!(engine.settings(), Settings::default());
    }

    #[test]
    fn test_bootstrap_with_unavailable_store() {
        let mut doc = MemoryDocument::new("/");
        let body = doc.body();
        let shelf = doc.append(body, "ytd-reel-shelf-renderer", &[]);

        let engine = Engine::bootstrap(doc, ManualScheduler::new(), rules(), &MemoryStore::unavailable());
        assert_eq!(engine.settings(), Settings::default());
        assert!(engine.is_hidden(&shelf));
        assert!(engine.is_watching());
    }

    #[test]
    fn test_bootstrap_reads_store() {
        let store = MemoryStore::with_settings(Settings::default().with(FeatureFlag::HideShorts, false));
        let mut doc = MemoryDocument::new("/");
        let body = doc.body();
        let shelf = doc.append(body, "ytd-reel-shelf-renderer", &[]);

        let engine = Engine::bootstrap(doc, ManualScheduler::new(), rules(), &store);
        assert!(!engine.is_hidden(&shelf));
    }
}
