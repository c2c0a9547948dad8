//! WebAssembly content-script bindings for the Intention Filter
//!
//! The host script loads settings (storage access is async on its side),
//! then calls [`init`]. From then on the engine keeps itself current through
//! a `MutationObserver` and debounced `setTimeout` rescans; the host forwards
//! storage change events and runtime messages.

pub mod browser;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use serde_json::Value;
use wasm_bindgen::prelude::*;
use yif_compiler::rule_set_with;
use yif_core::engine::{FilterEngine, ScanReport};
use yif_core::settings::{Settings, SettingsPatch};
use yif_core::types::FeatureFlag;
use yif_core::watch::TaskId;

use browser::{BrowserDocument, ConsoleLogger, InsertedSink, TaskSink, TimeoutScheduler};

type Engine = FilterEngine<BrowserDocument, TimeoutScheduler>;
type SharedEngine = Rc<RefCell<Engine>>;

thread_local! {
    static ENGINE: RefCell<Option<SharedEngine>> = RefCell::new(None);
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn install_logging() {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Start the engine on the current page.
///
/// `settings` is the stored settings object, or `undefined` when the read
/// failed; missing or malformed values fall back to defaults. `extra_rules`
/// is an optional rule list appended to the built-in one.
#[wasm_bindgen]
pub fn init(settings: JsValue, extra_rules: Option<String>) -> Result<JsValue, JsValue> {
    install_logging();

    if is_initialized() {
        return Err(JsValue::from_str("Already initialized. Call destroy() first."));
    }

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("No document available"))?;

    let (rules, issues) = rule_set_with(extra_rules.as_deref().unwrap_or_default());
    for issue in &issues {
        log::warn!("Extra rules: {}", issue);
    }

    let shared: SharedEngine = Rc::new_cyclic(|weak: &Weak<RefCell<Engine>>| {
        let document = BrowserDocument::new(window.clone(), document, inserted_sink(weak.clone()));
        let scheduler = TimeoutScheduler::new(window, task_sink(weak.clone()));
        RefCell::new(FilterEngine::new(document, scheduler, rules))
    });

    let report = {
        let mut engine = shared.borrow_mut();
        let report = engine.configure(Settings::from_value(&js_to_json(&settings)));
        engine.start_watching();
        log::info!(
            "Intention Filter active: {} rules, {} elements hidden",
            engine.rules().len(),
            report.hidden
        );
        report
    };

    ENGINE.with(|slot| *slot.borrow_mut() = Some(shared));
    Ok(report_to_js(&report))
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    ENGINE.with(|slot| slot.borrow().is_some())
}

/// Stop watching, cancel the pending rescan and restore everything hidden.
#[wasm_bindgen]
pub fn destroy() {
    let Some(shared) = ENGINE.with(|slot| slot.borrow_mut().take()) else {
        return;
    };
    let destroyed = shared.try_borrow_mut().map(|mut engine| engine.destroy());
    if destroyed.is_err() {
        log::warn!("Engine busy during destroy");
    }
}

#[wasm_bindgen]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let filter = log::LevelFilter::from_str(level)
        .map_err(|_| JsValue::from_str(&format!("Unknown log level: {}", level)))?;
    log::set_max_level(filter);
    Ok(())
}

// =============================================================================
// Engine Operations
// =============================================================================

#[wasm_bindgen]
pub fn apply_filters() -> JsValue {
    match with_engine(|engine| engine.apply_filters()) {
        Some(report) => report_to_js(&report),
        None => JsValue::NULL,
    }
}

/// Returns the number of restored elements.
#[wasm_bindgen]
pub fn clear_filters() -> u32 {
    with_engine(|engine| engine.clear_filters() as u32).unwrap_or(0)
}

/// Replace the whole settings object.
#[wasm_bindgen]
pub fn update_settings(settings: JsValue) -> JsValue {
    let settings = js_to_json(&settings);
    match with_engine(|engine| engine.configure_value(&settings)) {
        Some(report) => report_to_js(&report),
        None => JsValue::NULL,
    }
}

/// Runtime message entry point. Returns whether the message was acted on.
#[wasm_bindgen]
pub fn handle_message(message: JsValue) -> bool {
    let message = js_to_json(&message);
    with_engine(|engine| engine.handle_message(&message)).unwrap_or(false)
}

/// Storage `onChanged` entry point: `{key: {oldValue, newValue}}`.
#[wasm_bindgen]
pub fn handle_storage_change(changes: JsValue) -> bool {
    let patch = SettingsPatch::from_storage_changes(&js_to_json(&changes));
    with_engine(|engine| engine.merge_changes(&patch).is_some()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn get_engine_info() -> JsValue {
    let result = js_sys::Object::new();
    let info = with_engine(|engine| {
        let settings = js_sys::Object::new();
        for flag in FeatureFlag::ALL {
            let _ = js_sys::Reflect::set(
                &settings,
                &flag.key().into(),
                &JsValue::from(engine.settings().is_enabled(flag)),
            );
        }
        let _ = js_sys::Reflect::set(&result, &"hiddenCount".into(), &JsValue::from(engine.hidden_count() as u32));
        let _ = js_sys::Reflect::set(&result, &"watching".into(), &JsValue::from(engine.is_watching()));
        let _ = js_sys::Reflect::set(&result, &"rescans".into(), &JsValue::from(engine.rescan_count() as u32));
        let _ = js_sys::Reflect::set(&result, &"rules".into(), &JsValue::from(engine.rules().len() as u32));
        let _ = js_sys::Reflect::set(&result, &"settings".into(), &settings);
    });
    let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(info.is_some()));
    result.into()
}

// =============================================================================
// Helpers
// =============================================================================

fn with_engine<R>(f: impl FnOnce(&mut Engine) -> R) -> Option<R> {
    let shared = ENGINE.with(|slot| slot.borrow().clone())?;
    let result = match shared.try_borrow_mut() {
        Ok(mut engine) => Some(f(&mut engine)),
        Err(_) => {
            log::warn!("Engine busy, call ignored");
            None
        }
    };
    result
}

fn inserted_sink(weak: Weak<RefCell<Engine>>) -> InsertedSink {
    Rc::new(move |inserted: Vec<web_sys::Element>| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let Ok(mut engine) = shared.try_borrow_mut() else {
            log::debug!("Engine busy, mutation batch dropped");
            return;
        };
        let nodes: Vec<_> = inserted
            .into_iter()
            .map(|element| engine.document().node(element))
            .collect();
        engine.on_mutations(&nodes);
    })
}

fn task_sink(weak: Weak<RefCell<Engine>>) -> TaskSink {
    Rc::new(move |task: TaskId| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let Ok(mut engine) = shared.try_borrow_mut() else {
            log::debug!("Engine busy, task {:?} dropped", task);
            return;
        };
        engine.scheduler_mut().fired(task);
        engine.run_task(task);
    })
}

fn js_to_json(value: &JsValue) -> Value {
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|text| text.as_string())
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

fn report_to_js(report: &ScanReport) -> JsValue {
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"hidden".into(), &JsValue::from(report.hidden as u32));
    let _ = js_sys::Reflect::set(&result, &"autoplayCleared".into(), &JsValue::from(report.autoplay_cleared as u32));
    let _ = js_sys::Reflect::set(&result, &"togglesReleased".into(), &JsValue::from(report.toggles_released as u32));
    let _ = js_sys::Reflect::set(&result, &"skippedRules".into(), &JsValue::from(report.skipped_rules as u32));
    result.into()
}
