use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use yif_compiler::rule_set_with;
use yif_core::dom::{Document, MemoryDocument, NodeId};
use yif_core::engine::{FilterEngine, ScanReport};
use yif_core::message::{notify_setting, MemoryChannel};
use yif_core::settings::{Settings, STORAGE_KEY};
use yif_core::types::{FeatureFlag, PageContext, Route};
use yif_core::watch::ManualScheduler;

use crate::html::parse_document;

pub struct ScanOptions<'a> {
    pub input: &'a str,
    pub path: &'a str,
    pub settings: Option<&'a str>,
    pub rules: Option<&'a str>,
    pub toggles: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutput {
    pub route: Route,
    pub elements: usize,
    pub settings: Settings,
    pub report: ScanReport,
    pub hidden: Vec<HiddenElement>,
}

#[derive(Debug, Serialize)]
pub struct HiddenElement {
    pub flag: FeatureFlag,
    pub element: String,
}

pub fn scan_page(options: &ScanOptions) -> Result<ScanOutput, String> {
    let html = fs::read_to_string(options.input)
        .map_err(|e| format!("Failed to read '{}': {}", options.input, e))?;
    let doc = parse_document(&html, options.path);

    let settings = match options.settings {
        Some(path) => load_settings(Path::new(path))?,
        None => Settings::default(),
    };

    let extra = match options.rules {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?,
        None => String::new(),
    };
    let (rules, issues) = rule_set_with(&extra);
    for issue in &issues {
        log::warn!("{}: {}", options.rules.unwrap_or_default(), issue);
    }

    let elements = doc.len();
    let mut engine = FilterEngine::new(doc, ManualScheduler::new(), rules);
    let mut report = engine.configure(settings);

    if !options.toggles.is_empty() {
        let mut channel = MemoryChannel::connected();
        for toggle in options.toggles {
            let (flag, value) = parse_toggle(toggle)?;
            notify_setting(&mut channel, flag, value).map_err(|e| e.to_string())?;
        }
        for message in channel.drain() {
            if let Some(pass) = engine.dispatch_message(&message) {
                report = report.followed_by(pass);
            }
        }
    }

    let mut hidden: Vec<(NodeId, FeatureFlag)> = engine
        .hidden_elements()
        .map(|(node, flag)| (*node, flag))
        .collect();
    hidden.sort();

    let doc = engine.document();
    Ok(ScanOutput {
        route: PageContext::from_path(options.path).route,
        elements,
        settings: engine.settings(),
        report,
        hidden: hidden
            .into_iter()
            .map(|(node, flag)| HiddenElement {
                flag,
                element: describe(doc, node),
            })
            .collect(),
    })
}

pub fn cmd_scan(options: &ScanOptions, json: bool) -> Result<(), String> {
    let output = scan_page(options)?;

    if json {
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| format!("Failed to encode report: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Scanned '{}' at {} ({:?})", options.input, options.path, output.route);
    println!("  Elements:   {}", output.elements);
    println!("  Hidden:     {}", output.report.hidden);
    println!(
        "  Autoplay:   {} cleared, {} toggles released",
        output.report.autoplay_cleared, output.report.toggles_released
    );
    if output.report.skipped_rules > 0 {
        println!("  Skipped:    {} rules", output.report.skipped_rules);
    }

    if !output.hidden.is_empty() {
        println!();
        println!("Hidden elements:");
        for entry in &output.hidden {
            println!("  [{}] {}", entry.flag.category(), entry.element);
        }
    }

    Ok(())
}

/// Accepts a storage file, an export document or a flat settings object.
pub fn load_settings(path: &Path) -> Result<Settings, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid settings file '{}': {}", path.display(), e))?;

    let settings = value
        .get(STORAGE_KEY)
        .or_else(|| value.get("settings"))
        .unwrap_or(&value);
    Ok(Settings::from_value(settings))
}

fn parse_toggle(text: &str) -> Result<(FeatureFlag, bool), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("Expected <setting>=<true|false>, got '{}'", text))?;
    let flag = parse_flag(key)?;
    let value = value
        .parse::<bool>()
        .map_err(|_| format!("Expected true or false for '{}', got '{}'", key, value))?;
    Ok((flag, value))
}

/// Settings key (`hideShorts`) or rule category (`shorts`).
pub fn parse_flag(name: &str) -> Result<FeatureFlag, String> {
    FeatureFlag::from_key(name)
        .or_else(|| FeatureFlag::from_category(name))
        .ok_or_else(|| format!("Unknown setting '{}'", name))
}

/// `tag#id.class1.class2`
fn describe(doc: &MemoryDocument, node: NodeId) -> String {
    let mut text = doc.tag_name(&node);
    if let Some(id) = doc.get_attribute(node, "id") {
        text.push('#');
        text.push_str(id);
    }
    if let Some(classes) = doc.get_attribute(node, "class") {
        for class in classes.split_ascii_whitespace() {
            text.push('.');
            text.push_str(class);
        }
    }
    text
}
