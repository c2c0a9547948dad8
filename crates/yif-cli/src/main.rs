//! Intention Filter CLI
//!
//! Offline tools: scan saved pages, check rule lists, manage a settings file.

mod html;
mod scan;
mod store;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use yif_compiler::{optimize_rules, parse_rule_list, BUILTIN_RULES};
use yif_core::rules::{RouteScope, RuleAction};

use scan::ScanOptions;

#[derive(Parser)]
#[command(name = "yif-cli")]
#[command(about = "Intention Filter page scanner and tools")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the filter over a saved HTML page
    Scan {
        /// HTML file to scan
        #[arg(short, long)]
        input: String,

        /// Location path the page was served at
        #[arg(short, long, default_value = "/")]
        path: String,

        /// Settings file (storage file, export or flat object)
        #[arg(short, long)]
        settings: Option<String>,

        /// Extra rule list appended to the built-in rules
        #[arg(short, long)]
        rules: Option<String>,

        /// Live setting updates applied after the first pass, e.g. `shorts=false`
        #[arg(short, long)]
        toggle: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a rule list (the built-in list when no input is given)
    Rules {
        /// Rule list file
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Read and write a settings file
    Settings {
        /// Settings file
        #[arg(short, long, default_value = "settings.json")]
        store: PathBuf,

        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every setting
    Show,
    /// Change one setting
    Set {
        /// Settings key or category, e.g. `hideShorts` or `shorts`
        flag: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Restore defaults
    Reset,
    /// Write an export document
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load an export document
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Backend details
    Info,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Scan {
            input,
            path,
            settings,
            rules,
            toggle,
            json,
        } => scan::cmd_scan(
            &ScanOptions {
                input: &input,
                path: &path,
                settings: settings.as_deref(),
                rules: rules.as_deref(),
                toggles: &toggle,
            },
            json,
        ),
        Commands::Rules { input } => cmd_rules(input.as_deref()),
        Commands::Settings { store, action } => cmd_settings(&store, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_rules(input: Option<&str>) -> Result<(), String> {
    let (name, content) = match input {
        Some(path) => (
            path,
            fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?,
        ),
        None => ("built-in", BUILTIN_RULES.to_string()),
    };

    let start = Instant::now();
    let parsed = parse_rule_list(&content);
    let mut rules = parsed.rules;
    let stats = optimize_rules(&mut rules);
    let elapsed = start.elapsed();

    let mut per_category: BTreeMap<&str, usize> = BTreeMap::new();
    let mut home_only = 0usize;
    let mut actions = 0usize;
    let mut invalid = 0usize;
    for rule in &rules {
        *per_category.entry(rule.flag().category()).or_default() += 1;
        if rule.scope() == RouteScope::DiscoveryFeed {
            home_only += 1;
        }
        if !matches!(rule.action(), RuleAction::Hide) {
            actions += 1;
        }
        if let Err(e) = rule.selector() {
            invalid += 1;
            println!("  invalid selector '{}': {}", rule.source(), e);
        }
    }

    println!("Checked rule list '{}'", name);
    println!("  Lines:    {}", content.lines().count());
    println!("  Rules:    {} -> {} (dedupe removed {})", stats.before, stats.after, stats.deduped);
    for (category, count) in &per_category {
        println!("    {:<16} {}", category, count);
    }
    println!("  Home only: {}", home_only);
    println!("  Actions:  {}", actions);
    println!("  Time:     {:.2}ms", elapsed.as_secs_f64() * 1000.0);

    for issue in &parsed.issues {
        println!("  {}", issue);
    }

    let problems = parsed.issues.len() + invalid;
    if problems > 0 {
        return Err(format!("{} problem(s) in '{}'", problems, name));
    }
    Ok(())
}

fn cmd_settings(path: &Path, action: SettingsAction) -> Result<(), String> {
    let mut store = store::open_store(path);
    match action {
        SettingsAction::Show => store::cmd_show(&store),
        SettingsAction::Set { flag, value } => store::cmd_set(&mut store, &flag, value),
        SettingsAction::Reset => store::cmd_reset(&mut store),
        SettingsAction::Export { output } => store::cmd_export(&store, output.as_deref()),
        SettingsAction::Import { input } => store::cmd_import(&mut store, &input),
        SettingsAction::Info => store::cmd_info(&store),
    }
}
