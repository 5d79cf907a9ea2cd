//! cvpanel: CLI for driving control-voltage panel patches
//!
//! - `run`: process a patch for N frames and print each panel's voltages
//! - `validate`: check a patch file without instantiating anything
//! - `modules`: list registered module types and their ports
//! - `bench`: measure per-frame processing cost against the realtime budget

use clap::{Parser, Subcommand};
use colored::Colorize;
use cvpanel_core::dsp::panel::{LightBand, NUM_LIGHTS, light_band, lit_lights};
use cvpanel_core::dsp::{get_param_validators, schema};
use cvpanel_core::patch::Patch;
use cvpanel_core::types::PatchGraph;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

const DEFAULT_FRAMES: u64 = 48_000; // 1 second at 48kHz
const DEFAULT_BENCH_FRAMES: u64 = 48_000 * 10;

/// Sample rate default, overridable with CVPANEL_SAMPLE_RATE.
fn default_sample_rate() -> f32 {
    std::env::var("CVPANEL_SAMPLE_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(48_000.0)
}

/// Drive, validate and inspect control-voltage panel patches
#[derive(Parser)]
#[command(name = "cvpanel")]
#[command(about = "Headless control-voltage panel engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a patch and print the resulting panel voltages
    Run {
        /// Path to the patch JSON file
        patch: PathBuf,

        /// Number of frames to process
        #[arg(short, long, default_value_t = DEFAULT_FRAMES)]
        frames: u64,

        /// Sample rate in Hz
        #[arg(short, long, default_value_t = default_sample_rate())]
        sample_rate: f32,

        /// Write the patch snapshot (including knobs moved by the panel) here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Validate a patch file without building it
    Validate {
        /// Path to the patch JSON file
        patch: PathBuf,
    },

    /// List registered module types
    Modules,

    /// Benchmark patch processing against the realtime budget
    Bench {
        /// Path to the patch JSON file
        patch: PathBuf,

        /// Number of frames to process
        #[arg(short, long, default_value_t = DEFAULT_BENCH_FRAMES)]
        frames: u64,

        /// Sample rate in Hz
        #[arg(short, long, default_value_t = default_sample_rate())]
        sample_rate: f32,

        /// Warmup frames before measurement
        #[arg(short, long, default_value_t = 48_000)]
        warmup: u64,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            patch,
            frames,
            sample_rate,
            save,
        } => cmd_run(&patch, frames, sample_rate, save.as_deref()),
        Commands::Validate { patch } => cmd_validate(&patch),
        Commands::Modules => cmd_modules(),
        Commands::Bench {
            patch,
            frames,
            sample_rate,
            warmup,
        } => cmd_bench(&patch, frames, sample_rate, warmup),
    }
}

fn load_graph(path: &Path) -> PatchGraph {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Failed to read patch file {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match serde_json::from_str(&json) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Failed to parse patch JSON: {}", e);
            process::exit(1);
        }
    }
}

fn build_patch(graph: &PatchGraph, sample_rate: f32) -> Patch {
    match Patch::from_graph(graph, sample_rate) {
        Ok(patch) => patch,
        Err(e) => {
            eprintln!("Failed to build patch: {}", e);
            process::exit(1);
        }
    }
}

/// One LED column, lit from the bottom through the green/amber/red bands.
fn led_bar(voltage: f32) -> String {
    let lit = lit_lights(voltage);
    let mut bar = String::new();
    for light in 0..NUM_LIGHTS {
        if light < lit {
            let block = match light_band(light) {
                LightBand::Green => "■".green(),
                LightBand::Amber => "■".yellow(),
                LightBand::Red => "■".red(),
            };
            bar.push_str(&block.to_string());
        } else {
            bar.push_str(&"·".dimmed().to_string());
        }
    }
    bar
}

fn print_module_state(id: &str, module_type: &str, state: &serde_json::Value) {
    println!("{} ({})", id.cyan().bold(), module_type);
    let Some(voltages) = state["voltages"].as_array() else {
        println!("  {}", state);
        return;
    };
    println!("  {:>2}  {:>8}  {}", "ch", "volts", "display");
    for (channel, value) in voltages.iter().enumerate() {
        let voltage = value.as_f64().unwrap_or(0.0) as f32;
        println!(
            "  {:>2}  {:>8.2}  {}",
            channel,
            voltage,
            led_bar(voltage)
        );
    }
}

fn cmd_run(patch_path: &Path, frames: u64, sample_rate: f32, save: Option<&Path>) {
    let graph = load_graph(patch_path);
    log::info!(
        "loaded patch '{}': {} modules",
        patch_path.display(),
        graph.modules.len()
    );
    let patch = build_patch(&graph, sample_rate);

    for _ in 0..frames {
        patch.process_frame();
    }
    log::info!("processed {} frames at {} Hz", frames, sample_rate);

    let mut ids: Vec<&String> = patch.sampleables.keys().collect();
    ids.sort();
    for id in ids {
        let module = &patch.sampleables[id];
        if let Some(state) = module.get_state() {
            print_module_state(id, module.get_module_type(), &state);
        }
    }

    if let Some(save_path) = save {
        let snapshot = match patch.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                eprintln!("Failed to snapshot patch: {}", e);
                process::exit(1);
            }
        };
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Failed to serialize snapshot: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = fs::write(save_path, json + "\n") {
            eprintln!("Failed to write {}: {}", save_path.display(), e);
            process::exit(1);
        }
        println!("Saved patch snapshot to {}", save_path.display());
    }
}

/// Collect ids referenced by `{"type": "cable", "module": ...}` objects
/// anywhere in a params value.
fn collect_cable_targets(value: &serde_json::Value, targets: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("cable") {
                if let Some(module) = map.get("module").and_then(|m| m.as_str()) {
                    targets.push(module.to_string());
                }
            }
            for nested in map.values() {
                collect_cable_targets(nested, targets);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_cable_targets(item, targets);
            }
        }
        _ => {}
    }
}

fn cmd_validate(patch_path: &Path) {
    let graph = load_graph(patch_path);
    let validators = get_param_validators();

    let mut errors: Vec<String> = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let all_ids: HashSet<&str> = graph.modules.iter().map(|m| m.id.as_str()).collect();

    for module in &graph.modules {
        if !seen_ids.insert(&module.id) {
            errors.push(format!("duplicate module id '{}'", module.id));
        }

        let Some(validator) = validators.get(module.module_type.as_str()) else {
            errors.push(format!(
                "module '{}': unknown module type '{}'",
                module.id, module.module_type
            ));
            continue;
        };
        if let Err(e) = validator(&module.params) {
            errors.push(format!("module '{}': invalid params: {}", module.id, e));
        }

        let mut targets = Vec::new();
        collect_cable_targets(&module.params, &mut targets);
        for target in targets {
            if !all_ids.contains(target.as_str()) {
                errors.push(format!(
                    "module '{}': cable to missing module '{}'",
                    module.id, target
                ));
            }
        }
    }

    if errors.is_empty() {
        println!(
            "{} {} ({} modules)",
            "✓".green(),
            patch_path.display(),
            graph.modules.len()
        );
    } else {
        for error in &errors {
            eprintln!("{} {}", "✗".red(), error);
        }
        eprintln!("{} error(s) in {}", errors.len(), patch_path.display());
        process::exit(1);
    }
}

fn cmd_modules() {
    for module in schema() {
        println!("{}  {}", module.name.cyan().bold(), module.description);
        for param in &module.params {
            println!("  {:>10}  {}", param.name.yellow(), param.description);
        }
        let ports: Vec<&str> = module.outputs.iter().map(|o| o.name.as_str()).collect();
        println!("  {:>10}  {}", "ports".dimmed(), ports.join(", "));
        println!();
    }
}

fn cmd_bench(patch_path: &Path, frames: u64, sample_rate: f32, warmup: u64) {
    let graph = load_graph(patch_path);
    let patch = build_patch(&graph, sample_rate);

    println!(
        "Running benchmark: {} frames ({:.2}s at {}Hz)",
        frames,
        frames as f64 / sample_rate as f64,
        sample_rate
    );

    print!("Warming up...");
    for _ in 0..warmup {
        patch.process_frame();
    }
    println!(" done");

    print!("Benchmarking...");
    let start = Instant::now();
    for _ in 0..frames {
        patch.process_frame();
    }
    let elapsed = start.elapsed();
    println!(" done\n");

    let total_ns = elapsed.as_nanos() as f64;
    let ns_per_frame = total_ns / frames as f64;
    let realtime_budget_ns = 1_000_000_000.0 / sample_rate as f64;
    let budget_usage = (ns_per_frame / realtime_budget_ns) * 100.0;

    println!("Results:");
    println!("  Total time:     {:?}", elapsed);
    println!("  Frames:         {}", frames);
    println!("  ns/frame:       {:.2}", ns_per_frame);
    println!(
        "  Realtime budget: {:.2} ns/frame @ {}Hz",
        realtime_budget_ns, sample_rate
    );
    println!("  Budget usage:   {:.2}%", budget_usage);

    if budget_usage > 100.0 {
        println!("\n  {} Exceeds realtime budget!", "WARNING:".red().bold());
    } else {
        println!(
            "\n  {} Within realtime budget ({:.1}x headroom)",
            "✓".green(),
            100.0 / budget_usage
        );
    }
}
