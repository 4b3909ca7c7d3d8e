// ============================================================================
// NexusCape CLI: headless cape assembly via command-line arguments
// ============================================================================
//
// Usage examples:
//   NexusCape --input base.png --output cape.png
//   NexusCape -i base.png trim.png emblem.png -o cape.png --save-local
//   NexusCape -i "layers/*.png" --verbose
//
// No GUI is opened in CLI mode. Each input becomes one layer, bottom to top,
// and the visible composite is exported as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::LevelFilter;

use crate::command::EditorCommand;
use crate::error::EditorError;
use crate::io::{self, LocalStore};
use crate::logger;
use crate::project::Project;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// NexusCape headless cape builder.
#[derive(Parser, Debug)]
#[command(
    name = "NexusCape",
    about = "NexusCape headless cape builder",
    long_about = "Stack image files as cape layers and export the composite as PNG\n\
                  without opening the GUI. Every input is scaled to the canvas size.\n\n\
                  Example:\n  \
                  NexusCape --input base.png emblem.png --output cape.png --save-local"
)]
pub struct CliArgs {
    /// Input file(s), bottom layer first. Glob patterns accepted (e.g. "layers/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output PNG path. Defaults to the configured export file name.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also store the composite in the local store.
    #[arg(long)]
    pub save_local: bool,

    /// Print per-file progress and timing, and log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI with the user's settings and return an OS exit code.
/// `0` = every input was layered and the export succeeded, `1` otherwise.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = EditorSettings::load();
    logger::init(if args.verbose { LevelFilter::Debug } else { settings.log_level });
    if args.verbose
        && let Some(path) = logger::log_path()
    {
        println!("Log file: {}", path.display());
    }
    run_with_settings(&args, &settings)
}

pub fn run_with_settings(args: &CliArgs, settings: &EditorSettings) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let mut project = Project::new(settings);
    let total = inputs.len();
    let mut layered = 0;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        match add_input_layer(&mut project, input_path, layered == 0) {
            Ok(()) => {
                layered += 1;
                if args.verbose {
                    println!(
                        "  → layer {} ({:.0}ms)",
                        project.stack().active_index(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if layered == 0 {
        eprintln!("error: no input could be loaded.");
        return ExitCode::FAILURE;
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.export_file_name));
    if let Err(e) = project.export_png(&output) {
        eprintln!("error: export to '{}' failed: {}", output.display(), e);
        return ExitCode::FAILURE;
    }
    if args.verbose {
        println!("Exported {}", output.display());
    }

    if args.save_local {
        match LocalStore::open(&settings.store_path).and_then(|mut store| project.save_local(&mut store)) {
            Ok(key) => println!("Saved locally as {}", key),
            Err(e) => {
                eprintln!("error: local save failed: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing
// ============================================================================

/// Decode one input and place it on its own layer. The first loaded input
/// replaces the base layer's content.
fn add_input_layer(project: &mut Project, input: &Path, first: bool) -> Result<(), EditorError> {
    let stack = project.stack();
    let buffer = io::load_image_file(input, stack.width(), stack.height())?;
    if !first {
        project.dispatch(EditorCommand::AddLayer)?;
    }
    project.dispatch(EditorCommand::Import(buffer))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
