//! witr: explains why a process is running
//!
//! Usage:
//!   witr --pid 1234        # Analyze a specific PID
//!   witr --port 5000       # Find what's listening on port 5000
//!   witr node              # Find processes matching "node"
//!
//! Output formats:
//!   --json     Machine-readable JSON
//!   --short    Single-line summary
//!   --tree     Process ancestry tree
//!   (default)  Human-readable narrative

use clap::{ArgAction, Parser};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use witr_core::{
    analyze, render, AnalyzeOptions, Classifier, LaunchTables, Report, ResolveError, Target,
};
use witr_platform::{native_sources, SourceOptions};

mod config;
mod output;

use output::{print_error, print_info, print_warning, Colors};

/// Exit codes for scripting
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR_GENERAL: i32 = 1;
    pub const ERROR_INVALID_INPUT: i32 = 4;
}

#[derive(Parser, Debug)]
#[command(name = "witr")]
#[command(version, about = "Explain why a process is running", long_about = None)]
#[command(after_help = "Examples:
  witr --pid 1234          Analyze process with PID 1234
  witr --port 8080         Find what's listening on port 8080
  witr node                Find processes matching 'node'
  witr --pid 1234 --json   Output as JSON for scripting
  witr --port 80 --tree    Show ancestry tree for port 80 owner

Exit codes:
  0 success, 1 error, 2 not found, 3 access denied,
  4 invalid input, 5 ambiguous target")]
struct Cli {
    /// Process ID to analyze
    #[arg(long, short = 'p', value_name = "PID")]
    pid: Option<String>,

    /// Port number to find the owning process
    #[arg(long, short = 'P', value_name = "PORT")]
    port: Option<String>,

    /// Process name or service label to search for
    #[arg(value_name = "NAME")]
    name: Option<String>,

    /// Output as JSON (for scripting and automation)
    #[arg(long, short = 'j', conflicts_with_all = ["short", "tree", "warnings"])]
    json: bool,

    /// Output single-line summary
    #[arg(long, short = 's', conflicts_with_all = ["json", "tree", "warnings"])]
    short: bool,

    /// Show process ancestry tree
    #[arg(long, short = 't', conflicts_with_all = ["json", "short", "warnings"])]
    tree: bool,

    /// Show only the warnings
    #[arg(long, short = 'w')]
    warnings: bool,

    /// Include the process's TCP connections
    #[arg(long, short = 'n')]
    connections: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Debug logs and classification evidence; -vv for trace logs
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Give up on an external tool after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Only consult the primary socket source
    #[arg(long)]
    no_fallback: bool,

    /// Generate a sample config file at ~/.witr/config.toml
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn has_mode(&self) -> bool {
        self.json || self.short || self.tree || self.warnings
    }

    /// The single requested target
    fn target(&self) -> Result<Target, String> {
        let mut given: Vec<Target> = [
            self.pid.clone().map(Target::pid),
            self.port.clone().map(Target::port),
            self.name.clone().map(Target::name),
        ]
        .into_iter()
        .flatten()
        .collect();

        match given.len() {
            0 => Err("Specify a target: --pid <PID>, --port <PORT> or a process name".to_string()),
            1 => Ok(given.remove(0)),
            _ => Err("Specify only one of --pid, --port or a process name".to_string()),
        }
    }
}

/// Log filter used when `WITR_LOG` is unset
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("WITR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::ERROR_INVALID_INPUT
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(cli.verbose);
    let cfg = config::load_config();

    // Config supplies defaults; any explicit flag wins
    if !cli.no_color && cfg.output.no_color {
        cli.no_color = true;
    }
    if !cli.has_mode() {
        cli.json = cfg.output.json;
        cli.short = !cli.json && cfg.output.short;
        cli.tree = !cli.json && !cli.short && cfg.output.tree;
    }

    let colors = Colors::new(!cli.no_color && output::supports_color());

    if cli.init_config {
        handle_init_config(&colors);
        return;
    }

    let target = match cli.target() {
        Ok(target) => target,
        Err(message) => {
            print_error(&colors, &message);
            std::process::exit(exit_codes::ERROR_INVALID_INPUT);
        }
    };

    let sources = native_sources(SourceOptions {
        timeout: Duration::from_millis(cli.timeout_ms.unwrap_or(cfg.sources.timeout_ms)),
        fallback: cfg.sources.fallback && !cli.no_fallback,
    });
    let classifier = Classifier::new(LaunchTables::default().with_extensions(cfg.tables));
    let options = AnalyzeOptions {
        connections: cli.connections,
        self_pid: None,
    };

    let code = match analyze(&target, &sources, &classifier, &options) {
        Ok(report) => {
            print_report(&cli, &report, &colors);
            exit_codes::SUCCESS
        }
        Err(err) => report_failure(&cli, &err, &colors),
    };
    std::process::exit(code);
}

fn print_report(cli: &Cli, report: &Report, colors: &Colors) {
    if cli.json {
        match render::render_json_string(report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                print_error(colors, &format!("Failed to serialize report: {}", e));
                std::process::exit(exit_codes::ERROR_GENERAL);
            }
        }
    } else if cli.short {
        println!("{}", render::render_short(report));
    } else if cli.warnings {
        output::print_warnings_only(report, colors);
    } else if cli.tree {
        if colors.enabled {
            output::print_colored_tree(report, colors);
        } else {
            print!("{}", render::render_tree(report));
        }
    } else if colors.enabled {
        output::print_colored_report(report, cli.verbose > 0, colors);
    } else {
        print!("{}", render::render_human(report));
    }
}

/// Print a resolution failure and return the exit code
fn report_failure(cli: &Cli, err: &ResolveError, colors: &Colors) -> i32 {
    match err {
        ResolveError::Ambiguous(ambiguity) if cli.json => {
            match render::json::render_ambiguity_json(ambiguity) {
                Ok(json) => println!("{}", json),
                Err(e) => print_error(colors, &format!("Failed to serialize candidates: {}", e)),
            }
        }
        ResolveError::Ambiguous(ambiguity) => {
            if colors.enabled {
                output::print_ambiguity_table(ambiguity, colors);
            } else {
                print!("{}", render::render_ambiguity(ambiguity));
            }
        }
        _ if cli.json => {
            let body = serde_json::json!({
                "error": err.to_string(),
                "exit_code": err.exit_code(),
            });
            println!("{}", body);
        }
        _ => {
            print_error(colors, &render::sanitize_terminal(&err.to_string()));
            if err.needs_privileges() {
                print_info(colors, "Re-run with elevated privileges (e.g. sudo) to see every process's sockets");
            }
        }
    }
    err.exit_code()
}

fn handle_init_config(colors: &Colors) {
    match config::init_config() {
        Ok(path) => print_info(colors, &format!("Created config file at {}", path.display())),
        Err(config::ConfigError::AlreadyExists(path)) => {
            print_warning(colors, &format!("Config file already exists at {}", path.display()));
            eprintln!("Use a text editor to modify it, or delete it first to regenerate.");
        }
        Err(e) => {
            print_error(colors, &e.to_string());
            std::process::exit(exit_codes::ERROR_GENERAL);
        }
    }
}
