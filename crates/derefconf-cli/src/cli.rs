//! derefconf CLI - Command-line interface for derefconf configuration trees
//!
//! Usage:
//!   derefconf get config.yaml database/url
//!   derefconf dump config.yaml --format json
//!   derefconf check config.yaml other.json

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use derefconf_core::path::DEFAULT_SEPARATOR;
use derefconf_core::token::{DEFAULT_TOKEN_END, DEFAULT_TOKEN_START};
use derefconf_core::{ConfigNode, Environment, Syntax, TreeBuilder, Value};

/// derefconf - Configuration trees with lazily de-referenced tokens
#[derive(Parser, Debug)]
#[command(name = "derefconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    tree: TreeArgs,

    #[command(subcommand)]
    command: Commands,
}

/// How files are turned into trees
#[derive(Args, Debug, Clone)]
struct TreeArgs {
    /// Path separator used in paths and token keys
    #[arg(long, global = true, default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Token start delimiter
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_START, allow_hyphen_values = true)]
    token_start: String,

    /// Token end delimiter
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_END, allow_hyphen_values = true)]
    token_end: String,

    /// Resolve tokens against environment variables instead of the file itself
    #[arg(long, global = true)]
    env: bool,

    /// Only read environment variables starting with this prefix
    #[arg(long, global = true, requires = "env")]
    env_prefix: Option<String>,

    /// Register another config file as a named reference source
    #[arg(long = "source", global = true, value_name = "NAME=FILE")]
    sources: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a specific value from the configuration
    Get {
        /// Configuration file
        file: PathBuf,

        /// Path to the value (e.g., database/host)
        path: String,

        /// Show tokens instead of de-referencing them
        #[arg(short, long)]
        raw: bool,

        /// Output format: text, json, yaml
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Default value if the path is not found
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Export the configuration
    Dump {
        /// Configuration file
        file: PathBuf,

        /// Show tokens instead of de-referencing them
        #[arg(short, long)]
        raw: bool,

        /// Output format: yaml, json
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that files load and every token resolves
    Check {
        /// Configuration file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Get {
            file,
            path,
            raw,
            format,
            default,
        } => cmd_get(&cli.tree, &file, &path, raw, &format, default),

        Commands::Dump {
            file,
            raw,
            format,
            output,
        } => cmd_dump(&cli.tree, &file, raw, &format, output),

        Commands::Check { files } => cmd_check(&cli.tree, &files),
    }
}

impl TreeArgs {
    fn syntax(&self) -> Result<Syntax, String> {
        Syntax::new(&self.separator, &self.token_start, &self.token_end)
            .map_err(|e| format!("Invalid syntax options: {}", e))
    }

    fn builder(&self) -> Result<TreeBuilder, String> {
        let syntax = self.syntax()?;
        let mut builder = TreeBuilder::new()
            .with_syntax(syntax.clone())
            .with_source("env", Arc::new(Environment::new()));

        if self.env {
            let env = match &self.env_prefix {
                Some(prefix) => Environment::with_prefix(prefix),
                None => Environment::new(),
            };
            builder = builder.with_default_source(Arc::new(env));
        }

        for spec in &self.sources {
            let (name, file) = spec
                .split_once('=')
                .filter(|(name, file)| !name.is_empty() && !file.is_empty())
                .ok_or_else(|| format!("Invalid --source '{}': expected NAME=FILE", spec))?;
            let file = Path::new(file);
            let source = TreeBuilder::new()
                .with_syntax(syntax.clone())
                .build(read_data(file)?, None)
                .map_err(|e| format!("Failed to load {}: {}", file.display(), e))?;
            builder = builder.with_source(name, source);
        }

        Ok(builder)
    }
}

fn is_json(file: &Path) -> bool {
    file.extension().and_then(|e| e.to_str()) == Some("json")
}

fn parse_data(file: &Path, content: &str) -> Result<Value, String> {
    if is_json(file) {
        serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {}", e))
    } else {
        serde_yaml::from_str(content).map_err(|e| format!("Invalid YAML: {}", e))
    }
}

fn read_data(file: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to load {}: {}", file.display(), e))?;
    parse_data(file, &content).map_err(|e| format!("Failed to load {}: {}", file.display(), e))
}

fn load_tree(args: &TreeArgs, file: &Path) -> Result<Arc<ConfigNode>, String> {
    let builder = args.builder()?;
    let data = read_data(file)?;
    builder
        .build(data, None)
        .map_err(|e| format!("Failed to load {}: {}", file.display(), e))
}

/// Render a looked-up value; nested nodes are exported first
fn render(value: Value, format: &str, resolve: bool) -> Result<String, String> {
    let value = match value {
        Value::Node(node) => node.to_value(resolve).map_err(|e| e.to_string())?,
        other => other,
    };

    match format {
        "json" => serde_json::to_string_pretty(&value)
            .map(|json| json + "\n")
            .map_err(|e| e.to_string()),
        "yaml" => serde_yaml::to_string(&value).map_err(|e| e.to_string()),
        _ => match value.to_token_string() {
            Some(text) => Ok(text + "\n"),
            // Complex values are shown as YAML
            None => serde_yaml::to_string(&value).map_err(|e| e.to_string()),
        },
    }
}

fn write_output(content: &str, output: Option<PathBuf>) -> ExitCode {
    match output {
        Some(output_path) => {
            if let Err(e) = std::fs::write(&output_path, content) {
                eprintln!("{}: {}", "Error writing file".red(), e);
                return ExitCode::from(2);
            }
            eprintln!("{} Wrote to {}", "✓".green(), output_path.display());
            ExitCode::SUCCESS
        }
        None => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
    }
}

fn cmd_get(
    args: &TreeArgs,
    file: &Path,
    path: &str,
    raw: bool,
    format: &str,
    default: Option<String>,
) -> ExitCode {
    let tree = match load_tree(args, file) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let result = if raw {
        tree.get_raw(path)
    } else {
        tree.get(path)
    };

    match result {
        Ok(value) => match render(value, format, !raw) {
            Ok(content) => write_output(&content, None),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                ExitCode::from(1)
            }
        },
        Err(e) if e.is_not_found() => {
            if let Some(default_val) = default {
                println!("{}", default_val);
                ExitCode::SUCCESS
            } else {
                eprintln!("{}: Path '{}' not found", "Error".red(), path);
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_dump(
    args: &TreeArgs,
    file: &Path,
    raw: bool,
    format: &str,
    output: Option<PathBuf>,
) -> ExitCode {
    let tree = match load_tree(args, file) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let result = match format {
        "json" => tree.to_json(!raw).map(|json| json + "\n"),
        _ => tree.to_yaml(!raw),
    };

    match result {
        Ok(content) => write_output(&content, output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

/// Load a file and de-reference every value in it
fn check_file(args: &TreeArgs, file: &Path) -> Result<(), String> {
    let tree = load_tree(args, file)?;
    tree.to_value(true).map(|_| ()).map_err(|e| e.to_string())
}

fn cmd_check(args: &TreeArgs, files: &[PathBuf]) -> ExitCode {
    let mut all_valid = true;

    for file in files {
        match check_file(args, file) {
            Ok(()) => {
                println!(
                    "{} {}: valid {}",
                    "✓".green(),
                    file.display(),
                    if is_json(file) { "JSON" } else { "YAML" }
                );
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                all_valid = false;
            }
        }
    }

    if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
