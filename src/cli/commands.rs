use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{default_mime_types, ServerConfig};
use crate::context::{new_shared_params, RequestContext};
use crate::dispatcher::RequestDispatcher;
use crate::handlers::HandlerRegistry;
use crate::logging::{init_logging, LogConfig};
use crate::runtime_config::RuntimeConfig;
use crate::script::{parse_document, ScriptEngine};

/// Command-line interface for smartserve
#[derive(Parser)]
#[command(name = "smartserve")]
#[command(about = "SmartScript HTTP server", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server until SIGINT or SIGTERM
    Serve {
        /// Path to the YAML server configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Execute a script and write the response (header and body) to stdout
    Render {
        script: PathBuf,

        /// Query parameter visible to the script, repeatable
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Document root used for nested `dispatch` calls
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Parse a script and print its canonical source or JSON AST
    Tree {
        script: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{arg}`")),
    }
}

/// Parse the command line and run the selected command.
///
/// # Errors
///
/// Returns an error if:
/// - Logging cannot be initialized
/// - The configuration, a properties table or a script cannot be loaded
/// - The server fails to start
/// - A script fails to parse or render
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env())?;
    match cli.command {
        Commands::Serve { config } => serve(&config),
        Commands::Render {
            script,
            params,
            root,
        } => render(&script, params.into_iter().collect(), root.as_deref()),
        Commands::Tree { script, json } => tree(&script, json),
    }
}

fn serve(config_path: &Path) -> anyhow::Result<()> {
    let config = ServerConfig::load(config_path)?;
    let runtime = RuntimeConfig::from_env();
    // listener + sweeper + connection workers
    runtime.apply(config.worker_threads + 2);

    let server = config.build_server(HandlerRegistry::with_builtins(), runtime)?;
    let handle = server
        .start(config.socket_addr())
        .with_context(|| format!("failed to bind {}", config.socket_addr()))?;
    info!(
        addr = %handle.addr(),
        document_root = %config.document_root.display(),
        "smartserve started"
    );

    wait_for_shutdown()?;
    handle.stop();
    info!("smartserve stopped");
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(())
}

fn render(
    script: &Path,
    params: HashMap<String, String>,
    root: Option<&Path>,
) -> anyhow::Result<()> {
    let source = fs::read_to_string(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let document =
        parse_document(&source).with_context(|| format!("failed to parse {}", script.display()))?;

    let mut ctx = RequestContext::new(
        Box::new(io::stdout()),
        params,
        new_shared_params(),
        Vec::new(),
    );
    if let Some(root) = root {
        let dispatcher = RequestDispatcher::new(
            root,
            default_mime_types(),
            HandlerRegistry::with_builtins(),
        );
        ctx = ctx.with_dispatcher(Arc::new(dispatcher));
    }

    ScriptEngine::new(&document, &mut ctx)
        .execute()
        .with_context(|| format!("failed to render {}", script.display()))?;
    ctx.finish()?;
    Ok(())
}

fn tree(script: &Path, json: bool) -> anyhow::Result<()> {
    let source = fs::read_to_string(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let document =
        parse_document(&source).with_context(|| format!("failed to parse {}", script.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print!("{document}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("c=x=y"),
            Ok(("c".to_string(), "x=y".to_string()))
        );
        assert_eq!(parse_key_value("b="), Ok(("b".to_string(), String::new())));
        assert!(parse_key_value("=1").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_render_rejects_missing_script() {
        let err = render(Path::new("/nonexistent/x.smscr"), HashMap::new(), None).unwrap_err();
        assert!(err.to_string().contains("failed to read"), "{err}");
    }
}
