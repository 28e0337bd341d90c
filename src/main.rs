use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vigil::config::AppConfig;
use vigil::supervisor;

#[derive(Parser)]
#[command(name = "vigil", about = "Cluster node supervision and automated recovery daemon")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config", env = "VIGIL_CONFIG_DIR")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervision daemon (default)
    Run,
    /// Probe every node once and print the verdicts
    Check,
    /// Validate configuration and topology, then exit
    Validate,
}

fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::layer::{Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::registry::Registry;

    let default_filter = format!("info,vigil={}", cfg.logging.level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Optional daily-rotating file layer. tracing_appender::rolling::daily
    // panics if it cannot create the initial log file, so preflight
    // writability first.
    let file_layer = std::env::var("VIGIL_LOG_DIR").ok().and_then(|log_dir| {
        if std::fs::create_dir_all(&log_dir).is_err() {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".vigil_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let appender = tracing_appender::rolling::daily(&log_dir, "vigil.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // Keep the guard alive for the process lifetime.
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: could not write to log directory {log_dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(filter.boxed());
    if cfg.logging.json {
        layers.push(console_layer.json().boxed());
    } else {
        layers.push(console_layer.boxed());
    }
    if let Some(file_layer) = file_layer {
        layers.push(file_layer.boxed());
    }
    tracing_subscriber::registry().with(layers).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::load_from(&cli.config)?;
    init_logging(&cfg);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => supervisor::run(cfg).await?,
        Command::Check => supervisor::run_check(cfg).await?,
        Command::Validate => {
            supervisor::validate(&cfg)?;
            println!("configuration OK: {} nodes", cfg.nodes.len());
        }
    }
    Ok(())
}
