use clap::Parser;
use okxbench::config::{AppConfig, Mode};
use okxbench::error::Result;
use okxbench::pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// OKX order-book connector with a concurrent matrix-inversion workload
#[derive(Parser, Debug)]
#[command(name = "okxbench", version, about)]
struct Cli {
    /// Settings profile to load from the config directory
    #[arg(long, value_enum, default_value_t = Mode::Demo)]
    mode: Mode,

    /// Directory holding <mode>.json / <mode>.toml settings files
    #[arg(long, default_value = "config")]
    config_dir: std::path::PathBuf,

    /// Observation window override, in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Matrix dimension override
    #[arg(long)]
    dim: Option<usize>,

    /// Instrument override (e.g. BTC-USDT)
    #[arg(long)]
    instrument: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_fallback(cli.mode, &cli.config_dir);
    if let Some(window) = cli.window_secs {
        config.run.window_secs = window;
    }
    if let Some(dim) = cli.dim {
        config.run.matrix_dim = dim;
    }
    if let Some(instrument) = cli.instrument {
        config.run.inst_id = instrument;
    }

    info!(
        mode = %cli.mode,
        url_pub = %config.okx.url_pub,
        api_key = %config.okx.masked_key(),
        inst_id = %config.run.inst_id,
        dim = config.run.matrix_dim,
        window_secs = config.run.window_secs,
        "starting order-book / inversion pipeline"
    );

    let report = pipeline::run(config).await?;

    println!(
        "Total WebSocket messages received: {}",
        report.messages_received
    );
    println!(
        "Total inversions completed: {}",
        report.inversions_completed
    );

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,okxbench=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
