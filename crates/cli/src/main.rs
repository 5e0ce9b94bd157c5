use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "receipt-bot")]
#[command(about = "Receipt bot: LINE webhook, Gemini analysis, Notion storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the config file with placeholder secrets. Existing values are kept.
    Init {
        /// Config file path (default: RECEIPT_BOT_CONFIG_PATH or ~/.receipt-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook gateway (HTTP). Secrets come from the environment or the config file.
    Gateway {
        /// Config file path (default: RECEIPT_BOT_CONFIG_PATH or ~/.receipt-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8787)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("receipt-bot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(receipts::config::default_config_path);
    let (_dir, filled) = receipts::init::init_config_dir(&path)?;
    if filled > 0 {
        println!(
            "wrote {} placeholder secret(s) to {}; replace them or set the matching env vars",
            filled,
            path.display()
        );
    } else {
        println!("configuration already initialized at {}", path.display());
    }
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = receipts::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    receipts::gateway::run_gateway(config, path).await
}
