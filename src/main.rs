use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing::{error, info};

use weather_mcp::chat::{self, ChatGateway};
use weather_mcp::client::McpClient;
use weather_mcp::config::Config;
use weather_mcp::llm::{GeminiClient, TextCompletion};
use weather_mcp::mcp::{self, McpServer, RequestHandler};

/// Weather MCP server and chat gateway.
#[derive(Parser, Debug)]
#[command(name = "weather-mcp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "WEATHER_MCP_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the weather tools over MCP
    Serve {
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        /// Override `server.bind` for the HTTP transport
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the chat gateway against an HTTP MCP server
    Gateway {
        /// Override `gateway.bind`
        #[arg(long)]
        bind: Option<String>,

        /// Override `gateway.mcp_url`
        #[arg(long)]
        mcp_url: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { transport, bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            run_server(config, transport).await
        }
        Commands::Gateway { bind, mcp_url } => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            if let Some(mcp_url) = mcp_url {
                config.gateway.mcp_url = mcp_url;
            }
            run_gateway(config).await
        }
    }
}

async fn run_server(config: Config, transport: Transport) -> Result<()> {
    let handler = RequestHandler::from_config(&config)?;
    let server = McpServer::new(Arc::new(handler));

    match transport {
        Transport::Stdio => {
            info!("serving MCP over stdio");
            tokio::select! {
                result = server.run() => {
                    if let Err(e) = result {
                        error!("MCP server error: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {}
            }
            Ok(())
        }
        Transport::Http => mcp::http::serve(server, &config.server).await,
    }
}

async fn run_gateway(config: Config) -> Result<()> {
    let client = McpClient::from_config(&config.gateway, &config.connection)?;
    let completion = GeminiClient::from_config(&config.llm, &config.connection)?
        .map(|client| Arc::new(client) as Arc<dyn TextCompletion>);

    let gateway = Arc::new(ChatGateway::new(Arc::new(client), completion));
    chat::http::serve(gateway, &config.gateway).await
}

fn init_logging() -> Result<()> {
    // Support both LOG_LEVEL and RUST_LOG environment variables
    let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
        tracing_subscriber::EnvFilter::try_new(rust_log)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    } else if let Ok(log_level) = std::env::var("LOG_LEVEL") {
        let level_str = match log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "warn",
        };
        tracing_subscriber::EnvFilter::new(level_str)
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // stdout carries JSON-RPC in stdio mode
        .with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
