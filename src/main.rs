use clap::Parser;
use rolenode::{
    config::Config,
    constants::*,
    events::{dispatcher::EventDispatcher, init_events_from_config},
    network::LoggingHandler,
    server::NodeServer,
};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "rolenode multi-role connection manager")]
struct Args {
    /// Optional path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        match Config::from_file(&config_path) {
            Ok(cfg) => {
                println!("{}Loaded config from: {}", ICON_PLACEHOLDER, config_path);
                cfg
            }
            Err(err) => {
                eprintln!("❌ {:#}", err);
                std::process::exit(1);
            }
        }
    } else {
        println!(
            "⚠️ No config file found at '{}', falling back to default role groups.",
            config_path
        );
        Config {
            listeners: Config::default_listeners(),
            ..Config::default()
        }
    };

    // events first so startup failures reach the audit log
    init_events_from_config(config.logging.as_ref()).await;

    let app_name = config
        .app_name
        .clone()
        .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());
    println!("{}{} {}", ICON_PLACEHOLDER, app_name, full_version());

    let server = NodeServer::new(config, Arc::new(LoggingHandler));
    if let Err(e) = server.start().await {
        eprintln!("❌ Failed to start node: {}", e);
        flush_events().await;
        std::process::exit(1);
    }
    if let Some(id) = server.node_id() {
        println!("{}Node identifier: {}", ICON_PLACEHOLDER, id);
    }
    for l in server.listeners() {
        println!(
            "{}Listening on {} roles={}{}",
            ICON_PLACEHOLDER,
            l.address,
            l.roles,
            if l.secure { " (tls)" } else { "" }
        );
    }

    if let Err(e) = signal::ctrl_c().await {
        eprintln!("❌ Failed to listen for Ctrl+C: {}", e);
    }
    println!("\n🛑 Shutting down...");
    server.shutdown().await;
    flush_events().await;
}

async fn flush_events() {
    // let the dispatcher task drain queued events before sinks flush
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    if let Some(d) = EventDispatcher::global() {
        d.flush().await;
    }
}
