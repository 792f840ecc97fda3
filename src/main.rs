use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod app;
mod catalog;
mod cli;
mod config;
mod embeddings;
mod enhance;
mod media;
mod store;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = AppFactory::create_config()?;

    match args.command {
        cli::Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let service = AppFactory::create_service(&config)?;
            web::start_daemon(service, config)
        }

        cli::Command::Status {} => {
            let service = AppFactory::create_service(&config)?;
            print_json(&service.collections_status())
        }

        cli::Command::Bird { id } => {
            let service = AppFactory::create_service(&config)?;
            print_json(&service.bird(id)?)
        }

        cli::Command::Search { query, limit } => {
            let service = AppFactory::create_service(&config)?;
            print_json(&service.search_text(&query, limit)?)
        }
    }
}
