use std::sync::Arc;

use dtnweb::config::Config;
use dtnweb::event::{ChannelHandler, Event, Inbound};
use dtnweb::server::{Webserver, listener};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Answers every event with its own parameters until the server shuts down.
async fn echo_worker(server: Arc<Webserver>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(message) = inbound.recv().await {
        match message {
            Inbound::Open { socket, domain } => {
                tracing::info!(socket = %socket, domain = %domain, "client connected");
            }
            Inbound::Event { socket, event } => {
                let mut reply = Event::new(event.event.clone())
                    .with_response(event.parameter.clone())
                    .with_error(0, "");
                if !event.uuid.is_empty() {
                    reply.uuid = event.uuid;
                }
                if let Err(e) = server.send(socket, &reply).await {
                    tracing::warn!(socket = %socket, error = %e, "reply not sent");
                }
            }
            Inbound::Close { socket } => {
                tracing::info!(socket = %socket, "client disconnected");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let (handler, inbound) = ChannelHandler::new();
    let server = Arc::new(Webserver::new(cfg, Arc::new(handler)));
    tokio::spawn(echo_worker(server.clone(), inbound));

    tokio::select! {
        res = listener::run(server) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
