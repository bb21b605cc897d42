//! Wiregate - request routing and negotiation gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                   GATEWAY                      │
//!                       │                                                │
//!     Client Request    │  ┌─────────┐    ┌───────────┐    ┌─────────┐  │
//!     ──────────────────┼─▶│  http   │───▶│  routing  │───▶│  cors   │  │
//!                       │  │ server  │    │  (paths)  │    │ policy  │  │
//!                       │  └─────────┘    └───────────┘    └────┬────┘  │
//!                       │                                       │       │
//!                       │              endpoint ◀───────────────┤       │
//!                       │                                       ▼       │
//!                       │  ┌──────────────┐    ┌─────────────────────┐  │
//!     WebSocket         │  │ subprotocol  │───▶│   message channel   │  │
//!     ◀─────────────────┼──│ negotiation  │    │ (shapes + replies)  │  │
//!                       │  └──────────────┘    └─────────────────────┘  │
//!                       │                                                │
//!                       │  ┌──────────────────────────────────────────┐ │
//!                       │  │  config   observability   lifecycle      │ │
//!                       │  └──────────────────────────────────────────┘ │
//!                       └───────────────────────────────────────────────┘
//! ```
//!
//! The binary wires configured routes to demonstration handlers: endpoint
//! routes echo their extracted path parameters as JSON, socket routes echo
//! every valid message back. Embedders use the library crate and register
//! their own handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;
use axum::response::IntoResponse;
use axum::Json;
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::warn;

use wiregate::config::{self, GatewayConfig, RouteKindConfig};
use wiregate::http::GatewayServer;
use wiregate::observability::{logging, metrics};
use wiregate::routing::compiler::ParamValue;
use wiregate::routing::{EndpointHandler, Route, RouteTable, SocketHandler};
use wiregate::shape::{BasicValidator, Shape};
use wiregate::ws::channel::{ChannelEvent, MessageContract};
use wiregate::ws::subprotocol::SubprotocolContract;

#[derive(Parser)]
#[command(name = "wiregate", about = "Request routing and negotiation gateway")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // A config that fails to load or validate refuses to start the service.
    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_filter);
    tracing::info!(service = %config.service.name, "wiregate starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(address) => metrics::init(address)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let table = build_table(&config)?;
    tracing::info!(routes = table.len(), "Route table built");

    let service_origin = config.service.origin.to_requirement()?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let server = GatewayServer::new(
        &config,
        Arc::new(table),
        service_origin,
        Arc::new(BasicValidator),
    );
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Turn configured routes into a table backed by the demo handlers.
fn build_table(config: &GatewayConfig) -> Result<RouteTable, Box<dyn std::error::Error>> {
    let mut routes = Vec::with_capacity(config.routes.len());
    for route_config in &config.routes {
        let route = match route_config.kind {
            RouteKindConfig::Endpoint => {
                let methods = route_config
                    .methods
                    .iter()
                    .map(|m| Method::from_str(m))
                    .collect::<Result<Vec<_>, _>>()?;
                Route::endpoint(
                    &route_config.name,
                    &route_config.path,
                    methods,
                    echo_endpoint(route_config.name.clone()),
                )?
            }
            RouteKindConfig::Socket => {
                let subprotocols = route_config
                    .subprotocol
                    .as_ref()
                    .map(|s| s.to_contract())
                    .unwrap_or(SubprotocolContract::Any);
                let contract = MessageContract {
                    inbound: Some(Shape::of_type("any")),
                    outbound: Some(Shape::of_type("any")),
                };
                Route::socket(
                    &route_config.name,
                    &route_config.path,
                    contract,
                    subprotocols,
                    echo_socket(),
                )?
            }
        };
        let route = match &route_config.origin {
            Some(origin) => route.with_origin(origin.to_requirement()?),
            None => route,
        };
        routes.push(route);
    }
    Ok(RouteTable::new(routes))
}

/// Responds with the route name and the extracted path parameters.
fn echo_endpoint(name: String) -> EndpointHandler {
    Arc::new(move |path_match, _request| {
        let name = name.clone();
        Box::pin(async move {
            let params: serde_json::Map<String, Value> = path_match
                .params
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        ParamValue::Single(s) => Value::String(s.clone()),
                        ParamValue::Segments(segments) => Value::Array(
                            segments.iter().cloned().map(Value::String).collect(),
                        ),
                    };
                    (key.clone(), value)
                })
                .collect();
            Json(json!({
                "route": name,
                "path": path_match.path,
                "params": params,
            }))
            .into_response()
        })
    })
}

/// Echoes every valid inbound message until the peer closes.
fn echo_socket() -> SocketHandler {
    Arc::new(|channel, _path_match| {
        Box::pin(async move {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            channel.subscribe(move |event| {
                let _ = tx.send(event);
            });
            while let Some(event) = rx.recv().await {
                match event {
                    ChannelEvent::Message(payload) => {
                        if channel.send(payload.as_ref()).is_err() {
                            break;
                        }
                    }
                    ChannelEvent::InvalidMessage { reason, .. } => {
                        warn!(reason = %reason, "Dropping invalid message");
                    }
                    ChannelEvent::Unexpected { .. } => {}
                    ChannelEvent::Closed => break,
                }
            }
            channel.close().await;
        })
    })
}
