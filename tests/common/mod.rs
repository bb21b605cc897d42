//! Shared fixtures for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::response::IntoResponse;
use axum::Json;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use wiregate::cors::OriginRequirement;
use wiregate::http::{build_router, GatewayState};
use wiregate::routing::compiler::ParamValue;
use wiregate::routing::{EndpointHandler, Route, RouteTable, SocketHandler};
use wiregate::shape::{BasicValidator, Shape};
use wiregate::ws::channel::{ChannelEvent, MessageContract, ReplyPredicate};
use wiregate::ws::subprotocol::SubprotocolContract;

/// Endpoint handler that reports the extracted path parameters.
fn params_handler() -> EndpointHandler {
    Arc::new(|path_match, _request| {
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
            Json(json!({ "path": path_match.path, "params": params })).into_response()
        })
    })
}

/// Socket handler that echoes every valid message until close.
fn echo_handler() -> SocketHandler {
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
                    ChannelEvent::Closed => break,
                    _ => {}
                }
            }
        })
    })
}

/// Socket handler that opens with a ping and waits for the matching pong,
/// skipping unrelated messages, then reports the outcome.
fn ask_handler() -> SocketHandler {
    Arc::new(|channel, _path_match| {
        Box::pin(async move {
            let predicate: ReplyPredicate = Arc::new(|payload: &Option<Value>| {
                payload
                    .as_ref()
                    .map(|value| value["op"] == "pong")
                    .unwrap_or(false)
            });
            let reply = channel
                .send_and_wait_for_reply(Some(&json!({ "op": "ping" })), Some(predicate), None)
                .await;
            let outcome = match reply {
                Ok(_) => json!({ "ok": true }),
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            };
            let _ = channel.send(Some(&outcome));
            channel.close().await;
        })
    })
}

fn any_contract() -> MessageContract {
    MessageContract {
        inbound: Some(Shape::of_type("any")),
        outbound: Some(Shape::of_type("any")),
    }
}

/// Route table exercised by the integration tests:
/// - `/users/:id`: open to any origin (service-level fallback)
/// - `/admin/*rest`: restricted to a literal origin
/// - `/feed`: socket requiring the `rpc.v1` subprotocol
/// - `/open`: socket accepting any subprotocol set
/// - `/ask`: socket driving a ping/pong request-reply exchange
pub fn test_table() -> RouteTable {
    RouteTable::new(vec![
        Route::endpoint("users", "/users/:id", vec![Method::GET], params_handler()).unwrap(),
        Route::endpoint(
            "admin",
            "/admin/*rest",
            vec![Method::GET, Method::POST],
            params_handler(),
        )
        .unwrap()
        .with_origin(OriginRequirement::Literal("https://admin.example".into())),
        Route::socket(
            "feed",
            "/feed",
            any_contract(),
            SubprotocolContract::LiteralPlusFree {
                literal: "rpc.v1".into(),
                free: 0,
            },
            echo_handler(),
        )
        .unwrap(),
        Route::socket(
            "open",
            "/open",
            any_contract(),
            SubprotocolContract::Any,
            echo_handler(),
        )
        .unwrap(),
        Route::socket(
            "ask",
            "/ask",
            any_contract(),
            SubprotocolContract::Any,
            ask_handler(),
        )
        .unwrap(),
    ])
}

#[allow(dead_code)]
pub fn test_router() -> Router {
    let state = GatewayState {
        table: Arc::new(test_table()),
        service_origin: Arc::new(OriginRequirement::AnyOrigin),
        validator: Arc::new(BasicValidator),
        open_timeout: Duration::from_secs(5),
        reply_timeout: Duration::from_secs(5),
    };
    build_router(state, Duration::from_secs(5))
}

/// Serve the test router on an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_gateway() -> SocketAddr {
    let router = test_router();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
