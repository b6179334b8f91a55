//! The reverse-WebSocket driver: accepts a single OneBot V11 implementation
//! connecting in to a configured path and port, framing outbound actions as
//! `{action, params, echo}` and distinguishing API-response frames (carry
//! both `echo` and `retcode`) from events. Grounded in
//! `original_source/libraries/drivers/reversews_driver.py` (FastAPI/uvicorn),
//! adapted to `hyper`'s server-accept loop (see `server::health` for the
//! `TokioIo` + `http1::Builder` idiom this reuses) handing the upgraded
//! connection off to `tokio_tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverEvent};
use crate::error::DriverError;

pub const PROTOCOL: &str = "onebotv11";
pub const DEFAULT_PATH: &str = "/ws/api";
pub const DEFAULT_PORT: u16 = 21050;

#[derive(Debug, Clone)]
pub struct ReverseWsConfig {
	pub path: String,
	pub port: u16,
}

impl Default for ReverseWsConfig {
	fn default() -> Self {
		Self { path: DEFAULT_PATH.to_string(), port: DEFAULT_PORT }
	}
}

/// The single active connection's outbound half, if a client is connected.
type OutboundSink = mpsc::UnboundedSender<Message>;

pub struct ReverseWsDriver {
	config: ReverseWsConfig,
	listener_task: Mutex<Option<JoinHandle<()>>>,
	outbound: Arc<Mutex<Option<OutboundSink>>>,
	echo_counter: AtomicU64,
}

impl ReverseWsDriver {
	pub fn new(config: ReverseWsConfig) -> Self {
		Self {
			config,
			listener_task: Mutex::new(None),
			outbound: Arc::new(Mutex::new(None)),
			echo_counter: AtomicU64::new(0),
		}
	}

	fn next_echo(&self) -> String {
		format!("action_{}", self.echo_counter.fetch_add(1, Ordering::Relaxed))
	}

	async fn accept_loop(listener: TcpListener, path: String, outbound: Arc<Mutex<Option<OutboundSink>>>, events_tx: mpsc::Sender<DriverEvent>) {
		loop {
			let (stream, peer) = match listener.accept().await {
				Ok(pair) => pair,
				Err(e) => {
					warn!(error = %e, "reverse-ws accept failed");
					continue;
				}
			};

			let io = TokioIo::new(stream);
			let path = path.clone();
			let outbound = Arc::clone(&outbound);
			let events_tx = events_tx.clone();

			tokio::spawn(async move {
				let service = service_fn(move |req| {
					let path = path.clone();
					let outbound = Arc::clone(&outbound);
					let events_tx = events_tx.clone();
					async move { handle_request(req, path, outbound, events_tx).await }
				});
				if let Err(e) = http1::Builder::new().serve_connection(io, service).with_upgrades().await {
					debug!(peer = %peer, error = %e, "reverse-ws connection closed");
				}
			});
		}
	}

	async fn handle_connection<S>(ws_stream: WebSocketStream<S>, events_tx: mpsc::Sender<DriverEvent>, outbound: Arc<Mutex<Option<OutboundSink>>>)
	where
		S: AsyncRead + AsyncWrite + Unpin,
	{
		let (mut write, mut read) = ws_stream.split();
		let (tx, mut outbound_rx) = mpsc::unbounded_channel();
		*outbound.lock().unwrap() = Some(tx);
		info!("onebot implementation connected");

		let mut connected_self_id: Option<String> = None;

		loop {
			tokio::select! {
				outgoing = outbound_rx.recv() => {
					let Some(msg) = outgoing else { break };
					if let Err(e) = write.send(msg).await {
						warn!(error = %e, "reverse-ws send failed");
						break;
					}
				}
				incoming = read.next() => {
					let Some(incoming) = incoming else { break };
					let msg = match incoming {
						Ok(m) => m,
						Err(e) => {
							warn!(error = %e, "reverse-ws read failed");
							break;
						}
					};
					if !msg.is_text() {
						continue;
					}
					let Ok(data) = serde_json::from_str::<Value>(msg.to_text().unwrap_or_default()) else {
						warn!("reverse-ws received a non-JSON frame");
						continue;
					};

					if data.get("echo").is_some() && data.get("retcode").is_some() {
						debug!(?data, "received api response");
						continue;
					}

					let is_connect = data.get("post_type").and_then(Value::as_str) == Some("meta_event")
						&& data.get("sub_type").and_then(Value::as_str) == Some("connect");

					if is_connect {
						let self_id = data
							.get("self_id")
							.map(|v| match v {
								Value::String(s) => s.clone(),
								other => other.to_string(),
							})
							.unwrap_or_else(|| "unknown".to_string());
						connected_self_id = Some(self_id.clone());
						let _ = events_tx.send(DriverEvent::Connected { self_id, config: data }).await;
					} else {
						let _ = events_tx.send(DriverEvent::Raw(data)).await;
					}
				}
			}
		}

		*outbound.lock().unwrap() = None;
		if let Some(self_id) = connected_self_id {
			let _ = events_tx.send(DriverEvent::Disconnected { self_id }).await;
		}
		info!("onebot implementation disconnected");
	}
}

async fn handle_request(
	mut req: Request<Incoming>,
	path: String,
	outbound: Arc<Mutex<Option<OutboundSink>>>,
	events_tx: mpsc::Sender<DriverEvent>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
	if req.uri().path() != path {
		return Ok(Response::builder().status(StatusCode::NOT_FOUND).body(Full::new(Bytes::new())).unwrap());
	}

	let is_upgrade = req
		.headers()
		.get(UPGRADE)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.eq_ignore_ascii_case("websocket"))
		.unwrap_or(false);
	if !is_upgrade {
		return Ok(Response::builder()
			.status(StatusCode::BAD_REQUEST)
			.body(Full::new(Bytes::from_static(b"expected a websocket upgrade")))
			.unwrap());
	}

	let Some(key) = req.headers().get(SEC_WEBSOCKET_KEY).cloned() else {
		return Ok(Response::builder().status(StatusCode::BAD_REQUEST).body(Full::new(Bytes::new())).unwrap());
	};
	let accept_key = derive_accept_key(key.as_bytes());

	tokio::spawn(async move {
		match hyper::upgrade::on(&mut req).await {
			Ok(upgraded) => {
				let io = TokioIo::new(upgraded);
				let ws_stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
				ReverseWsDriver::handle_connection(ws_stream, events_tx, outbound).await;
			}
			Err(e) => warn!(error = %e, "reverse-ws upgrade failed"),
		}
	});

	Ok(Response::builder()
		.status(StatusCode::SWITCHING_PROTOCOLS)
		.header(CONNECTION, "upgrade")
		.header(UPGRADE, "websocket")
		.header(SEC_WEBSOCKET_ACCEPT, accept_key)
		.body(Full::new(Bytes::new()))
		.unwrap())
}

#[async_trait]
impl Driver for ReverseWsDriver {
	fn protocol(&self) -> &str {
		PROTOCOL
	}

	async fn start(&self, events_tx: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
		let addr = format!("0.0.0.0:{}", self.config.port);
		let listener = TcpListener::bind(&addr).await.map_err(|e| DriverError::Transport(e.into()))?;
		info!(addr = %addr, path = %self.config.path, "reverse-ws driver listening");

		let path = self.config.path.clone();
		let outbound = Arc::clone(&self.outbound);
		let handle = tokio::spawn(ReverseWsDriver::accept_loop(listener, path, outbound, events_tx));
		*self.listener_task.lock().unwrap() = Some(handle);
		Ok(())
	}

	async fn stop(&self) -> Result<(), DriverError> {
		if let Some(handle) = self.listener_task.lock().unwrap().take() {
			handle.abort();
		}
		*self.outbound.lock().unwrap() = None;
		Ok(())
	}

	async fn send_action(&self, mut action: Value) -> Result<(), DriverError> {
		let Some(sink) = self.outbound.lock().unwrap().clone() else {
			warn!("no active reverse-ws connection, action dropped");
			return Ok(());
		};

		if action.get("echo").is_none()
			&& let Value::Object(map) = &mut action
		{
			map.insert("echo".to_string(), json!(self.next_echo()));
		}

		let text = serde_json::to_string(&action).map_err(|e| DriverError::Transport(e.into()))?;
		sink.send(Message::text(text)).map_err(|e| DriverError::Transport(anyhow::anyhow!(e.to_string())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_matches_spec_defaults() {
		let config = ReverseWsConfig::default();
		assert_eq!(config.path, "/ws/api");
		assert_eq!(config.port, 21050);
	}

	#[tokio::test]
	async fn send_action_without_a_connection_is_dropped_not_errored() {
		let driver = ReverseWsDriver::new(ReverseWsConfig::default());
		let result = driver.send_action(json!({"action": "send_msg", "params": {}})).await;
		assert!(result.is_ok());
	}

	#[test]
	fn echo_counter_increments() {
		let driver = ReverseWsDriver::new(ReverseWsConfig::default());
		assert_ne!(driver.next_echo(), driver.next_echo());
	}
}
