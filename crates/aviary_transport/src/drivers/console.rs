//! The console driver: reads lines from stdin on a blocking task and prints
//! outbound messages to stdout. Connects immediately at `start()` rather than
//! waiting on any handshake, mirroring `original_source/libraries/drivers/
//! console_driver.py`'s `on_connect()` call from `__init__`.

use std::sync::Mutex;

use async_trait::async_trait;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::driver::{Driver, DriverEvent};
use crate::error::DriverError;

pub const PROTOCOL: &str = "console";

pub struct ConsoleDriver {
	task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ConsoleDriver {
	fn default() -> Self {
		Self::new()
	}
}

impl ConsoleDriver {
	pub fn new() -> Self {
		Self { task: Mutex::new(None) }
	}

	fn read_loop(events_tx: mpsc::Sender<DriverEvent>) {
		let mut editor = match DefaultEditor::new() {
			Ok(editor) => editor,
			Err(e) => {
				error!(error = %e, "console driver failed to start the line editor");
				return;
			}
		};

		loop {
			match editor.readline("> ") {
				Ok(line) => {
					let line = line.trim();
					if !line.is_empty() {
						let _ = editor.add_history_entry(line);
						if events_tx.blocking_send(DriverEvent::Raw(json!({ "text": line }))).is_err() {
							break;
						}
					}
				}
				Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
					let _ = events_tx.blocking_send(DriverEvent::Disconnected { self_id: "Console".into() });
					break;
				}
				Err(e) => {
					error!(error = %e, "console driver readline error");
					break;
				}
			}
		}
	}
}

#[async_trait]
impl Driver for ConsoleDriver {
	fn protocol(&self) -> &str {
		PROTOCOL
	}

	async fn start(&self, events_tx: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
		events_tx
			.send(DriverEvent::Connected { self_id: "Console".into(), config: json!({}) })
			.await
			.map_err(|e| DriverError::Transport(e.into()))?;

		let handle = tokio::task::spawn_blocking(move || ConsoleDriver::read_loop(events_tx));
		*self.task.lock().unwrap() = Some(handle);
		info!("console driver started");
		Ok(())
	}

	async fn stop(&self) -> Result<(), DriverError> {
		// `readline()` on the blocking task can't be interrupted mid-call; the
		// task exits on its own after the next line or EOF. We just drop our
		// handle to it here.
		if let Some(handle) = self.task.lock().unwrap().take() {
			handle.abort();
		}
		Ok(())
	}

	async fn send_action(&self, action: Value) -> Result<(), DriverError> {
		if let Some(message) = action.get("message").and_then(Value::as_str) {
			println!("{message}");
		}
		Ok(())
	}
}
