#![forbid(unsafe_code)]
//! The registry: the single source of truth for the names a plugin exposes
//! (commands, named functions, event subscriptions), permission-gated
//! command dispatch, and the crash ledger that auto-disables repeat
//! offenders.

mod error;
mod handler;

pub use error::RegistryError;
pub use handler::{CommandHandler, CommandOutcome, FunctionHandler};

use std::sync::Arc;

use aviary_bus::{EventBus, HandlerResult, SubscriptionId};
use aviary_domain::{CommandEvent, GenericEvent, MessageChain, MessageRequest};
use aviary_perms::{PermQuery, PermSystem};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{error, warn};

/// Crash-ledger entry kind, keyed alongside the entry's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
	Command,
	Function,
	Event,
}

impl std::fmt::Display for Kind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Kind::Command => "command",
			Kind::Function => "function",
			Kind::Event => "event",
		};
		f.write_str(s)
	}
}

/// Crashes an entry tolerates before the registry auto-disables it.
const CRASH_THRESHOLD: u32 = 3;

struct CommandEntry {
	handler: Arc<dyn CommandHandler>,
	permission: Option<Vec<String>>,
}

struct EventEntry {
	subscription: SubscriptionId,
}

/// The registry. Holds no bus subscription of its own except the wrapper
/// handlers created by `register_event`.
pub struct Registry {
	bus: Arc<EventBus>,
	perms: Arc<PermSystem>,
	commands: DashMap<String, CommandEntry>,
	functions: DashMap<String, Arc<dyn FunctionHandler>>,
	events: DashMap<(String, String), EventEntry>,
	crash_counts: DashMap<(Kind, String), u32>,
	no_command_message: String,
}

impl Registry {
	pub fn new(bus: Arc<EventBus>, perms: Arc<PermSystem>) -> Arc<Self> {
		Self::with_no_command_message(bus, perms, "No command found")
	}

	/// Construct a registry with a configurable "unrecognized command"
	/// reply text.
	pub fn with_no_command_message(bus: Arc<EventBus>, perms: Arc<PermSystem>, no_command_message: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			bus,
			perms,
			commands: DashMap::new(),
			functions: DashMap::new(),
			events: DashMap::new(),
			crash_counts: DashMap::new(),
			no_command_message: no_command_message.into(),
		})
	}

	/// Register a command. A duplicate name overwrites the previous
	/// registration with a warning, matching the permissive re-registration
	/// behavior plugins rely on when hot-reloaded.
	pub fn register_command<H>(&self, name: impl Into<String>, handler: H, permission: Option<Vec<String>>)
	where
		H: CommandHandler + 'static,
	{
		let name = name.into();
		if self.commands.contains_key(&name) {
			warn!(command = %name, "command already registered, overwriting");
		}
		self.commands.insert(name, CommandEntry { handler: Arc::new(handler), permission });
	}

	pub fn unregister_command(&self, name: &str) {
		self.commands.remove(name);
	}

	/// Register a named function. A duplicate name is an error; functions
	/// are meant to be called by name from other plugins, so silently
	/// replacing one could change behavior its callers don't expect.
	pub fn register_function<H>(&self, name: impl Into<String>, handler: H) -> Result<(), RegistryError>
	where
		H: FunctionHandler + 'static,
	{
		let name = name.into();
		if self.functions.contains_key(&name) {
			return Err(RegistryError::FunctionAlreadyRegistered(name));
		}
		self.functions.insert(name, Arc::new(handler));
		Ok(())
	}

	pub fn unregister_function(&self, name: &str) {
		self.functions.remove(name);
	}

	/// Subscribe `handler` to `GenericEvent`s named `event_name`, wrapped so
	/// it's only invoked on a name match. `listener_name` distinguishes
	/// multiple listeners on the same event for unregistration.
	pub fn register_event<H, Fut>(self: &Arc<Self>, event_name: impl Into<String>, listener_name: impl Into<String>, handler: H, priority: i32) -> Result<(), RegistryError>
	where
		H: Fn(Arc<GenericEvent>) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
	{
		let event_name = event_name.into();
		let listener_name = listener_name.into();
		let key = (event_name.clone(), listener_name.clone());
		if self.events.contains_key(&key) {
			return Err(RegistryError::EventListenerAlreadyRegistered { event: event_name, listener: listener_name });
		}

		let filter_name = event_name.clone();
		let registry = Arc::clone(self);
		let listener_for_crash = listener_name.clone();
		let subscription = self.bus.subscribe::<GenericEvent, _>(
			move |ev: Arc<GenericEvent>| {
				let matches = ev.name == filter_name;
				let fut = if matches { Some(handler(ev)) } else { None };
				let registry = Arc::clone(&registry);
				let listener_name = listener_for_crash.clone();
				async move {
					if let Some(fut) = fut {
						if let Err(e) = fut.await {
							error!(listener = %listener_name, error = %e, "event listener failed");
							registry.crash_record(Kind::Event, &listener_name);
						}
					}
					Ok(None::<HandlerResult>)
				}
			},
			priority,
		);

		self.events.insert(key, EventEntry { subscription });
		Ok(())
	}

	pub fn unregister_event(&self, event_name: &str, listener_name: &str) {
		if let Some((_, entry)) = self.events.remove(&(event_name.to_string(), listener_name.to_string())) {
			self.bus.unsubscribe::<GenericEvent>(entry.subscription);
		}
	}

	/// Dispatch a parsed command: permission-check, invoke, and coerce the
	/// result into a [`MessageRequest`]. Never returns an error — dispatch
	/// failures become a `MessageRequest` carrying a user-facing message,
	/// per the registry's "always answer the caller" contract.
	pub async fn execute_command(&self, ev: Arc<CommandEvent>) -> MessageRequest {
		let Some(entry_permission_and_handler) = self.commands.get(&ev.command).map(|e| (e.handler.clone(), e.permission.clone())) else {
			return reply(&ev, &self.no_command_message);
		};
		let (handler, permission) = entry_permission_and_handler;

		if let Some(perms) = &permission {
			let refs: Vec<&str> = perms.iter().map(|s| s.as_str()).collect();
			let query = if refs.len() == 1 { PermQuery::Single(refs[0]) } else { PermQuery::AnyOf(&refs) };
			let group_id = ev.group.as_ref().map(|g| g.group_id.as_str());
			if !self.perms.check(query, &ev.user.user_id, group_id) {
				return reply(&ev, "Permission denied");
			}
		}

		match handler.call(Arc::clone(&ev)).await {
			Ok(CommandOutcome::Message(msg)) => msg,
			Ok(CommandOutcome::Text(text)) => reply(&ev, &text),
			Err(e) => {
				error!(command = %ev.command, error = %e, "command handler failed");
				self.crash_record(Kind::Command, &ev.command);
				reply(&ev, &format!("Error executing command: {e}"))
			}
		}
	}

	/// Invoke a named function directly. Exceptions are captured into the
	/// crash ledger and surfaced as `None`, matching the original
	/// "swallow and log" contract plugins that call other plugins' exported
	/// functions rely on.
	pub async fn execute_function(&self, name: &str, args: Vec<Value>) -> Result<Option<Value>, RegistryError> {
		let Some(handler) = self.functions.get(name).map(|e| e.clone()) else {
			return Err(RegistryError::FunctionNotFound(name.to_string()));
		};
		match handler.call(args).await {
			Ok(result) => Ok(result),
			Err(e) => {
				error!(function = %name, error = %e, "function handler failed");
				self.crash_record(Kind::Function, name);
				Ok(None)
			}
		}
	}

	/// Publish a `GenericEvent` named `name` for `platform`.
	pub async fn execute_event(&self, name: impl Into<String>, platform: impl Into<String>) {
		self.bus.publish(Arc::new(GenericEvent::new(name, platform))).await;
	}

	fn crash_record(&self, kind: Kind, name: &str) {
		let count = {
			let mut entry = self.crash_counts.entry((kind, name.to_string())).or_insert(0);
			*entry += 1;
			*entry
		};
		if count >= CRASH_THRESHOLD {
			warn!(%kind, name, count, "auto-disabling after repeated crashes");
			match kind {
				Kind::Command => self.unregister_command(name),
				Kind::Function => self.unregister_function(name),
				Kind::Event => {
					// Event listeners are keyed by (event_name, listener_name); the
					// crash ledger only has the listener name, so remove every
					// registration under that listener name across all events.
					let matches: Vec<(String, String)> = self.events.iter().map(|e| e.key().clone()).filter(|(_, listener)| listener == name).collect();
					for (event_name, listener_name) in matches {
						self.unregister_event(&event_name, &listener_name);
					}
				}
			}
		}
	}
}

fn reply(ev: &CommandEvent, text: &str) -> MessageRequest {
	MessageRequest {
		platform: ev.platform.clone(),
		event_id: String::new(),
		self_id: ev.self_id.clone(),
		message: MessageChain::text(text),
		user: Some(ev.user.clone()),
		group: ev.group.clone(),
		at_sender: false,
		recall_duration: None,
	}
}
