//! Type-erased handler storage for commands, functions, and named events —
//! the same boxed-future idiom `aviary_bus::handler` uses for bus
//! subscribers, applied to the registry's own three handler kinds.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aviary_domain::{CommandEvent, MessageRequest};
use serde_json::Value;

/// What a command handler may hand back to the registry.
pub enum CommandOutcome {
	Message(MessageRequest),
	/// Legacy string coercion: wrapped into a [`MessageRequest`] inheriting
	/// the invoking [`CommandEvent`]'s platform/user/group.
	Text(String),
}

pub trait CommandHandler: Send + Sync {
	fn call(&self, event: Arc<CommandEvent>) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutcome>> + Send + '_>>;
}

impl<F, Fut> CommandHandler for F
where
	F: Fn(Arc<CommandEvent>) -> Fut + Send + Sync,
	Fut: Future<Output = anyhow::Result<CommandOutcome>> + Send + 'static,
{
	fn call(&self, event: Arc<CommandEvent>) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutcome>> + Send + '_>> {
		Box::pin(self(event))
	}
}

pub trait FunctionHandler: Send + Sync {
	fn call(&self, args: Vec<Value>) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Value>>> + Send + '_>>;
}

impl<F, Fut> FunctionHandler for F
where
	F: Fn(Vec<Value>) -> Fut + Send + Sync,
	Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
	fn call(&self, args: Vec<Value>) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Value>>> + Send + '_>> {
		Box::pin(self(args))
	}
}
