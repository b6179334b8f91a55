//! Type-erased handler/middleware storage.
//!
//! Subscribers register a strongly-typed async closure over a concrete
//! [`Event`] type; internally the bus only ever holds `Arc<dyn HandlerFn>`
//! keyed by `TypeId`, so `erase` does the one-time downcast-and-call
//! wrapping needed to put a typed closure behind that object-safe trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use aviary_domain::{BoxedEvent, Event, downcast_event};

use crate::HandlerResult;

/// Opaque token returned by `EventBus::subscribe`, required by
/// `EventBus::unsubscribe` to remove that exact registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	pub(crate) fn new() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}
}

/// A handler subscribed against the concrete event type `E`.
///
/// `anyhow::Error` is used here (rather than a typed `thiserror` error)
/// because handler bodies live in plugin code outside this crate's control;
/// the bus only needs to log and isolate the failure, never match on it.
pub trait Handler<E: Event>: Send + Sync {
	fn call(&self, event: Arc<E>) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<HandlerResult>>> + Send + '_>>;
}

impl<E, F, Fut> Handler<E> for F
where
	E: Event,
	F: Fn(Arc<E>) -> Fut + Send + Sync,
	Fut: Future<Output = anyhow::Result<Option<HandlerResult>>> + Send + 'static,
{
	fn call(&self, event: Arc<E>) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<HandlerResult>>> + Send + '_>> {
		Box::pin(self(event))
	}
}

/// Object-safe, type-erased form of [`Handler`] as stored by the bus.
pub trait HandlerFn: Send + Sync {
	fn call<'a>(&'a self, event: BoxedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<HandlerResult>>> + Send + 'a>>;
}

struct Erased<E: Event, H: Handler<E>> {
	inner: H,
	_marker: std::marker::PhantomData<fn(Arc<E>)>,
}

impl<E, H> HandlerFn for Erased<E, H>
where
	E: Event + 'static,
	H: Handler<E>,
{
	fn call<'a>(&'a self, event: BoxedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<HandlerResult>>> + Send + 'a>> {
		Box::pin(async move {
			let Some(typed) = downcast_event::<E>(event) else {
				anyhow::bail!("event failed to downcast to the subscribed type; this indicates a TypeId collision and should never happen");
			};
			self.inner.call(typed).await
		})
	}
}

pub(crate) fn erase<E, H>(handler: H) -> Arc<dyn HandlerFn>
where
	E: Event + 'static,
	H: Handler<E> + 'static,
{
	Arc::new(Erased::<E, H> { inner: handler, _marker: std::marker::PhantomData })
}

/// A link in the publish-time middleware chain. Returning `Ok(None)` aborts
/// propagation (the event is dropped); returning `Ok(Some(event))` passes
/// `event` (possibly rewritten) to the next link, or to subscriber dispatch
/// if this was the last one.
pub trait Middleware: Send + Sync {
	fn apply<'a>(&'a self, event: BoxedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BoxedEvent>>> + Send + 'a>>;
}

impl<F, Fut> Middleware for F
where
	F: Fn(BoxedEvent) -> Fut + Send + Sync,
	Fut: Future<Output = anyhow::Result<Option<BoxedEvent>>> + Send + 'static,
{
	fn apply<'a>(&'a self, event: BoxedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<BoxedEvent>>> + Send + 'a>> {
		Box::pin(self(event))
	}
}
