#![forbid(unsafe_code)]
//! Typed, prioritized, asynchronous pub/sub with a middleware chain and a
//! result queue that re-publishes handler-returned events.

mod handler;
mod metrics;

pub use handler::{Handler, HandlerFn, Middleware, SubscriptionId};
pub use metrics::EventBusMetrics;

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use aviary_domain::{BoxedEvent, Event, MessageRequest, downcast_event};
use dashmap::DashMap;
use metrics::MetricsInner;
use parking_lot_compat::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

mod parking_lot_compat {
	// The bus's subscriber table is read far more often than it's written
	// (publish vs. subscribe/unsubscribe), so a plain std RwLock held only
	// across short critical sections is enough here; no need to pull in a
	// second lock implementation alongside dashmap's internal sharding.
	pub use std::sync::RwLock;
}

const RESULT_QUEUE_BATCH_SIZE: usize = 10;
const RESULT_QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const RESULT_QUEUE_EMPTY_SLEEP: Duration = Duration::from_millis(10);
const RESULT_QUEUE_ERROR_SLEEP: Duration = Duration::from_millis(100);
/// Soft limit on the result queue's size. This is a metric/warning
/// threshold, not an enforced cap — producers are never throttled.
pub const RESULT_QUEUE_SOFT_LIMIT: usize = 1000;

struct Subscription {
	id: SubscriptionId,
	priority: i32,
	seq: u64,
	handler: Arc<dyn HandlerFn>,
}

/// The event bus: subscribe by concrete event type, publish, and let the
/// result-queue worker re-publish whatever handlers return.
pub struct EventBus {
	subscribers: DashMap<TypeId, RwLock<Vec<Subscription>>>,
	middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
	result_tx: mpsc::UnboundedSender<BoxedEvent>,
	result_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<BoxedEvent>>>,
	queue_len: AtomicU64,
	metrics: MetricsInner,
	running: AtomicBool,
	worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
	next_seq: AtomicU64,
}

impl EventBus {
	pub fn new() -> Arc<Self> {
		let (result_tx, result_rx) = mpsc::unbounded_channel();
		Arc::new(Self {
			subscribers: DashMap::new(),
			middlewares: RwLock::new(Vec::new()),
			result_tx,
			result_rx: tokio::sync::Mutex::new(Some(result_rx)),
			queue_len: AtomicU64::new(0),
			metrics: MetricsInner::default(),
			running: AtomicBool::new(false),
			worker: tokio::sync::Mutex::new(None),
			next_seq: AtomicU64::new(0),
		})
	}

	/// Subscribe `handler` to events of type `E`, kept sorted by descending
	/// priority (ties broken by registration order). Returns a token that
	/// `unsubscribe` accepts — Rust closures have no notion of identity
	/// equality the way Python function objects do, so subscribe/unsubscribe
	/// are paired by this opaque id rather than by handler value.
	pub fn subscribe<E, H>(&self, handler: H, priority: i32) -> SubscriptionId
	where
		E: Event + 'static,
		H: Handler<E> + 'static,
	{
		let id = SubscriptionId::new();
		let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
		let erased = handler::erase::<E, H>(handler);

		let entry = self
			.subscribers
			.entry(TypeId::of::<E>())
			.or_insert_with(|| RwLock::new(Vec::new()));
		let mut subs = entry.write().unwrap();
		subs.push(Subscription { id, priority, seq, handler: erased });
		subs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
		debug!(event_type = std::any::type_name::<E>(), %priority, "subscribed handler");
		id
	}

	/// Unsubscribe a handler previously registered with `subscribe::<E, _>`.
	pub fn unsubscribe<E: Event + 'static>(&self, id: SubscriptionId) {
		if let Some(entry) = self.subscribers.get(&TypeId::of::<E>()) {
			entry.write().unwrap().retain(|s| s.id != id);
		}
	}

	pub fn add_middleware<M: Middleware + 'static>(&self, middleware: M) {
		self.middlewares.write().unwrap().push(Arc::new(middleware));
	}

	/// Start the result-queue worker.
	pub async fn initialize(self: &Arc<Self>) {
		self.running.store(true, Ordering::SeqCst);
		let mut rx_guard = self.result_rx.lock().await;
		let Some(mut rx) = rx_guard.take() else {
			warn!("event bus already initialized");
			return;
		};
		drop(rx_guard);

		let bus = Arc::clone(self);
		let handle = tokio::spawn(async move {
			debug!("result queue worker starting");
			while bus.running.load(Ordering::SeqCst) {
				let mut batch = Vec::with_capacity(RESULT_QUEUE_BATCH_SIZE);
				for _ in 0..RESULT_QUEUE_BATCH_SIZE {
					match tokio::time::timeout(RESULT_QUEUE_POLL_TIMEOUT, rx.recv()).await {
						Ok(Some(event)) => {
							bus.queue_len.fetch_sub(1, Ordering::SeqCst);
							batch.push(event);
						}
						Ok(None) => {
							bus.running.store(false, Ordering::SeqCst);
							break;
						}
						Err(_) => break,
					}
				}

				if batch.is_empty() {
					tokio::time::sleep(RESULT_QUEUE_EMPTY_SLEEP).await;
					continue;
				}

				let start = Instant::now();
				let n = batch.len();
				for event in batch {
					if let Err(e) = std::panic::AssertUnwindSafe(bus.publish_dyn(event)).catch_unwind().await {
						error!(?e, "result queue worker: publish panicked");
						bus.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
						tokio::time::sleep(RESULT_QUEUE_ERROR_SLEEP).await;
					}
				}
				bus.metrics.record_result_batch(n, start.elapsed());
			}
			debug!("result queue worker stopped");
		});

		*self.worker.lock().await = Some(handle);
		debug!("event bus initialized");
	}

	/// Stop the result-queue worker.
	pub async fn shutdown(self: &Arc<Self>) {
		self.running.store(false, Ordering::SeqCst);
		if let Some(handle) = self.worker.lock().await.take() {
			handle.abort();
			let _ = handle.await;
		}
		debug!("event bus shutdown");
	}

	/// Publish `event`: run the middleware chain, then every handler
	/// subscribed to `E`'s concrete type, in priority order. Every non-null
	/// handler return value is enqueued on the result queue.
	pub async fn publish<E: Event + 'static>(&self, event: Arc<E>) {
		self.publish_dyn(event as BoxedEvent).await
	}

	async fn publish_dyn(&self, mut event: BoxedEvent) {
		let start = Instant::now();
		self.metrics.total_events.fetch_add(1, Ordering::Relaxed);

		let middlewares: Vec<_> = self.middlewares.read().unwrap().clone();
		for mw in &middlewares {
			match mw.apply(event).await {
				Ok(Some(next)) => event = next,
				Ok(None) => return,
				Err(e) => {
					error!(error = %e, "middleware error, aborting propagation");
					self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
					return;
				}
			}
		}

		let type_id = (*event).type_id();
		let Some(entry) = self.subscribers.get(&type_id) else {
			debug!("no subscribers for this event type");
			return;
		};
		let handlers: Vec<Arc<dyn HandlerFn>> = entry.read().unwrap().iter().map(|s| Arc::clone(&s.handler)).collect();
		drop(entry);

		for handler in handlers {
			match handler.call(Arc::clone(&event)).await {
				Ok(Some(result)) => self.enqueue_result(&event, result).await,
				Ok(None) => {}
				Err(e) => {
					error!(error = %e, "event handler error");
					self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
				}
			}
		}

		self.metrics.record_event(start.elapsed());
	}

	async fn enqueue_result(&self, source: &BoxedEvent, result: HandlerResult) {
		let event: BoxedEvent = match result {
			HandlerResult::Event(e) => e,
			HandlerResult::LegacyString(text) => {
				warn!("handler returned a bare string; this is deprecated, wrap the reply in a MessageRequest instead");
				let Some(req) = legacy_string_to_message_request(source, &text) else {
					warn!("cannot coerce string result: unsupported source event type");
					return;
				};
				Arc::new(req)
			}
		};

		let _ = self.result_tx.send(event);
		let new_len = self.queue_len.fetch_add(1, Ordering::SeqCst) + 1;
		self.metrics.observe_queue_len(new_len as usize);
		if new_len as usize > RESULT_QUEUE_SOFT_LIMIT {
			warn!(queue_len = new_len, limit = RESULT_QUEUE_SOFT_LIMIT, "result queue exceeded soft limit");
		}
	}

	pub fn metrics(&self) -> EventBusMetrics {
		self.metrics.snapshot(self.queue_len.load(Ordering::SeqCst) as usize)
	}

	pub fn queue_size(&self) -> usize {
		self.queue_len.load(Ordering::SeqCst) as usize
	}

	pub fn is_queue_full(&self) -> bool {
		self.queue_size() >= RESULT_QUEUE_SOFT_LIMIT
	}
}

/// What a handler may hand back to the bus.
pub enum HandlerResult {
	Event(BoxedEvent),
	/// Legacy string coercion path (see `DESIGN.md`): a bare `String`
	/// return is wrapped into a `MessageRequest` inheriting the source
	/// event's platform/event/user/group.
	LegacyString(String),
}

fn legacy_string_to_message_request(source: &BoxedEvent, text: &str) -> Option<MessageRequest> {
	use aviary_domain::{CommandEvent, MessageChain, MessageEvent, NoticeEvent};

	let body = MessageChain::text(text);

	if let Some(ev) = downcast_event::<MessageEvent>(Arc::clone(source)) {
		return Some(MessageRequest {
			platform: ev.platform.clone(),
			event_id: ev.event_id.clone(),
			self_id: ev.self_id.clone(),
			message: body,
			user: Some(ev.user.clone()),
			group: ev.group.clone(),
			at_sender: false,
			recall_duration: None,
		});
	}
	if let Some(ev) = downcast_event::<CommandEvent>(Arc::clone(source)) {
		return Some(MessageRequest {
			platform: ev.platform.clone(),
			event_id: String::new(),
			self_id: ev.self_id.clone(),
			message: body,
			user: Some(ev.user.clone()),
			group: ev.group.clone(),
			at_sender: false,
			recall_duration: None,
		});
	}
	if let Some(ev) = downcast_event::<NoticeEvent>(Arc::clone(source)) {
		return Some(MessageRequest {
			platform: ev.platform.clone(),
			event_id: String::new(),
			self_id: ev.self_id.clone(),
			message: body,
			user: ev.user.clone(),
			group: ev.group.clone(),
			at_sender: false,
			recall_duration: None,
		});
	}
	None
}

use futures::FutureExt;

#[cfg(test)]
mod tests;
