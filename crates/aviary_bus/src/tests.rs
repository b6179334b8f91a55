use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aviary_domain::GenericEvent;

use super::*;

#[tokio::test]
async fn priority_order_and_handler_isolation() {
	let bus = EventBus::new();
	let order = Arc::new(parking_lot_compat_test::Mutex::new(Vec::<&'static str>::new()));

	let o1 = Arc::clone(&order);
	bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let o = Arc::clone(&o1);
			async move {
				o.lock().unwrap().push("h1");
				Ok(None)
			}
		},
		10,
	);

	let o2 = Arc::clone(&order);
	bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let o = Arc::clone(&o2);
			async move {
				o.lock().unwrap().push("h2");
				anyhow::bail!("boom")
			}
		},
		5,
	);

	let o3 = Arc::clone(&order);
	bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let o = Arc::clone(&o3);
			async move {
				o.lock().unwrap().push("h3");
				Ok(None)
			}
		},
		5,
	);

	bus.publish(Arc::new(GenericEvent::new("test_event", "core"))).await;

	assert_eq!(*order.lock().unwrap(), vec!["h1", "h2", "h3"]);
	assert_eq!(bus.metrics().total_errors, 1);
	assert_eq!(bus.metrics().total_events_processed, 1);
}

#[tokio::test]
async fn publish_with_no_subscribers_is_a_safe_no_op() {
	let bus = EventBus::new();
	bus.publish(Arc::new(GenericEvent::new("nobody_listens", "core"))).await;
	assert_eq!(bus.metrics().total_events_processed, 1);
	assert_eq!(bus.metrics().total_errors, 0);
	assert_eq!(bus.queue_size(), 0);
}

#[tokio::test]
async fn unsubscribe_removes_only_the_targeted_handler() {
	let bus = EventBus::new();
	let hits = Arc::new(AtomicUsize::new(0));

	let h = Arc::clone(&hits);
	let id = bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let h = Arc::clone(&h);
			async move {
				h.fetch_add(1, Ordering::Relaxed);
				Ok(None)
			}
		},
		5,
	);

	let h2 = Arc::clone(&hits);
	bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let h2 = Arc::clone(&h2);
			async move {
				h2.fetch_add(10, Ordering::Relaxed);
				Ok(None)
			}
		},
		5,
	);

	bus.unsubscribe::<GenericEvent>(id);
	bus.publish(Arc::new(GenericEvent::new("e", "core"))).await;
	assert_eq!(hits.load(Ordering::Relaxed), 10);
}

#[tokio::test]
async fn handler_result_is_enqueued_and_drained_by_the_worker() {
	let bus = EventBus::new();
	bus.subscribe::<GenericEvent, _>(
		|_ev: Arc<GenericEvent>| async move { Ok(Some(HandlerResult::Event(Arc::new(GenericEvent::new("child_event", "core"))))) },
		5,
	);

	let seen = Arc::new(AtomicUsize::new(0));
	let s = Arc::clone(&seen);
	bus.subscribe::<GenericEvent, _>(
		move |ev: Arc<GenericEvent>| {
			let s = Arc::clone(&s);
			async move {
				if ev.name == "child_event" {
					s.fetch_add(1, Ordering::Relaxed);
				}
				Ok(None)
			}
		},
		1,
	);

	bus.initialize().await;
	bus.publish(Arc::new(GenericEvent::new("parent_event", "core"))).await;

	for _ in 0..50 {
		if seen.load(Ordering::Relaxed) == 1 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert_eq!(seen.load(Ordering::Relaxed), 1);
	bus.shutdown().await;
}

#[tokio::test]
async fn middleware_can_abort_propagation() {
	let bus = EventBus::new();
	bus.add_middleware(|_ev: BoxedEvent| async move { Ok(None) });

	let hits = Arc::new(AtomicUsize::new(0));
	let h = Arc::clone(&hits);
	bus.subscribe::<GenericEvent, _>(
		move |_ev: Arc<GenericEvent>| {
			let h = Arc::clone(&h);
			async move {
				h.fetch_add(1, Ordering::Relaxed);
				Ok(None)
			}
		},
		5,
	);

	bus.publish(Arc::new(GenericEvent::new("e", "core"))).await;
	assert_eq!(hits.load(Ordering::Relaxed), 0);
}

mod parking_lot_compat_test {
	pub use std::sync::Mutex;
}
