//! Bus-internal metrics, exported both as a `snapshot()` struct and, via the
//! `metrics` facade, as process-wide gauges/counters/histograms.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Point-in-time read of the bus's internal counters.
#[derive(Debug, Clone, Copy)]
pub struct EventBusMetrics {
	pub total_events_processed: u64,
	pub total_results_processed: u64,
	pub total_errors: u64,
	pub avg_processing_time_secs: f64,
	pub avg_result_processing_time_secs: f64,
	pub current_queue_size: usize,
	pub max_queue_size_seen: usize,
}

#[derive(Default)]
pub(crate) struct MetricsInner {
	pub total_events: AtomicU64,
	pub total_results: AtomicU64,
	pub total_errors: AtomicU64,
	// Fixed-point rolling averages, stored as nanoseconds * 1000 to keep the
	// running update lock-free and integer.
	avg_processing_ns_x1000: AtomicU64,
	avg_result_processing_ns_x1000: AtomicU64,
	max_queue_size_seen: AtomicU64,
}

impl MetricsInner {
	pub fn record_event(&self, elapsed: Duration) {
		let n = self.total_events.fetch_add(1, Ordering::Relaxed) + 1;
		Self::update_rolling_average(&self.avg_processing_ns_x1000, elapsed, 1, n);
		histogram!("aviary_bus_event_processing_seconds").record(elapsed.as_secs_f64());
		counter!("aviary_bus_events_total").increment(1);
	}

	/// `elapsed` is the wall-clock time to re-publish the whole batch of
	/// `count` results; the rolling average tracks average-per-result
	/// processing time the same way `record_event` tracks per-event time,
	/// weighting this batch's contribution by `count` samples at once.
	pub fn record_result_batch(&self, count: usize, elapsed: Duration) {
		if count == 0 {
			return;
		}
		let n = self.total_results.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
		let per_result = elapsed / count as u32;
		Self::update_rolling_average(&self.avg_result_processing_ns_x1000, per_result, count as u64, n);
		counter!("aviary_bus_results_processed_total").increment(count as u64);
		histogram!("aviary_bus_result_batch_seconds").record(elapsed.as_secs_f64());
	}

	pub fn observe_queue_len(&self, len: usize) {
		gauge!("aviary_bus_result_queue_size").set(len as f64);
		self.max_queue_size_seen.fetch_max(len as u64, Ordering::Relaxed);
	}

	/// Incremental mean, generalized to absorb `weight` new samples (all
	/// valued at `sample`) at once: `avg += (sample - avg) * weight / n`,
	/// where `n` is the total sample count *after* this update. `weight == 1`
	/// reduces to the plain per-sample running mean.
	fn update_rolling_average(field: &AtomicU64, sample: Duration, weight: u64, n: u64) {
		let sample_ns_x1000 = sample.as_nanos().saturating_mul(1000) as u64;
		let _ = field.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
			let delta = sample_ns_x1000 as i128 - prev as i128;
			Some((prev as i128 + delta * weight as i128 / n as i128) as u64)
		});
	}

	pub fn snapshot(&self, current_queue_size: usize) -> EventBusMetrics {
		EventBusMetrics {
			total_events_processed: self.total_events.load(Ordering::Relaxed),
			total_results_processed: self.total_results.load(Ordering::Relaxed),
			total_errors: self.total_errors.load(Ordering::Relaxed),
			avg_processing_time_secs: self.avg_processing_ns_x1000.load(Ordering::Relaxed) as f64 / 1000.0 / 1_000_000_000.0,
			avg_result_processing_time_secs: self.avg_result_processing_ns_x1000.load(Ordering::Relaxed) as f64 / 1000.0 / 1_000_000_000.0,
			current_queue_size,
			max_queue_size_seen: self.max_queue_size_seen.load(Ordering::Relaxed) as usize,
		}
	}
}
