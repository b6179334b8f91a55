//! Plugin state machine, load status, and per-plugin metrics.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
	Unloaded,
	Loading,
	Loaded,
	Error,
	Disabled,
	/// Short-lived transitional marker immediately after re-enabling a
	/// disabled plugin, before the next load attempt moves it on.
	Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginLoadStatus {
	Success,
	Failed,
	Skipped,
	DependencyFailed,
}

/// Rolling performance metrics for one plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginMetrics {
	pub load_time_secs: f64,
	pub total_calls: u64,
	pub avg_execution_time_secs: f64,
	pub total_errors: u64,
	pub last_error: Option<String>,
	pub last_loaded: f64,
	pub load_count: u32,
	pub unload_count: u32,
}

impl PluginMetrics {
	pub fn record_load(&mut self, load_time_secs: f64) {
		self.load_time_secs = load_time_secs;
		self.last_loaded = aviary_util::time::unix_time_secs();
		self.load_count += 1;
	}

	pub fn record_unload(&mut self) {
		self.unload_count += 1;
	}

	pub fn record_error(&mut self, error: impl Into<String>) {
		self.total_errors += 1;
		self.last_error = Some(error.into());
	}

	pub fn record_call(&mut self, execution_time_secs: f64) {
		self.total_calls += 1;
		if self.total_calls == 1 {
			self.avg_execution_time_secs = execution_time_secs;
		} else {
			self.avg_execution_time_secs = (self.avg_execution_time_secs * (self.total_calls - 1) as f64 + execution_time_secs) / self.total_calls as f64;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_call_computes_incremental_average() {
		let mut m = PluginMetrics::default();
		m.record_call(1.0);
		m.record_call(3.0);
		assert_eq!(m.avg_execution_time_secs, 2.0);
	}
}
