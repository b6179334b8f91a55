#![forbid(unsafe_code)]
//! Bootstrap entrypoint: wires every subsystem in the dependency order
//! `original_source/Coral/core.py` constructs them in (config, event bus,
//! permission system, registry, plugin manager, adapter manager, driver
//! manager), then blocks until interrupted. Tracing/metrics init mirrors
//! `chatty_server::main::{init_tracing, init_metrics}`.

mod commands;
mod config;

use std::sync::Arc;

use aviary_bus::EventBus;
use aviary_perms::PermSystem;
use aviary_plugins::PluginManager;
use aviary_registry::Registry;
use aviary_transport::adapters::{ConsoleAdapter, OnebotAdapter};
use aviary_transport::drivers::reversews::ReverseWsConfig;
use aviary_transport::drivers::{ConsoleDriver, ReverseWsDriver};
use aviary_transport::{Adapter, AdapterManager, AdapterManagerConfig, ChatCommandBridge, DriverManager};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,aviary_server=debug".to_string());

	let otlp_endpoint = std::env::var("AVIARY_OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build() {
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_batch_exporter(exporter).build();
				let tracer = tracer_provider.tracer("aviary_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install() {
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)"),
	}
}

fn reversews_config(cfg: &config::Config) -> ReverseWsConfig {
	let component = cfg.component("reversews", "driver");
	let mut reversews_cfg = ReverseWsConfig::default();
	reversews_cfg.port = cfg.websocket_port;
	if let Some(path) = component.get("path").and_then(|v| v.as_str()) {
		reversews_cfg.path = path.to_string();
	}
	reversews_cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = std::env::var("AVIARY_CONFIG_PATH")
		.map(std::path::PathBuf::from)
		.unwrap_or_else(|_| std::path::PathBuf::from(config::DEFAULT_CONFIG_PATH));
	let cfg = config::load_config_from_path(&config_path, aviary_plugins::MANAGER_VERSION)?;
	info!(path = %config_path.display(), "loaded config (json + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let bus = EventBus::new();
	let perms = Arc::new(PermSystem::load(&cfg.perm_file)?);
	let registry = Registry::new(Arc::clone(&bus), Arc::clone(&perms));

	commands::register_builtin_commands(&registry, &perms);

	let bridge = ChatCommandBridge::new(Arc::clone(&registry), Arc::clone(&perms));
	bridge.install(&bus);

	let plugin_manager = PluginManager::new(cfg.plugin_dir.clone(), Arc::clone(&bus), Arc::clone(&registry), Arc::clone(&perms));
	// Extension point: compiled-in plugins register their constructor here via
	// `plugin_manager.register_factory(name, factory)` before `load_all`.
	plugin_manager.load_all().await?;

	let adapter_manager = AdapterManager::new(AdapterManagerConfig::default());
	let onebot_adapter = Arc::new(OnebotAdapter::new(Arc::downgrade(&bus)));
	let console_adapter = Arc::new(ConsoleAdapter::new(Arc::downgrade(&bus)));
	adapter_manager.register(Arc::clone(&onebot_adapter) as Arc<dyn Adapter>);
	adapter_manager.register(Arc::clone(&console_adapter) as Arc<dyn Adapter>);
	adapter_manager.install(&bus);

	let driver_manager = DriverManager::new(Arc::clone(&adapter_manager));
	driver_manager.register("reversews", Arc::new(ReverseWsDriver::new(reversews_config(&cfg))));
	driver_manager.register("console", Arc::new(ConsoleDriver::new()));

	bus.initialize().await;
	driver_manager.start_all().await;

	registry.execute_event("coral_initialized", "core").await;
	info!(self_id = %cfg.self_id, websocket_port = cfg.websocket_port, "aviary server initialized");

	tokio::signal::ctrl_c().await?;
	info!("shutdown signal received");

	registry.execute_event("coral_shutdown", "core").await;
	driver_manager.stop_all().await;
	let unload_report = plugin_manager.unload_all().await;
	if !unload_report.failed.is_empty() {
		warn!(failed = ?unload_report.failed, "some plugins failed to unload cleanly during shutdown");
	}
	bus.shutdown().await;

	Ok(())
}
