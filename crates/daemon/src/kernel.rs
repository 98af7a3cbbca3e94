// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The app kernel: owns process-wide state and brokers events.
//!
//! Startup order is config → component discovery → driver registration →
//! empty engine; shutdown is the reverse. Subsystem events merge on one
//! channel and fan out to subscribers as `(topic, payload)` pairs over a
//! broadcast channel; slow subscribers lag rather than block producers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use li_components::{ComponentRuntime, DeviceDirectory, RuntimeOptions};
use li_config::{ConfigStore, ProfileStore};
use li_core::{ConfigPath, ConfigValue, DeviceId, Event, SystemClock};
use li_devices::drivers::{LineDriver, RestDriver};
use li_devices::{DeviceManager, ManagerOptions};
use li_sequencer::{DeviceActionAdapter, EngineOptions, ScriptStore, SequenceEngine};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// One event on the external fan-out: dotted topic plus JSON payload.
pub type TopicEvent = (String, serde_json::Value);

#[derive(Debug, Clone)]
pub struct KernelOptions {
    pub config_dir: PathBuf,
    pub component_roots: Vec<PathBuf>,
    /// Executable for out-of-process component hosts.
    pub host_command: Option<PathBuf>,
    pub tick_period: Option<Duration>,
}

impl KernelOptions {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            component_roots: Vec::new(),
            host_command: None,
            tick_period: None,
        }
    }
}

/// Owns C1–C4 and the event fan-out.
pub struct Kernel {
    pub config: Arc<ConfigStore>,
    pub profiles: ProfileStore,
    pub components: Arc<ComponentRuntime>,
    pub devices: Arc<DeviceManager<SystemClock>>,
    pub engine: Arc<SequenceEngine<SystemClock>>,
    pub scripts: ScriptStore,
    fanout: broadcast::Sender<TopicEvent>,
    started: Instant,
}

/// Restricted device view granted to components: ids and cached reads only.
struct DeviceView {
    manager: Arc<DeviceManager<SystemClock>>,
}

impl DeviceDirectory for DeviceView {
    fn device_ids(&self) -> Vec<DeviceId> {
        self.manager.device_ids()
    }

    fn cached_property(&self, id: &DeviceId, name: &str) -> Option<ConfigValue> {
        self.manager.cached_property(id, name).map(|c| c.value)
    }
}

impl Kernel {
    /// Bring the kernel up in dependency order. Component discovery runs
    /// as part of startup; individual bundle failures are reported, not
    /// fatal.
    pub async fn start(options: KernelOptions) -> Self {
        let clock = SystemClock::default();
        let (event_tx, event_rx) = mpsc::channel::<Event>(1024);
        let (fanout, _) = broadcast::channel(1024);

        // C1: config store + profile/script storage under the config dir.
        let config = Arc::new(ConfigStore::new());
        let profiles = ProfileStore::new(
            options.config_dir.join("profiles"),
            ConfigPath::parse("profiles").unwrap_or_else(|_| unreachable!("static path")),
        );
        let scripts = ScriptStore::new(options.config_dir.join("scripts"));

        // Config mutations join the event stream.
        {
            let tx = event_tx.clone();
            config.subscribe_all(move |change| {
                let event = Event::ConfigChanged {
                    path: change.path.clone(),
                    value: change.value.clone(),
                };
                tx.try_send(event).map_err(|e| e.to_string())?;
                Ok(())
            });
        }

        // The manager exists before C2 so the runtime can hold its
        // restricted view; no driver is registered and no session opened
        // until discovery is done.
        let devices = DeviceManager::new(clock.clone(), event_tx.clone(), ManagerOptions::default());

        // C2: discover and load components.
        let components = ComponentRuntime::new(
            Arc::clone(&config),
            Arc::new(DeviceView { manager: Arc::clone(&devices) }),
            event_tx.clone(),
            RuntimeOptions {
                scan_roots: options.component_roots.clone(),
                host_command: options.host_command.clone(),
                ..RuntimeOptions::default()
            },
        );
        let report = components.rescan().await;
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "component discovery complete"
        );
        for (name, fault) in &report.failed {
            warn!(component = %name, error = %fault, "component failed to load");
        }

        // C3: builtin transports.
        devices.register_driver(Arc::new(LineDriver));
        devices.register_driver(Arc::new(RestDriver));

        // C4: engine starts empty.
        let mut engine_options = EngineOptions::default();
        if let Some(tick) = options.tick_period {
            engine_options.tick_period = tick;
        }
        let adapter =
            Arc::new(DeviceActionAdapter::new(Arc::clone(&devices), Duration::from_secs(120)));
        let engine = SequenceEngine::new(
            clock,
            adapter,
            Arc::clone(&config),
            event_tx.clone(),
            engine_options,
        );

        // Fan the merged event stream out to subscribers.
        Self::spawn_fanout(event_rx, fanout.clone());

        Self { config, profiles, components, devices, engine, scripts, fanout, started: Instant::now() }
    }

    fn spawn_fanout(mut event_rx: mpsc::Receiver<Event>, fanout: broadcast::Sender<TopicEvent>) {
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let topic = event.topic();
                match serde_json::to_value(&event) {
                    Ok(payload) => {
                        // No subscribers is fine; send only fails then.
                        let _ = fanout.send((topic, payload));
                    }
                    Err(e) => warn!(error = %e, "unserializable event"),
                }
            }
        });
    }

    /// Subscribe to the merged event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TopicEvent> {
        self.fanout.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Tear down in reverse startup order. Deterministic: every subsystem
    /// settles before the next one stops.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.devices.shutdown().await;
        self.components.shutdown().await;
        info!("kernel shut down");
    }
}

/// True when `prefix` names `topic` or one of its ancestors, on dotted
/// segment boundaries.
pub fn topic_matches(prefix: &str, topic: &str) -> bool {
    match topic.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
