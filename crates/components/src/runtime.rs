// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The component runtime: supervises every bundle from discovery to unload.
//!
//! Load/unload/rescan serialize on an async gate; capability calls never
//! take it. The bundle table itself sits behind a short-held sync lock that
//! is never held across an await.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use li_config::ConfigStore;
use li_core::{ConfigPath, ConfigValue, ErrorKind, Event, Fault};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::component::{Capability, Component, DeviceDirectory, InitContext};
use crate::discovery::{self, SkippedBundle};
use crate::handle::{self, CapabilityHandle, HandleInner};
use crate::host::{
    parse_capability_rows, HostClient, SupervisionPolicy, OP_CAPABILITIES, OP_INITIALIZE,
    OP_START,
};
use crate::loader::LoadedLibrary;
use crate::manifest::{Manifest, RunMode, DISABLED_SUFFIX, MANIFEST_FILE};
use crate::resolve::resolve_order;

/// Lifecycle state of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    /// Known on disk, not loaded.
    Discovered,
    /// Library mapped (or host spawned), not yet initialized.
    Loaded,
    /// `initialize` succeeded.
    Initialized,
    /// `start` succeeded; the instance is live.
    Running,
    /// Unload in progress.
    Stopping,
    /// Loading failed; see `reason`.
    Failed,
    /// Not loaded because a dependency failed.
    Skipped,
    /// Out-of-process instance crashed and was not restarted.
    Faulted,
    /// Manifest carries the disabled suffix.
    Disabled,
}

li_core::simple_display! {
    BundleState {
        Discovered => "discovered",
        Loaded => "loaded",
        Initialized => "initialized",
        Running => "running",
        Stopping => "stopping",
        Failed => "failed",
        Skipped => "skipped",
        Faulted => "faulted",
        Disabled => "disabled",
    }
}

/// Per-bundle row for `component:list`.
#[derive(Debug, Clone)]
pub struct BundleInfo {
    pub name: String,
    pub version: String,
    pub state: BundleState,
    pub reason: Option<String>,
    pub capabilities: Vec<String>,
}

/// Result of one rescan/load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, Fault)>,
    /// Dependents of failed bundles, not attempted.
    pub skipped: Vec<String>,
    /// Directories that looked like bundles but had no valid manifest/library.
    pub malformed: Vec<SkippedBundle>,
}

/// Runtime construction options.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub scan_roots: Vec<PathBuf>,
    /// Executable spawned for out-of-process bundles (`lithiumd` itself in
    /// production). `None` fails out-of-process loads.
    pub host_command: Option<PathBuf>,
    pub call_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { scan_roots: Vec::new(), host_command: None, call_timeout: Duration::from_secs(30) }
    }
}

type BuiltinCtor = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

pub(crate) enum Instance {
    InProcess {
        component: Box<dyn Component>,
        /// Kept mapped until the instance drops; declared after `component`
        /// so the component's drop glue still has its code.
        _library: Option<LoadedLibrary>,
    },
    Remote {
        client: HostClient,
        call_timeout: Duration,
    },
}

impl Instance {
    pub(crate) async fn invoke(
        &self,
        capability: &str,
        args: ConfigValue,
    ) -> Result<ConfigValue, Fault> {
        match self {
            Instance::InProcess { component, .. } => component.invoke(capability, args),
            Instance::Remote { client, call_timeout } => {
                client.call(capability, args, *call_timeout).await
            }
        }
    }

    async fn stop(&self) {
        match self {
            Instance::InProcess { component, .. } => component.stop(),
            Instance::Remote { client, .. } => client.shutdown().await,
        }
    }
}

struct BundleRecord {
    manifest: Manifest,
    library_path: Option<PathBuf>,
    state: BundleState,
    reason: Option<String>,
    capabilities: Vec<Capability>,
    instance: Option<Arc<Instance>>,
    handles: Vec<Weak<HandleInner>>,
    builtin: Option<BuiltinCtor>,
    restarts: u32,
}

impl BundleRecord {
    fn supervision(&self) -> SupervisionPolicy {
        if self.manifest.max_restarts > 0 {
            SupervisionPolicy::RestartOnCrash { max_restarts: self.manifest.max_restarts }
        } else {
            SupervisionPolicy::Never
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    bundles: IndexMap<String, BundleRecord>,
    /// Successful load order, for reverse-order shutdown.
    load_order: Vec<String>,
}

/// Owns every component instance in the process.
pub struct ComponentRuntime {
    options: RuntimeOptions,
    config: Arc<ConfigStore>,
    devices: Arc<dyn DeviceDirectory>,
    event_tx: mpsc::Sender<Event>,
    state: Mutex<RuntimeState>,
    /// Serializes load/unload/rescan; capability calls never take it.
    load_gate: tokio::sync::Mutex<()>,
    self_weak: Weak<Self>,
}

impl ComponentRuntime {
    pub fn new(
        config: Arc<ConfigStore>,
        devices: Arc<dyn DeviceDirectory>,
        event_tx: mpsc::Sender<Event>,
        options: RuntimeOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            options,
            config,
            devices,
            event_tx,
            state: Mutex::new(RuntimeState::default()),
            load_gate: tokio::sync::Mutex::new(()),
            self_weak: self_weak.clone(),
        })
    }

    /// Register a statically linked component. It participates in
    /// dependency resolution like any discovered bundle.
    pub fn register_builtin<F>(&self, manifest: Manifest, constructor: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let name = manifest.name.clone();
        state.bundles.insert(
            name,
            BundleRecord {
                manifest,
                library_path: None,
                state: BundleState::Discovered,
                reason: None,
                capabilities: Vec::new(),
                instance: None,
                handles: Vec::new(),
                builtin: Some(Arc::new(constructor)),
                restarts: 0,
            },
        );
    }

    /// Scan the configured roots and load everything loadable, in
    /// dependency order. Partial failures never abort the pass.
    pub async fn rescan(&self) -> LoadReport {
        let _gate = self.load_gate.lock().await;
        let mut report = LoadReport::default();

        let scan = discovery::scan(&self.options.scan_roots);
        report.malformed = scan.skipped;

        // Merge scan results into the bundle table.
        {
            let mut state = self.state.lock();
            let mut seen: HashSet<String> = HashSet::new();
            for found in scan.bundles {
                let name = found.manifest.name.clone();
                seen.insert(name.clone());
                match state.bundles.get_mut(&name) {
                    Some(record) if record.instance.is_some() => {
                        // Live instance; pick the new manifest up on next load.
                        record.library_path = Some(found.library_path);
                    }
                    Some(record) => {
                        record.manifest = found.manifest;
                        record.library_path = Some(found.library_path);
                        record.state = if found.disabled {
                            BundleState::Disabled
                        } else {
                            BundleState::Discovered
                        };
                        record.reason = None;
                    }
                    None => {
                        state.bundles.insert(
                            name,
                            BundleRecord {
                                manifest: found.manifest,
                                library_path: Some(found.library_path),
                                state: if found.disabled {
                                    BundleState::Disabled
                                } else {
                                    BundleState::Discovered
                                },
                                reason: None,
                                capabilities: Vec::new(),
                                instance: None,
                                handles: Vec::new(),
                                builtin: None,
                                restarts: 0,
                            },
                        );
                    }
                }
            }
            // Builtins are always "seen"; on-disk bundles that vanished and
            // are not loaded drop out of the table.
            state
                .bundles
                .retain(|name, r| r.builtin.is_some() || r.instance.is_some() || seen.contains(name));
        }

        // Resolve order over enabled bundles.
        let (candidates, deps): (Vec<String>, Vec<Vec<String>>) = {
            let state = self.state.lock();
            state
                .bundles
                .iter()
                .filter(|(_, r)| r.state != BundleState::Disabled)
                .map(|(name, r)| (name.clone(), r.manifest.dependencies.clone()))
                .unzip()
        };
        let outcome = resolve_order(
            candidates.iter().map(String::as_str).zip(deps.iter().map(Vec::as_slice)),
        );

        for (name, dep) in &outcome.missing {
            let fault =
                Fault::not_found(format!("dependency {dep:?} not discovered")).with_context(dep);
            self.mark_failed(name, &fault);
            report.failed.push((name.clone(), fault));
        }
        for name in &outcome.cyclic {
            let fault = Fault::new(ErrorKind::CyclicDependency, "component dependency cycle");
            self.mark_failed(name, &fault);
            report.failed.push((name.clone(), fault));
        }

        // Load in order, skipping dependents of failures.
        let mut broken: HashSet<String> = report.failed.iter().map(|(n, _)| n.clone()).collect();
        for name in &outcome.order {
            let (already_live, failed_dep) = {
                let state = self.state.lock();
                let record = match state.bundles.get(name.as_str()) {
                    Some(record) => record,
                    None => continue,
                };
                let failed_dep =
                    record.manifest.dependencies.iter().find(|d| broken.contains(*d)).cloned();
                (record.instance.is_some(), failed_dep)
            };
            if already_live {
                continue;
            }
            if let Some(dep) = failed_dep {
                self.mark_skipped(name, &dep);
                broken.insert(name.clone());
                report.skipped.push(name.clone());
                continue;
            }
            match self.load_locked(name).await {
                Ok(()) => report.loaded.push(name.clone()),
                Err(fault) => {
                    broken.insert(name.clone());
                    report.failed.push((name.clone(), fault));
                }
            }
        }

        report
    }

    /// Load one bundle. Its dependencies must already be running.
    pub async fn load(&self, name: &str) -> Result<(), Fault> {
        let _gate = self.load_gate.lock().await;
        {
            let state = self.state.lock();
            let record = state
                .bundles
                .get(name)
                .ok_or_else(|| Fault::not_found(format!("component {name:?}")))?;
            if record.instance.is_some() {
                return Err(Fault::conflict(format!("component {name:?} already loaded")));
            }
            if record.state == BundleState::Disabled {
                return Err(Fault::conflict(format!("component {name:?} is disabled")));
            }
            for dep in &record.manifest.dependencies {
                let ok = state
                    .bundles
                    .get(dep.as_str())
                    .is_some_and(|d| {
                        matches!(d.state, BundleState::Initialized | BundleState::Running)
                    });
                if !ok {
                    return Err(Fault::conflict(format!(
                        "dependency {dep:?} of {name:?} is not running"
                    )));
                }
            }
        }
        self.load_locked(name).await
    }

    /// Unload one bundle.
    ///
    /// Refuses while capability handles are outstanding unless `force`,
    /// which poisons them first.
    pub async fn unload(&self, name: &str, force: bool) -> Result<(), Fault> {
        let _gate = self.load_gate.lock().await;
        let instance = {
            let mut state = self.state.lock();
            let record = state
                .bundles
                .get_mut(name)
                .ok_or_else(|| Fault::not_found(format!("component {name:?}")))?;
            let instance = record
                .instance
                .clone()
                .ok_or_else(|| Fault::conflict(format!("component {name:?} is not loaded")))?;

            record.handles.retain(|w| w.strong_count() > 0);
            let live = handle::live_count(&record.handles);
            if live > 0 && !force {
                return Err(Fault::conflict(format!(
                    "{live} live capability handle(s) on {name:?}"
                )));
            }
            if force {
                handle::poison(&record.handles);
            }
            record.handles.clear();
            record.state = BundleState::Stopping;
            record.instance = None;
            record.capabilities.clear();
            state.load_order.retain(|n| n != name);
            instance
        };

        self.emit_state(name, BundleState::Stopping, None);

        instance.stop().await;
        drop(instance);

        {
            let mut state = self.state.lock();
            if let Some(record) = state.bundles.get_mut(name) {
                record.state = BundleState::Discovered;
            }
        }
        self.emit_state(name, BundleState::Discovered, None);
        info!(component = name, forced = force, "unloaded component");
        Ok(())
    }

    /// Mark a bundle "do not load on next scan" by renaming its manifest.
    pub async fn disable(&self, name: &str) -> Result<(), Fault> {
        let _gate = self.load_gate.lock().await;
        let mut state = self.state.lock();
        let record = state
            .bundles
            .get_mut(name)
            .ok_or_else(|| Fault::not_found(format!("component {name:?}")))?;
        if record.instance.is_some() {
            return Err(Fault::conflict(format!("component {name:?} is loaded; unload first")));
        }
        let dir = record
            .library_path
            .as_ref()
            .and_then(|p| p.parent())
            .ok_or_else(|| Fault::conflict(format!("component {name:?} is builtin")))?;
        let from = dir.join(MANIFEST_FILE);
        let to = dir.join(format!("{MANIFEST_FILE}{DISABLED_SUFFIX}"));
        if !from.is_file() {
            return Err(Fault::conflict(format!("component {name:?} is already disabled")));
        }
        std::fs::rename(&from, &to)
            .map_err(|e| Fault::faulted("cannot rename manifest").with_context(e.to_string()))?;
        record.state = BundleState::Disabled;
        Ok(())
    }

    /// Reverse [`Self::disable`].
    pub async fn enable(&self, name: &str) -> Result<(), Fault> {
        let _gate = self.load_gate.lock().await;
        let mut state = self.state.lock();
        let record = state
            .bundles
            .get_mut(name)
            .ok_or_else(|| Fault::not_found(format!("component {name:?}")))?;
        let dir = record
            .library_path
            .as_ref()
            .and_then(|p| p.parent())
            .ok_or_else(|| Fault::conflict(format!("component {name:?} is builtin")))?;
        let from = dir.join(format!("{MANIFEST_FILE}{DISABLED_SUFFIX}"));
        let to = dir.join(MANIFEST_FILE);
        if !from.is_file() {
            return Err(Fault::conflict(format!("component {name:?} is not disabled")));
        }
        std::fs::rename(&from, &to)
            .map_err(|e| Fault::faulted("cannot rename manifest").with_context(e.to_string()))?;
        record.state = BundleState::Discovered;
        Ok(())
    }

    /// Resolve a capability to a reference-counted handle.
    pub fn capability(&self, component: &str, capability: &str) -> Result<CapabilityHandle, Fault> {
        let mut state = self.state.lock();
        let record = state
            .bundles
            .get_mut(component)
            .ok_or_else(|| Fault::not_found(format!("component {component:?}")))?;
        if !matches!(record.state, BundleState::Initialized | BundleState::Running) {
            return Err(Fault::conflict(format!(
                "component {component:?} is {} and cannot serve capabilities",
                record.state
            )));
        }
        if !record.capabilities.iter().any(|c| c.name == capability) {
            return Err(Fault::not_supported(format!(
                "component {component:?} has no capability {capability:?}"
            )));
        }
        let instance = record
            .instance
            .as_ref()
            .ok_or_else(|| Fault::internal("initialized component without instance"))?;
        let handle = CapabilityHandle::new(component, capability, instance);
        record.handles.retain(|w| w.strong_count() > 0);
        record.handles.push(handle.ledger_entry());
        Ok(handle)
    }

    /// Current view of every known bundle.
    pub fn list(&self) -> Vec<BundleInfo> {
        let state = self.state.lock();
        state
            .bundles
            .iter()
            .map(|(name, r)| BundleInfo {
                name: name.clone(),
                version: r.manifest.version.clone(),
                state: r.state,
                reason: r.reason.clone(),
                capabilities: r.capabilities.iter().map(|c| c.name.clone()).collect(),
            })
            .collect()
    }

    /// Count of bundles currently serving capabilities.
    pub fn loaded_count(&self) -> usize {
        let state = self.state.lock();
        state
            .bundles
            .values()
            .filter(|r| matches!(r.state, BundleState::Initialized | BundleState::Running))
            .count()
    }

    /// Stop every instance, in reverse load order.
    pub async fn shutdown(&self) {
        let order: Vec<String> = {
            let state = self.state.lock();
            state.load_order.iter().rev().cloned().collect()
        };
        for name in order {
            if let Err(e) = self.unload(&name, true).await {
                warn!(component = %name, error = %e, "shutdown unload failed");
            }
        }
    }

    async fn load_locked(&self, name: &str) -> Result<(), Fault> {
        match self.try_load(name).await {
            Ok(()) => Ok(()),
            Err(fault) => {
                self.mark_failed(name, &fault);
                Err(fault)
            }
        }
    }

    async fn try_load(&self, name: &str) -> Result<(), Fault> {
        let (manifest, library_path, builtin) = {
            let state = self.state.lock();
            let record = state
                .bundles
                .get(name)
                .ok_or_else(|| Fault::not_found(format!("component {name:?}")))?;
            (record.manifest.clone(), record.library_path.clone(), record.builtin.clone())
        };

        let instance = match (&builtin, manifest.run) {
            (Some(ctor), _) => {
                Arc::new(Instance::InProcess { component: (ctor.as_ref())(), _library: None })
            }
            (None, RunMode::InProcess) => {
                let path = library_path
                    .as_ref()
                    .ok_or_else(|| Fault::internal("bundle without library path"))?;
                let library = LoadedLibrary::open(path)?;
                let component = library.instantiate(&manifest.entry)?;
                Arc::new(Instance::InProcess { component, _library: Some(library) })
            }
            (None, RunMode::OutOfProcess) => {
                let host = self.options.host_command.as_ref().ok_or_else(|| {
                    Fault::not_supported("no component host command configured")
                })?;
                let path = library_path
                    .as_ref()
                    .ok_or_else(|| Fault::internal("bundle without library path"))?;
                let client =
                    HostClient::spawn(host, path, &manifest.entry, self.event_tx.clone()).await?;
                Arc::new(Instance::Remote {
                    client,
                    call_timeout: self.options.call_timeout,
                })
            }
        };
        self.set_state(name, BundleState::Loaded, None);

        // Initialize with the granted context; out-of-process instances get
        // a snapshot of their config subtree instead of shared state.
        match instance.as_ref() {
            Instance::InProcess { component, .. } => {
                let ctx = InitContext {
                    config: Arc::clone(&self.config),
                    devices: Arc::clone(&self.devices),
                };
                component.initialize(&ctx)?;
            }
            Instance::Remote { client, call_timeout } => {
                let subtree = ConfigPath::parse(&format!("components.{name}"))
                    .ok()
                    .and_then(|p| self.config.get(&p))
                    .unwrap_or(ConfigValue::Null);
                client.call(OP_INITIALIZE, subtree, *call_timeout).await?;
            }
        }
        self.set_state(name, BundleState::Initialized, None);

        let capabilities = match instance.as_ref() {
            Instance::InProcess { component, .. } => component.capabilities(),
            Instance::Remote { client, call_timeout } => {
                let rows = client.call(OP_CAPABILITIES, ConfigValue::Null, *call_timeout).await?;
                parse_capability_rows(&rows)
            }
        };

        match instance.as_ref() {
            Instance::InProcess { component, .. } => component.start()?,
            Instance::Remote { client, call_timeout } => {
                client.call(OP_START, ConfigValue::Null, *call_timeout).await?;
            }
        }

        {
            let mut state = self.state.lock();
            if let Some(record) = state.bundles.get_mut(name) {
                record.instance = Some(Arc::clone(&instance));
                record.capabilities = capabilities;
                record.state = BundleState::Running;
                record.reason = None;
            }
            let owned = name.to_string();
            if !state.load_order.contains(&owned) {
                state.load_order.push(owned);
            }
        }
        self.emit_state(name, BundleState::Running, None);
        info!(component = name, "component running");

        if matches!(instance.as_ref(), Instance::Remote { .. }) {
            self.watch_host(name.to_string(), instance);
        }
        Ok(())
    }

    /// Spawn a watcher that reacts to the hosted process exiting.
    fn watch_host(&self, name: String, instance: Arc<Instance>) {
        let weak = self.self_weak.clone();
        tokio::spawn(async move {
            if let Instance::Remote { client, .. } = instance.as_ref() {
                client.wait_exit().await;
            }
            let Some(runtime) = weak.upgrade() else {
                return;
            };
            runtime.on_host_exit(&name, &instance).await;
        });
    }

    async fn on_host_exit(&self, name: &str, crashed: &Arc<Instance>) {
        let _gate = self.load_gate.lock().await;
        let policy = {
            let mut state = self.state.lock();
            let Some(record) = state.bundles.get_mut(name) else {
                return;
            };
            // A clean unload clears the instance first; only a live crash
            // of the same instance counts.
            let still_current =
                record.instance.as_ref().is_some_and(|i| Arc::ptr_eq(i, crashed));
            if !still_current {
                return;
            }
            record.instance = None;
            record.capabilities.clear();
            handle::poison(&record.handles);
            record.handles.clear();
            record.restarts += 1;
            state.load_order.retain(|n| n != name);
            let record = match state.bundles.get(name) {
                Some(record) => record,
                None => return,
            };
            (record.supervision(), record.restarts)
        };

        match policy {
            (SupervisionPolicy::RestartOnCrash { max_restarts }, restarts)
                if restarts <= max_restarts =>
            {
                warn!(component = name, attempt = restarts, "host crashed, restarting");
                if let Err(fault) = self.load_locked(name).await {
                    warn!(component = name, error = %fault, "restart failed");
                }
            }
            _ => {
                self.set_state(name, BundleState::Faulted, Some("host process exited".into()));
                warn!(component = name, "host crashed, instance faulted");
            }
        }
    }

    fn mark_failed(&self, name: &str, fault: &Fault) {
        self.set_state(name, BundleState::Failed, Some(fault.to_string()));
    }

    fn mark_skipped(&self, name: &str, failed_dep: &str) {
        self.set_state(
            name,
            BundleState::Skipped,
            Some(format!("dependency {failed_dep:?} failed")),
        );
    }

    fn set_state(&self, name: &str, bundle_state: BundleState, reason: Option<String>) {
        {
            let mut state = self.state.lock();
            if let Some(record) = state.bundles.get_mut(name) {
                record.state = bundle_state;
                record.reason = reason.clone();
            }
        }
        self.emit_state(name, bundle_state, reason);
    }

    fn emit_state(&self, name: &str, bundle_state: BundleState, reason: Option<String>) {
        let event = Event::ComponentState {
            name: name.to_string(),
            state: bundle_state.to_string(),
            reason,
        };
        if self.event_tx.try_send(event).is_err() {
            // Event bus full or gone; state is still authoritative here.
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
