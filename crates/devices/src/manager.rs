// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The device manager: registry, session lifecycle, property cache, and the
//! merged event stream.
//!
//! Requests serialize per session (submission order is completion order);
//! reads served from the cache take no session lock at all.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use li_core::{Clock, ConfigValue, DeviceId, ErrorKind, Event, Fault};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::descriptor::DeviceDescriptor;
use crate::driver::{Driver, DriverSession, SessionEvent};
use crate::session::{CachedProperty, PropertyCache, SessionState};

/// One row in `device:list`.
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub id: DeviceId,
    pub kind: String,
    pub driver: String,
    pub state: SessionState,
    pub cached_properties: usize,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Default bound for one device call.
    pub call_timeout: Duration,
    /// Default property-cache staleness bound.
    pub staleness: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(10), staleness: Duration::from_secs(2) }
    }
}

struct LiveSession {
    driver_session: Box<dyn DriverSession>,
    cache: Mutex<PropertyCache>,
    /// FIFO lock serializing requests on this session.
    serial: tokio::sync::Mutex<()>,
}

struct DeviceEntry {
    descriptor: DeviceDescriptor,
    state: SessionState,
    last_error: Option<Fault>,
    session: Option<Arc<LiveSession>>,
}

/// Owns every device and its session.
pub struct DeviceManager<C: Clock> {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    devices: Mutex<IndexMap<DeviceId, DeviceEntry>>,
    event_tx: mpsc::Sender<Event>,
    clock: C,
    options: ManagerOptions,
    self_weak: Weak<Self>,
}

impl<C: Clock> DeviceManager<C> {
    pub fn new(clock: C, event_tx: mpsc::Sender<Event>, options: ManagerOptions) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            drivers: RwLock::new(HashMap::new()),
            devices: Mutex::new(IndexMap::new()),
            event_tx,
            clock,
            options,
            self_weak: self_weak.clone(),
        })
    }

    /// Register one driver under its name. Later registrations win, so a
    /// component can shadow a builtin driver.
    pub fn register_driver(&self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        self.drivers.write().insert(name, driver);
    }

    /// Declare a device. It starts Disconnected; `connect` opens it.
    pub fn register_device(&self, descriptor: DeviceDescriptor) {
        let mut devices = self.devices.lock();
        let id = descriptor.id.clone();
        match devices.get_mut(&id) {
            Some(entry) => entry.descriptor = descriptor,
            None => {
                devices.insert(
                    id,
                    DeviceEntry {
                        descriptor,
                        state: SessionState::Disconnected,
                        last_error: None,
                        session: None,
                    },
                );
            }
        }
    }

    /// Open a session for a declared device.
    ///
    /// A `Faulted` session may be reopened; reopening resets the property
    /// cache.
    pub async fn connect(&self, id: &DeviceId) -> Result<(), Fault> {
        let (descriptor, driver) = {
            let mut devices = self.devices.lock();
            let entry = devices
                .get_mut(id.as_str())
                .ok_or_else(|| Fault::not_found(format!("device {id}")))?;
            match entry.state {
                SessionState::Connected | SessionState::Connecting => {
                    return Err(Fault::conflict(format!("device {id} is already {}", entry.state)));
                }
                SessionState::Disconnecting => {
                    return Err(Fault::conflict(format!("device {id} is disconnecting")));
                }
                SessionState::Disconnected | SessionState::Faulted => {}
            }
            entry.state = SessionState::Connecting;
            entry.session = None;
            let descriptor = entry.descriptor.clone();
            let driver = self
                .drivers
                .read()
                .get(&descriptor.driver)
                .cloned();
            (descriptor, driver)
        };
        self.emit_state(id, SessionState::Connecting);

        let driver = match driver {
            Some(driver) => driver,
            None => {
                let fault = Fault::not_found(format!("driver {:?}", descriptor.driver));
                self.fail_connect(id, fault.clone());
                return Err(fault);
            }
        };

        let (session_tx, session_rx) = mpsc::channel::<SessionEvent>(64);
        let opened = tokio::time::timeout(
            self.options.call_timeout,
            driver.open(&descriptor, session_tx),
        )
        .await;

        let driver_session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(fault)) => {
                self.fail_connect(id, fault.clone());
                return Err(fault);
            }
            Err(_) => {
                let fault = Fault::timeout(format!("connect to {id} timed out"));
                self.fail_connect(id, fault.clone());
                return Err(fault);
            }
        };

        let session = Arc::new(LiveSession {
            driver_session,
            cache: Mutex::new(PropertyCache::new()),
            serial: tokio::sync::Mutex::new(()),
        });
        {
            let mut devices = self.devices.lock();
            if let Some(entry) = devices.get_mut(id.as_str()) {
                entry.state = SessionState::Connected;
                entry.last_error = None;
                entry.session = Some(Arc::clone(&session));
            }
        }
        self.emit_state(id, SessionState::Connected);
        info!(device = %id, driver = %descriptor.driver, "device connected");

        self.spawn_event_pump(id.clone(), Arc::downgrade(&session), session_rx);
        Ok(())
    }

    /// Close a session cleanly.
    pub async fn disconnect(&self, id: &DeviceId) -> Result<(), Fault> {
        let session = {
            let mut devices = self.devices.lock();
            let entry = devices
                .get_mut(id.as_str())
                .ok_or_else(|| Fault::not_found(format!("device {id}")))?;
            if entry.state != SessionState::Connected && entry.state != SessionState::Faulted {
                return Err(Fault::conflict(format!("device {id} is {}", entry.state)));
            }
            entry.state = SessionState::Disconnecting;
            entry.session.take()
        };
        self.emit_state(id, SessionState::Disconnecting);

        if let Some(session) = session {
            session.driver_session.close().await;
        }

        {
            let mut devices = self.devices.lock();
            if let Some(entry) = devices.get_mut(id.as_str()) {
                entry.state = SessionState::Disconnected;
            }
        }
        self.emit_state(id, SessionState::Disconnected);
        Ok(())
    }

    /// Read a property, preferring the cache within the staleness bound.
    pub async fn get_property(
        &self,
        id: &DeviceId,
        name: &str,
        max_age: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<ConfigValue, Fault> {
        let session = self.connected_session(id)?;
        let max_age_ms = max_age.unwrap_or(self.options.staleness).as_millis() as u64;

        if let Some(entry) = session.cache.lock().fresh(name, self.clock.epoch_ms(), max_age_ms) {
            return Ok(entry.value.clone());
        }

        let _serial = session.serial.lock().await;
        let bound = timeout.unwrap_or(self.options.call_timeout);
        let value = match tokio::time::timeout(bound, session.driver_session.get_property(name))
            .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(fault)) => return Err(self.handle_call_fault(id, fault)),
            // Timeouts do not fault the session; the caller decides.
            Err(_) => return Err(Fault::timeout(format!("get {name} on {id} timed out"))),
        };

        self.record_property(id, &session, name, value.clone(), None);
        Ok(value)
    }

    /// Write a property: invalidate, issue, refresh from the reply.
    pub async fn set_property(
        &self,
        id: &DeviceId,
        name: &str,
        value: ConfigValue,
        timeout: Option<Duration>,
    ) -> Result<(), Fault> {
        let session = self.connected_session(id)?;

        if let Some(cached) = session.cache.lock().get(name) {
            if !cached.writable {
                return Err(Fault::not_supported(format!("property {name} on {id} is read-only")));
            }
        }

        session.cache.lock().invalidate(name);
        let _serial = session.serial.lock().await;
        let bound = timeout.unwrap_or(self.options.call_timeout);
        let refreshed =
            match tokio::time::timeout(bound, session.driver_session.set_property(name, &value))
                .await
            {
                Ok(Ok(refreshed)) => refreshed,
                Ok(Err(fault)) => return Err(self.handle_call_fault(id, fault)),
                Err(_) => return Err(Fault::timeout(format!("set {name} on {id} timed out"))),
            };

        self.record_property(id, &session, name, refreshed, None);
        Ok(())
    }

    /// Invoke a device action.
    pub async fn invoke(
        &self,
        id: &DeviceId,
        action: &str,
        args: &ConfigValue,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ConfigValue, Fault> {
        let session = self.connected_session(id)?;
        let _serial = session.serial.lock().await;
        let bound = timeout.unwrap_or(self.options.call_timeout);
        match tokio::time::timeout(bound, session.driver_session.invoke(action, args, cancel))
            .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(fault)) => Err(self.handle_call_fault(id, fault)),
            Err(_) => Err(Fault::timeout(format!("action {action} on {id} timed out"))),
        }
    }

    /// Cached property without touching the device. Used by the restricted
    /// component view and by condition evaluation.
    pub fn cached_property(&self, id: &DeviceId, name: &str) -> Option<CachedProperty> {
        let devices = self.devices.lock();
        let entry = devices.get(id.as_str())?;
        let session = entry.session.as_ref()?;
        let cache = session.cache.lock();
        cache.get(name).cloned()
    }

    pub fn session_state(&self, id: &DeviceId) -> Option<SessionState> {
        self.devices.lock().get(id.as_str()).map(|e| e.state)
    }

    pub fn last_error(&self, id: &DeviceId) -> Option<Fault> {
        self.devices.lock().get(id.as_str()).and_then(|e| e.last_error.clone())
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.lock().keys().cloned().collect()
    }

    pub fn connected_count(&self) -> usize {
        self.devices.lock().values().filter(|e| e.state == SessionState::Connected).count()
    }

    pub fn list(&self) -> Vec<DeviceRow> {
        let devices = self.devices.lock();
        devices
            .values()
            .map(|entry| DeviceRow {
                id: entry.descriptor.id.clone(),
                kind: entry.descriptor.kind.to_string(),
                driver: entry.descriptor.driver.clone(),
                state: entry.state,
                cached_properties: entry
                    .session
                    .as_ref()
                    .map(|s| s.cache.lock().len())
                    .unwrap_or(0),
            })
            .collect()
    }

    /// Close every session, in registration order.
    pub async fn shutdown(&self) {
        for id in self.device_ids() {
            let connected = self.session_state(&id) == Some(SessionState::Connected);
            if connected {
                if let Err(e) = self.disconnect(&id).await {
                    warn!(device = %id, error = %e, "shutdown disconnect failed");
                }
            }
        }
    }

    pub(crate) fn options(&self) -> &ManagerOptions {
        &self.options
    }

    fn connected_session(&self, id: &DeviceId) -> Result<Arc<LiveSession>, Fault> {
        let devices = self.devices.lock();
        let entry = devices
            .get(id.as_str())
            .ok_or_else(|| Fault::not_found(format!("device {id}")))?;
        match (&entry.state, &entry.session) {
            (SessionState::Connected, Some(session)) => Ok(Arc::clone(session)),
            (state, _) => {
                Err(Fault::disconnected(format!("device {id} is {state}, not connected")))
            }
        }
    }

    /// Map one request failure; `disconnected` faults the whole session.
    fn handle_call_fault(&self, id: &DeviceId, fault: Fault) -> Fault {
        if fault.kind == ErrorKind::Disconnected {
            self.fault_session(id, None, fault.clone());
        }
        fault
    }

    fn record_property(
        &self,
        id: &DeviceId,
        session: &Arc<LiveSession>,
        name: &str,
        value: ConfigValue,
        writable: Option<bool>,
    ) {
        let now = self.clock.epoch_ms();
        {
            let mut cache = session.cache.lock();
            let writable = writable
                .or_else(|| cache.get(name).map(|e| e.writable))
                .unwrap_or(true);
            cache.observe(name, value.clone(), now, writable);
        }
        self.emit(Event::DeviceProperty {
            device_id: id.clone(),
            name: name.to_string(),
            value,
        });
    }

    fn fail_connect(&self, id: &DeviceId, fault: Fault) {
        {
            let mut devices = self.devices.lock();
            if let Some(entry) = devices.get_mut(id.as_str()) {
                entry.state = SessionState::Faulted;
                entry.last_error = Some(fault.clone());
                entry.session = None;
            }
        }
        self.emit_state(id, SessionState::Faulted);
        self.emit(Event::DeviceFault { device_id: id.clone(), fault });
    }

    /// Fault the session, optionally only when `expected` is still current
    /// (stale event pumps must not fault a reopened session).
    fn fault_session(&self, id: &DeviceId, expected: Option<&Arc<LiveSession>>, fault: Fault) {
        {
            let mut devices = self.devices.lock();
            let Some(entry) = devices.get_mut(id.as_str()) else {
                return;
            };
            if let Some(expected) = expected {
                let current = entry.session.as_ref().is_some_and(|s| Arc::ptr_eq(s, expected));
                if !current {
                    return;
                }
            }
            if entry.state != SessionState::Connected {
                return;
            }
            entry.state = SessionState::Faulted;
            entry.last_error = Some(fault.clone());
            entry.session = None;
        }
        self.emit_state(id, SessionState::Faulted);
        self.emit(Event::DeviceFault { device_id: id.clone(), fault });
    }

    /// Merge one session's event stream into the manager stream, tagged by
    /// device id. Per-session ordering is preserved by the single pump.
    fn spawn_event_pump(
        &self,
        id: DeviceId,
        session: Weak<LiveSession>,
        mut rx: mpsc::Receiver<SessionEvent>,
    ) {
        let manager = self.self_weak.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                let Some(live) = session.upgrade() else {
                    return;
                };
                match event {
                    SessionEvent::Property { name, value, writable } => {
                        manager.record_property(&id, &live, &name, value, Some(writable));
                    }
                    SessionEvent::Lost { fault } => {
                        debug!(device = %id, error = %fault, "session transport lost");
                        manager.fault_session(&id, Some(&live), fault);
                        return;
                    }
                }
            }
        });
    }

    fn emit(&self, event: Event) {
        if self.event_tx.try_send(event).is_err() {
            // Bus full; device state remains authoritative here.
        }
    }

    fn emit_state(&self, id: &DeviceId, state: SessionState) {
        self.emit(Event::DeviceState { device_id: id.clone(), state: state.to_string() });
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
