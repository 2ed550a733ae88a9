//! Multiplexer - shares one device between several plugins
//!
//! The multiplexer owns the device link and keeps, per area, a rotation of
//! the plugins registered there. The head of a rotation is the foreground
//! plugin of that area: it receives the area's events and its proxy writes
//! reach the device. Everything else draws into its proxy cache only.
//!
//! - Registration and unregistration (this module)
//! - Scene rotation and activation (`scene`)
//! - Inbound event routing and the shift gesture (`routing`)
//! - Blanking, resync and driver reattachment (`power`)
//!
//! All of the above run under one re-entrant lock. Plugin hooks are called
//! inside that critical section; a hook that calls back into the multiplexer
//! gets [`MuxError::Reentrant`] instead of a deadlock.

mod power;
mod routing;
mod scene;


pub use power::PowerHooks;

use parking_lot::ReentrantMutex;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, info};

use crate::button::ButtonArea;
use crate::device::{DeviceDriver, DeviceLink};
use crate::error::{MuxError, Result};
use crate::plugins::Plugin;
use crate::proxy::DeviceProxy;

use routing::EventSink;

/// Multiplexer tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuxOptions {
    /// A mirrored fader counts as changed when `|live - mirror| > fader_epsilon`
    pub fader_epsilon: f32,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self { fader_epsilon: 0.0 }
    }
}

/// One registered plugin
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) name: String,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) areas: ButtonArea,
    pub(crate) proxy: Arc<DeviceProxy>,
}

/// State guarded by the multiplexer lock
#[derive(Default)]
pub(crate) struct MuxState {
    /// Rotations for matrix, horizontal and vertical; front is foreground
    rotations: [VecDeque<String>; 3],
    /// Registrations in registration order
    registrations: Vec<Registration>,
    /// Shift is held down
    shift_armed: bool,
}

impl MuxState {
    fn slot(area: ButtonArea) -> Option<usize> {
        match area {
            ButtonArea::MATRIX => Some(0),
            ButtonArea::HORIZONTAL => Some(1),
            ButtonArea::VERTICAL => Some(2),
            _ => None,
        }
    }

    pub(crate) fn rotation(&self, area: ButtonArea) -> Option<&VecDeque<String>> {
        Self::slot(area).map(|slot| &self.rotations[slot])
    }

    pub(crate) fn rotation_mut(&mut self, area: ButtonArea) -> Option<&mut VecDeque<String>> {
        Self::slot(area).map(move |slot| &mut self.rotations[slot])
    }

    pub(crate) fn find(&self, name: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    /// Foreground registration of a single area
    pub(crate) fn head(&self, area: ButtonArea) -> Option<Registration> {
        let name = self.rotation(area)?.front()?;
        self.find(name).cloned()
    }

    pub(crate) fn is_head(&self, area: ButtonArea, name: &str) -> bool {
        self.rotation(area)
            .and_then(|rotation| rotation.front())
            .is_some_and(|head| head == name)
    }
}

/// Take the state for mutation, detecting same-thread re-entry
fn borrow<'a>(cell: &'a RefCell<MuxState>, operation: &'static str) -> Result<RefMut<'a, MuxState>> {
    cell.try_borrow_mut().map_err(|_| {
        error!(operation, "Multiplexer re-entered from a plugin hook, call rejected");
        MuxError::Reentrant { operation }
    })
}

/// Read-only counterpart of [`borrow`]
fn read<'a>(cell: &'a RefCell<MuxState>, operation: &'static str) -> Result<Ref<'a, MuxState>> {
    cell.try_borrow().map_err(|_| {
        error!(operation, "Multiplexer re-entered from a plugin hook, call rejected");
        MuxError::Reentrant { operation }
    })
}

fn single_plugin_area(area: ButtonArea) -> Result<ButtonArea> {
    if area.is_single() && ButtonArea::PLUGIN_AREAS.contains(area) {
        Ok(area)
    } else {
        Err(MuxError::out_of_range(
            "area bits",
            area.bits(),
            "exactly one of matrix, horizontal, vertical",
        ))
    }
}

/// Shares one [`DeviceDriver`] between plugins
pub struct Multiplexer {
    link: Arc<DeviceLink>,
    options: MuxOptions,
    state: ReentrantMutex<RefCell<MuxState>>,
    /// We are the driver's subscriber
    attached: AtomicBool,
    this: Weak<Multiplexer>,
}

impl Multiplexer {
    /// Take over `driver`: events off, subscribe, all lights off, events on
    pub fn new(driver: Arc<dyn DeviceDriver>, options: MuxOptions) -> Result<Arc<Self>> {
        let mux = Arc::new_cyclic(|this| Self {
            link: Arc::new(DeviceLink::new(driver.clone())),
            options,
            state: ReentrantMutex::new(RefCell::new(MuxState::default())),
            attached: AtomicBool::new(false),
            this: this.clone(),
        });

        mux.attach(&driver)?;
        info!("Multiplexer ready (fader epsilon {})", options.fader_epsilon);
        Ok(mux)
    }

    /// Subscribe to `driver` with events off, then reset it and turn events on
    ///
    /// A refused subscription leaves the driver's lights and event gate as
    /// they were.
    fn attach(&self, driver: &Arc<dyn DeviceDriver>) -> Result<()> {
        let was_enabled = driver.events_enabled();
        driver.set_events_enabled(false);

        let sink = Arc::new(EventSink::new(self.this.clone()));
        if let Err(e) = driver.subscribe(sink) {
            driver.set_events_enabled(was_enabled);
            error!("Device refused subscription: {}", e);
            return Err(e.into());
        }

        driver.reset();
        driver.set_events_enabled(true);
        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn options(&self) -> MuxOptions {
        self.options
    }

    /// Driver currently behind the link
    pub fn driver(&self) -> Arc<dyn DeviceDriver> {
        self.link.driver()
    }

    /// Register `plugin` on `areas`
    ///
    /// The plugin gets a blank proxy and joins the back of each area's rotation.
    /// It becomes foreground right away on every area it is alone on.
    pub fn register(&self, areas: ButtonArea, plugin: Arc<dyn Plugin>) -> Result<Arc<DeviceProxy>> {
        let name = plugin.name().to_string();
        if areas.is_empty() || !ButtonArea::PLUGIN_AREAS.contains(areas) {
            error!(plugin = %name, areas = %areas, "Registration rejected: invalid areas");
            return Err(MuxError::InvalidScope { plugin: name, areas });
        }

        let guard = self.state.lock();
        let mut state = borrow(&guard, "register")?;

        if state.find(&name).is_some() {
            error!(plugin = %name, "Registration rejected: name already registered");
            return Err(MuxError::DuplicateRegistration { plugin: name });
        }

        let proxy = Arc::new(DeviceProxy::new(name.clone(), areas, self.link.clone()));
        let registration = Registration {
            name: name.clone(),
            plugin: plugin.clone(),
            areas,
            proxy: proxy.clone(),
        };

        for area in areas.split() {
            if let Some(rotation) = state.rotation_mut(area) {
                rotation.push_back(name.clone());
            }
        }
        state.registrations.push(registration.clone());

        plugin.on_register(proxy.clone());

        for area in areas.split() {
            let alone = state.rotation(area).is_some_and(|rotation| rotation.len() == 1);
            if alone {
                self.activate(&registration, area)?;
            }
        }

        info!("Registered plugin '{}' on {}", name, areas);
        Ok(proxy)
    }

    /// Remove a plugin
    ///
    /// Areas where it was foreground are deactivated first, then the plugin is
    /// told to stop, and the next plugin in line (if any) takes over.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let guard = self.state.lock();
        let mut state = borrow(&guard, "unregister")?;
        self.unregister_locked(&mut state, name, true)
    }

    fn unregister_locked(&self, state: &mut MuxState, name: &str, promote: bool) -> Result<()> {
        let Some(registration) = state.find(name).cloned() else {
            error!(plugin = %name, "Unregistration rejected: unknown plugin");
            return Err(MuxError::UnknownPlugin {
                plugin: name.to_string(),
            });
        };

        let fronted: Vec<ButtonArea> = registration
            .areas
            .split()
            .filter(|area| state.is_head(*area, name))
            .collect();

        for area in &fronted {
            self.deactivate(&registration, *area)?;
        }

        registration.plugin.on_unregister();

        for area in registration.areas.split() {
            if let Some(rotation) = state.rotation_mut(area) {
                rotation.retain(|entry| entry != name);
            }
        }
        state.registrations.retain(|r| r.name != name);
        info!("Unregistered plugin '{}'", name);

        if promote {
            for area in fronted {
                if let Some(next) = state.head(area) {
                    self.activate(&next, area)?;
                    info!("Scene {} → '{}'", area, next.name);
                }
            }
        }
        Ok(())
    }

    /// Unregister every plugin, without promoting anyone
    pub fn shutdown(&self) -> Result<()> {
        let guard = self.state.lock();
        let mut state = borrow(&guard, "shutdown")?;

        let names: Vec<String> = state.registrations.iter().map(|r| r.name.clone()).collect();
        info!("Shutting down multiplexer ({} plugins)", names.len());
        for name in names {
            self.unregister_locked(&mut state, &name, false)?;
        }
        state.shift_armed = false;
        Ok(())
    }

    /// Registered plugin names, in registration order
    pub fn plugins(&self) -> Result<Vec<String>> {
        let guard = self.state.lock();
        let state = read(&guard, "plugins")?;
        Ok(state.registrations.iter().map(|r| r.name.clone()).collect())
    }

    /// Foreground plugin of a single area
    pub fn foreground(&self, area: ButtonArea) -> Result<Option<String>> {
        let area = single_plugin_area(area)?;
        let guard = self.state.lock();
        let state = read(&guard, "foreground")?;
        Ok(state.rotation(area).and_then(|r| r.front().cloned()))
    }

    /// Rotation of a single area, foreground first
    pub fn rotation(&self, area: ButtonArea) -> Result<Vec<String>> {
        let area = single_plugin_area(area)?;
        let guard = self.state.lock();
        let state = read(&guard, "rotation")?;
        Ok(state
            .rotation(area)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Proxy of a registered plugin
    pub fn proxy(&self, name: &str) -> Result<Arc<DeviceProxy>> {
        let guard = self.state.lock();
        let state = read(&guard, "proxy")?;
        state
            .find(name)
            .map(|r| r.proxy.clone())
            .ok_or_else(|| MuxError::UnknownPlugin {
                plugin: name.to_string(),
            })
    }

    /// True while shift is held
    pub fn is_shift_armed(&self) -> Result<bool> {
        let guard = self.state.lock();
        let state = read(&guard, "is_shift_armed")?;
        Ok(state.shift_armed)
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        if self.attached.load(Ordering::SeqCst) {
            self.link.driver().unsubscribe();
        }
    }
}
