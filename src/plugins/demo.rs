//! Demo plugin - toggles lights on its own and on button presses
//!
//! A worker thread walks the matrix toggling one light per tick, which makes
//! it easy to see background drawing being cached and replayed on scene
//! switches. Pressing a matrix button toggles it green.

use anyhow::Result;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Plugin;
use crate::button::{ButtonArea, ButtonId, ButtonState};
use crate::config::PluginConfig;
use crate::proxy::DeviceProxy;

/// `options` block of a demo plugin entry
#[derive(Debug, Clone, Deserialize)]
pub struct DemoOptions {
    /// Worker tick in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 { 1000 }

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct DemoPlugin {
    name: String,
    interval: Duration,
    proxy: Mutex<Option<Arc<DeviceProxy>>>,
    worker: Mutex<Option<Worker>>,
}

impl DemoPlugin {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            proxy: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// True while the background worker runs
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn toggle(proxy: &DeviceProxy, button: ButtonId) {
        if let Err(e) = proxy.update_button(button, |state| state.toggle(ButtonState::Green)) {
            warn!("Demo '{}': {}", proxy.plugin(), e);
        }
    }

    fn run(proxy: Arc<DeviceProxy>, interval: Duration, stop: channel::Receiver<()>) {
        let cells: Vec<ButtonId> = ButtonArea::MATRIX.buttons().collect();
        let mut cursor = cells.iter().cycle();
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                // Stop signal or plugin dropped
                _ => break,
            }
            if let Some(button) = cursor.next() {
                Self::toggle(&proxy, *button);
            }
        }
        debug!("Demo '{}' worker stopped", proxy.plugin());
    }
}

pub(crate) fn factory(config: &PluginConfig) -> Result<Arc<dyn Plugin>> {
    let options: DemoOptions = config.options()?;
    if options.interval_ms == 0 {
        anyhow::bail!("Plugin '{}': interval_ms must be positive", config.name);
    }
    Ok(Arc::new(DemoPlugin::new(
        config.name.clone(),
        Duration::from_millis(options.interval_ms),
    )))
}

impl Plugin for DemoPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_register(&self, proxy: Arc<DeviceProxy>) {
        *self.proxy.lock() = Some(proxy.clone());

        if !proxy.areas().contains(ButtonArea::MATRIX) {
            info!("Demo '{}' registered without the matrix, worker not started", self.name);
            return;
        }

        let (stop, stop_rx) = channel::bounded(1);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name(format!("demo-{}", self.name))
            .spawn(move || Self::run(proxy, interval, stop_rx));

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(Worker { stop, handle });
                info!("Demo '{}' worker started ({:?} per step)", self.name, interval);
            }
            Err(e) => warn!("Demo '{}' could not start its worker: {}", self.name, e),
        }
    }

    fn on_unregister(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                warn!("Demo '{}' worker panicked", self.name);
            }
        }
        self.proxy.lock().take();
        info!("Demo '{}' unregistered", self.name);
    }

    fn on_button_press(&self, button: ButtonId) {
        if button.area() != ButtonArea::MATRIX {
            return;
        }
        if let Some(proxy) = self.proxy.lock().as_ref() {
            Self::toggle(proxy, button);
        }
    }
}
