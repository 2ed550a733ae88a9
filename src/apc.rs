//! Akai APC mini driver
//!
//! Handles MIDI communication with the APC mini over `midir`. Lights are Note
//! On messages on channel 1 (note = flat index, velocity = state); buttons
//! arrive as Note On / Note Off; faders are CC 48 to 56 with 7-bit values.
//!
//! Inbound messages are translated in the MIDI callback, queued on a bounded
//! channel and delivered from a dedicated dispatcher thread, which coalesces
//! bursts of motion on the same fader.

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::button::{ButtonArea, ButtonId, ButtonState, N_FADERS, N_LIGHTS};
use crate::config::DeviceConfig;
use crate::device::{coalesce, DeviceDriver, DeviceEvent, DeviceEventHandler};
use crate::error::DeviceError;
use crate::midi::{convert, format_hex, MidiMessage};

/// CC number of fader 0
pub const FADER_CC_OFFSET: u8 = 48;

/// Port name fragment used when no port is configured
pub const AUTO_DISCOVERY_PATTERN: &str = "APC MINI";

/// Inbound events buffered between the MIDI callback and the dispatcher
const EVENT_QUEUE_SIZE: usize = 1024;

const CLIENT_NAME: &str = "apc-mux";

/// State shared with the MIDI callback and the dispatcher thread
struct Shared {
    subscriber: Mutex<Option<Arc<dyn DeviceEventHandler>>>,
    events_enabled: AtomicBool,
    /// Fader ground truth, updated on receipt
    faders: Mutex<[Option<f32>; N_FADERS]>,
}

impl Shared {
    fn new() -> Self {
        Self {
            subscriber: Mutex::new(None),
            events_enabled: AtomicBool::new(true),
            faders: Mutex::new([None; N_FADERS]),
        }
    }

    /// Map a parsed message to a device event, recording fader values
    fn translate(&self, message: MidiMessage) -> Option<DeviceEvent> {
        match message {
            MidiMessage::NoteOn { note, .. } => ButtonId::from_index(note).ok().map(DeviceEvent::Press),
            MidiMessage::NoteOff { note, .. } => ButtonId::from_index(note).ok().map(DeviceEvent::Release),
            MidiMessage::ControlChange { cc, value, .. } => {
                let index = cc.checked_sub(FADER_CC_OFFSET)? as usize;
                if index >= N_FADERS {
                    return None;
                }
                let value = convert::to_unit(value);
                self.faders.lock()[index] = Some(value);
                Some(DeviceEvent::Fader { index, value })
            }
        }
    }

    /// Deliver queued events until every sender is gone
    fn dispatch_loop(&self, rx: Receiver<DeviceEvent>) {
        while let Ok(first) = rx.recv() {
            let mut batch = vec![first];
            batch.extend(rx.try_iter());

            for event in coalesce(batch) {
                if !self.events_enabled.load(Ordering::SeqCst) {
                    trace!("Event dropped: delivery disabled");
                    continue;
                }
                let subscriber = self.subscriber.lock().clone();
                if let Some(handler) = subscriber {
                    event.dispatch(handler.as_ref());
                }
            }
        }
        debug!("APC mini dispatcher stopped");
    }
}

struct Output {
    conn: MidiOutputConnection,
    /// Last state successfully sent per flat index
    lights: [ButtonState; N_LIGHTS],
}

/// APC mini driver for hardware communication
pub struct ApcMini {
    output: Mutex<Output>,
    input: Mutex<Option<MidiInputConnection<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl ApcMini {
    /// Open the configured ports (or the auto-discovered APC mini)
    pub fn connect(config: &DeviceConfig) -> Result<Self> {
        let input_pattern = config.input_port.as_deref().unwrap_or(AUTO_DISCOVERY_PATTERN);
        let output_pattern = config.output_port.as_deref().unwrap_or(AUTO_DISCOVERY_PATTERN);

        info!(
            "Connecting to APC mini - Input: '{}', Output: '{}'",
            input_pattern, output_pattern
        );

        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        debug!("Found {} MIDI output ports", midi_out.port_count());
        let (out_port, output_port) = find_output_port(&midi_out, output_pattern)
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found (try --list-ports)", output_pattern))?;
        info!("Connecting to output port: {}", output_port);
        let conn = midi_out
            .connect(&out_port, "apc-mux-out")
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to connect to output port")?;

        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        debug!("Found {} MIDI input ports", midi_in.port_count());
        let (in_port, input_port) = find_input_port(&midi_in, input_pattern)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found (try --list-ports)", input_pattern))?;

        let shared = Arc::new(Shared::new());
        let (event_tx, event_rx) = channel::bounded(EVENT_QUEUE_SIZE);

        let dispatcher = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("apc-dispatch".to_string())
                .spawn(move || shared.dispatch_loop(event_rx))
                .context("Failed to start event dispatcher")?
        };

        info!("Connecting to input port: {}", input_port);
        let callback_shared = shared.clone();
        let input_conn = midi_in
            .connect(
                &in_port,
                "apc-mux-in",
                move |_timestamp, data, _| on_midi(data, &callback_shared, &event_tx),
                (),
            )
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to connect to input port")?;

        info!("APC mini connected");
        Ok(Self {
            output: Mutex::new(Output {
                conn,
                lights: [ButtonState::Off; N_LIGHTS],
            }),
            input: Mutex::new(Some(input_conn)),
            dispatcher: Mutex::new(Some(dispatcher)),
            shared,
        })
    }

    /// Close the input port and stop the dispatcher
    pub fn close(&self) {
        // Dropping the connection drops the callback and with it the queue sender
        if let Some(conn) = self.input.lock().take() {
            conn.close();
            info!("APC mini disconnected");
        }
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("APC mini dispatcher panicked");
            }
        }
    }
}

/// MIDI input callback: parse, translate, enqueue without blocking
fn on_midi(data: &[u8], shared: &Shared, tx: &Sender<DeviceEvent>) {
    let Some(message) = MidiMessage::parse(data) else {
        trace!("Ignoring MIDI: {}", format_hex(data));
        return;
    };
    let Some(event) = shared.translate(message) else {
        trace!("Ignoring unmapped message: {}", message);
        return;
    };
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!("Event queue full, dropping {:?}", event),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

impl DeviceDriver for ApcMini {
    fn set_light(&self, index: u8, state: ButtonState, force: bool) {
        let mut output = self.output.lock();
        let Some(last) = output.lights.get(index as usize).copied() else {
            warn!("Ignoring write to unmapped light {}", index);
            return;
        };
        if !force && last == state {
            return;
        }

        let message = MidiMessage::NoteOn {
            channel: 0,
            note: index,
            velocity: state.velocity(),
        };
        let data = message.encode();
        match output.conn.send(&data) {
            Ok(()) => {
                output.lights[index as usize] = state;
                trace!("Sent: {} | {}", format_hex(&data), message);
            }
            Err(e) => warn!("Failed to send {}: {}", message, e),
        }
    }

    fn light(&self, index: u8) -> ButtonState {
        self.output
            .lock()
            .lights
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    fn fader(&self, index: usize) -> Option<f32> {
        self.shared.faders.lock().get(index).copied().flatten()
    }

    fn subscribe(&self, handler: Arc<dyn DeviceEventHandler>) -> std::result::Result<(), DeviceError> {
        let mut subscriber = self.shared.subscriber.lock();
        if subscriber.is_some() {
            return Err(DeviceError::AlreadySubscribed);
        }
        *subscriber = Some(handler);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.shared.subscriber.lock().take();
    }

    fn set_events_enabled(&self, enabled: bool) {
        debug!("APC mini events {}", if enabled { "enabled" } else { "disabled" });
        self.shared.events_enabled.store(enabled, Ordering::SeqCst);
    }

    fn events_enabled(&self) -> bool {
        self.shared.events_enabled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        for button in ButtonArea::ALL.buttons() {
            self.set_light(button.to_index(), ButtonState::Off, true);
        }
    }
}

impl Drop for ApcMini {
    fn drop(&mut self) {
        self.close();
    }
}

/// Find an input port by substring match (Windows-friendly)
fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(midir::MidiInputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            // Case-insensitive substring match
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Find an output port by substring match (Windows-friendly)
fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(midir::MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            // Case-insensitive substring match
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Port discovery utilities
pub mod discovery {
    use super::*;

    /// Information about a MIDI port
    #[derive(Debug, Clone)]
    pub struct PortInfo {
        pub name: String,
        pub is_virtual: bool,
    }

    fn is_virtual(name: &str) -> bool {
        name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC") || name.contains("Through")
    }

    /// Discover input ports
    pub fn discover_input_ports() -> Result<Vec<PortInfo>> {
        let midi_in = MidiInput::new("apc-mux-discovery")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| {
                let name = midi_in.port_name(port).ok()?;
                Some(PortInfo {
                    is_virtual: is_virtual(&name),
                    name,
                })
            })
            .collect())
    }

    /// Discover output ports
    pub fn discover_output_ports() -> Result<Vec<PortInfo>> {
        let midi_out = MidiOutput::new("apc-mux-discovery")?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| {
                let name = midi_out.port_name(port).ok()?;
                Some(PortInfo {
                    is_virtual: is_virtual(&name),
                    name,
                })
            })
            .collect())
    }

    /// Find the APC mini ports automatically
    pub fn find_apc_ports() -> Option<(String, String)> {
        let pattern = AUTO_DISCOVERY_PATTERN.to_lowercase();
        let matches = |p: &&PortInfo| p.name.to_lowercase().contains(&pattern) && !p.is_virtual;

        let inputs = discover_input_ports().ok()?;
        let outputs = discover_output_ports().ok()?;
        let input = inputs.iter().find(matches)?;
        let output = outputs.iter().find(matches)?;
        Some((input.name.clone(), output.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DeviceEvent>>,
    }

    impl DeviceEventHandler for Recorder {
        fn on_button_press(&self, button: ButtonId) {
            self.events.lock().push(DeviceEvent::Press(button));
        }

        fn on_button_release(&self, button: ButtonId) {
            self.events.lock().push(DeviceEvent::Release(button));
        }

        fn on_fader_change(&self, index: usize, value: f32) {
            self.events.lock().push(DeviceEvent::Fader { index, value });
        }
    }

    #[test]
    fn test_translate_buttons() {
        let shared = Shared::new();
        let press = shared.translate(MidiMessage::NoteOn { channel: 0, note: 98, velocity: 127 });
        assert_eq!(press, Some(DeviceEvent::Press(ButtonId::SHIFT)));

        let release = shared.translate(MidiMessage::NoteOff { channel: 0, note: 64, velocity: 0 });
        assert_eq!(release, Some(DeviceEvent::Release(ButtonId::horizontal(0).unwrap())));

        // Unmapped note
        assert_eq!(shared.translate(MidiMessage::NoteOn { channel: 0, note: 75, velocity: 127 }), None);
    }

    #[test]
    fn test_translate_faders_updates_ground_truth() {
        let shared = Shared::new();
        let event = shared.translate(MidiMessage::ControlChange { channel: 0, cc: 56, value: 127 });
        assert_eq!(event, Some(DeviceEvent::Fader { index: 8, value: 1.0 }));
        assert_eq!(shared.faders.lock()[8], Some(1.0));

        assert_eq!(shared.translate(MidiMessage::ControlChange { channel: 0, cc: 57, value: 1 }), None);
        assert_eq!(shared.translate(MidiMessage::ControlChange { channel: 0, cc: 7, value: 1 }), None);
    }

    #[test]
    fn test_on_midi_drops_when_full() {
        let shared = Shared::new();
        let (tx, rx) = channel::bounded(1);
        on_midi(&[0xB0, 48, 10], &shared, &tx);
        on_midi(&[0xB0, 48, 20], &shared, &tx);
        on_midi(&[0xF8], &shared, &tx);

        assert_eq!(rx.try_iter().count(), 1);
        // Ground truth still follows the hardware
        assert_eq!(shared.faders.lock()[0], Some(convert::to_unit(20)));
    }

    #[test]
    fn test_dispatch_coalesces_and_honours_flag() {
        let shared = Shared::new();
        let recorder = Arc::new(Recorder::default());
        *shared.subscriber.lock() = Some(recorder.clone());

        let (tx, rx) = channel::bounded(16);
        for value in [0.1, 0.2, 0.3] {
            tx.send(DeviceEvent::Fader { index: 0, value }).unwrap();
        }
        tx.send(DeviceEvent::Press(ButtonId::SHIFT)).unwrap();
        drop(tx);
        shared.dispatch_loop(rx);

        assert_eq!(
            *recorder.events.lock(),
            vec![
                DeviceEvent::Fader { index: 0, value: 0.3 },
                DeviceEvent::Press(ButtonId::SHIFT)
            ]
        );

        shared.events_enabled.store(false, Ordering::SeqCst);
        let (tx, rx) = channel::bounded(16);
        tx.send(DeviceEvent::Press(ButtonId::SHIFT)).unwrap();
        drop(tx);
        shared.dispatch_loop(rx);
        assert_eq!(recorder.events.lock().len(), 2);
    }

    #[test]
    fn test_port_discovery() {
        // This test just ensures the discovery functions don't panic
        let _ = discovery::discover_input_ports();
        let _ = discovery::discover_output_ports();
        let _ = discovery::find_apc_ports();
    }
}
