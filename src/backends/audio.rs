// SPDX-License-Identifier: GPL-3.0-only

//! Note output
//!
//! Key transitions are delivered to a [`NoteSink`]. Sends are fire and
//! forget: a sink never reports failure back into the frame loop.
//!
//! - [`MidiSink`]: MIDI output port via midir (hardware synth, FluidSynth,
//!   or a virtual port other programs can subscribe to)
//! - [`LogSink`]: tracing only, for running without a synthesizer

use midir::{MidiOutput, MidiOutputConnection};
use tracing::{debug, info, warn};

use crate::config::AudioConfig;
use crate::constants::audio::MIDI_CLIENT_NAME;
use crate::errors::{AppError, AppResult};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const ALL_NOTES_OFF: u8 = 123;

/// Receiver of note events
pub trait NoteSink {
    /// Short description for logs and the status bar
    fn name(&self) -> &str;

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);
}

pub fn note_on_message(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

pub fn note_off_message(channel: u8, note: u8) -> [u8; 3] {
    [NOTE_OFF | (channel & 0x0F), note & 0x7F, 0]
}

pub fn program_change_message(channel: u8, program: u8) -> [u8; 2] {
    [PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F]
}

pub fn all_notes_off_message(channel: u8) -> [u8; 3] {
    [CONTROL_CHANGE | (channel & 0x0F), ALL_NOTES_OFF, 0]
}

/// Names of the available MIDI output ports
pub fn list_midi_ports() -> AppResult<Vec<String>> {
    let output = MidiOutput::new(MIDI_CLIENT_NAME)
        .map_err(|e| AppError::Audio(format!("Failed to open MIDI client: {}", e)))?;

    Ok(output
        .ports()
        .iter()
        .filter_map(|port| output.port_name(port).ok())
        .collect())
}

/// Sink writing to a MIDI output connection
pub struct MidiSink {
    name: String,
    connection: Option<MidiOutputConnection>,
    channel: u8,
    send_failures: u64,
}

impl MidiSink {
    /// Connect according to `config` and select its program
    ///
    /// With `virtual_port` set (unix only) a new port is announced instead
    /// of connecting to an existing one. Otherwise the first port whose name
    /// contains `port` is used, or the first port when `port` is unset.
    pub fn connect(config: &AudioConfig) -> AppResult<Self> {
        let output = MidiOutput::new(MIDI_CLIENT_NAME)
            .map_err(|e| AppError::Audio(format!("Failed to open MIDI client: {}", e)))?;

        let (name, connection) = if config.virtual_port {
            Self::create_virtual(output)?
        } else {
            let ports = output.ports();
            let selected = ports.iter().find(|port| match &config.port {
                Some(wanted) => output
                    .port_name(port)
                    .map(|name| name.contains(wanted.as_str()))
                    .unwrap_or(false),
                None => true,
            });

            let port = selected.ok_or_else(|| {
                AppError::Audio(match &config.port {
                    Some(wanted) => format!("No MIDI output port matching '{}'", wanted),
                    None => "No MIDI output ports available".to_string(),
                })
            })?;

            let name = output
                .port_name(port)
                .unwrap_or_else(|_| "unknown".to_string());
            let connection = output
                .connect(port, MIDI_CLIENT_NAME)
                .map_err(|e| AppError::Audio(format!("Failed to connect to '{}': {}", name, e)))?;
            (name, connection)
        };

        let mut sink = Self {
            name,
            connection: Some(connection),
            channel: config.channel,
            send_failures: 0,
        };
        sink.send(&program_change_message(config.channel, config.program));

        info!(
            port = %sink.name,
            channel = config.channel,
            program = config.program,
            "MIDI output connected"
        );
        Ok(sink)
    }

    #[cfg(unix)]
    fn create_virtual(output: MidiOutput) -> AppResult<(String, MidiOutputConnection)> {
        use midir::os::unix::VirtualOutput;

        let connection = output
            .create_virtual(MIDI_CLIENT_NAME)
            .map_err(|e| AppError::Audio(format!("Failed to create virtual port: {}", e)))?;
        Ok((format!("{} (virtual)", MIDI_CLIENT_NAME), connection))
    }

    #[cfg(not(unix))]
    fn create_virtual(_output: MidiOutput) -> AppResult<(String, MidiOutputConnection)> {
        Err(AppError::Audio(
            "Virtual MIDI ports are only supported on unix".to_string(),
        ))
    }

    fn send(&mut self, message: &[u8]) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(e) = connection.send(message) {
            self.send_failures += 1;
            // Only the first failure and then every hundredth are logged
            if self.send_failures == 1 || self.send_failures % 100 == 0 {
                warn!(failures = self.send_failures, "MIDI send failed: {}", e);
            }
        }
    }
}

impl NoteSink for MidiSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(&note_on_message(channel, note, velocity));
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.send(&note_off_message(channel, note));
    }
}

impl Drop for MidiSink {
    fn drop(&mut self) {
        self.send(&all_notes_off_message(self.channel));
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        debug!(port = %self.name, "MIDI output closed");
    }
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LogSink;

impl NoteSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        info!(channel, note, velocity, "Note on");
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        info!(channel, note, "Note off");
    }
}

/// Open the sink described by `config`
///
/// MIDI setup failures fall back to [`LogSink`] so the keyboard still runs.
pub fn open_sink(config: &AudioConfig) -> Box<dyn NoteSink> {
    if !config.enabled {
        info!("MIDI output disabled, logging notes only");
        return Box::new(LogSink);
    }

    match MidiSink::connect(config) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            warn!("{}; logging notes only", e);
            Box::new(LogSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_messages() {
        assert_eq!(note_on_message(0, 60, 127), [0x90, 60, 127]);
        assert_eq!(note_on_message(9, 36, 100), [0x99, 36, 100]);
        assert_eq!(note_off_message(0, 60), [0x80, 60, 0]);
    }

    #[test]
    fn test_channel_and_data_bytes_are_masked() {
        assert_eq!(note_on_message(0x12, 200, 255), [0x92, 72, 127]);
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(program_change_message(0, 0), [0xC0, 0]);
        assert_eq!(program_change_message(3, 19), [0xC3, 19]);
        assert_eq!(all_notes_off_message(1), [0xB1, 123, 0]);
    }

    #[test]
    fn test_disabled_audio_logs_only() {
        let config = AudioConfig {
            enabled: false,
            ..Default::default()
        };
        let mut sink = open_sink(&config);
        assert_eq!(sink.name(), "log");
        sink.note_on(0, 60, 127);
        sink.note_off(0, 60);
    }
}
