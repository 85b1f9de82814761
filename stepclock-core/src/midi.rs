//! MIDI output through midir.

use std::sync::Mutex;

use midir::{MidiOutput, MidiOutputConnection};
use stepclock_audio::{SinkError, SinkResult, SoundSink};
use thiserror::Error;

const CLIENT_NAME: &str = "stepclock";
const PORT_NAME: &str = "stepclock-out";

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to open MIDI output: {0}")]
    Init(String),
    #[error("no MIDI output ports available")]
    NoPorts,
    #[error("failed to connect to {port}: {reason}")]
    Connect { port: String, reason: String },
}

/// Note-on status byte for a 0-based channel.
pub fn note_on_message(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

pub fn note_off_message(channel: u8, note: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0F), note & 0x7F, 0]
}

/// Index of the first port whose name contains `wanted` (case-insensitive),
/// else the first port.
pub fn select_port(names: &[String], wanted: Option<&str>) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let Some(wanted) = wanted else {
        return Some(0);
    };
    let wanted = wanted.to_lowercase();
    match names.iter().position(|n| n.to_lowercase().contains(&wanted)) {
        Some(index) => Some(index),
        None => {
            log::warn!(target: "midi", "no output port matches {:?}, using {}", wanted, names[0]);
            Some(0)
        }
    }
}

/// A `SoundSink` writing to one MIDI output port.
pub struct MidirSink {
    connection: Mutex<MidiOutputConnection>,
    port_name: String,
}

impl MidirSink {
    pub fn connect(wanted: Option<&str>) -> Result<Self, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "Unknown".to_string()))
            .collect();
        let index = select_port(&names, wanted).ok_or(MidiError::NoPorts)?;
        let port_name = names[index].clone();

        let connection = midi_out
            .connect(&ports[index], PORT_NAME)
            .map_err(|e| MidiError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;
        log::info!(target: "midi", "connected to MIDI output {}", port_name);

        Ok(Self {
            connection: Mutex::new(connection),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&self, message: &[u8]) -> SinkResult {
        let mut conn = self.connection.lock().map_err(|_| SinkError::Closed)?;
        conn.send(message)
            .map_err(|e| SinkError::Send(e.to_string()))
    }
}

impl SoundSink for MidirSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) -> SinkResult {
        self.send(&note_on_message(channel, note, velocity))
    }

    fn note_off(&self, channel: u8, note: u8) -> SinkResult {
        self.send(&note_off_message(channel, note))
    }
}
