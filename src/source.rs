use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};
use std::net::UdpSocket;

/// A raw note event from whichever source is active. The main thread turns
/// these into per-split synth commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub note: u8,
    pub pressed: bool,
}

/// Decode the note-relevant subset of a raw MIDI message. Note-on with
/// velocity zero is a note-off per the MIDI spec; everything else (CC,
/// pitch bend, ...) is ignored.
pub fn note_event_from_midi(bytes: &[u8]) -> Option<NoteEvent> {
    if bytes.len() < 3 {
        return None;
    }
    let note = bytes[1] & 0x7f;
    match bytes[0] & 0xf0 {
        0x90 if bytes[2] > 0 => Some(NoteEvent { note, pressed: true }),
        0x90 | 0x80 => Some(NoteEvent { note, pressed: false }),
        _ => None,
    }
}

/// Decode the single-byte UDP transport: bit 7 pressed, bits 0..7 note.
pub fn note_event_from_udp(byte: u8) -> NoteEvent {
    NoteEvent {
        note: byte & 0x7f,
        pressed: byte & 0x80 != 0,
    }
}

/// MIDI input connection. Events are forwarded from midir's callback thread
/// over the channel; dropping this closes the port.
pub struct MidiSource {
    _connection: MidiInputConnection<()>,
}

impl MidiSource {
    /// Connect to a port selected by index or case-insensitive name
    /// substring.
    pub fn connect(port_spec: &str, tx: Sender<NoteEvent>) -> Result<Self> {
        let midi_in = MidiInput::new("minstrel-input")?;
        let ports = midi_in.ports();
        if ports.is_empty() {
            return Err(anyhow!("no MIDI input ports found"));
        }

        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "unknown".into()))
            .collect();
        let index = find_port(&names, port_spec)?;

        println!("Connecting to MIDI port: {}", names[index]);
        let connection = midi_in
            .connect(
                &ports[index],
                "minstrel-input",
                move |_timestamp, bytes, _| {
                    if let Some(event) = note_event_from_midi(bytes) {
                        // try_send keeps midir's thread from ever blocking.
                        let _ = tx.try_send(event);
                    }
                },
                (),
            )
            .map_err(|err| anyhow!("failed to connect to MIDI port: {err}"))?;

        Ok(Self {
            _connection: connection,
        })
    }

    pub fn list_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new("minstrel-list")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect())
    }
}

/// Match a port by index first, then by name substring.
fn find_port(names: &[String], spec: &str) -> Result<usize> {
    if let Ok(index) = spec.parse::<usize>() {
        if index < names.len() {
            return Ok(index);
        }
        return Err(anyhow!(
            "MIDI port index {index} out of range (0-{})",
            names.len() - 1
        ));
    }

    let spec_lower = spec.to_lowercase();
    names
        .iter()
        .position(|n| n.to_lowercase().contains(&spec_lower))
        .ok_or_else(|| anyhow!("MIDI port '{spec}' not found"))
}

/// Listen for single-byte note events on a UDP port. The receive loop runs
/// on its own thread for the life of the process.
pub fn spawn_udp_source(port: u16, tx: Sender<NoteEvent>) -> Result<()> {
    let socket =
        UdpSocket::bind(("0.0.0.0", port)).with_context(|| format!("binding UDP port {port}"))?;
    println!("Listening for note events on UDP port {port}");

    std::thread::spawn(move || {
        let mut buf = [0u8; 1024];
        loop {
            let len = match socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(err) => {
                    eprintln!("UDP receive failed: {err}");
                    return;
                }
            };
            for &byte in &buf[..len] {
                if tx.send(note_event_from_udp(byte)).is_err() {
                    return;
                }
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_note_on() {
        let event = note_event_from_midi(&[0x90, 60, 100]).unwrap();
        assert_eq!(event, NoteEvent { note: 60, pressed: true });
    }

    #[test]
    fn test_midi_note_off() {
        let event = note_event_from_midi(&[0x80, 60, 64]).unwrap();
        assert_eq!(event, NoteEvent { note: 60, pressed: false });
    }

    #[test]
    fn test_midi_note_on_zero_velocity_is_off() {
        let event = note_event_from_midi(&[0x91, 72, 0]).unwrap();
        assert_eq!(event, NoteEvent { note: 72, pressed: false });
    }

    #[test]
    fn test_midi_ignores_other_messages() {
        assert!(note_event_from_midi(&[0xb0, 123, 0]).is_none());
        assert!(note_event_from_midi(&[0x90, 60]).is_none());
        assert!(note_event_from_midi(&[]).is_none());
    }

    #[test]
    fn test_udp_byte_decoding() {
        assert_eq!(note_event_from_udp(0x80 | 60), NoteEvent { note: 60, pressed: true });
        assert_eq!(note_event_from_udp(60), NoteEvent { note: 60, pressed: false });
    }

    #[test]
    fn test_find_port() {
        let names = vec!["Midi Through".to_string(), "USB Keyboard".to_string()];
        assert_eq!(find_port(&names, "1").unwrap(), 1);
        assert_eq!(find_port(&names, "keyboard").unwrap(), 1);
        assert!(find_port(&names, "5").is_err());
        assert!(find_port(&names, "flute").is_err());
    }
}
