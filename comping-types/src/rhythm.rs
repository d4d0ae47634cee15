//! Rhythms and their voices.

use serde::{Deserialize, Serialize};

use crate::TimeSignature;

/// Identifies a rhythm voice across the whole song, e.g. `swing/bass`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RhythmVoiceId(String);

impl RhythmVoiceId {
    pub fn new(rhythm_id: &str, voice_name: &str) -> Self {
        Self(format!("{}/{}", rhythm_id, voice_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RhythmVoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceKind {
    Bass,
    Drums,
    Percussion,
    Chord,
    Pad,
    Melody,
}

impl VoiceKind {
    pub fn is_drums(self) -> bool {
        matches!(self, VoiceKind::Drums | VoiceKind::Percussion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RhythmVoice {
    pub id: RhythmVoiceId,
    pub name: String,
    pub kind: VoiceKind,
    /// MIDI channel used when the mix is built from the rhythm (0-15).
    pub preferred_channel: u8,
    /// General MIDI program used by default.
    pub preferred_program: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rhythm {
    pub id: String,
    pub name: String,
    pub time_signature: TimeSignature,
    pub preferred_tempo: u16,
    pub voices: Vec<RhythmVoice>,
}

impl Rhythm {
    pub fn new(id: &str, name: &str, time_signature: TimeSignature, preferred_tempo: u16) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            time_signature,
            preferred_tempo,
            voices: Vec::new(),
        }
    }

    /// Builder-style voice registration.
    pub fn with_voice(mut self, name: &str, kind: VoiceKind, channel: u8, program: u8) -> Self {
        self.voices.push(RhythmVoice {
            id: RhythmVoiceId::new(&self.id, name),
            name: name.to_string(),
            kind,
            preferred_channel: channel.min(15),
            preferred_program: program.min(127),
        });
        self
    }

    pub fn voice(&self, id: &RhythmVoiceId) -> Option<&RhythmVoice> {
        self.voices.iter().find(|v| &v.id == id)
    }

    /// A small jazz combo rhythm (bass, piano, drums).
    pub fn jazz_trio(id: &str, time_signature: TimeSignature) -> Self {
        Rhythm::new(id, id, time_signature, 120)
            .with_voice("bass", VoiceKind::Bass, 1, 32)
            .with_voice("piano", VoiceKind::Chord, 2, 0)
            .with_voice("drums", VoiceKind::Drums, 9, 0)
    }
}
