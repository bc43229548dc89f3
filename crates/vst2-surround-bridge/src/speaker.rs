use std::ffi::c_char;

use vst2_sys::{
    kSpeakerArr51, kSpeakerC, kSpeakerL, kSpeakerLfe, kSpeakerLs, kSpeakerR, kSpeakerRs,
    VstSpeakerArrangement, VstSpeakerProperties,
};

/// Channel width of the bridge's internal buffers. The module always sees
/// exactly this many inputs and outputs.
pub const INTERNAL_CHANNELS: usize = 6;

/// A single speaker position inside a [`SpeakerLayout`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakerDescriptor {
    pub name: &'static str,
    pub azimuth: f32,
    pub elevation: f32,
    pub radius: f32,
    pub speaker_type: i32,
}

/// Immutable description of a discrete speaker arrangement.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerLayout {
    arrangement_type: i32,
    speakers: [SpeakerDescriptor; INTERNAL_CHANNELS],
}

impl SpeakerLayout {
    /// The canonical 5.1 layout offered to every module: L, R, C, LFE, Ls, Rs.
    pub fn surround_5_1() -> Self {
        let speaker = |name, azimuth, speaker_type| SpeakerDescriptor {
            name,
            azimuth,
            elevation: 0.0,
            radius: 1.0,
            speaker_type,
        };
        Self {
            arrangement_type: kSpeakerArr51,
            speakers: [
                speaker("L", -30.0, kSpeakerL),
                speaker("R", 30.0, kSpeakerR),
                speaker("C", 0.0, kSpeakerC),
                speaker("LFE", 0.0, kSpeakerLfe),
                speaker("Ls", -110.0, kSpeakerLs),
                speaker("Rs", 110.0, kSpeakerRs),
            ],
        }
    }

    pub fn arrangement_type(&self) -> i32 {
        self.arrangement_type
    }

    pub fn channels(&self) -> usize {
        self.speakers.len()
    }

    pub fn speakers(&self) -> &[SpeakerDescriptor] {
        &self.speakers
    }

    /// Render a fresh SDK arrangement. Every call returns a new value so the
    /// module may scribble over it without touching the layout.
    pub fn to_arrangement(&self) -> VstSpeakerArrangement {
        let mut arrangement = VstSpeakerArrangement::zeroed();
        arrangement.type_ = self.arrangement_type;
        arrangement.numChannels = self.speakers.len() as i32;
        for (slot, speaker) in arrangement.speakers.iter_mut().zip(&self.speakers) {
            *slot = speaker_properties(speaker);
        }
        arrangement
    }
}

impl Default for SpeakerLayout {
    fn default() -> Self {
        Self::surround_5_1()
    }
}

fn speaker_properties(speaker: &SpeakerDescriptor) -> VstSpeakerProperties {
    let mut props = VstSpeakerProperties::zeroed();
    props.azimuth = speaker.azimuth;
    props.elevation = speaker.elevation;
    props.radius = speaker.radius;
    props.type_ = speaker.speaker_type;
    write_c_string(&mut props.name, speaker.name);
    props
}

/// Copy `value` into a fixed C buffer, truncating and always NUL terminating.
pub(crate) fn write_c_string(dst: &mut [c_char], value: &str) {
    let Some(capacity) = dst.len().checked_sub(1) else {
        return;
    };
    let len = value.len().min(capacity);
    for (slot, byte) in dst.iter_mut().zip(&value.as_bytes()[..len]) {
        *slot = *byte as c_char;
    }
    dst[len] = 0;
}
