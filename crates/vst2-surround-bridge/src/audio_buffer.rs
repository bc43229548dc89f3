use std::ops::{Index, IndexMut};

/// Channel-major audio buffer exchanged with the outer host.
///
/// The router also uses it for the module-side buffers, where the stored
/// frame count acts as capacity and only the first `frames` samples of a
/// block are touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a buffer with the provided number of channels and frames,
    /// initialised to silence.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| vec![0.0; frames]).collect(),
            frames,
        }
    }

    /// Builds a buffer from existing channel data. Channels are truncated to
    /// the shortest one.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        Self { channels, frames }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Resizes the buffer while preserving existing contents where
    /// possible. New samples are initialised to silence.
    pub fn resize(&mut self, channels: usize, frames: usize) {
        self.channels.resize_with(channels, Vec::new);
        for channel in &mut self.channels {
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Grow every channel to hold at least `frames` samples. Never shrinks.
    pub fn reserve_frames(&mut self, frames: usize) {
        if frames > self.frames {
            let channels = self.channels.len();
            self.resize(channels, frames);
        }
    }

    pub fn channel_slices(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Raw pointer to the first sample of `channel`, for handing to the module.
    pub(crate) fn channel_ptr(&mut self, channel: usize) -> *mut f32 {
        self.channels[channel].as_mut_ptr()
    }
}

impl Index<usize> for AudioBuffer {
    type Output = [f32];

    fn index(&self, index: usize) -> &Self::Output {
        self.channels[index].as_slice()
    }
}

impl IndexMut<usize> for AudioBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.channels[index].as_mut_slice()
    }
}
