use std::array;

use crate::audio_buffer::AudioBuffer;
use crate::speaker::INTERNAL_CHANNELS;

/// Raw channel pointers handed to `processReplacing`.
pub type ChannelPointers = [*mut f32; INTERNAL_CHANNELS];

/// Copies audio between the host's channel layout and the module's fixed
/// six-channel layout.
///
/// Host channels past the sixth are never read into the module and never
/// written back; missing host channels are fed to the module as silence.
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    input: AudioBuffer,
    output: AudioBuffer,
}

impl ChannelRouter {
    pub fn new(frames: usize) -> Self {
        Self {
            input: AudioBuffer::new(INTERNAL_CHANNELS, frames),
            output: AudioBuffer::new(INTERNAL_CHANNELS, frames),
        }
    }

    /// Frames the internal buffers can hold without growing.
    pub fn capacity(&self) -> usize {
        self.input.frames()
    }

    pub fn ensure_capacity(&mut self, frames: usize) {
        self.input.reserve_frames(frames);
        self.output.reserve_frames(frames);
    }

    pub fn input(&self) -> &AudioBuffer {
        &self.input
    }

    pub fn output(&self) -> &AudioBuffer {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AudioBuffer {
        &mut self.output
    }

    /// Copy the host block into the module's input channels.
    pub fn route_in(&mut self, host: &AudioBuffer) {
        let frames = host.frames();
        self.ensure_capacity(frames);
        let shared = host.channels().min(INTERNAL_CHANNELS);
        for channel in 0..INTERNAL_CHANNELS {
            let internal = &mut self.input[channel][..frames];
            if channel < shared {
                internal.copy_from_slice(&host[channel][..frames]);
            } else {
                internal.fill(0.0);
            }
        }
        for channel in 0..INTERNAL_CHANNELS {
            self.output[channel][..frames].fill(0.0);
        }
    }

    /// Copy the module's output channels back into the host block.
    pub fn route_out(&self, host: &mut AudioBuffer) {
        let frames = host.frames().min(self.capacity());
        let shared = host.channels().min(INTERNAL_CHANNELS);
        for channel in 0..shared {
            host[channel][..frames].copy_from_slice(&self.output[channel][..frames]);
        }
    }

    /// Input and output channel pointers, valid until the router is next
    /// resized.
    pub fn channel_pointers(&mut self) -> (ChannelPointers, ChannelPointers) {
        let inputs = array::from_fn(|channel| self.input.channel_ptr(channel));
        let outputs = array::from_fn(|channel| self.output.channel_ptr(channel));
        (inputs, outputs)
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new(0)
    }
}
