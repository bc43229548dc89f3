//! In-process bridge that re-hosts a legacy VST 2.4 module behind a fixed
//! 5.1 channel layout.
//!
//! The bridge loads the module binary, answers its host callbacks through a
//! per-instance [`CallbackContext`], forces a six-channel arrangement on it,
//! routes the outer host's buffers in and out of that layout and persists the
//! module's full state as a chunk plus a parameter vector.

mod audio_buffer;
mod bridge;
mod callback;
mod config;
mod context;
mod dispatch;
mod editor;
mod error;
mod instance;
mod loader;
mod router;
mod speaker;
mod state;

pub use audio_buffer::AudioBuffer;
pub use bridge::{SharedBridge, SurroundBridge};
pub use callback::{
    host_callback, BridgeResponder, CallbackContext, HostIdentity, HostReply, HostRequest,
    HostResponder, HOST_CAPABILITIES, HOST_VERSION,
};
pub use config::{BridgeBuilder, BridgeOptions};
pub use context::HostContext;
pub use dispatch::{Dispatcher, DEFAULT_EDITOR_SIZE, TEXT_BUFFER_LEN};
pub use editor::{EditorBridge, EditorHandle, NativeSurface};
pub use error::{LifecycleFault, LoadError, RestoreError, StateError};
pub use instance::{Negotiation, PluginInstance};
pub use loader::{DynamicLibrary, DynamicLibraryOpener, ModuleBinary, ModuleLoader, ModuleOpener};
pub use router::{ChannelPointers, ChannelRouter};
pub use speaker::{SpeakerDescriptor, SpeakerLayout, INTERNAL_CHANNELS};
pub use state::{
    BridgeState, ParameterBlock, RestoreReport, RestoreStep, StateCodec, STATE_VERSION,
};

/// Re-export the raw bindings for users that need to drop down to the ABI.
pub use vst2_sys as ffi;
