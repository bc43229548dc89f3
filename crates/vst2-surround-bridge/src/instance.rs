use std::ptr::NonNull;

use vst2_sys::*;

use crate::callback::CallbackContext;
use crate::dispatch::Dispatcher;
use crate::error::LifecycleFault;
use crate::speaker::{SpeakerLayout, INTERNAL_CHANNELS};

/// Outcome of offering the canonical layout to the module at load time.
///
/// The module's answer is advisory; the bridge routes six channels either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Negotiation {
    pub first_accepted: bool,
    pub retried: bool,
    pub retry_accepted: Option<bool>,
    pub forced_channels: bool,
}

/// A live module instance and the context its callbacks are routed through.
///
/// Never outlives the module binary it came from: the loader owns both and
/// tears the instance down first.
pub struct PluginInstance {
    effect: NonNull<AEffect>,
    dispatcher: Dispatcher,
    // Referenced from the instance's host-reserved field.
    _context: Box<CallbackContext>,
    editable: bool,
    negotiation: Negotiation,
}

unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Take ownership of an instance returned by the entry point and attach
    /// its callback context.
    ///
    /// # Safety
    /// `effect` must point to a live instance returned by the module's entry
    /// point.
    pub(crate) unsafe fn from_raw(effect: NonNull<AEffect>, context: Box<CallbackContext>) -> Self {
        context.attach(effect.as_ptr());
        Self {
            effect,
            dispatcher: Dispatcher::new(effect.as_ptr()),
            _context: context,
            editable: true,
            negotiation: Negotiation::default(),
        }
    }

    fn raw(&self) -> &AEffect {
        unsafe { self.effect.as_ref() }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn magic(&self) -> i32 {
        self.raw().magic
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic() == kEffectMagic
    }

    pub fn unique_id(&self) -> i32 {
        self.raw().uniqueID
    }

    pub fn version(&self) -> i32 {
        self.raw().version
    }

    pub fn flags(&self) -> i32 {
        self.raw().flags
    }

    pub fn num_programs(&self) -> i32 {
        self.raw().numPrograms
    }

    pub fn num_params(&self) -> i32 {
        self.raw().numParams
    }

    pub fn num_inputs(&self) -> i32 {
        self.raw().numInputs
    }

    pub fn num_outputs(&self) -> i32 {
        self.raw().numOutputs
    }

    pub fn initial_delay(&self) -> i32 {
        self.raw().initialDelay
    }

    pub fn has_editor(&self) -> bool {
        self.flags() & effFlagsHasEditor != 0
    }

    pub fn supports_chunks(&self) -> bool {
        self.flags() & effFlagsProgramChunks != 0
    }

    pub fn can_replace(&self) -> bool {
        self.flags() & effFlagsCanReplacing != 0
    }

    /// `false` once the open lifecycle call faulted. Audio is still attempted,
    /// but the editor is never opened.
    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn negotiation(&self) -> Negotiation {
        self.negotiation
    }

    pub fn get_parameter(&self, index: i32) -> Result<f32, LifecycleFault> {
        self.dispatcher.get_parameter(index)
    }

    pub fn set_parameter(&self, index: i32, value: f32) -> Result<(), LifecycleFault> {
        self.dispatcher.set_parameter(index, value)
    }

    pub fn suspend(&self) -> Result<(), LifecycleFault> {
        self.dispatcher.mains_changed(false)
    }

    pub fn resume(&self) -> Result<(), LifecycleFault> {
        self.dispatcher.mains_changed(true)
    }

    pub(crate) fn open(&mut self) -> Result<(), LifecycleFault> {
        let result = self.dispatcher.open();
        if result.is_err() {
            self.editable = false;
        }
        result
    }

    /// Overwrite the channel counts the module reported.
    pub(crate) fn force_channel_counts(&mut self, channels: usize) {
        let channels = channels as i32;
        let effect = unsafe { self.effect.as_mut() };
        effect.numInputs = channels;
        effect.numOutputs = channels;
    }

    /// Offer `layout` on both input and output. A faulting call counts as a
    /// rejection.
    pub(crate) fn offer_arrangement(&self, layout: &SpeakerLayout) -> bool {
        let mut input = layout.to_arrangement();
        let mut output = layout.to_arrangement();
        self.dispatcher
            .set_speaker_arrangement(&mut input, &mut output)
            .unwrap_or(false)
    }

    /// Offer the layout; on rejection force the channel counts and offer it
    /// once more. The second answer is recorded but not acted on.
    pub(crate) fn negotiate(&mut self, layout: &SpeakerLayout) -> Negotiation {
        let mut negotiation = Negotiation {
            first_accepted: self.offer_arrangement(layout),
            ..Negotiation::default()
        };
        self.force_channel_counts(INTERNAL_CHANNELS);
        negotiation.forced_channels = true;
        if !negotiation.first_accepted {
            negotiation.retried = true;
            negotiation.retry_accepted = Some(self.offer_arrangement(layout));
        }
        self.negotiation = negotiation;
        negotiation
    }
}
