use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::audio_buffer::AudioBuffer;
use crate::callback::HostResponder;
use crate::config::{BridgeBuilder, BridgeOptions};
use crate::context::HostContext;
use crate::editor::{EditorHandle, NativeSurface};
use crate::error::{LoadError, RestoreError, StateError};
use crate::instance::PluginInstance;
use crate::loader::{ModuleLoader, ModuleOpener};
use crate::router::ChannelRouter;
use crate::speaker::{SpeakerLayout, INTERNAL_CHANNELS};
use crate::state::{BridgeState, RestoreReport, RestoreStep, StateCodec};

/// The bridge as seen by the outer host: lifecycle, audio, state, programs,
/// parameters and the editor of a single re-hosted module.
///
/// Every entry point degrades to a neutral answer while nothing is loaded.
pub struct SurroundBridge {
    loader: ModuleLoader,
    router: ChannelRouter,
    host: HostContext,
    codec: StateCodec,
    layout: SpeakerLayout,
    options: BridgeOptions,
}

impl SurroundBridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub fn with_opener(
        opener: Box<dyn ModuleOpener>,
        responder: Arc<dyn HostResponder>,
        layout: SpeakerLayout,
        options: BridgeOptions,
    ) -> Self {
        Self {
            loader: ModuleLoader::new(opener, responder, layout.clone()),
            router: ChannelRouter::new(options.block_size),
            host: HostContext::new(options.sample_rate, options.block_size),
            codec: StateCodec::new(options.chunk_settle, options.program_settle),
            layout,
            options,
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn host_context(&self) -> &HostContext {
        &self.host
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    pub fn module_path(&self) -> Option<&Path> {
        self.loader
            .path()
            .or(self.options.module_path.as_deref())
    }

    pub fn instance(&self) -> Option<&PluginInstance> {
        self.loader.instance()
    }

    /// Load `path`, replacing any loaded module. When the host has already
    /// prepared the bridge the new instance is activated straight away.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        self.host.mark_unloaded();
        let instance = self.loader.load(path)?;
        if self.host.is_prepared() {
            if let Err(fault) = self.host.activate(instance) {
                warn!(%fault, "module faulted while activating after load");
            }
        }
        self.options.module_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn unload(&mut self) {
        self.loader.unload();
        self.host.mark_unloaded();
    }

    /// Called by the outer host before playback starts.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        self.host.set_format(sample_rate, block_size);
        self.router.ensure_capacity(block_size);

        if !self.loader.is_loaded() {
            if let Some(path) = self.options.module_path.clone() {
                if let Err(err) = self.loader.load(&path) {
                    warn!(%err, "module unavailable; passing audio through");
                }
            }
        }

        let Some(instance) = self.loader.instance_mut() else {
            return;
        };
        if let Err(fault) = self.host.activate(instance) {
            warn!(%fault, "module faulted while activating");
        }
        // Some modules reset their bus layout on resume.
        instance.force_channel_counts(INTERNAL_CHANNELS);
        let accepted = instance.offer_arrangement(&self.layout);
        debug!(accepted, sample_rate, block_size, "bridge prepared");
    }

    /// Called by the outer host when playback stops.
    pub fn release(&mut self) {
        if let Some(instance) = self.loader.instance() {
            if let Err(fault) = self.host.suspend(instance) {
                warn!(%fault, "module faulted while suspending");
            }
        }
        self.host.mark_released();
    }

    /// Run one block through the module. Leaves `buffer` untouched when
    /// nothing is loaded, the module is suspended or the module faults.
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        let Some(instance) = self.loader.instance() else {
            return;
        };
        let frames = buffer.frames();
        if frames == 0 || self.host.is_suspended() {
            return;
        }

        self.router.route_in(buffer);
        let (mut inputs, mut outputs) = self.router.channel_pointers();
        match instance
            .dispatcher()
            .process_replacing(inputs.as_mut_ptr(), outputs.as_mut_ptr(), frames)
        {
            Ok(()) => self.router.route_out(buffer),
            Err(fault) => warn!(%fault, "module faulted while processing"),
        }
    }

    pub fn capture_state(&self) -> BridgeState {
        self.codec
            .save(&self.loader, self.options.module_path.as_deref())
    }

    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        self.capture_state().to_bytes()
    }

    pub fn restore_state(&mut self, bytes: &[u8]) -> RestoreReport {
        match BridgeState::from_bytes(bytes) {
            Ok(state) => self.apply_state(&state),
            Err(err) => RestoreError::from(err).into(),
        }
    }

    pub fn apply_state(&mut self, state: &BridgeState) -> RestoreReport {
        let report = self.codec.restore(&mut self.loader, &mut self.host, state);
        if report.contains(RestoreStep::Loaded) {
            self.options.module_path = self.loader.path().map(Path::to_path_buf);
        }
        info!(clean = report.is_clean(), "bridge state restored");
        report
    }

    pub fn num_programs(&self) -> i32 {
        self.loader.instance().map_or(1, PluginInstance::num_programs)
    }

    pub fn current_program(&self) -> i32 {
        self.loader
            .instance()
            .and_then(|instance| instance.dispatcher().get_program().ok())
            .unwrap_or(0)
    }

    pub fn set_current_program(&mut self, program: i32) {
        if let Some(instance) = self.loader.instance() {
            if let Err(fault) = instance.dispatcher().set_program(program) {
                warn!(%fault, program, "module faulted while changing program");
            }
        }
    }

    pub fn program_name(&self, program: i32) -> String {
        self.text(|instance| instance.dispatcher().program_name(program))
    }

    pub fn num_parameters(&self) -> i32 {
        self.loader.instance().map_or(0, PluginInstance::num_params)
    }

    pub fn parameter(&self, index: i32) -> f32 {
        self.loader
            .instance()
            .and_then(|instance| instance.get_parameter(index).ok())
            .unwrap_or(0.0)
    }

    pub fn set_parameter(&mut self, index: i32, value: f32) {
        if let Some(instance) = self.loader.instance() {
            if let Err(fault) = instance.set_parameter(index, value) {
                warn!(%fault, index, "module faulted while setting a parameter");
            }
        }
    }

    pub fn parameter_name(&self, index: i32) -> String {
        self.text(|instance| instance.dispatcher().param_name(index))
    }

    pub fn parameter_text(&self, index: i32) -> String {
        self.text(|instance| instance.dispatcher().param_display(index))
    }

    pub fn parameter_label(&self, index: i32) -> String {
        self.text(|instance| instance.dispatcher().param_label(index))
    }

    pub fn open_editor(&mut self, surface: NativeSurface) -> Option<EditorHandle> {
        let (instance, editor) = self.loader.editor_parts()?;
        editor.open(instance, surface)
    }

    pub fn close_editor(&mut self) {
        if let Some((instance, editor)) = self.loader.editor_parts() {
            editor.close(instance);
        }
    }

    pub fn editor_handle(&self) -> Option<EditorHandle> {
        self.loader.editor().and_then(|editor| editor.handle())
    }

    pub fn editor_size(&self) -> Option<(u32, u32)> {
        let instance = self.loader.instance()?;
        let editor = self.loader.editor()?;
        instance.has_editor().then(|| editor.size(instance))
    }

    fn text<F, E>(&self, query: F) -> String
    where
        F: FnOnce(&PluginInstance) -> Result<String, E>,
    {
        self.loader
            .instance()
            .and_then(|instance| query(instance).ok())
            .unwrap_or_default()
    }
}

/// A bridge shared between the control thread and the audio thread.
///
/// The audio thread only ever `try_lock`s: while the control thread holds
/// the lock for a load, unload or restore, blocks pass through untouched.
#[derive(Clone)]
pub struct SharedBridge {
    inner: Arc<Mutex<SurroundBridge>>,
}

impl SharedBridge {
    pub fn new(bridge: SurroundBridge) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bridge)),
        }
    }

    /// Lock for control-thread work.
    pub fn lock(&self) -> MutexGuard<'_, SurroundBridge> {
        self.inner.lock()
    }

    /// Audio-thread entry point. Returns `false` when the block was passed
    /// through because the control thread held the bridge.
    pub fn process(&self, buffer: &mut AudioBuffer) -> bool {
        match self.inner.try_lock() {
            Some(mut bridge) => {
                bridge.process(buffer);
                true
            }
            None => false,
        }
    }

    pub fn restore_state(&self, bytes: &[u8]) -> RestoreReport {
        self.inner.lock().restore_state(bytes)
    }

    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        self.inner.lock().save_state()
    }
}

impl From<SurroundBridge> for SharedBridge {
    fn from(bridge: SurroundBridge) -> Self {
        Self::new(bridge)
    }
}
