use std::ffi::CStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};
use vst2_sys::{VstPluginMain, ENTRY_SYMBOL, LEGACY_ENTRY_SYMBOL};

use crate::callback::{host_callback, CallbackContext, HostResponder};
use crate::dispatch::guarded;
use crate::editor::EditorBridge;
use crate::error::LoadError;
use crate::instance::PluginInstance;
use crate::speaker::SpeakerLayout;

/// Capability probes issued after negotiation. The answers are informational.
const ARRANGEMENT_PROBES: [&CStr; 2] = [
    c"sendVstSpeakerArrangement",
    c"receiveVstSpeakerProperties",
];

/// An opened module binary. Dropping it frees the OS handle.
pub trait ModuleBinary: Send {
    fn path(&self) -> &Path;

    /// Resolve an exported entry point. `symbol` is NUL terminated.
    fn entry_point(&self, symbol: &[u8]) -> Option<VstPluginMain>;
}

/// Opens module binaries. The production implementation is
/// [`DynamicLibraryOpener`]; tests substitute in-process modules.
pub trait ModuleOpener: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleBinary>, LoadError>;
}

/// A module loaded through the platform's dynamic loader.
pub struct DynamicLibrary {
    library_path: PathBuf,
    library: Library,
}

impl DynamicLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::open_failed(path, "file does not exist"));
        }
        let library =
            unsafe { Library::new(path) }.map_err(|err| LoadError::open_failed(path, err))?;
        Ok(Self {
            library_path: path.to_path_buf(),
            library,
        })
    }
}

impl ModuleBinary for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.library_path
    }

    fn entry_point(&self, symbol: &[u8]) -> Option<VstPluginMain> {
        unsafe { self.library.get::<VstPluginMain>(symbol) }
            .ok()
            .map(|entry| *entry)
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("library_path", &self.library_path)
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryOpener;

impl ModuleOpener for DynamicLibraryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleBinary>, LoadError> {
        Ok(Box::new(DynamicLibrary::open(path)?))
    }
}

struct LoadedModule {
    instance: PluginInstance,
    editor: EditorBridge,
    binary: Box<dyn ModuleBinary>,
}

/// Owns at most one loaded module together with its instance and editor.
pub struct ModuleLoader {
    opener: Box<dyn ModuleOpener>,
    responder: Arc<dyn HostResponder>,
    layout: SpeakerLayout,
    loaded: Option<LoadedModule>,
}

impl ModuleLoader {
    pub fn new(
        opener: Box<dyn ModuleOpener>,
        responder: Arc<dyn HostResponder>,
        layout: SpeakerLayout,
    ) -> Self {
        Self {
            opener,
            responder,
            layout,
            loaded: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|loaded| loaded.binary.path())
    }

    pub fn instance(&self) -> Option<&PluginInstance> {
        self.loaded.as_ref().map(|loaded| &loaded.instance)
    }

    pub fn instance_mut(&mut self) -> Option<&mut PluginInstance> {
        self.loaded.as_mut().map(|loaded| &mut loaded.instance)
    }

    /// The instance together with its editor slot.
    pub fn editor_parts(&mut self) -> Option<(&PluginInstance, &mut EditorBridge)> {
        self.loaded
            .as_mut()
            .map(|loaded| (&loaded.instance, &mut loaded.editor))
    }

    pub fn editor(&self) -> Option<&EditorBridge> {
        self.loaded.as_ref().map(|loaded| &loaded.editor)
    }

    /// Load the module at `path`, replacing whatever was loaded before.
    ///
    /// A faulting open call and a rejected arrangement are tolerated; only a
    /// missing binary, a missing entry point or a null instance fail the load.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&mut PluginInstance, LoadError> {
        let path = path.as_ref();
        self.unload();

        let binary = self.opener.open(path)?;
        let entry = binary
            .entry_point(ENTRY_SYMBOL)
            .or_else(|| binary.entry_point(LEGACY_ENTRY_SYMBOL))
            .ok_or_else(|| LoadError::EntryMissing(path.to_path_buf()))?;

        let context = CallbackContext::new(Arc::clone(&self.responder));
        let effect = {
            let _pending = context.enter_pending();
            guarded(|| unsafe { entry(host_callback) }).unwrap_or_else(|_| {
                warn!(path = %path.display(), "module entry point faulted");
                std::ptr::null_mut()
            })
        };
        let effect =
            NonNull::new(effect).ok_or_else(|| LoadError::InstanceNull(path.to_path_buf()))?;
        let mut instance = unsafe { PluginInstance::from_raw(effect, context) };

        if !instance.has_valid_magic() {
            warn!(magic = instance.magic(), "module reports an unexpected magic number");
        }
        if let Err(fault) = instance.open() {
            warn!(%fault, "module faulted while opening; editor disabled");
        }

        let negotiation = instance.negotiate(&self.layout);
        if !negotiation.first_accepted {
            warn!(
                retry_accepted = ?negotiation.retry_accepted,
                "module rejected the 5.1 arrangement; forcing six channels"
            );
        }
        for probe in ARRANGEMENT_PROBES {
            let answer = instance.dispatcher().can_do(probe);
            debug!(feature = ?probe, ?answer, "module capability probe");
        }

        info!(
            path = %path.display(),
            unique_id = instance.unique_id(),
            params = instance.num_params(),
            programs = instance.num_programs(),
            "module loaded"
        );
        let loaded = self.loaded.insert(LoadedModule {
            instance,
            editor: EditorBridge::new(),
            binary,
        });
        Ok(&mut loaded.instance)
    }

    /// Tear down the loaded module: close the editor, suspend, close the
    /// instance, then free the binary. Faults along the way are logged and
    /// the sequence continues. Does nothing when nothing is loaded.
    pub fn unload(&mut self) {
        let Some(LoadedModule {
            instance,
            mut editor,
            binary,
        }) = self.loaded.take()
        else {
            return;
        };

        editor.close(&instance);
        if let Err(fault) = instance.suspend() {
            warn!(%fault, "module faulted while suspending for unload");
        }
        if let Err(fault) = instance.dispatcher().close() {
            warn!(%fault, "module faulted while closing");
        }
        drop(instance);

        let path = binary.path().to_path_buf();
        drop(binary);
        info!(path = %path.display(), "module unloaded");
    }
}

impl Drop for ModuleLoader {
    fn drop(&mut self) {
        self.unload();
    }
}
