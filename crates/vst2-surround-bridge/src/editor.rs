use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, warn};

use crate::dispatch::DEFAULT_EDITOR_SIZE;
use crate::instance::PluginInstance;

/// Native parent surface the module's editor attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSurface(*mut c_void);

// The pointer is an opaque window id; the bridge never dereferences it.
unsafe impl Send for NativeSurface {}

impl NativeSurface {
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        (!ptr.is_null()).then_some(Self(ptr))
    }

    /// Extract the handle a legacy module expects as its parent: the `HWND`
    /// on Windows, the X11 window id on Linux and the `NSView` on macOS.
    pub fn from_window_handle(handle: RawWindowHandle) -> Option<Self> {
        match handle {
            RawWindowHandle::Win32(handle) => Self::from_ptr(handle.hwnd.get() as *mut c_void),
            RawWindowHandle::Xlib(handle) => Self::from_ptr(handle.window as usize as *mut c_void),
            RawWindowHandle::Xcb(handle) => {
                Self::from_ptr(handle.window.get() as usize as *mut c_void)
            }
            RawWindowHandle::AppKit(handle) => Self::from_ptr(handle.ns_view.as_ptr()),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

/// An open editor: the surface it was opened on and its reported size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorHandle {
    pub surface: NativeSurface,
    pub size: [u32; 2],
}

/// Tracks the single editor a loaded instance may have open.
#[derive(Debug, Default)]
pub struct EditorBridge {
    handle: Option<EditorHandle>,
}

impl EditorBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<EditorHandle> {
        self.handle
    }

    /// Open the editor on `surface`. Returns the existing handle untouched if
    /// an editor is already open.
    pub fn open(
        &mut self,
        instance: &PluginInstance,
        surface: NativeSurface,
    ) -> Option<EditorHandle> {
        if !instance.has_editor() || !instance.is_editable() {
            return None;
        }
        if let Some(handle) = self.handle {
            return Some(handle);
        }

        match instance.dispatcher().edit_open(surface.as_ptr()) {
            Ok(true) => {
                let (width, height) = self.size(instance);
                let handle = EditorHandle {
                    surface,
                    size: [width, height],
                };
                debug!(width, height, "module editor opened");
                self.handle = Some(handle);
                Some(handle)
            }
            Ok(false) => {
                debug!("module declined to open its editor");
                None
            }
            Err(fault) => {
                warn!(%fault, "module editor failed to open");
                None
            }
        }
    }

    /// Close the editor if one is open. A fault during close is logged and
    /// the handle is cleared regardless.
    pub fn close(&mut self, instance: &PluginInstance) {
        if self.handle.take().is_none() {
            return;
        }
        match instance.dispatcher().edit_close() {
            Ok(()) => debug!("module editor closed"),
            Err(fault) => warn!(%fault, "module editor faulted while closing"),
        }
    }

    pub fn size(&self, instance: &PluginInstance) -> (u32, u32) {
        instance
            .dispatcher()
            .edit_rect()
            .unwrap_or(DEFAULT_EDITOR_SIZE)
    }
}
