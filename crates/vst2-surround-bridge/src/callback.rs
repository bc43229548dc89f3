//! Host-side responder for callbacks issued by the module.
//!
//! The module calls back synchronously from inside a dispatcher call, so the
//! responder runs re-entrantly on the thread that issued the outer call. Each
//! loaded instance owns a [`CallbackContext`] whose address is parked in the
//! instance's host-reserved field; the trampoline routes through it instead of
//! consulting process-wide state.

use std::cell::Cell;
use std::ffi::{c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vst2_sys::*;

use crate::speaker::{write_c_string, SpeakerLayout};

/// Protocol version reported to modules (2.4 semantics).
pub const HOST_VERSION: isize = 2400;

/// Capabilities answered with "yes". Everything else is "no".
pub const HOST_CAPABILITIES: &[&str] = &[
    "sendVstEvents",
    "sendVstMidiEvent",
    "receiveVstEvents",
    "receiveVstMidiEvent",
    "reportConnectionChanges",
    "acceptIOChanges",
    "sizeWindow",
    "sendVstSpeakerArrangement",
    "receiveVstSpeakerProperties",
    "supplyIdle",
];

/// Vendor/product identity the bridge presents to the module. Some modules
/// change behavior depending on the host they believe they are running in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostIdentity {
    pub vendor: String,
    pub product: String,
    pub vendor_version: i32,
}

impl Default for HostIdentity {
    fn default() -> Self {
        Self {
            vendor: "PreSonus".to_owned(),
            product: "Studio One".to_owned(),
            vendor_version: 6500,
        }
    }
}

/// A decoded host callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRequest<'a> {
    Version,
    Automate,
    CurrentId,
    Idle,
    GetTime,
    IoChanged,
    InputArrangement,
    OutputArrangement,
    CanDo(&'a str),
    VendorString,
    ProductString,
    VendorVersion,
    ProcessLevel,
    AutomationState,
    Language,
    Unknown(i32),
}

impl<'a> HostRequest<'a> {
    /// Decode a raw callback.
    ///
    /// # Safety
    /// For `audioMasterCanDo`, `ptr` must be null or point to a NUL
    /// terminated string that outlives `'a`.
    #[allow(non_upper_case_globals)]
    pub unsafe fn decode(opcode: i32, ptr: *mut c_void) -> Self {
        match opcode {
            audioMasterVersion => HostRequest::Version,
            audioMasterAutomate => HostRequest::Automate,
            audioMasterCurrentId => HostRequest::CurrentId,
            audioMasterIdle => HostRequest::Idle,
            audioMasterGetTime => HostRequest::GetTime,
            audioMasterIOChanged => HostRequest::IoChanged,
            audioMasterGetInputSpeakerArrangement => HostRequest::InputArrangement,
            audioMasterGetOutputSpeakerArrangement => HostRequest::OutputArrangement,
            audioMasterCanDo => {
                if ptr.is_null() {
                    HostRequest::CanDo("")
                } else {
                    let feature = CStr::from_ptr(ptr as *const _);
                    HostRequest::CanDo(feature.to_str().unwrap_or(""))
                }
            }
            audioMasterGetVendorString => HostRequest::VendorString,
            audioMasterGetProductString => HostRequest::ProductString,
            audioMasterGetVendorVersion => HostRequest::VendorVersion,
            audioMasterGetCurrentProcessLevel => HostRequest::ProcessLevel,
            audioMasterGetAutomationState => HostRequest::AutomationState,
            audioMasterGetLanguage => HostRequest::Language,
            other => HostRequest::Unknown(other),
        }
    }
}

/// What the responder wants written back to the module.
#[derive(Clone, Copy)]
pub enum HostReply<'a> {
    Value(isize),
    /// Copied into the module's out-parameter, then answered with 1.
    Arrangement(VstSpeakerArrangement),
    /// Copied into the module's out-parameter (bounded), then answered with 1.
    Text { text: &'a str, capacity: usize },
}

impl HostReply<'_> {
    pub fn value(&self) -> isize {
        match self {
            HostReply::Value(value) => *value,
            HostReply::Arrangement(_) | HostReply::Text { .. } => 1,
        }
    }
}

/// Responder injected into each loaded instance.
///
/// Implementations must not mutate shared state: they run re-entrantly from
/// inside whatever dispatcher call the bridge is currently making.
pub trait HostResponder: Send + Sync {
    fn can_do(&self, feature: &str) -> bool;
    fn identity(&self) -> &HostIdentity;
    fn input_arrangement(&self) -> VstSpeakerArrangement;
    fn output_arrangement(&self) -> VstSpeakerArrangement;

    fn version(&self) -> isize {
        HOST_VERSION
    }

    fn respond(&self, request: &HostRequest<'_>) -> HostReply<'_> {
        match *request {
            HostRequest::Version => HostReply::Value(self.version()),
            HostRequest::IoChanged => HostReply::Value(1),
            HostRequest::InputArrangement => HostReply::Arrangement(self.input_arrangement()),
            HostRequest::OutputArrangement => HostReply::Arrangement(self.output_arrangement()),
            HostRequest::CanDo(feature) => HostReply::Value(self.can_do(feature) as isize),
            HostRequest::VendorString => HostReply::Text {
                text: &self.identity().vendor,
                capacity: kVstMaxVendorStrLen,
            },
            HostRequest::ProductString => HostReply::Text {
                text: &self.identity().product,
                capacity: kVstMaxProductStrLen,
            },
            HostRequest::VendorVersion => {
                HostReply::Value(self.identity().vendor_version as isize)
            }
            HostRequest::Automate
            | HostRequest::CurrentId
            | HostRequest::Idle
            | HostRequest::GetTime
            | HostRequest::ProcessLevel
            | HostRequest::AutomationState
            | HostRequest::Language
            | HostRequest::Unknown(_) => HostReply::Value(0),
        }
    }
}

/// Default responder: serves the canonical layout on both sides.
#[derive(Debug, Clone, Default)]
pub struct BridgeResponder {
    layout: SpeakerLayout,
    identity: HostIdentity,
}

impl BridgeResponder {
    pub fn new(layout: SpeakerLayout, identity: HostIdentity) -> Self {
        Self { layout, identity }
    }
}

impl HostResponder for BridgeResponder {
    fn can_do(&self, feature: &str) -> bool {
        HOST_CAPABILITIES.contains(&feature)
    }

    fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    fn input_arrangement(&self) -> VstSpeakerArrangement {
        self.layout.to_arrangement()
    }

    fn output_arrangement(&self) -> VstSpeakerArrangement {
        self.layout.to_arrangement()
    }
}

/// Answers callbacks that arrive with no instance context attached.
static FALLBACK_RESPONDER: Lazy<BridgeResponder> = Lazy::new(BridgeResponder::default);

thread_local! {
    static PENDING_CONTEXT: Cell<*const CallbackContext> = const { Cell::new(ptr::null()) };
}

/// Per-instance callback context. Boxed so its address stays stable while
/// the module holds on to it.
pub struct CallbackContext {
    responder: Arc<dyn HostResponder>,
}

impl CallbackContext {
    pub fn new(responder: Arc<dyn HostResponder>) -> Box<Self> {
        Box::new(Self { responder })
    }

    pub fn responder(&self) -> &dyn HostResponder {
        self.responder.as_ref()
    }

    /// Route callbacks made on this thread to `self` until the guard drops.
    /// Used while the entry point runs, before an instance pointer exists.
    pub(crate) fn enter_pending(&self) -> PendingGuard {
        let previous = PENDING_CONTEXT.with(|cell| cell.replace(self as *const _));
        PendingGuard { previous }
    }

    /// Park this context in the instance's host-reserved field.
    ///
    /// # Safety
    /// `effect` must be a live instance and `self` must outlive every
    /// callback the instance can make.
    pub(crate) unsafe fn attach(&self, effect: *mut AEffect) {
        (*effect).resvd1 = self as *const CallbackContext as isize;
    }
}

pub(crate) struct PendingGuard {
    previous: *const CallbackContext,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        PENDING_CONTEXT.with(|cell| cell.set(self.previous));
    }
}

unsafe fn resolve_context<'a>(effect: *mut AEffect) -> Option<&'a CallbackContext> {
    if !effect.is_null() && (*effect).resvd1 != 0 {
        return Some(&*((*effect).resvd1 as *const CallbackContext));
    }
    let pending = PENDING_CONTEXT.with(Cell::get);
    pending.as_ref()
}

unsafe fn write_reply(reply: HostReply<'_>, ptr: *mut c_void) -> isize {
    if !ptr.is_null() {
        match reply {
            HostReply::Arrangement(arrangement) => {
                ptr::write(ptr as *mut VstSpeakerArrangement, arrangement);
            }
            HostReply::Text { text, capacity } => {
                let buffer = std::slice::from_raw_parts_mut(ptr as *mut std::ffi::c_char, capacity);
                write_c_string(buffer, text);
            }
            HostReply::Value(_) => {}
        }
    }
    reply.value()
}

/// Callback handed to the module's entry point.
///
/// # Safety
/// Called by the module with the arguments of `audioMasterCallback`.
pub unsafe extern "C" fn host_callback(
    effect: *mut AEffect,
    opcode: i32,
    _index: i32,
    _value: isize,
    ptr: *mut c_void,
    _opt: f32,
) -> isize {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let request = HostRequest::decode(opcode, ptr);
        let reply = match resolve_context(effect) {
            Some(context) => context.responder().respond(&request),
            None => FALLBACK_RESPONDER.respond(&request),
        };
        write_reply(reply, ptr)
    }));
    outcome.unwrap_or_else(|_| {
        warn!(opcode, "host callback responder faulted");
        0
    })
}
