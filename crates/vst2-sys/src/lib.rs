#![no_std]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]

//! Raw bindings for the legacy VST 2.4 plug-in ABI.
//!
//! Only the subset exercised by the surround bridge is declared here. The
//! layouts must match the SDK bit-for-bit; there is no bindgen step because the
//! SDK headers are not redistributable.
//!
//! Function pointers implemented by the plug-in use the `"C-unwind"` ABI so a
//! fault raised inside the plug-in can be caught by the host at the call site.
//! The host callback is plain `"C"` and must never unwind.

use core::ffi::{c_char, c_void};

pub type VstInt16 = i16;
pub type VstInt32 = i32;
pub type VstIntPtr = isize;

/// `'VstP'`, stored in [`AEffect::magic`].
pub const kEffectMagic: VstInt32 = 0x5673_7450;

/// Host callback handed to the entry point (`audioMasterCallback`).
pub type audioMasterCallback = unsafe extern "C" fn(
    effect: *mut AEffect,
    opcode: VstInt32,
    index: VstInt32,
    value: VstIntPtr,
    ptr: *mut c_void,
    opt: f32,
) -> VstIntPtr;

pub type AEffectDispatcherProc = unsafe extern "C-unwind" fn(
    effect: *mut AEffect,
    opcode: VstInt32,
    index: VstInt32,
    value: VstIntPtr,
    ptr: *mut c_void,
    opt: f32,
) -> VstIntPtr;

pub type AEffectProcessProc = unsafe extern "C-unwind" fn(
    effect: *mut AEffect,
    inputs: *mut *mut f32,
    outputs: *mut *mut f32,
    sample_frames: VstInt32,
);

pub type AEffectProcessDoubleProc = unsafe extern "C-unwind" fn(
    effect: *mut AEffect,
    inputs: *mut *mut f64,
    outputs: *mut *mut f64,
    sample_frames: VstInt32,
);

pub type AEffectSetParameterProc =
    unsafe extern "C-unwind" fn(effect: *mut AEffect, index: VstInt32, parameter: f32);

pub type AEffectGetParameterProc =
    unsafe extern "C-unwind" fn(effect: *mut AEffect, index: VstInt32) -> f32;

/// Exported entry point (`VSTPluginMain`, legacy `main`).
pub type VstPluginMain = unsafe extern "C-unwind" fn(host: audioMasterCallback) -> *mut AEffect;

/// Primary entry symbol, NUL terminated for symbol lookup.
pub const ENTRY_SYMBOL: &[u8] = b"VSTPluginMain\0";
/// Entry symbol exported by plug-ins built against pre-2.4 SDKs.
pub const LEGACY_ENTRY_SYMBOL: &[u8] = b"main\0";

/// The plug-in instance returned by the entry point.
#[repr(C)]
pub struct AEffect {
    pub magic: VstInt32,
    pub dispatcher: Option<AEffectDispatcherProc>,
    /// Accumulating process call, deprecated since 2.4.
    pub process: Option<AEffectProcessProc>,
    pub setParameter: Option<AEffectSetParameterProc>,
    pub getParameter: Option<AEffectGetParameterProc>,
    pub numPrograms: VstInt32,
    pub numParams: VstInt32,
    pub numInputs: VstInt32,
    pub numOutputs: VstInt32,
    pub flags: VstInt32,
    /// Reserved for the host.
    pub resvd1: VstIntPtr,
    /// Reserved for the host.
    pub resvd2: VstIntPtr,
    pub initialDelay: VstInt32,
    pub realQualities: VstInt32,
    pub offQualities: VstInt32,
    pub ioRatio: f32,
    pub object: *mut c_void,
    pub user: *mut c_void,
    pub uniqueID: VstInt32,
    pub version: VstInt32,
    pub processReplacing: Option<AEffectProcessProc>,
    pub processDoubleReplacing: Option<AEffectProcessDoubleProc>,
    pub future: [c_char; 56],
}

// Capability flags reported in `AEffect::flags`.
pub const effFlagsHasEditor: VstInt32 = 1 << 0;
pub const effFlagsCanReplacing: VstInt32 = 1 << 4;
pub const effFlagsProgramChunks: VstInt32 = 1 << 5;
pub const effFlagsIsSynth: VstInt32 = 1 << 8;
pub const effFlagsNoSoundInStop: VstInt32 = 1 << 9;
pub const effFlagsCanDoubleReplacing: VstInt32 = 1 << 12;

// Dispatcher opcodes issued by the host.
pub const effOpen: VstInt32 = 0;
pub const effClose: VstInt32 = 1;
pub const effSetProgram: VstInt32 = 2;
pub const effGetProgram: VstInt32 = 3;
pub const effSetProgramName: VstInt32 = 4;
pub const effGetProgramName: VstInt32 = 5;
pub const effGetParamLabel: VstInt32 = 6;
pub const effGetParamDisplay: VstInt32 = 7;
pub const effGetParamName: VstInt32 = 8;
pub const effSetSampleRate: VstInt32 = 10;
pub const effSetBlockSize: VstInt32 = 11;
pub const effMainsChanged: VstInt32 = 12;
pub const effEditGetRect: VstInt32 = 13;
pub const effEditOpen: VstInt32 = 14;
pub const effEditClose: VstInt32 = 15;
pub const effEditIdle: VstInt32 = 19;
pub const effGetChunk: VstInt32 = 23;
pub const effSetChunk: VstInt32 = 24;
pub const effSetSpeakerArrangement: VstInt32 = 42;
pub const effCanDo: VstInt32 = 51;
pub const effGetVstVersion: VstInt32 = 58;
pub const effGetSpeakerArrangement: VstInt32 = 69;

// Callback opcodes issued by the plug-in.
pub const audioMasterAutomate: VstInt32 = 0;
pub const audioMasterVersion: VstInt32 = 1;
pub const audioMasterCurrentId: VstInt32 = 2;
pub const audioMasterIdle: VstInt32 = 3;
pub const audioMasterGetTime: VstInt32 = 7;
pub const audioMasterProcessEvents: VstInt32 = 8;
pub const audioMasterIOChanged: VstInt32 = 13;
pub const audioMasterSizeWindow: VstInt32 = 15;
pub const audioMasterGetSampleRate: VstInt32 = 16;
pub const audioMasterGetBlockSize: VstInt32 = 17;
pub const audioMasterGetCurrentProcessLevel: VstInt32 = 23;
pub const audioMasterGetAutomationState: VstInt32 = 24;
pub const audioMasterGetOutputSpeakerArrangement: VstInt32 = 31;
pub const audioMasterGetVendorString: VstInt32 = 32;
pub const audioMasterGetProductString: VstInt32 = 33;
pub const audioMasterGetVendorVersion: VstInt32 = 34;
pub const audioMasterCanDo: VstInt32 = 37;
pub const audioMasterGetLanguage: VstInt32 = 38;
pub const audioMasterGetInputSpeakerArrangement: VstInt32 = 49;

pub const kVstMaxVendorStrLen: usize = 64;
pub const kVstMaxProductStrLen: usize = 64;

/// Editor rectangle returned through `effEditGetRect`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ERect {
    pub top: VstInt16,
    pub left: VstInt16,
    pub bottom: VstInt16,
    pub right: VstInt16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VstSpeakerProperties {
    pub azimuth: f32,
    pub elevation: f32,
    pub radius: f32,
    pub reserved: f32,
    pub name: [c_char; 64],
    pub type_: VstInt32,
    pub future: [c_char; 28],
}

impl VstSpeakerProperties {
    pub const fn zeroed() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            radius: 0.0,
            reserved: 0.0,
            name: [0; 64],
            type_: 0,
            future: [0; 28],
        }
    }
}

/// Speaker arrangement with room for eight speakers, as declared by the SDK.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VstSpeakerArrangement {
    pub type_: VstInt32,
    pub numChannels: VstInt32,
    pub speakers: [VstSpeakerProperties; 8],
}

impl VstSpeakerArrangement {
    pub const fn zeroed() -> Self {
        Self {
            type_: 0,
            numChannels: 0,
            speakers: [VstSpeakerProperties::zeroed(); 8],
        }
    }
}

// `VstSpeakerArrangementType`.
pub const kSpeakerArrEmpty: VstInt32 = -1;
pub const kSpeakerArrMono: VstInt32 = 0;
pub const kSpeakerArrStereo: VstInt32 = 1;
pub const kSpeakerArr51: VstInt32 = 15;

// `VstSpeakerType`.
pub const kSpeakerM: VstInt32 = 0;
pub const kSpeakerL: VstInt32 = 1;
pub const kSpeakerR: VstInt32 = 2;
pub const kSpeakerC: VstInt32 = 3;
pub const kSpeakerLfe: VstInt32 = 4;
pub const kSpeakerLs: VstInt32 = 5;
pub const kSpeakerRs: VstInt32 = 6;
