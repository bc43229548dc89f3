//! In-process stand-in for a legacy module binary.
//!
//! The fake builds a real `AEffect` whose function table points at the
//! `extern "C-unwind"` functions below, records every call it receives and
//! can be told to fault at specific points.

#![allow(dead_code, non_upper_case_globals)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;
use vst2_surround_bridge::ffi::*;
use vst2_surround_bridge::{LoadError, ModuleBinary, ModuleOpener};

/// Which entry symbols the fake binary exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exports {
    Primary,
    LegacyOnly,
    Nothing,
    /// Exports the primary symbol, but the entry point panics.
    Faulting,
}

#[derive(Debug, Clone)]
pub struct FakeConfig {
    pub exports: Exports,
    pub missing_file: bool,
    pub null_instance: bool,
    pub num_params: i32,
    pub num_programs: i32,
    pub channels: i32,
    pub chunks: bool,
    pub editor: bool,
    pub initial_chunk: Vec<u8>,
    pub initial_params: Vec<f32>,
    /// Answers to successive arrangement offers; missing entries accept.
    pub arrangement_answers: Vec<bool>,
    pub reject_chunk: bool,
    pub program_resets_params: bool,
    pub editor_rect: Option<ERect>,
    pub fault_on_open: bool,
    pub fault_on_close: bool,
    pub fault_on_process: bool,
    pub fault_on_edit_close: bool,
    pub gain: f32,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            exports: Exports::Primary,
            missing_file: false,
            null_instance: false,
            num_params: 3,
            num_programs: 8,
            channels: 2,
            chunks: false,
            editor: true,
            initial_chunk: Vec::new(),
            initial_params: Vec::new(),
            arrangement_answers: Vec::new(),
            reject_chunk: false,
            program_resets_params: false,
            editor_rect: Some(ERect {
                top: 0,
                left: 0,
                bottom: 300,
                right: 640,
            }),
            fault_on_open: false,
            fault_on_close: false,
            fault_on_process: false,
            fault_on_edit_close: false,
            gain: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Entry { host_vendor: String },
    Open { host_version: isize },
    Close,
    Suspend,
    Resume,
    SampleRate(f32),
    BlockSize(isize),
    SetProgram(i32),
    GetChunk,
    SetChunk(Vec<u8>),
    Arrangement { accepted: bool, num_inputs: i32, num_outputs: i32 },
    CanDo(String),
    EditOpen,
    EditClose,
    SetParameter(i32, f32),
    Process(i32),
    Freed,
}

pub type CallLog = Arc<Mutex<Vec<FakeCall>>>;

#[derive(Clone, Default)]
pub struct FakeOpener {
    pub config: FakeConfig,
    pub log: CallLog,
}

impl FakeOpener {
    pub fn new(config: FakeConfig) -> Self {
        Self {
            config,
            log: CallLog::default(),
        }
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn count(&self, predicate: impl Fn(&FakeCall) -> bool) -> usize {
        self.log.lock().iter().filter(|call| predicate(call)).count()
    }
}

impl ModuleOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleBinary>, LoadError> {
        if self.config.missing_file {
            return Err(LoadError::OpenFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".into(),
            });
        }
        Ok(Box::new(FakeBinary {
            path: path.to_path_buf(),
            config: self.config.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct FakeBinary {
    path: PathBuf,
    config: FakeConfig,
    log: CallLog,
}

impl ModuleBinary for FakeBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_point(&self, symbol: &[u8]) -> Option<VstPluginMain> {
        let exported = match self.config.exports {
            Exports::Primary => symbol == ENTRY_SYMBOL,
            Exports::LegacyOnly => symbol == LEGACY_ENTRY_SYMBOL,
            Exports::Nothing => false,
            Exports::Faulting => {
                return (symbol == ENTRY_SYMBOL).then_some(faulting_main as VstPluginMain);
            }
        };
        if !exported {
            return None;
        }
        PENDING.with(|pending| {
            *pending.borrow_mut() = Some((self.config.clone(), Arc::clone(&self.log)));
        });
        Some(fake_main)
    }
}

impl Drop for FakeBinary {
    fn drop(&mut self) {
        self.log.lock().push(FakeCall::Freed);
    }
}

thread_local! {
    static PENDING: RefCell<Option<(FakeConfig, CallLog)>> = const { RefCell::new(None) };
}

#[repr(C)]
struct FakeEffect {
    effect: AEffect,
    plugin: FakePlugin,
}

struct FakePlugin {
    config: FakeConfig,
    log: CallLog,
    host: audioMasterCallback,
    params: Vec<f32>,
    program: i32,
    chunk: Vec<u8>,
    rect: ERect,
    arrangement_offers: usize,
}

impl FakePlugin {
    fn record(&self, call: FakeCall) {
        self.log.lock().push(call);
    }
}

unsafe fn plugin<'a>(effect: *mut AEffect) -> &'a mut FakePlugin {
    &mut (*(effect as *mut FakeEffect)).plugin
}

unsafe fn write_text(ptr: *mut c_void, text: &str) {
    let dst = ptr as *mut c_char;
    for (offset, byte) in text.bytes().enumerate() {
        *dst.add(offset) = byte as c_char;
    }
    *dst.add(text.len()) = 0;
}

unsafe extern "C-unwind" fn faulting_main(_host: audioMasterCallback) -> *mut AEffect {
    panic!("entry point crashed");
}

unsafe extern "C-unwind" fn fake_main(host: audioMasterCallback) -> *mut AEffect {
    let Some((config, log)) = PENDING.with(|pending| pending.borrow_mut().take()) else {
        return ptr::null_mut();
    };

    let mut vendor = [0 as c_char; kVstMaxVendorStrLen];
    host(
        ptr::null_mut(),
        audioMasterGetVendorString,
        0,
        0,
        vendor.as_mut_ptr() as *mut c_void,
        0.0,
    );
    let host_vendor = CStr::from_ptr(vendor.as_ptr()).to_string_lossy().into_owned();
    log.lock().push(FakeCall::Entry { host_vendor });

    if config.null_instance {
        return ptr::null_mut();
    }

    let mut flags = effFlagsCanReplacing;
    if config.chunks {
        flags |= effFlagsProgramChunks;
    }
    if config.editor {
        flags |= effFlagsHasEditor;
    }
    let mut params = config.initial_params.clone();
    params.resize(config.num_params as usize, 0.0);

    let effect = AEffect {
        magic: kEffectMagic,
        dispatcher: Some(fake_dispatcher),
        process: None,
        setParameter: Some(fake_set_parameter),
        getParameter: Some(fake_get_parameter),
        numPrograms: config.num_programs,
        numParams: config.num_params,
        numInputs: config.channels,
        numOutputs: config.channels,
        flags,
        resvd1: 0,
        resvd2: 0,
        initialDelay: 0,
        realQualities: 0,
        offQualities: 0,
        ioRatio: 1.0,
        object: ptr::null_mut(),
        user: ptr::null_mut(),
        uniqueID: 0x4661_6b65,
        version: 1,
        processReplacing: Some(fake_process_replacing),
        processDoubleReplacing: None,
        future: [0; 56],
    };
    let plugin = FakePlugin {
        chunk: config.initial_chunk.clone(),
        rect: config.editor_rect.unwrap_or_default(),
        config,
        log,
        host,
        params,
        program: 0,
        arrangement_offers: 0,
    };
    Box::into_raw(Box::new(FakeEffect { effect, plugin })) as *mut AEffect
}

unsafe extern "C-unwind" fn fake_dispatcher(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let plugin = plugin(effect);
    match opcode {
        effOpen => {
            let host_version = (plugin.host)(effect, audioMasterVersion, 0, 0, ptr::null_mut(), 0.0);
            plugin.record(FakeCall::Open { host_version });
            if plugin.config.fault_on_open {
                panic!("fake module faulted in open");
            }
            0
        }
        effClose => {
            plugin.record(FakeCall::Close);
            if plugin.config.fault_on_close {
                panic!("fake module faulted in close");
            }
            drop(Box::from_raw(effect as *mut FakeEffect));
            0
        }
        effSetProgram => {
            plugin.program = value as i32;
            if plugin.config.program_resets_params {
                plugin.params.fill(0.0);
            }
            plugin.record(FakeCall::SetProgram(value as i32));
            0
        }
        effGetProgram => plugin.program as isize,
        effGetProgramName => {
            write_text(ptr, &format!("Program {index}"));
            0
        }
        effGetParamName => {
            write_text(ptr, &format!("Param {index}"));
            0
        }
        effGetParamLabel => {
            write_text(ptr, "dB");
            0
        }
        effGetParamDisplay => {
            let value = plugin.params.get(index as usize).copied().unwrap_or(0.0);
            write_text(ptr, &format!("{value:.2}"));
            0
        }
        effSetSampleRate => {
            plugin.record(FakeCall::SampleRate(opt));
            0
        }
        effSetBlockSize => {
            plugin.record(FakeCall::BlockSize(value));
            0
        }
        effMainsChanged => {
            plugin.record(if value != 0 {
                FakeCall::Resume
            } else {
                FakeCall::Suspend
            });
            0
        }
        effEditGetRect => match plugin.config.editor_rect {
            Some(_) => {
                *(ptr as *mut *mut ERect) = &mut plugin.rect;
                1
            }
            None => 0,
        },
        effEditOpen => {
            plugin.record(FakeCall::EditOpen);
            1
        }
        effEditClose => {
            plugin.record(FakeCall::EditClose);
            if plugin.config.fault_on_edit_close {
                panic!("fake module faulted in edit close");
            }
            0
        }
        effGetChunk => {
            plugin.record(FakeCall::GetChunk);
            if plugin.chunk.is_empty() {
                return 0;
            }
            *(ptr as *mut *mut c_void) = plugin.chunk.as_mut_ptr() as *mut c_void;
            plugin.chunk.len() as isize
        }
        effSetChunk => {
            let bytes = std::slice::from_raw_parts(ptr as *const u8, value as usize).to_vec();
            plugin.record(FakeCall::SetChunk(bytes.clone()));
            if plugin.config.reject_chunk {
                return 0;
            }
            plugin.chunk = bytes;
            1
        }
        effSetSpeakerArrangement => {
            let offer = plugin.arrangement_offers;
            plugin.arrangement_offers += 1;
            let accepted = plugin
                .config
                .arrangement_answers
                .get(offer)
                .copied()
                .unwrap_or(true);
            let inputs = &*(value as *const VstSpeakerArrangement);
            let outputs = &*(ptr as *const VstSpeakerArrangement);
            assert_eq!(inputs.numChannels, 6);
            assert_eq!(outputs.type_, kSpeakerArr51);
            plugin.record(FakeCall::Arrangement {
                accepted,
                num_inputs: (*effect).numInputs,
                num_outputs: (*effect).numOutputs,
            });
            accepted as isize
        }
        effCanDo => {
            let feature = CStr::from_ptr(ptr as *const c_char).to_string_lossy().into_owned();
            plugin.record(FakeCall::CanDo(feature));
            0
        }
        _ => 0,
    }
}

unsafe extern "C-unwind" fn fake_process_replacing(
    effect: *mut AEffect,
    inputs: *mut *mut f32,
    outputs: *mut *mut f32,
    frames: i32,
) {
    let plugin = plugin(effect);
    plugin.record(FakeCall::Process(frames));
    if plugin.config.fault_on_process {
        panic!("fake module faulted in process");
    }
    let channels = (*effect).numOutputs as usize;
    for channel in 0..channels {
        let input = std::slice::from_raw_parts(*inputs.add(channel), frames as usize);
        let output = std::slice::from_raw_parts_mut(*outputs.add(channel), frames as usize);
        for (out, sample) in output.iter_mut().zip(input) {
            *out = sample * plugin.config.gain;
        }
    }
}

unsafe extern "C-unwind" fn fake_set_parameter(effect: *mut AEffect, index: i32, value: f32) {
    let plugin = plugin(effect);
    plugin.record(FakeCall::SetParameter(index, value));
    if let Some(slot) = plugin.params.get_mut(index as usize) {
        *slot = value;
    }
}

unsafe extern "C-unwind" fn fake_get_parameter(effect: *mut AEffect, index: i32) -> f32 {
    plugin(effect).params.get(index as usize).copied().unwrap_or(0.0)
}
