use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use vst2_sys::*;

use crate::error::LifecycleFault;

/// Size of the name/label/display buffers handed to the module.
pub const TEXT_BUFFER_LEN: usize = 256;

/// Editor size used when the module does not report a rectangle.
pub const DEFAULT_EDITOR_SIZE: (u32, u32) = (400, 400);

/// Run `f`, converting an unwinding fault into `Err(())`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, ()> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(drop)
}

/// The single synchronous call surface into a loaded instance.
///
/// Every call is guarded: a fault raised by the module surfaces as a
/// [`LifecycleFault`] instead of unwinding into the bridge.
#[derive(Debug)]
pub struct Dispatcher {
    effect: *mut AEffect,
}

unsafe impl Send for Dispatcher {}

impl Dispatcher {
    /// # Safety
    /// `effect` must stay valid for as long as the dispatcher is used.
    pub(crate) unsafe fn new(effect: *mut AEffect) -> Self {
        Self { effect }
    }

    pub fn raw(&self) -> *mut AEffect {
        self.effect
    }

    pub fn dispatch(
        &self,
        opcode: i32,
        index: i32,
        value: isize,
        ptr: *mut c_void,
        opt: f32,
    ) -> Result<isize, LifecycleFault> {
        let effect = self.effect;
        let dispatcher = unsafe { (*effect).dispatcher }
            .ok_or(LifecycleFault::MissingFunction("dispatcher"))?;
        guarded(|| unsafe { dispatcher(effect, opcode, index, value, ptr, opt) })
            .map_err(|_| LifecycleFault::Dispatch { opcode })
    }

    fn call(&self, opcode: i32, index: i32, value: isize) -> Result<isize, LifecycleFault> {
        self.dispatch(opcode, index, value, ptr::null_mut(), 0.0)
    }

    pub fn open(&self) -> Result<(), LifecycleFault> {
        self.call(effOpen, 0, 0).map(drop)
    }

    pub fn close(&self) -> Result<(), LifecycleFault> {
        self.call(effClose, 0, 0).map(drop)
    }

    pub fn set_program(&self, program: i32) -> Result<(), LifecycleFault> {
        self.call(effSetProgram, 0, program as isize).map(drop)
    }

    pub fn get_program(&self) -> Result<i32, LifecycleFault> {
        self.call(effGetProgram, 0, 0).map(|program| program as i32)
    }

    pub fn program_name(&self, index: i32) -> Result<String, LifecycleFault> {
        self.text_query(effGetProgramName, index)
    }

    pub fn param_name(&self, index: i32) -> Result<String, LifecycleFault> {
        self.text_query(effGetParamName, index)
    }

    pub fn param_label(&self, index: i32) -> Result<String, LifecycleFault> {
        self.text_query(effGetParamLabel, index)
    }

    pub fn param_display(&self, index: i32) -> Result<String, LifecycleFault> {
        self.text_query(effGetParamDisplay, index)
    }

    pub fn set_sample_rate(&self, sample_rate: f32) -> Result<(), LifecycleFault> {
        self.dispatch(effSetSampleRate, 0, 0, ptr::null_mut(), sample_rate).map(drop)
    }

    pub fn set_block_size(&self, block_size: usize) -> Result<(), LifecycleFault> {
        let block_size = isize::try_from(block_size).unwrap_or(isize::MAX);
        self.call(effSetBlockSize, 0, block_size).map(drop)
    }

    /// `true` resumes processing, `false` suspends it.
    pub fn mains_changed(&self, active: bool) -> Result<(), LifecycleFault> {
        self.call(effMainsChanged, 0, active as isize).map(drop)
    }

    /// Returns whether the module reports the editor as opened.
    pub fn edit_open(&self, parent: *mut c_void) -> Result<bool, LifecycleFault> {
        self.dispatch(effEditOpen, 0, 0, parent, 0.0).map(|result| result != 0)
    }

    pub fn edit_close(&self) -> Result<(), LifecycleFault> {
        self.call(effEditClose, 0, 0).map(drop)
    }

    /// Width and height of the editor, or [`DEFAULT_EDITOR_SIZE`] when the
    /// module hands back no rectangle.
    pub fn edit_rect(&self) -> Result<(u32, u32), LifecycleFault> {
        let mut rect: *mut ERect = ptr::null_mut();
        self.dispatch(
            effEditGetRect,
            0,
            0,
            &mut rect as *mut *mut ERect as *mut c_void,
            0.0,
        )?;
        if rect.is_null() {
            return Ok(DEFAULT_EDITOR_SIZE);
        }
        let rect = unsafe { *rect };
        let width = i32::from(rect.right) - i32::from(rect.left);
        let height = i32::from(rect.bottom) - i32::from(rect.top);
        Ok((width.max(0) as u32, height.max(0) as u32))
    }

    /// Copy the module's opaque chunk. `Ok(None)` when the module reports no
    /// data. The module keeps ownership of its buffer, so the bytes are copied
    /// out before returning.
    pub fn get_chunk(&self, preset: bool) -> Result<Option<Vec<u8>>, LifecycleFault> {
        let mut data: *mut c_void = ptr::null_mut();
        let size = self.dispatch(
            effGetChunk,
            preset as i32,
            0,
            &mut data as *mut *mut c_void as *mut c_void,
            0.0,
        )?;
        if size <= 0 || data.is_null() {
            return Ok(None);
        }
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) };
        Ok(Some(bytes.to_vec()))
    }

    /// Hand a chunk to the module. Returns whether the module acknowledged it.
    pub fn set_chunk(&self, chunk: &[u8], preset: bool) -> Result<bool, LifecycleFault> {
        let len = isize::try_from(chunk.len()).unwrap_or(isize::MAX);
        self.dispatch(
            effSetChunk,
            preset as i32,
            len,
            chunk.as_ptr() as *mut c_void,
            0.0,
        )
        .map(|result| result == 1)
    }

    pub fn set_speaker_arrangement(
        &self,
        input: &mut VstSpeakerArrangement,
        output: &mut VstSpeakerArrangement,
    ) -> Result<bool, LifecycleFault> {
        self.dispatch(
            effSetSpeakerArrangement,
            0,
            input as *mut VstSpeakerArrangement as isize,
            output as *mut VstSpeakerArrangement as *mut c_void,
            0.0,
        )
        .map(|result| result == 1)
    }

    /// The arrangement the module currently reports. Advisory only; the
    /// bridge never routes by it.
    pub fn get_speaker_arrangement(
        &self,
    ) -> Result<Option<(VstSpeakerArrangement, VstSpeakerArrangement)>, LifecycleFault> {
        let mut input: *mut VstSpeakerArrangement = ptr::null_mut();
        let mut output: *mut VstSpeakerArrangement = ptr::null_mut();
        let result = self.dispatch(
            effGetSpeakerArrangement,
            0,
            &mut input as *mut *mut VstSpeakerArrangement as isize,
            &mut output as *mut *mut VstSpeakerArrangement as *mut c_void,
            0.0,
        )?;
        if result != 1 || input.is_null() || output.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { (*input, *output) }))
    }

    pub fn can_do(&self, feature: &CStr) -> Result<isize, LifecycleFault> {
        self.dispatch(effCanDo, 0, 0, feature.as_ptr() as *mut c_void, 0.0)
    }

    pub fn process_replacing(
        &self,
        inputs: *mut *mut f32,
        outputs: *mut *mut f32,
        frames: usize,
    ) -> Result<(), LifecycleFault> {
        let effect = self.effect;
        let process = unsafe { (*effect).processReplacing }
            .ok_or(LifecycleFault::MissingFunction("processReplacing"))?;
        let frames = i32::try_from(frames).unwrap_or(i32::MAX);
        guarded(|| unsafe { process(effect, inputs, outputs, frames) })
            .map_err(|_| LifecycleFault::Function("processReplacing"))
    }

    pub fn set_parameter(&self, index: i32, value: f32) -> Result<(), LifecycleFault> {
        let effect = self.effect;
        let set = unsafe { (*effect).setParameter }
            .ok_or(LifecycleFault::MissingFunction("setParameter"))?;
        guarded(|| unsafe { set(effect, index, value) })
            .map_err(|_| LifecycleFault::Function("setParameter"))
    }

    pub fn get_parameter(&self, index: i32) -> Result<f32, LifecycleFault> {
        let effect = self.effect;
        let get = unsafe { (*effect).getParameter }
            .ok_or(LifecycleFault::MissingFunction("getParameter"))?;
        guarded(|| unsafe { get(effect, index) })
            .map_err(|_| LifecycleFault::Function("getParameter"))
    }

    fn text_query(&self, opcode: i32, index: i32) -> Result<String, LifecycleFault> {
        let mut buffer = [0 as c_char; TEXT_BUFFER_LEN];
        self.dispatch(opcode, index, 0, buffer.as_mut_ptr() as *mut c_void, 0.0)?;
        // Modules are expected to terminate the string; do not trust it.
        buffer[TEXT_BUFFER_LEN - 1] = 0;
        let text = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        Ok(text.to_string_lossy().into_owned())
    }
}
