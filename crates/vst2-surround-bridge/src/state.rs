//! Persisted bridge state and the save/restore sequence.
//!
//! A snapshot carries the module's opaque chunk when the module supports
//! one and, independently, the full parameter vector plus the active
//! program. Restore applies the chunk first and then always replays the
//! parameters, so a rejected or missing chunk still converges on the saved
//! values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::HostContext;
use crate::error::{RestoreError, StateError};
use crate::instance::PluginInstance;
use crate::loader::ModuleLoader;

/// Format tag written into every snapshot.
pub const STATE_VERSION: &str = "1.1.0";

/// Pause after a chunk is applied, giving the module time to digest it.
pub const DEFAULT_CHUNK_SETTLE: Duration = Duration::from_millis(50);

/// Pause after the program change, which may reset parameters.
pub const DEFAULT_PROGRAM_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBlock {
    /// Finite values only. JSON has no NaN, so a `null` left by another
    /// writer is dropped on read instead of failing the snapshot.
    #[serde(deserialize_with = "finite_values")]
    pub values: BTreeMap<i32, f32>,
    pub current_program: i32,
}

/// The container handed to the outer host for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeState {
    pub version: String,
    pub plugin_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterBlock>,
}

impl BridgeState {
    pub fn new(module_path: Option<PathBuf>) -> Self {
        Self {
            version: STATE_VERSION.to_owned(),
            plugin_loaded: false,
            module_path,
            chunk: None,
            chunk_size: None,
            parameters: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        if bytes.is_empty() {
            return Err(StateError::Empty);
        }
        let state: Self = serde_json::from_slice(bytes)?;
        if !state.version.starts_with("1.") {
            return Err(StateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }

    pub fn set_chunk(&mut self, bytes: &[u8]) {
        self.chunk = Some(STANDARD.encode(bytes));
        self.chunk_size = Some(bytes.len());
    }

    /// Decoded chunk bytes. An empty payload counts as no chunk.
    pub fn chunk_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        let Some(encoded) = self.chunk.as_deref() else {
            return Ok(None);
        };
        let bytes = STANDARD.decode(encoded)?;
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    /// The recorded module path, ignoring an empty string.
    pub fn module_path(&self) -> Option<&Path> {
        self.module_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    Loaded,
    ChunkApplied { bytes: usize },
    ProgramSet(i32),
    Suspended,
    ParametersApplied(usize),
    FormatPushed,
    Resumed,
}

/// What a restore did. Skipped steps carry the reason they were skipped.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub applied: Vec<RestoreStep>,
    pub skipped: Vec<RestoreError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn contains(&self, step: RestoreStep) -> bool {
        self.applied.contains(&step)
    }

    fn apply(&mut self, step: RestoreStep) {
        debug!(?step, "restore step applied");
        self.applied.push(step);
    }

    fn skip(&mut self, error: impl Into<RestoreError>) {
        let error = error.into();
        warn!(%error, "restore step skipped");
        self.skipped.push(error);
    }
}

impl From<RestoreError> for RestoreReport {
    fn from(error: RestoreError) -> Self {
        let mut report = Self::default();
        report.skip(error);
        report
    }
}

/// Captures and replays module state through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCodec {
    chunk_settle: Duration,
    program_settle: Duration,
}

impl StateCodec {
    pub fn new(chunk_settle: Duration, program_settle: Duration) -> Self {
        Self {
            chunk_settle,
            program_settle,
        }
    }

    /// Snapshot the loaded module. `configured_path` is recorded when
    /// nothing is loaded so the snapshot still names a module.
    pub fn save(&self, loader: &ModuleLoader, configured_path: Option<&Path>) -> BridgeState {
        let module_path = loader.path().or(configured_path).map(Path::to_path_buf);
        let mut state = BridgeState::new(module_path);
        let Some(instance) = loader.instance() else {
            return state;
        };
        state.plugin_loaded = true;

        if instance.supports_chunks() {
            match instance.dispatcher().get_chunk(false) {
                Ok(Some(bytes)) => state.set_chunk(&bytes),
                Ok(None) => debug!("module reported an empty chunk"),
                Err(fault) => warn!(%fault, "module faulted while producing its chunk"),
            }
        }
        state.parameters = Some(capture_parameters(instance));

        info!(
            chunk_bytes = state.chunk_size.unwrap_or(0),
            parameters = state.parameters.as_ref().map_or(0, |p| p.values.len()),
            "captured module state"
        );
        state
    }

    /// Replay `state` onto the loader, loading the recorded module first if
    /// nothing is loaded. Failing steps are skipped and reported.
    pub fn restore(
        &self,
        loader: &mut ModuleLoader,
        host: &mut HostContext,
        state: &BridgeState,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();

        if !loader.is_loaded() {
            let Some(path) = state.module_path() else {
                report.skip(RestoreError::MissingPath);
                return report;
            };
            match loader.load(path) {
                Ok(instance) => {
                    report.apply(RestoreStep::Loaded);
                    if host.is_prepared() {
                        if let Err(fault) = host.activate(instance) {
                            report.skip(fault);
                        }
                    }
                }
                Err(source) => {
                    report.skip(RestoreError::LoadFailed {
                        path: path.to_path_buf(),
                        source,
                    });
                    return report;
                }
            }
        }
        let Some(instance) = loader.instance() else {
            report.skip(RestoreError::NotLoaded);
            return report;
        };

        self.restore_chunk(instance, state, &mut report);
        if let Some(parameters) = &state.parameters {
            self.restore_parameters(instance, host, parameters, &mut report);
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "restored module state"
        );
        report
    }

    fn restore_chunk(
        &self,
        instance: &PluginInstance,
        state: &BridgeState,
        report: &mut RestoreReport,
    ) {
        let chunk = match state.chunk_bytes() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return,
            Err(err) => {
                report.skip(err);
                return;
            }
        };
        if !instance.supports_chunks() {
            report.skip(RestoreError::ChunkUnsupported);
            return;
        }
        if let Some(declared) = state.chunk_size.filter(|&size| size != chunk.len()) {
            warn!(declared, decoded = chunk.len(), "chunk size does not match payload");
        }
        match instance.dispatcher().set_chunk(&chunk, false) {
            Ok(true) => {
                report.apply(RestoreStep::ChunkApplied { bytes: chunk.len() });
                thread::sleep(self.chunk_settle);
            }
            Ok(false) => report.skip(RestoreError::ChunkRejected),
            Err(fault) => report.skip(fault),
        }
    }

    fn restore_parameters(
        &self,
        instance: &PluginInstance,
        host: &mut HostContext,
        parameters: &ParameterBlock,
        report: &mut RestoreReport,
    ) {
        match instance.dispatcher().set_program(parameters.current_program) {
            Ok(()) => {
                report.apply(RestoreStep::ProgramSet(parameters.current_program));
                thread::sleep(self.program_settle);
            }
            Err(fault) => report.skip(fault),
        }

        match host.suspend(instance) {
            Ok(()) => report.apply(RestoreStep::Suspended),
            Err(fault) => report.skip(fault),
        }

        let count = instance.num_params();
        let mut restored = 0;
        for (&index, &value) in &parameters.values {
            if !(0..count).contains(&index) {
                debug!(index, count, "ignoring parameter outside the module's range");
                continue;
            }
            match instance.set_parameter(index, value) {
                Ok(()) => restored += 1,
                Err(fault) => report.skip(fault),
            }
        }
        report.apply(RestoreStep::ParametersApplied(restored));

        match host.push_format(instance) {
            Ok(()) => report.apply(RestoreStep::FormatPushed),
            Err(fault) => report.skip(fault),
        }
        match host.resume(instance) {
            Ok(()) => report.apply(RestoreStep::Resumed),
            Err(fault) => report.skip(fault),
        }
    }
}

impl Default for StateCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SETTLE, DEFAULT_PROGRAM_SETTLE)
    }
}

fn capture_parameters(instance: &PluginInstance) -> ParameterBlock {
    let mut values = BTreeMap::new();
    for index in 0..instance.num_params() {
        match instance.get_parameter(index) {
            Ok(value) if value.is_finite() => {
                values.insert(index, value);
            }
            Ok(value) => warn!(index, value, "not saving a non-finite parameter value"),
            Err(fault) => warn!(index, %fault, "module faulted while reading a parameter"),
        }
    }
    let current_program = instance.dispatcher().get_program().unwrap_or_else(|fault| {
        warn!(%fault, "module faulted while reporting its program");
        0
    });
    ParameterBlock {
        values,
        current_program,
    }
}

fn finite_values<'de, D>(deserializer: D) -> Result<BTreeMap<i32, f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<i32, Option<f32>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(index, value)| match value {
            Some(value) if value.is_finite() => Some((index, value)),
            _ => {
                warn!(index, "dropping a parameter with no usable value");
                None
            }
        })
        .collect())
}
