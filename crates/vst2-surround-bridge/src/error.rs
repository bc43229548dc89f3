use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening a module and creating its instance.
///
/// None of these are fatal to the caller: the bridge keeps running in
/// pass-through mode with nothing loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open module {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },
    #[error("module {0} exports neither VSTPluginMain nor main")]
    EntryMissing(PathBuf),
    #[error("entry point of {0} returned a null instance")]
    InstanceNull(PathBuf),
}

impl LoadError {
    pub(crate) fn open_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A fault caught at the interop boundary while calling into the module.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleFault {
    #[error("module faulted while handling dispatcher opcode {opcode}")]
    Dispatch { opcode: i32 },
    #[error("module faulted inside {0}")]
    Function(&'static str),
    #[error("instance does not provide {0}")]
    MissingFunction(&'static str),
}

/// Errors encoding or decoding the persisted state container.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state container is empty")]
    Empty,
    #[error("state container is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state container version {0}")]
    UnsupportedVersion(String),
}

/// A restore sub-step that was skipped. Restore carries on with the
/// remaining steps after recording one of these.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("persisted state is malformed: {0}")]
    Malformed(#[from] StateError),
    #[error("persisted state does not name a module path")]
    MissingPath,
    #[error("module {path} could not be loaded: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("no module is loaded")]
    NotLoaded,
    #[error("module does not accept opaque chunks")]
    ChunkUnsupported,
    #[error("module rejected the restored chunk")]
    ChunkRejected,
    #[error("chunk payload is not valid base64: {0}")]
    ChunkEncoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Fault(#[from] LifecycleFault),
}
