use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bridge::SurroundBridge;
use crate::callback::{BridgeResponder, HostIdentity, HostResponder};
use crate::loader::{DynamicLibraryOpener, ModuleOpener};
use crate::speaker::SpeakerLayout;
use crate::state::{DEFAULT_CHUNK_SETTLE, DEFAULT_PROGRAM_SETTLE};

/// Runtime options for a [`SurroundBridge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Module loaded on the first `prepare` when nothing is loaded yet.
    pub module_path: Option<PathBuf>,
    pub sample_rate: f64,
    pub block_size: usize,
    #[serde(with = "millis")]
    pub chunk_settle: Duration,
    #[serde(with = "millis")]
    pub program_settle: Duration,
    pub identity: HostIdentity,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            module_path: None,
            sample_rate: 48_000.0,
            block_size: 512,
            chunk_settle: DEFAULT_CHUNK_SETTLE,
            program_settle: DEFAULT_PROGRAM_SETTLE,
            identity: HostIdentity::default(),
        }
    }
}

impl BridgeOptions {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("Failed to read bridge options at {path:?}"))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to deserialize bridge options {path:?}"))
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write bridge options to {path:?}"))?;
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Helper builder for constructing a bridge with custom options.
#[derive(Default, Clone)]
pub struct BridgeBuilder {
    options: BridgeOptions,
    responder: Option<Arc<dyn HostResponder>>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: BridgeOptions) -> Self {
        Self {
            options,
            responder: None,
        }
    }

    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.module_path = Some(path.into());
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.options.sample_rate = sample_rate;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.options.block_size = block_size;
        self
    }

    pub fn chunk_settle(mut self, settle: Duration) -> Self {
        self.options.chunk_settle = settle;
        self
    }

    pub fn program_settle(mut self, settle: Duration) -> Self {
        self.options.program_settle = settle;
        self
    }

    pub fn identity(mut self, identity: HostIdentity) -> Self {
        self.options.identity = identity;
        self
    }

    /// Replace the default responder answering the module's callbacks.
    pub fn responder(mut self, responder: Arc<dyn HostResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn build(self) -> SurroundBridge {
        self.build_with_opener(DynamicLibraryOpener)
    }

    pub fn build_with_opener<O>(self, opener: O) -> SurroundBridge
    where
        O: ModuleOpener + 'static,
    {
        let layout = SpeakerLayout::surround_5_1();
        let responder = self.responder.unwrap_or_else(|| {
            Arc::new(BridgeResponder::new(
                layout.clone(),
                self.options.identity.clone(),
            ))
        });
        SurroundBridge::with_opener(Box::new(opener), responder, layout, self.options)
    }
}
