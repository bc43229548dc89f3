use tracing::debug;

use crate::error::LifecycleFault;
use crate::instance::PluginInstance;

/// Processing format pushed by the outer host plus the module's activation
/// state.
///
/// Only `prepare`/`release` on the bridge and the state restore sequence
/// mutate it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostContext {
    sample_rate: f64,
    block_size: usize,
    suspended: bool,
    prepared: bool,
}

impl HostContext {
    pub fn new(sample_rate: f64, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            suspended: true,
            prepared: false,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the outer host has prepared the bridge for playback.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub(crate) fn set_format(&mut self, sample_rate: f64, block_size: usize) {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.prepared = true;
    }

    pub(crate) fn mark_released(&mut self) {
        self.prepared = false;
    }

    /// Push sample rate and block size to the instance.
    pub fn push_format(&self, instance: &PluginInstance) -> Result<(), LifecycleFault> {
        let dispatcher = instance.dispatcher();
        dispatcher.set_sample_rate(self.sample_rate as f32)?;
        dispatcher.set_block_size(self.block_size)?;
        debug!(
            sample_rate = self.sample_rate,
            block_size = self.block_size,
            "pushed processing format"
        );
        Ok(())
    }

    pub fn suspend(&mut self, instance: &PluginInstance) -> Result<(), LifecycleFault> {
        instance.suspend()?;
        self.suspended = true;
        Ok(())
    }

    pub fn resume(&mut self, instance: &PluginInstance) -> Result<(), LifecycleFault> {
        instance.resume()?;
        self.suspended = false;
        Ok(())
    }

    /// Push the format, then resume.
    pub fn activate(&mut self, instance: &PluginInstance) -> Result<(), LifecycleFault> {
        self.push_format(instance)?;
        self.resume(instance)
    }

    /// Forget the activation state of an instance that has been unloaded.
    pub(crate) fn mark_unloaded(&mut self) {
        self.suspended = true;
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(48_000.0, 512)
    }
}
