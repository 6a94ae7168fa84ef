use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime limits and module resolution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Nested interpreted calls allowed before raising "Call stack depth exceeded".
    pub max_call_depth: usize,
    /// Stack frames preallocated when the VM is built.
    pub frame_pool: usize,
    /// Initial capacity of each frame's value stack.
    pub value_stack_reserve: usize,
    pub import_paths: Vec<PathBuf>,
    pub module_extension: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            frame_pool: 16,
            value_stack_reserve: 32,
            import_paths: vec![PathBuf::from(".")],
            module_extension: "mbc".to_string(),
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid VM configuration")
    }
}
