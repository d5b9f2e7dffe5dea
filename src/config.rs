use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::runtime::CascadePolicy;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// 输出事件通道容量；通道满时运行时阻塞
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// 每次 `handle`/`settle` 调用的自动发生次数上限
    #[serde(default = "default_cascade_limit")]
    pub cascade_limit: usize,
    #[serde(default)]
    pub cascade_policy: CascadePolicy,
    #[serde(default = "default_coverability_limit")]
    pub coverability_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            command_buffer: default_command_buffer(),
            cascade_limit: default_cascade_limit(),
            cascade_policy: CascadePolicy::default(),
            coverability_limit: default_coverability_limit(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn default_event_buffer() -> usize {
    64
}

fn default_command_buffer() -> usize {
    256
}

fn default_cascade_limit() -> usize {
    10_000
}

fn default_coverability_limit() -> Option<usize> {
    Some(100_000)
}
