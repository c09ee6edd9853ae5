//! Access point provisioning configuration.

use serde::{Deserialize, Serialize};

/// Which access point backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerKind {
    /// One directory of symlinks per token, served by a static file server.
    Symlink,
    /// Process-local mapping table. Single node only.
    Memory,
}

impl Default for ProvisionerKind {
    fn default() -> Self {
        Self::Symlink
    }
}

impl std::fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionerKind::Symlink => write!(f, "symlink"),
            ProvisionerKind::Memory => write!(f, "memory"),
        }
    }
}

/// Access point provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Backend used for token indirection.
    #[serde(default)]
    pub provider: ProvisionerKind,
    /// Directory holding one capability directory per live token.
    #[serde(default = "default_root_path")]
    pub root_path: String,
    /// Directory that relative catalog asset paths are resolved against.
    #[serde(default = "default_media_root")]
    pub media_root: String,
    /// Public URL prefix the delivery layer serves `root_path` under.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            provider: ProvisionerKind::default(),
            root_path: default_root_path(),
            media_root: default_media_root(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_root_path() -> String {
    "./data/access".to_string()
}

fn default_media_root() -> String {
    "./data/media".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080/stream".to_string()
}
