//! Application configuration, loaded from `nursery.toml` when present.
//!
//! Every field has a default so the tool runs with no config file at all;
//! the file only exists to repoint the signer binary, ports, or the tunnel
//! client.

use crate::error::{NurseryError, Result};
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_PATH: &str = "nursery.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_vault_file")]
    pub vault_file: String,
}

impl WorkspaceConfig {
    /// Full path of the persisted vault file.
    pub fn vault_path(&self) -> PathBuf {
        self.output_dir.join(&self.vault_file)
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            vault_file: default_vault_file(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_vault_file() -> String {
    "nursery.vault".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignerConfig {
    /// Default offered at the executable prompt.
    #[serde(default = "default_signer_executable")]
    pub executable: String,
    #[serde(default = "default_signer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            executable: default_signer_executable(),
            timeout_secs: default_signer_timeout_secs(),
        }
    }
}

fn default_signer_executable() -> String {
    "nebula-cert".to_string()
}

fn default_signer_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DistributionConfig {
    #[serde(default = "default_distribution_port")]
    pub port: u16,
    /// Restores the pre-hardening behavior of serving the bundle any number
    /// of times for the life of the process.
    #[serde(default)]
    pub allow_repeat_download: bool,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            port: default_distribution_port(),
            allow_repeat_download: false,
        }
    }
}

fn default_distribution_port() -> u16 {
    8042
}

#[derive(Debug, Deserialize, Clone)]
pub struct TunnelConfig {
    #[serde(default = "default_tunnel_command")]
    pub command: String,
    /// Arguments for the tunnel client; `{port}` is replaced with the local
    /// distribution port.
    #[serde(default = "default_tunnel_args")]
    pub args: Vec<String>,
    #[serde(default = "default_tunnel_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            command: default_tunnel_command(),
            args: default_tunnel_args(),
            timeout_secs: default_tunnel_timeout_secs(),
        }
    }
}

fn default_tunnel_command() -> String {
    "cloudflared".to_string()
}

fn default_tunnel_args() -> Vec<String> {
    vec![
        "tunnel".to_string(),
        "--url".to_string(),
        "http://127.0.0.1:{port}".to_string(),
    ]
}

fn default_tunnel_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        toml::from_str(&config_str)
            .map_err(|e| NurseryError::Config(format!("failed to parse {path}: {e}")))
    }

    /// Load `nursery.toml` if it exists, defaults otherwise.
    pub fn load() -> Result<Self> {
        if std::path::Path::new(CONFIG_PATH).exists() {
            Self::from_file(CONFIG_PATH)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workspace.output_dir, PathBuf::from("output"));
        assert_eq!(
            config.workspace.vault_path(),
            PathBuf::from("output/nursery.vault")
        );
        assert_eq!(config.signer.executable, "nebula-cert");
        assert_eq!(config.distribution.port, 8042);
        assert!(!config.distribution.allow_repeat_download);
        assert_eq!(config.tunnel.command, "cloudflared");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [signer]
            executable = "/opt/nebula/nebula-cert"

            [distribution]
            allow_repeat_download = true
            "#,
        )
        .unwrap();
        assert_eq!(parsed.signer.executable, "/opt/nebula/nebula-cert");
        assert_eq!(parsed.signer.timeout_secs, 30);
        assert!(parsed.distribution.allow_repeat_download);
        assert_eq!(parsed.workspace.vault_file, "nursery.vault");
    }
}
