//! Session controller: sequences a whole provisioning run.
//!
//! Mode is decided by vault presence on disk: no vault means this run
//! creates the CA; an existing vault means this run signs a node with it.
//! The workspace is swept before any work starts and again on every exit
//! path, via a drop guard, so an abort or fatal error leaves no artifacts
//! behind other than the vault itself.

use crate::archive;
use crate::configs::AppConfig;
use crate::error::{NurseryError, Result};
use crate::interrupt;
use crate::janitor::Janitor;
use crate::prompts;
use crate::server::{self, DownloadToken};
use crate::tunnel;
use crate::vault::{self, VaultKey};
use console::style;
use std::path::Path;
use std::time::Duration;

pub struct Session {
    config: AppConfig,
}

impl Session {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run one full session: pre-clean, CA creation or node signing, and a
    /// guaranteed post-clean.
    pub fn run(&self) -> Result<()> {
        interrupt::install();

        let vault_path = self.config.workspace.vault_path();
        let output_dir = &self.config.workspace.output_dir;

        Janitor::new(output_dir, &vault_path).sweep()?;
        let _cleanup = Janitor::new(output_dir, &vault_path).guard();

        if vault_path.exists() {
            self.sign_node_flow(&vault_path)
        } else {
            self.create_ca_flow(&vault_path)
        }
    }

    /// First run: create a CA, seal its key-pair into the vault, and persist
    /// the vault only after the operator proves they captured the key.
    fn create_ca_flow(&self, vault_path: &Path) -> Result<()> {
        println!("No vault found; creating a new certificate authority.\n");

        let signer = prompts::signer_tool(&self.config.signer)?;
        let (name, validity_days) = prompts::ca_details()?;
        interrupt::check()?;

        // Plaintext cert and key only ever touch disk inside this TempDir.
        let workdir = tempfile::tempdir()?;
        let ca = signer.create_authority(&name, validity_days, workdir.path())?;
        println!("{} created CA {}", style("✓").green(), style(&ca.name).bold());

        let plaintext = archive::bundle(&[
            (archive::CA_CERT_NAME, ca.cert.as_slice()),
            (archive::CA_KEY_NAME, ca.key.as_slice()),
        ])?;
        let (blob, key) = vault::seal(&plaintext)?;

        let candidate = prompts::vault_key_confirmation(&key)?;
        persist_vault(vault_path, &blob, &key, &candidate)?;
        drop(workdir);

        println!(
            "{} vault written to {}",
            style("✓").green(),
            vault_path.display()
        );
        println!("Re-run the tool to sign nodes with this CA.");
        Ok(())
    }

    /// Subsequent runs: open the vault, sign one node, and hand its bundle
    /// off through the one-shot distribution server.
    fn sign_node_flow(&self, vault_path: &Path) -> Result<()> {
        prompts::confirm_existing_vault(vault_path)?;

        let signer = prompts::signer_tool(&self.config.signer)?;
        let key = prompts::vault_key_entry()?;
        interrupt::check()?;

        let blob = std::fs::read(vault_path)?;
        let plaintext = vault::open(&blob, &key)?;
        let ca_material = archive::extract(
            &plaintext,
            &[archive::CA_CERT_NAME, archive::CA_KEY_NAME],
        )?;
        println!("{} vault opened", style("✓").green());

        // Stage the CA material where the signer looks for it by default;
        // the TempDir drop removes both plaintext files on every exit path.
        let workdir = tempfile::tempdir()?;
        std::fs::write(
            workdir.path().join(archive::CA_CERT_NAME),
            &ca_material[archive::CA_CERT_NAME],
        )?;
        std::fs::write(
            workdir.path().join(archive::CA_KEY_NAME),
            &ca_material[archive::CA_KEY_NAME],
        )?;

        let identity = prompts::node_wizard()?;
        let signed = signer.sign_node(&identity, workdir.path())?;
        println!(
            "{} signed node {}",
            style("✓").green(),
            style(&identity.name).bold()
        );

        let filename = bundle_filename(&identity.name);
        let cert_name = format!("{}.crt", identity.name);
        let key_name = format!("{}.key", identity.name);
        let bundle = archive::bundle(&[
            (cert_name.as_str(), signed.cert.as_slice()),
            (key_name.as_str(), signed.key.as_slice()),
            (
                archive::CA_CERT_NAME,
                ca_material[archive::CA_CERT_NAME].as_slice(),
            ),
        ])?;
        drop(workdir);

        let token = DownloadToken::generate()?;
        let port = self.config.distribution.port;
        let tunnel = tunnel::open_tunnel(
            &self.config.tunnel.command,
            &self.config.tunnel.args,
            port,
            Duration::from_secs(self.config.tunnel.timeout_secs),
            interrupt::flag(),
        )?;

        println!();
        println!(
            "{} bundle {} is ready for one-time download:",
            style("✓").green(),
            style(&filename).bold()
        );
        println!();
        println!(
            "    {}/?x={}",
            style(&tunnel.public_url).cyan().bold(),
            token.as_str()
        );
        println!();
        println!("Relay the URL to the node operator out-of-band. The link works once.");
        println!("Press Ctrl-C to end the session once the bundle has been retrieved.");
        println!();

        server::serve(
            bundle,
            &filename,
            token,
            port,
            self.config.distribution.allow_repeat_download,
        )?;

        drop(tunnel);
        Ok(())
    }
}

/// Write the sealed vault to disk, but only if the operator's re-typed key
/// matches the real one. On mismatch nothing is written and the CA flow
/// aborts; the next run starts over from scratch.
fn persist_vault(vault_path: &Path, blob: &[u8], key: &VaultKey, candidate: &str) -> Result<()> {
    if !key.verify(candidate) {
        return Err(NurseryError::Validation(
            "key confirmation did not match; the vault was NOT written, re-run to create the CA"
                .to_string(),
        ));
    }
    std::fs::write(vault_path, blob)?;
    Ok(())
}

/// Attachment filename for a node's bundle.
fn bundle_filename(node_name: &str) -> String {
    format!("{node_name}-bundle.tar.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_filename() {
        assert_eq!(bundle_filename("laptop"), "laptop-bundle.tar.gz");
    }

    #[test]
    fn test_mismatched_key_confirmation_never_writes_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("nursery.vault");
        let (blob, key) = vault::seal(b"ca material").unwrap();

        let err = persist_vault(&vault_path, &blob, &key, "not the key").unwrap_err();
        assert!(matches!(err, NurseryError::Validation(_)));
        assert!(!vault_path.exists());
    }

    #[test]
    fn test_matching_key_confirmation_writes_reopenable_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("nursery.vault");
        let (blob, key) = vault::seal(b"ca material").unwrap();

        persist_vault(&vault_path, &blob, &key, &key.to_hex()).unwrap();

        let written = std::fs::read(&vault_path).unwrap();
        assert_eq!(vault::open(&written, &key).unwrap(), b"ca material");
    }

    #[test]
    fn test_node_bundle_contains_cert_key_and_ca() {
        let bundle = archive::bundle(&[
            ("laptop.crt", b"node cert".as_slice()),
            ("laptop.key", b"node key".as_slice()),
            (archive::CA_CERT_NAME, b"ca cert".as_slice()),
        ])
        .unwrap();

        let entries =
            archive::extract(&bundle, &["laptop.crt", "laptop.key", archive::CA_CERT_NAME])
                .unwrap();
        assert_eq!(entries["laptop.crt"], b"node cert");
        assert_eq!(entries["laptop.key"], b"node key");
        assert_eq!(entries[archive::CA_CERT_NAME], b"ca cert");
    }
}
