//! Signing orchestrator: drives the external `nebula-cert` binary.
//!
//! The external tool owns all certificate cryptography. This module validates
//! parameters, invokes the binary with a fixed command-line contract, applies
//! a deadline to every invocation, and reads the produced cert/key files back
//! into memory. Callers pass a working directory (normally a `TempDir`) whose
//! drop guarantees the on-disk plaintext copies disappear on every exit path.

use crate::error::{NurseryError, Result};
use crate::identity::NodeIdentity;
use crate::interrupt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a running child is polled against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A certificate authority freshly created by the external signer. The
/// private key exists in plaintext only here in memory and, transiently, in
/// the working directory of the invocation that produced it.
pub struct CertificateAuthority {
    pub name: String,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// Cert and key produced for one signed node.
pub struct SignedNode {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// Convert a validity in days to the `<N>h` duration argument the signer
/// expects.
pub fn duration_hours(validity_days: u32) -> String {
    format!("{}h", u64::from(validity_days) * 24)
}

/// Handle to the configured external signing binary.
pub struct SignerTool {
    executable: PathBuf,
    timeout: Duration,
    interrupt: Arc<AtomicBool>,
}

impl SignerTool {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            interrupt: interrupt::flag(),
        }
    }

    /// Replace the interrupt flag polled while the signer runs.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Capability probe: run the binary with its help flag and require exit
    /// code 0. A missing or broken binary is reported here, before any
    /// signing work starts, distinct from a mid-operation failure.
    pub fn probe(&self) -> Result<()> {
        let status = Command::new(&self.executable)
            .arg("-h")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                NurseryError::SigningTool(format!(
                    "could not run {}: {e}",
                    self.executable.display()
                ))
            })?;
        if !status.success() {
            return Err(NurseryError::SigningTool(format!(
                "capability probe of {} failed ({status})",
                self.executable.display()
            )));
        }
        Ok(())
    }

    /// Create a new CA by invoking
    /// `ca -name <name> -duration <days*24>h -out-crt ... -out-key ...`
    /// in `workdir`, then read both output files back into memory.
    pub fn create_authority(
        &self,
        name: &str,
        validity_days: u32,
        workdir: &Path,
    ) -> Result<CertificateAuthority> {
        if name.trim().is_empty() {
            return Err(NurseryError::Validation("CA name must not be empty".into()));
        }
        if validity_days == 0 {
            return Err(NurseryError::Validation(
                "CA validity must be a positive number of days".into(),
            ));
        }

        let cert_path = workdir.join("ca.crt");
        let key_path = workdir.join("ca.key");

        self.run_checked(
            &[
                OsString::from("ca"),
                OsString::from("-name"),
                OsString::from(name),
                OsString::from("-duration"),
                OsString::from(duration_hours(validity_days)),
                OsString::from("-out-crt"),
                cert_path.clone().into_os_string(),
                OsString::from("-out-key"),
                key_path.clone().into_os_string(),
            ],
            workdir,
        )?;

        let cert = std::fs::read(&cert_path)?;
        let key = std::fs::read(&key_path)?;
        Ok(CertificateAuthority {
            name: name.trim().to_string(),
            cert,
            key,
        })
    }

    /// Sign a node certificate. Expects the CA material (`ca.crt`/`ca.key`)
    /// to already be staged in `workdir`, where the signer looks for it by
    /// default. Group membership is passed as one comma-joined token only
    /// when non-empty.
    pub fn sign_node(&self, identity: &NodeIdentity, workdir: &Path) -> Result<SignedNode> {
        crate::identity::validate_ipv4_subnet(&identity.overlay_ip)
            .map_err(NurseryError::Validation)?;
        if identity.name.trim().is_empty() {
            return Err(NurseryError::Validation("node name must not be empty".into()));
        }

        let cert_path = workdir.join(format!("{}.crt", identity.name));
        let key_path = workdir.join(format!("{}.key", identity.name));

        let mut args = vec![
            OsString::from("sign"),
            OsString::from("-name"),
            OsString::from(&identity.name),
            OsString::from("-ip"),
            OsString::from(&identity.overlay_ip),
        ];
        if let Some(csv) = identity.groups_csv() {
            args.push(OsString::from("-groups"));
            args.push(OsString::from(csv));
        }
        args.push(OsString::from("-out-crt"));
        args.push(cert_path.clone().into_os_string());
        args.push(OsString::from("-out-key"));
        args.push(key_path.clone().into_os_string());

        self.run_checked(&args, workdir)?;

        let cert = std::fs::read(&cert_path)?;
        let key = std::fs::read(&key_path)?;
        Ok(SignedNode { cert, key })
    }

    /// Run the signer with `args`, enforcing the configured deadline. A
    /// non-zero exit surfaces the tool's stderr verbatim.
    fn run_checked(&self, args: &[OsString], workdir: &Path) -> Result<()> {
        tracing::debug!(
            executable = %self.executable.display(),
            subcommand = ?args.first(),
            "invoking signer"
        );

        let mut child = Command::new(&self.executable)
            .args(args)
            .current_dir(workdir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                NurseryError::SigningTool(format!(
                    "could not run {}: {e}",
                    self.executable.display()
                ))
            })?;

        // Drain stderr concurrently: a signer that fills the pipe buffer
        // would otherwise block until the deadline kills it and its real
        // error would be lost behind a Timeout.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                use std::io::Read;
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if self.interrupt.load(Ordering::SeqCst) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(NurseryError::Interrupted);
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(NurseryError::Timeout {
                            what: "signing tool invocation".to_string(),
                            secs: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(NurseryError::SigningTool(format!(
                        "failed waiting for signer: {e}"
                    )))
                }
            }
        };

        if !status.success() {
            let stderr = stderr_reader
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            let stderr = stderr.trim();
            return Err(NurseryError::SigningTool(if stderr.is_empty() {
                format!("signer exited with {status}")
            } else {
                format!("signer exited with {status}: {stderr}")
            }));
        }
        Ok(())
    }
}
