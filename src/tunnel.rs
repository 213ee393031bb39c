//! Public tunnel for the distribution server.
//!
//! Spawns the configured tunnel client (cloudflared by default) pointed at
//! the local distribution port and scans its output for the public HTTPS
//! URL the relay assigned. The child is killed when the handle drops, so the
//! tunnel never outlives the serve phase.

use crate::error::{NurseryError, Result};
use std::io::BufRead;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Placeholder in configured tunnel arguments replaced with the local port.
const PORT_PLACEHOLDER: &str = "{port}";

/// Upper bound on one wait for client output, so the interrupt flag is
/// polled while the relay is still connecting.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// A live tunnel session. Dropping the handle tears the tunnel down.
#[derive(Debug)]
pub struct TunnelHandle {
    pub public_url: String,
    child: Child,
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start the tunnel client and wait for it to report a public URL.
///
/// Both stdout and stderr are scanned, since relay clients differ on where
/// they announce the URL. Establishment failure is fatal to the sign-node
/// flow; there is no local-only fallback.
pub fn open_tunnel(
    command: &str,
    args: &[String],
    port: u16,
    timeout: Duration,
    interrupt: Arc<AtomicBool>,
) -> Result<TunnelHandle> {
    let args: Vec<String> = args
        .iter()
        .map(|a| a.replace(PORT_PLACEHOLDER, &port.to_string()))
        .collect();

    tracing::info!(command, ?args, "starting tunnel client");
    let mut child = Command::new(command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| NurseryError::Tunnel(format!("could not run {command}: {e}")))?;

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, tx);
    }

    let deadline = Instant::now() + timeout;
    loop {
        if interrupt.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(NurseryError::Interrupted);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(NurseryError::Timeout {
                what: "tunnel establishment".to_string(),
                secs: timeout.as_secs(),
            });
        }
        match rx.recv_timeout(remaining.min(WAIT_SLICE)) {
            Ok(line) => {
                if let Some(url) = find_https_url(&line) {
                    tracing::info!(%url, "tunnel established");
                    return Ok(TunnelHandle {
                        public_url: url,
                        child,
                    });
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = child.wait();
                return Err(NurseryError::Tunnel(format!(
                    "{command} exited before reporting a public URL"
                )));
            }
        }
    }
}

fn spawn_line_reader(pipe: impl std::io::Read + Send + 'static, tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let reader = std::io::BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            tracing::debug!(target: "tunnel", "{line}");
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Pull the first `https://` URL out of a line of tunnel client output.
fn find_https_url(line: &str) -> Option<String> {
    let start = line.find("https://")?;
    let rest = &line[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '|')
        .unwrap_or(rest.len());
    let url = rest[..end].trim_end_matches(['.', ',']);
    // The client may echo the target URL itself; only a remote host counts.
    if url.contains("127.0.0.1") || url.contains("localhost") {
        return None;
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn no_interrupt() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_find_https_url() {
        assert_eq!(
            find_https_url("INF |  https://witty-crab.trycloudflare.com  |"),
            Some("https://witty-crab.trycloudflare.com".to_string())
        );
        assert_eq!(
            find_https_url("tunnel ready at https://abc.example.com."),
            Some("https://abc.example.com".to_string())
        );
        assert_eq!(find_https_url("forwarding https://127.0.0.1:8000"), None);
        assert_eq!(find_https_url("no url here"), None);
    }

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-tunnel");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_tunnel_url_from_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(
            dir.path(),
            "echo 'ready: https://abc.relay.example' >&2\nsleep 30",
        );
        let handle = open_tunnel(
            stub.to_str().unwrap(),
            &["--url".to_string(), "http://127.0.0.1:{port}".to_string()],
            8042,
            Duration::from_secs(5),
            no_interrupt(),
        )
        .unwrap();
        assert_eq!(handle.public_url, "https://abc.relay.example");
    }

    #[cfg(unix)]
    #[test]
    fn test_tunnel_client_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "echo 'could not connect' >&2\nexit 1");
        let err = open_tunnel(
            stub.to_str().unwrap(),
            &[],
            8042,
            Duration::from_secs(5),
            no_interrupt(),
        )
        .unwrap_err();
        assert!(matches!(err, NurseryError::Tunnel(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_tunnel_establishment_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "sleep 10");
        let err = open_tunnel(
            stub.to_str().unwrap(),
            &[],
            8042,
            Duration::from_millis(200),
            no_interrupt(),
        )
        .unwrap_err();
        assert!(matches!(err, NurseryError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_aborts_tunnel_wait() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "sleep 10");
        let flag = Arc::new(AtomicBool::new(true));
        let start = std::time::Instant::now();
        let err = open_tunnel(
            stub.to_str().unwrap(),
            &[],
            8042,
            Duration::from_secs(30),
            flag,
        )
        .unwrap_err();
        assert!(matches!(err, NurseryError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_tunnel_client() {
        let err = open_tunnel(
            "/nonexistent/cloudflared",
            &[],
            8042,
            Duration::from_secs(1),
            no_interrupt(),
        )
        .unwrap_err();
        assert!(matches!(err, NurseryError::Tunnel(_)));
    }
}
