//! Process-interrupt tracking for the phases before the distribution
//! server is up.
//!
//! The serve phase handles Ctrl-C through its own graceful shutdown; every
//! earlier phase would otherwise die with the default signal disposition,
//! skipping scoped cleanup while plaintext key material may still sit in a
//! temporary directory. Installing the watcher replaces that disposition
//! with a process-wide flag, so long-running external invocations notice
//! the interrupt and return an error through the session, letting the
//! janitor guard and `TempDir` drops run.

use crate::error::{NurseryError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

fn shared() -> Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false))).clone()
}

/// Install the interrupt watcher. Idempotent; the first call wins.
pub fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let flag = shared();
        std::thread::spawn(move || {
            let Ok(rt) = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            else {
                return;
            };
            rt.block_on(async {
                loop {
                    if tokio::signal::ctrl_c().await.is_err() {
                        break;
                    }
                    tracing::info!("interrupt received, unwinding for cleanup");
                    flag.store(true, Ordering::SeqCst);
                }
            });
        });
    });
}

/// Handle to the process-wide interrupt flag, for loops that poll it.
pub fn flag() -> Arc<AtomicBool> {
    shared()
}

/// Error out if the run has been interrupted.
pub fn check() -> Result<()> {
    if shared().load(Ordering::SeqCst) {
        Err(NurseryError::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_when_not_interrupted() {
        assert!(check().is_ok());
        assert!(!flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_install_is_idempotent() {
        install();
        install();
        assert!(check().is_ok());
    }
}
