//! nebula-nursery - Interactive provisioning for Nebula mesh-VPN identities
//!
//! An interactive tool that grows a Nebula overlay network one identity at a
//! time: it creates the certificate authority, keeps the CA key-pair
//! encrypted at rest in a vault whose key only the operator holds, signs
//! per-node certificates with the external `nebula-cert` binary, and hands
//! each node its bundle through a token-gated, one-shot download exposed via
//! a temporary public tunnel.
//!
//! # Workflow
//!
//! ```text
//! first run            later runs
//! ---------            ----------
//! create CA            open vault (operator key)
//! seal vault    ──►    sign node
//! confirm key          package bundle
//! persist vault        serve one download, then clean up
//! ```
//!
//! # Security model
//!
//! - The CA private key is never persisted in the clear. It exists in
//!   plaintext only in memory and, transiently, inside a temporary
//!   directory scoped to the signing invocation.
//! - The vault is AES-256-GCM, so a wrong key or corrupted file is always
//!   detected instead of producing garbage.
//! - The vault key is shown to the operator exactly once and must be typed
//!   back before the vault is written; the tool itself never stores it.
//! - The node bundle download is gated by a single random token and marked
//!   consumed after the first successful retrieval.
//!
//! # Modules
//!
//! - [`session`]: run sequencing and mode selection
//! - [`vault`]: authenticated encryption of the CA key-pair archive
//! - [`signer`]: orchestration of the external signing binary
//! - [`identity`]: node identity and lighthouse collection
//! - [`server`]: ephemeral token-gated distribution server
//! - [`tunnel`]: public exposure of the distribution server
//! - [`janitor`]: workspace artifact cleanup on every exit path
//! - [`interrupt`]: Ctrl-C handling for the phases before serving starts

pub mod archive;
pub mod configs;
pub mod error;
pub mod identity;
pub mod interrupt;
pub mod janitor;
pub mod prompts;
pub mod server;
pub mod session;
pub mod signer;
pub mod tunnel;
pub mod vault;

pub use error::{NurseryError, Result};
