//! Interactive prompt front-end: a strictly ordered Q&A over stdin.
//!
//! All operator input is solicited here. Validators are typed functions from
//! [`crate::identity`] and [`crate::signer`]; malformed input re-prompts and
//! never escapes this module. Declined confirmation summaries surface as
//! [`NurseryError::ConfirmationDeclined`].

use crate::configs::SignerConfig;
use crate::error::{NurseryError, Result};
use crate::identity::{self, LighthouseEndpoint, NodeIdentity, NodeIdentityBuilder};
use crate::signer::{duration_hours, SignerTool};
use crate::vault::VaultKey;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use std::path::Path;
use std::time::Duration;

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt for the signer executable location. The capability probe is the
/// validator, so a missing or broken binary re-prompts instead of failing
/// mid-operation.
pub fn signer_tool(config: &SignerConfig) -> Result<SignerTool> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let executable: String = Input::with_theme(&theme())
        .with_prompt("Location of the nebula-cert executable")
        .default(config.executable.clone())
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            SignerTool::new(input, timeout)
                .probe()
                .map_err(|_| "Executable test failed, check you have typed the path correctly.".to_string())
        })
        .interact_text()?;
    Ok(SignerTool::new(executable, timeout))
}

/// Prompt for CA name and validity, then require confirmation of the
/// summary before anything is created.
pub fn ca_details() -> Result<(String, u32)> {
    let name: String = Input::with_theme(&theme())
        .with_prompt("Name of the new CA")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("CA name must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let validity_days: u32 = Input::with_theme(&theme())
        .with_prompt("Duration of the CA in days")
        .default(3650)
        .validate_with(|days: &u32| -> std::result::Result<(), &str> {
            if *days > 0 {
                Ok(())
            } else {
                Err("duration must be a positive number of days")
            }
        })
        .interact_text()?;

    let summary = format!(
        "You entered the following details:\n\n  CA name:     {}\n  CA duration: {} days ({})\n\nIs this correct?",
        name.trim(),
        validity_days,
        duration_hours(validity_days),
    );
    confirm_or_abort(&summary)?;

    Ok((name.trim().to_string(), validity_days))
}

/// Show the freshly generated vault key exactly once and collect the
/// operator's re-typed copy. The caller checks it against the real key
/// before anything is written to disk.
pub fn vault_key_confirmation(key: &VaultKey) -> Result<String> {
    println!();
    println!(
        "{}",
        style("The CA key-pair will be encrypted with this key:").bold()
    );
    println!();
    println!("    {}", style(key.to_hex()).cyan().bold());
    println!();
    println!("Store it somewhere safe. It is shown only once and is the only way");
    println!("to sign further nodes with this CA.");
    println!();

    let candidate = Password::with_theme(&theme())
        .with_prompt("Re-enter the key to confirm you captured it")
        .interact()?;
    Ok(candidate)
}

/// Prompt for the vault key when opening an existing vault. Malformed hex
/// re-prompts; whether the key is the right one is only known at decryption.
pub fn vault_key_entry() -> Result<VaultKey> {
    loop {
        let candidate = Password::with_theme(&theme())
            .with_prompt("Enter the vault key")
            .interact()?;
        match VaultKey::from_hex(&candidate) {
            Ok(key) => return Ok(key),
            Err(e) => println!("{}", style(e).red()),
        }
    }
}

/// An existing vault forces node-signing mode; give the operator who meant
/// to create a fresh CA a way out.
pub fn confirm_existing_vault(vault_path: &Path) -> Result<()> {
    println!(
        "Found an existing vault at {}; continuing will sign a new node with that CA.",
        style(vault_path.display()).bold()
    );
    let proceed = Confirm::with_theme(&theme())
        .with_prompt("Continue?")
        .default(true)
        .interact()?;
    if !proceed {
        println!(
            "To create a fresh CA, remove {} manually and re-run. The tool never overwrites an existing vault.",
            vault_path.display()
        );
        return Err(NurseryError::ConfirmationDeclined);
    }
    Ok(())
}

/// Full node wizard: identity fields, the lighthouse collection loop, and
/// the final confirmation summary.
pub fn node_wizard() -> Result<NodeIdentity> {
    let is_lighthouse = Confirm::with_theme(&theme())
        .with_prompt("Is this a lighthouse node?")
        .default(false)
        .interact()?;

    let name: String = Input::with_theme(&theme())
        .with_prompt("Name of the node")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("node name must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let overlay_ip: String = Input::with_theme(&theme())
        .with_prompt("Nebula IP address for this node (IPv4 with subnet, e.g. 10.10.0.5/24)")
        .validate_with(|input: &String| identity::validate_ipv4_subnet(input))
        .interact_text()?;

    let groups: String = Input::with_theme(&theme())
        .with_prompt("Comma-separated list of groups for this node (optional)")
        .allow_empty(true)
        .interact_text()?;

    let mut builder = NodeIdentityBuilder::new(&name, &overlay_ip, &groups, is_lighthouse)?;

    if is_lighthouse {
        let public_host: String = Input::with_theme(&theme())
            .with_prompt("Public IP/DNS address of this lighthouse")
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                if input.trim().is_empty() {
                    Err("public address must not be empty")
                } else {
                    Ok(())
                }
            })
            .interact_text()?;
        let public_port: u16 = Input::with_theme(&theme())
            .with_prompt("Public port of this lighthouse")
            .default(4242)
            .interact_text()?;
        builder.seed_self_lighthouse(&public_host, public_port);
    }

    loop {
        if builder.lighthouse_count() == 0 {
            println!("You need at least one lighthouse for your node to connect to.");
        } else {
            let add_another = Confirm::with_theme(&theme())
                .with_prompt("Do you want to add another lighthouse?")
                .default(false)
                .interact()?;
            if !add_another {
                break;
            }
        }
        builder.add_lighthouse(prompt_lighthouse()?);
    }

    let summary = node_summary(&builder);
    confirm_or_abort(&summary)?;

    builder.finish()
}

fn prompt_lighthouse() -> Result<LighthouseEndpoint> {
    let overlay_ip: String = Input::with_theme(&theme())
        .with_prompt("Nebula IP of the lighthouse node")
        .validate_with(|input: &String| identity::validate_ipv4(input))
        .interact_text()?;
    let public_host: String = Input::with_theme(&theme())
        .with_prompt("Public IP/DNS address of the lighthouse node")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("public address must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    let public_port: u16 = Input::with_theme(&theme())
        .with_prompt("Public port of the lighthouse node")
        .default(4242)
        .interact_text()?;
    Ok(LighthouseEndpoint {
        overlay_ip: overlay_ip.trim().to_string(),
        public_host: public_host.trim().to_string(),
        public_port,
    })
}

fn node_summary(builder: &NodeIdentityBuilder) -> String {
    let mut summary = String::from("You entered the following details:\n\n");
    summary.push_str(&format!("  Node name: {}\n", builder.name()));
    summary.push_str(&format!("  Nebula IP: {}\n", builder.overlay_ip()));
    if !builder.groups().is_empty() {
        summary.push_str(&format!("  Groups:    {}\n", builder.groups().join(", ")));
    }
    summary.push('\n');
    for lighthouse in builder.lighthouses() {
        summary.push_str(&format!(
            "  Lighthouse: {} via {}:{}\n",
            lighthouse.overlay_ip, lighthouse.public_host, lighthouse.public_port
        ));
    }
    summary.push_str("\nIs this correct?");
    summary
}

fn confirm_or_abort(summary: &str) -> Result<()> {
    let confirmed = Confirm::with_theme(&theme())
        .with_prompt(summary)
        .interact()?;
    if !confirmed {
        return Err(NurseryError::ConfirmationDeclined);
    }
    Ok(())
}
