//! Interactive entry point. No flags: every input is solicited via prompts.
//!
//! Exit code 0 covers normal completion and operator aborts; only
//! unrecovered signing-tool, decryption, tunnel, or timeout failures exit
//! non-zero.

use anyhow::Context;
use console::style;
use nebula_nursery::configs::AppConfig;
use nebula_nursery::session::Session;
use tracing_subscriber::EnvFilter;

const SPLASH: &str = r"
  _ __   ___| |__  _   _| | __ _        _ __  _   _ _ __ ___  ___ _ __ _   _
 | '_ \ / _ \ '_ \| | | | |/ _` |_____ | '_ \| | | | '__/ __|/ _ \ '__| | | |
 | | | |  __/ |_) | |_| | | (_| |_____|| | | | |_| | |  \__ \  __/ |  | |_| |
 |_| |_|\___|_.__/ \__,_|_|\__,_|      |_| |_|\__,_|_|  |___/\___|_|   \__, |
                                                                       |___/
";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("{SPLASH}");
    println!("  nebula-nursery v{}\n", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::load().context("failed to load nursery.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e:#}", style("error:").red().bold());
            return 1;
        }
    };

    match Session::new(config).run() {
        Ok(()) => 0,
        Err(e) => {
            let code = e.exit_code();
            if code == 0 {
                println!("\n{e}");
            } else {
                eprintln!("\n{} {e}", style("error:").red().bold());
            }
            code
        }
    }
}
