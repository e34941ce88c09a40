use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use dxshim_common::ShimConfig;
use dxshim_version::PROFILES;
use dxshim_wndproc::{thunk, ThunkArch};

#[derive(Parser, Debug)]
#[command(name = "dxshim", version, about = "Inspect dxshim configuration and hook internals")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a config file and print the settings the shim would use
    Check {
        /// Path to a dxshim.toml
        config: PathBuf,
    },
    /// List the Windows version profiles `compat.win_version_lie` accepts
    Profiles,
    /// Print the trampoline bytes generated for a hooked window
    Thunk {
        /// Target architecture: x86 or x64
        #[arg(long, default_value_t = ThunkArch::native())]
        arch: ThunkArch,
        /// Hook record address passed as the extra argument
        #[arg(long, value_parser = parse_address)]
        context: u64,
        /// Address of the function the trampoline calls
        #[arg(long, value_parser = parse_address)]
        target: u64,
    },
}

/// Accepts `0x`-prefixed hex or plain decimal
fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim().replace('_', "");
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => check(&config),
        Command::Profiles => {
            profiles();
            Ok(())
        }
        Command::Thunk { arch, context, target } => dump_thunk(arch, context, target),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let mut config =
        ShimConfig::load(path).with_context(|| format!("Config check failed for {}", path.display()))?;
    config.apply_env_overrides();
    info!("Loaded {}", path.display());

    if let Some(name) = &config.compat.win_version_lie {
        dxshim_version::ActiveLie::resolve(name, config.compat.win_version_lie_sp)
            .context("compat.win_version_lie")?;
    }

    println!("# {} is valid", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn profiles() {
    for profile in PROFILES.iter() {
        println!("{}", profile);
    }
}

fn dump_thunk(arch: ThunkArch, context: u64, target: u64) -> anyhow::Result<()> {
    let code = thunk::encode(arch, context, target)?;
    println!("; {} trampoline, {} bytes", arch, code.len());
    println!("{}", thunk::hex_dump(&code));
    Ok(())
}
