// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! UFTP FUSE Host
//!
//! Mounts a remote directory served by a UFTP daemon using libfuse.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use uftp_fuse_host::{
    Credentials, MountTarget, UftpFs, establish_session, load_config, validate_session,
};
use uftp_logging::{CliLogLevel, CliLoggingArgs};

#[derive(Parser)]
#[command(name = "uftp-fuse-host", version, about = "Mount a UFTP session as a local filesystem")]
struct Args {
    /// `host:port` of a UFTP daemon, or an auth target
    /// `[https://]host:port/rest/auth/SITE:/base/dir`
    target: String,

    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// One-time password for a direct daemon target
    #[arg(short = 'P', long, env = "UFTP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// User name for the auth endpoint
    #[arg(long, env = "UFTP_USER")]
    user: Option<String>,

    /// Password for the auth endpoint
    #[arg(long, env = "UFTP_AUTH_PASSWORD", hide_env_values = true)]
    auth_password: Option<String>,

    /// Bearer token for the auth endpoint (`@file` reads a file, `@@VAR` an environment variable)
    #[arg(long, env = "UFTP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    /// Report chmod as unsupported instead of sending MFF
    #[arg(long)]
    no_chmod: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;

    let default_level = if args.debug { CliLogLevel::Debug } else { CliLogLevel::Info };
    args.logging.clone().or(config.logging.clone()).init("uftp-fuse-host", default_level)?;

    info!("Starting UFTP FUSE host");
    info!("Mount point: {}", args.mount_point.display());

    let target: MountTarget = args
        .target
        .parse()
        .with_context(|| format!("invalid target {:?}", args.target))?;

    config.allow_other |= args.allow_other;
    config.auto_unmount |= args.auto_unmount;
    if args.no_chmod {
        config.chmod_via_mode_command = false;
    }
    info!("Configuration loaded: {:?}", config);

    let credentials = Credentials {
        password: args.password,
        user: args.user,
        auth_password: args.auth_password,
        token: args.token,
    };
    let descriptor = establish_session(&target, &credentials)?;
    validate_session(&descriptor)?;

    let filesystem = UftpFs::new(descriptor, config.clone());

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let options = uftp_fuse_host::mount::mount_options(&config);
        let adapter = uftp_fuse_host::adapter::UftpFuse::new(filesystem, config);

        info!("Mounting {} at {}", target, args.mount_point.display());
        let session = fuser::spawn_mount2(adapter, &args.mount_point, &options)
            .with_context(|| format!("mounting at {}", args.mount_point.display()))?;
        info!("UFTP FUSE host mounted; blocking until unmount");
        session.join();
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        tracing::warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("UFTP session for {} validated", target);
        info!("To enable FUSE support, compile with: cargo build --features fuse");
        drop(filesystem);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn cli_parses_direct_mount() {
        let args = Args::try_parse_from([
            "uftp-fuse-host",
            "-P",
            "secret",
            "--no-chmod",
            "--log-level",
            "debug",
            "localhost:64434",
            "/mnt/uftp",
        ])
        .unwrap();
        assert_eq!(args.target, "localhost:64434");
        assert_eq!(args.mount_point, PathBuf::from("/mnt/uftp"));
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert!(args.no_chmod);
        assert_eq!(args.logging.log_level, Some(CliLogLevel::Debug));
    }
}
