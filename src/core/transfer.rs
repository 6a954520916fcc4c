//! File transfer between the local dump directory and a remote server.

use serde::Serialize;
use std::path::Path;

use crate::env::{DumpEnv, Var};
use crate::error::{Error, Result};
use crate::ssh::{download_into, execute_local_command, execute_program, CommandOutput, SshClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferVia {
    Rsync,
    Scp,
    /// Stream through `ssh cat`.
    Ssh,
}

impl TransferVia {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferVia::Rsync => "rsync",
            TransferVia::Scp => "scp",
            TransferVia::Ssh => "ssh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "rsync" => Some(TransferVia::Rsync),
            "scp" => Some(TransferVia::Scp),
            "ssh" | "sftp" => Some(TransferVia::Ssh),
            _ => None,
        }
    }

    /// `TRANSFER_VIA` when set, else rsync when available, else scp.
    pub fn resolve(env: &DumpEnv, rsync_available: impl FnOnce() -> bool) -> Result<Self> {
        match env.get(Var::TransferVia) {
            Some(value) => Self::parse(value).ok_or_else(|| {
                Error::validation_invalid_argument(
                    Var::TransferVia.canonical_name(),
                    format!("Unknown transfer method '{}'", value),
                    None,
                    Some(vec!["rsync".to_string(), "scp".to_string(), "ssh".to_string()]),
                )
            }),
            None if rsync_available() => Ok(TransferVia::Rsync),
            None => Ok(TransferVia::Scp),
        }
    }
}

/// Whether `rsync` is on PATH locally.
pub fn got_rsync() -> bool {
    execute_local_command("command -v rsync", None).success
}

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Program and arguments for an rsync or scp copy.
pub fn copy_command(
    client: &SshClient,
    via: TransferVia,
    direction: Direction,
    local_path: &Path,
    remote_path: &str,
) -> (String, Vec<String>) {
    let local = local_path.to_string_lossy().to_string();
    let remote = format!("{}:{}", client.destination(), remote_path);
    let (source, destination) = match direction {
        Direction::Upload => (local, remote),
        Direction::Download => (remote, local),
    };

    match via {
        TransferVia::Rsync => {
            let mut ssh = vec!["ssh".to_string()];
            ssh.extend(client.connection_args("-p"));
            let args = vec![
                "-av".to_string(),
                "--progress".to_string(),
                "-e".to_string(),
                crate::shell::quote_args(&ssh),
                source,
                destination,
            ];
            ("rsync".to_string(), args)
        }
        TransferVia::Scp | TransferVia::Ssh => {
            let mut args = client.connection_args("-P");
            args.push(source);
            args.push(destination);
            ("scp".to_string(), args)
        }
    }
}

/// Copy one file, choosing the mechanism from `via`.
///
/// Downloads land under their final name only once complete.
pub fn copy(
    client: &SshClient,
    via: TransferVia,
    direction: Direction,
    local_path: &Path,
    remote_path: &str,
) -> CommandOutput {
    match direction {
        Direction::Upload => copy_once(client, via, direction, local_path, remote_path),
        Direction::Download if via == TransferVia::Ssh && !client.is_local => {
            client.download_file(remote_path, local_path)
        }
        Direction::Download => download_into(local_path, |partial| {
            copy_once(client, via, direction, partial, remote_path)
        }),
    }
}

fn copy_once(
    client: &SshClient,
    via: TransferVia,
    direction: Direction,
    local_path: &Path,
    remote_path: &str,
) -> CommandOutput {
    if client.is_local {
        let (from, to) = match direction {
            Direction::Upload => (local_path.to_string_lossy().to_string(), remote_path.to_string()),
            Direction::Download => (remote_path.to_string(), local_path.to_string_lossy().to_string()),
        };
        let cmd = format!(
            "cp {} {}",
            crate::shell::quote_path(&from),
            crate::shell::quote_path(&to)
        );
        return execute_local_command(&cmd, None);
    }

    match (via, direction) {
        (TransferVia::Ssh, Direction::Upload) => client.upload_file(local_path, remote_path),
        (TransferVia::Ssh, Direction::Download) => client.download_file(remote_path, local_path),
        _ => {
            let (program, args) = copy_command(client, via, direction, local_path, remote_path);
            execute_program(&program, &args)
        }
    }
}
