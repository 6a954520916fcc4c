// Command execution seams: where dump commands run and how files move.

use std::path::{Path, PathBuf};

use crate::env::DumpEnv;
use crate::error::Result;
use crate::ssh::{execute_local_command, CommandOutput, SshClient};
use crate::target::{HostSelection, Target, DB_ROLE};
use crate::transfer::{self, Direction, TransferVia};

/// Runs shell commands on one side of a dump operation.
pub trait Runner {
    fn run(&self, command: &str) -> CommandOutput;

    /// Run a command that must not be replayed once it may have started.
    fn run_mutating(&self, command: &str) -> CommandOutput {
        self.run(command)
    }

    /// Where commands run: `local` or a server id.
    fn label(&self) -> String;
}

/// Moves dump files between the local machine and a remote server.
pub trait Transfer {
    fn upload(&self, local_path: &Path, remote_path: &str) -> CommandOutput;
    fn download(&self, remote_path: &str, local_path: &Path) -> CommandOutput;

    /// Name of the transfer mechanism, for reports and errors.
    fn method(&self) -> &'static str;
}

/// Runs commands through `sh -c` from a working directory.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    dir: PathBuf,
}

impl LocalRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Runner rooted at the process working directory.
    pub fn current_dir() -> Result<Self> {
        let dir = std::env::current_dir().map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some("resolve working directory".to_string()))
        })?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Runner for LocalRunner {
    fn run(&self, command: &str) -> CommandOutput {
        log_status!("local", "{}", command);
        execute_local_command(command, Some(&self.dir))
    }

    fn label(&self) -> String {
        "local".to_string()
    }
}

/// Runs commands and transfers files on a target's primary db server.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    client: SshClient,
    via: TransferVia,
}

impl RemoteRunner {
    pub fn new(client: SshClient, via: TransferVia) -> Self {
        Self { client, via }
    }

    /// Connect to the primary `db` server among the selected hosts.
    pub fn for_target(target: &Target, selection: &HostSelection, env: &DumpEnv) -> Result<Self> {
        let server = target.primary(DB_ROLE, selection)?;
        let client = SshClient::from_server(server)?;
        let via = TransferVia::resolve(env, transfer::got_rsync)?;
        Ok(Self::new(client, via))
    }

    pub fn client(&self) -> &SshClient {
        &self.client
    }

    pub fn via(&self) -> TransferVia {
        self.via
    }
}

impl Runner for RemoteRunner {
    fn run(&self, command: &str) -> CommandOutput {
        log_status!("remote", "{}: {}", self.client.server_id, command);
        self.client.execute(command)
    }

    fn run_mutating(&self, command: &str) -> CommandOutput {
        log_status!("remote", "{}: {}", self.client.server_id, command);
        self.client.execute_mutating(command)
    }

    fn label(&self) -> String {
        self.client.server_id.clone()
    }
}

impl Transfer for RemoteRunner {
    fn upload(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        log_status!(
            "transfer",
            "Uploading {} to {}:{} via {}",
            local_path.display(),
            self.client.server_id,
            remote_path,
            self.via.as_str()
        );
        transfer::copy(&self.client, self.via, Direction::Upload, local_path, remote_path)
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
        log_status!(
            "transfer",
            "Downloading {}:{} to {} via {}",
            self.client.server_id,
            remote_path,
            local_path.display(),
            self.via.as_str()
        );
        transfer::copy(&self.client, self.via, Direction::Download, local_path, remote_path)
    }

    fn method(&self) -> &'static str {
        self.via.as_str()
    }
}

/// Remote side for tasks that never leave the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl Runner for NoRemote {
    fn run(&self, command: &str) -> CommandOutput {
        CommandOutput::failed(format!("No remote server selected for: {}", command))
    }

    fn label(&self) -> String {
        "none".to_string()
    }
}

impl Transfer for NoRemote {
    fn upload(&self, local_path: &Path, _remote_path: &str) -> CommandOutput {
        CommandOutput::failed(format!("No remote server selected to upload {}", local_path.display()))
    }

    fn download(&self, remote_path: &str, _local_path: &Path) -> CommandOutput {
        CommandOutput::failed(format!("No remote server selected to download {}", remote_path))
    }

    fn method(&self) -> &'static str {
        "none"
    }
}
