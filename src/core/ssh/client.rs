use crate::error::{Error, Result};
use crate::shell;
use crate::target::Server;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct SshClient {
    pub server_id: String,
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code: -1,
        }
    }

    fn from_output(out: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }
}

impl SshClient {
    pub fn from_server(server: &Server) -> Result<Self> {
        let missing = server.missing_fields();
        if !missing.is_empty() {
            return Err(Error::ssh_server_invalid(server.id.clone(), missing));
        }

        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        server.id.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.host);
        if is_local {
            log_status!("ssh", "Server '{}' is localhost, using local execution", server.id);
        }

        Ok(Self {
            server_id: server.id.clone(),
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            is_local,
        })
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Connection options shared by ssh, scp and rsync's `-e`.
    ///
    /// `port_flag` is `-p` for ssh and `-P` for scp.
    pub fn connection_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push(port_flag.to_string());
            args.push(self.port.to_string());
        }

        // Non-interactive: fail instead of prompting, and don't hang on stalled links
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.connection_args("-p");
        args.push(self.destination());
        args.push(command.to_string());
        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, None, 3, is_transient_ssh_error)
    }

    /// Run a command that must not run twice, such as a dump create or restore.
    ///
    /// Retried only when ssh never reached the server.
    pub fn execute_mutating(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, None, 3, is_connect_failure)
    }

    /// Stream a local file into `remote_path` over the SSH connection.
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.execute_with_retry(&remote_command, Some(local_path), 3, is_transient_ssh_error)
    }

    /// Stream `remote_path` into a local file over the SSH connection.
    ///
    /// `local_path` only appears once the whole file has arrived.
    pub fn download_file(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
        download_into(local_path, |partial| self.stream_to(remote_path, partial))
    }

    fn stream_to(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
        let remote_command = format!("cat {}", shell::quote_path(remote_path));

        if self.is_local {
            let local_cmd = format!(
                "{} > {}",
                remote_command,
                shell::quote_path(&local_path.to_string_lossy())
            );
            return execute_local_command(&local_cmd, None);
        }

        let file = match std::fs::File::create(local_path) {
            Ok(file) => file,
            Err(e) => {
                return CommandOutput::failed(format!(
                    "Failed to create {}: {}",
                    local_path.display(),
                    e
                ))
            }
        };

        // Dumps are binary; stdout goes straight to the file
        let mut cmd = Command::new("ssh");
        cmd.args(self.build_ssh_args(&remote_command))
            .stdin(Stdio::null())
            .stdout(file);

        match cmd.output() {
            Ok(out) => CommandOutput::from_output(out),
            Err(e) => CommandOutput::failed(format!("SSH error: {}", e)),
        }
    }

    fn execute_with_retry(
        &self,
        command: &str,
        stdin_file: Option<&Path>,
        max_attempts: u32,
        retryable: fn(&CommandOutput) -> bool,
    ) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        let mut result = self.execute_once(command, stdin_file);
        for attempt in 1..max_attempts {
            // Only retry on transient connection errors, not command failures
            if result.success || !retryable(&result) {
                break;
            }

            let delay = backoff_secs.get(attempt as usize).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            result = self.execute_once(command, stdin_file);
        }

        result
    }

    fn execute_once(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput {
        if self.is_local {
            if let Some(stdin_file_path) = stdin_file {
                let local_cmd = format!(
                    "cat {} | {}",
                    shell::quote_path(&stdin_file_path.to_string_lossy()),
                    command
                );
                return execute_local_command(&local_cmd, None);
            }
            return execute_local_command(command, None);
        }

        let mut cmd = Command::new("ssh");
        cmd.args(self.build_ssh_args(command));

        if let Some(stdin_file_path) = stdin_file {
            match std::fs::File::open(stdin_file_path) {
                Ok(file) => {
                    cmd.stdin(file);
                }
                Err(err) => {
                    return CommandOutput::failed(format!("Failed to open stdin file: {}", err));
                }
            }
        } else {
            cmd.stdin(Stdio::null());
        }

        match cmd.output() {
            Ok(out) => CommandOutput::from_output(out),
            Err(e) => CommandOutput::failed(format!("SSH error: {}", e)),
        }
    }
}

/// Write a download through `<file>.part`, renamed over `local_path` on success.
///
/// A failed or interrupted copy leaves neither file behind.
pub fn download_into(
    local_path: &Path,
    fetch: impl FnOnce(&Path) -> CommandOutput,
) -> CommandOutput {
    let mut partial = local_path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let out = fetch(&partial);
    if !out.success {
        let _ = std::fs::remove_file(&partial);
        return out;
    }

    if let Err(e) = std::fs::rename(&partial, local_path) {
        let _ = std::fs::remove_file(&partial);
        return CommandOutput::failed(format!(
            "Failed to move download into {}: {}",
            local_path.display(),
            e
        ));
    }
    out
}

/// Run a shell command locally, optionally from `current_dir`.
pub fn execute_local_command(command: &str, current_dir: Option<&Path>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    match cmd.output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::failed(format!("Command error: {}", e)),
    }
}

/// Run a program directly (no shell) and capture its output.
pub fn execute_program(program: &str, args: &[String]) -> CommandOutput {
    match Command::new(program).args(args).stdin(Stdio::null()).output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::failed(format!("Failed to run {}: {}", program, e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if ssh failed while connecting, before the remote command could start.
fn is_connect_failure(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    let connect_patterns = [
        "connection refused",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "ssh_exchange_identification",
        "kex_exchange_identification",
    ];

    output.exit_code == 255 && connect_patterns.iter().any(|p| stderr.contains(p))
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, port: u16) -> Server {
        Server {
            id: "db1".to_string(),
            host: host.to_string(),
            user: "deploy".to_string(),
            port,
            identity_file: None,
            roles: vec!["db".to_string()],
            primary: true,
        }
    }

    #[test]
    fn default_port_is_omitted() {
        let client = SshClient::from_server(&server("db.example.com", 22)).unwrap();
        let args = client.build_ssh_args("uptime");
        assert!(!args.contains(&"-p".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@db.example.com");
        assert_eq!(args[args.len() - 1], "uptime");
        assert!(args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn custom_port_uses_given_flag() {
        let client = SshClient::from_server(&server("db.example.com", 2222)).unwrap();
        let scp = client.connection_args("-P");
        assert_eq!(&scp[0..2], &["-P".to_string(), "2222".to_string()]);
    }

    #[test]
    fn missing_identity_file_is_an_error() {
        let mut srv = server("db.example.com", 22);
        srv.identity_file = Some("/nonexistent/id_ed25519".to_string());
        let err = SshClient::from_server(&srv).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn blank_user_is_invalid() {
        let mut srv = server("db.example.com", 22);
        srv.user = String::new();
        let err = SshClient::from_server(&srv).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SshServerInvalid);
    }

    #[test]
    fn localhost_runs_locally() {
        let client = SshClient::from_server(&server("localhost", 22)).unwrap();
        assert!(client.is_local);
        assert!(!SshClient::from_server(&server("10.0.0.5", 22)).unwrap().is_local);
    }

    #[test]
    fn connection_failures_are_transient() {
        let refused = CommandOutput {
            stderr: "ssh: connect to host db port 22: Connection refused".to_string(),
            exit_code: 255,
            ..CommandOutput::default()
        };
        assert!(is_transient_ssh_error(&refused));

        let failed_command = CommandOutput {
            stderr: "rake aborted!".to_string(),
            exit_code: 1,
            ..CommandOutput::default()
        };
        assert!(!is_transient_ssh_error(&failed_command));
    }

    #[test]
    fn dropped_sessions_are_not_connect_failures() {
        let refused = CommandOutput {
            stderr: "ssh: connect to host db port 22: Connection refused".to_string(),
            exit_code: 255,
            ..CommandOutput::default()
        };
        assert!(is_connect_failure(&refused));

        let dropped = CommandOutput {
            stderr: "Connection to db closed by remote host.".to_string(),
            exit_code: 255,
            ..CommandOutput::default()
        };
        assert!(is_transient_ssh_error(&dropped));
        assert!(!is_connect_failure(&dropped));

        let silent = CommandOutput {
            exit_code: 255,
            ..CommandOutput::default()
        };
        assert!(!is_connect_failure(&silent));
    }

    #[cfg(unix)]
    #[test]
    fn failed_local_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("a.tgz");
        let client = SshClient::from_server(&server("localhost", 22)).unwrap();

        let out = client.download_file("/nonexistent/dumpctl/a.tgz", &local_path);
        assert!(!out.success);
        assert!(!local_path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn failed_ssh_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("a.tgz");
        let client = SshClient::from_server(&server("nonexistent.invalid", 22)).unwrap();

        let out = client.download_file("/srv/app/shared/dump/a.tgz", &local_path);
        assert!(!out.success);
        assert!(!local_path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn local_download_lands_under_final_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("remote.tgz");
        std::fs::write(&source, "dump").unwrap();
        let local_path = dir.path().join("a.tgz");
        let client = SshClient::from_server(&server("127.0.0.1", 22)).unwrap();

        let out = client.download_file(&source.to_string_lossy(), &local_path);
        assert!(out.success, "{}", out.stderr);
        assert_eq!(std::fs::read_to_string(&local_path).unwrap(), "dump");
        assert!(!dir.path().join("a.tgz.part").exists());
    }

    #[cfg(unix)]
    #[test]
    fn local_command_runs_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = execute_local_command("pwd", Some(dir.path()));
        assert!(out.success);
        let printed = std::path::PathBuf::from(out.stdout.trim());
        assert_eq!(
            printed.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
