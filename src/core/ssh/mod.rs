mod client;

pub use client::{download_into, execute_local_command, execute_program, is_local_host, CommandOutput, SshClient};
