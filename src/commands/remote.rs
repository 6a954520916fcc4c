use clap::{Args, Subcommand};

use dumpctl::env::{explain_variables_for_command, DumpCommand};
use dumpctl::tasks::{Task, TaskReport};

use super::{run_task, CmdResult, TargetArg};

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    command: RemoteCommand,
}

#[derive(Subcommand)]
enum RemoteCommand {
    /// Create dump on the target's db server
    #[command(after_help = explain_variables_for_command(DumpCommand::Create))]
    Create(TargetArg),
    /// Restore dump on the target's db server
    #[command(after_help = explain_variables_for_command(DumpCommand::Restore))]
    Restore(TargetArg),
    /// Versions of remote dumps
    #[command(after_help = explain_variables_for_command(DumpCommand::Versions))]
    Versions(TargetArg),
    /// Cleanup of remote dumps
    #[command(after_help = explain_variables_for_command(DumpCommand::Cleanup))]
    Cleanup(TargetArg),
    /// Download newest matching remote dump into the local dump dir
    #[command(after_help = explain_variables_for_command(DumpCommand::Transfer))]
    Download(TargetArg),
}

pub fn run(args: RemoteArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TaskReport> {
    let (task, target) = match args.command {
        RemoteCommand::Create(t) => (Task::RemoteCreate, t),
        RemoteCommand::Restore(t) => (Task::RemoteRestore, t),
        RemoteCommand::Versions(t) => (Task::RemoteVersions, t),
        RemoteCommand::Cleanup(t) => (Task::RemoteCleanup, t),
        RemoteCommand::Download(t) => (Task::RemoteDownload, t),
    };
    run_task(&target.target_id, task, global)
}
