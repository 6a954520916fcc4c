use clap::{Args, Subcommand};

use dumpctl::env::{explain_variables_for_command, DumpCommand};
use dumpctl::tasks::{Task, TaskReport};

use super::{run_task, CmdResult, TargetArg};

#[derive(Args)]
pub struct LocalArgs {
    #[command(subcommand)]
    command: LocalCommand,
}

#[derive(Subcommand)]
enum LocalCommand {
    /// Create local dump
    #[command(after_help = explain_variables_for_command(DumpCommand::Create))]
    Create(TargetArg),
    /// Restore local dump
    #[command(after_help = explain_variables_for_command(DumpCommand::Restore))]
    Restore(TargetArg),
    /// Versions of local dumps
    #[command(after_help = explain_variables_for_command(DumpCommand::Versions))]
    Versions(TargetArg),
    /// Cleanup local dumps
    #[command(after_help = explain_variables_for_command(DumpCommand::Cleanup))]
    Cleanup(TargetArg),
    /// Upload newest matching local dump to the target's db server
    #[command(after_help = explain_variables_for_command(DumpCommand::Transfer))]
    Upload(TargetArg),
}

pub fn run(args: LocalArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TaskReport> {
    let (task, target) = match args.command {
        LocalCommand::Create(t) => (Task::LocalCreate, t),
        LocalCommand::Restore(t) => (Task::LocalRestore, t),
        LocalCommand::Versions(t) => (Task::LocalVersions, t),
        LocalCommand::Cleanup(t) => (Task::LocalCleanup, t),
        LocalCommand::Upload(t) => (Task::LocalUpload, t),
    };
    run_task(&target.target_id, task, global)
}
