use clap::{Args, Subcommand};

use dumpctl::env::{explain_variables_for_command, DumpCommand};
use dumpctl::tasks::{Task, TaskReport};

use super::{run_task, CmdResult, TargetArg};

#[derive(Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    command: BackupCommand,
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Create dump on the target and download it (DESC defaults to 'backup')
    #[command(after_help = explain_variables_for_command(DumpCommand::Backup))]
    Create(TargetArg),
    /// Upload newest local dump tagged backup and restore it on the target
    #[command(after_help = explain_variables_for_command(DumpCommand::BackupRestore))]
    Restore(TargetArg),
}

pub fn run(args: BackupArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TaskReport> {
    match args.command {
        BackupCommand::Create(t) => run_task(&t.target_id, Task::BackupCreate, global),
        BackupCommand::Restore(t) => run_task(&t.target_id, Task::BackupRestore, global),
    }
}
