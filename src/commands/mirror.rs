use clap::{Args, Subcommand};

use dumpctl::env::{explain_variables_for_command, DumpCommand};
use dumpctl::tasks::{Task, TaskReport};

use super::{run_task, CmdResult, TargetArg};

#[derive(Args)]
pub struct MirrorArgs {
    #[command(subcommand)]
    command: MirrorCommand,
}

#[derive(Subcommand)]
enum MirrorCommand {
    /// Create local dump, upload it and restore it on the target
    #[command(after_help = explain_variables_for_command(DumpCommand::Mirror))]
    Up(TargetArg),
    /// Create dump on the target, download it and restore it locally
    #[command(after_help = explain_variables_for_command(DumpCommand::Mirror))]
    Down(TargetArg),
}

pub fn run(args: MirrorArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TaskReport> {
    match args.command {
        MirrorCommand::Up(t) => run_task(&t.target_id, Task::MirrorUp, global),
        MirrorCommand::Down(t) => run_task(&t.target_id, Task::MirrorDown, global),
    }
}
