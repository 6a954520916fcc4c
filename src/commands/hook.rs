use clap::{Args, Subcommand};

use dumpctl::executor::{LocalRunner, RemoteRunner};
use dumpctl::tasks::{Session, TaskReport};

use super::CmdResult;

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    command: HookCommand,
}

#[derive(Subcommand)]
enum HookCommand {
    /// Link <release>/dump to the shared dump folder (run after a deploy)
    LinkDumpFolder {
        /// Target ID
        target_id: String,
        /// Release directory (default: the target's current path)
        #[arg(long)]
        release_path: Option<String>,
    },
}

pub fn run(args: HookArgs, global: &crate::commands::GlobalArgs) -> CmdResult<TaskReport> {
    match args.command {
        HookCommand::LinkDumpFolder {
            target_id,
            release_path,
        } => {
            let env = global.dump_env()?;
            let target = dumpctl::target::load(&target_id)?;
            let local = LocalRunner::current_dir()?;
            let root = local.dir().to_path_buf();
            let remote = RemoteRunner::for_target(&target, &global.selection(), &env)?;

            let mut session = Session::new(&target, local, remote, root);
            let report = session.run_link_dump_folder(release_path.as_deref())?;
            Ok((report, 0))
        }
    }
}
