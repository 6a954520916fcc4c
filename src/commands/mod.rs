use clap::Args;

use dumpctl::env::{parse_overrides, DumpEnv};
use dumpctl::executor::{LocalRunner, NoRemote, RemoteRunner, Runner, Transfer};
use dumpctl::target::{HostSelection, Target};
use dumpctl::tasks::{Session, Task, TaskReport};

pub type CmdResult<T> = dumpctl::Result<(T, i32)>;

/// Options shared by every subcommand.
pub(crate) struct GlobalArgs {
    /// Raw `KEY=VALUE` dump variable overrides.
    pub(crate) overrides: Vec<String>,
    pub(crate) hosts: Option<String>,
    pub(crate) roles: Option<String>,
}

impl GlobalArgs {
    /// Process environment with `--set` overrides applied on top.
    pub(crate) fn dump_env(&self) -> dumpctl::Result<DumpEnv> {
        let overrides = parse_overrides(&self.overrides)?;
        Ok(DumpEnv::from_process_with(&overrides))
    }

    pub(crate) fn selection(&self) -> HostSelection {
        HostSelection::new(self.hosts.as_deref(), self.roles.as_deref())
    }
}

/// Positional target argument shared by task subcommands.
#[derive(Args, Debug)]
pub struct TargetArg {
    /// Target ID
    pub target_id: String,
}

/// Run `task` against a configured target.
pub(crate) fn run_task(target_id: &str, task: Task, global: &GlobalArgs) -> CmdResult<TaskReport> {
    let env = global.dump_env()?;
    let target = dumpctl::target::load(target_id)?;
    let local = LocalRunner::current_dir()?;

    let report = if task.is_local_only() {
        run_session(&target, local, NoRemote, task, &env)?
    } else {
        let remote = RemoteRunner::for_target(&target, &global.selection(), &env)?;
        run_session(&target, local, remote, task, &env)?
    };
    Ok((report, 0))
}

fn run_session<R: Runner + Transfer>(
    target: &Target,
    local: LocalRunner,
    remote: R,
    task: Task,
    env: &DumpEnv,
) -> dumpctl::Result<TaskReport> {
    let root = local.dir().to_path_buf();
    Session::new(target, local, remote, root).run(task, env)
}

pub mod backup;
pub mod env;
pub mod hook;
pub mod local;
pub mod mirror;
pub mod remote;
pub mod target;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (dumpctl::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Local(args) => dispatch!(args, global, local),
        crate::Commands::Remote(args) => dispatch!(args, global, remote),
        crate::Commands::Mirror(args) => dispatch!(args, global, mirror),
        crate::Commands::Backup(args) => dispatch!(args, global, backup),
        crate::Commands::Hook(args) => dispatch!(args, global, hook),
        crate::Commands::Env(args) => dispatch!(args, global, env),
        crate::Commands::Target(args) => dispatch!(args, global, target),

        // Shorthands
        crate::Commands::Upload(args) => crate::output::map_cmd_result_to_json(run_task(
            &args.target_id,
            Task::LocalUpload,
            global,
        )),
        crate::Commands::Download(args) => crate::output::map_cmd_result_to_json(run_task(
            &args.target_id,
            Task::RemoteDownload,
            global,
        )),
    }
}
