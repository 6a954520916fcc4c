use clap::{Parser, Subcommand};

use dumpctl::env::{explain_variables_for_command, DumpCommand};

mod commands;
mod output;

use commands::{backup, env, hook, local, mirror, remote, target, GlobalArgs, TargetArg};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dumpctl")]
#[command(version = VERSION)]
#[command(about = "Create, transfer and restore database dumps locally and on deployment targets")]
struct Cli {
    /// Override a dump variable, e.g. --set TAGS=nightly (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Comma separated hosts to run on; prefix with '-' to exclude instead
    #[arg(long, global = true, env = "HOSTS", allow_hyphen_values = true)]
    hosts: Option<String>,

    /// Comma separated roles to run on; prefix with '-' to exclude instead
    #[arg(long, global = true, env = "ROLES", allow_hyphen_values = true)]
    roles: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump tasks on the local machine
    Local(local::LocalArgs),
    /// Dump tasks on a target's db server
    Remote(remote::RemoteArgs),
    /// Copy the database between local and a target
    Mirror(mirror::MirrorArgs),
    /// Back up a target's database locally, or restore such a backup
    Backup(backup::BackupArgs),
    /// Shorthand for `local upload`
    #[command(after_help = explain_variables_for_command(DumpCommand::Transfer))]
    Upload(TargetArg),
    /// Shorthand for `remote download`
    #[command(after_help = explain_variables_for_command(DumpCommand::Transfer))]
    Download(TargetArg),
    /// Deployment hooks
    Hook(hook::HookArgs),
    /// Show the dump variables a command would receive
    Env(env::EnvArgs),
    /// Manage deployment targets
    #[command(visible_alias = "targets")]
    Target(target::TargetArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        overrides: cli.set,
        hosts: cli.hosts,
        roles: cli.roles,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
