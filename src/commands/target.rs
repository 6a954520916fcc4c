use clap::{Args, Subcommand};
use serde::Serialize;

use dumpctl::target::{self, Target};

use super::CmdResult;

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Vec<Target>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<Vec<String>>,
}

#[derive(Args)]
pub struct TargetArgs {
    #[command(subcommand)]
    command: TargetCommand,
}

#[derive(Subcommand)]
enum TargetCommand {
    /// List configured targets
    List,
    /// Display target configuration
    Show {
        /// Target ID
        target_id: String,
    },
    /// Register a new target
    Create {
        /// JSON spec with an "id" field (supports @file and - for stdin)
        spec: String,
    },
    /// Remove a target configuration
    Delete {
        /// Target ID
        target_id: String,
    },
}

pub fn run(args: TargetArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<TargetOutput> {
    match args.command {
        TargetCommand::List => Ok((
            TargetOutput {
                command: "target.list".to_string(),
                targets: Some(target::list()?),
                ..Default::default()
            },
            0,
        )),
        TargetCommand::Show { target_id } => {
            let target = target::load(&target_id)?;
            Ok((
                TargetOutput {
                    command: "target.show".to_string(),
                    target_id: Some(target_id),
                    target: Some(target),
                    ..Default::default()
                },
                0,
            ))
        }
        TargetCommand::Create { spec } => {
            let target = target::create(&spec)?;
            Ok((
                TargetOutput {
                    command: "target.create".to_string(),
                    target_id: Some(target.id.clone()),
                    target: Some(target),
                    ..Default::default()
                },
                0,
            ))
        }
        TargetCommand::Delete { target_id } => {
            target::delete(&target_id)?;
            Ok((
                TargetOutput {
                    command: "target.delete".to_string(),
                    target_id: Some(target_id.clone()),
                    deleted: Some(vec![target_id]),
                    ..Default::default()
                },
                0,
            ))
        }
    }
}
