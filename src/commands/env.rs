use clap::Args;
use serde::Serialize;

use dumpctl::env::{explain_variables_for_command, DumpCommand, Var};
use dumpctl::filter::PatternFilter;
use dumpctl::Error;

use super::CmdResult;

#[derive(Args)]
pub struct EnvArgs {
    /// Dump command: create, restore, versions, cleanup, assets, transfer,
    /// mirror, backup or backup-restore
    command: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvOutput {
    command: DumpCommand,
    variables: Vec<VariableOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    filters: Vec<FilterOutput>,
    help: String,
}

#[derive(Serialize)]
pub struct VariableOutput {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutput {
    variable: &'static str,
    transparent: bool,
    inverted: bool,
    values: Vec<String>,
}

impl FilterOutput {
    fn new(var: Var, filter: PatternFilter) -> Self {
        Self {
            variable: var.canonical_name(),
            transparent: filter.is_transparent(),
            inverted: filter.is_inverted(),
            values: filter.values().to_vec(),
        }
    }
}

pub fn run(args: EnvArgs, global: &crate::commands::GlobalArgs) -> CmdResult<EnvOutput> {
    let command = DumpCommand::from_name(&args.command).ok_or_else(|| {
        Error::validation_invalid_argument(
            "command",
            format!("Unknown dump command '{}'", args.command),
            Some(args.command.clone()),
            Some(
                DumpCommand::ALL
                    .iter()
                    .map(|c| c.as_str().replace('_', "-"))
                    .collect(),
            ),
        )
    })?;
    let env = global.dump_env()?;

    let variables = env
        .for_command(command)
        .into_iter()
        .map(|(name, value)| VariableOutput { name, value })
        .collect();

    let filters = command
        .variables()
        .iter()
        .filter_map(|var| match var {
            Var::Tables | Var::RestoreTables => Some(FilterOutput::new(*var, env.filter(*var))),
            Var::Assets | Var::RestoreAssets => {
                Some(FilterOutput::new(*var, env.asset_filter(*var)))
            }
            _ => None,
        })
        .collect();

    Ok((
        EnvOutput {
            command,
            variables,
            filters,
            help: explain_variables_for_command(command),
        },
        0,
    ))
}
