//! Dump variables carried between tasks.
//!
//! Variables are read once (from the process environment or from explicit
//! pairs) into a [`DumpEnv`] value. Tasks derive new environments from it
//! instead of mutating shared state.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;

use crate::filter::{PatternFilter, Splitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Var {
    Desc,
    Like,
    Tags,
    Leave,
    Summary,
    Assets,
    Tables,
    Backup,
    TransferVia,
    MigrateDown,
    RestoreSchema,
    RestoreTables,
    RestoreAssets,
    ShowSize,
}

impl Var {
    pub const ALL: [Var; 14] = [
        Var::Desc,
        Var::Like,
        Var::Tags,
        Var::Leave,
        Var::Summary,
        Var::Assets,
        Var::Tables,
        Var::Backup,
        Var::TransferVia,
        Var::MigrateDown,
        Var::RestoreSchema,
        Var::RestoreTables,
        Var::RestoreAssets,
        Var::ShowSize,
    ];

    /// Accepted environment names; the first one is canonical.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            Var::Desc => &["DESC", "DESCRIPTION"],
            Var::Like => &["LIKE", "VER", "VERSION"],
            Var::Tags => &["TAGS", "TAG"],
            Var::Leave => &["LEAVE"],
            Var::Summary => &["SUMMARY"],
            Var::Assets => &["ASSETS"],
            Var::Tables => &["TABLES"],
            Var::Backup => &["BACKUP", "AUTOBACKUP", "AUTO_BACKUP"],
            Var::TransferVia => &["TRANSFER_VIA"],
            Var::MigrateDown => &["MIGRATE_DOWN"],
            Var::RestoreSchema => &["RESTORE_SCHEMA"],
            Var::RestoreTables => &["RESTORE_TABLES"],
            Var::RestoreAssets => &["RESTORE_ASSETS"],
            Var::ShowSize => &["SHOW_SIZE"],
        }
    }

    pub fn canonical_name(self) -> &'static str {
        self.names()[0]
    }

    pub fn explanation(self) -> &'static str {
        match self {
            Var::Desc => "free form description of dump",
            Var::Like => "filter dumps by full dump name",
            Var::Tags => {
                "comma separated list of tags; for restore, versions and cleanup \
                 prefix a tag with '+' to require it or '-' to exclude it"
            }
            Var::Leave => "number of dumps to leave",
            Var::Summary => {
                "output info about dump: \"1\", \"true\" or \"yes\" for basic info, \
                 \"2\" or \"schema\" to include the schema"
            }
            Var::Assets => "comma or colon separated list of asset paths or globs",
            Var::Tables => {
                "comma separated list of tables to dump; prefix the list with '-' \
                 to dump every table except those listed"
            }
            Var::Backup => "no auto-backup of the destination if you pass \"0\", \"no\" or \"false\"",
            Var::TransferVia => "transfer method: rsync, scp or ssh",
            Var::MigrateDown => {
                "don't run down for migrations missing from the dump if you pass \"0\", \"no\" or \"false\""
            }
            Var::RestoreSchema => "don't read or change schema if you pass \"0\", \"no\" or \"false\"",
            Var::RestoreTables => "works like TABLES, but when restoring",
            Var::RestoreAssets => "works like ASSETS, but when restoring",
            Var::ShowSize => "show dump file sizes in versions",
        }
    }

    /// Look a variable up by any of its names, case-insensitively.
    pub fn from_name(name: &str) -> Option<Var> {
        let upper = name.trim().to_uppercase();
        Var::ALL
            .iter()
            .copied()
            .find(|var| var.names().contains(&upper.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpCommand {
    Create,
    Restore,
    Versions,
    Cleanup,
    Assets,
    Transfer,
    Mirror,
    Backup,
    BackupRestore,
}

impl DumpCommand {
    pub const ALL: [DumpCommand; 9] = [
        DumpCommand::Create,
        DumpCommand::Restore,
        DumpCommand::Versions,
        DumpCommand::Cleanup,
        DumpCommand::Assets,
        DumpCommand::Transfer,
        DumpCommand::Mirror,
        DumpCommand::Backup,
        DumpCommand::BackupRestore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DumpCommand::Create => "create",
            DumpCommand::Restore => "restore",
            DumpCommand::Versions => "versions",
            DumpCommand::Cleanup => "cleanup",
            DumpCommand::Assets => "assets",
            DumpCommand::Transfer => "transfer",
            DumpCommand::Mirror => "mirror",
            DumpCommand::Backup => "backup",
            DumpCommand::BackupRestore => "backup_restore",
        }
    }

    pub fn from_name(name: &str) -> Option<DumpCommand> {
        let name = name.trim().to_lowercase().replace('-', "_");
        DumpCommand::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_str() == name)
    }

    pub fn variables(self) -> &'static [Var] {
        match self {
            DumpCommand::Create => &[Var::Desc, Var::Tags, Var::Assets, Var::Tables],
            DumpCommand::Restore => &[
                Var::Like,
                Var::Tags,
                Var::MigrateDown,
                Var::RestoreSchema,
                Var::RestoreTables,
                Var::RestoreAssets,
            ],
            DumpCommand::Versions => &[Var::Like, Var::Tags, Var::Summary],
            DumpCommand::Cleanup => &[Var::Like, Var::Tags, Var::Leave],
            DumpCommand::Assets => &[Var::Assets],
            DumpCommand::Transfer => &[Var::Like, Var::Tags, Var::TransferVia],
            DumpCommand::Mirror => &[
                Var::Desc,
                Var::Tags,
                Var::Tables,
                Var::Assets,
                Var::Backup,
                Var::TransferVia,
                Var::MigrateDown,
                Var::RestoreSchema,
                Var::RestoreTables,
                Var::RestoreAssets,
            ],
            DumpCommand::Backup => &[
                Var::Desc,
                Var::Tags,
                Var::Assets,
                Var::Tables,
                Var::TransferVia,
            ],
            DumpCommand::BackupRestore => &[
                Var::Like,
                Var::Tags,
                Var::MigrateDown,
                Var::RestoreSchema,
                Var::RestoreTables,
                Var::RestoreAssets,
                Var::TransferVia,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpEnv {
    values: BTreeMap<Var, String>,
}

impl DumpEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every variable to the first of its names holding a non-blank value.
    pub fn from_vars<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let raw: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        let mut values = BTreeMap::new();
        for var in Var::ALL {
            let found = var
                .names()
                .iter()
                .filter_map(|name| raw.get(*name))
                .find(|value| !value.trim().is_empty());
            if let Some(value) = found {
                values.insert(var, value.clone());
            }
        }
        Self { values }
    }

    pub fn from_process() -> Self {
        Self::from_process_with(&[])
    }

    /// Process environment with `overrides` applied on top.
    pub fn from_process_with(overrides: &[(String, String)]) -> Self {
        Self::from_vars_with(utf8_vars(std::env::vars_os()), overrides)
    }

    /// `pairs` with `overrides` applied on top.
    ///
    /// An override replaces every name of its variable, so a blank one
    /// clears the variable instead of exposing an alias.
    pub fn from_vars_with<I, K, V>(pairs: I, overrides: &[(String, String)]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let overridden: Vec<Var> = overrides
            .iter()
            .filter_map(|(name, _)| Var::from_name(name))
            .collect();

        let inherited = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .filter(|(k, _)| !Var::from_name(k).is_some_and(|var| overridden.contains(&var)));

        Self::from_vars(inherited.chain(overrides.iter().cloned()))
    }

    pub fn get(&self, var: Var) -> Option<&str> {
        self.values.get(&var).map(String::as_str)
    }

    pub fn is_set(&self, var: Var) -> bool {
        self.values.contains_key(&var)
    }

    /// Copy with `var` overridden; `None` or a blank value removes it.
    pub fn with(&self, var: Var, value: Option<&str>) -> Self {
        let mut next = self.clone();
        match value {
            Some(value) if !value.trim().is_empty() => {
                next.values.insert(var, value.to_string());
            }
            _ => {
                next.values.remove(&var);
            }
        }
        next
    }

    /// An environment holding only the given variables.
    pub fn clean_with(pairs: &[(Var, &str)]) -> Self {
        pairs
            .iter()
            .fold(Self::new(), |env, (var, value)| env.with(*var, Some(*value)))
    }

    /// Prepend `tags` to the current `TAGS`, dropping blanks.
    pub fn with_additional_tags(&self, tags: &[&str]) -> Self {
        let joined = tags
            .iter()
            .copied()
            .chain(self.get(Var::Tags))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.with(Var::Tags, Some(&joined))
    }

    fn first_char(&self, var: Var) -> Option<char> {
        self.get(var)
            .and_then(|v| v.trim().chars().next())
            .map(|c| c.to_ascii_lowercase())
    }

    pub fn is_yes(&self, var: Var) -> bool {
        matches!(self.first_char(var), Some('1' | 'y' | 't'))
    }

    pub fn is_no(&self, var: Var) -> bool {
        matches!(self.first_char(var), Some('0' | 'n' | 'f'))
    }

    pub fn filter(&self, var: Var) -> PatternFilter {
        PatternFilter::new(self.get(var))
    }

    pub fn filter_with(&self, var: Var, splitter: impl Into<Splitter>) -> PatternFilter {
        PatternFilter::with_splitter(self.get(var), splitter)
    }

    /// Asset lists accept both `,` and `:` as separators.
    pub fn asset_filter(&self, var: Var) -> PatternFilter {
        match Regex::new(r"[:,]") {
            Ok(re) => self.filter_with(var, re),
            Err(_) => self.filter(var),
        }
    }

    /// Canonical `NAME=value` pairs for the variables `command` consumes, sorted by name.
    pub fn for_command(&self, command: DumpCommand) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = command
            .variables()
            .iter()
            .filter_map(|var| {
                self.get(*var)
                    .map(|value| (var.canonical_name().to_string(), value.to_string()))
            })
            .collect();
        pairs.sort();
        pairs
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, &str)> {
        self.values.iter().map(|(var, value)| (*var, value.as_str()))
    }
}

/// Variables whose name and value are both UTF-8; no other can name a dump variable.
fn utf8_vars<I>(pairs: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    pairs
        .into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

/// Help text describing the variables a command reads.
pub fn explain_variables_for_command(command: DumpCommand) -> String {
    let mut out = String::from("Variables:\n");
    for var in command.variables() {
        out.push_str(&format!(
            "  {} - {}\n",
            var.names().join(", "),
            var.explanation()
        ));
    }
    out
}

/// Parse `KEY=VALUE` override flags into variable pairs.
pub fn parse_overrides(raw: &[String]) -> crate::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| {
            let (key, value) = item.split_once('=').ok_or_else(|| {
                crate::Error::validation_invalid_argument(
                    "set",
                    format!("Expected KEY=VALUE, got '{}'", item),
                    None,
                    None,
                )
            })?;
            let var = Var::from_name(key).ok_or_else(|| {
                crate::Error::validation_invalid_argument(
                    "set",
                    format!("Unknown dump variable '{}'", key),
                    None,
                    Some(Var::ALL.iter().map(|v| v.canonical_name().to_string()).collect()),
                )
            })?;
            Ok((var.canonical_name().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_in_dictionary_order() {
        let env = DumpEnv::from_vars([("VERSION", "b"), ("VER", "a")]);
        assert_eq!(env.get(Var::Like), Some("a"));

        let env = DumpEnv::from_vars([("DESCRIPTION", "nightly")]);
        assert_eq!(env.get(Var::Desc), Some("nightly"));
    }

    #[test]
    fn blank_values_are_unset() {
        let env = DumpEnv::from_vars([("TAGS", "  "), ("TAG", ""), ("LEAVE", "5")]);
        assert!(!env.is_set(Var::Tags));
        assert_eq!(env.get(Var::Leave), Some("5"));
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let env = DumpEnv::from_vars([("PATH", "/usr/bin"), ("HOME", "/root")]);
        assert_eq!(env, DumpEnv::new());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("UNRELATED"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![b'X', 0xff]), OsString::from("1")),
            (OsString::from("LIKE"), OsString::from("20240101")),
        ];
        let env = DumpEnv::from_vars(utf8_vars(vars));
        assert_eq!(env.iter().collect::<Vec<_>>(), vec![(Var::Like, "20240101")]);
    }

    #[test]
    fn process_environment_loads() {
        let env = DumpEnv::from_process_with(&[("LEAVE".to_string(), "3".to_string())]);
        assert_eq!(env.get(Var::Leave), Some("3"));
    }

    #[test]
    fn blank_override_hides_inherited_aliases() {
        let inherited = [("TAG", "inherited"), ("VERSION", "old")];
        let env = DumpEnv::from_vars_with(
            inherited,
            &[
                ("TAGS".to_string(), String::new()),
                ("LIKE".to_string(), "new".to_string()),
            ],
        );
        assert!(!env.is_set(Var::Tags));
        assert_eq!(env.get(Var::Like), Some("new"));

        let untouched = DumpEnv::from_vars_with(inherited, &[]);
        assert_eq!(untouched.get(Var::Tags), Some("inherited"));
    }

    #[test]
    fn with_overrides_and_removes() {
        let env = DumpEnv::from_vars([("SUMMARY", "1"), ("LIKE", "x")]);
        let without = env.with(Var::Summary, None);
        assert!(!without.is_set(Var::Summary));
        assert_eq!(without.get(Var::Like), Some("x"));
        assert_eq!(env.get(Var::Summary), Some("1"));
    }

    #[test]
    fn clean_with_drops_everything_else() {
        let env = DumpEnv::clean_with(&[(Var::Like, "20240101.tgz")]);
        assert_eq!(env.iter().count(), 1);
        assert_eq!(env.get(Var::Like), Some("20240101.tgz"));
    }

    #[test]
    fn additional_tags_are_prepended() {
        let env = DumpEnv::from_vars([("TAGS", "nightly")]);
        assert_eq!(
            env.with_additional_tags(&["local"]).get(Var::Tags),
            Some("local,nightly")
        );
        assert_eq!(
            DumpEnv::new().with_additional_tags(&["mirror", " "]).get(Var::Tags),
            Some("mirror")
        );
    }

    #[test]
    fn yes_and_no_use_first_character() {
        let env = DumpEnv::from_vars([("BACKUP", "No"), ("SHOW_SIZE", "true")]);
        assert!(env.is_no(Var::Backup));
        assert!(!env.is_yes(Var::Backup));
        assert!(env.is_yes(Var::ShowSize));
        assert!(!env.is_no(Var::Leave));
        assert!(!env.is_yes(Var::Leave));
    }

    #[test]
    fn for_command_selects_and_sorts() {
        let env = DumpEnv::from_vars([
            ("TAGS", "a"),
            ("DESC", "d"),
            ("LIKE", "ignored-for-create"),
            ("TABLES", "-sessions"),
        ]);
        assert_eq!(
            env.for_command(DumpCommand::Create),
            vec![
                ("DESC".to_string(), "d".to_string()),
                ("TABLES".to_string(), "-sessions".to_string()),
                ("TAGS".to_string(), "a".to_string()),
            ]
        );
    }

    #[test]
    fn filters_read_variables() {
        let env = DumpEnv::from_vars([("TABLES", "-sessions,Logs"), ("ASSETS", "public/system:tmp")]);
        let tables = env.filter(Var::Tables);
        assert!(tables.is_inverted());
        assert!(!tables.pass("logs"));
        assert!(tables.pass("users"));

        let assets = env.asset_filter(Var::Assets);
        assert_eq!(assets.values().len(), 2);
        assert!(env.filter(Var::RestoreTables).is_transparent());
    }

    #[test]
    fn explanation_lists_all_names() {
        let help = explain_variables_for_command(DumpCommand::Versions);
        assert!(help.contains("LIKE, VER, VERSION"));
        assert!(help.contains("SUMMARY"));
        assert!(!help.contains("LEAVE"));
    }

    #[test]
    fn overrides_use_canonical_names() {
        let pairs = parse_overrides(&["version=abc".to_string()]).unwrap();
        assert_eq!(pairs, vec![("LIKE".to_string(), "abc".to_string())]);
        assert!(parse_overrides(&["NOPE=1".to_string()]).is_err());
        assert!(parse_overrides(&["LIKE".to_string()]).is_err());
    }

    #[test]
    fn command_names_accept_dashes() {
        assert_eq!(
            DumpCommand::from_name("backup-restore"),
            Some(DumpCommand::BackupRestore)
        );
        assert_eq!(DumpCommand::from_name("bogus"), None);
    }
}
