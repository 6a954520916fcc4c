//! Rendering of `rake dump:*` command lines.

use crate::env::{DumpCommand, DumpEnv};
use crate::shell;

/// One invocation of a dump rake task.
#[derive(Debug, Clone)]
pub struct DumpInvocation {
    rake: String,
    task: DumpCommand,
    vars: Vec<(String, String)>,
    dir: Option<String>,
}

impl DumpInvocation {
    /// Start from the variables `env` holds for `task`.
    pub fn new(rake: impl Into<String>, task: DumpCommand, env: &DumpEnv) -> Self {
        Self {
            rake: rake.into(),
            task,
            vars: env.for_command(task),
            dir: None,
        }
    }

    /// Add or replace a variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.vars.retain(|(k, _)| *k != key);
        self.vars.push((key, value.into()));
        self
    }

    /// Run from `dir` (`cd <dir> && ...`).
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn task(&self) -> DumpCommand {
        self.task
    }

    /// `<rake> -s dump:<task> K=V ...`, variables sorted by name.
    ///
    /// The rake prefix is inserted verbatim so `bundle exec rake` works.
    pub fn render(&self) -> String {
        let mut vars = self.vars.clone();
        vars.sort();

        let mut args = vec!["-s".to_string(), format!("dump:{}", self.task.as_str())];
        args.extend(vars.iter().map(|(k, v)| format!("{}={}", k, v)));

        let command = format!("{} {}", self.rake.trim(), shell::quote_args(&args));
        match &self.dir {
            Some(dir) => format!("cd {} && {}", shell::quote_path(dir), command),
            None => command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Var;

    #[test]
    fn renders_sorted_variables() {
        let env = DumpEnv::from_vars([("TAGS", "local"), ("DESC", "before deploy")]);
        let cmd = DumpInvocation::new("rake", DumpCommand::Create, &env).render();
        assert_eq!(cmd, "rake -s dump:create 'DESC=before deploy' TAGS=local");
    }

    #[test]
    fn ignores_variables_for_other_commands() {
        let env = DumpEnv::from_vars([("LEAVE", "3"), ("LIKE", "x")]);
        let cmd = DumpInvocation::new("rake", DumpCommand::Create, &env).render();
        assert_eq!(cmd, "rake -s dump:create");
    }

    #[test]
    fn extra_vars_replace_existing() {
        let env = DumpEnv::new().with(Var::Summary, Some("1"));
        let cmd = DumpInvocation::new("rake", DumpCommand::Versions, &env)
            .var("SUMMARY", "2")
            .var("SHOW_SIZE", "true")
            .render();
        assert_eq!(cmd, "rake -s dump:versions SHOW_SIZE=true SUMMARY=2");
    }

    #[test]
    fn remote_invocation_changes_directory() {
        let cmd = DumpInvocation::new("bundle exec rake", DumpCommand::Restore, &DumpEnv::new())
            .var("RAILS_ENV", "production")
            .var("PROGRESS_TTY", "+")
            .in_dir("/var/www/app/current")
            .render();
        assert_eq!(
            cmd,
            "cd '/var/www/app/current' && bundle exec rake -s dump:restore PROGRESS_TTY=+ RAILS_ENV=production"
        );
    }
}
