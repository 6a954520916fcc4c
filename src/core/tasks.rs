//! Dump tasks composed from local and remote rake invocations and transfers.
//!
//! A [`Session`] runs tasks against one target. Every command and transfer
//! it performs is recorded as a [`Step`] and returned in the [`TaskReport`].

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

use crate::env::{DumpCommand, DumpEnv, Var};
use crate::error::{CommandFailedDetails, Error, Result, TargetDetails, TransferFailedDetails};
use crate::executor::{Runner, Transfer};
use crate::local_files::{self, FileSystem};
use crate::parser::{last_part_of_last_line, present};
use crate::rake::DumpInvocation;
use crate::shell;
use crate::ssh::CommandOutput;
use crate::target::Target;

const LOCAL_TAG: &str = "local";
const REMOTE_TAG: &str = "remote";
const MIRROR_TAG: &str = "mirror";
const AUTO_BACKUP_TAG: &str = "auto-backup";
const BACKUP_TAG: &str = "backup";
const DEFAULT_BACKUP_DESC: &str = "backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Task {
    #[serde(rename = "local:create")]
    LocalCreate,
    #[serde(rename = "local:restore")]
    LocalRestore,
    #[serde(rename = "local:versions")]
    LocalVersions,
    #[serde(rename = "local:cleanup")]
    LocalCleanup,
    #[serde(rename = "local:upload")]
    LocalUpload,
    #[serde(rename = "remote:create")]
    RemoteCreate,
    #[serde(rename = "remote:restore")]
    RemoteRestore,
    #[serde(rename = "remote:versions")]
    RemoteVersions,
    #[serde(rename = "remote:cleanup")]
    RemoteCleanup,
    #[serde(rename = "remote:download")]
    RemoteDownload,
    #[serde(rename = "mirror:up")]
    MirrorUp,
    #[serde(rename = "mirror:down")]
    MirrorDown,
    #[serde(rename = "backup:create")]
    BackupCreate,
    #[serde(rename = "backup:restore")]
    BackupRestore,
    #[serde(rename = "hook:link-dump-folder")]
    LinkDumpFolder,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::LocalCreate => "local:create",
            Task::LocalRestore => "local:restore",
            Task::LocalVersions => "local:versions",
            Task::LocalCleanup => "local:cleanup",
            Task::LocalUpload => "local:upload",
            Task::RemoteCreate => "remote:create",
            Task::RemoteRestore => "remote:restore",
            Task::RemoteVersions => "remote:versions",
            Task::RemoteCleanup => "remote:cleanup",
            Task::RemoteDownload => "remote:download",
            Task::MirrorUp => "mirror:up",
            Task::MirrorDown => "mirror:down",
            Task::BackupCreate => "backup:create",
            Task::BackupRestore => "backup:restore",
            Task::LinkDumpFolder => "hook:link-dump-folder",
        }
    }

    /// Tasks that only run commands on the local machine.
    pub fn is_local_only(self) -> bool {
        matches!(
            self,
            Task::LocalCreate | Task::LocalRestore | Task::LocalVersions | Task::LocalCleanup
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
    Transfer,
}

/// One executed command or file transfer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub side: Side,
    pub host: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: Task,
    pub target: String,
    /// Dump file the task created, moved or restored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Output of the task's main command, when it prints something worth showing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub steps: Vec<Step>,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Default)]
struct Outcome {
    file: Option<String>,
    output: Option<String>,
}

impl Outcome {
    fn file(file: Option<String>) -> Self {
        Self { file, output: None }
    }

    fn output(output: String) -> Self {
        Self {
            file: None,
            output: present(&output),
        }
    }
}

pub struct Session<'a, L, R> {
    target: &'a Target,
    local: L,
    remote: R,
    local_root: PathBuf,
    steps: Vec<Step>,
}

impl<'a, L: Runner, R: Runner + Transfer> Session<'a, L, R> {
    /// `local_root` is the directory the local dump dir is relative to.
    pub fn new(target: &'a Target, local: L, remote: R, local_root: impl Into<PathBuf>) -> Self {
        Self {
            target,
            local,
            remote,
            local_root: local_root.into(),
            steps: Vec::new(),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run `task` and report every step it took.
    pub fn run(&mut self, task: Task, env: &DumpEnv) -> Result<TaskReport> {
        let started_at = Utc::now().to_rfc3339();
        self.steps.clear();

        let outcome = match task {
            Task::LocalCreate => Outcome::file(Some(self.local_create(env)?)),
            Task::LocalRestore => Outcome::output(self.local_restore(env)?),
            Task::LocalVersions => Outcome::output(self.local_versions(env)?),
            Task::LocalCleanup => Outcome::output(self.local_cleanup(env)?),
            Task::LocalUpload => Outcome::file(self.local_upload(env)?),
            Task::RemoteCreate => Outcome::file(Some(self.remote_create(env)?)),
            Task::RemoteRestore => Outcome::output(self.remote_restore(env)?),
            Task::RemoteVersions => Outcome::output(self.remote_versions(env)?),
            Task::RemoteCleanup => Outcome::output(self.remote_cleanup(env)?),
            Task::RemoteDownload => Outcome::file(self.remote_download(env)?),
            Task::MirrorUp => Outcome::file(self.mirror_up(env)?),
            Task::MirrorDown => Outcome::file(self.mirror_down(env)?),
            Task::BackupCreate => Outcome::file(self.backup_create(env)?),
            Task::BackupRestore => Outcome::file(self.backup_restore(env)?),
            Task::LinkDumpFolder => {
                self.link_dump_folder(None)?;
                Outcome::default()
            }
        };

        Ok(self.finish(task, started_at, outcome))
    }

    /// The after-deploy hook with an explicit release path.
    pub fn run_link_dump_folder(&mut self, release_path: Option<&str>) -> Result<TaskReport> {
        let started_at = Utc::now().to_rfc3339();
        self.steps.clear();
        self.link_dump_folder(release_path)?;
        Ok(self.finish(Task::LinkDumpFolder, started_at, Outcome::default()))
    }

    fn finish(&mut self, task: Task, started_at: String, outcome: Outcome) -> TaskReport {
        TaskReport {
            task,
            target: self.target.id.clone(),
            file: outcome.file,
            output: outcome.output,
            steps: std::mem::take(&mut self.steps),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        }
    }

    // ------------------------------------------------------------------
    // Local
    // ------------------------------------------------------------------

    /// Create a local dump tagged `local`; returns the dump file name.
    pub fn local_create(&mut self, env: &DumpEnv) -> Result<String> {
        let env = env.with_additional_tags(&[LOCAL_TAG]);
        let command = self.local_rake(DumpCommand::Create, &env).render();
        let out = self.capture_local(&command)?;
        created(&out, &command)
    }

    pub fn local_restore(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self.local_rake(DumpCommand::Restore, env).render();
        self.capture_local(&command)
    }

    pub fn local_versions(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self
            .local_rake(DumpCommand::Versions, env)
            .var(Var::ShowSize.canonical_name(), "true")
            .render();
        self.capture_local(&command)
    }

    pub fn local_cleanup(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self.local_rake(DumpCommand::Cleanup, env).render();
        self.capture_local(&command)
    }

    /// Upload the newest local dump matching `env` into the remote dump dir.
    pub fn local_upload(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        let command = self
            .local_rake(DumpCommand::Versions, &env.with(Var::Summary, None))
            .render();
        let listing = self.capture_local(&command)?;

        let Some(file) = last_part_of_last_line(&listing) else {
            log_status!("transfer", "No local dump matched, nothing to upload");
            return Ok(None);
        };

        let local_path = self.local_dump_path(&file);
        let remote_path = self.remote_dump_path(&file);
        let out = self.remote.upload(&local_path, &remote_path);
        let source = local_path.to_string_lossy().to_string();
        self.check_transfer(out, source, remote_path, Error::transfer_upload_failed)?;
        Ok(Some(file))
    }

    // ------------------------------------------------------------------
    // Remote
    // ------------------------------------------------------------------

    /// Create a dump on the primary db server tagged `remote`; returns its file name.
    pub fn remote_create(&mut self, env: &DumpEnv) -> Result<String> {
        let env = env.with_additional_tags(&[REMOTE_TAG]);
        let command = self.remote_rake(DumpCommand::Create, &env).render();
        let out = self.capture_remote_mutating(&command)?;
        created(&out, &command)
    }

    pub fn remote_restore(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self.remote_rake(DumpCommand::Restore, env).render();
        self.capture_remote_mutating(&command)
    }

    pub fn remote_versions(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self
            .remote_rake(DumpCommand::Versions, env)
            .var(Var::ShowSize.canonical_name(), "true")
            .render();
        self.capture_remote(&command)
    }

    pub fn remote_cleanup(&mut self, env: &DumpEnv) -> Result<String> {
        let command = self.remote_rake(DumpCommand::Cleanup, env).render();
        self.capture_remote(&command)
    }

    /// Download the newest remote dump matching `env` into the local dump dir.
    pub fn remote_download(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        let command = self
            .remote_rake(DumpCommand::Versions, &env.with(Var::Summary, None))
            .render();
        let listing = self.capture_remote(&command)?;

        let Some(file) = last_part_of_last_line(&listing) else {
            log_status!("transfer", "No remote dump matched, nothing to download");
            return Ok(None);
        };

        local_files::local().ensure_dir(&self.local_root.join(&self.target.local_dump_dir))?;

        let local_path = self.local_dump_path(&file);
        let remote_path = self.remote_dump_path(&file);
        let out = self.remote.download(&remote_path, &local_path);
        let destination = local_path.to_string_lossy().to_string();
        self.check_transfer(out, remote_path, destination, Error::transfer_download_failed)?;
        Ok(Some(file))
    }

    // ------------------------------------------------------------------
    // Composite
    // ------------------------------------------------------------------

    /// Local dump restored on the remote server, after a remote auto-backup.
    pub fn mirror_up(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        if !env.is_no(Var::Backup) {
            self.remote_create(&env.with_additional_tags(&[AUTO_BACKUP_TAG]))?;
        }

        let tagged = env.with_additional_tags(&[MIRROR_TAG]);
        let command = self.local_rake(DumpCommand::Create, &tagged).render();
        let file = present(&self.capture_local(&command)?);

        if let Some(file) = &file {
            let clean = DumpEnv::clean_with(&[(Var::Like, file.as_str())]);
            self.local_upload(&clean)?;
            self.remote_restore(&clean)?;
        }
        Ok(file)
    }

    /// Remote dump restored locally, after a local auto-backup.
    pub fn mirror_down(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        if !env.is_no(Var::Backup) {
            self.local_create(&env.with_additional_tags(&[AUTO_BACKUP_TAG]))?;
        }

        let tagged = env.with_additional_tags(&[MIRROR_TAG]);
        let command = self.remote_rake(DumpCommand::Create, &tagged).render();
        let file = present(&self.capture_remote_mutating(&command)?);

        if let Some(file) = &file {
            let clean = DumpEnv::clean_with(&[(Var::Like, file.as_str())]);
            self.remote_download(&clean)?;
            self.local_restore(&clean)?;
        }
        Ok(file)
    }

    /// Remote dump tagged `backup`, downloaded to the local dump dir.
    pub fn backup_create(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        let env = if env.is_set(Var::Desc) {
            env.clone()
        } else {
            env.with(Var::Desc, Some(DEFAULT_BACKUP_DESC))
        };

        let tagged = env.with_additional_tags(&[BACKUP_TAG]);
        let command = self.remote_rake(DumpCommand::Create, &tagged).render();
        let file = present(&self.capture_remote_mutating(&command)?);

        if let Some(file) = &file {
            self.remote_download(&DumpEnv::clean_with(&[(Var::Like, file.as_str())]))?;
        }
        Ok(file)
    }

    /// Newest local `backup` dump, uploaded and restored on the remote server.
    pub fn backup_restore(&mut self, env: &DumpEnv) -> Result<Option<String>> {
        let tagged = env.with_additional_tags(&[BACKUP_TAG]);
        let command = self.local_rake(DumpCommand::Versions, &tagged).render();
        let file = last_part_of_last_line(&self.capture_local(&command)?);

        if let Some(file) = &file {
            let clean = DumpEnv::clean_with(&[(Var::Like, file.as_str())]);
            self.local_upload(&clean)?;
            self.remote_restore(&clean)?;
        }
        Ok(file)
    }

    /// Point `<release>/dump` at the shared dump dir so dumps survive deploys.
    ///
    /// `release_path` defaults to the target's current path.
    pub fn link_dump_folder(&mut self, release_path: Option<&str>) -> Result<()> {
        let from = format!("{}/dump", self.target.shared_path());
        let release = release_path
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.target.current_path());
        let to = format!("{}/dump", release.trim_end_matches('/'));

        let command = format!(
            "mkdir -p {from}; rm -rf {to}; ln -s {from} {to}",
            from = shell::quote_path(&from),
            to = shell::quote_path(&to)
        );
        self.capture_remote(&command)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn local_rake(&self, command: DumpCommand, env: &DumpEnv) -> DumpInvocation {
        DumpInvocation::new(self.target.local_rake.as_str(), command, env)
    }

    fn remote_rake(&self, command: DumpCommand, env: &DumpEnv) -> DumpInvocation {
        DumpInvocation::new(self.target.rake.as_str(), command, env)
            .var("RAILS_ENV", self.target.rails_env.as_str())
            .var("PROGRESS_TTY", "+")
            .in_dir(self.target.current_path())
    }

    fn local_dump_path(&self, file: &str) -> PathBuf {
        self.local_root.join(&self.target.local_dump_dir).join(file)
    }

    fn remote_dump_path(&self, file: &str) -> String {
        format!("{}/{}", self.target.remote_dump_dir(), file)
    }

    fn capture_local(&mut self, command: &str) -> Result<String> {
        let host = self.local.label();
        let out = self.local.run(command);
        self.record(Side::Local, host.clone(), command, &out);
        if !out.success {
            return Err(Error::local_command_failed(self.failure(command, out, host)));
        }
        Ok(out.stdout)
    }

    fn capture_remote(&mut self, command: &str) -> Result<String> {
        let out = self.remote.run(command);
        self.remote_result(command, out)
    }

    /// Dump create and restore, never replayed after a dropped connection.
    fn capture_remote_mutating(&mut self, command: &str) -> Result<String> {
        let out = self.remote.run_mutating(command);
        self.remote_result(command, out)
    }

    fn remote_result(&mut self, command: &str, out: CommandOutput) -> Result<String> {
        let host = self.remote.label();
        self.record(Side::Remote, host.clone(), command, &out);
        if !out.success {
            return Err(Error::remote_command_failed(self.failure(command, out, host)));
        }
        Ok(out.stdout)
    }

    fn check_transfer(
        &mut self,
        out: CommandOutput,
        source: String,
        destination: String,
        to_error: fn(TransferFailedDetails) -> Error,
    ) -> Result<()> {
        let method = self.remote.method();
        let host = self.remote.label();
        let command = format!("{} {} {}", method, source, destination);
        self.record(Side::Transfer, host, &command, &out);

        if out.success {
            return Ok(());
        }
        Err(to_error(TransferFailedDetails {
            source,
            destination,
            method: method.to_string(),
            exit_code: out.exit_code,
            stderr: out.stderr,
        }))
    }

    fn failure(&self, command: &str, out: CommandOutput, host: String) -> CommandFailedDetails {
        CommandFailedDetails {
            command: command.to_string(),
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            target: TargetDetails {
                target_id: Some(self.target.id.clone()),
                server_id: Some(host),
                host: None,
            },
        }
    }

    fn record(&mut self, side: Side, host: String, command: &str, out: &CommandOutput) {
        self.steps.push(Step {
            side,
            host,
            command: command.to_string(),
            stdout: out.stdout.clone(),
            stderr: out.stderr.clone(),
            exit_code: out.exit_code,
            success: out.success,
        });
    }
}

/// The created dump's name, or `dump.create_failed` when nothing was printed.
fn created(output: &str, command: &str) -> Result<String> {
    present(output).ok_or_else(|| Error::dump_create_failed(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    #[derive(Default)]
    struct Scripted {
        outputs: RefCell<VecDeque<CommandOutput>>,
        commands: RefCell<Vec<String>>,
        mutating: RefCell<Vec<String>>,
        transfers: RefCell<Vec<(String, String)>>,
        transfer_fails: bool,
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            success: true,
            ..CommandOutput::default()
        }
    }

    impl Scripted {
        fn with(outputs: Vec<CommandOutput>) -> Self {
            Self {
                outputs: RefCell::new(outputs.into()),
                ..Self::default()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.borrow().clone()
        }
    }

    impl Runner for Scripted {
        fn run(&self, command: &str) -> CommandOutput {
            self.commands.borrow_mut().push(command.to_string());
            self.outputs.borrow_mut().pop_front().unwrap_or_else(|| ok(""))
        }

        fn run_mutating(&self, command: &str) -> CommandOutput {
            self.mutating.borrow_mut().push(command.to_string());
            self.run(command)
        }

        fn label(&self) -> String {
            "fake".to_string()
        }
    }

    impl Transfer for Scripted {
        fn upload(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
            self.transfers
                .borrow_mut()
                .push((local_path.to_string_lossy().to_string(), remote_path.to_string()));
            if self.transfer_fails {
                CommandOutput::failed("connection lost")
            } else {
                ok("")
            }
        }

        fn download(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
            self.upload(local_path, remote_path)
        }

        fn method(&self) -> &'static str {
            "fake"
        }
    }

    fn target() -> Target {
        let mut t: Target = serde_json::from_str(
            r#"{ "deployTo": "/srv/app", "railsEnv": "staging", "rake": "bundle exec rake" }"#,
        )
        .unwrap();
        t.id = "staging".to_string();
        t
    }

    #[test]
    fn local_create_tags_and_returns_trimmed_name() {
        let t = target();
        let mut session = Session::new(&t, Scripted::with(vec![ok("a.tgz\n")]), Scripted::default(), "/work");
        let env = DumpEnv::from_vars([("TAGS", "nightly")]);

        assert_eq!(session.local_create(&env).unwrap(), "a.tgz");
        assert_eq!(
            session.local().commands(),
            vec!["rake -s dump:create TAGS=local,nightly".to_string()]
        );
    }

    #[test]
    fn blank_create_output_fails() {
        let t = target();
        let mut session = Session::new(&t, Scripted::with(vec![ok("  \n")]), Scripted::default(), "/work");
        let err = session.local_create(&DumpEnv::new()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::DumpCreateFailed);
        assert_eq!(err.message, "Failed creating dump");
    }

    #[test]
    fn remote_commands_run_in_current_path() {
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::default(), "/work");
        session.remote_versions(&DumpEnv::new()).unwrap();
        assert_eq!(
            session.remote().commands(),
            vec![
                "cd '/srv/app/current' && bundle exec rake -s dump:versions PROGRESS_TTY=+ RAILS_ENV=staging SHOW_SIZE=true"
                    .to_string()
            ]
        );
    }

    #[test]
    fn remote_create_and_restore_are_not_replayed() {
        let t = target();
        let remote = Scripted::with(vec![ok("a.tgz\n"), ok("")]);
        let mut session = Session::new(&t, Scripted::default(), remote, "/work");

        session.remote_create(&DumpEnv::new()).unwrap();
        session.remote_restore(&DumpEnv::new()).unwrap();
        session.remote_versions(&DumpEnv::new()).unwrap();

        let mutating = session.remote().mutating.borrow().clone();
        assert_eq!(mutating.len(), 2);
        assert!(mutating[0].contains("dump:create"));
        assert!(mutating[1].contains("dump:restore"));
        assert_eq!(session.remote().commands().len(), 3);
    }

    #[test]
    fn non_zero_exit_is_a_command_failure() {
        let t = target();
        let failing = CommandOutput {
            stderr: "rake aborted!".to_string(),
            exit_code: 1,
            ..CommandOutput::default()
        };
        let mut session = Session::new(&t, Scripted::default(), Scripted::with(vec![failing]), "/work");
        let err = session.remote_cleanup(&DumpEnv::new()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["stderr"], "rake aborted!");
        assert_eq!(err.details["target"]["targetId"], "staging");
        assert_eq!(session.steps().len(), 1);
    }

    #[test]
    fn upload_drops_summary_and_sends_last_listed_file() {
        let t = target();
        let listing = ok("old.tgz\nsize\tnew.tgz\n");
        let mut session = Session::new(&t, Scripted::with(vec![listing]), Scripted::default(), "/work");
        let env = DumpEnv::from_vars([("SUMMARY", "1"), ("LIKE", "new")]);

        assert_eq!(session.local_upload(&env).unwrap().as_deref(), Some("new.tgz"));
        assert_eq!(
            session.local().commands(),
            vec!["rake -s dump:versions LIKE=new".to_string()]
        );
        assert_eq!(
            session.remote().transfers.borrow().clone(),
            vec![(
                "/work/dump/new.tgz".to_string(),
                "/srv/app/current/dump/new.tgz".to_string()
            )]
        );
    }

    #[test]
    fn upload_without_match_transfers_nothing() {
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::default(), "/work");
        assert_eq!(session.local_upload(&DumpEnv::new()).unwrap(), None);
        assert!(session.remote().transfers.borrow().is_empty());
    }

    #[test]
    fn failed_upload_is_a_transfer_error() {
        let t = target();
        let remote = Scripted {
            transfer_fails: true,
            ..Scripted::default()
        };
        let mut session = Session::new(&t, Scripted::with(vec![ok("a.tgz")]), remote, "/work");
        let err = session.local_upload(&DumpEnv::new()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::TransferUploadFailed);
        assert_eq!(err.details["method"], "fake");
    }

    #[test]
    fn download_creates_local_dump_dir() {
        let dir = tempfile::tempdir().unwrap();
        let t = target();
        let remote = Scripted::with(vec![ok("b.tgz\n")]);
        let mut session = Session::new(&t, Scripted::default(), remote, dir.path());

        assert_eq!(session.remote_download(&DumpEnv::new()).unwrap().as_deref(), Some("b.tgz"));
        assert!(dir.path().join("dump").is_dir());
    }

    #[test]
    fn mirror_up_backs_up_remote_then_uploads_and_restores() {
        let t = target();
        let local = Scripted::with(vec![ok("m.tgz\n"), ok("m.tgz\n")]);
        let remote = Scripted::with(vec![ok("backup.tgz\n")]);
        let mut session = Session::new(&t, local, remote, "/work");
        let env = DumpEnv::from_vars([("TAGS", "x"), ("RESTORE_TABLES", "users")]);

        let report = session.run(Task::MirrorUp, &env).unwrap();
        assert_eq!(report.file.as_deref(), Some("m.tgz"));

        let remote_cmds = session.remote().commands();
        assert!(remote_cmds[0].contains("dump:create"));
        assert!(remote_cmds[0].contains("TAGS=remote,auto-backup,x"));
        assert!(remote_cmds[1].contains("dump:restore LIKE=m.tgz PROGRESS_TTY=+"));
        assert!(!remote_cmds[1].contains("RESTORE_TABLES"));

        let local_cmds = session.local().commands();
        assert_eq!(local_cmds[0], "rake -s dump:create TAGS=mirror,x");
        assert_eq!(local_cmds[1], "rake -s dump:versions LIKE=m.tgz");

        let sides: Vec<Side> = report.steps.iter().map(|s| s.side).collect();
        assert_eq!(
            sides,
            vec![Side::Remote, Side::Local, Side::Local, Side::Transfer, Side::Remote]
        );
    }

    #[test]
    fn mirror_up_skips_backup_when_disabled() {
        let t = target();
        let mut session = Session::new(&t, Scripted::with(vec![ok("")]), Scripted::default(), "/work");
        let env = DumpEnv::from_vars([("BACKUP", "no")]);

        assert_eq!(session.mirror_up(&env).unwrap(), None);
        assert!(session.remote().commands().is_empty());
    }

    #[test]
    fn mirror_up_stops_when_auto_backup_fails() {
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::with(vec![ok("")]), "/work");
        let err = session.mirror_up(&DumpEnv::new()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::DumpCreateFailed);
        assert!(session.local().commands().is_empty());
    }

    #[test]
    fn mirror_down_backs_up_locally_then_downloads_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let t = target();
        let local = Scripted::with(vec![ok("auto.tgz")]);
        let remote = Scripted::with(vec![ok("r.tgz"), ok("r.tgz")]);
        let mut session = Session::new(&t, local, remote, dir.path());

        assert_eq!(session.mirror_down(&DumpEnv::new()).unwrap().as_deref(), Some("r.tgz"));

        let local_cmds = session.local().commands();
        assert_eq!(local_cmds[0], "rake -s dump:create TAGS=local,auto-backup");
        assert_eq!(local_cmds[1], "rake -s dump:restore LIKE=r.tgz");
        assert!(session.remote().commands()[0].contains("TAGS=mirror"));
    }

    #[test]
    fn backup_create_defaults_description() {
        let dir = tempfile::tempdir().unwrap();
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::with(vec![ok("")]), dir.path());

        assert_eq!(session.backup_create(&DumpEnv::new()).unwrap(), None);
        let cmd = &session.remote().commands()[0];
        assert!(cmd.contains("DESC=backup"));
        assert!(cmd.contains("TAGS=backup"));
    }

    #[test]
    fn backup_restore_uses_newest_backup() {
        let t = target();
        let local = Scripted::with(vec![ok("b1.tgz\nb2.tgz\n"), ok("b2.tgz\n")]);
        let mut session = Session::new(&t, local, Scripted::default(), "/work");

        assert_eq!(session.backup_restore(&DumpEnv::new()).unwrap().as_deref(), Some("b2.tgz"));
        assert_eq!(session.local().commands()[0], "rake -s dump:versions TAGS=backup");
        assert!(session.remote().commands()[0].contains("dump:restore LIKE=b2.tgz"));
    }

    #[test]
    fn link_dump_folder_defaults_to_current_path() {
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::default(), "/work");
        session.link_dump_folder(Some("/srv/app/releases/42/")).unwrap();
        session.link_dump_folder(None).unwrap();

        let cmds = session.remote().commands();
        assert_eq!(
            cmds[0],
            "mkdir -p '/srv/app/shared/dump'; rm -rf '/srv/app/releases/42/dump'; ln -s '/srv/app/shared/dump' '/srv/app/releases/42/dump'"
        );
        assert!(cmds[1].ends_with("'/srv/app/current/dump'"));
    }

    #[test]
    fn report_serializes_task_name() {
        let t = target();
        let mut session = Session::new(&t, Scripted::default(), Scripted::default(), "/work");
        let report = session.run(Task::LocalCleanup, &DumpEnv::new()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["task"], "local:cleanup");
        assert!(json.get("output").is_none());
        assert_eq!(json["steps"][0]["side"], "local");
    }
}
