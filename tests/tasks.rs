use std::cell::RefCell;
use std::path::Path;

use dumpctl::env::DumpEnv;
use dumpctl::executor::{LocalRunner, NoRemote, Runner, Transfer};
use dumpctl::ssh::CommandOutput;
use dumpctl::target::{self, Target};
use dumpctl::tasks::{Session, Side, Task};
use dumpctl::ErrorCode;

/// Remote side that answers every command with a fixed listing and
/// records transfers.
struct FakeServer {
    listing: String,
    commands: RefCell<Vec<String>>,
    downloads: RefCell<Vec<(String, String)>>,
}

impl FakeServer {
    fn new(listing: &str) -> Self {
        Self {
            listing: listing.to_string(),
            commands: RefCell::new(Vec::new()),
            downloads: RefCell::new(Vec::new()),
        }
    }
}

impl Runner for FakeServer {
    fn run(&self, command: &str) -> CommandOutput {
        self.commands.borrow_mut().push(command.to_string());
        CommandOutput {
            stdout: self.listing.clone(),
            success: true,
            ..CommandOutput::default()
        }
    }

    fn label(&self) -> String {
        "db1".to_string()
    }
}

impl Transfer for FakeServer {
    fn upload(&self, _local_path: &Path, _remote_path: &str) -> CommandOutput {
        CommandOutput::failed("upload not expected")
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
        self.downloads
            .borrow_mut()
            .push((remote_path.to_string(), local_path.to_string_lossy().to_string()));
        CommandOutput {
            success: true,
            ..CommandOutput::default()
        }
    }

    fn method(&self) -> &'static str {
        "fake"
    }
}

fn target_in(dir: &Path, spec: &str) -> Target {
    target::create_in(dir, spec).unwrap()
}

#[cfg(unix)]
fn fake_rake(dir: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-rake");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
#[test]
fn local_create_runs_rake_in_working_directory() {
    let config = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    fake_rake(work.path(), r#"printf '%s\n' "$*" > args.txt; echo 20240101120000-local.tgz"#);

    let t = target_in(
        config.path(),
        r#"{"id":"local","deployTo":"/srv/app","localRake":"./fake-rake"}"#,
    );
    let mut session = Session::new(&t, LocalRunner::new(work.path()), NoRemote, work.path());
    let env = DumpEnv::from_vars([("DESC", "before upgrade"), ("LIKE", "ignored")]);

    let report = session.run(Task::LocalCreate, &env).unwrap();
    assert_eq!(report.file.as_deref(), Some("20240101120000-local.tgz"));
    assert_eq!(report.target, "local");

    let args = std::fs::read_to_string(work.path().join("args.txt")).unwrap();
    assert_eq!(args.trim(), "-s dump:create DESC=before upgrade TAGS=local");
}

#[cfg(unix)]
#[test]
fn failing_local_rake_reports_exit_code() {
    let config = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    fake_rake(work.path(), "echo 'rake aborted!' >&2; exit 4");

    let t = target_in(
        config.path(),
        r#"{"id":"local","deployTo":"/srv/app","localRake":"./fake-rake"}"#,
    );
    let mut session = Session::new(&t, LocalRunner::new(work.path()), NoRemote, work.path());

    let err = session.run(Task::LocalVersions, &DumpEnv::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::LocalCommandFailed);
    assert_eq!(err.details["exitCode"], 4);
    assert_eq!(err.details["stderr"].as_str().unwrap().trim(), "rake aborted!");
}

#[test]
fn download_places_file_in_local_dump_dir() {
    let config = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let t = target_in(
        config.path(),
        r#"{"id":"production","deployTo":"/srv/app/","localDumpDir":"backups"}"#,
    );
    let server = FakeServer::new("2.1 MB\t20240101-remote.tgz\n");
    let mut session = Session::new(&t, LocalRunner::new(work.path()), server, work.path());

    let env = DumpEnv::from_vars([("SUMMARY", "yes"), ("VER", "20240101")]);
    let report = session.run(Task::RemoteDownload, &env).unwrap();

    assert_eq!(report.file.as_deref(), Some("20240101-remote.tgz"));
    assert!(work.path().join("backups").is_dir());

    let remote = session.remote();
    assert_eq!(
        remote.commands.borrow()[0],
        "cd '/srv/app/current' && rake -s dump:versions LIKE=20240101 PROGRESS_TTY=+ RAILS_ENV=production"
    );
    let (from, to) = remote.downloads.borrow()[0].clone();
    assert_eq!(from, "/srv/app/current/dump/20240101-remote.tgz");
    assert!(to.ends_with("backups/20240101-remote.tgz"));

    let sides: Vec<Side> = report.steps.iter().map(|s| s.side).collect();
    assert_eq!(sides, vec![Side::Remote, Side::Transfer]);
}

#[test]
fn remote_tasks_without_a_server_fail_cleanly() {
    let config = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let t = target_in(config.path(), r#"{"id":"ci","deployTo":"/srv/app"}"#);
    let mut session = Session::new(&t, LocalRunner::new(work.path()), NoRemote, work.path());

    let err = session.run(Task::RemoteVersions, &DumpEnv::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
    assert_eq!(err.details["target"]["serverId"], "none");

    assert!(Task::LocalCleanup.is_local_only());
    assert!(!Task::LocalUpload.is_local_only());
}
