use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::filter::PatternFilter;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Role whose primary server runs the dump tasks.
pub const DB_ROLE: &str = "db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub primary: bool,
}

fn default_port() -> u16 {
    22
}

impl Server {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host".to_string());
        }
        if self.user.trim().is_empty() {
            missing.push("user".to_string());
        }
        missing
    }
}

/// A deployment target: where the application lives and which servers host it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(skip_deserializing, default)]
    pub id: String,
    pub deploy_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_path: Option<String>,
    #[serde(default = "default_rails_env")]
    pub rails_env: String,
    #[serde(default = "default_rake")]
    pub rake: String,
    #[serde(default = "default_rake")]
    pub local_rake: String,
    #[serde(default = "default_local_dump_dir")]
    pub local_dump_dir: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

fn default_rails_env() -> String {
    "production".to_string()
}

fn default_rake() -> String {
    "rake".to_string()
}

fn default_local_dump_dir() -> String {
    "dump".to_string()
}

impl Target {
    pub fn current_path(&self) -> String {
        self.current_path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| join_remote(&self.deploy_to, "current"))
    }

    pub fn shared_path(&self) -> String {
        self.shared_path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| join_remote(&self.deploy_to, "shared"))
    }

    /// Remote dump directory inside the current release.
    pub fn remote_dump_dir(&self) -> String {
        join_remote(&self.current_path(), "dump")
    }

    /// Server that runs `role` tasks: the first selected server flagged
    /// `primary`, else the first selected server with the role.
    pub fn primary(&self, role: &str, selection: &HostSelection) -> Result<&Server> {
        let mut candidates = self
            .servers
            .iter()
            .filter(|s| s.has_role(role) && selection.matches(s))
            .peekable();

        let first = candidates.peek().copied();
        candidates
            .find(|s| s.primary)
            .or(first)
            .ok_or_else(|| {
                let ids = self
                    .servers
                    .iter()
                    .filter(|s| s.has_role(role))
                    .map(|s| s.id.clone())
                    .collect();
                Error::server_not_found(format!("{}:{}", self.id, role), ids).with_hint(format!(
                    "No server with role '{}' matches the host/role selection",
                    role
                ))
            })
    }
}

impl ConfigEntity for Target {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn config_dir() -> Result<PathBuf> {
        paths::targets()
    }
    fn not_found_error(id: String, suggestions: Vec<String>) -> Error {
        Error::target_not_found(id, suggestions)
    }
    fn entity_type() -> &'static str {
        "target"
    }

    fn validate(&self) -> Result<()> {
        if self.deploy_to.trim().is_empty() {
            return Err(Error::config_missing_key(
                "deployTo",
                Some(self.id.clone()),
            ));
        }
        if self.local_dump_dir.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "localDumpDir",
                Some(self.local_dump_dir.clone()),
                "must name a directory",
            ));
        }
        for server in &self.servers {
            let missing = server.missing_fields();
            if !missing.is_empty() {
                return Err(Error::ssh_server_invalid(server.id.clone(), missing));
            }
            if server.port == 0 {
                return Err(Error::config_invalid_value(
                    format!("servers.{}.port", server.id),
                    Some(server.port.to_string()),
                    "port must be between 1 and 65535",
                ));
            }
        }
        Ok(())
    }
}

/// Restricts which servers tasks may run on.
///
/// `hosts` is matched against a server's host name or id; `roles` passes a
/// server when any of its roles is listed (or, inverted, when none is).
#[derive(Debug, Clone, Default)]
pub struct HostSelection {
    pub hosts: PatternFilter,
    pub roles: PatternFilter,
}

impl HostSelection {
    pub fn new(hosts: Option<&str>, roles: Option<&str>) -> Self {
        Self {
            hosts: PatternFilter::new(hosts),
            roles: PatternFilter::new(roles),
        }
    }

    pub fn matches(&self, server: &Server) -> bool {
        let host_ok = if self.hosts.is_inverted() {
            self.hosts.pass(&server.host) && self.hosts.pass(&server.id)
        } else {
            self.hosts.pass(&server.host) || self.hosts.pass(&server.id)
        };
        host_ok && self.roles.custom_pass(|role| server.has_role(role))
    }
}

fn join_remote(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child)
}

// ============================================================================
// Core CRUD - Thin wrappers around config module
// ============================================================================

pub fn load(id: &str) -> Result<Target> {
    config::load::<Target>(id)
}

pub fn load_in(dir: &Path, id: &str) -> Result<Target> {
    config::load_in::<Target>(dir, id)
}

pub fn list() -> Result<Vec<Target>> {
    config::list::<Target>()
}

pub fn list_in(dir: &Path) -> Result<Vec<Target>> {
    config::list_in::<Target>(dir)
}

pub fn create(json_spec: &str) -> Result<Target> {
    config::create::<Target>(json_spec)
}

pub fn create_in(dir: &Path, json_spec: &str) -> Result<Target> {
    config::create_in::<Target>(dir, json_spec)
}

pub fn delete(id: &str) -> Result<()> {
    delete_in(&Target::config_dir()?, id)
}

pub fn delete_in(dir: &Path, id: &str) -> Result<()> {
    config::delete_in::<Target>(dir, id)
}
