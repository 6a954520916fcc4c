use crate::error::Error;
use crate::local_files::{self, FileSystem};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

// ============================================================================
// JSON Parsing Utilities (internal)
// ============================================================================

/// Parse JSON string into typed value.
pub(crate) fn from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s)
        .map_err(|e| Error::validation_invalid_json(e, Some("parse json".to_string())))
}

/// Serialize value to pretty-printed JSON string.
pub(crate) fn to_string_pretty<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize json".to_string())))
}

/// Read JSON spec from string, file (@path), or stdin (-).
pub(crate) fn read_json_spec_to_string(spec: &str) -> Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(Error::validation_invalid_argument(
                "json",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        stdin
            .read_to_string(&mut buf)
            .map_err(|e| Error::internal_io(e.to_string(), Some("read stdin".to_string())))?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }

        return local_files::local().read(Path::new(path));
    }

    Ok(spec.to_string())
}

// ============================================================================
// Config Entity Trait
// ============================================================================

pub(crate) trait ConfigEntity: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn config_dir() -> Result<PathBuf>;
    fn not_found_error(id: String, suggestions: Vec<String>) -> Error;
    fn entity_type() -> &'static str;

    /// Entity-specific validation, run before saving.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn entity_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

fn validate_id(id: &str, entity_type: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::validation_invalid_argument(
            format!("{}.id", entity_type),
            "IDs may only contain letters, digits, '-' and '_'",
            Some(id.to_string()),
            None,
        ))
    }
}

pub(crate) fn load<T: ConfigEntity>(id: &str) -> Result<T> {
    load_in::<T>(&T::config_dir()?, id)
}

pub(crate) fn load_in<T: ConfigEntity>(dir: &Path, id: &str) -> Result<T> {
    let path = entity_path(dir, id);
    if !path.exists() {
        let suggestions = find_similar_ids(&list_ids_in(dir)?, id);
        return Err(T::not_found_error(id.to_string(), suggestions));
    }
    let content = local_files::local().read(&path)?;
    let mut entity: T = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
    entity.set_id(id.to_string());
    Ok(entity)
}

pub(crate) fn list<T: ConfigEntity>() -> Result<Vec<T>> {
    list_in::<T>(&T::config_dir()?)
}

pub(crate) fn list_in<T: ConfigEntity>(dir: &Path) -> Result<Vec<T>> {
    let entries = local_files::local().list(dir)?;

    let mut items: Vec<T> = entries
        .into_iter()
        .filter(|e| e.is_json() && !e.is_dir)
        .filter_map(|e| {
            let id = e.path.file_stem()?.to_string_lossy().to_string();
            let content = local_files::local().read(&e.path).ok()?;
            let mut entity: T = from_str(&content).ok()?;
            entity.set_id(id);
            Some(entity)
        })
        .collect();
    items.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(items)
}

pub(crate) fn list_ids_in(dir: &Path) -> Result<Vec<String>> {
    let entries = local_files::local().list(dir)?;
    let mut ids: Vec<String> = entries
        .into_iter()
        .filter(|e| e.is_json() && !e.is_dir)
        .filter_map(|e| e.path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect();
    ids.sort();
    Ok(ids)
}

pub(crate) fn save_in<T: ConfigEntity>(dir: &Path, entity: &T) -> Result<()> {
    validate_id(entity.id(), T::entity_type())?;
    entity.validate()?;

    let content = to_string_pretty(entity)?;
    local_files::local().write(&entity_path(dir, entity.id()), &content)
}

/// Create an entity from a JSON spec (inline, `@file` or `-`). The spec must carry an `id`.
pub(crate) fn create<T: ConfigEntity>(json_spec: &str) -> Result<T> {
    create_in::<T>(&T::config_dir()?, json_spec)
}

pub(crate) fn create_in<T: ConfigEntity>(dir: &Path, json_spec: &str) -> Result<T> {
    let raw = read_json_spec_to_string(json_spec)?;
    let value: serde_json::Value = from_str(&raw)?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::validation_invalid_argument("id", "Missing required field: id", None, None)
        })?
        .to_string();

    if entity_path(dir, &id).exists() {
        return Err(Error::validation_invalid_argument(
            format!("{}.id", T::entity_type()),
            format!("{} '{}' already exists", T::entity_type(), id),
            Some(id),
            None,
        ));
    }

    let mut entity: T = serde_json::from_value(value)
        .map_err(|e| Error::validation_invalid_argument("json", e.to_string(), None, None))?;
    entity.set_id(id);

    save_in(dir, &entity)?;
    Ok(entity)
}

pub(crate) fn delete_in<T: ConfigEntity>(dir: &Path, id: &str) -> Result<()> {
    let path = entity_path(dir, id);
    if !path.exists() {
        let suggestions = find_similar_ids(&list_ids_in(dir)?, id);
        return Err(T::not_found_error(id.to_string(), suggestions));
    }
    local_files::local().delete(&path)
}

/// IDs within edit distance 2 of `id`, or sharing it as a prefix.
fn find_similar_ids(ids: &[String], id: &str) -> Vec<String> {
    ids.iter()
        .filter(|candidate| {
            candidate.starts_with(id) || id.starts_with(candidate.as_str()) || edit_distance(candidate, id) <= 2
        })
        .cloned()
        .collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        prev = current;
    }

    prev[b.len()]
}
