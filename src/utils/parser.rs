//! Text extraction from dump command output.

use regex::Regex;

/// Last tab-separated field of the last non-blank line.
///
/// `dump:versions` prints one dump per line, optionally prefixed with
/// tab-separated columns, so this yields the newest dump's file name.
pub fn last_part_of_last_line(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    let line = match Regex::new(r"\s*[\n\r]\s*") {
        Ok(re) => re.split(trimmed).last().unwrap_or(trimmed).to_string(),
        Err(_) => trimmed.lines().last().unwrap_or(trimmed).trim().to_string(),
    };

    line.split('\t')
        .last()
        .map(str::to_string)
        .filter(|part| !part.is_empty())
}

/// Trimmed output, or `None` when the command printed nothing.
pub fn present(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
