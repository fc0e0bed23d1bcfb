//! Keyword loading from a markdown file.
//!
//! Keywords live in a markdown document, optionally split into per-language
//! sections (`## English`, `## Français`, ...). Each non-empty line inside the
//! selected section is one search term; list markers are stripped.

use crate::error::Result;
use std::path::Path;
use tracing::{debug, warn};

/// Load keywords from `path`, restricted to `section` when given.
///
/// Returns an empty list if the section does not exist. Errors only when
/// the file itself cannot be read.
pub fn load_keywords(path: &Path, section: Option<&str>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let keywords = parse_keywords(&text, section);

    if keywords.is_empty() {
        warn!(path = ?path, section = ?section, "No keywords found");
    } else {
        debug!(count = keywords.len(), section = ?section, "Loaded keywords");
    }

    Ok(keywords)
}

/// Extract keywords from markdown text.
///
/// With a section name, only lines under the first heading whose text starts
/// with that name (case-insensitive) are used, up to the next heading of the
/// same or higher level or a `---` rule. Without one, the whole document is
/// used and heading lines and `Label:` lines are skipped.
pub fn parse_keywords(text: &str, section: Option<&str>) -> Vec<String> {
    match section {
        Some(name) => parse_section(text, name),
        None => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| heading_level(line).is_none())
            .filter(|line| !line.ends_with(':'))
            .map(strip_list_marker)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn parse_section(text: &str, name: &str) -> Vec<String> {
    let wanted = name.trim().to_lowercase();
    let mut section_level: Option<usize> = None;
    let mut keywords = Vec::new();

    for line in text.lines().map(str::trim) {
        let heading = heading_level(line);

        match section_level {
            None => {
                if let Some(level) = heading {
                    let title = line[level..].trim().to_lowercase();
                    if title.starts_with(&wanted) {
                        section_level = Some(level);
                    }
                }
            }
            Some(level) => {
                if line.starts_with("---") {
                    break;
                }
                match heading {
                    Some(l) if l <= level => break,
                    Some(_) => continue,
                    None => {}
                }
                let keyword = strip_list_marker(line);
                if !keyword.is_empty() {
                    keywords.push(keyword.to_string());
                }
            }
        }
    }

    keywords
}

/// Number of leading `#` for a markdown heading, `None` for other lines.
fn heading_level(line: &str) -> Option<usize> {
    let level = line.chars().take_while(|c| *c == '#').count();
    (level > 0).then_some(level)
}

fn strip_list_marker(line: &str) -> &str {
    match line.chars().next() {
        Some('-' | '*' | '+') => line[1..].trim_start(),
        _ => line,
    }
}
