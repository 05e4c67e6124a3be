//! Research-interest notes
//!
//! Optional collaborator: a directory of markdown notes whose filenames,
//! frontmatter, headings, and bold runs contribute keywords. A missing
//! directory is simply empty interests, never a failure.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Keywords harvested from one note
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchInterest {
    pub name: String,
    pub keywords: BTreeSet<String>,
}

/// Frontmatter keys that contribute keywords
const KEYWORD_KEYS: [&str; 4] = ["tags", "topics", "keywords", "title"];

/// Load every markdown note under `dir`
pub fn load_interests(dir: Option<&Path>) -> Vec<ResearchInterest> {
    let Some(dir) = dir else {
        return Vec::new();
    };
    if !dir.exists() {
        debug!(dir = %dir.display(), "Interests directory missing, treating as empty");
        return Vec::new();
    }

    let mut interests = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("note").to_string();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let mut keywords = BTreeSet::new();
                keywords.extend(tokenize(&name));
                keywords.extend(frontmatter_keywords(&content));
                keywords.extend(content_keywords(&content));
                interests.push(ResearchInterest { name, keywords });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable note"),
        }
    }

    debug!(count = interests.len(), "Loaded research interests");
    interests
}

/// Split a phrase into lowercase keyword tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Keywords from YAML frontmatter between leading `---` markers
fn frontmatter_keywords(content: &str) -> Vec<String> {
    let mut lines = content.lines();
    if lines.next().map(str::trim) != Some("---") {
        return Vec::new();
    }
    let block: Vec<&str> = lines.take_while(|l| l.trim() != "---").collect();
    let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&block.join("\n")) else {
        return Vec::new();
    };

    let mut keywords = Vec::new();
    if let Some(map) = value.as_mapping() {
        for key in KEYWORD_KEYS {
            match map.get(key) {
                Some(serde_yaml::Value::String(s)) => keywords.extend(tokenize(s)),
                Some(serde_yaml::Value::Sequence(seq)) => {
                    for item in seq {
                        if let Some(s) = item.as_str() {
                            keywords.extend(tokenize(s));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keywords
}

/// Keywords from headings and bold runs in the body
fn content_keywords(content: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(heading) = trimmed.strip_prefix('#') {
            keywords.extend(tokenize(heading.trim_start_matches('#')));
        }
    }
    for bold in content.split("**").skip(1).step_by(2) {
        keywords.extend(tokenize(bold));
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_is_empty() {
        assert!(load_interests(None).is_empty());
        assert!(load_interests(Some(Path::new("/definitely/not/here"))).is_empty());
    }

    #[test]
    fn test_filename_contributes_keywords() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("distributed-authorship.md"), "body").unwrap();

        let interests = load_interests(Some(temp.path()));
        assert_eq!(interests.len(), 1);
        assert!(interests[0].keywords.contains("distributed"));
        assert!(interests[0].keywords.contains("authorship"));
    }

    #[test]
    fn test_frontmatter_tags_and_title() {
        let temp = TempDir::new().unwrap();
        let note = "---\ntags: [attribution, style]\ntitle: Authorship Signals\n---\n\nbody text\n";
        std::fs::write(temp.path().join("note.md"), note).unwrap();

        let interests = load_interests(Some(temp.path()));
        let kw = &interests[0].keywords;
        assert!(kw.contains("attribution"));
        assert!(kw.contains("style"));
        assert!(kw.contains("authorship"));
        assert!(kw.contains("signals"));
    }

    #[test]
    fn test_headings_and_bold() {
        let temp = TempDir::new().unwrap();
        let note = "# Stylometry Methods\n\nSome **burstiness** metrics matter.\n";
        std::fs::write(temp.path().join("note.md"), note).unwrap();

        let interests = load_interests(Some(temp.path()));
        let kw = &interests[0].keywords;
        assert!(kw.contains("stylometry"));
        assert!(kw.contains("methods"));
        assert!(kw.contains("burstiness"));
    }

    #[test]
    fn test_non_markdown_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("data.json"), "{}").unwrap();
        assert!(load_interests(Some(temp.path())).is_empty());
    }
}
