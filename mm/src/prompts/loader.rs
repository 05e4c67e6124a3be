//! Prompt Loader
//!
//! Loads prompt templates from the prompts directory or falls back to
//! embedded defaults, then renders them through Handlebars.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;

/// Renders prompt templates for the classification passes
pub struct PromptLoader {
    handlebars: Handlebars<'static>,
}

impl PromptLoader {
    /// Build a loader. Files named `<template>.pmt` in `override_dir` shadow
    /// the embedded defaults.
    pub fn new(override_dir: Option<&PathBuf>) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // prompts are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        for name in embedded::NAMES {
            let source = match override_dir.map(|d| d.join(format!("{name}.pmt"))) {
                Some(path) if path.exists() => {
                    info!(%name, path = %path.display(), "Loading prompt override");
                    std::fs::read_to_string(&path)?
                }
                _ => embedded::get_embedded(name)
                    .ok_or_else(|| eyre!("No embedded template named {name}"))?
                    .to_string(),
            };
            handlebars.register_template_string(name, source)?;
        }

        Ok(Self { handlebars })
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        debug!(%name, "render: called");
        Ok(self.handlebars.render(name, context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_renders_embedded_classify() {
        let loader = PromptLoader::new(None).unwrap();
        let prompt = loader
            .render(
                "classify",
                &json!({
                    "context_block": "",
                    "preference_lines": "",
                    "tab_lines": "1. Rust book | https://doc.rust-lang.org/book",
                    "category_lines": "- Development\n- Research",
                    "tab_count": 1,
                }),
            )
            .unwrap();
        assert!(prompt.contains("1. Rust book | https://doc.rust-lang.org/book"));
        assert!(prompt.contains("keyed \"1\" through \"1\""));
    }

    #[test]
    fn test_no_html_escaping() {
        let loader = PromptLoader::new(None).unwrap();
        let prompt = loader
            .render(
                "deepdive",
                &json!({
                    "url": "https://a.example/q?x=1&y=2",
                    "title": "A \"quoted\" title",
                    "reason": "r",
                    "hints": "",
                    "content": "c",
                }),
            )
            .unwrap();
        assert!(prompt.contains("x=1&y=2"));
        assert!(prompt.contains("\"quoted\""));
    }

    #[test]
    fn test_override_dir_shadows_embedded() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("classify.pmt"), "OVERRIDE {{tab_count}}").unwrap();
        let dir = temp.path().to_path_buf();
        let loader = PromptLoader::new(Some(&dir)).unwrap();
        let prompt = loader.render("classify", &json!({"tab_count": 4})).unwrap();
        assert_eq!(prompt, "OVERRIDE 4");
    }
}
