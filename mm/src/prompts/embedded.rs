//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Pass 1: classify and triage
pub const CLASSIFY: &str = include_str!("../../prompts/classify.pmt");

/// Pass 2: per-tab deep dive
pub const DEEPDIVE: &str = include_str!("../../prompts/deepdive.pmt");

/// Pass 3: Mermaid visualization
pub const VISUALIZE: &str = include_str!("../../prompts/visualize.pmt");

/// Pass 4: project-aware thematic analysis
pub const THEMES: &str = include_str!("../../prompts/themes.pmt");

/// Pass 4: simplified shape when no projects are active
pub const THEMES_SIMPLE: &str = include_str!("../../prompts/themes-simple.pmt");

/// All embedded template names, in registration order
pub const NAMES: [&str; 5] = ["classify", "deepdive", "visualize", "themes", "themes-simple"];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "classify" => Some(CLASSIFY),
        "deepdive" => Some(DEEPDIVE),
        "visualize" => Some(VISUALIZE),
        "themes" => Some(THEMES),
        "themes-simple" => Some(THEMES_SIMPLE),
        _ => None,
    }
}
