//! Prompt templates for the classification passes

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
