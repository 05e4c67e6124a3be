//! Longitudinal analysis: aggregation, queries, themes, interests

mod aggregator;
mod interests;
mod queries;
mod themes;

pub use aggregator::{Aggregate, ProjectSighting, TabOccurrence};
pub use interests::{ResearchInterest, load_interests};
pub use queries::{
    DISTRACTION_CATEGORIES, DistractionSignature, ProjectHealth, ProjectStatus, RecurringTab,
    get_distraction_signature, get_project_health, get_recurring_unfinished, parse_time_range,
};
pub use themes::{
    MIN_CLUSTER_SIZE, Theme, ThemeAction, ThemeDetector, ThemeFeedback, ThemeFeedbackStore, UrlRecurrence,
};
