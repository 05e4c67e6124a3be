//! The fixed category set and per-category action suggestions

use super::Project;

/// Base category set offered to the model on every classification
pub const BASE_CATEGORIES: [&str; 14] = [
    "Development",
    "Research",
    "Shopping",
    "Social Media",
    "Entertainment",
    "News",
    "Communication",
    "Productivity",
    "Education",
    "Transaction (Protected)",
    "Academic (Synthesis)",
    "Health",
    "Travel",
    "Other",
];

/// Synthesized category label for an active project, extending the base set
pub fn project_category_label(project: &Project) -> String {
    let kind = project.category_type.as_deref().unwrap_or("Project");
    format!("{kind}: {}", project.name)
}

/// A short suggested action per category, used for the derived task list
pub fn suggested_action(category: &str) -> &'static str {
    match category {
        "Development" => "Finish or branch the work, then close",
        "Research" => "Capture findings into notes",
        "Shopping" => "Decide: buy, wishlist, or drop",
        "Social Media" => "Close; revisit deliberately",
        "Entertainment" => "Queue for off-hours",
        "News" => "Skim and close",
        "Communication" => "Reply or archive",
        "Productivity" => "Process to done or scheduled",
        "Education" => "Schedule a study block",
        "Transaction (Protected)" => "Complete the transaction",
        "Academic (Synthesis)" => "Roll into synthesis notes",
        "Health" => "Book or record, then close",
        "Travel" => "Confirm bookings and save itineraries",
        _ => "Review and resolve",
    }
}
