//! Deterministic keyword classifier
//!
//! The fallback when the LLM pipeline fails outright: a fixed pattern table
//! scores every tab against each base category. Results are tagged
//! `source = "mock"` so downstream consumers can tell them apart.

use std::collections::BTreeMap;
use tracing::info;

use sessionstore::{GroupItem, TabReasoning};

use super::Tab;

struct CategoryPatterns {
    category: &'static str,
    url_hits: &'static [&'static str],
    keyword_hits: &'static [&'static str],
}

/// Enumeration order breaks ties: earlier wins
const PATTERNS: &[CategoryPatterns] = &[
    CategoryPatterns {
        category: "Development",
        url_hits: &["github.com", "gitlab.com", "stackoverflow.com", "docs.rs", "crates.io", "localhost"],
        keyword_hits: &["api", "code", "compiler", "debug", "repository", "pull request"],
    },
    CategoryPatterns {
        category: "Research",
        url_hits: &["arxiv.org", "scholar.google", "wikipedia.org", "semanticscholar.org"],
        keyword_hits: &["paper", "study", "research", "analysis", "dataset"],
    },
    CategoryPatterns {
        category: "Shopping",
        url_hits: &["amazon.", "ebay.", "etsy.com", "aliexpress.com"],
        keyword_hits: &["cart", "price", "buy", "order", "deal", "review"],
    },
    CategoryPatterns {
        category: "Social Media",
        url_hits: &["twitter.com", "x.com", "facebook.com", "instagram.com", "reddit.com", "linkedin.com"],
        keyword_hits: &["feed", "follow", "post", "thread"],
    },
    CategoryPatterns {
        category: "Entertainment",
        url_hits: &["youtube.com", "netflix.com", "spotify.com", "twitch.tv"],
        keyword_hits: &["watch", "episode", "trailer", "playlist", "stream"],
    },
    CategoryPatterns {
        category: "News",
        url_hits: &["nytimes.com", "bbc.", "cnn.com", "theguardian.com", "news.ycombinator.com"],
        keyword_hits: &["breaking", "headline", "news", "report"],
    },
    CategoryPatterns {
        category: "Communication",
        url_hits: &["mail.google.com", "outlook.", "slack.com", "discord.com", "zoom.us"],
        keyword_hits: &["inbox", "email", "meeting", "chat", "message"],
    },
    CategoryPatterns {
        category: "Productivity",
        url_hits: &["notion.so", "trello.com", "calendar.google.com", "docs.google.com", "todoist.com"],
        keyword_hits: &["todo", "task", "agenda", "spreadsheet", "plan"],
    },
    CategoryPatterns {
        category: "Education",
        url_hits: &["coursera.org", "udemy.com", "khanacademy.org", "edx.org"],
        keyword_hits: &["course", "lesson", "tutorial", "lecture", "exercise"],
    },
    CategoryPatterns {
        category: "Transaction (Protected)",
        url_hits: &["checkout", "/cart", "paypal.com", "payment"],
        keyword_hits: &["checkout", "payment", "invoice", "order confirmation", "billing"],
    },
    CategoryPatterns {
        category: "Academic (Synthesis)",
        url_hits: &["zotero.org", "overleaf.com", "notebooklm"],
        keyword_hits: &["bibliography", "citation", "synthesis", "literature review"],
    },
    CategoryPatterns {
        category: "Health",
        url_hits: &["webmd.com", "mayoclinic.org", "nih.gov"],
        keyword_hits: &["symptom", "doctor", "health", "appointment", "dosage"],
    },
    CategoryPatterns {
        category: "Travel",
        url_hits: &["booking.com", "airbnb.com", "expedia.", "maps.google"],
        keyword_hits: &["flight", "hotel", "itinerary", "trip", "directions"],
    },
];

/// Result of a mock classification
#[derive(Debug)]
pub struct MockClassification {
    pub groups: BTreeMap<String, Vec<GroupItem>>,
    pub per_tab: BTreeMap<String, TabReasoning>,
    pub narrative: String,
}

fn score_tab(tab: &Tab, patterns: &CategoryPatterns) -> (u32, Vec<String>) {
    let url = tab.url.to_lowercase();
    let title = tab.title.to_lowercase();
    let content = tab.content.to_lowercase();

    let mut score = 0;
    let mut signals = Vec::new();

    if let Some(hit) = patterns.url_hits.iter().find(|p| url.contains(*p)) {
        score += 3;
        signals.push(format!("url:{hit}"));
    }
    if let Some(hit) = patterns.keyword_hits.iter().find(|p| title.contains(*p)) {
        score += 2;
        signals.push(format!("title:{hit}"));
    }
    if let Some(hit) = patterns.keyword_hits.iter().find(|p| content.contains(*p)) {
        score += 1;
        signals.push(format!("content:{hit}"));
    }

    (score, signals)
}

/// Classify every tab against the pattern table. Tabs with no signal at all
/// land in "Other".
pub fn classify_mock(tabs: &[Tab]) -> MockClassification {
    let mut groups: BTreeMap<String, Vec<GroupItem>> = BTreeMap::new();
    let mut per_tab = BTreeMap::new();

    for (i, tab) in tabs.iter().enumerate() {
        let index = i as u32 + 1;

        let mut best: (&str, u32, Vec<String>) = ("Other", 0, Vec::new());
        for patterns in PATTERNS {
            let (score, signals) = score_tab(tab, patterns);
            if score > best.1 {
                best = (patterns.category, score, signals);
            }
        }

        let (category, _, signals) = best;
        groups.entry(category.to_string()).or_default().push(GroupItem {
            tab_index: index,
            title: tab.title.clone(),
            url: tab.url.clone(),
        });
        per_tab.insert(
            index.to_string(),
            TabReasoning {
                category: category.to_string(),
                signals,
                confidence: "low".to_string(),
                title: tab.title.clone(),
                url: tab.url.clone(),
            },
        );
    }

    let narrative = narrative_from_groups(tabs.len(), &groups);
    info!(tabs = tabs.len(), groups = groups.len(), "Mock classification complete");

    MockClassification {
        groups,
        per_tab,
        narrative,
    }
}

fn narrative_from_groups(total: usize, groups: &BTreeMap<String, Vec<GroupItem>>) -> String {
    let mut sizes: Vec<(&str, usize)> = groups.iter().map(|(c, items)| (c.as_str(), items.len())).collect();
    sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let parts: Vec<String> = sizes.iter().map(|(c, n)| format!("{n} {c}")).collect();
    format!("Heuristic classification of {total} tabs: {}.", parts.join(", "))
}
