//! Scenario catalog
//!
//! Role-play scenarios grouped into chapters, embedded in the binary and
//! parsed once at startup. The set is closed, like the language table.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A single role-play scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// URL-friendly slug
    pub id: String,
    pub title: String,
    pub description: String,
    /// The natural-language role-play prompt sent as the `initialize` text
    pub instructions: String,
}

/// A themed group of scenarios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub conversations: Vec<Scenario>,
}

static CHAPTERS: Lazy<Vec<Chapter>> = Lazy::new(|| {
    serde_json::from_str(include_str!("scenarios.json")).expect("embedded scenario catalog is valid")
});

/// All chapters, in catalog order
pub fn list_chapters() -> &'static [Chapter] {
    &CHAPTERS
}

/// Find a scenario by its slug across all chapters
pub fn find_scenario(id: &str) -> Option<&'static Scenario> {
    CHAPTERS
        .iter()
        .flat_map(|chapter| chapter.conversations.iter())
        .find(|scenario| scenario.id == id)
}
