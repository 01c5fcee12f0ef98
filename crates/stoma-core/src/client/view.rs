//! Filtering and search over in-memory item and article lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use stoma_db::models::{CarePlanItem, EducationArticle};

/// Which items a task list shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl CompletionFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn accepts(&self, item: &CarePlanItem) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !item.completed,
            Self::Completed => item.completed,
        }
    }
}

impl fmt::Display for CompletionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(format!(
                "invalid filter: {other:?} (expected all, pending, or completed)"
            )),
        }
    }
}

/// Case-insensitive substring match of `query` against any of `fields`.
/// A blank query matches everything.
fn matches_search(query: &str, fields: &[&str]) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

/// Items accepted by `filter` whose title or description contains `search`.
pub fn filter_items<'a>(
    items: &'a [CarePlanItem],
    filter: CompletionFilter,
    search: &str,
) -> Vec<&'a CarePlanItem> {
    items
        .iter()
        .filter(|item| filter.accepts(item))
        .filter(|item| matches_search(search, &[item.title.as_str(), item.description.as_str()]))
        .collect()
}

/// Articles in `category` (all when `None`) whose title or summary contains
/// `search`.
pub fn filter_articles<'a>(
    articles: &'a [EducationArticle],
    category: Option<&str>,
    search: &str,
) -> Vec<&'a EducationArticle> {
    articles
        .iter()
        .filter(|a| category.is_none_or(|c| a.category == c))
        .filter(|a| matches_search(search, &[a.title.as_str(), a.summary.as_str()]))
        .collect()
}

/// Distinct article categories in first-seen order.
pub fn categories(articles: &[EducationArticle]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for article in articles {
        if !seen.contains(&article.category.as_str()) {
            seen.push(article.category.as_str());
        }
    }
    seen
}

/// Completed over total items of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn of(items: &[CarePlanItem]) -> Self {
        Self {
            completed: items.iter().filter(|i| i.completed).count(),
            total: items.len(),
        }
    }

    /// Whole-number percentage; an empty plan counts as 0%.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.completed, self.total, self.percent())
    }
}
