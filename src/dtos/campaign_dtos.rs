use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document, Regex};
use serde::Deserialize;
use validator::Validate;

use crate::models::campaign::CampaignStatus;
use crate::models::common::{Category, Currency, PageRequest};

pub const DEFAULT_PAGE_SIZE: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CampaignSort {
    #[default]
    Newest,
    Progress,
    Target,
    EndingSoon,
}

impl CampaignSort {
    /// Unknown values fall back to newest-first.
    pub fn parse(raw: Option<&str>) -> CampaignSort {
        match raw {
            Some("progress") => CampaignSort::Progress,
            Some("target") => CampaignSort::Target,
            Some("ending-soon") => CampaignSort::EndingSoon,
            _ => CampaignSort::Newest,
        }
    }

    pub fn sort_doc(self) -> Document {
        match self {
            CampaignSort::Newest => doc! { "createdAt": -1 },
            CampaignSort::Progress => doc! { "raised": -1, "createdAt": -1 },
            CampaignSort::Target => doc! { "goal": -1, "createdAt": -1 },
            CampaignSort::EndingSoon => doc! { "endDate": 1 },
        }
    }
}

/// `category=all` (or absent) means no category filter; anything else must
/// name a known category.
fn category_filter(raw: Option<&str>) -> Option<Option<Category>> {
    match raw {
        None | Some("") | Some("all") => Some(None),
        Some(other) => Category::parse(other).map(Some),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub category: Option<String>,
    pub sort: Option<String>,
}

impl CampaignQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, DEFAULT_PAGE_SIZE)
    }

    /// `None` when the category is not recognised, so the listing is empty.
    pub fn filter(&self) -> Option<Document> {
        let mut filter = doc! { "status": CampaignStatus::Active.as_str() };
        if let Some(category) = category_filter(self.category.as_deref())? {
            filter.insert("category", category.as_str());
        }
        Some(filter)
    }

    pub fn sort(&self) -> CampaignSort {
        CampaignSort::parse(self.sort.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl SearchQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, DEFAULT_PAGE_SIZE)
    }

    pub fn term(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn filter(&self) -> Option<Document> {
        let mut filter = doc! { "status": CampaignStatus::Active.as_str() };

        let term = self.term();
        if !term.is_empty() {
            let pattern = Regex {
                pattern: escape_regex(term),
                options: "i".to_string(),
            };
            filter.insert(
                "$or",
                vec![
                    doc! { "title": pattern.clone() },
                    doc! { "description": pattern.clone() },
                    doc! { "organizationName": pattern },
                ],
            );
        }

        if let Some(category) = category_filter(self.category.as_deref())? {
            filter.insert("category", category.as_str());
        }

        if self.min_amount.is_some() || self.max_amount.is_some() {
            let mut range = Document::new();
            if let Some(min) = self.min_amount {
                range.insert("$gte", min);
            }
            if let Some(max) = self.max_amount {
                range.insert("$lte", max);
            }
            filter.insert("goal", range);
        }
        Some(filter)
    }
}

/// Escapes regex metacharacters so a search term matches literally.
pub fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: u64) -> i64 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(default)
            .min(PageRequest::MAX_LIMIT) as i64
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn page_request(&self, default_limit: u64) -> PageRequest {
        PageRequest::new(self.page, self.limit, default_limit)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: String,

    #[validate(length(min = 1, max = 200, message = "Short description must be between 1 and 200 characters"))]
    pub short_description: String,

    #[validate(range(min = 1.0, message = "Goal must be at least 1"))]
    pub goal: f64,

    #[serde(default)]
    pub currency: Currency,

    pub category: Category,

    #[validate(length(min = 1, max = 120, message = "Organization name is required"))]
    pub organization_name: String,

    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,

    pub start_date: Option<DateTime<Utc>>,

    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Short description must be between 1 and 200 characters"))]
    pub short_description: Option<String>,

    #[validate(range(min = 1.0, message = "Goal must be at least 1"))]
    pub goal: Option<f64>,

    pub category: Option<Category>,

    #[validate(length(min = 1, max = 120, message = "Organization name cannot be empty"))]
    pub organization_name: Option<String>,

    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,

    pub end_date: Option<DateTime<Utc>>,
}

impl UpdateCampaignRequest {
    /// `$set` body for the supplied fields; `None` when nothing was supplied.
    pub fn set_document(&self) -> Option<Document> {
        let mut set = Document::new();
        if let Some(title) = &self.title {
            set.insert("title", title.trim());
        }
        if let Some(description) = &self.description {
            set.insert("description", description);
        }
        if let Some(short) = &self.short_description {
            set.insert("shortDescription", short);
        }
        if let Some(goal) = self.goal {
            set.insert("goal", goal);
        }
        if let Some(category) = self.category {
            set.insert("category", category.as_str());
        }
        if let Some(org) = &self.organization_name {
            set.insert("organizationName", org.trim());
        }
        if let Some(url) = &self.image_url {
            set.insert("imageUrl", url);
        }
        if let Some(end) = self.end_date {
            set.insert("endDate", mongodb::bson::DateTime::from_chrono(end));
        }
        if set.is_empty() {
            None
        } else {
            Some(set)
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CampaignUpdateRequest {
    #[validate(length(min = 1, max = 150, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "Content is required"))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReportRequest {
    #[validate(length(min = 1, max = 150, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "Description is required"))]
    pub description: String,

    #[validate(url(message = "Attachment URL must be a valid URL"))]
    pub attachment_url: Option<String>,

    pub report_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CampaignStatusRequest {
    pub status: CampaignStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parsing_falls_back_to_newest() {
        assert_eq!(CampaignSort::parse(Some("ending-soon")), CampaignSort::EndingSoon);
        assert_eq!(CampaignSort::parse(Some("progress")), CampaignSort::Progress);
        assert_eq!(CampaignSort::parse(Some("popular")), CampaignSort::Newest);
        assert_eq!(CampaignSort::parse(None).sort_doc(), doc! { "createdAt": -1 });
        assert_eq!(CampaignSort::EndingSoon.sort_doc(), doc! { "endDate": 1 });
    }

    #[test]
    fn listing_filter_defaults_to_active() {
        let query = CampaignQuery::default();
        assert_eq!(query.filter(), Some(doc! { "status": "active" }));

        let query = CampaignQuery {
            category: Some("all".into()),
            ..Default::default()
        };
        assert_eq!(query.filter(), Some(doc! { "status": "active" }));

        let query = CampaignQuery {
            category: Some("disaster-relief".into()),
            ..Default::default()
        };
        assert_eq!(
            query.filter(),
            Some(doc! { "status": "active", "category": "disaster-relief" })
        );

        let query = CampaignQuery {
            category: Some("crypto".into()),
            ..Default::default()
        };
        assert_eq!(query.filter(), None);
    }

    #[test]
    fn search_filter_combines_text_and_goal_range() {
        let query = SearchQuery {
            q: Some(" clean water ".into()),
            min_amount: Some(100.0),
            max_amount: Some(5_000.0),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert_eq!(filter.get_array("$or").unwrap().len(), 3);
        let goal = filter.get_document("goal").unwrap();
        assert_eq!(goal.get_f64("$gte").unwrap(), 100.0);
        assert_eq!(goal.get_f64("$lte").unwrap(), 5_000.0);

        let bare = SearchQuery::default().filter().unwrap();
        assert!(!bare.contains_key("$or"));
        assert!(!bare.contains_key("goal"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a+b (c)"), "a\\+b \\(c\\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn partial_update_only_sets_supplied_fields() {
        assert!(UpdateCampaignRequest::default().set_document().is_none());

        let update = UpdateCampaignRequest {
            title: Some("  New title ".into()),
            goal: Some(2_500.0),
            ..Default::default()
        };
        assert_eq!(
            update.set_document(),
            Some(doc! { "title": "New title", "goal": 2_500.0 })
        );
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(LimitQuery { limit: None }.limit_or(6), 6);
        assert_eq!(LimitQuery { limit: Some(0) }.limit_or(6), 6);
        assert_eq!(LimitQuery { limit: Some(10_000) }.limit_or(6), 100);
    }
}
