use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Education,
    Health,
    Environment,
    Poverty,
    DisasterRelief,
    Animals,
    Community,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Education,
        Category::Health,
        Category::Environment,
        Category::Poverty,
        Category::DisasterRelief,
        Category::Animals,
        Category::Community,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Education => "education",
            Category::Health => "health",
            Category::Environment => "environment",
            Category::Poverty => "poverty",
            Category::DisasterRelief => "disaster-relief",
            Category::Animals => "animals",
            Category::Community => "community",
            Category::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Education => "Education",
            Category::Health => "Health & Medical",
            Category::Environment => "Environment",
            Category::Poverty => "Poverty Relief",
            Category::DisasterRelief => "Disaster Relief",
            Category::Animals => "Animal Welfare",
            Category::Community => "Community",
            Category::Other => "Other Causes",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Lkr,
    Eur,
    Gbp,
    Cad,
    Aud,
    Inr,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Lkr => "LKR",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Inr => "INR",
        }
    }
}

/// Page/limit pair taken from query strings, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub const MAX_LIMIT: u64 = 100;
    pub const MAX_PAGE: u64 = 10_000;

    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1).min(Self::MAX_PAGE);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(Self::MAX_LIMIT);
        PageRequest { page, limit }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        let total_pages = request.total_pages(total);
        Pagination {
            current_page: request.page,
            total_pages,
            total,
            has_next: request.page < total_pages,
            has_prev: request.page > 1,
        }
    }
}

/// Trailing reporting window for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl Period {
    pub fn parse(raw: Option<&str>) -> Result<Period> {
        match raw.unwrap_or("30d") {
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "90d" => Ok(Period::Quarter),
            "1y" => Ok(Period::Year),
            other => Err(AppError::invalid_data(format!(
                "Invalid period '{}'. Use 7d, 30d, 90d or 1y",
                other
            ))),
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::Year => 365,
        }
    }

    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }

    pub fn cutoff_bson(self, now: DateTime<Utc>) -> BsonDateTime {
        BsonDateTime::from_chrono(self.cutoff(now))
    }
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| AppError::invalid_data(format!("Invalid {} ID", what)))
}

pub fn now_bson() -> BsonDateTime {
    BsonDateTime::from_chrono(Utc::now())
}
