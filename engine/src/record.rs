//! The structured biographical record assembled by a run.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A change of military rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Promotion {
    /// Rank attained (e.g. "少将", "中将", "上将").
    pub rank: String,
    /// Date of the promotion in YYYY or YYYY-MM-DD format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Unit or organization at the time of the promotion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Biographical record of one officer.
///
/// `name` and `source_url` are the identity fields and are always present
/// on an accepted record. Every other field is optional and must only be
/// asserted when the source text attests it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Biography {
    /// Name of the officer as written in the source.
    pub name: String,
    /// URL (or file:// reference) of the source document.
    pub source_url: String,
    /// Kind of source (obituary, news article, encyclopedia entry, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Romanized name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinyin_name: Option<String>,
    /// Hometown or birthplace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hometown: Option<String>,
    /// Birth date (YYYY or YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// Date of joining the military (YYYY or YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enlistment_date: Option<String>,
    /// Date of joining the party (YYYY or YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_membership_date: Option<String>,
    /// Retirement date (YYYY or YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retirement_date: Option<String>,
    /// Date of death (YYYY or YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    /// National party congress participations (e.g. "第十五次全国代表大会").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congress_participation: Option<Vec<String>>,
    /// CPPCC participations (e.g. "第十一届全国委员会委员").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cppcc_participation: Option<Vec<String>>,
    /// Rank changes in the order given by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotions: Option<Vec<Promotion>>,
    /// Notable positions held.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable_positions: Option<Vec<String>>,
    /// Awards and honors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awards: Option<Vec<String>>,
    /// Spouse name. Leave absent unless the source names the spouse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse_name: Option<String>,
    /// Extraction certainty in [0, 1].
    #[serde(default)]
    pub confidence: f64,
    /// Free-text reasoning about the extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Optional fields whose presence counts toward record completeness.
pub const COMPLETENESS_FIELDS: [&str; 7] = [
    "pinyin_name",
    "hometown",
    "birth_date",
    "enlistment_date",
    "party_membership_date",
    "promotions",
    "notable_positions",
];

/// Fields holding a single `YYYY` / `YYYY-MM-DD` date.
pub const DATE_FIELDS: [&str; 5] = [
    "birth_date",
    "enlistment_date",
    "party_membership_date",
    "retirement_date",
    "death_date",
];

/// Fields holding a list of strings.
pub const LIST_FIELDS: [&str; 5] = [
    "congress_participation",
    "cppcc_participation",
    "promotions",
    "notable_positions",
    "awards",
];

impl Biography {
    /// Creates a record with only the identity fields set.
    #[must_use]
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            source_type: None,
            pinyin_name: None,
            hometown: None,
            birth_date: None,
            enlistment_date: None,
            party_membership_date: None,
            retirement_date: None,
            death_date: None,
            congress_participation: None,
            cppcc_participation: None,
            promotions: None,
            notable_positions: None,
            awards: None,
            spouse_name: None,
            confidence: 0.0,
            notes: None,
        }
    }

    /// JSON schema of the record, as declared to the reasoning service.
    #[must_use]
    pub fn json_schema() -> Value {
        json!(schema_for!(Self))
    }

    /// A filled-in example used by the example tool and in prompts.
    #[must_use]
    pub fn example() -> Self {
        Self {
            pinyin_name: Some("Lin Bingyao".to_string()),
            hometown: Some("福建晋江".to_string()),
            birth_date: Some("1943".to_string()),
            enlistment_date: Some("1961".to_string()),
            party_membership_date: Some("1964".to_string()),
            death_date: Some("2025-08-18".to_string()),
            congress_participation: Some(vec!["第十五次全国代表大会".to_string()]),
            cppcc_participation: Some(vec!["第十一届全国委员会委员".to_string()]),
            promotions: Some(vec![
                Promotion {
                    rank: "少将".to_string(),
                    date: Some("1995".to_string()),
                    unit: None,
                },
                Promotion {
                    rank: "中将".to_string(),
                    date: Some("2002".to_string()),
                    unit: None,
                },
            ]),
            notable_positions: Some(vec!["原南京军区副司令员".to_string()]),
            confidence: 0.95,
            ..Self::new("林炳尧", "https://www.news.cn/20250901/obituary/c.html")
        }
    }

    /// Number of [`COMPLETENESS_FIELDS`] that are populated.
    #[must_use]
    pub fn populated_completeness_fields(&self) -> usize {
        [
            self.pinyin_name.is_some(),
            self.hometown.is_some(),
            self.birth_date.is_some(),
            self.enlistment_date.is_some(),
            self.party_membership_date.is_some(),
            self.promotions.as_ref().is_some_and(|p| !p.is_empty()),
            self.notable_positions.as_ref().is_some_and(|p| !p.is_empty()),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}
