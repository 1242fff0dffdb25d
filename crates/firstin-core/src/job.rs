use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unified representation of a job listing from any ATS.
///
/// Adapters produce transient `Job` values; the poller owns them for one
/// cycle; only the seen-set store outlives a cycle, and it keeps nothing but
/// `(id, first_seen)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier, unique and stable within one ATS family + board.
    pub id: String,
    /// Human-readable employer name.
    pub company: String,
    /// Posting title.
    pub title: String,
    /// Free-text location. May be empty, never absent.
    #[serde(default)]
    pub location: String,
    /// Canonical apply or listing URL.
    pub url: String,
    /// Publication timestamp when the upstream provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Set by the store on first commit, not by adapters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// ATS family tag: "greenhouse", "ashby", "lever", "workday", "microsoft", "gem".
    pub source: String,
    /// Adapter-specific enrichment from detail endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<JobDetail>,
    /// Analyzer output, absent unless the analyzer ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<JobInsights>,
}

impl Job {
    /// Lazily create the detail bag and return a mutable reference to it.
    pub fn detail_mut(&mut self) -> &mut JobDetail {
        self.detail.get_or_insert_with(JobDetail::default)
    }
}

/// Source-specific metadata populated during fetch or on-demand via a
/// detail endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDetail {
    /// Separate apply link (Lever applyUrl, Workday externalUrl).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
    /// Raw posted-on string (Workday: "Posted Today").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_on: Option<String>,
    /// Workday start date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Greenhouse updated_at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Greenhouse first_published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_published: Option<DateTime<Utc>>,
    /// Ashby publishedAt, Lever createdAt, Microsoft postedTs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Greenhouse requisition id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requisition_id: Option<String>,
    /// Greenhouse salary info.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pay_ranges: Vec<PayRange>,
    /// Plain-text job description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A salary/pay range from Greenhouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRange {
    pub min_cents: i64,
    pub max_cents: i64,
    pub currency_type: String,
    pub title: String,
}

/// AI-generated insights about a job posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInsights {
    /// Role category, e.g. "backend", "infra", "AI/ML".
    pub role_type: String,
    /// Years-of-experience requirement as stated, e.g. "3-5".
    pub years_exp: String,
    /// Up to eight technologies mentioned in the description.
    pub tech_stack: Vec<String>,
    /// Exactly three short takeaways.
    pub key_points: [String; 3],
}
