use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use firstin_core::{Job, JobFetcher, JobFilter, PollError};

use crate::http::send_json;

const WORKDAY_PAGE_SIZE: usize = 20;

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Posted (\d+) Days? Ago$").expect("valid regex"));
static AMBIGUOUS_LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+ Locations?$").expect("valid regex"));

// ---- Workday CXS API types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingRequest {
    applied_facets: serde_json::Value,
    limit: usize,
    offset: usize,
    search_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingResponse {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    job_postings: Vec<Listing>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct Listing {
    #[serde(default)]
    title: String,
    #[serde(default)]
    external_path: String,
    #[serde(default)]
    locations_text: String,
    #[serde(default)]
    posted_on: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    job_posting_info: DetailInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailInfo {
    #[serde(default)]
    job_req_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    posted_on: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    external_url: String,
    #[serde(default)]
    additional_locations: Vec<String>,
}

/// Fetches jobs from a Workday career site.
///
/// Two-phase: paginate POST /jobs for listings, then GET /job/{path} for
/// each fresh listing. The detail fetch is where the stable req id, the
/// real location set, and the apply URL come from.
#[derive(Clone)]
pub struct WorkdayAdapter {
    base_url: String,
    company_name: String,
    client: Client,
    /// Used to skip detail fetches for listings that clearly won't match.
    /// Optimization only; the poller's filter is the source of truth.
    pre_filter: Option<Arc<dyn JobFilter>>,
    audit_mode: bool,
}

impl WorkdayAdapter {
    pub fn new(
        base_url: impl Into<String>,
        company_name: impl Into<String>,
        client: Client,
        pre_filter: Option<Arc<dyn JobFilter>>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            company_name: company_name.into(),
            client,
            pre_filter,
            audit_mode: false,
        }
    }

    /// Audit mode returns every listing regardless of freshness; only fresh
    /// listings still get a detail fetch, the rest carry listing-level data.
    pub fn set_audit_mode(&mut self, enabled: bool) {
        self.audit_mode = enabled;
    }

    async fn fetch_all_listings(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Listing>, PollError> {
        let url = format!("{}/jobs", self.base_url);
        let what = format!("workday listing fetch for {}", self.company_name);
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let body = ListingRequest {
                applied_facets: serde_json::json!({}),
                limit: WORKDAY_PAGE_SIZE,
                offset,
                search_text: String::new(),
            };
            let page: ListingResponse =
                send_json(self.client.post(&url).json(&body), cancel, &what).await?;

            // Results are roughly reverse-chronological: once a whole page
            // has nothing fresh, older pages cannot either. Checking only the
            // last entry would stop too early, since a stale entry can precede
            // a fresh one on the same page.
            let any_fresh = page.job_postings.iter().any(|l| is_fresh_posting(&l.posted_on));
            let page_empty = page.job_postings.is_empty();
            all.extend(page.job_postings);

            if !self.audit_mode && (!any_fresh || page_empty) {
                break;
            }
            offset += WORKDAY_PAGE_SIZE;
            if offset >= page.total || page_empty {
                break;
            }
        }

        Ok(all)
    }

    /// Build a Job from listing-level data only. Used in audit mode for
    /// stale listings where the detail call is skipped.
    fn job_from_listing(&self, l: &Listing) -> Job {
        let mut job = Job {
            id: l.external_path.clone(),
            company: self.company_name.clone(),
            title: l.title.clone(),
            location: l.locations_text.clone(),
            url: String::new(),
            posted_at: parse_posted_on(&l.posted_on),
            first_seen: None,
            source: "workday".to_string(),
            detail: None,
            insights: None,
        };
        if !l.posted_on.is_empty() {
            job.detail_mut().posted_on = Some(l.posted_on.clone());
        }
        job
    }

    async fn fetch_detail(
        &self,
        cancel: &CancellationToken,
        listing: &Listing,
    ) -> Result<Job, PollError> {
        let url = format!("{}/{}", self.base_url, listing.external_path);
        let what = format!("workday detail fetch for {}", self.company_name);
        let detail: DetailResponse = send_json(self.client.get(&url), cancel, &what).await?;
        let info = detail.job_posting_info;

        let mut location = info.location;
        if !info.additional_locations.is_empty() {
            location = format!("{location}; {}", info.additional_locations.join("; "));
        }

        // Prefer the explicit startDate; fall back to the relative
        // postedOn string mapped to a UTC midnight. Both are day-granular,
        // so a job posted late in the day can look up to a day older than
        // it is.
        let posted_at = parse_start_date(&info.start_date)
            .or_else(|| parse_posted_on(&info.posted_on));

        let mut job = Job {
            id: info.job_req_id,
            company: self.company_name.clone(),
            title: info.title,
            location,
            url: info.external_url,
            posted_at,
            first_seen: None,
            source: "workday".to_string(),
            detail: None,
            insights: None,
        };
        if !info.posted_on.is_empty() {
            job.detail_mut().posted_on = Some(info.posted_on);
        }
        if let Some(start) = parse_start_date(&info.start_date) {
            job.detail_mut().start_date = Some(start);
        }
        Ok(job)
    }

    /// Whether a fresh listing is worth a detail call. Ambiguous location
    /// strings like "2 Locations" always pass; the real locations are only
    /// known after the detail fetch.
    fn listing_passes_pre_filter(&self, l: &Listing) -> bool {
        let Some(filter) = &self.pre_filter else {
            return true;
        };
        if is_ambiguous_location(&l.locations_text) {
            return true;
        }
        let candidate = Job {
            id: String::new(),
            company: self.company_name.clone(),
            title: l.title.clone(),
            location: l.locations_text.clone(),
            url: String::new(),
            posted_at: None,
            first_seen: None,
            source: "workday".to_string(),
            detail: None,
            insights: None,
        };
        filter.matches(&candidate)
    }
}

impl JobFetcher for WorkdayAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let listings = self.fetch_all_listings(&cancel).await?;

        let mut jobs = Vec::new();
        for listing in &listings {
            let fresh = is_fresh_posting(&listing.posted_on);
            if !fresh && !self.audit_mode {
                continue;
            }
            if fresh && !self.listing_passes_pre_filter(listing) {
                continue;
            }
            if fresh {
                jobs.push(self.fetch_detail(&cancel, listing).await?);
            } else {
                jobs.push(self.job_from_listing(listing));
            }
        }
        Ok(jobs)
    }
}

/// True when the relative posted-on string indicates a recent posting
/// (today or yesterday). Used to pick which listings deserve a detail call
/// and when to stop paginating.
fn is_fresh_posting(posted_on: &str) -> bool {
    match posted_on {
        "Posted Today" | "Posted Yesterday" => true,
        other => parse_days_ago(other).is_some_and(|n| n <= 1),
    }
}

/// Map Workday's relative posted-on string to the UTC midnight of that day.
/// "Posted 30+ Days Ago" and unrecognized strings yield `None`.
fn parse_posted_on(posted_on: &str) -> Option<DateTime<Utc>> {
    let today = Utc::now().date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    match posted_on {
        "Posted Today" => Some(today),
        "Posted Yesterday" => Some(today - Duration::days(1)),
        other => parse_days_ago(other).map(|n| today - Duration::days(n)),
    }
}

fn parse_days_ago(s: &str) -> Option<i64> {
    DAYS_AGO_RE
        .captures(s)
        .and_then(|caps| caps[1].parse().ok())
}

/// Workday start dates come as plain "YYYY-MM-DD".
fn parse_start_date(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

fn is_ambiguous_location(location: &str) -> bool {
    AMBIGUOUS_LOCATION_RE.is_match(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_posting_recognizes_today_yesterday_and_small_n() {
        assert!(is_fresh_posting("Posted Today"));
        assert!(is_fresh_posting("Posted Yesterday"));
        assert!(is_fresh_posting("Posted 1 Day Ago"));
        assert!(!is_fresh_posting("Posted 2 Days Ago"));
        assert!(!is_fresh_posting("Posted 30+ Days Ago"));
        assert!(!is_fresh_posting(""));
    }

    #[test]
    fn posted_on_maps_to_utc_midnights() {
        let today = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();

        assert_eq!(parse_posted_on("Posted Today"), Some(today));
        assert_eq!(
            parse_posted_on("Posted Yesterday"),
            Some(today - Duration::days(1))
        );
        assert_eq!(
            parse_posted_on("Posted 7 Days Ago"),
            Some(today - Duration::days(7))
        );
        assert_eq!(parse_posted_on("Posted 30+ Days Ago"), None);
        assert_eq!(parse_posted_on("something else"), None);
    }

    #[test]
    fn start_date_parses_plain_dates() {
        let parsed = parse_start_date("2025-06-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T00:00:00+00:00");
        assert!(parse_start_date("").is_none());
        assert!(parse_start_date("06/01/2025").is_none());
    }

    #[test]
    fn ambiguous_locations_match_the_pattern() {
        assert!(is_ambiguous_location("2 Locations"));
        assert!(is_ambiguous_location("15 Locations"));
        assert!(is_ambiguous_location("1 Location"));
        assert!(!is_ambiguous_location("India, Pune"));
        assert!(!is_ambiguous_location("Remote"));
    }

    #[test]
    fn listing_response_parses_cxs_shape() {
        let body = r#"{
            "total": 42,
            "jobPostings": [
                {"title": "Engineer", "externalPath": "job/ACME/Engineer_R1", "locationsText": "2 Locations", "postedOn": "Posted Today", "bulletFields": ["R1"]}
            ]
        }"#;
        let response: ListingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.total, 42);
        assert_eq!(response.job_postings[0].external_path, "job/ACME/Engineer_R1");
        assert_eq!(response.job_postings[0].posted_on, "Posted Today");
    }

    #[test]
    fn pre_filter_lets_ambiguous_locations_through() {
        struct LocationOnly;
        impl JobFilter for LocationOnly {
            fn matches(&self, job: &Job) -> bool {
                job.location.to_lowercase().contains("pune")
            }
        }

        let adapter = WorkdayAdapter::new(
            "https://acme.wd1.myworkdayjobs.com/wday/cxs/acme/careers",
            "Acme",
            Client::new(),
            Some(Arc::new(LocationOnly)),
        );

        let ambiguous = Listing {
            title: "Engineer".into(),
            external_path: "job/1".into(),
            locations_text: "3 Locations".into(),
            posted_on: "Posted Today".into(),
        };
        let mismatched = Listing {
            title: "Engineer".into(),
            external_path: "job/2".into(),
            locations_text: "London, UK".into(),
            posted_on: "Posted Today".into(),
        };
        let matched = Listing {
            title: "Engineer".into(),
            external_path: "job/3".into(),
            locations_text: "India, Pune".into(),
            posted_on: "Posted Today".into(),
        };

        assert!(adapter.listing_passes_pre_filter(&ambiguous));
        assert!(!adapter.listing_passes_pre_filter(&mismatched));
        assert!(adapter.listing_passes_pre_filter(&matched));
    }

    #[test]
    fn stale_listing_keeps_best_listing_level_data() {
        let adapter = WorkdayAdapter::new(
            "https://acme.wd1.myworkdayjobs.com/wday/cxs/acme/careers",
            "Acme",
            Client::new(),
            None,
        );
        let listing = Listing {
            title: "Old Role".into(),
            external_path: "job/ACME/Old_R9".into(),
            locations_text: "Austin, TX".into(),
            posted_on: "Posted 12 Days Ago".into(),
        };

        let job = adapter.job_from_listing(&listing);
        assert_eq!(job.id, "job/ACME/Old_R9");
        assert_eq!(job.location, "Austin, TX");
        assert!(job.posted_at.is_some());
        assert_eq!(
            job.detail.as_ref().unwrap().posted_on.as_deref(),
            Some("Posted 12 Days Ago")
        );
    }
}
