use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use firstin_core::{DetailFetcher, Job, JobFetcher, PollError};

use crate::http::send_json;
use crate::text::extract_text;

const MICROSOFT_BASE_URL: &str = "https://apply.careers.microsoft.com";
const MICROSOFT_PAGE_SIZE: usize = 10;
const MICROSOFT_CUTOFF_HOURS: i64 = 24;
/// Caps audit mode at 200 jobs (20 pages × 10).
const MICROSOFT_AUDIT_MAX_PAGES: usize = 20;

// ---- Microsoft search API types ----

#[derive(Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    positions: Vec<Position>,
    #[serde(default)]
    count: usize,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct Position {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    posted_ts: i64,
    #[serde(default)]
    position_url: String,
}

#[derive(Deserialize)]
struct DetailResponse {
    data: DetailData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailData {
    #[serde(default)]
    job_description: String,
    #[serde(default)]
    public_url: String,
}

/// Fetches jobs from the Microsoft careers search API.
///
/// The upstream board is enormous, so the adapter applies its own 24-hour
/// freshness gate on top of the poller's window and stops paginating once a
/// whole page has nothing inside it.
#[derive(Clone)]
pub struct MicrosoftAdapter {
    company_name: String,
    client: Client,
    audit_mode: bool,
}

impl MicrosoftAdapter {
    pub fn new(company_name: impl Into<String>, client: Client) -> Self {
        Self {
            company_name: company_name.into(),
            client,
            audit_mode: false,
        }
    }

    /// Audit mode returns all listings regardless of freshness, capped at
    /// [`MICROSOFT_AUDIT_MAX_PAGES`] pages.
    pub fn set_audit_mode(&mut self, enabled: bool) {
        self.audit_mode = enabled;
    }

    fn search_url(start: usize) -> String {
        let mut url = url::Url::parse(MICROSOFT_BASE_URL)
            .expect("static base URL parses")
            .join("/api/pcsx/search")
            .expect("static path joins");
        url.query_pairs_mut()
            .append_pair("domain", "microsoft.com")
            .append_pair("query", "software engineer")
            .append_pair("location", "United States")
            .append_pair("start", &start.to_string())
            .append_pair("sort_by", "timestamp")
            .append_pair("filter_include_remote", "1");
        url.into()
    }

    async fn fetch_all_positions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Position>, PollError> {
        let cutoff = Utc::now() - Duration::hours(MICROSOFT_CUTOFF_HOURS);
        let mut all = Vec::new();
        let mut start = 0;

        loop {
            let what = format!("microsoft fetch page (start={start})");
            let response: SearchResponse =
                send_json(self.client.get(Self::search_url(start)), cancel, &what).await?;
            let positions = response.data.positions;
            let count = response.data.count;

            // Results are sorted by timestamp, so once a full page is
            // outside the cutoff there is nothing fresh further in.
            let any_fresh = positions
                .iter()
                .any(|p| posted_at_from_secs(p.posted_ts).is_some_and(|t| t > cutoff));
            let page_empty = positions.is_empty();
            all.extend(positions);

            if !self.audit_mode && (!any_fresh || page_empty) {
                break;
            }
            start += MICROSOFT_PAGE_SIZE;
            if start >= count || page_empty {
                break;
            }
            if self.audit_mode && start >= MICROSOFT_AUDIT_MAX_PAGES * MICROSOFT_PAGE_SIZE {
                break;
            }
        }

        Ok(all)
    }

    fn job_from_position(&self, p: &Position, posted_at: DateTime<Utc>) -> Job {
        let location = p.locations.first().cloned().unwrap_or_default();
        let mut job = Job {
            id: p.id.to_string(),
            company: self.company_name.clone(),
            title: p.name.clone(),
            location,
            url: format!("{MICROSOFT_BASE_URL}{}", p.position_url),
            posted_at: Some(posted_at),
            first_seen: None,
            source: "microsoft".to_string(),
            detail: None,
            insights: None,
        };
        job.detail_mut().published_at = Some(posted_at);
        job
    }
}

/// Microsoft's postedTs is Unix seconds; zero means unknown.
fn posted_at_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
}

impl JobFetcher for MicrosoftAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let positions = self.fetch_all_positions(&cancel).await?;

        let cutoff = Utc::now() - Duration::hours(MICROSOFT_CUTOFF_HOURS);
        let mut jobs = Vec::with_capacity(positions.len());
        for p in &positions {
            let Some(posted_at) = posted_at_from_secs(p.posted_ts) else {
                continue;
            };
            if !self.audit_mode && posted_at < cutoff {
                continue;
            }
            jobs.push(self.job_from_position(p, posted_at));
        }
        Ok(jobs)
    }
}

impl DetailFetcher for MicrosoftAdapter {
    async fn fetch_job_detail(
        &self,
        cancel: CancellationToken,
        mut job: Job,
    ) -> Result<Job, PollError> {
        if job
            .detail
            .as_ref()
            .is_some_and(|d| d.description.is_some())
        {
            return Ok(job);
        }

        let mut url = url::Url::parse(MICROSOFT_BASE_URL)
            .expect("static base URL parses")
            .join("/api/pcsx/position_details")
            .expect("static path joins");
        url.query_pairs_mut()
            .append_pair("position_id", &job.id)
            .append_pair("domain", "microsoft.com")
            .append_pair("hl", "en")
            .append_pair("queried_location", "United States");

        let what = format!("microsoft detail fetch for job {}", job.id);
        let detail: DetailResponse =
            send_json(self.client.get(url.as_str()), &cancel, &what).await?;

        if !detail.data.job_description.is_empty() {
            job.detail_mut().description = Some(extract_text(&detail.data.job_description));
        }
        if !detail.data.public_url.is_empty() {
            // The detail endpoint has the canonical public URL.
            job.url = detail.data.public_url;
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MicrosoftAdapter {
        MicrosoftAdapter::new("Microsoft", Client::new())
    }

    fn position(id: i64, posted_ts: i64) -> Position {
        Position {
            id,
            name: format!("Engineer {id}"),
            locations: vec!["Redmond, WA".into(), "Remote".into()],
            posted_ts,
            position_url: format!("/us/en/job/{id}"),
        }
    }

    #[test]
    fn posted_ts_maps_unix_seconds() {
        assert_eq!(
            posted_at_from_secs(1717243200),
            DateTime::<Utc>::from_timestamp(1717243200, 0)
        );
        assert!(posted_at_from_secs(0).is_none());
        assert!(posted_at_from_secs(-5).is_none());
    }

    #[test]
    fn normalization_uses_first_location_and_prefixed_url() {
        let now = Utc::now();
        let p = position(99, now.timestamp());
        let job = adapter().job_from_position(&p, now);

        assert_eq!(job.id, "99");
        assert_eq!(job.location, "Redmond, WA");
        assert_eq!(
            job.url,
            "https://apply.careers.microsoft.com/us/en/job/99"
        );
        assert_eq!(job.source, "microsoft");
        assert_eq!(job.detail.as_ref().unwrap().published_at, Some(now));
    }

    #[test]
    fn internal_gate_drops_stale_and_untimestamped_positions() {
        // Exercise the filtering logic directly on parsed positions.
        let fresh_ts = Utc::now().timestamp();
        let stale_ts = (Utc::now() - Duration::hours(48)).timestamp();
        let adapter = adapter();
        let cutoff = Utc::now() - Duration::hours(MICROSOFT_CUTOFF_HOURS);

        let positions = [position(1, fresh_ts), position(2, stale_ts), position(3, 0)];
        let kept: Vec<&Position> = positions
            .iter()
            .filter(|p| posted_at_from_secs(p.posted_ts).is_some_and(|t| t >= cutoff))
            .collect();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
        let job = adapter.job_from_position(kept[0], posted_at_from_secs(fresh_ts).unwrap());
        assert!(job.posted_at.is_some());
    }

    #[test]
    fn search_response_parses_nested_data() {
        let body = r#"{
            "data": {
                "positions": [
                    {"id": 7, "name": "SWE II", "locations": ["Redmond, WA"], "postedTs": 1717243200, "positionUrl": "/us/en/job/7"}
                ],
                "count": 1200
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.data.count, 1200);
        assert_eq!(response.data.positions[0].id, 7);
        assert_eq!(response.data.positions[0].posted_ts, 1717243200);
    }

    #[test]
    fn search_url_carries_fixed_query_and_offset() {
        let url = MicrosoftAdapter::search_url(30);
        assert!(url.starts_with("https://apply.careers.microsoft.com/api/pcsx/search?"));
        assert!(url.contains("start=30"));
        assert!(url.contains("sort_by=timestamp"));
    }
}
