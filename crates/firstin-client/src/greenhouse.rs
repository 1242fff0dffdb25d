use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use firstin_core::{DetailFetcher, Job, JobFetcher, PayRange, PollError};

use crate::http::send_json;
use crate::text::extract_text;

const GREENHOUSE_BASE_URL: &str = "https://boards-api.greenhouse.io/v1/boards";

// ---- Greenhouse API types ----

#[derive(Deserialize)]
struct BoardResponse {
    jobs: Vec<BoardJob>,
}

#[derive(Deserialize)]
struct BoardJob {
    id: i64,
    title: String,
    #[serde(default)]
    location: BoardLocation,
    absolute_url: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Deserialize, Default)]
struct BoardLocation {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct JobDetailResponse {
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    first_published: Option<String>,
    #[serde(default)]
    requisition_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    pay_input_ranges: Vec<PayInputRange>,
}

#[derive(Deserialize)]
struct PayInputRange {
    #[serde(default)]
    min_cents: i64,
    #[serde(default)]
    max_cents: i64,
    #[serde(default)]
    currency_type: String,
    #[serde(default)]
    title: String,
}

/// Fetches jobs from the Greenhouse public boards API.
#[derive(Clone)]
pub struct GreenhouseAdapter {
    board_token: String,
    company_name: String,
    client: Client,
}

impl GreenhouseAdapter {
    pub fn new(
        board_token: impl Into<String>,
        company_name: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            board_token: board_token.into(),
            company_name: company_name.into(),
            client,
        }
    }

    fn normalize(&self, gj: BoardJob) -> Job {
        // The board listing only exposes updated_at; it stands in for the
        // publication time until a detail fetch promotes first_published.
        let posted_at = gj.updated_at.as_deref().and_then(parse_rfc3339);

        let mut job = Job {
            id: gj.id.to_string(),
            company: self.company_name.clone(),
            title: gj.title,
            location: gj.location.name,
            url: gj.absolute_url,
            posted_at,
            first_seen: None,
            source: "greenhouse".to_string(),
            detail: None,
            insights: None,
        };
        if let Some(t) = posted_at {
            job.detail_mut().updated_at = Some(t);
        }
        job
    }
}

pub(crate) fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl JobFetcher for GreenhouseAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let url = format!("{GREENHOUSE_BASE_URL}/{}/jobs", self.board_token);
        let what = format!("greenhouse fetch for {}", self.board_token);
        let response: BoardResponse =
            send_json(self.client.get(&url), &cancel, &what).await?;

        Ok(response
            .jobs
            .into_iter()
            .map(|gj| self.normalize(gj))
            .collect())
    }
}

impl DetailFetcher for GreenhouseAdapter {
    async fn fetch_job_detail(
        &self,
        cancel: CancellationToken,
        mut job: Job,
    ) -> Result<Job, PollError> {
        let url = format!("{GREENHOUSE_BASE_URL}/{}/jobs/{}", self.board_token, job.id);
        let what = format!("greenhouse detail for {} job {}", self.company_name, job.id);
        let detail: JobDetailResponse = send_json(self.client.get(&url), &cancel, &what).await?;

        if let Some(t) = detail.updated_at.as_deref().and_then(parse_rfc3339) {
            job.detail_mut().updated_at = Some(t);
        }
        if let Some(t) = detail.first_published.as_deref().and_then(parse_rfc3339) {
            // first_published is the real publication time; promote it over
            // the listing-level updated_at stand-in.
            job.detail_mut().first_published = Some(t);
            job.posted_at = Some(t);
        }
        if let Some(req_id) = detail.requisition_id.filter(|r| !r.is_empty()) {
            job.detail_mut().requisition_id = Some(req_id);
        }
        if let Some(content) = detail.content.as_deref().filter(|c| !c.is_empty()) {
            job.detail_mut().description = Some(extract_text(content));
        }
        if !detail.pay_input_ranges.is_empty() {
            job.detail_mut().pay_ranges = detail
                .pay_input_ranges
                .into_iter()
                .map(|pr| PayRange {
                    min_cents: pr.min_cents,
                    max_cents: pr.max_cents,
                    currency_type: pr.currency_type,
                    title: pr.title,
                })
                .collect();
        }

        Ok(job)
    }
}
