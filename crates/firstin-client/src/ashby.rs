use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use firstin_core::{Job, JobFetcher, PollError};

use crate::greenhouse::parse_rfc3339;
use crate::http::send_json;

const ASHBY_BASE_URL: &str = "https://api.ashbyhq.com/posting-api/job-board";

#[derive(Deserialize)]
struct BoardResponse {
    jobs: Vec<BoardJob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardJob {
    title: String,
    #[serde(default)]
    location: String,
    job_url: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    is_listed: bool,
}

/// Fetches jobs from the Ashby public job board API.
#[derive(Clone)]
pub struct AshbyAdapter {
    board_token: String,
    company_name: String,
    client: Client,
}

impl AshbyAdapter {
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

    fn normalize(&self, jobs: Vec<BoardJob>) -> Vec<Job> {
        jobs.into_iter()
            // Unlisted records stay on the API after being pulled; skip them.
            .filter(|aj| aj.is_listed)
            .map(|aj| {
                let posted_at = aj.published_at.as_deref().and_then(parse_rfc3339);
                let mut job = Job {
                    // Ashby exposes no separate id; the posting URL is unique
                    // and stable per job.
                    id: aj.job_url.clone(),
                    company: self.company_name.clone(),
                    title: aj.title,
                    location: aj.location,
                    url: aj.job_url,
                    posted_at,
                    first_seen: None,
                    source: "ashby".to_string(),
                    detail: None,
                    insights: None,
                };
                if let Some(t) = posted_at {
                    job.detail_mut().published_at = Some(t);
                }
                job
            })
            .collect()
    }
}

impl JobFetcher for AshbyAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let url = format!("{ASHBY_BASE_URL}/{}", self.board_token);
        let what = format!("ashby fetch for {}", self.board_token);
        let response: BoardResponse = send_json(self.client.get(&url), &cancel, &what).await?;
        Ok(self.normalize(response.jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> AshbyAdapter {
        AshbyAdapter::new("acme", "Acme", Client::new())
    }

    #[test]
    fn unlisted_jobs_are_skipped() {
        let body = r#"{
            "jobs": [
                {"title": "Listed", "location": "Remote", "jobUrl": "https://jobs.ashbyhq.com/acme/1", "publishedAt": "2025-06-01T00:00:00Z", "isListed": true},
                {"title": "Hidden", "location": "Remote", "jobUrl": "https://jobs.ashbyhq.com/acme/2", "publishedAt": "2025-06-01T00:00:00Z", "isListed": false}
            ]
        }"#;
        let response: BoardResponse = serde_json::from_str(body).unwrap();
        let jobs = adapter().normalize(response.jobs);

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Listed");
    }

    #[test]
    fn published_at_maps_to_posted_at_and_url_is_the_id() {
        let body = r#"{
            "jobs": [
                {"title": "Platform Engineer", "location": "NYC", "jobUrl": "https://jobs.ashbyhq.com/acme/3", "publishedAt": "2025-06-01T09:00:00Z", "isListed": true}
            ]
        }"#;
        let response: BoardResponse = serde_json::from_str(body).unwrap();
        let jobs = adapter().normalize(response.jobs);

        let job = &jobs[0];
        assert_eq!(job.id, "https://jobs.ashbyhq.com/acme/3");
        assert_eq!(job.url, job.id);
        assert_eq!(job.source, "ashby");
        assert_eq!(job.posted_at, parse_rfc3339("2025-06-01T09:00:00Z"));
        assert_eq!(
            job.detail.as_ref().unwrap().published_at,
            job.posted_at
        );
    }

    #[test]
    fn missing_published_at_yields_no_timestamp() {
        let body = r#"{"jobs": [{"title": "X", "jobUrl": "https://x/1", "isListed": true}]}"#;
        let response: BoardResponse = serde_json::from_str(body).unwrap();
        let jobs = adapter().normalize(response.jobs);
        assert!(jobs[0].posted_at.is_none());
    }
}
