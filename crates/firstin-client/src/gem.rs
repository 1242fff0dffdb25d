use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use firstin_core::{Job, JobFetcher, PollError};

use crate::greenhouse::parse_rfc3339;
use crate::http::send_json;
use crate::text::extract_text;

const GEM_BASE_URL: &str = "https://api.gem.com/job_board/v0";

#[derive(Deserialize)]
struct BoardJob {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: BoardLocation,
    #[serde(default)]
    absolute_url: String,
    #[serde(default)]
    first_published_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_plain: Option<String>,
}

#[derive(Deserialize, Default)]
struct BoardLocation {
    #[serde(default)]
    name: String,
}

/// Fetches jobs from the Gem public job board API.
#[derive(Clone)]
pub struct GemAdapter {
    board_token: String,
    company_name: String,
    client: Client,
}

impl GemAdapter {
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
            .map(|gj| {
                let mut job = Job {
                    id: gj.id,
                    company: self.company_name.clone(),
                    title: gj.title,
                    location: gj.location.name,
                    url: gj.absolute_url,
                    posted_at: gj.first_published_at.as_deref().and_then(parse_rfc3339),
                    first_seen: None,
                    source: "gem".to_string(),
                    detail: None,
                    insights: None,
                };
                if let Some(t) = gj.updated_at.as_deref().and_then(parse_rfc3339) {
                    job.detail_mut().updated_at = Some(t);
                }
                let description = gj
                    .content_plain
                    .filter(|c| !c.is_empty())
                    .or_else(|| gj.content.filter(|c| !c.is_empty()).map(|c| extract_text(&c)));
                if let Some(desc) = description.filter(|d| !d.is_empty()) {
                    job.detail_mut().description = Some(desc);
                }
                job
            })
            .collect()
    }
}

impl JobFetcher for GemAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let url = format!("{GEM_BASE_URL}/{}/job_posts/", self.board_token);
        let what = format!("gem fetch for {}", self.board_token);
        let jobs: Vec<BoardJob> = send_json(self.client.get(&url), &cancel, &what).await?;
        Ok(self.normalize(jobs))
    }
}
