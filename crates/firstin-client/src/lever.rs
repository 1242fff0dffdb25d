use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use firstin_core::{Job, JobFetcher, PollError};

use crate::http::send_json;

const LEVER_BASE_URL: &str = "https://api.lever.co/v0/postings";

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Categories {
    #[serde(default)]
    location: String,
    #[serde(default)]
    all_locations: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Posting {
    id: String,
    /// Lever calls the title "text".
    text: String,
    #[serde(default)]
    categories: Categories,
    #[serde(default)]
    created_at: i64,
    hosted_url: String,
    #[serde(default)]
    apply_url: Option<String>,
}

/// Fetches jobs from the Lever public postings API.
#[derive(Clone)]
pub struct LeverAdapter {
    company_slug: String,
    company_name: String,
    client: Client,
}

impl LeverAdapter {
    pub fn new(
        company_slug: impl Into<String>,
        company_name: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            company_slug: company_slug.into(),
            company_name: company_name.into(),
            client,
        }
    }

    fn normalize(&self, postings: Vec<Posting>) -> Vec<Job> {
        postings
            .into_iter()
            .map(|lp| {
                let location = if lp.categories.all_locations.is_empty() {
                    lp.categories.location
                } else {
                    lp.categories.all_locations.join(", ")
                };

                let posted_at = posted_at_from_millis(lp.created_at);

                let mut job = Job {
                    id: lp.id,
                    company: self.company_name.clone(),
                    title: lp.text,
                    location,
                    url: lp.hosted_url,
                    posted_at,
                    first_seen: None,
                    source: "lever".to_string(),
                    detail: None,
                    insights: None,
                };
                if posted_at.is_some() || lp.apply_url.is_some() {
                    let detail = job.detail_mut();
                    detail.published_at = posted_at;
                    detail.apply_url = lp.apply_url;
                }
                job
            })
            .collect()
    }
}

/// Lever's createdAt is Unix milliseconds.
fn posted_at_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
}

impl JobFetcher for LeverAdapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let url = format!("{LEVER_BASE_URL}/{}?mode=json", self.company_slug);
        let what = format!("lever fetch for {}", self.company_slug);
        let postings: Vec<Posting> = send_json(self.client.get(&url), &cancel, &what).await?;
        Ok(self.normalize(postings))
    }
}
