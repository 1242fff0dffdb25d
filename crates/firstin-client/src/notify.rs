use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use firstin_core::{Job, Notifier, PollError};

use crate::http::{map_request_error, parse_retry_after};

/// Writes new job matches to the log as structured events. Never fails.
#[derive(Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    async fn notify(&self, jobs: &[Job]) -> Result<(), PollError> {
        for job in jobs {
            match job.posted_at {
                Some(posted_at) => tracing::info!(
                    company = %job.company,
                    title = %job.title,
                    location = %job.location,
                    url = %job.url,
                    posted_at = %posted_at.to_rfc3339(),
                    "new job"
                ),
                None => tracing::info!(
                    company = %job.company,
                    title = %job.title,
                    location = %job.location,
                    url = %job.url,
                    "new job"
                ),
            }
        }
        Ok(())
    }
}

/// Sends job alerts to a Slack channel via Incoming Webhooks.
///
/// Each job goes out as its own Block Kit message, spaced 500 ms apart. A
/// 429 gets one in-place retry honoring Retry-After. The batch fails only
/// when every message failed; partial delivery counts as success, which can
/// re-alert the failed subset on a later cycle. That duplicate is this
/// notifier's documented trade-off, not the poller's concern.
#[derive(Clone)]
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, client: Client) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client,
        }
    }

    async fn send_message(&self, job: &Job) -> Result<(), PollError> {
        let payload = build_payload(job);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(map_request_error)?;

        if response.status().as_u16() == 429 {
            let delay = parse_retry_after(response.headers())
                .filter(|d| !d.is_zero())
                .unwrap_or(Duration::from_secs(1));
            tracing::warn!(retry_after_secs = delay.as_secs(), "slack rate limited, retrying");
            tokio::time::sleep(delay).await;

            let retried = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await
                .map_err(map_request_error)?;
            if !retried.status().is_success() {
                return Err(PollError::Notify(format!(
                    "slack returned {} on retry",
                    retried.status().as_u16()
                )));
            }
            tracing::info!(company = %job.company, title = %job.title, retried = true, "slack message sent");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(PollError::Notify(format!(
                "slack returned {}",
                response.status().as_u16()
            )));
        }
        tracing::info!(company = %job.company, title = %job.title, "slack message sent");
        Ok(())
    }
}

impl Notifier for SlackNotifier {
    async fn notify(&self, jobs: &[Job]) -> Result<(), PollError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut failures = 0;
        for (i, job) in jobs.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if let Err(err) = self.send_message(job).await {
                tracing::error!(
                    company = %job.company,
                    title = %job.title,
                    error = %err,
                    "slack notification failed"
                );
                failures += 1;
            }
        }

        if failures == jobs.len() {
            return Err(PollError::Notify(format!(
                "all {failures} slack notifications failed"
            )));
        }
        tracing::info!(sent = jobs.len() - failures, failed = failures, "slack notifications complete");
        Ok(())
    }
}

/// Runtime-selected notifier backend.
#[derive(Clone)]
pub enum AnyNotifier {
    Log(LogNotifier),
    Slack(SlackNotifier),
}

impl Notifier for AnyNotifier {
    async fn notify(&self, jobs: &[Job]) -> Result<(), PollError> {
        match self {
            AnyNotifier::Log(n) => n.notify(jobs).await,
            AnyNotifier::Slack(n) => n.notify(jobs).await,
        }
    }
}

/// Deliver one synthetic job to verify the integration end to end.
pub async fn send_test_notification<N: Notifier>(notifier: &N) -> Result<(), PollError> {
    let now = Utc::now();
    let job = Job {
        id: "test-001".to_string(),
        company: "FirstIn Test".to_string(),
        title: "Test Notification — Integration Verified".to_string(),
        location: "Everywhere".to_string(),
        url: "https://www.ycombinator.com/jobs".to_string(),
        posted_at: Some(now),
        first_seen: Some(now),
        source: "test".to_string(),
        detail: None,
        insights: None,
    };
    notifier.notify(&[job]).await
}

// ---- Block Kit payload types ----

#[derive(Serialize)]
struct SlackPayload {
    blocks: Vec<SlackBlock>,
}

#[derive(Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<SlackText>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackText>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    elements: Vec<SlackElement>,
}

impl SlackBlock {
    fn of_type(block_type: &'static str) -> Self {
        Self {
            block_type,
            text: None,
            fields: Vec::new(),
            elements: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

#[derive(Serialize)]
struct SlackElement {
    #[serde(rename = "type")]
    element_type: &'static str,
    text: SlackText,
    url: String,
    style: &'static str,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn mrkdwn(text: String) -> SlackText {
    SlackText {
        text_type: "mrkdwn",
        text,
    }
}

fn build_payload(job: &Job) -> SlackPayload {
    let posted_text = match job.posted_at {
        Some(posted_at) => posted_at.to_rfc2822(),
        None => "Just detected".to_string(),
    };

    let company = capitalize(&job.company);
    let source = capitalize(&job.source);

    let mut header = SlackBlock::of_type("header");
    header.text = Some(SlackText {
        text_type: "plain_text",
        text: format!("🚀 {company}: {}", job.title),
    });

    let mut who_where = SlackBlock::of_type("section");
    who_where.fields = vec![
        mrkdwn(format!("*Company:*\n{company}")),
        mrkdwn(format!("*Location:*\n{}", job.location)),
    ];

    let mut when_whence = SlackBlock::of_type("section");
    when_whence.fields = vec![
        mrkdwn(format!("*Posted:*\n{posted_text}")),
        mrkdwn(format!("*Source:*\n{source}")),
    ];

    let mut blocks = vec![header, who_where, when_whence];

    if let Some(insights) = &job.insights {
        let mut section = SlackBlock::of_type("section");
        section.text = Some(mrkdwn(format!(
            "*Role:* {}   *Exp:* {}   *Stack:* {}\n• {}\n• {}\n• {}",
            insights.role_type,
            insights.years_exp,
            insights.tech_stack.join(", "),
            insights.key_points[0],
            insights.key_points[1],
            insights.key_points[2],
        )));
        blocks.push(section);
    }

    let mut actions = SlackBlock::of_type("actions");
    actions.elements = vec![SlackElement {
        element_type: "button",
        text: SlackText {
            text_type: "plain_text",
            text: "Apply Now".to_string(),
        },
        url: job.url.clone(),
        style: "primary",
    }];
    blocks.push(actions);
    blocks.push(SlackBlock::of_type("divider"));

    SlackPayload { blocks }
}
