use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use firstin_core::{DetailFetcher, Job, JobFetcher, JobFilter, PollError};

use crate::ashby::AshbyAdapter;
use crate::gem::GemAdapter;
use crate::greenhouse::GreenhouseAdapter;
use crate::lever::LeverAdapter;
use crate::microsoft::MicrosoftAdapter;
use crate::workday::WorkdayAdapter;

/// Closed dispatch over the supported ATS families.
///
/// Each variant is self-contained; the enum exists so heterogeneous boards
/// can sit in one scheduler without trait objects.
#[derive(Clone)]
pub enum Adapter {
    Greenhouse(GreenhouseAdapter),
    Ashby(AshbyAdapter),
    Lever(LeverAdapter),
    Workday(WorkdayAdapter),
    Microsoft(MicrosoftAdapter),
    Gem(GemAdapter),
}

impl Adapter {
    /// Build the adapter for an ATS family tag, or `None` for an
    /// unsupported tag. `board_ref` is the board token for token-addressed
    /// families and the full base URL for Workday.
    pub fn for_ats(
        ats: &str,
        board_ref: &str,
        company_name: &str,
        client: Client,
        pre_filter: Option<Arc<dyn JobFilter>>,
    ) -> Option<Adapter> {
        match ats {
            "greenhouse" => Some(Adapter::Greenhouse(GreenhouseAdapter::new(
                board_ref,
                company_name,
                client,
            ))),
            "ashby" => Some(Adapter::Ashby(AshbyAdapter::new(
                board_ref,
                company_name,
                client,
            ))),
            "lever" => Some(Adapter::Lever(LeverAdapter::new(
                board_ref,
                company_name,
                client,
            ))),
            "workday" => Some(Adapter::Workday(WorkdayAdapter::new(
                board_ref,
                company_name,
                client,
                pre_filter,
            ))),
            "microsoft" => Some(Adapter::Microsoft(MicrosoftAdapter::new(
                company_name,
                client,
            ))),
            "gem" => Some(Adapter::Gem(GemAdapter::new(
                board_ref,
                company_name,
                client,
            ))),
            _ => None,
        }
    }

    /// Disable freshness-based early exits and return every listing.
    /// Only the paginating adapters have an audit mode.
    pub fn set_audit_mode(&mut self, enabled: bool) {
        match self {
            Adapter::Workday(a) => a.set_audit_mode(enabled),
            Adapter::Microsoft(a) => a.set_audit_mode(enabled),
            _ => {}
        }
    }

    /// Whether [`DetailFetcher`] does real work for this family.
    pub fn supports_detail(&self) -> bool {
        matches!(self, Adapter::Greenhouse(_) | Adapter::Microsoft(_))
    }
}

impl JobFetcher for Adapter {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        match self {
            Adapter::Greenhouse(a) => a.fetch_jobs(cancel).await,
            Adapter::Ashby(a) => a.fetch_jobs(cancel).await,
            Adapter::Lever(a) => a.fetch_jobs(cancel).await,
            Adapter::Workday(a) => a.fetch_jobs(cancel).await,
            Adapter::Microsoft(a) => a.fetch_jobs(cancel).await,
            Adapter::Gem(a) => a.fetch_jobs(cancel).await,
        }
    }
}

impl DetailFetcher for Adapter {
    /// Families without a detail endpoint return the job unchanged; use
    /// [`Adapter::supports_detail`] to feature-test first.
    async fn fetch_job_detail(
        &self,
        cancel: CancellationToken,
        job: Job,
    ) -> Result<Job, PollError> {
        match self {
            Adapter::Greenhouse(a) => a.fetch_job_detail(cancel, job).await,
            Adapter::Microsoft(a) => a.fetch_job_detail(cancel, job).await,
            _ => Ok(job),
        }
    }
}
