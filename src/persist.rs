//! Persistence collaborator boundary.
//!
//! The engine's only externally durable write is a reassignment proposal;
//! this module defines the sink trait and an HTTP implementation for it.

use serde::Deserialize;
use tracing::warn;

use crate::model::ReassignmentProposal;

/// The collaborator's verdict on a proposal. Rejection is normal control
/// flow (it triggers a revert), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalVerdict {
    Accepted,
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("proposal request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where reassignment proposals go for authoritative commit.
pub trait ProposalSink {
    fn propose(&self, proposal: &ReassignmentProposal) -> Result<ProposalVerdict, ProposalError>;
}

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Blocking HTTP proposal sink.
///
/// Posts the proposal to `/routes/reassign` and reads `{accepted: bool}`
/// from the response body.
#[derive(Debug, Clone)]
pub struct HttpProposalSink {
    config: HttpSinkConfig,
    client: reqwest::blocking::Client,
}

impl HttpProposalSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct ReassignResponse {
    accepted: bool,
}

impl ProposalSink for HttpProposalSink {
    fn propose(&self, proposal: &ReassignmentProposal) -> Result<ProposalVerdict, ProposalError> {
        let url = format!("{}/routes/reassign", self.config.base_url);
        let response = self
            .client
            .post(url)
            .json(proposal)
            .send()?
            .error_for_status()?
            .json::<ReassignResponse>()?;

        if response.accepted {
            Ok(ProposalVerdict::Accepted)
        } else {
            warn!(stop_id = %proposal.stop_id, "collaborator rejected reassignment");
            Ok(ProposalVerdict::Rejected)
        }
    }
}
