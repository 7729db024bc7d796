use std::future::Future;

use reqwest::Client;
use tracing::debug;

use society_types::api::{HistoryReply, HistoryResponse};
use society_types::models::ComplaintId;

use crate::error::ChatError;

/// Loads the discussion history of a complaint.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch(
        &self,
        complaint_id: &ComplaintId,
        token: Option<String>,
    ) -> impl Future<Output = Result<HistoryResponse, ChatError>> + Send;
}

/// History over the complaints REST API: `GET {base}/complaints/{id}/comments`.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    client: Client,
    base_url: String,
}

impl HttpHistory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl HistorySource for HttpHistory {
    async fn fetch(
        &self,
        complaint_id: &ComplaintId,
        token: Option<String>,
    ) -> Result<HistoryResponse, ChatError> {
        let url = format!("{}/complaints/{}/comments", self.base_url, complaint_id);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!("History for {} returned {} ({} bytes)", complaint_id, status, body.len());

        if !status.is_success() {
            // Error bodies are best-effort; a missing message falls back to status wording
            let message = serde_json::from_slice::<HistoryReply>(&body)
                .ok()
                .and_then(|reply| match reply {
                    HistoryReply::Failure(e) => Some(e.message),
                    HistoryReply::Page(_) => None,
                });
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        match serde_json::from_slice::<HistoryReply>(&body)? {
            HistoryReply::Page(page) => Ok(page),
            HistoryReply::Failure(e) => Err(ChatError::Api {
                status: status.as_u16(),
                message: Some(e.message),
            }),
        }
    }
}
