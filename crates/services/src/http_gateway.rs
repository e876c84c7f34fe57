use std::fmt;

use chrono::{DateTime, Utc};
use pagemark_core::model::{
    Document, DocumentId, PageNumber, PersistedProgress, ProgressPercent, ProgressWrite, UserId,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GatewayError;
use crate::gateway::ProgressGateway;

/// Who is reading and where their documents live.
///
/// Passed explicitly to the HTTP gateway instead of being read from ambient
/// login state.
#[derive(Clone)]
pub struct SessionContext {
    pub base_url: Url,
    pub user_id: UserId,
    pub bearer_token: Option<String>,
}

impl SessionContext {
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidBaseUrl` if `base_url` does not parse or
    /// cannot carry a path.
    pub fn new(
        base_url: &str,
        user_id: UserId,
        bearer_token: Option<String>,
    ) -> Result<Self, GatewayError> {
        let base_url =
            Url::parse(base_url).map_err(|e| GatewayError::InvalidBaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            user_id,
            bearer_token: bearer_token.filter(|token| !token.trim().is_empty()),
        })
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("base_url", &self.base_url.as_str())
            .field("user_id", &self.user_id)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Progress gateway talking to the document server's JSON API.
#[derive(Clone, Debug)]
pub struct HttpProgressGateway {
    client: Client,
    context: SessionContext,
}

impl HttpProgressGateway {
    #[must_use]
    pub fn new(context: SessionContext) -> Self {
        Self {
            client: Client::new(),
            context,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.context.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidBaseUrl(self.context.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.context.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_records(&self) -> Result<Vec<PdfRecord>, GatewayError> {
        let url = self.endpoint(&["api", "pdf", "list", self.context.user_id.as_str()])?;
        tracing::debug!(%url, "fetching document list");

        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status()));
        }

        let body: ListResponse = response.json().await?;
        Ok(body
            .pdfs
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<PdfRecord>(value) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping malformed document entry");
                    None
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ProgressGateway for HttpProgressGateway {
    async fn get_progress(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PersistedProgress>, GatewayError> {
        let records = self.fetch_records().await?;
        Ok(records
            .into_iter()
            .find(|record| record.id == id.as_str())
            .and_then(|record| record.into_progress()))
    }

    async fn set_progress(&self, write: &ProgressWrite) -> Result<PersistedProgress, GatewayError> {
        let url = self.endpoint(&["api", "pdf", "progress"])?;
        let payload = ProgressRequest {
            pdf_id: write.document_id.as_str(),
            current_page: write.current_page.value(),
            progress: write.progress_percent.value(),
        };
        tracing::debug!(
            document = %write.document_id,
            page = payload.current_page,
            percent = payload.progress,
            "sending progress"
        );

        let response = self
            .authorize(self.client.put(url))
            .json(&payload)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(GatewayError::NotFound),
            status if !status.is_success() => return Err(GatewayError::HttpStatus(status)),
            _ => {}
        }

        let body: UpdateResponse = response.json().await?;
        body.pdf
            .and_then(PdfRecord::into_progress)
            .ok_or_else(|| GatewayError::Decode("progress response without a document".into()))
    }

    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError> {
        let owner = self.context.user_id.clone();
        Ok(self
            .fetch_records()
            .await?
            .into_iter()
            .filter_map(|record| record.into_document(&owner))
            .collect())
    }
}

//
// ─── WIRE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRequest<'a> {
    pdf_id: &'a str,
    current_page: u32,
    progress: f64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    pdfs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    pdf: Option<PdfRecord>,
}

/// One document as the server stores it. Every progress field is optional on
/// the wire; missing or out-of-range values make the record unusable rather
/// than failing the whole response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PdfRecord {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    total_page: Option<f64>,
    #[serde(default)]
    current_page: Option<f64>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    last_accessed: Option<DateTime<Utc>>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_pages(raw: f64) -> Option<u32> {
    (raw.is_finite() && raw >= 1.0 && raw <= f64::from(u32::MAX)).then(|| raw.round() as u32)
}

impl PdfRecord {
    fn into_progress(self) -> Option<PersistedProgress> {
        let document_id = DocumentId::new(self.id).ok()?;
        let current_page = PageNumber::new(whole_pages(self.current_page.unwrap_or(1.0))?).ok()?;
        let progress = self.progress.unwrap_or(0.0);
        if !progress.is_finite() {
            return None;
        }
        Some(PersistedProgress {
            document_id,
            current_page,
            progress_percent: ProgressPercent::clamped(progress),
            total_pages: self.total_page.and_then(whole_pages),
            last_accessed_at: self.last_accessed.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }

    fn into_document(self, owner: &UserId) -> Option<Document> {
        let title = self.title.clone().filter(|t| !t.trim().is_empty())?;
        let progress = self.into_progress()?;
        Some(Document {
            id: progress.document_id,
            owner: owner.clone(),
            title,
            total_pages: progress.total_pages,
            current_page: progress.current_page,
            progress_percent: progress.progress_percent,
            last_accessed_at: progress.last_accessed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(base: &str) -> SessionContext {
        SessionContext::new(base, UserId::new("reader 1").unwrap(), Some("secret".into())).unwrap()
    }

    #[test]
    fn endpoints_keep_base_path_and_escape_user() {
        let gateway = HttpProgressGateway::new(context("http://localhost:5000"));
        let url = gateway
            .endpoint(&["api", "pdf", "list", "reader 1"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/pdf/list/reader%201");

        let nested = HttpProgressGateway::new(context("https://example.test/reader/"));
        let url = nested.endpoint(&["api", "pdf", "progress"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/reader/api/pdf/progress");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        let user = UserId::new("u").unwrap();
        assert!(matches!(
            SessionContext::new("not a url", user.clone(), None),
            Err(GatewayError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            SessionContext::new("mailto:reader@example.test", user, None),
            Err(GatewayError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", context("http://localhost:5000"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn request_uses_server_field_names() {
        let body = serde_json::to_value(ProgressRequest {
            pdf_id: "abc",
            current_page: 4,
            progress: 67.0,
        })
        .unwrap();
        assert_eq!(body, json!({ "pdfId": "abc", "currentPage": 4, "progress": 67.0 }));
    }

    #[test]
    fn record_maps_to_progress() {
        let record: PdfRecord = serde_json::from_value(json!({
            "_id": "abc",
            "title": "Paper",
            "totalPage": 10,
            "currentPage": 4,
            "progress": 67,
            "lastAccessed": "2023-11-14T22:13:20Z",
        }))
        .unwrap();
        let progress = record.into_progress().unwrap();
        assert_eq!(progress.current_page.value(), 4);
        assert_eq!(progress.progress_percent.value(), 67.0);
        assert_eq!(progress.total_pages, Some(10));
    }

    #[test]
    fn missing_fields_default_to_start_and_bad_pages_are_unusable() {
        let sparse: PdfRecord = serde_json::from_value(json!({ "_id": "abc" })).unwrap();
        let progress = sparse.into_progress().unwrap();
        assert_eq!(progress.current_page.value(), 1);
        assert_eq!(progress.progress_percent.value(), 0.0);

        let broken: PdfRecord =
            serde_json::from_value(json!({ "_id": "abc", "currentPage": 0 })).unwrap();
        assert!(broken.into_progress().is_none());
    }

    #[test]
    fn out_of_range_percent_is_clamped() {
        let record: PdfRecord =
            serde_json::from_value(json!({ "_id": "abc", "progress": 140 })).unwrap();
        assert_eq!(record.into_progress().unwrap().progress_percent.value(), 100.0);
    }

    #[test]
    fn untitled_records_are_not_listed() {
        let owner = UserId::new("u").unwrap();
        let record: PdfRecord =
            serde_json::from_value(json!({ "_id": "abc", "title": "  " })).unwrap();
        assert!(record.into_document(&owner).is_none());
    }
}
