//! Versioned document store. Holds the snapshot as JSON text inside one
//! document, guarded by a bearer credential. It cannot notify, so the agent
//! polls it.

use super::{check_status, RemoteTransport};
use crate::error::TransportError;
use async_trait::async_trait;
use lounge_engine::{Snapshot, Source};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub id: String,
    pub version: i64,
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize)]
struct DocumentBody<'a> {
    content: &'a str,
}

pub struct DocumentTransport {
    client: Client,
    base_url: Url,
    document_id: String,
    token: String,
}

impl DocumentTransport {
    pub fn new(
        base_url: &str,
        document_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: Client::new(),
            base_url: parse_base(base_url)?,
            document_id: document_id.into(),
            token: token.into(),
        })
    }

    /// Create a new document holding `snapshot` and return its id.
    pub async fn create(
        base_url: &str,
        token: &str,
        snapshot: &Snapshot,
    ) -> Result<String, TransportError> {
        let url = documents_url(&parse_base(base_url)?, None)?;
        let content = snapshot.to_json()?;
        let response = Client::new()
            .post(url)
            .bearer_auth(token)
            .json(&DocumentBody { content: &content })
            .send()
            .await?;
        let document: Document = check_status(response).await?.json().await?;
        tracing::info!(id = %document.id, "document created");
        Ok(document.id)
    }

    /// Fetch the raw document, version included.
    pub async fn fetch(&self) -> Result<Document, TransportError> {
        let url = documents_url(&self.base_url, Some(&self.document_id))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl RemoteTransport for DocumentTransport {
    fn source(&self) -> Source {
        Source::Document
    }

    async fn pull(&self) -> Result<Option<Value>, TransportError> {
        let document = self.fetch().await?;
        if document.content.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&document.content)?;
        tracing::debug!(id = %document.id, version = document.version, "pulled document");
        Ok((!value.is_null()).then_some(value))
    }

    async fn push(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        let url = documents_url(&self.base_url, Some(&self.document_id))?;
        let content = snapshot.to_json()?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.token)
            .json(&DocumentBody { content: &content })
            .send()
            .await?;
        let document: Document = check_status(response).await?.json().await?;
        tracing::debug!(id = %document.id, version = document.version, "pushed document");
        Ok(())
    }
}

fn parse_base(base_url: &str) -> Result<Url, TransportError> {
    Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))
}

fn documents_url(base: &Url, id: Option<&str>) -> Result<Url, TransportError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(base.to_string()))?;
        segments.pop_if_empty().push("documents");
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_urls() {
        let base = parse_base("http://localhost:3000/").unwrap();
        assert_eq!(
            documents_url(&base, None).unwrap().as_str(),
            "http://localhost:3000/documents"
        );
        assert_eq!(
            documents_url(&base, Some("a b")).unwrap().as_str(),
            "http://localhost:3000/documents/a%20b"
        );
    }

    #[test]
    fn documents_without_content_parse() {
        let document: Document =
            serde_json::from_str(r#"{"id": "d1", "version": 1}"#).unwrap();
        assert_eq!(document.content, "");
    }
}
