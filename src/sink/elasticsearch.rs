//! Elasticsearch document sink
//!
//! Posts each document to `{url}/{index}/_doc`, one request per message.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{EventSink, SinkDocument, SinkError};

/// Configuration for the Elasticsearch sink
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster (e.g., "http://localhost:9200")
    pub url: String,
    /// Target index
    pub index: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "smart-home-events".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

/// Elasticsearch REST client
pub struct ElasticsearchSink {
    client: Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchSink {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    fn document_url(&self) -> String {
        format!(
            "{}/{}/_doc",
            self.config.url.trim_end_matches('/'),
            self.config.index
        )
    }
}

#[async_trait]
impl EventSink for ElasticsearchSink {
    async fn index(&self, doc: &SinkDocument) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.document_url())
            .json(doc)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SinkError::Unavailable
                } else {
                    SinkError::Request(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_url() {
        let sink = ElasticsearchSink::new(ElasticsearchConfig {
            url: "http://es:9200/".to_string(),
            index: "smart-home-events".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(sink.document_url(), "http://es:9200/smart-home-events/_doc");
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_an_error() {
        let sink = ElasticsearchSink::new(ElasticsearchConfig {
            url: "http://127.0.0.1:1".to_string(),
            request_timeout_ms: 500,
            ..Default::default()
        })
        .unwrap();

        let doc = SinkDocument {
            timestamp: chrono::Utc::now(),
            topic: "/server/t/PIR1/properties/motion".to_string(),
            tenant: "t".to_string(),
            device_id: "PIR1".to_string(),
            device_type: "pir".to_string(),
            property: "motion".to_string(),
            payload: serde_json::json!({"motion": 1}),
            extracted_value: serde_json::json!(1),
            value_key: Some("motion".to_string()),
        };

        assert!(sink.index(&doc).await.is_err());
    }
}
