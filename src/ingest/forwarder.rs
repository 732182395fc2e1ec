use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ForwardError;
use crate::sensor::SensorReading;

/// Success body returned by the ingestion backend.
#[derive(Debug, Default, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    /// Identifier assigned by the backend, if it sent one.
    pub id: Option<Value>,
}

/// Sink for normalized readings. One call per reading, no retries.
pub trait Forward: Send + Sync {
    fn forward(
        &self,
        reading: SensorReading,
    ) -> impl Future<Output = Result<Forwarded, ForwardError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Forward for HttpForwarder {
    async fn forward(&self, reading: SensorReading) -> Result<Forwarded, ForwardError> {
        let response = self.client.post(&self.url).json(&reading).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ForwardError::Rejected { status });
        }

        let body = match response.json::<IngestResponse>().await {
            Ok(body) => body,
            Err(err) => {
                warn!("backend accepted data but sent an unreadable body: {err:#}");
                IngestResponse::default()
            }
        };

        let id = body.id.as_ref().map_or_else(|| "-".to_string(), Value::to_string);
        info!(
            %id,
            temperature = %reading.temperature,
            humidity = %reading.humidity,
            light = %reading.light,
            "data saved to database"
        );

        Ok(Forwarded { id: body.id })
    }
}
