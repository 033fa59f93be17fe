//! HTTP client for the language service (conversation analysis, question
//! answering and PII recognition share one resource endpoint and key).

use crate::config::LanguageServiceConfig;
use crate::error::{ParleyError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct LanguageClient {
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
    language: String,
    client: Client,
}

impl LanguageClient {
    pub fn new(config: &LanguageServiceConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ParleyError::Configuration("language.endpoint is not set".into()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            language: config.language.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Full URL for an operation path such as `/language/:analyze-conversations`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<B, R>(
        &self,
        service: &str,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.url(path))
            .query(&[("api-version", self.api_version.as_str())])
            .query(query)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header(SUBSCRIPTION_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ParleyError::upstream(service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::from_status(service, status, &body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ParleyError::upstream(service, e))?;
        serde_json::from_str(&text).map_err(|e| ParleyError::malformed(service, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> LanguageServiceConfig {
        LanguageServiceConfig {
            endpoint: endpoint.map(ToString::to_string),
            ..LanguageServiceConfig::default()
        }
    }

    #[test]
    fn requires_endpoint() {
        assert!(matches!(
            LanguageClient::new(&config(None)),
            Err(ParleyError::Configuration(_))
        ));
        assert!(LanguageClient::new(&config(Some("  "))).is_err());
    }

    #[test]
    fn url_strips_trailing_slash() {
        let client = LanguageClient::new(&config(Some("https://lang.example.com/"))).unwrap();
        assert_eq!(
            client.url("/language/:analyze-conversations"),
            "https://lang.example.com/language/:analyze-conversations"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_upstream_unavailable() {
        let client = LanguageClient::new(&LanguageServiceConfig {
            endpoint: Some("http://127.0.0.1:9".into()),
            timeout_secs: 2,
            ..LanguageServiceConfig::default()
        })
        .unwrap();
        let result: Result<serde_json::Value> = client
            .post_json("clu", "/language/:analyze-conversations", &[], &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(ParleyError::UpstreamUnavailable { .. })));
    }
}
