//! HTTP implementation of the per-entity remote contract

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::record::ServerRecord;

use super::remote::{DeleteKey, EntityRemote, RemoteError};

/// Remote client for one entity's REST endpoints.
///
/// Conventions: `POST {base}/{path}` creates, `PUT {base}/{path}/{id}`
/// updates, `DELETE {base}/{path}` with query parameters deletes by natural
/// key. A 409 response body is the server's canonical record.
#[derive(Clone)]
pub struct HttpRemote {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RemoteWrite<'a, P> {
    user_id: &'a str,
    payload: &'a P,
}

impl HttpRemote {
    /// `endpoint` is the entity's collection URL, e.g.
    /// `https://api.example.com/v1/measurements/weight`
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RemoteError> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            endpoint,
            client: reqwest::Client::builder().build()?,
        })
    }

    async fn parse_write_response<P: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ServerRecord<P>, RemoteError> {
        let status = response.status();

        if status == StatusCode::CONFLICT {
            let body = response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::Value::Null);
            return Err(RemoteError::Conflict(body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected(
                parse_api_error(status, &body),
                status.as_u16(),
            ));
        }

        Ok(response.json::<ServerRecord<P>>().await?)
    }
}

#[async_trait]
impl<P> EntityRemote<P> for HttpRemote
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    async fn create(&self, user_id: &str, payload: &P) -> Result<ServerRecord<P>, RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RemoteWrite { user_id, payload })
            .send()
            .await?;
        Self::parse_write_response(response).await
    }

    async fn update(
        &self,
        user_id: &str,
        server_id: Option<&str>,
        payload: &P,
    ) -> Result<ServerRecord<P>, RemoteError> {
        let url = match server_id {
            Some(id) => format!("{}/{id}", self.endpoint),
            None => self.endpoint.clone(),
        };
        let response = self
            .client
            .put(&url)
            .json(&RemoteWrite { user_id, payload })
            .send()
            .await?;
        Self::parse_write_response(response).await
    }

    async fn delete(&self, key: &DeleteKey) -> Result<(), RemoteError> {
        let mut query = vec![
            ("userId", key.user_id.clone()),
            ("naturalKey", key.natural_key.clone()),
        ];
        if let Some(server_id) = &key.server_id {
            query.push(("serverId", server_id.clone()));
        }

        let response = self
            .client
            .delete(&self.endpoint)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        // The record being gone remotely is the outcome we wanted
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected(
            parse_api_error(status, &body),
            status.as_u16(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String, RemoteError> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_endpoint_trims_trailing_slash() {
        let endpoint =
            normalize_endpoint("https://api.example.com/v1/weight/".to_string()).unwrap();
        assert_eq!(endpoint, "https://api.example.com/v1/weight");
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let body = r#"{"message": "validation failed"}"#;
        let parsed = parse_api_error(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(parsed, "validation failed (422)");
    }

    #[test]
    fn parse_api_error_falls_back_to_raw_body() {
        let parsed = parse_api_error(StatusCode::BAD_GATEWAY, "upstream broke");
        assert_eq!(parsed, "upstream broke (502)");

        let parsed = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(parsed, "HTTP 502");
    }
}
