use crate::error::PinsError;

use reqwest::{Method, Response as HttpResponse, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

impl crate::Backend {
    // Turns an HTTP response into `R` or a mapped `PinsError`.
    pub(crate) async fn _process_response<R: DeserializeOwned + Send + 'static>(
        &self,
        response: HttpResponse,
    ) -> Result<R, PinsError> {
        let status = response.status();
        let response_url = response.url().to_string();

        let response_text = response.text().await.map_err(PinsError::ReqwestError)?;

        if status.is_success() {
            // Void functions answer 204 or an empty body; read that as JSON null.
            if status == StatusCode::NO_CONTENT || response_text.trim().is_empty() {
                return serde_json::from_str("null").map_err(|e| {
                    PinsError::JsonDeserializationFailed(format!(
                        "Empty response from '{}' cannot be read as the requested type: {}",
                        response_url, e
                    ))
                });
            }
            log::debug!("Request successful. Response body: {}", &response_text);
            serde_json::from_str::<R>(&response_text).map_err(|e| {
                log::error!(
                    "JSON Deserialization failed for successful response from '{}'. Status: {}. Error: {}. Body: {}",
                    response_url,
                    status,
                    e,
                    &response_text
                );
                PinsError::JsonDeserializationFailed(format!(
                    "Failed to deserialize successful response from '{}': {}. Body: {}",
                    response_url, e, &response_text
                ))
            })
        } else {
            log::warn!(
                "Request failed with status {}. Response body: {}",
                status,
                response_text
            );
            let parsed_body: Value = match serde_json::from_str(&response_text) {
                Ok(json_val) => json_val,
                Err(_) => serde_json::json!({
                    "code": status.as_u16().to_string(),
                    "message": format!(
                        "HTTP Error {} with non-JSON body: {}",
                        status,
                        response_text.chars().take(100).collect::<String>()
                    ),
                }),
            };
            Err(PinsError::from_response(status.as_u16(), parsed_body))
        }
    }

    pub async fn post<T: Serialize + Send + Sync, R: DeserializeOwned + Send + 'static>(
        &self,
        endpoint: &str,
        data: &T,
    ) -> Result<R, PinsError> {
        self._request(Method::POST, endpoint, Some(data)).await
    }
}
