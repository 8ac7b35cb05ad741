// src/client.rs

use crate::config::BackendConfig;
use crate::error::PinsError;
use crate::pins::PinsHandle;
use crate::roles::RolesHandle;
use crate::rpc::RpcHandle;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Path prefix of the backend's REST gateway.
pub(crate) const REST_PREFIX: &str = "rest/v1";

/// The main client for talking to the hosted backend.
///
/// `Backend` holds the project URL, the public anon key and, once a member has signed in,
/// their access token. Requests go through a shared `reqwest::Client` whose default headers
/// carry the anon key.
///
/// Specialised handles are obtained from it: [`Backend::rpc`] for arbitrary database
/// functions, [`Backend::pins`] for the member map queries and [`Backend::roles`] for
/// server-validated role checks.
///
/// ```rust,no_run
/// use member_pins::{Backend, PinsError};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), PinsError> {
/// let mut backend = Backend::new("https://project.example.co", "public-anon-key")?;
/// backend.set_session_token(Some("member-access-token".to_string()));
///
/// let pins = backend.pins().approved(500).await?;
/// println!("{} approved members on the map", pins.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Backend {
    pub server_url: String,
    pub(crate) anon_key: String,
    pub(crate) http_client: Client,
    pub(crate) session_token: Option<String>,
}

impl Backend {
    /// Creates a new `Backend`.
    ///
    /// # Arguments
    ///
    /// * `server_url`: The project URL. A missing scheme defaults to `http://`, and a trailing
    ///   `/rest/v1` is stripped so either form can be passed.
    /// * `anon_key`: The public anonymous key. Sent as the `apikey` header on every request,
    ///   and as the bearer token while no member session is set.
    ///
    /// # Returns
    ///
    /// The client, or a `PinsError` if the URL cannot be a base or the key is not a valid
    /// header value.
    pub fn new(server_url: &str, anon_key: &str) -> Result<Self, PinsError> {
        let mut temp_url_string = server_url.trim().to_string();

        if !temp_url_string.starts_with("http://") && !temp_url_string.starts_with("https://") {
            temp_url_string = format!("http://{}", temp_url_string);
        }

        let parsed_server_url = Url::parse(&temp_url_string)?;

        if parsed_server_url.cannot_be_a_base() || parsed_server_url.host_str().is_none() {
            return Err(PinsError::SdkError(format!(
                "The server_url '{}' resolved to '{}', which cannot be a base URL. Please provide a full project URL (e.g., https://project.example.co).",
                server_url, parsed_server_url
            )));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key).map_err(PinsError::InvalidHeaderValue)?,
        );

        let http_client = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(PinsError::ReqwestError)?;

        let mut final_server_url = parsed_server_url.as_str().trim_end_matches('/').to_string();
        let rest_suffix = format!("/{}", REST_PREFIX);
        if final_server_url.ends_with(&rest_suffix) {
            final_server_url.truncate(final_server_url.len() - rest_suffix.len());
        }

        log::debug!("Backend initialized with base server_url: {}", final_server_url);

        Ok(Self {
            server_url: final_server_url,
            anon_key: anon_key.to_string(),
            http_client,
            session_token: None,
        })
    }

    /// Creates a client from a [`BackendConfig`], applying its session token if present.
    pub fn from_config(config: &BackendConfig) -> Result<Self, PinsError> {
        let mut backend = Self::new(&config.url, &config.anon_key)?;
        backend.set_session_token(config.session_token.clone());
        Ok(backend)
    }

    /// Sets or clears the signed-in member's access token.
    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    /// Returns the current session token, if one is set on the client.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }

    /// Handle for calling database functions.
    pub fn rpc(&self) -> RpcHandle<'_> {
        RpcHandle::new(self)
    }

    /// Handle for the member map queries.
    pub fn pins(&self) -> PinsHandle {
        PinsHandle::new(self.clone())
    }

    /// Handle for server-validated role checks.
    pub fn roles(&self) -> RolesHandle<'_> {
        RolesHandle::new(self)
    }

    // Central request method
    pub(crate) async fn _request<
        T: Serialize + Send + Sync,
        R: DeserializeOwned + Send + 'static,
    >(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&T>,
    ) -> Result<R, PinsError> {
        let base_url = Url::parse(&self.server_url).map_err(|e| {
            PinsError::InvalidUrl(format!(
                "Base server URL '{}' is invalid: {}",
                self.server_url, e
            ))
        })?;

        let api_path = format!("/{}/{}", REST_PREFIX, endpoint.trim_start_matches('/'));

        let full_url = base_url.join(&api_path).map_err(|e| {
            PinsError::InvalidUrl(format!(
                "Failed to join base URL '{}' with API path '{}': {}",
                base_url, api_path, e
            ))
        })?;

        let mut request_builder = self.http_client.request(method.clone(), full_url.clone());

        let mut headers = HeaderMap::new();

        // The gateway wants a bearer token on every call; the anon key stands in when signed out.
        let bearer = self.session_token.as_deref().unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(PinsError::InvalidHeaderValue)?,
        );

        if method == Method::POST || method == Method::PUT || method == Method::PATCH {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut body_str_for_log: Option<String> = None;
        if let Some(body_data) = body {
            let body_str = serde_json::to_string(body_data).map_err(PinsError::JsonError)?;
            body_str_for_log = Some(body_str.clone());
            request_builder = request_builder.body(body_str);
        }

        request_builder = request_builder.headers(headers);

        log::debug!(
            "Preparing request: Method={}, URL={}, Authenticated={}",
            method,
            full_url,
            self.session_token.is_some()
        );
        if let Some(log_body) = &body_str_for_log {
            log::debug!("Request body: {}", log_body);
        } else {
            log::debug!("Request body: None");
        }

        let response = request_builder
            .send()
            .await
            .map_err(PinsError::ReqwestError)?;

        self._process_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_server_url() {
        let backend = Backend::new("project.example.co/rest/v1/", "anon").unwrap();
        assert_eq!(backend.server_url, "http://project.example.co");

        let backend = Backend::new("https://project.example.co", "anon").unwrap();
        assert_eq!(backend.server_url, "https://project.example.co");
    }

    #[test]
    fn rejects_invalid_key() {
        let result = Backend::new("https://project.example.co", "bad\nkey");
        assert!(matches!(result, Err(PinsError::InvalidHeaderValue(_))));
    }

    #[test]
    fn config_session_token_is_applied() {
        let config = BackendConfig::new("https://project.example.co", "anon")
            .with_session_token("member-token");
        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.session_token(), Some("member-token"));
        assert!(backend.is_authenticated());
    }
}
