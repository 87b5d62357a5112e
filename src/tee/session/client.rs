// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP clients for the remote session storages.
//!
//! - Scone: the CAS accepts YAML on `POST {url}/session`
//! - Gramine: the SPS accepts JSON on `POST {url}/api/session` with basic auth
//!
//! One attempt per call. Any transport error or non-2xx status is an error.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use zeroize::Zeroizing;

use super::gramine::SpsSession;

#[derive(Debug, thiserror::Error)]
pub enum SessionStorageError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to serialize session: {0}")]
    Serialize(String),

    #[error("POST {path} failed: {message}")]
    Request { path: String, message: String },

    #[error("POST {path} returned {status}")]
    Status { path: String, status: u16 },
}

/// Where a session storage listens, and the URL enclaves use to reach it.
#[derive(Debug, Clone)]
pub struct SessionStorageEndpoint {
    pub url: String,
    pub enclave_url: String,
    pub timeout: Duration,
}

fn build_http(timeout: Duration) -> Result<Client, SessionStorageError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SessionStorageError::Client(e.to_string()))
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn check_status(
    path: &str,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<(), SessionStorageError> {
    let response = response.map_err(|e| SessionStorageError::Request {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        // Response bodies may echo the session; never surface them.
        return Err(SessionStorageError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

// =============================================================================
// Scone CAS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CasClient {
    url: String,
    enclave_url: String,
    http: Client,
}

impl CasClient {
    const SESSION_PATH: &'static str = "/session";

    pub fn new(endpoint: &SessionStorageEndpoint) -> Result<Self, SessionStorageError> {
        Ok(Self {
            url: endpoint.url.clone(),
            enclave_url: endpoint.enclave_url.clone(),
            http: build_http(endpoint.timeout)?,
        })
    }

    pub fn enclave_url(&self) -> &str {
        &self.enclave_url
    }

    pub async fn post_session(&self, yaml: String) -> Result<(), SessionStorageError> {
        let response = self
            .http
            .post(join(&self.url, Self::SESSION_PATH))
            .header(CONTENT_TYPE, "application/x-yaml")
            .body(yaml)
            .send()
            .await;
        check_status(Self::SESSION_PATH, response)
    }
}

// =============================================================================
// Gramine SPS
// =============================================================================

#[derive(Clone)]
pub struct SpsClient {
    url: String,
    enclave_url: String,
    login: String,
    password: Zeroizing<String>,
    http: Client,
}

impl std::fmt::Debug for SpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpsClient")
            .field("url", &self.url)
            .field("enclave_url", &self.enclave_url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SpsClient {
    const SESSION_PATH: &'static str = "/api/session";

    pub fn new(
        endpoint: &SessionStorageEndpoint,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, SessionStorageError> {
        Ok(Self {
            url: endpoint.url.clone(),
            enclave_url: endpoint.enclave_url.clone(),
            login: login.into(),
            password: Zeroizing::new(password.into()),
            http: build_http(endpoint.timeout)?,
        })
    }

    pub fn enclave_url(&self) -> &str {
        &self.enclave_url
    }

    pub async fn post_session(&self, session: &SpsSession) -> Result<(), SessionStorageError> {
        let body =
            serde_json::to_vec(session).map_err(|e| SessionStorageError::Serialize(e.to_string()))?;
        let response = self
            .http
            .post(join(&self.url, Self::SESSION_PATH))
            .basic_auth(&self.login, Some(self.password.as_str()))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        check_status(Self::SESSION_PATH, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: &str) -> SessionStorageEndpoint {
        SessionStorageEndpoint {
            url: url.to_string(),
            enclave_url: "https://enclave.example".into(),
            timeout: Duration::from_secs(5),
        }
    }

    fn sps_session() -> SpsSession {
        SpsSession {
            session: "abc00000x01".into(),
            enclaves: Vec::new(),
        }
    }

    #[tokio::test]
    async fn cas_posts_yaml_to_session_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(header(CONTENT_TYPE.as_str(), "application/x-yaml"))
            .and(body_string_contains("name: abc"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = CasClient::new(&endpoint(&format!("{}/", server.uri()))).unwrap();
        client.post_session("name: abc\n".into()).await.unwrap();
        assert_eq!(client.enclave_url(), "https://enclave.example");
    }

    #[tokio::test]
    async fn cas_rejection_is_an_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("secret echo"))
            .expect(1)
            .mount(&server)
            .await;

        let client = CasClient::new(&endpoint(&server.uri())).unwrap();
        let error = client.post_session("name: abc\n".into()).await.unwrap_err();

        assert!(matches!(error, SessionStorageError::Status { status: 409, .. }));
        assert!(!error.to_string().contains("secret echo"));
    }

    #[tokio::test]
    async fn unreachable_storage_is_a_request_error() {
        let client = CasClient::new(&endpoint("http://127.0.0.1:1")).unwrap();
        let error = client.post_session(String::new()).await.unwrap_err();
        assert!(matches!(error, SessionStorageError::Request { .. }));
    }

    #[tokio::test]
    async fn sps_posts_json_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .and(header_exists("authorization"))
            .and(header(CONTENT_TYPE.as_str(), "application/json"))
            .and(body_string_contains("\"session\":\"abc00000x01\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = SpsClient::new(&endpoint(&server.uri()), "admin", "hunter2").unwrap();
        client.post_session(&sps_session()).await.unwrap();
        assert!(!format!("{client:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn sps_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SpsClient::new(&endpoint(&server.uri()), "admin", "wrong").unwrap();
        let error = client.post_session(&sps_session()).await.unwrap_err();
        assert!(matches!(error, SessionStorageError::Status { status: 401, .. }));
    }
}
