//! One upload attempt against the catalog.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::response::CatalogResponse;
use crate::auth::AuthToken;
use crate::errors::TransientServerError;
use crate::packaging::Artifact;

/// Header carrying the app name.
pub const APP_NAME_HEADER: &str = "X-App-Name";
/// Header carrying the development session id.
pub const SESSION_ID_HEADER: &str = "X-Session-Id";
/// Header carrying the base64 MD5 of the body.
pub const CONTENT_MD5_HEADER: &str = "Content-MD5";
/// Header carrying the hex SHA-256 of the body.
pub const CONTENT_SHA256_HEADER: &str = "X-Content-SHA256";

/// What is being uploaded.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Catalog upload endpoint.
    pub url: &'a str,
    /// App name from the manifest.
    pub app_name: &'a str,
    /// Development session, if the app has one.
    pub session_id: Option<&'a str>,
    /// The packed app.
    pub artifact: &'a Artifact,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

/// Thin HTTP client for the catalog upload endpoint.
#[derive(Debug, Clone, Default)]
pub struct CatalogClient {
    client: reqwest::Client,
}

impl CatalogClient {
    /// Creates a client on top of `client`.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Performs one upload and returns the published URI.
    ///
    /// Any failure is transient from the caller's point of view; retrying is
    /// up to the caller.
    pub async fn upload(
        &self,
        request: UploadRequest<'_>,
        token: &AuthToken,
    ) -> Result<String, TransientServerError> {
        let mut builder = self
            .client
            .post(request.url)
            .timeout(request.timeout)
            .header(AUTHORIZATION, token.authorization())
            .header(CONTENT_TYPE, "application/zip")
            .header(APP_NAME_HEADER, request.app_name)
            .header(CONTENT_MD5_HEADER, request.artifact.md5_base64())
            .header(CONTENT_SHA256_HEADER, request.artifact.sha256_hex());
        if let Some(session_id) = request.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let response = builder
            .body(request.artifact.bytes.clone())
            .send()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify(&e, request.timeout))?;
        debug!(status = status.as_u16(), body = %body, "Catalog response");

        let parsed = serde_json::from_str::<CatalogResponse>(&body);

        if !status.is_success() {
            return Err(TransientServerError::Status {
                status: status.as_u16(),
                messages: parsed.map(|r| r.messages).unwrap_or_default(),
            });
        }

        let parsed = parsed.map_err(|e| TransientServerError::Malformed {
            status: status.as_u16(),
            reason: e.to_string(),
        })?;

        match parsed.upload_link() {
            Some(uri) => Ok(uri.to_string()),
            None => Err(TransientServerError::MissingUploadLink {
                messages: parsed.messages,
            }),
        }
    }
}

fn classify(error: &reqwest::Error, timeout: Duration) -> TransientServerError {
    if error.is_timeout() {
        TransientServerError::Timeout(timeout)
    } else {
        TransientServerError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;
    use std::path::PathBuf;
    use tiny_http::{Header, Response, Server, StatusCode};

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("app.zap"),
            bytes: b"zip-bytes".to_vec(),
        }
    }

    fn token() -> AuthToken {
        AuthToken {
            access_token: "acc".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            refresh_token: "ref".to_string(),
        }
    }

    fn json_header() -> Header {
        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
    }

    /// Serves one request, returning what the server saw.
    fn serve_once(
        status: u16,
        body: &'static str,
    ) -> (String, std::thread::JoinHandle<(Vec<(String, String)>, Vec<u8>)>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/apps", server.server_addr());
        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let headers = request
                .headers()
                .iter()
                .map(|h| (h.field.as_str().as_str().to_ascii_lowercase(), h.value.to_string()))
                .collect();
            let mut bytes = Vec::new();
            request.as_reader().read_to_end(&mut bytes).unwrap();
            let response = Response::from_string(body)
                .with_status_code(StatusCode(status))
                .with_header(json_header());
            request.respond(response).unwrap();
            (headers, bytes)
        });
        (url, handle)
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_upload_sends_headers_and_body() {
        let (url, handle) = serve_once(
            200,
            r#"{ "messages": ["success"], "links": { "upload": "http://catalog/demo" } }"#,
        );
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: Some("session-1"),
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        let uri = CatalogClient::default().upload(request, &token()).await.unwrap();
        assert_eq!(uri, "http://catalog/demo");

        let (headers, body) = handle.join().unwrap();
        assert_eq!(body, b"zip-bytes");
        assert_eq!(header(&headers, "authorization"), Some("Bearer acc"));
        assert_eq!(header(&headers, "content-type"), Some("application/zip"));
        assert_eq!(header(&headers, APP_NAME_HEADER), Some("demo"));
        assert_eq!(header(&headers, SESSION_ID_HEADER), Some("session-1"));
        assert_eq!(
            header(&headers, CONTENT_MD5_HEADER),
            Some(artifact.md5_base64().as_str())
        );
        assert_eq!(
            header(&headers, CONTENT_SHA256_HEADER),
            Some(artifact.sha256_hex().as_str())
        );
    }

    #[tokio::test]
    async fn test_upload_without_session_omits_header() {
        let (url, handle) = serve_once(
            201,
            r#"{ "links": { "upload": "http://catalog/demo" } }"#,
        );
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        CatalogClient::default().upload(request, &token()).await.unwrap();
        let (headers, _) = handle.join().unwrap();
        assert_eq!(header(&headers, SESSION_ID_HEADER), None);
    }

    #[tokio::test]
    async fn test_slow_catalog_times_out() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/apps", server.server_addr());
        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut bytes = Vec::new();
            let _ = request.as_reader().read_to_end(&mut bytes);
            std::thread::sleep(Duration::from_millis(1500));
            let _ = request.respond(Response::from_string("{}").with_header(json_header()));
        });
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(1),
        };

        let err = CatalogClient::default()
            .upload(request, &token())
            .await
            .unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, TransientServerError::Timeout(t) if t == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_server_error_keeps_messages() {
        let (url, handle) = serve_once(500, r#"{ "messages": ["failed"], "links": {} }"#);
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        let err = CatalogClient::default()
            .upload(request, &token())
            .await
            .unwrap_err();
        handle.join().unwrap();

        assert_eq!(err.status(), Some(500));
        assert_eq!(err.messages(), ["failed".to_string()]);
    }

    #[tokio::test]
    async fn test_success_without_upload_link() {
        let (url, handle) = serve_once(
            200,
            r#"{ "messages": ["success"], "links": { "acc:query": "http://localhost:3001" } }"#,
        );
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        let err = CatalogClient::default()
            .upload(request, &token())
            .await
            .unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, TransientServerError::MissingUploadLink { .. }));
    }

    #[tokio::test]
    async fn test_success_with_garbage_body() {
        let (url, handle) = serve_once(200, "<html>");
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        let err = CatalogClient::default()
            .upload(request, &token())
            .await
            .unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, TransientServerError::Malformed { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/apps");
        let artifact = artifact();
        let request = UploadRequest {
            url: &url,
            app_name: "demo",
            session_id: None,
            artifact: &artifact,
            timeout: Duration::from_secs(5),
        };

        let err = CatalogClient::default()
            .upload(request, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, TransientServerError::Network(_)));
    }
}
