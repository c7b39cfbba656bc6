use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{error::Error, wg::Key};

const LEASE_PATH: &str = "newPeerLease";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseRequest {
    #[serde(rename = "pubKey")]
    pub pub_key: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LeaseResponse {
    #[serde(rename = "IP")]
    pub ip: String,

    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: String,

    #[serde(rename = "PubKey")]
    pub pub_key: String,

    #[serde(rename = "Endpoint")]
    pub endpoint: String,
}

/// Client side of the lease server protocol. A single attempt per call: no
/// retries and no timeout beyond what the transport imposes.
#[derive(Debug, Clone)]
pub struct LeaseClient {
    http: Client,
}

impl LeaseClient {
    pub fn new() -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::LeaseProtocol {
                url: String::new(),
                source: e.into(),
            })?;

        Ok(Self { http })
    }

    pub async fn request_lease(
        &self,
        server_url: &str,
        token: &str,
        public_key: &Key,
    ) -> Result<LeaseResponse, Error> {
        let url = format!("{}/{LEASE_PATH}", server_url.trim_end_matches('/'));
        let protocol = |e: Box<dyn std::error::Error + Send + Sync>| Error::LeaseProtocol {
            url: url.clone(),
            source: e,
        };

        log::info!("requesting lease from {url}");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&LeaseRequest {
                pub_key: public_key.to_string(),
            })
            .send()
            .await
            .map_err(|e| protocol(e.into()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::LeaseRejected {
                url: url.clone(),
                status,
            });
        }

        let body = resp.bytes().await.map_err(|e| protocol(e.into()))?;
        let lease: LeaseResponse = serde_json::from_slice(&body).map_err(|e| protocol(e.into()))?;

        log::debug!(
            "lease from {url}: ip {} allowed {} peer {}",
            lease.ip,
            lease.allowed_ips,
            lease.pub_key
        );

        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    #[tokio::test]
    async fn test_request_carries_public_key() {
        let server = MockServer::start().await;
        let private = Key::generate_private();
        let public = private.public_key();

        Mock::given(method("POST"))
            .and(path("/newPeerLease"))
            .and(header("Authorization", "Bearer s3cret"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({ "pubKey": public.to_string() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "IP": "10.0.0.5/32",
                "AllowedIPs": "10.0.1.0/24,10.0.2.0/24",
                "PubKey": "abc=",
                "Endpoint": "1.2.3.4:51820",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let lease = LeaseClient::new()
            .unwrap()
            .request_lease(&server.uri(), "s3cret", &public)
            .await
            .unwrap();

        assert_eq!(
            lease,
            LeaseResponse {
                ip: "10.0.0.5/32".to_string(),
                allowed_ips: "10.0.1.0/24,10.0.2.0/24".to_string(),
                pub_key: "abc=".to_string(),
                endpoint: "1.2.3.4:51820".to_string(),
            }
        );

        let requests = server.received_requests().await.unwrap();
        let sent = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(!sent.contains(&private.to_string()));
    }

    #[tokio::test]
    async fn test_trailing_slash() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/newPeerLease"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "IP": "10.0.0.5/32" })))
            .expect(1)
            .mount(&server)
            .await;

        let lease = LeaseClient::new()
            .unwrap()
            .request_lease(&format!("{}/", server.uri()), "t", &Key::generate_private())
            .await
            .unwrap();

        assert_eq!(lease.ip, "10.0.0.5/32");
        assert_eq!(lease.endpoint, "");
    }

    #[tokio::test]
    async fn test_non_ok_status_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"IP\":\"10.0.0.5/32\"}"))
            .mount(&server)
            .await;

        let err = LeaseClient::new()
            .unwrap()
            .request_lease(&server.uri(), "t", &Key::generate_private())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::LeaseRejected { status, .. } if status == StatusCode::FORBIDDEN
        ));
        assert!(err.to_string().contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn test_other_success_status_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "IP": "10.0.0.5/32" })))
            .mount(&server)
            .await;

        let err = LeaseClient::new()
            .unwrap()
            .request_lease(&server.uri(), "t", &Key::generate_private())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LeaseRejected { .. }));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = LeaseClient::new()
            .unwrap()
            .request_lease(&server.uri(), "t", &Key::generate_private())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LeaseProtocol { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let url = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        let err = LeaseClient::new()
            .unwrap()
            .request_lease(&url, "t", &Key::generate_private())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LeaseProtocol { ref url, .. } if url.ends_with("/newPeerLease")));
    }
}
