//! # Cloudlet compute actions
//!
//! The compute service of a cloudlet exposes two server actions on top of the
//! regular ones: finishing an overlay out of a running base VM instance, and
//! handing a running instance off to another cloud. [CloudletApi] sends them
//! on behalf of an authenticated user.
//!
//! Timeouts are left to the caller, wrap the futures in `tokio::time::timeout`
//! if needed.
use hyper::{client::HttpConnector, Body, Client, Method, Request};
use serde_json::{json, Value};
use tracing::{debug, error, instrument, trace};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid compute endpoint {0}, reason: {1}")]
    Endpoint(String, String),
    #[error("Could not send request on uri {0}, reason: {1}")]
    Request(hyper::Uri, String),
    #[error("Request on uri {0} failed with status {1}: {2}")]
    Status(hyper::Uri, hyper::StatusCode, String),
    #[error("Could not serialize request, reason: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Could not decode response of {0}, reason: {1}")]
    Decode(hyper::Uri, String),
}

/// Destination of a handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub handoff_url: String,
    pub glance_url: String,
    pub neutron_url: String,
    /// Token valid on the destination cloud
    pub dest_token: String,
    pub dest_vmname: String,
    pub dest_network: String,
}

/// Client for the cloudlet server actions of a compute endpoint
#[derive(Debug, Clone)]
pub struct CloudletApi {
    client: Client<HttpConnector>,
    endpoint: Url,
    token: String,
}

impl CloudletApi {
    /// `compute_url` is the compute endpoint of the user's project, as
    /// advertised by the service catalog, and `token` the user's token.
    pub fn new(compute_url: &str, token: String) -> Result<CloudletApi, ApiError> {
        let endpoint = Url::parse(compute_url)
            .map_err(|e| ApiError::Endpoint(compute_url.to_string(), e.to_string()))?;
        if endpoint.scheme() != "http" {
            return Err(ApiError::Endpoint(
                compute_url.to_string(),
                format!("unsupported scheme {}", endpoint.scheme()),
            ));
        }
        if endpoint.host_str().is_none() {
            return Err(ApiError::Endpoint(
                compute_url.to_string(),
                "missing host".to_string(),
            ));
        }
        Ok(CloudletApi {
            client: Client::new(),
            endpoint,
            token,
        })
    }

    /// Uri of the action endpoint of the given server
    pub fn action_uri(&self, instance_id: &str) -> Result<hyper::Uri, ApiError> {
        let mut url = self.endpoint.clone();
        let path = format!(
            "{}/servers/{}/action",
            self.endpoint.path().trim_end_matches('/'),
            instance_id
        );
        url.set_path(&path);
        url.set_query(None);
        url.as_str()
            .parse::<hyper::Uri>()
            .map_err(|e| ApiError::Endpoint(url.to_string(), e.to_string()))
    }

    /// Ask the compute service to build the overlay of a running base VM
    /// instance. The overlay is named after the instance.
    #[instrument(skip(self))]
    pub async fn create_overlay(&self, instance_id: &str) -> Result<Value, ApiError> {
        let body = overlay_body(instance_id);
        self.send_action(instance_id, serde_json::to_string(&body)?).await
    }

    /// Ask the compute service to migrate a running instance to another cloud
    #[instrument(skip(self, handoff), fields(dest = %handoff.handoff_url))]
    pub async fn handoff(&self, instance_id: &str, handoff: &Handoff) -> Result<Value, ApiError> {
        let body = json!({ "cloudlet-handoff": handoff });
        self.send_action(instance_id, serde_json::to_string(&body)?).await
    }

    async fn send_action(&self, instance_id: &str, body: String) -> Result<Value, ApiError> {
        let url = self.action_uri(instance_id)?;
        debug!("Send action to compute: {}", url);
        trace!("Sent body to compute [{}]: {}", url, body);
        let request = Request::builder()
            .method(Method::POST)
            .uri(url.clone())
            .header("X-Auth-Token", &self.token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(Body::from(body))
            .map_err(|e| ApiError::Request(url.clone(), e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ApiError::Request(url.clone(), e.to_string()))?;

        let status = response.status();
        trace!("Response status: {:#?}", status);
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| ApiError::Request(url.clone(), e.to_string()))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            error!("Request to compute failed [{}]: {:#?}", url, status);
            return Err(ApiError::Status(url, status, body));
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(url, e.to_string()))
    }
}

fn overlay_body(instance_id: &str) -> Value {
    json!({
        "cloudlet-overlay-finish": {
            "overlay-name": format!("overlay-{}", instance_id)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use hyper::{
        service::{make_service_fn, service_fn},
        Response, Server, StatusCode,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone)]
    struct Captured {
        method: Method,
        path: String,
        token: Option<String>,
        content_type: Option<String>,
        body: Value,
    }

    /// Serve every request with `status` and `reply`, recording what was received
    async fn serve(status: StatusCode, reply: &'static str) -> (SocketAddr, Arc<Mutex<Vec<Captured>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let store = captured.clone();
        let make = make_service_fn(move |_| {
            let store = store.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let store = store.clone();
                    async move {
                        let header = |name: &str| {
                            req.headers()
                                .get(name)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string)
                        };
                        let token = header("X-Auth-Token");
                        let content_type = header("Content-Type");
                        let method = req.method().clone();
                        let path = req.uri().path().to_string();
                        let bytes = hyper::body::to_bytes(req.into_body()).await?;
                        store.lock().unwrap().push(Captured {
                            method,
                            path,
                            token,
                            content_type,
                            body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                        });
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .body(Body::from(reply))
                                .unwrap(),
                        )
                    }
                }))
            }
        });
        let server = Server::try_bind(&"127.0.0.1:0".parse().unwrap())
            .expect("failed to bind test server")
            .serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);
        (addr, captured)
    }

    #[test]
    fn action_uri_keeps_endpoint_path() {
        let api = CloudletApi::new("http://compute:8774/v2.1/tenant/", "t".to_string()).unwrap();
        assert_eq!(
            api.action_uri("42").unwrap().to_string(),
            "http://compute:8774/v2.1/tenant/servers/42/action"
        );
    }

    #[test]
    fn reject_bad_endpoints() {
        assert!(matches!(
            CloudletApi::new("https://compute/v2.1", "t".to_string()),
            Err(ApiError::Endpoint(_, _))
        ));
        assert!(matches!(
            CloudletApi::new("not a url", "t".to_string()),
            Err(ApiError::Endpoint(_, _))
        ));
    }

    #[test]
    fn overlay_payload() {
        assert_eq!(
            overlay_body("abc"),
            json!({"cloudlet-overlay-finish": {"overlay-name": "overlay-abc"}})
        );
    }

    #[tokio::test]
    async fn create_overlay_posts_action() {
        let (addr, captured) = serve(StatusCode::OK, r#"{"overlay": "ok"}"#).await;
        let api = CloudletApi::new(&format!("http://{}/v2.1/tenant", addr), "secret".to_string()).unwrap();

        let response = api.create_overlay("vm-1").await.unwrap();
        assert_eq!(response, json!({"overlay": "ok"}));

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let request = &captured[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/v2.1/tenant/servers/vm-1/action");
        assert_eq!(request.token.as_deref(), Some("secret"));
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
        assert_eq!(request.body, overlay_body("vm-1"));
    }

    #[tokio::test]
    async fn handoff_posts_destination() {
        let (addr, captured) = serve(StatusCode::ACCEPTED, "{}").await;
        let api = CloudletApi::new(&format!("http://{}/v2.1", addr), "secret".to_string()).unwrap();
        let handoff = Handoff {
            handoff_url: "http://dest:8774".to_string(),
            glance_url: "http://dest:9292".to_string(),
            neutron_url: "http://dest:9696".to_string(),
            dest_token: "dest-token".to_string(),
            dest_vmname: "moved".to_string(),
            dest_network: "private".to_string(),
        };

        api.handoff("vm-2", &handoff).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured[0].path, "/v2.1/servers/vm-2/action");
        assert_eq!(
            captured[0].body,
            json!({"cloudlet-handoff": {
                "handoff_url": "http://dest:8774",
                "glance_url": "http://dest:9292",
                "neutron_url": "http://dest:9696",
                "dest_token": "dest-token",
                "dest_vmname": "moved",
                "dest_network": "private"
            }})
        );
    }

    #[tokio::test]
    async fn failed_action_reports_status() {
        let (addr, _) = serve(StatusCode::BAD_REQUEST, "no such server").await;
        let api = CloudletApi::new(&format!("http://{}", addr), "secret".to_string()).unwrap();
        match api.create_overlay("missing").await {
            Err(ApiError::Status(_, status, body)) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "no such server");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_response() {
        let (addr, _) = serve(StatusCode::OK, "not json").await;
        let api = CloudletApi::new(&format!("http://{}", addr), "secret".to_string()).unwrap();
        assert!(matches!(
            api.create_overlay("vm").await,
            Err(ApiError::Decode(_, _))
        ));
    }
}
