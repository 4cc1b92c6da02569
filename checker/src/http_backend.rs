use crate::backend::{BackendError, CheckBackend, RequestEcho, STATUS_PATH, SUBMIT_PATH};
use crate::protocol::SubmitRequest;
use async_trait::async_trait;
use http::StatusCode;
use serde_json::{Value, json};
use url::Url;

/// Talks to the validation backend over HTTP+JSON.
///
/// Timeouts are not configured on the client: the orchestrator applies its
/// own per-call deadlines.
#[derive(Clone)]
pub struct HttpCheckBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCheckBackend {
    pub fn new(base_url: &Url) -> Self {
        HttpCheckBackend {
            client: reqwest::Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str, echo: &RequestEcho) -> Result<Url, BackendError> {
        Url::parse(&format!("{}/{}", self.base_url, path)).map_err(|e| BackendError::Transport {
            message: format!("invalid URL: {e}"),
            request: echo.clone(),
        })
    }

    fn status_url(&self, job_id: &str, echo: &RequestEcho) -> Result<Url, BackendError> {
        let mut url = self.endpoint(STATUS_PATH, echo)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Transport {
                message: "base URL cannot carry a path".to_string(),
                request: echo.clone(),
            })?
            .push(job_id);
        Ok(url)
    }

    async fn read_reply(
        response: reqwest::Response,
        echo: RequestEcho,
    ) -> Result<(StatusCode, Option<Value>), BackendError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| transport_error(e, &echo))?;
        let body = serde_json::from_slice::<Value>(&bytes).ok();
        Ok((status, body))
    }
}

fn transport_error(err: reqwest::Error, echo: &RequestEcho) -> BackendError {
    BackendError::Transport {
        message: err.to_string(),
        request: echo.clone(),
    }
}

fn into_reply(
    status: StatusCode,
    body: Option<Value>,
    echo: RequestEcho,
) -> Result<Value, BackendError> {
    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
            request: echo,
        });
    }

    body.ok_or_else(|| BackendError::Transport {
        message: "reply was not JSON".to_string(),
        request: echo,
    })
}

#[async_trait]
impl CheckBackend for HttpCheckBackend {
    async fn submit_check(&self, request: &SubmitRequest) -> Result<Value, BackendError> {
        let echo = RequestEcho::submission(request);
        let url = self.endpoint(SUBMIT_PATH, &echo)?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, &echo))?;

        let (status, body) = Self::read_reply(response, echo.clone()).await?;
        into_reply(status, body, echo)
    }

    async fn poll_status(&self, job_id: &str) -> Result<Value, BackendError> {
        let echo = RequestEcho::poll(job_id);
        let url = self.status_url(job_id, &echo)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, &echo))?;

        let (status, body) = Self::read_reply(response, echo.clone()).await?;

        // The backend answers an unknown id with a bare 404.
        let has_status = body
            .as_ref()
            .and_then(|b| b.get("status"))
            .is_some_and(Value::is_string);
        if status == StatusCode::NOT_FOUND && !has_status {
            return Ok(json!({"status": "not_found"}));
        }

        into_reply(status, body, echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::{Bytes, Incoming};
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    fn json_response(status: u16, body: &str) -> Response<Full<Bytes>> {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    // Mimics the backend's routes closely enough for the client.
    async fn backend_handler(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        let body = req
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();

        let response = match (method.as_str(), path.as_str()) {
            ("POST", "/api/keys/check") => {
                let request: Value = serde_json::from_slice(&body).unwrap_or_default();
                if request["key"] == "BROKE-NKEY0" {
                    json_response(500, r#"{"detail": "Internal Server Error"}"#)
                } else {
                    let reply = json!({
                        "key": request["key"],
                        "status": "pending",
                        "region_used": request["region"],
                        "check_id": "check_AAAAABBBBB_1",
                    });
                    json_response(200, &reply.to_string())
                }
            }
            ("GET", "/api/keys/status/check_AAAAABBBBB_1") => json_response(
                200,
                r#"{"status": "in_progress", "stage": "login", "progress": 30, "message": "Signing in"}"#,
            ),
            ("GET", "/api/keys/status/check_ERRORED_1") => json_response(
                200,
                r#"{"status": "error", "stage": "error", "progress": 0, "message": "", "error_message": "boom"}"#,
            ),
            ("GET", "/api/keys/status/plain") => Response::builder()
                .status(200)
                .body(Full::new(Bytes::from_static(b"ok")))
                .unwrap(),
            _ => json_response(404, r#"{"detail": "Check with ID not found"}"#),
        };
        Ok(response)
    }

    async fn start_test_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);

                tokio::spawn(async move {
                    if let Err(err) =
                        hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service_fn(backend_handler))
                            .await
                    {
                        eprintln!("Error serving connection: {:?}", err);
                    }
                });
            }
        });

        Url::parse(&format!("http://127.0.0.1:{port}/api/")).unwrap()
    }

    #[tokio::test]
    async fn test_submit_check() {
        let backend = HttpCheckBackend::new(&start_test_server().await);

        let reply = backend
            .submit_check(&SubmitRequest {
                key: "AAAAA-BBBBB".into(),
                region: Some("US".into()),
            })
            .await
            .unwrap();

        assert_eq!(reply["check_id"], "check_AAAAABBBBB_1");
        assert_eq!(reply["region_used"], "US");
    }

    #[tokio::test]
    async fn test_submit_check_server_error_keeps_body() {
        let backend = HttpCheckBackend::new(&start_test_server().await);
        let request = SubmitRequest {
            key: "BROKE-NKEY0".into(),
            region: None,
        };

        let err = backend.submit_check(&request).await.unwrap_err();
        match &err {
            BackendError::Status { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body.as_ref().unwrap()["detail"], "Internal Server Error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.request().submitted_key(), Some("BROKE-NKEY0"));
    }

    #[tokio::test]
    async fn test_poll_status() {
        let backend = HttpCheckBackend::new(&start_test_server().await);

        let reply = backend.poll_status("check_AAAAABBBBB_1").await.unwrap();
        assert_eq!(reply["progress"], 30);
        assert_eq!(reply["stage"], "login");

        let reply = backend.poll_status("check_ERRORED_1").await.unwrap();
        assert_eq!(reply["error_message"], "boom");
    }

    #[tokio::test]
    async fn test_poll_unknown_id_is_not_found() {
        let backend = HttpCheckBackend::new(&start_test_server().await);

        let reply = backend.poll_status("temp_check_AAAAA_1").await.unwrap();
        assert_eq!(reply, json!({"status": "not_found"}));
    }

    #[tokio::test]
    async fn test_poll_non_json_reply() {
        let backend = HttpCheckBackend::new(&start_test_server().await);

        let err = backend.poll_status("plain").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
        assert_eq!(err.request().job_id_segment(), Some("plain"));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Nothing listens on port 9 locally.
        let backend = HttpCheckBackend::new(&Url::parse("http://127.0.0.1:9/api").unwrap());

        let err = backend.poll_status("check_X_1").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
        assert_eq!(err.request().job_id_segment(), Some("check_X_1"));
    }
}
