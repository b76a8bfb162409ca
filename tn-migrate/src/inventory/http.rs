use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Collection, Inventory, InventoryError, Page};

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Wait before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// NetBox-style REST inventory.
#[derive(Debug, Clone)]
pub struct HttpInventory {
    client: Client,
    api_root: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpInventory {
    /// `base_url` is the service root; requests go to `<base_url>/api/...`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| InventoryError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            api_root: format!("{}/api", base_url.trim_end_matches('/')),
            token,
            retry,
        })
    }

    fn url(&self, collection: Collection) -> String {
        format!("{}{}", self.api_root, collection.path())
    }

    /// Send with bounded retries. A POST is resent only when the service
    /// certainly did not act on it, since creates are not idempotent.
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, InventoryError> {
        let mut retried = 0;
        loop {
            match self.send_once(method.clone(), url, body) {
                Err(err) if retried < self.retry.retries && retryable(&method, &err) => {
                    retried += 1;
                    let wait = self.retry.backoff * retried;
                    warn!(%method, url, attempt = retried, ?wait, "retrying inventory request: {err}");
                    thread::sleep(wait);
                }
                other => return other,
            }
        }
    }

    fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, InventoryError> {
        debug!(%method, url, "inventory request");
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().map_err(|err| {
            if err.is_connect() {
                InventoryError::Connect(err.to_string())
            } else {
                InventoryError::Transport(err.to_string())
            }
        })?;
        read_body(response)
    }
}

fn retryable(method: &Method, err: &InventoryError) -> bool {
    if *method == Method::POST {
        err.is_unprocessed()
    } else {
        err.is_transient()
    }
}

fn read_body(response: Response) -> Result<Value, InventoryError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| InventoryError::Transport(err.to_string()))?;
    if !status.is_success() {
        return Err(InventoryError::Status {
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|err| InventoryError::Decode(err.to_string()))
}

fn into_objects(value: Value) -> Result<Vec<Value>, InventoryError> {
    match value {
        Value::Array(objects) => Ok(objects),
        Value::Null => Ok(Vec::new()),
        object @ Value::Object(_) => Ok(vec![object]),
        other => Err(InventoryError::Decode(format!(
            "expected a list of objects, got {other}"
        ))),
    }
}

impl Inventory for HttpInventory {
    fn fetch_page(&self, collection: Collection, cursor: Option<&str>) -> Result<Page, InventoryError> {
        let url = cursor.map_or_else(|| self.url(collection), str::to_string);
        let value = self.send(Method::GET, &url, None)?;
        serde_json::from_value(value).map_err(|err| InventoryError::Decode(err.to_string()))
    }

    fn create(&self, collection: Collection, payloads: &[Value]) -> Result<Vec<Value>, InventoryError> {
        let body = Value::Array(payloads.to_vec());
        into_objects(self.send(Method::POST, &self.url(collection), Some(&body))?)
    }

    fn update(&self, collection: Collection, patches: &[Value]) -> Result<Vec<Value>, InventoryError> {
        let body = Value::Array(patches.to_vec());
        into_objects(self.send(Method::PATCH, &self.url(collection), Some(&body))?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    enum Reply {
        Status(u16, &'static str),
        /// Read the request and never answer.
        Silent,
    }

    /// Serve `replies` in order on a local port, then answer 500 to anything
    /// else. Returns the base URL and the number of requests received.
    fn stub_service(replies: Vec<Reply>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            let mut replies = replies.into_iter();
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                match replies.next() {
                    Some(Reply::Status(status, body)) => answer(&mut stream, status, body),
                    Some(Reply::Silent) => {
                        thread::spawn(move || {
                            read_request(&mut stream);
                            thread::sleep(Duration::from_secs(3));
                        });
                    }
                    None => answer(&mut stream, 500, ""),
                }
            }
        });
        (url, hits)
    }

    fn answer(stream: &mut TcpStream, status: u16, body: &str) {
        read_request(stream);
        let _ = write!(
            stream,
            "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
    }

    fn read_request(stream: &mut TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);
            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn client(url: &str, timeout: Duration) -> HttpInventory {
        HttpInventory::new(
            url,
            Some("secret".to_string()),
            timeout,
            RetryPolicy {
                retries: 2,
                backoff: Duration::from_millis(1),
            },
        )
        .expect("client")
    }

    #[test]
    fn transient_status_is_retried_until_success() {
        let (url, hits) = stub_service(vec![
            Reply::Status(503, ""),
            Reply::Status(429, ""),
            Reply::Status(200, r#"{"results": [{"id": 1, "vid": 20}], "next": null}"#),
        ]);
        let page = client(&url, Duration::from_secs(5))
            .fetch_page(Collection::Vlans, None)
            .expect("third attempt succeeds");
        assert_eq!(page.results.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn client_error_is_sent_once() {
        let (url, hits) = stub_service(vec![Reply::Status(400, r#"{"vid": ["exists"]}"#)]);
        let err = client(&url, Duration::from_secs(5))
            .create(Collection::Vlans, &[serde_json::json!({"vid": 20})])
            .expect_err("rejected");
        assert!(matches!(err, InventoryError::Status { status: 400, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn create_is_resent_after_service_unavailable() {
        let (url, hits) = stub_service(vec![
            Reply::Status(503, ""),
            Reply::Status(201, r#"[{"id": 7, "vid": 20}]"#),
        ]);
        let created = client(&url, Duration::from_secs(5))
            .create(Collection::Vlans, &[serde_json::json!({"vid": 20})])
            .expect("created");
        assert_eq!(created[0]["id"], 7);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn create_is_not_resent_after_server_error_or_timeout() {
        let (url, hits) = stub_service(vec![Reply::Status(500, "")]);
        let err = client(&url, Duration::from_secs(5))
            .create(Collection::Vlans, &[serde_json::json!({"vid": 20})])
            .expect_err("server error");
        assert!(matches!(err, InventoryError::Status { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (url, hits) = stub_service(vec![Reply::Silent, Reply::Silent, Reply::Silent]);
        let err = client(&url, Duration::from_millis(300))
            .create(Collection::Vlans, &[serde_json::json!({"vid": 20})])
            .expect_err("timed out");
        assert!(matches!(err, InventoryError::Transport(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_is_retried_after_timeout() {
        let (url, hits) = stub_service(vec![
            Reply::Silent,
            Reply::Status(200, r#"[{"id": 3, "enabled": false}]"#),
        ]);
        let updated = client(&url, Duration::from_millis(300))
            .update(Collection::Interfaces, &[serde_json::json!({"id": 3, "enabled": false})])
            .expect("second attempt succeeds");
        assert_eq!(updated.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn urls_hang_off_the_api_root() {
        let inventory = HttpInventory::new(
            "https://inventory.example/",
            None,
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
        .expect("client");
        assert_eq!(
            inventory.url(Collection::Vlans),
            "https://inventory.example/api/ipam/vlans/"
        );
        assert_eq!(
            inventory.url(Collection::SiteGroups),
            "https://inventory.example/api/dcim/site-groups/"
        );
    }

    #[test]
    fn responses_normalise_to_object_lists() {
        let objects = into_objects(serde_json::json!({"id": 1})).expect("object");
        assert_eq!(objects.len(), 1);
        assert!(into_objects(Value::Null).expect("null").is_empty());
        assert!(into_objects(serde_json::json!(3)).is_err());
    }

    #[test]
    fn unreachable_service_fails_after_bounded_retries() {
        // nothing listens on the discard port of localhost
        let inventory = HttpInventory::new(
            "http://127.0.0.1:9",
            Some("secret".to_string()),
            Duration::from_secs(2),
            RetryPolicy {
                retries: 1,
                backoff: Duration::from_millis(1),
            },
        )
        .expect("client");
        let err = inventory.list(Collection::Devices).expect_err("no service");
        assert!(matches!(
            err,
            InventoryError::Connect(_) | InventoryError::Transport(_)
        ));
    }
}
