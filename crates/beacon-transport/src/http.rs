//! Blocking HTTP transport.

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{
    AlwaysOnline, ConnectivityProbe, EncodedPayload, Transport, TransportError, TransportResult,
};

/// Largest response body the transport will buffer.
pub const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Posts batches as `application/x-www-form-urlencoded` bodies.
pub struct HttpTransport {
    client: Client,
    probe: Box<dyn ConnectivityProbe>,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            probe: Box::new(AlwaysOnline),
        })
    }

    /// Replace the connectivity probe consulted before each flush.
    pub fn with_probe(mut self, probe: impl ConnectivityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }
}

/// Parse an endpoint, accepting only http and https.
fn parse_endpoint(url: &str) -> TransportResult<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(TransportError::MalformedUrl(format!(
            "unsupported scheme {other} in {url}"
        ))),
    }
}

impl Transport for HttpTransport {
    fn perform_request(
        &self,
        url: &str,
        payload: &EncodedPayload,
    ) -> TransportResult<Option<Vec<u8>>> {
        let endpoint = parse_endpoint(url)?;
        debug!(url = %endpoint, bytes = payload.len(), "Posting batch");

        let response = self
            .client
            .post(endpoint)
            .form(&payload.form_fields())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "Collector rejected batch");
            return Err(TransportError::Io(format!("unexpected status {status}")));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_RESPONSE_BYTES {
                return Err(TransportError::OutOfMemory(format!(
                    "response of {length} bytes exceeds limit"
                )));
            }
        }

        let body = response.bytes()?;
        if body.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(TransportError::OutOfMemory(format!(
                "response of {} bytes exceeds limit",
                body.len()
            )));
        }

        if body.is_empty() {
            Ok(None)
        } else {
            Ok(Some(body.to_vec()))
        }
    }

    fn is_online(&self) -> bool {
        self.probe.is_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    struct Offline;

    impl ConnectivityProbe for Offline {
        fn is_online(&self) -> bool {
            false
        }
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).unwrap()
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        if key.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve a single request and hand back what was received.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            tx.send(request).unwrap();
        });

        (format!("http://{addr}/v1/track"), rx)
    }

    #[test]
    fn posts_form_body_and_returns_response() {
        let (url, received) = serve_once("200 OK", "1");
        let payload = EncodedPayload::from_batch_json(r#"[{"event":"a"}]"#, true);

        let body = transport().perform_request(&url, &payload).unwrap();
        assert_eq!(body, Some(b"1".to_vec()));

        let request = received.recv().unwrap();
        assert!(request.starts_with("POST /v1/track HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("content-type: application/x-www-form-urlencoded"));
        assert!(request.ends_with("data=W3siZXZlbnQiOiJhIn1d&verbose=1"));
    }

    #[test]
    fn empty_body_is_none() {
        let (url, _received) = serve_once("200 OK", "");
        let payload = EncodedPayload::from_batch_json("[]", false);

        let body = transport().perform_request(&url, &payload).unwrap();
        assert_eq!(body, None);
    }

    #[test]
    fn server_error_is_recoverable() {
        let (url, _received) = serve_once("503 Service Unavailable", "busy");
        let payload = EncodedPayload::from_batch_json("[]", false);

        let err = transport().perform_request(&url, &payload).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn connection_refused_is_recoverable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let payload = EncodedPayload::from_batch_json("[]", false);

        let err = transport()
            .perform_request(&format!("http://{addr}/track"), &payload)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn malformed_urls_are_not_recoverable() {
        let payload = EncodedPayload::from_batch_json("[]", false);
        let transport = transport();

        for url in ["not a url", "ftp://tracker.example.com/track", ""] {
            let err = transport.perform_request(url, &payload).unwrap_err();
            assert!(matches!(err, TransportError::MalformedUrl(_)), "{url}: {err}");
        }
    }

    #[test]
    fn probe_controls_online_state() {
        assert!(transport().is_online());
        assert!(!transport().with_probe(Offline).is_online());
    }
}
