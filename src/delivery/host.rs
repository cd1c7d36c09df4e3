//! Blocking `reqwest` transport for host builds.

use super::{FailureReason, HttpResponse, HttpTransport, Timeouts};
use log::debug;
use reqwest::blocking::Client;

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with the default connect timeout.
    pub fn new() -> Result<Self, FailureReason> {
        let client = Client::builder()
            .connect_timeout(Timeouts::default().connect)
            .build()
            .map_err(|e| FailureReason::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

fn failure_reason(e: &reqwest::Error) -> FailureReason {
    if e.is_timeout() {
        FailureReason::Timeout
    } else if e.is_connect() {
        FailureReason::ConnectionFailed
    } else if e.is_body() || e.is_decode() {
        FailureReason::ConnectionLost
    } else if e.is_request() {
        FailureReason::SendFailed
    } else {
        FailureReason::Other(e.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &str,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, FailureReason> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_owned())
            .timeout(timeouts.total)
            .send()
            .map_err(|e| failure_reason(&e))?;

        let status = response.status().as_u16();
        let body = response.text().unwrap_or_else(|e| {
            debug!("Response body unreadable: {}", e);
            String::new()
        });
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;
    use tiny_http::{Response, Server};

    #[test]
    fn test_posts_json_and_reads_status() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();

        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let content_type = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Content-Type"))
                .map(|h| h.value.to_string());
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            request
                .respond(Response::from_string("created").with_status_code(201))
                .unwrap();
            (content_type, body)
        });

        let mut transport = ReqwestTransport::new().unwrap();
        let response = transport
            .post_json(
                &format!("http://127.0.0.1:{}/hook", port),
                r#"{"soc":85}"#,
                Timeouts::default(),
            )
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, "created");
        let (content_type, body) = handle.join().unwrap();
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(body, r#"{"soc":85}"#);
    }

    #[test]
    fn test_refused_connection_maps_to_connection_failed() {
        // Grab a free port, then close it
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transport = ReqwestTransport::new().unwrap();
        let result = transport.post_json(
            &format!("http://127.0.0.1:{}/hook", port),
            "{}",
            Timeouts::default(),
        );
        assert_eq!(result, Err(FailureReason::ConnectionFailed));
    }
}
