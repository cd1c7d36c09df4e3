//! ESP-IDF HTTP client transport.

use super::{FailureReason, HttpResponse, HttpTransport, Timeouts, EXCERPT_LEN};
use embedded_svc::http::client::Client;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::io::EspIOError;
use esp_idf_sys::{
    ESP_ERR_HTTP_CONNECT, ESP_ERR_HTTP_CONNECTION_CLOSED, ESP_ERR_HTTP_EAGAIN,
    ESP_ERR_HTTP_FETCH_HEADER, ESP_ERR_HTTP_INVALID_TRANSPORT, ESP_ERR_HTTP_WRITE_DATA,
    ESP_ERR_TIMEOUT,
};

/// Bytes of response body read for the excerpt (UTF-8 may need up to 4 per char).
const READ_LIMIT: usize = EXCERPT_LEN * 4;

/// One `EspHttpConnection` per request; nothing is kept open between dispatches.
#[derive(Debug, Default)]
pub struct EspTransport;

impl EspTransport {
    pub fn new() -> Self {
        Self
    }
}

fn failure_reason(e: &EspIOError) -> FailureReason {
    match e.0.code() as u32 {
        ESP_ERR_HTTP_CONNECT => FailureReason::ConnectionFailed,
        ESP_ERR_HTTP_WRITE_DATA => FailureReason::SendFailed,
        ESP_ERR_HTTP_FETCH_HEADER => FailureReason::NoStream,
        ESP_ERR_HTTP_INVALID_TRANSPORT => FailureReason::NoConnection,
        ESP_ERR_HTTP_CONNECTION_CLOSED => FailureReason::ConnectionLost,
        ESP_ERR_HTTP_EAGAIN | ESP_ERR_TIMEOUT => FailureReason::Timeout,
        _ => FailureReason::Other(format!("{:?}", e)),
    }
}

impl HttpTransport for EspTransport {
    fn post_json(
        &mut self,
        url: &str,
        body: &str,
        timeouts: Timeouts,
    ) -> Result<HttpResponse, FailureReason> {
        // The IDF client has a single network timeout covering connect and I/O
        let config = HttpConfiguration {
            timeout: Some(timeouts.total),
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&config).map_err(|_| FailureReason::NoConnection)?;
        let mut client = Client::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];
        let mut request = client.post(url, &headers).map_err(|e| failure_reason(&e))?;
        request
            .write_all(body.as_bytes())
            .map_err(|_| FailureReason::SendFailed)?;
        request.flush().map_err(|_| FailureReason::SendFailed)?;

        let mut response = request.submit().map_err(|e| failure_reason(&e))?;
        let status = response.status();

        let mut raw = Vec::new();
        let mut chunk = [0u8; 128];
        while raw.len() < READ_LIMIT {
            match response.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}
