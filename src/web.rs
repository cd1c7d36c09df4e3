//! Local JSON surface.
//!
//! A `tiny_http` server bound once at boot and drained from the main loop,
//! so request handlers run on the loop's context and mutate the [`Device`]
//! directly. Works on both host and ESP32 (via `std::net`).
//!
//! # Routes
//!
//! | Method | Path            | Answer                         |
//! |--------|-----------------|--------------------------------|
//! | GET    | `/api/reading`  | latest valid reading           |
//! | GET    | `/api/time`     | local time and sync state      |
//! | GET    | `/api/status`   | network and peripheral state   |
//! | GET    | `/api/delivery` | delivery config and last result|
//! | GET    | `/api/networks` | Wi-Fi scan                     |
//! | POST   | `/api/command`  | apply a JSON `Command`         |

use crate::clock::Clock;
use crate::device::{Command, CommandError, Device};
use crate::orchestrator::RequestSource;
use crate::platform::Platform;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};

/// Default port on the device.
pub const DEFAULT_PORT: u16 = 80;

/// Requests handled per loop iteration.
const MAX_REQUESTS_PER_TICK: usize = 4;

/// Largest accepted command body.
const MAX_BODY_LEN: u64 = 2048;

const INDEX: &str = "BMS monitor\n\
GET  /api/reading\n\
GET  /api/time\n\
GET  /api/status\n\
GET  /api/delivery\n\
GET  /api/networks\n\
POST /api/command\n";

/// A routed answer, independent of the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub json: bool,
}

impl Reply {
    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status: 200,
                body,
                json: true,
            },
            Err(e) => Self::error(500, &e.to_string()),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
            json: true,
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            json: false,
        }
    }
}

fn error_status(e: &CommandError) -> u16 {
    match e {
        CommandError::Config(_) => 400,
        CommandError::Store(_) => 500,
        CommandError::Network(_) | CommandError::Delivery(_) => 502,
    }
}

fn command_reply<P: Platform>(device: &mut Device<P>, command: Command, clock: &dyn Clock) -> Reply {
    match device.handle(command, clock) {
        Ok(response) => Reply::json(&response),
        Err(e) => {
            warn!("Command failed: {}", e);
            Reply::error(error_status(&e), &e.to_string())
        }
    }
}

/// Route one request against the device.
pub fn route<P: Platform>(
    method: &Method,
    url: &str,
    body: &str,
    device: &mut Device<P>,
    clock: &dyn Clock,
) -> Reply {
    let path = url.split('?').next().unwrap_or(url).trim_end_matches('/');
    let now = clock.now();

    match (method, path) {
        (Method::Get, "") => Reply::text(200, INDEX),
        (Method::Get, "/api/reading") => Reply::json(&device.reading_view(now)),
        (Method::Get, "/api/time") => Reply::json(&device.time_view()),
        (Method::Get, "/api/status") => Reply::json(&device.status_view(now)),
        (Method::Get, "/api/delivery") => Reply::json(&device.delivery_view(now)),
        (Method::Get, "/api/networks") => command_reply(device, Command::ScanNetworks, clock),
        (Method::Post, "/api/command") => match serde_json::from_str::<Command>(body) {
            Ok(command) => {
                debug!("Command: {:?}", command);
                command_reply(device, command, clock)
            }
            Err(e) => Reply::error(400, &format!("bad command: {}", e)),
        },
        (
            _,
            "" | "/api/reading" | "/api/time" | "/api/status" | "/api/delivery" | "/api/networks"
            | "/api/command",
        ) => Reply::error(405, "method not allowed"),
        _ => Reply::error(404, "not found"),
    }
}

/// The HTTP server, drained by the main loop.
pub struct WebServer {
    server: Server,
    content_type_json: Header,
    content_type_text: Header,
}

impl WebServer {
    /// Bind on all interfaces.
    pub fn start(port: u16) -> Result<Self, std::io::Error> {
        let addr = format!("0.0.0.0:{}", port);
        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        info!("Web server listening on http://{}/", addr);

        let content_type_json = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .map_err(|_| std::io::Error::other("bad header"))?;
        let content_type_text = Header::from_bytes(&b"Content-Type"[..], &b"text/plain"[..])
            .map_err(|_| std::io::Error::other("bad header"))?;

        Ok(Self {
            server,
            content_type_json,
            content_type_text,
        })
    }

    fn answer<P: Platform>(&self, mut request: Request, device: &mut Device<P>, clock: &dyn Clock) {
        let mut body = String::new();
        if *request.method() == Method::Post {
            if let Err(e) = request
                .as_reader()
                .take(MAX_BODY_LEN)
                .read_to_string(&mut body)
            {
                let reply = Reply::error(400, &format!("unreadable body: {}", e));
                self.respond(request, reply);
                return;
            }
        }

        let reply = route(request.method(), request.url(), &body, device, clock);
        self.respond(request, reply);
    }

    fn respond(&self, request: Request, reply: Reply) {
        let header = if reply.json {
            self.content_type_json.clone()
        } else {
            self.content_type_text.clone()
        };
        let response = Response::from_string(reply.body)
            .with_status_code(reply.status)
            .with_header(header);
        if let Err(e) = request.respond(response) {
            warn!("Failed to send response: {}", e);
        }
    }
}

impl<P: Platform> RequestSource<P> for WebServer {
    fn service(&mut self, device: &mut Device<P>, clock: &dyn Clock) {
        for _ in 0..MAX_REQUESTS_PER_TICK {
            match self.server.try_recv() {
                Ok(Some(request)) => self.answer(request, device, clock),
                Ok(None) => break,
                Err(e) => {
                    error!("Web server error: {}", e);
                    break;
                }
            }
            if device.restart_requested().is_some() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::tests::{device, provisioned_store, TestPlatform};
    use crate::bms::ReadingSnapshot;
    use crate::network::ScanResult;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use crate::testutil::MockRadio;
    use serde_json::Value;

    fn booted() -> (Device<TestPlatform>, ManualClock) {
        let clock = ManualClock::new();
        let mut dev = device(provisioned_store(), MockRadio::reachable());
        dev.boot(&clock);
        dev.tick(clock.now());
        (dev, clock)
    }

    fn get(dev: &mut Device<TestPlatform>, clock: &ManualClock, path: &str) -> (u16, Value) {
        let reply = route(&Method::Get, path, "", dev, clock);
        let value = serde_json::from_str(&reply.body).unwrap();
        (reply.status, value)
    }

    fn post(dev: &mut Device<TestPlatform>, clock: &ManualClock, body: &str) -> (u16, Value) {
        let reply = route(&Method::Post, "/api/command", body, dev, clock);
        let value = serde_json::from_str(&reply.body).unwrap();
        (reply.status, value)
    }

    #[test]
    fn test_reading_route() {
        let (mut dev, clock) = booted();
        let (status, value) = get(&mut dev, &clock, "/api/reading");
        assert_eq!(status, 200);
        assert_eq!(value["available"], true);
        assert_eq!(value["reading"]["soc"], 85);
        assert_eq!(value["peripheral_state"], "connected");
    }

    #[test]
    fn test_implausible_poll_keeps_last_reading() {
        let (mut dev, clock) = booted();
        dev.peripheral_mut()
            .client_mut()
            .readings
            .push_back(Ok(ReadingSnapshot::default()));
        clock.advance(Duration::from_secs(20));
        dev.tick(clock.now());

        let (status, value) = get(&mut dev, &clock, "/api/reading");
        assert_eq!(status, 200);
        assert_eq!(value["available"], false);
        assert_eq!(value["reading"]["soc"], 85);
        assert_eq!(value["reading"]["cell_voltages"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_reading_unavailable_without_peripheral() {
        let clock = ManualClock::new();
        let mut dev = device(MemoryStore::new(), MockRadio::reachable());
        dev.boot(&clock);
        let (status, value) = get(&mut dev, &clock, "/api/reading");
        assert_eq!(status, 200);
        assert_eq!(value["available"], false);
        assert!(value.get("reading").is_none());
    }

    #[test]
    fn test_status_route_ignores_query_and_slash() {
        let (mut dev, clock) = booted();
        let (status, value) = get(&mut dev, &clock, "/api/status/?x=1");
        assert_eq!(status, 200);
        assert_eq!(value["network_mode"], "sta_connected");
        assert_eq!(value["data_valid"], true);
    }

    #[test]
    fn test_networks_route_scans() {
        let (mut dev, clock) = booted();
        dev.network_mut().radio_mut().networks = vec![ScanResult {
            ssid: "home".into(),
            rssi: -50,
            channel: 6,
            secured: true,
        }];
        let (status, value) = get(&mut dev, &clock, "/api/networks");
        assert_eq!(status, 200);
        assert_eq!(value["result"], "networks");
        assert_eq!(value["networks"][0]["ssid"], "home");
    }

    #[test]
    fn test_command_route_applies_and_persists() {
        let (mut dev, clock) = booted();
        let (status, value) = post(
            &mut dev,
            &clock,
            r#"{"command":"set_delivery","enabled":true,"url":"https://example.com/x","interval_secs":5}"#,
        );
        assert_eq!(status, 200);
        assert_eq!(value["result"], "ok");
        assert_eq!(dev.config().delivery_interval_secs, 10);

        let (_, value) = get(&mut dev, &clock, "/api/delivery");
        assert_eq!(value["interval_secs"], 10);
        assert_eq!(value["url"], "https://example.com/x");
    }

    #[test]
    fn test_command_route_errors() {
        let (mut dev, clock) = booted();

        let (status, _) = post(&mut dev, &clock, "not json");
        assert_eq!(status, 400);

        let (status, value) = post(
            &mut dev,
            &clock,
            r#"{"command":"set_timezone","timezone":""}"#,
        );
        assert_eq!(status, 400);
        assert!(value["error"].is_string());
    }

    #[test]
    fn test_overlong_delivery_url_rejected() {
        let (mut dev, clock) = booted();
        let body = serde_json::json!({
            "command": "set_delivery",
            "enabled": true,
            "url": format!("https://example.com/{}", "a".repeat(300)),
            "interval_secs": 60,
        })
        .to_string();
        let (status, value) = post(&mut dev, &clock, &body);
        assert_eq!(status, 400);
        assert!(value["error"].as_str().unwrap().contains("too long"));
        assert_eq!(dev.config().delivery_url, "http://10.0.0.2/hook");
    }

    #[test]
    fn test_test_delivery_route() {
        let (mut dev, clock) = booted();
        let (status, value) = post(&mut dev, &clock, r#"{"command":"test_delivery"}"#);
        assert_eq!(status, 200);
        assert_eq!(value["result"], "delivered");
        assert_eq!(value["status"], 200);
    }

    #[test]
    fn test_restart_reported() {
        let (mut dev, clock) = booted();
        let (status, value) = post(&mut dev, &clock, r#"{"command":"reset_network"}"#);
        assert_eq!(status, 200);
        assert_eq!(value["result"], "restart_pending");
        assert_eq!(value["reason"], "credentials_cleared");
    }

    #[test]
    fn test_unknown_and_wrong_method() {
        let (mut dev, clock) = booted();
        let (status, _) = get(&mut dev, &clock, "/nope");
        assert_eq!(status, 404);

        let reply = route(&Method::Get, "/api/command", "", &mut dev, &clock);
        assert_eq!(reply.status, 405);

        let reply = route(&Method::Get, "/", "", &mut dev, &clock);
        assert_eq!(reply.status, 200);
        assert!(!reply.json);
        assert!(reply.body.contains("/api/reading"));
    }
}
