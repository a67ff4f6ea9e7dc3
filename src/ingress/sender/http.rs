/*******************************************************************************
 *     ___                  _   ____  ____
 *    / _ \ _   _  ___  ___| |_|  _ \| __ )
 *   | | | | | | |/ _ \/ __| __| | | |  _ \
 *   | |_| | |_| |  __/\__ \ |_| |_| | |_) |
 *    \__\_\\__,_|\___||___/\__|____/|____/
 *
 *  Copyright (c) 2014-2019 Appsicle
 *  Copyright (c) 2019-2025 QuestDB
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *  http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 ******************************************************************************/

use crate::error::{self, Error, Result};
use crate::ingress::conf::{AuthParams, HttpConfig};
use crate::ingress::tls::{configure_http_tls, TlsSettings};
use crate::ingress::ProtocolVersion;
use rand::Rng;
use std::fmt::Write;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use ureq::http::Response;
use ureq::Body;

const SETTINGS_RETRY_TIMEOUT: Duration = Duration::from_secs(1);

/// HTTP settings resolved when the sender is built.
pub(crate) struct HttpParams {
    base_url: String,
    auth: Option<String>,
    tls: Option<ureq::tls::TlsConfig>,
    request_min_throughput: u64,
    request_timeout: Duration,
    retry_timeout: Duration,
}

impl HttpParams {
    pub(crate) fn new(
        base_url: String,
        config: &HttpConfig,
        auth: Option<&AuthParams>,
        tls: Option<&TlsSettings>,
    ) -> Result<Self> {
        let auth = match auth {
            Some(AuthParams::Basic(auth)) => Some(auth.to_header_string()),
            Some(AuthParams::Token(auth)) => Some(auth.to_header_string()?),
            Some(AuthParams::Ecdsa(_)) => {
                return Err(error::fmt!(
                    AuthError,
                    "ECDSA authentication is not supported for ILP over HTTP. \
                    Please use basic or token authentication instead."
                ))
            }
            None => None,
        };
        let tls = tls.map(configure_http_tls).transpose()?;
        Ok(Self {
            base_url,
            auth,
            tls,
            request_min_throughput: *config.request_min_throughput,
            request_timeout: *config.request_timeout,
            retry_timeout: *config.retry_timeout,
        })
    }
}

/// What the server reports at `GET /settings`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ServerSettings {
    /// `None` when the server predates protocol version negotiation.
    pub(crate) protocol_versions: Option<Vec<u64>>,
    pub(crate) max_name_len: Option<usize>,
}

pub(crate) struct HttpHandler {
    /// Keeps a pool of open connections to the server.
    agent: ureq::Agent,
    write_url: String,
    settings_url: String,
    auth: Option<String>,
    request_min_throughput: u64,
    request_timeout: Duration,
    retry_timeout: Duration,
}

impl HttpHandler {
    pub(crate) fn new(params: &HttpParams) -> Result<Self> {
        let config = ureq::Agent::config_builder()
            .user_agent(concat!("questdb/rust/", env!("CARGO_PKG_VERSION")))
            .no_delay(true)
            .timeout_connect(Some(params.request_timeout))
            .http_status_as_error(false);
        let config = match params.tls.as_ref() {
            Some(tls) => config.tls_config(tls.clone()),
            None => config,
        };
        let agent = ureq::Agent::new_with_config(config.build());
        Ok(Self {
            agent,
            write_url: format!("{}/write?precision=n", params.base_url),
            settings_url: format!("{}/settings", params.base_url),
            auth: params.auth.clone(),
            request_min_throughput: params.request_min_throughput,
            request_timeout: params.request_timeout,
            retry_timeout: params.retry_timeout,
        })
    }

    pub(crate) fn settings_url(&self) -> &str {
        &self.settings_url
    }

    /// The fixed request timeout plus the time the payload takes at the
    /// minimum acceptable throughput.
    fn request_timeout_for(&self, len: usize) -> Duration {
        let extra = if self.request_min_throughput > 0 {
            Duration::from_secs_f64(len as f64 / self.request_min_throughput as f64)
        } else {
            Duration::ZERO
        };
        self.request_timeout + extra
    }

    fn post(&self, body: &[u8], timeout: Duration) -> std::result::Result<Response<Body>, ureq::Error> {
        let request = self
            .agent
            .post(&self.write_url)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .header("Content-Type", "text/plain; charset=utf-8");
        match self.auth.as_deref() {
            Some(auth) => request.header("Authorization", auth).send(body),
            None => request.send(body),
        }
    }

    fn get(&self, url: &str) -> std::result::Result<Response<Body>, ureq::Error> {
        let request = self
            .agent
            .get(url)
            .config()
            .timeout_global(Some(self.request_timeout))
            .build();
        match self.auth.as_deref() {
            Some(auth) => request.header("Authorization", auth).call(),
            None => request.call(),
        }
    }

    /// POST the buffer to `/write`, retrying transient failures.
    pub(crate) fn send(&self, body: &[u8]) -> Result<()> {
        let timeout = self.request_timeout_for(body.len());
        let res = with_retries(self.retry_timeout, || self.post(body, timeout));
        match res {
            Ok(res) if res.status().is_success() => Ok(()),
            Ok(res) => Err(parse_http_error(res)),
            Err(err) => Err(map_ureq_error(err, &self.write_url)),
        }
    }

    pub(crate) fn read_server_settings(&self) -> Result<ServerSettings> {
        let url = self.settings_url.as_str();
        let detection_err = |detail: String| {
            error::fmt!(
                ProtocolVersionError,
                "Could not detect server's line protocol version, settings url: {}, {}.",
                url,
                detail
            )
        };
        let res = with_retries(SETTINGS_RETRY_TIMEOUT, || self.get(url))
            .map_err(|err| detection_err(format!("err: {err}")))?;

        let status = res.status().as_u16();
        if status == 404 {
            debug!(settings_url = url, "no settings endpoint, assuming protocol version 1");
            return Ok(ServerSettings::default());
        }
        if !res.status().is_success() {
            return Err(detection_err(format!("status code: {status}")));
        }
        let body = res
            .into_body()
            .read_to_string()
            .map_err(|err| detection_err(format!("err: {err}")))?;
        parse_server_settings(&body).ok_or_else(|| {
            error::fmt!(
                ProtocolVersionError,
                "Malformed server response, settings url: {}, err: response is not valid JSON.",
                url
            )
        })
    }
}

/// `None` if the body isn't a JSON object.
pub(crate) fn parse_server_settings(body: &str) -> Option<ServerSettings> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.as_object()?;
    // Newer servers nest the values under "config".
    let root = json.get("config").unwrap_or(&json);
    let protocol_versions = root
        .get("line.proto.support.versions")
        .and_then(|versions| versions.as_array())
        .map(|versions| versions.iter().filter_map(|v| v.as_u64()).collect());
    let max_name_len = root
        .get("cairo.max.file.name.length")
        .and_then(|len| len.as_u64())
        .and_then(|len| usize::try_from(len).ok());
    Some(ServerSettings {
        protocol_versions,
        max_name_len,
    })
}

/// The highest version both sides support. Servers that don't list their
/// versions only speak V1.
pub(crate) fn choose_protocol_version(server_versions: Option<&[u64]>) -> Result<ProtocolVersion> {
    let Some(server_versions) = server_versions else {
        return Ok(ProtocolVersion::V1);
    };
    server_versions
        .iter()
        .filter_map(|&v| ProtocolVersion::from_server_number(v))
        .max()
        .ok_or_else(|| {
            error::fmt!(
                ProtocolVersionError,
                "Server does not support current client. Server supports versions {:?}, \
                client supports [1, 2].",
                server_versions
            )
        })
}

fn is_retriable_status(status: u16) -> bool {
    matches!(
        status,
        // Official HTTP codes
        500 | // Internal Server Error
        503 | // Service Unavailable
        504 | // Gateway Timeout

        // Unofficial extensions
        507 | // Insufficient Storage
        509 | // Bandwidth Limit Exceeded
        523 | // Origin is Unreachable
        524 | // A Timeout Occurred
        529 | // Site is overloaded
        599 // Network Connect Timeout Error
    )
}

fn is_retriable(res: &std::result::Result<Response<Body>, ureq::Error>) -> bool {
    match res {
        Ok(res) => is_retriable_status(res.status().as_u16()),
        Err(ureq::Error::Timeout(_))
        | Err(ureq::Error::Io(_))
        | Err(ureq::Error::ConnectionFailed)
        | Err(ureq::Error::HostNotFound) => true,
        Err(_) => false,
    }
}

/// Backoff starts at 10ms and doubles up to 1s, with +/-5ms of jitter.
#[allow(clippy::result_large_err)] // `ureq::Error` is large.
fn with_retries<F>(
    retry_timeout: Duration,
    mut attempt: F,
) -> std::result::Result<Response<Body>, ureq::Error>
where
    F: FnMut() -> std::result::Result<Response<Body>, ureq::Error>,
{
    let mut last = attempt();
    if retry_timeout.is_zero() || !is_retriable(&last) {
        return last;
    }

    let mut rng = rand::rng();
    let retry_end = Instant::now() + retry_timeout;
    let mut retry_interval_ms: i32 = 10;
    loop {
        let jitter_ms = rng.random_range(-5i32..5);
        let to_sleep = Duration::from_millis((retry_interval_ms + jitter_ms).max(0) as u64);
        if Instant::now() + to_sleep > retry_end {
            warn!(?retry_timeout, "giving up on HTTP request after retries");
            return last;
        }
        debug!(backoff_ms = to_sleep.as_millis() as u64, "retrying HTTP request");
        sleep(to_sleep);
        last = attempt();
        if !is_retriable(&last) {
            return last;
        }
        retry_interval_ms = (retry_interval_ms * 2).min(1000);
    }
}

fn map_ureq_error(err: ureq::Error, url: &str) -> Error {
    match err {
        ureq::Error::Timeout(timeout) => error::fmt!(
            SocketError,
            "Could not flush buffer: timed out reading response from {} ({})",
            url,
            timeout
        ),
        ureq::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => error::fmt!(
            SocketError,
            "Could not flush buffer: timed out reading response from {}: {}",
            url,
            io_err
        ),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => error::fmt!(
            SocketError,
            "Could not flush buffer: could not connect to {}: {}",
            url,
            err
        ),
        err => error::fmt!(SocketError, "Could not flush buffer: {}: {}", url, err),
    }
}

fn json_error_description(json: &serde_json::Value, msg: &str) -> String {
    let mut details = Vec::new();
    if let Some(error_id) = json.get("errorId").and_then(|v| v.as_str()) {
        details.push(format!("id: {error_id}"));
    }
    if let Some(code) = json.get("code").and_then(|v| v.as_str()) {
        details.push(format!("code: {code}"));
    }
    if let Some(line) = json.get("line").and_then(|v| v.as_i64()) {
        details.push(format!("line: {line}"));
    }

    let mut description = msg.to_string();
    if !details.is_empty() {
        let _ = write!(description, " [{}]", details.join(", "));
    }
    description
}

fn parse_http_error(res: Response<Body>) -> Error {
    let status = res.status().as_u16();
    if status == 404 {
        return error::fmt!(
            HttpNotSupported,
            "Could not flush buffer: HTTP endpoint does not support ILP."
        );
    }

    let is_json = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let body = match res.into_body().read_to_string() {
        Ok(body) => body,
        Err(err) => {
            return error::fmt!(
                SocketError,
                "Could not flush buffer: failed to read error response [code: {}]: {}",
                status,
                err
            )
        }
    };

    if matches!(status, 401 | 403) {
        let description = if body.is_empty() {
            String::new()
        } else {
            format!(": {body}")
        };
        return error::fmt!(
            AuthError,
            "Could not flush buffer: HTTP endpoint authentication error{} [code: {}]",
            description,
            status
        );
    }

    if is_json {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(msg) = json.get("message").and_then(|v| v.as_str()) {
                return error::fmt!(
                    ServerFlushError,
                    "Could not flush buffer: {}",
                    json_error_description(&json, msg)
                );
            }
        }
    }
    error::fmt!(ServerFlushError, "Could not flush buffer: {}", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(vec![1]), ProtocolVersion::V1)]
    #[case(Some(vec![2]), ProtocolVersion::V2)]
    #[case(Some(vec![1, 2]), ProtocolVersion::V2)]
    #[case(Some(vec![1, 2, 3]), ProtocolVersion::V2)]
    #[case(None, ProtocolVersion::V1)]
    fn picks_highest_common_version(
        #[case] server: Option<Vec<u64>>,
        #[case] expected: ProtocolVersion,
    ) {
        assert_eq!(choose_protocol_version(server.as_deref()).unwrap(), expected);
    }

    #[test]
    fn no_common_version() {
        let err = choose_protocol_version(Some(&[3, 4])).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::ProtocolVersionError);
        assert!(err.msg().contains("Server does not support current client"));
    }

    #[test]
    fn settings_flat_and_nested() {
        let flat = parse_server_settings(
            r#"{"release.type": "OSS", "line.proto.support.versions": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(flat.protocol_versions, Some(vec![1, 2]));
        assert_eq!(flat.max_name_len, None);

        let nested = parse_server_settings(
            r#"{"config": {"line.proto.support.versions": [1], "cairo.max.file.name.length": 64}}"#,
        )
        .unwrap();
        assert_eq!(nested.protocol_versions, Some(vec![1]));
        assert_eq!(nested.max_name_len, Some(64));

        let old = parse_server_settings(r#"{"release.type": "OSS", "acl.enabled": false}"#).unwrap();
        assert_eq!(old, ServerSettings::default());

        assert!(parse_server_settings("not json").is_none());
        assert!(parse_server_settings("[1, 2]").is_none());
    }

    #[test]
    fn json_error_details() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"code": "invalid", "message": "failed to parse line protocol", "line": 2, "errorId": "9f1"}"#,
        )
        .unwrap();
        assert_eq!(
            json_error_description(&json, "failed to parse line protocol"),
            "failed to parse line protocol [id: 9f1, code: invalid, line: 2]"
        );
    }

    #[test]
    fn retriable_statuses() {
        for status in [500, 503, 504, 507, 509, 523, 524, 529, 599] {
            assert!(is_retriable_status(status));
        }
        for status in [400, 401, 404, 501, 502, 505] {
            assert!(!is_retriable_status(status));
        }
    }
}
