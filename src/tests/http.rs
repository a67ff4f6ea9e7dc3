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

use crate::ingress::{Buffer, ProtocolVersion, Sender, SenderBuilder, TimestampNanos};
use crate::tests::mock::{HttpResponse, MockServer};
use crate::tests::{assert_err_contains, f64_binary, TestResult};
use crate::ErrorCode;
use rstest::rstest;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn trade(sender: &mut Sender, price: f64) -> crate::Result<()> {
    sender.row(
        "trades",
        &[("sym", Some("BTC-USD".into()))],
        &[("price", Some(price.into()))],
        TimestampNanos::new(42)?,
    )
}

const TRADE_V1: &[u8] = b"trades,sym=BTC-USD price=61234.5 42\n";

/// Run the server side of a test on its own thread.
fn serve<F>(mut server: MockServer, f: F) -> JoinHandle<io::Result<MockServer>>
where
    F: FnOnce(&mut MockServer) -> io::Result<()> + Send + 'static,
{
    thread::spawn(move || {
        f(&mut server)?;
        Ok(server)
    })
}

fn v1_sender(builder: SenderBuilder) -> crate::Result<Sender> {
    let mut sender = builder.protocol_version(ProtocolVersion::V1)?.build()?;
    sender.establish()?;
    Ok(sender)
}

#[test]
fn post_write() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(server.lsb_http())?;
    let server_jh = serve(server, |server| {
        let req = server.recv_http_q()?;
        assert_eq!(req.method(), "POST");
        assert_eq!(req.path(), "/write?precision=n");
        assert_eq!(
            req.header("user-agent"),
            Some(concat!("questdb/rust/", env!("CARGO_PKG_VERSION")))
        );
        assert_eq!(req.header("authorization"), None);
        assert_eq!(req.body(), TRADE_V1);
        server.send_http_response(HttpResponse::empty())
    });

    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    assert!(sender.is_empty());
    server_jh.join().unwrap()?;
    Ok(())
}

#[rstest]
#[case::basic(
    "http::addr=localhost:{port};protocol_version=1;username=user;password=pass;",
    "Basic dXNlcjpwYXNz"
)]
#[case::token(
    "http::addr=localhost:{port};protocol_version=1;token=abc123;",
    "Bearer abc123"
)]
fn auth_headers(#[case] conf: &str, #[case] expected: &'static str) -> TestResult {
    let server = MockServer::new()?;
    let conf = conf.replace("{port}", &server.port.to_string());
    let mut sender = Sender::from_conf(conf)?;
    let server_jh = serve(server, move |server| {
        let req = server.recv_http_q()?;
        assert_eq!(req.header("authorization"), Some(expected));
        server.send_http_response(HttpResponse::empty())
    });
    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    server_jh.join().unwrap()?;
    Ok(())
}

fn flush_against(response: HttpResponse) -> crate::Result<()> {
    let server = MockServer::new().unwrap();
    let mut sender = v1_sender(server.lsb_http().retry_timeout(Duration::ZERO)?)?;
    let server_jh = serve(server, move |server| {
        server.recv_http_q()?;
        server.send_http_response(response)
    });
    trade(&mut sender, 61234.5)?;
    let res = sender.flush();
    server_jh.join().unwrap().unwrap();
    res
}

#[test]
fn text_error() {
    assert_err_contains(
        flush_against(
            HttpResponse::empty()
                .with_status(400, "Bad Request")
                .with_body_str("error in line 1: table: trades; bad column"),
        ),
        ErrorCode::ServerFlushError,
        "Could not flush buffer: error in line 1: table: trades; bad column",
    );
}

#[test]
fn json_error() {
    let body = serde_json::json!({
        "code": "invalid",
        "message": "failed to parse line protocol: invalid field format",
        "errorId": "ABC-1",
        "line": 2,
    });
    assert_err_contains(
        flush_against(
            HttpResponse::empty()
                .with_status(400, "Bad Request")
                .with_body_json(&body),
        ),
        ErrorCode::ServerFlushError,
        "Could not flush buffer: failed to parse line protocol: invalid field format \
        [id: ABC-1, code: invalid, line: 2]",
    );
}

#[test]
fn not_found() {
    assert_err_contains(
        flush_against(HttpResponse::empty().with_status(404, "Not Found")),
        ErrorCode::HttpNotSupported,
        "Could not flush buffer: HTTP endpoint does not support ILP.",
    );
}

#[rstest]
#[case(401, "Unauthorized")]
#[case(403, "Forbidden")]
fn auth_failure(#[case] code: u16, #[case] text: &str) {
    assert_err_contains(
        flush_against(HttpResponse::empty().with_status(code, text)),
        ErrorCode::AuthError,
        &format!("Could not flush buffer: HTTP endpoint authentication error [code: {code}]"),
    );
}

#[test]
fn auth_failure_with_body() {
    assert_err_contains(
        flush_against(
            HttpResponse::empty()
                .with_status(401, "Unauthorized")
                .with_body_str("token expired"),
        ),
        ErrorCode::AuthError,
        "HTTP endpoint authentication error: token expired [code: 401]",
    );
}

#[test]
fn failed_flush_clears_buffer() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(server.lsb_http().retry_timeout(Duration::ZERO)?)?;
    let server_jh = serve(server, |server| {
        server.recv_http_q()?;
        server.send_http_response(
            HttpResponse::empty()
                .with_status(400, "Bad Request")
                .with_body_str("nope"),
        )?;
        // No retry for client errors.
        assert!(server.recv_http(0.3).is_err());
        Ok(())
    });
    trade(&mut sender, 61234.5)?;
    assert!(sender.flush().is_err());
    assert!(sender.is_empty());
    server_jh.join().unwrap()?;
    Ok(())
}

#[test]
fn retry_on_server_error() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(server.lsb_http().retry_timeout(Duration::from_secs(5))?)?;
    let server_jh = serve(server, |server| {
        let first = server.recv_http_q()?;
        server.send_http_response(
            HttpResponse::empty().with_status(500, "Internal Server Error"),
        )?;
        let second = server.recv_http_q()?;
        assert_eq!(first.body(), second.body());
        server.send_http_response(HttpResponse::empty())
    });
    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    server_jh.join().unwrap()?;
    Ok(())
}

#[test]
fn new_connection_after_close() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(server.lsb_http())?;
    let server_jh = serve(server, |server| {
        server.recv_http_q()?;
        server.send_http_response(HttpResponse::empty().with_header("connection", "close"))?;
        server.disconnect();
        let req = server.recv_http_q()?;
        assert_eq!(req.body(), TRADE_V1);
        server.send_http_response(HttpResponse::empty())
    });
    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    server_jh.join().unwrap()?;
    Ok(())
}

#[test]
fn request_timeout() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(
        server
            .lsb_http()
            .request_timeout(Duration::from_millis(100))?
            .request_min_throughput(0)?
            .retry_timeout(Duration::ZERO)?,
    )?;
    let server_jh = serve(server, |server| {
        server.recv_http_q()?;
        thread::sleep(Duration::from_millis(500));
        Ok(())
    });
    trade(&mut sender, 61234.5)?;
    assert_err_contains(sender.flush(), ErrorCode::SocketError, "timed out");
    server_jh.join().unwrap()?;
    Ok(())
}

#[test]
fn external_buffer_over_http() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = v1_sender(server.lsb_http())?;
    let server_jh = serve(server, |server| {
        for _ in 0..2 {
            let req = server.recv_http_q()?;
            assert_eq!(req.body(), b"t,a=b c=1i\n");
            server.send_http_response(HttpResponse::empty())?;
        }
        Ok(())
    });
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.table("t")?.symbol("a", "b")?.column_i64("c", 1)?.at_now()?;
    sender.flush_and_keep(&buffer)?;
    sender.flush_buffer(&mut buffer)?;
    assert!(buffer.is_empty());
    server_jh.join().unwrap()?;
    Ok(())
}

/// Build an auto-detecting sender against a server answering `/settings`
/// with `settings` (404 if `None`).
fn negotiate(
    builder: impl FnOnce(SenderBuilder) -> crate::Result<SenderBuilder>,
    settings: Option<&'static str>,
) -> Result<(Sender, MockServer), Box<dyn std::error::Error>> {
    let server = MockServer::new()?;
    let mut sender = builder(server.lsb_http())?.build()?;
    assert_eq!(sender.protocol_version(), None);
    let server_jh = serve(server, move |server| {
        server.serve_settings(settings).map(|_| ())
    });
    let res = sender.establish();
    let server = server_jh.join().unwrap()?;
    res?;
    Ok((sender, server))
}

#[rstest]
#[case::both(
    Some(r#"{"config":{"line.proto.support.versions":[1,2],"cairo.max.file.name.length":64}}"#),
    ProtocolVersion::V2,
    64
)]
#[case::v1_only(Some(r#"{"line.proto.support.versions":[1]}"#), ProtocolVersion::V1, 127)]
#[case::v2_only(
    Some(r#"{"config":{"line.proto.support.versions":[2]}}"#),
    ProtocolVersion::V2,
    127
)]
#[case::future_versions(
    Some(r#"{"line.proto.support.versions":[1,2,3]}"#),
    ProtocolVersion::V2,
    127
)]
#[case::unlisted(Some(r#"{"release.type":"OSS","release.version":"8.1.0"}"#), ProtocolVersion::V1, 127)]
#[case::no_endpoint(None, ProtocolVersion::V1, 127)]
fn protocol_negotiation(
    #[case] settings: Option<&'static str>,
    #[case] expected: ProtocolVersion,
    #[case] max_name_len: usize,
) -> TestResult {
    let (sender, _server) = negotiate(Ok, settings)?;
    assert_eq!(sender.protocol_version(), Some(expected));
    assert_eq!(sender.max_name_len(), max_name_len);
    let buffer = sender.new_buffer()?;
    assert_eq!(buffer.protocol_version(), expected);
    assert_eq!(buffer.max_name_len(), max_name_len);
    Ok(())
}

#[test]
fn explicit_max_name_len_kept() -> TestResult {
    let (sender, _server) = negotiate(
        |b| b.max_name_len(200),
        Some(r#"{"config":{"line.proto.support.versions":[1,2],"cairo.max.file.name.length":64}}"#),
    )?;
    assert_eq!(sender.protocol_version(), Some(ProtocolVersion::V2));
    assert_eq!(sender.max_name_len(), 200);
    Ok(())
}

#[test]
fn no_common_version() {
    let err = negotiate(Ok, Some(r#"{"line.proto.support.versions":[3,4]}"#)).unwrap_err();
    let err = err.downcast::<crate::Error>().unwrap();
    assert_eq!(err.code(), ErrorCode::ProtocolVersionError);
    assert_eq!(
        err.msg(),
        "Server does not support current client. Server supports versions [3, 4], client supports [1, 2]."
    );
}

#[test]
fn malformed_settings() {
    let err = negotiate(Ok, Some("<html>not json</html>")).unwrap_err();
    let err = err.downcast::<crate::Error>().unwrap();
    assert_eq!(err.code(), ErrorCode::ProtocolVersionError);
    assert!(
        err.msg().starts_with("Malformed server response, settings url: http://127.0.0.1:"),
        "{}",
        err.msg()
    );
}

#[test]
fn settings_server_error() -> TestResult {
    let server = MockServer::new()?;
    let port = server.port;
    let mut sender = server.lsb_http().build()?;
    let server_jh = serve(server, |server| {
        server.recv_http_q()?;
        server.send_http_response(HttpResponse::empty().with_status(502, "Bad Gateway"))?;
        // Not a transient status: no retry follows.
        assert!(server.recv_http(0.3).is_err());
        Ok(())
    });
    let res = sender.establish();
    server_jh.join().unwrap()?;
    assert_err_contains(
        res,
        ErrorCode::ProtocolVersionError,
        &format!(
            "Could not detect server's line protocol version, \
            settings url: http://127.0.0.1:{port}/settings, status code: 502."
        ),
    );
    Ok(())
}

#[test]
fn negotiated_v2_writes_binary() -> TestResult {
    let (mut sender, server) = negotiate(
        Ok,
        Some(r#"{"config":{"line.proto.support.versions":[1,2]}}"#),
    )?;
    let mut exp = b"trades,sym=BTC-USD price=".to_vec();
    exp.extend(f64_binary(61234.5));
    exp.extend_from_slice(b" 42\n");
    let server_jh = thread::spawn(move || -> io::Result<MockServer> {
        let mut server = server;
        let req = server.recv_http_q()?;
        assert_eq!(req.body(), exp.as_slice());
        server.send_http_response(HttpResponse::empty())?;
        Ok(server)
    });
    trade(&mut sender, 61234.5)?;
    sender.flush()?;
    server_jh.join().unwrap()?;
    Ok(())
}

#[test]
fn rows_need_known_version() -> TestResult {
    let server = MockServer::new()?;
    let mut sender = server.lsb_http().build()?;
    assert_err_contains(
        trade(&mut sender, 1.0),
        ErrorCode::ProtocolVersionError,
        "The protocol version is not known yet.",
    );
    assert_err_contains(
        sender.new_buffer(),
        ErrorCode::ProtocolVersionError,
        "The protocol version is not known yet.",
    );
    Ok(())
}
