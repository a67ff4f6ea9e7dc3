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

use crate::error::{self, Result};
use crate::ingress::conf::{
    AuthParams, BasicAuthParams, ConfigSetting, EcdsaAuthParams, HttpConfig, TokenAuthParams,
};
use crate::ingress::sender::{ConnectParams, HttpParams, SenderParams};
use crate::ingress::tls::TlsSettings;
use crate::ingress::{
    AutoFlush, CertificateAuthority, Port, Protocol, ProtocolVersion, Sender,
    DEFAULT_INIT_BUF_SIZE, MAX_NAME_LEN_DEFAULT,
};
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_BUF_SIZE: usize = 100 * 1024 * 1024;
const MIN_MAX_BUF_SIZE: usize = 1024;
const MIN_MAX_NAME_LEN: usize = 16;

/// One `key=value` pair from a config string.
struct ConfValue<'a> {
    key: &'a str,
    raw: &'a str,
}

impl ConfValue<'_> {
    fn number<T>(&self) -> Result<T>
    where
        T: FromStr,
        T::Err: Debug,
    {
        self.raw.parse().map_err(|e| {
            error::fmt!(
                ConfigError,
                "Could not parse {:?} to number: {e:?}",
                self.key
            )
        })
    }

    fn millis(&self) -> Result<Duration> {
        self.number().map(Duration::from_millis)
    }

    /// A number, or `off`.
    fn threshold<T>(&self) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Debug,
    {
        match self.raw {
            "off" => Ok(None),
            _ => self.number().map(Some),
        }
    }

    fn switch(&self) -> Result<bool> {
        match self.raw {
            "on" => Ok(true),
            "off" => Ok(false),
            other => Err(error::fmt!(
                ConfigError,
                "Config parameter {:?} must be either \"on\" or \"off\", not {other:?}.",
                self.key
            )),
        }
    }

    fn tls_ca(&self) -> Result<CertificateAuthority> {
        let needs = |features: &str| {
            Err(error::fmt!(
                ConfigError,
                "Config parameter \"tls_ca={}\" requires {features}",
                self.raw
            ))
        };
        match self.raw {
            "pem_file" => Ok(CertificateAuthority::PemFile),
            #[cfg(feature = "tls-webpki-certs")]
            "webpki_roots" => Ok(CertificateAuthority::WebpkiRoots),
            #[cfg(not(feature = "tls-webpki-certs"))]
            "webpki_roots" => needs("the \"tls-webpki-certs\" feature"),
            #[cfg(feature = "tls-native-certs")]
            "os_roots" => Ok(CertificateAuthority::OsRoots),
            #[cfg(not(feature = "tls-native-certs"))]
            "os_roots" => needs("the \"tls-native-certs\" feature"),
            #[cfg(all(feature = "tls-webpki-certs", feature = "tls-native-certs"))]
            "webpki_and_os_roots" => Ok(CertificateAuthority::WebpkiAndOsRoots),
            #[cfg(not(all(feature = "tls-webpki-certs", feature = "tls-native-certs")))]
            "webpki_and_os_roots" => {
                needs("both the \"tls-webpki-certs\" and \"tls-native-certs\" features")
            }
            other => Err(error::fmt!(
                ConfigError,
                "Invalid value {other:?} for \"tls_ca\""
            )),
        }
    }
}

/// Setting values may not carry control characters, whichever way they
/// were given.
fn no_control_chars(value: &str) -> Result<String> {
    match value
        .chars()
        .enumerate()
        .find(|(_, c)| matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}'))
    {
        Some((p, c)) => Err(error::fmt!(
            ConfigError,
            "Invalid character {c:?} at position {p}"
        )),
        None => Ok(value.to_owned()),
    }
}

fn greater_than_zero(key: &str, value: Option<usize>) -> Result<Option<usize>> {
    if value == Some(0) {
        return Err(error::fmt!(ConfigError, "{key:?} must be greater than 0."));
    }
    Ok(value)
}

#[derive(Debug, Clone)]
struct Credentials {
    username: ConfigSetting<Option<String>>,
    password: ConfigSetting<Option<String>>,
    token: ConfigSetting<Option<String>>,
    token_x: ConfigSetting<Option<String>>,
    token_y: ConfigSetting<Option<String>>,
}

type CredentialSlots<'a> = (
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

impl Credentials {
    fn unset() -> Self {
        Self {
            username: ConfigSetting::new_default(None),
            password: ConfigSetting::new_default(None),
            token: ConfigSetting::new_default(None),
            token_x: ConfigSetting::new_default(None),
            token_y: ConfigSetting::new_default(None),
        }
    }

    fn slots(&self) -> CredentialSlots<'_> {
        (
            self.username.as_deref(),
            self.password.as_deref(),
            self.token.as_deref(),
            self.token_x.as_deref(),
            self.token_y.as_deref(),
        )
    }

    fn resolve(&self, protocol: Protocol) -> Result<Option<AuthParams>> {
        if protocol.is_tcpx() {
            Self::for_tcp(self.slots())
        } else {
            Self::for_http(self.slots())
        }
    }

    /// TCP only knows ECDSA: a key id plus the private key and both public
    /// key coordinates.
    fn for_tcp(slots: CredentialSlots<'_>) -> Result<Option<AuthParams>> {
        let msg = match slots {
            (None, None, None, None, None) => return Ok(None),
            (Some(key_id), None, Some(priv_key), Some(x), Some(y)) => {
                return Ok(Some(AuthParams::Ecdsa(EcdsaAuthParams {
                    key_id: key_id.to_owned(),
                    priv_key: priv_key.to_owned(),
                    pub_key_x: x.to_owned(),
                    pub_key_y: y.to_owned(),
                })));
            }
            (Some(_), Some(_), None, None, None) => {
                r#"The "basic_auth" setting can only be used with the ILP/HTTP protocol."#
            }
            (None, None, Some(_), None, None) => {
                "Token authentication only be used with the ILP/HTTP protocol."
            }
            (_, None, _, _, _) => {
                r#"Incomplete ECDSA authentication parameters. Specify either all or none of: "username", "token", "token_x", "token_y"."#
            }
            _ => Self::INCOMPLETE,
        };
        Err(error::fmt!(ConfigError, "{msg}"))
    }

    /// HTTP takes either basic auth or a bearer token.
    fn for_http(slots: CredentialSlots<'_>) -> Result<Option<AuthParams>> {
        let msg = match slots {
            (None, None, None, None, None) => return Ok(None),
            (Some(username), Some(password), None, None, None) => {
                return Ok(Some(AuthParams::Basic(BasicAuthParams {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })));
            }
            (None, None, Some(token), None, None) => {
                return Ok(Some(AuthParams::Token(TokenAuthParams {
                    token: token.to_owned(),
                })));
            }
            (Some(_), None, None, None, None) => {
                r#"Basic authentication parameter "username" is present, but "password" is missing."#
            }
            (None, Some(_), None, None, None) => {
                r#"Basic authentication parameter "password" is present, but "username" is missing."#
            }
            (Some(_), None, Some(_), Some(_), Some(_)) => {
                "ECDSA authentication is only available with ILP/TCP and not available with ILP/HTTP."
            }
            (_, _, _, None, None) => {
                r#"Inconsistent HTTP authentication parameters. Specify either "username" and "password", or just "token"."#
            }
            _ => Self::INCOMPLETE,
        };
        Err(error::fmt!(ConfigError, "{msg}"))
    }

    const INCOMPLETE: &'static str = r#"Incomplete authentication parameters. Check "username", "password", "token", "token_x" and "token_y" parameters are set correctly."#;
}

#[derive(Debug, Clone)]
struct FlushSettings {
    enabled: ConfigSetting<bool>,
    rows: ConfigSetting<Option<usize>>,
    bytes: ConfigSetting<Option<usize>>,
    interval: ConfigSetting<Option<Duration>>,
}

impl FlushSettings {
    fn defaults(protocol: Protocol) -> Self {
        let rows = if protocol.is_httpx() {
            AutoFlush::DEFAULT_ROWS_HTTP
        } else {
            AutoFlush::DEFAULT_ROWS_TCP
        };
        Self {
            enabled: ConfigSetting::new_default(true),
            rows: ConfigSetting::new_default(Some(rows)),
            bytes: ConfigSetting::new_default(None),
            interval: ConfigSetting::new_default(Some(AutoFlush::DEFAULT_INTERVAL)),
        }
    }

    /// With auto-flush off, any explicitly enabled threshold is a conflict.
    fn resolve(&self) -> Result<AutoFlush> {
        if *self.enabled {
            return Ok(AutoFlush {
                enabled: true,
                rows: *self.rows,
                bytes: *self.bytes,
                interval: *self.interval,
            });
        }
        let conflict = [
            ("auto_flush_rows", self.rows.is_specified() && self.rows.is_some()),
            ("auto_flush_bytes", self.bytes.is_specified() && self.bytes.is_some()),
            (
                "auto_flush_interval",
                self.interval.is_specified() && self.interval.is_some(),
            ),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name));
        match conflict {
            Some(name) => Err(error::fmt!(
                ConfigError,
                "Cannot set {name:?} when \"auto_flush\" is \"off\"."
            )),
            None => Ok(AutoFlush::off()),
        }
    }
}

#[derive(Debug, Clone)]
struct TlsChoice {
    verify: ConfigSetting<bool>,
    ca: ConfigSetting<CertificateAuthority>,
    roots: ConfigSetting<Option<PathBuf>>,
}

impl TlsChoice {
    fn defaults() -> Self {
        #[cfg(feature = "tls-webpki-certs")]
        let ca = CertificateAuthority::WebpkiRoots;

        #[cfg(all(not(feature = "tls-webpki-certs"), feature = "tls-native-certs"))]
        let ca = CertificateAuthority::OsRoots;

        #[cfg(not(any(feature = "tls-webpki-certs", feature = "tls-native-certs")))]
        let ca = CertificateAuthority::PemFile;

        Self {
            verify: ConfigSetting::new_default(true),
            ca: ConfigSetting::new_default(ca),
            roots: ConfigSetting::new_default(None),
        }
    }
}

/// Accumulates parameters for a new [`Sender`] instance.
///
/// Create it with [`SenderBuilder::new`], from a config string with
/// [`SenderBuilder::from_conf`], or from the `QDB_CLIENT_CONF` environment
/// variable with [`SenderBuilder::from_env`]. Settings may be split between
/// the config string and method calls; setting the same key twice is only an
/// error if the two values differ.
///
/// ```no_run
/// # fn main() -> questdb::Result<()> {
/// use questdb::ingress::SenderBuilder;
///
/// let mut sender = SenderBuilder::from_conf("https::addr=localhost:9000;")?
///     .auto_flush_rows(Some(1000))?
///     .build()?;
/// sender.establish()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SenderBuilder {
    protocol: Protocol,
    host: String,
    port: String,
    bind_interface: ConfigSetting<Option<String>>,
    auth_timeout: ConfigSetting<Duration>,
    credentials: Credentials,
    max_buf_size: ConfigSetting<usize>,
    init_buf_size: ConfigSetting<usize>,
    max_name_len: ConfigSetting<usize>,
    protocol_version: ConfigSetting<Option<ProtocolVersion>>,
    flush: FlushSettings,
    tls: TlsChoice,
    http: Option<HttpConfig>,
}

impl SenderBuilder {
    /// A builder for `host:port` over `protocol`, with every other setting
    /// at its default.
    pub fn new<H: Into<String>, P: Into<Port>>(protocol: Protocol, host: H, port: P) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: port.into().0,
            bind_interface: ConfigSetting::new_default(None),
            auth_timeout: ConfigSetting::new_default(Duration::from_secs(15)),
            credentials: Credentials::unset(),
            max_buf_size: ConfigSetting::new_default(DEFAULT_MAX_BUF_SIZE),
            init_buf_size: ConfigSetting::new_default(DEFAULT_INIT_BUF_SIZE),
            max_name_len: ConfigSetting::new_default(MAX_NAME_LEN_DEFAULT),
            protocol_version: ConfigSetting::new_default(None),
            flush: FlushSettings::defaults(protocol),
            tls: TlsChoice::defaults(),
            http: protocol.is_httpx().then(HttpConfig::default),
        }
    }

    /// Parse a config string of the form `"http::addr=host:port;key=value;"`.
    /// The schema is one of `http`, `https`, `tcp` or `tcps`.
    ///
    /// Every key except `addr` maps to the builder method of the same name.
    /// `addr` is required; unknown keys are an error.
    pub fn from_conf<T: AsRef<str>>(conf: T) -> Result<Self> {
        let conf = questdb_confstr::parse_conf_str(conf.as_ref())
            .map_err(|e| error::fmt!(ConfigError, "Config parse error: {}", e))?;
        let protocol = Protocol::from_schema(conf.service())?;
        let params = conf.params();
        let addr = params.get("addr").ok_or_else(|| {
            error::fmt!(ConfigError, "Missing \"addr\" parameter in config string")
        })?;
        let (host, port) = addr
            .split_once(':')
            .unwrap_or((addr.as_str(), protocol.default_port()));

        params
            .iter()
            .filter(|(key, _)| key.as_str() != "addr")
            .try_fold(SenderBuilder::new(protocol, host, port), |builder, (key, raw)| {
                builder.apply(ConfValue {
                    key: key.as_str(),
                    raw: raw.as_str(),
                })
            })
    }

    /// Same as [`from_conf`](SenderBuilder::from_conf), reading the
    /// `QDB_CLIENT_CONF` environment variable.
    pub fn from_env() -> Result<Self> {
        let conf = std::env::var("QDB_CLIENT_CONF").map_err(|_| {
            error::fmt!(ConfigError, "Environment variable QDB_CLIENT_CONF not set.")
        })?;
        Self::from_conf(conf)
    }

    fn apply(self, v: ConfValue<'_>) -> Result<Self> {
        match v.key {
            "username" => self.username(v.raw),
            "password" => self.password(v.raw),
            "token" => self.token(v.raw),
            "token_x" => self.token_x(v.raw),
            "token_y" => self.token_y(v.raw),
            "bind_interface" => self.bind_interface(v.raw),
            "protocol_version" => self.protocol_version(ProtocolVersion::parse_setting(v.raw)?),
            "max_name_len" => self.max_name_len(v.number()?),
            "init_buf_size" => self.init_buf_size(v.number()?),
            "max_buf_size" => self.max_buf_size(v.number()?),
            "auth_timeout" => self.auth_timeout(v.millis()?),
            "auto_flush" => self.auto_flush(v.switch()?),
            "auto_flush_rows" => self.auto_flush_rows(v.threshold()?),
            "auto_flush_bytes" => self.auto_flush_bytes(v.threshold()?),
            "auto_flush_interval" => {
                self.auto_flush_interval(v.threshold::<u64>()?.map(Duration::from_millis))
            }
            "tls_verify" => self.tls_verify_conf(v.raw),
            "tls_ca" => self.tls_ca(v.tls_ca()?),
            "tls_roots" => self.tls_roots(PathBuf::from(v.raw)),
            "tls_roots_password" => Err(error::fmt!(
                ConfigError,
                "\"tls_roots_password\" is not supported."
            )),
            "request_min_throughput" => self.request_min_throughput(v.number()?),
            "request_timeout" => self.request_timeout(v.millis()?),
            "retry_timeout" => self.retry_timeout(v.millis()?),
            unknown => Err(error::fmt!(
                ConfigError,
                "Unknown configuration parameter {unknown:?}"
            )),
        }
    }

    fn require_tcp(&self, key: &str) -> Result<()> {
        if !self.protocol.is_tcpx() {
            return Err(error::fmt!(
                ConfigError,
                "The {key:?} setting can only be used with the TCP protocol."
            ));
        }
        Ok(())
    }

    fn require_tls(&self, key: &str) -> Result<()> {
        if !self.protocol.tls_enabled() {
            return Err(error::fmt!(
                ConfigError,
                "Cannot set {key:?}: TLS is not supported for protocol {}",
                self.protocol
            ));
        }
        Ok(())
    }

    fn http_mut(&mut self, key: &str) -> Result<&mut HttpConfig> {
        self.http.as_mut().ok_or_else(|| {
            error::fmt!(ConfigError, "{key:?} is supported only in ILP over HTTP.")
        })
    }

    /// Local address to bind the outgoing TCP socket to. TCP only.
    pub fn bind_interface<I: Into<String>>(mut self, addr: I) -> Result<Self> {
        self.require_tcp("bind_interface")?;
        let addr: String = addr.into();
        let addr = no_control_chars(&addr)?;
        self.bind_interface
            .set_specified("bind_interface", Some(addr))?;
        Ok(self)
    }

    /// HTTP basic auth user name, or the ECDSA key id over TCP.
    pub fn username(mut self, username: &str) -> Result<Self> {
        let value = no_control_chars(username)?;
        self.credentials
            .username
            .set_specified("username", Some(value))?;
        Ok(self)
    }

    /// HTTP basic auth password.
    pub fn password(mut self, password: &str) -> Result<Self> {
        let value = no_control_chars(password)?;
        self.credentials
            .password
            .set_specified("password", Some(value))?;
        Ok(self)
    }

    /// HTTP bearer token, or the ECDSA private key (`d`) over TCP.
    pub fn token(mut self, token: &str) -> Result<Self> {
        let value = no_control_chars(token)?;
        self.credentials.token.set_specified("token", Some(value))?;
        Ok(self)
    }

    /// ECDSA public key `x` coordinate. TCP only.
    pub fn token_x(mut self, token_x: &str) -> Result<Self> {
        let value = no_control_chars(token_x)?;
        self.credentials
            .token_x
            .set_specified("token_x", Some(value))?;
        Ok(self)
    }

    /// ECDSA public key `y` coordinate. TCP only.
    pub fn token_y(mut self, token_y: &str) -> Result<Self> {
        let value = no_control_chars(token_y)?;
        self.credentials
            .token_y
            .set_specified("token_y", Some(value))?;
        Ok(self)
    }

    /// Set the line protocol version. Pass `None` for "auto".
    ///
    /// Over HTTP, "auto" asks the server's `/settings` endpoint on
    /// [`establish`](Sender::establish). Over TCP, "auto" means
    /// [`ProtocolVersion::V1`].
    pub fn protocol_version<V: Into<Option<ProtocolVersion>>>(mut self, version: V) -> Result<Self> {
        self.protocol_version
            .set_specified("protocol_version", version.into())?;
        Ok(self)
    }

    /// Read timeout for the TCP TLS handshake and authentication.
    /// 15 seconds by default.
    pub fn auth_timeout(mut self, value: Duration) -> Result<Self> {
        self.auth_timeout.set_specified("auth_timeout", value)?;
        Ok(self)
    }

    fn tls_verify_conf(self, raw: &str) -> Result<Self> {
        let verify = match raw {
            "on" => true,
            "unsafe_off" => false,
            _ => {
                return Err(error::fmt!(
                    ConfigError,
                    r#"Config parameter "tls_verify" must be either "on" or "unsafe_off"."#,
                ))
            }
        };
        if !verify && cfg!(not(feature = "insecure-skip-verify")) {
            return Err(error::fmt!(
                ConfigError,
                r#"The "insecure-skip-verify" feature is not enabled, so "tls_verify=unsafe_off" is not supported"#,
            ));
        }
        self.set_tls_verify(verify)
    }

    fn set_tls_verify(mut self, verify: bool) -> Result<Self> {
        self.require_tls("tls_verify")?;
        self.tls.verify.set_specified("tls_verify", verify)?;
        Ok(self)
    }

    /// Pass `false` to skip server certificate verification. For debugging
    /// only.
    #[cfg(feature = "insecure-skip-verify")]
    pub fn tls_verify(self, verify: bool) -> Result<Self> {
        self.set_tls_verify(verify)
    }

    /// Where the root certificates that validate the server come from.
    pub fn tls_ca(mut self, ca: CertificateAuthority) -> Result<Self> {
        self.require_tls("tls_ca")?;
        self.tls.ca.set_specified("tls_ca", ca)?;
        Ok(self)
    }

    /// Trust the certificates in this PEM file. Implies
    /// [`CertificateAuthority::PemFile`].
    pub fn tls_roots<P: Into<PathBuf>>(self, path: P) -> Result<Self> {
        let mut builder = self.tls_ca(CertificateAuthority::PemFile)?;
        let path = path.into();
        if let Err(io_err) = std::fs::File::open(&path) {
            return Err(error::fmt!(
                ConfigError,
                "Could not open root certificate file from path {:?}: {}",
                path,
                io_err
            ));
        }
        builder.tls.roots.set_specified("tls_roots", Some(path))?;
        Ok(builder)
    }

    /// Largest buffer a flush may send, at least 1 KiB. 100 MiB by default.
    pub fn max_buf_size(mut self, value: usize) -> Result<Self> {
        if value < MIN_MAX_BUF_SIZE {
            return Err(error::fmt!(
                ConfigError,
                "\"max_buf_size\" must be at least {MIN_MAX_BUF_SIZE} bytes."
            ));
        }
        self.max_buf_size.set_specified("max_buf_size", value)?;
        Ok(self)
    }

    /// Initial buffer capacity. 64 KiB by default.
    pub fn init_buf_size(mut self, value: usize) -> Result<Self> {
        self.init_buf_size.set_specified("init_buf_size", value)?;
        Ok(self)
    }

    /// Longest table or column name, in bytes. Matches the server's
    /// `cairo.max.file.name.length`; 127 by default. Unless set here, an
    /// HTTP sender that negotiates its protocol version takes the server's
    /// value.
    pub fn max_name_len(mut self, value: usize) -> Result<Self> {
        if value < MIN_MAX_NAME_LEN {
            return Err(error::fmt!(
                ConfigError,
                "max_name_len must be at least {MIN_MAX_NAME_LEN} bytes."
            ));
        }
        self.max_name_len.set_specified("max_name_len", value)?;
        Ok(self)
    }

    /// Switch auto-flushing on or off. On by default.
    pub fn auto_flush(mut self, enabled: bool) -> Result<Self> {
        self.flush.enabled.set_specified("auto_flush", enabled)?;
        Ok(self)
    }

    /// Row threshold, `None` to disable. 600 for TCP, 75000 for HTTP.
    pub fn auto_flush_rows(mut self, rows: Option<usize>) -> Result<Self> {
        let rows = greater_than_zero("auto_flush_rows", rows)?;
        self.flush.rows.set_specified("auto_flush_rows", rows)?;
        Ok(self)
    }

    /// Byte threshold, `None` to disable. Off by default.
    pub fn auto_flush_bytes(mut self, bytes: Option<usize>) -> Result<Self> {
        let bytes = greater_than_zero("auto_flush_bytes", bytes)?;
        self.flush.bytes.set_specified("auto_flush_bytes", bytes)?;
        Ok(self)
    }

    /// Time since the last flush, checked on each append. One second by
    /// default.
    pub fn auto_flush_interval(mut self, interval: Option<Duration>) -> Result<Self> {
        self.flush
            .interval
            .set_specified("auto_flush_interval", interval)?;
        Ok(self)
    }

    /// Total time spent retrying a failed request. 10 seconds by default.
    /// HTTP only.
    pub fn retry_timeout(mut self, value: Duration) -> Result<Self> {
        self.http_mut("retry_timeout")?
            .retry_timeout
            .set_specified("retry_timeout", value)?;
        Ok(self)
    }

    /// Bytes per second the server is expected to sustain; the request
    /// timeout grows by payload size over this rate. 100 KiB/s by default,
    /// 0 to disable. HTTP only.
    pub fn request_min_throughput(mut self, value: u64) -> Result<Self> {
        self.http_mut("request_min_throughput")?
            .request_min_throughput
            .set_specified("request_min_throughput", value)?;
        Ok(self)
    }

    /// Base per-request timeout. 10 seconds by default. HTTP only.
    pub fn request_timeout(mut self, value: Duration) -> Result<Self> {
        let http = self.http_mut("request_timeout")?;
        if value.is_zero() {
            return Err(error::fmt!(
                ConfigError,
                "\"request_timeout\" must be greater than 0."
            ));
        }
        http.request_timeout
            .set_specified("request_timeout", value)?;
        Ok(self)
    }

    fn resolve_protocol_version(&self) -> Option<ProtocolVersion> {
        match *self.protocol_version {
            None if self.protocol.is_tcpx() => Some(ProtocolVersion::V1),
            version => version,
        }
    }

    fn describe(&self, auth: bool) -> String {
        format!(
            "Sender[protocol={},host={:?},port={:?},tls={},auth={}]",
            self.protocol,
            self.host,
            self.port,
            if self.protocol.tls_enabled() { "enabled" } else { "disabled" },
            if auth { "on" } else { "off" },
        )
    }

    /// Validate the settings and create an unconnected [`Sender`].
    ///
    /// Call [`Sender::establish`] to connect (and, over HTTP, negotiate the
    /// protocol version), or use [`Sender::from_conf`] which does both.
    pub fn build(&self) -> Result<Sender> {
        let auth = self.credentials.resolve(self.protocol)?;
        let auto_flush = self.flush.resolve()?;
        let tls = TlsSettings::build(
            self.protocol.tls_enabled(),
            *self.tls.verify,
            *self.tls.ca,
            self.tls.roots.as_deref(),
        )?;
        let http = self
            .http
            .as_ref()
            .map(|config| {
                let base_url = format!("{}://{}:{}", self.protocol.schema(), self.host, self.port);
                HttpParams::new(base_url, config, auth.as_ref(), tls.as_ref())
            })
            .transpose()?;

        Ok(Sender::new(SenderParams {
            descr: self.describe(auth.is_some()),
            connect: ConnectParams {
                host: self.host.clone(),
                port: self.port.clone(),
                net_interface: self.bind_interface.as_ref().cloned(),
                auth_timeout: *self.auth_timeout,
                tls,
                auth,
                http,
            },
            max_buf_size: *self.max_buf_size,
            init_buf_size: *self.init_buf_size,
            max_name_len: *self.max_name_len,
            max_name_len_specified: self.max_name_len.is_specified(),
            protocol_version: self.resolve_protocol_version(),
            auto_flush,
        }))
    }
}
