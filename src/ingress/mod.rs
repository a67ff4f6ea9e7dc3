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

//! # Fast Ingestion of Data into QuestDB
//!
//! The `ingress` module implements QuestDB's variant of the
//! [InfluxDB Line Protocol](https://questdb.io/docs/reference/api/ilp/overview/)
//! (ILP) over TCP and HTTP.
//!
//! * Build a [`Sender`] from a config string, e.g.
//!   `http::addr=localhost:9000;` or `tcp::addr=localhost:9009;`, or via
//!   [`SenderBuilder`].
//! * Append rows with [`Sender::row`]. The sender flushes automatically once
//!   its row, byte or time threshold is reached, or explicitly via
//!   [`Sender::flush`].
//! * Over HTTP, group rows for one table into a single request with
//!   [`Sender::transaction`].
//! * For full control, prepare a standalone [`Buffer`] and send it with
//!   [`Sender::flush_buffer`].
//!
//! ## Protocol versions
//!
//! [`ProtocolVersion::V1`] is text-only. [`ProtocolVersion::V2`] sends
//! doubles in binary form and supports N-dimensional arrays. Over HTTP the
//! version is negotiated with the server by default; over TCP it defaults to
//! V1.

pub use self::buffer::*;
pub use self::builder::SenderBuilder;
pub use self::conf::AutoFlush;
pub use self::dataframe::*;
pub use self::names::*;
pub use self::ndarr::{ElemDataType, NdArrayF64, NdArrayView};
pub use self::sender::*;
pub use self::text::*;
pub use self::timestamp::*;
pub use self::value::*;

use crate::error::{self, Result};
use std::fmt::{Display, Formatter};

mod buffer;
mod builder;
mod conf;
mod dataframe;
mod names;
pub(crate) mod ndarr;
mod sender;
mod text;
mod timestamp;
mod tls;
mod value;

pub(crate) const MAX_NAME_LEN_DEFAULT: usize = 127;
pub(crate) const DEFAULT_INIT_BUF_SIZE: usize = 64 * 1024;

/// The maximum allowed dimensions for arrays.
pub const MAX_ARRAY_DIMS: usize = 32;
pub const MAX_ARRAY_BUFFER_SIZE: usize = 512 * 1024 * 1024; // 512MiB
pub const MAX_ARRAY_DIM_LEN: usize = 0x0FFF_FFFF; // 1 << 28 - 1

pub(crate) const ARRAY_BINARY_FORMAT_TYPE: u8 = 14;
pub(crate) const DOUBLE_BINARY_FORMAT_TYPE: u8 = 16;

/// The version of InfluxDB Line Protocol used to communicate with the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Full-text protocol, compatible with InfluxDB.
    V1 = 1,

    /// Binary `f64` serialization and the array data type.
    /// Requires QuestDB 8.4.0 or later.
    V2 = 2,
}

impl ProtocolVersion {
    /// Parse the `protocol_version` setting: `"1"`, `"2"` or `"auto"`.
    /// `"auto"` yields `None`.
    pub fn parse_setting(value: &str) -> Result<Option<Self>> {
        match value {
            "1" => Ok(Some(ProtocolVersion::V1)),
            "2" => Ok(Some(ProtocolVersion::V2)),
            "auto" => Ok(None),
            invalid => Err(error::fmt!(
                ConfigError,
                "invalid \"protocol_version\" [value={invalid}, allowed-values=[auto, 1, 2]]"
            )),
        }
    }

    pub(crate) fn from_server_number(number: u64) -> Option<Self> {
        match number {
            1 => Some(ProtocolVersion::V1),
            2 => Some(ProtocolVersion::V2),
            _ => None,
        }
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "v1"),
            ProtocolVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Possible sources of the root certificates used to validate the server's TLS
/// certificate.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CertificateAuthority {
    /// Use the root certificates provided by the
    /// [`webpki-roots`](https://crates.io/crates/webpki-roots) crate.
    #[cfg(feature = "tls-webpki-certs")]
    WebpkiRoots,

    /// Use the root certificates provided by the OS
    #[cfg(feature = "tls-native-certs")]
    OsRoots,

    /// Combine the root certificates provided by the OS and the `webpki-roots` crate.
    #[cfg(all(feature = "tls-webpki-certs", feature = "tls-native-certs"))]
    WebpkiAndOsRoots,

    /// Use the root certificates provided in a PEM-encoded file.
    PemFile,
}

/// Port to connect to: a number or a service name from `/etc/services`
/// (or the platform's equivalent).
///
/// ```
/// use questdb::ingress::Port;
///
/// let numeric: Port = 9009.into();
/// let named: Port = "qdb_ilp".into();
/// ```
pub struct Port(String);

impl From<String> for Port {
    fn from(name: String) -> Self {
        Port(name)
    }
}

impl From<&str> for Port {
    fn from(name: &str) -> Self {
        Port(name.to_owned())
    }
}

impl From<u16> for Port {
    fn from(number: u16) -> Self {
        Port(number.to_string())
    }
}

/// Transport between the sender and the server.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Protocol {
    /// Streaming ILP over a plain TCP socket.
    Tcp,

    /// [`Protocol::Tcp`] inside TLS.
    Tcps,

    /// One HTTP request per flush, with server acknowledgement.
    Http,

    /// [`Protocol::Http`] inside TLS.
    Https,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.schema())
    }
}

impl Protocol {
    const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Tcps, Protocol::Http, Protocol::Https];

    /// Config string schema, e.g. `https` in `https::addr=...;`.
    fn schema(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcps => "tcps",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    fn from_schema(schema: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.schema() == schema)
            .ok_or_else(|| error::fmt!(ConfigError, "Unsupported protocol: {schema}"))
    }

    fn default_port(self) -> &'static str {
        if self.is_httpx() {
            "9000"
        } else {
            "9009"
        }
    }

    fn tls_enabled(self) -> bool {
        matches!(self, Protocol::Tcps | Protocol::Https)
    }

    fn is_httpx(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }

    fn is_tcpx(self) -> bool {
        !self.is_httpx()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_round_trip() {
        for protocol in Protocol::ALL {
            assert_eq!(Protocol::from_schema(protocol.schema()).unwrap(), protocol);
        }
        assert_eq!(
            Protocol::from_schema("udp").unwrap_err().msg(),
            "Unsupported protocol: udp"
        );
    }

    #[test]
    fn protocol_version_setting() {
        assert_eq!(ProtocolVersion::parse_setting("auto").unwrap(), None);
        assert_eq!(ProtocolVersion::parse_setting("2").unwrap(), Some(ProtocolVersion::V2));
        assert_eq!(ProtocolVersion::from_server_number(3), None);
        assert_eq!(ProtocolVersion::V1.to_string(), "v1");
    }
}
