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

use std::convert::Infallible;
use std::fmt::{Display, Formatter};

/// `fmt!(Code, "...", args)` builds an [`Error`] with a formatted message.
macro_rules! fmt {
    ($code:ident, $($arg:tt)*) => {
        crate::error::Error::new(crate::error::ErrorCode::$code, format!($($arg)*))
    }
}

pub(crate) use fmt;

/// What went wrong, as returned by [`Error::code`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// Host, port or bind interface could not be resolved.
    CouldNotResolveAddr,

    /// Call out of sequence for the current row, buffer or sender state,
    /// such as `symbol` after `column` or `flush` inside a transaction.
    InvalidApiCall,

    /// Connecting, writing or reading over the network failed.
    SocketError,

    /// Text that can't be encoded as UTF-8, e.g. a lone surrogate.
    InvalidUtf8,

    /// Table or column name is empty, too long or has forbidden characters.
    InvalidName,

    /// Timestamp out of range for the requested unit.
    InvalidTimestamp,

    /// ECDSA key material or the challenge exchange was rejected.
    AuthError,

    /// TLS setup or handshake failed.
    TlsError,

    /// The endpoint doesn't accept ILP over HTTP.
    HttpNotSupported,

    /// The server refused a flushed batch.
    ServerFlushError,

    /// Invalid or conflicting sender settings.
    ConfigError,

    /// Array shape, strides or size are unsupported.
    ArrayError,

    /// Data that the negotiated line protocol version can't carry.
    ProtocolVersionError,

    /// Integer outside the signed 64-bit range.
    IntOverflow,
}

/// Error raised by the QuestDB client, a category plus a human-readable
/// message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Error {
    code: ErrorCode,
    msg: String,
}

impl Error {
    pub fn new<S: Into<String>>(code: ErrorCode, msg: S) -> Error {
        let msg = msg.into();
        Error { code, msg }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.msg())
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_message() {
        let err = fmt!(InvalidName, "Bad {} {:?}", "name", "a.b");
        assert_eq!(err.code(), ErrorCode::InvalidName);
        assert_eq!(err.to_string(), "Bad name \"a.b\"");
    }
}
