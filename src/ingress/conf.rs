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

use crate::error;
use std::fmt::Debug;
use std::ops::Deref;
use std::time::Duration;

/// Wraps a `SenderBuilder` setting to track whether the value was
/// user-specified or defaulted.
///
/// A specified value can only be specified again with the same value, so the
/// order in which the config string and API calls are applied does not
/// change the outcome.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConfigSetting<T> {
    Defaulted(T),
    Specified(T),
}

impl<T: PartialEq + Debug> ConfigSetting<T> {
    pub(crate) fn new_default(value: T) -> Self {
        ConfigSetting::Defaulted(value)
    }

    pub(crate) fn set_specified(&mut self, setting_name: &str, value: T) -> crate::Result<()> {
        match self {
            ConfigSetting::Specified(current) if *current != value => Err(error::fmt!(
                ConfigError,
                "{setting_name:?} is already specified"
            )),
            _ => {
                *self = ConfigSetting::Specified(value);
                Ok(())
            }
        }
    }

    pub(crate) fn is_specified(&self) -> bool {
        matches!(self, ConfigSetting::Specified(_))
    }
}

impl<T> Deref for ConfigSetting<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            ConfigSetting::Defaulted(v) => v,
            ConfigSetting::Specified(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EcdsaAuthParams {
    pub(crate) key_id: String,
    pub(crate) priv_key: String,
    pub(crate) pub_key_x: String,
    pub(crate) pub_key_y: String,
}

#[derive(Debug, Clone)]
pub(crate) struct BasicAuthParams {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl BasicAuthParams {
    pub(crate) fn to_header_string(&self) -> String {
        use base64ct::{Base64, Encoding};
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", Base64::encode_string(pair.as_bytes()))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TokenAuthParams {
    pub(crate) token: String,
}

impl TokenAuthParams {
    pub(crate) fn to_header_string(&self) -> crate::Result<String> {
        if self.token.contains('\n') {
            return Err(error::fmt!(
                AuthError,
                "Bad auth token: Should not contain new-line char."
            ));
        }
        Ok(format!("Bearer {}", self.token))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AuthParams {
    Ecdsa(EcdsaAuthParams),
    Basic(BasicAuthParams),
    Token(TokenAuthParams),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HttpConfig {
    pub(crate) request_min_throughput: ConfigSetting<u64>,
    pub(crate) request_timeout: ConfigSetting<Duration>,
    pub(crate) retry_timeout: ConfigSetting<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_min_throughput: ConfigSetting::new_default(102400), // 100 KiB/s
            request_timeout: ConfigSetting::new_default(Duration::from_secs(10)),
            retry_timeout: ConfigSetting::new_default(Duration::from_secs(10)),
        }
    }
}

/// Resolved auto-flush thresholds of a [`Sender`](crate::ingress::Sender).
///
/// A flush is triggered after appending a row once any enabled threshold is
/// met or exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFlush {
    pub enabled: bool,
    pub rows: Option<usize>,
    pub bytes: Option<usize>,
    pub interval: Option<Duration>,
}

impl AutoFlush {
    pub const DEFAULT_ROWS_TCP: usize = 600;
    pub const DEFAULT_ROWS_HTTP: usize = 75000;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

    /// Auto-flushing switched off entirely.
    pub fn off() -> Self {
        Self {
            enabled: false,
            rows: None,
            bytes: None,
            interval: None,
        }
    }

    pub(crate) fn is_due(&self, row_count: usize, byte_count: usize, since_last: Duration) -> bool {
        if !self.enabled || row_count == 0 {
            return false;
        }
        self.rows.is_some_and(|rows| row_count >= rows)
            || self.bytes.is_some_and(|bytes| byte_count >= bytes)
            || self.interval.is_some_and(|interval| since_last >= interval)
    }
}
