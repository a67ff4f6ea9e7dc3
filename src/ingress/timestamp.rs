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
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "chrono_timestamp")]
use chrono::{DateTime, TimeZone};

fn since_epoch(time: SystemTime) -> crate::Result<Duration> {
    // Fails for times before UNIX_EPOCH, which also guarantees that
    // the resulting number is >= 0.
    time.duration_since(UNIX_EPOCH).map_err(|e| {
        error::fmt!(
            InvalidTimestamp,
            "Could not calculate duration since UNIX_EPOCH for timestamp {:?}: {}",
            time,
            e
        )
    })
}

fn fit_i64(time: SystemTime, count: u128) -> crate::Result<i64> {
    i64::try_from(count).map_err(|_| {
        error::fmt!(
            InvalidTimestamp,
            "Timestamp {:?} is too large to fit in a 64-bit signed integer.",
            time
        )
    })
}

fn check_non_negative(value: i64) -> crate::Result<i64> {
    if value >= 0 {
        Ok(value)
    } else {
        Err(error::fmt!(
            InvalidTimestamp,
            "Timestamp {} is negative. It must be >= 0.",
            value
        ))
    }
}

/// Microseconds since 1970-01-01 00:00:00 UTC. Never negative.
///
/// ```
/// # fn main() -> questdb::Result<()> {
/// use questdb::ingress::TimestampMicros;
///
/// let ts = TimestampMicros::new(1659548204354448)?;
/// let now: TimestampMicros = std::time::SystemTime::now().try_into()?;
/// # Ok(())
/// # }
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMicros(i64);

impl TimestampMicros {
    pub fn new(micros: i64) -> crate::Result<Self> {
        check_non_negative(micros).map(Self)
    }

    /// The current wall clock time.
    pub fn now() -> Self {
        Self::from_systemtime(SystemTime::now()).unwrap_or(Self(0))
    }

    pub fn from_systemtime(time: SystemTime) -> crate::Result<Self> {
        let micros = since_epoch(time)?.as_micros();
        fit_i64(time, micros).map(Self)
    }

    #[cfg(feature = "chrono_timestamp")]
    pub fn from_datetime<T: TimeZone>(dt: DateTime<T>) -> crate::Result<Self> {
        Self::new(dt.timestamp_micros())
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl TryFrom<SystemTime> for TimestampMicros {
    type Error = crate::Error;

    fn try_from(time: SystemTime) -> crate::Result<Self> {
        Self::from_systemtime(time)
    }
}

impl From<TimestampMicros> for SystemTime {
    fn from(timestamp: TimestampMicros) -> Self {
        UNIX_EPOCH + Duration::from_micros(timestamp.0 as u64)
    }
}

/// Nanoseconds since 1970-01-01 00:00:00 UTC. Never negative.
///
/// This is the only unit accepted for a row's designated timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampNanos(i64);

impl TimestampNanos {
    pub fn new(nanos: i64) -> crate::Result<Self> {
        check_non_negative(nanos).map(Self)
    }

    /// The current wall clock time.
    pub fn now() -> Self {
        Self::from_systemtime(SystemTime::now()).unwrap_or(Self(0))
    }

    pub fn from_systemtime(time: SystemTime) -> crate::Result<Self> {
        let nanos = since_epoch(time)?.as_nanos();
        fit_i64(time, nanos).map(Self)
    }

    #[cfg(feature = "chrono_timestamp")]
    pub fn from_datetime<T: TimeZone>(dt: DateTime<T>) -> crate::Result<Self> {
        let nanos = dt.timestamp_nanos_opt().ok_or_else(|| {
            error::fmt!(
                InvalidTimestamp,
                "Timestamp {:?} is too large to fit in a 64-bit signed integer.",
                dt.timestamp()
            )
        })?;
        Self::new(nanos)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl TryFrom<SystemTime> for TimestampNanos {
    type Error = crate::Error;

    fn try_from(time: SystemTime) -> crate::Result<Self> {
        Self::from_systemtime(time)
    }
}

impl TryFrom<TimestampMicros> for TimestampNanos {
    type Error = crate::Error;

    fn try_from(ts: TimestampMicros) -> crate::Result<Self> {
        ts.0.checked_mul(1000).map(Self).ok_or_else(|| {
            error::fmt!(
                InvalidTimestamp,
                "Timestamp {}us is too large to be expressed in nanoseconds.",
                ts.0
            )
        })
    }
}

impl From<TimestampNanos> for TimestampMicros {
    fn from(ts: TimestampNanos) -> Self {
        Self(ts.0 / 1000)
    }
}

/// A timestamp column value in either unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timestamp {
    Micros(TimestampMicros),
    Nanos(TimestampNanos),
}

impl From<TimestampMicros> for Timestamp {
    fn from(ts: TimestampMicros) -> Self {
        Self::Micros(ts)
    }
}

impl From<TimestampNanos> for Timestamp {
    fn from(ts: TimestampNanos) -> Self {
        Self::Nanos(ts)
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = crate::Error;

    fn try_from(time: SystemTime) -> crate::Result<Self> {
        TimestampMicros::from_systemtime(time).map(Self::Micros)
    }
}

impl From<Timestamp> for TimestampMicros {
    fn from(ts: Timestamp) -> Self {
        match ts {
            Timestamp::Micros(ts) => ts,
            Timestamp::Nanos(ts) => ts.into(),
        }
    }
}

#[cfg(feature = "chrono_timestamp")]
impl<T: TimeZone> TryFrom<DateTime<T>> for Timestamp {
    type Error = crate::Error;

    fn try_from(dt: DateTime<T>) -> crate::Result<Self> {
        TimestampMicros::from_datetime(dt).map(Self::Micros)
    }
}

/// Requests that the server assigns the designated timestamp on receipt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerTimestamp;

/// The designated timestamp of a row.
///
/// Either an explicit nanosecond timestamp, or [`At::Server`] to omit the
/// timestamp from the line and let the server assign it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum At {
    Timestamp(TimestampNanos),
    Server,
}

impl From<TimestampNanos> for At {
    fn from(ts: TimestampNanos) -> Self {
        At::Timestamp(ts)
    }
}

impl From<ServerTimestamp> for At {
    fn from(_: ServerTimestamp) -> Self {
        At::Server
    }
}

impl TryFrom<TimestampMicros> for At {
    type Error = crate::Error;

    fn try_from(ts: TimestampMicros) -> crate::Result<Self> {
        TimestampNanos::try_from(ts).map(At::Timestamp)
    }
}

impl TryFrom<SystemTime> for At {
    type Error = crate::Error;

    fn try_from(time: SystemTime) -> crate::Result<Self> {
        TimestampNanos::from_systemtime(time).map(At::Timestamp)
    }
}

#[cfg(feature = "chrono_timestamp")]
impl<T: TimeZone> TryFrom<DateTime<T>> for At {
    type Error = crate::Error;

    fn try_from(dt: DateTime<T>) -> crate::Result<Self> {
        TimestampNanos::from_datetime(dt).map(At::Timestamp)
    }
}

impl TryFrom<Option<At>> for At {
    type Error = crate::Error;

    fn try_from(at: Option<At>) -> crate::Result<Self> {
        at.ok_or_else(|| {
            error::fmt!(
                InvalidApiCall,
                "The designated timestamp `at` must be of type TimestampNanos, \
                datetime, or ServerTimestamp, not None."
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_rejected() {
        let err = TimestampNanos::new(-1).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidTimestamp);
        assert_eq!(err.msg(), "Timestamp -1 is negative. It must be >= 0.");
        assert!(TimestampMicros::new(-5).is_err());
    }

    #[test]
    fn micros_to_nanos_overflow() {
        let ts = TimestampMicros::new(i64::MAX).unwrap();
        assert!(TimestampNanos::try_from(ts).is_err());
        let ts = TimestampMicros::new(12).unwrap();
        assert_eq!(TimestampNanos::try_from(ts).unwrap().as_i64(), 12000);
    }

    #[test]
    fn at_from_none() {
        let err = At::try_from(None::<At>).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidApiCall);
        assert!(err.msg().contains("not None"));
        assert_eq!(At::try_from(Some(At::Server)).unwrap(), At::Server);
    }

    #[test]
    fn systemtime_roundtrip() {
        let time = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        let micros = TimestampMicros::try_from(time).unwrap();
        assert_eq!(micros.as_i64(), 1_700_000_000_123_456);
        assert_eq!(SystemTime::from(micros), time);
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert!(TimestampNanos::try_from(before).is_err());
    }

    #[cfg(feature = "chrono_timestamp")]
    #[test]
    fn from_chrono() {
        let dt = chrono::Utc.timestamp_opt(1, 2000).unwrap();
        assert_eq!(TimestampNanos::from_datetime(dt).unwrap().as_i64(), 1_000_002_000);
        assert_eq!(TimestampMicros::from_datetime(dt).unwrap().as_i64(), 1_000_002);
    }
}
