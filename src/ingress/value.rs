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
use crate::ingress::{NdArrayView, Text, TimestampMicros, TimestampNanos};
use std::fmt::{Debug, Formatter};
use std::time::SystemTime;

/// A single column value for [`Buffer::row`](crate::ingress::Buffer::row).
///
/// Adapters map their native types onto these variants; the integer,
/// string and time conversions below perform the range and encoding checks.
/// Pass `None` in place of a `ColumnValue` to skip a column (insert NULL).
#[derive(Clone, Copy)]
pub enum ColumnValue<'a> {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(Text<'a>),
    TimestampMicros(TimestampMicros),
    TimestampNanos(TimestampNanos),
    F64Array(&'a dyn NdArrayView),
}

impl Debug for ColumnValue<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Self::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Self::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Self::TimestampMicros(v) => f.debug_tuple("TimestampMicros").field(v).finish(),
            Self::TimestampNanos(v) => f.debug_tuple("TimestampNanos").field(v).finish(),
            Self::F64Array(v) => {
                let shape: Vec<Option<usize>> = (0..v.ndim()).map(|i| v.dim(i)).collect();
                f.debug_struct("F64Array").field("shape", &shape).finish()
            }
        }
    }
}

macro_rules! from_lossless_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ColumnValue<'_> {
                fn from(v: $t) -> Self {
                    ColumnValue::I64(v.into())
                }
            }
        )*
    };
}

from_lossless_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! try_from_wide_int {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for ColumnValue<'_> {
                type Error = crate::Error;

                fn try_from(v: $t) -> crate::Result<Self> {
                    i64::try_from(v).map(ColumnValue::I64).map_err(|_| {
                        error::fmt!(
                            IntOverflow,
                            "int value {} is out of range for a 64-bit signed integer \
                            (must be between {} and {})",
                            v,
                            i64::MIN,
                            i64::MAX
                        )
                    })
                }
            }
        )*
    };
}

try_from_wide_int!(u64, i128, u128, usize, isize);

impl From<bool> for ColumnValue<'_> {
    fn from(v: bool) -> Self {
        ColumnValue::Bool(v)
    }
}

impl From<f64> for ColumnValue<'_> {
    fn from(v: f64) -> Self {
        ColumnValue::F64(v)
    }
}

impl From<f32> for ColumnValue<'_> {
    fn from(v: f32) -> Self {
        ColumnValue::F64(v.into())
    }
}

impl<'a> From<&'a str> for ColumnValue<'a> {
    fn from(v: &'a str) -> Self {
        ColumnValue::Str(Text::Utf8(v))
    }
}

impl<'a> From<&'a String> for ColumnValue<'a> {
    fn from(v: &'a String) -> Self {
        ColumnValue::Str(Text::Utf8(v.as_str()))
    }
}

impl<'a> From<Text<'a>> for ColumnValue<'a> {
    fn from(v: Text<'a>) -> Self {
        ColumnValue::Str(v)
    }
}

impl From<TimestampMicros> for ColumnValue<'_> {
    fn from(v: TimestampMicros) -> Self {
        ColumnValue::TimestampMicros(v)
    }
}

impl From<TimestampNanos> for ColumnValue<'_> {
    fn from(v: TimestampNanos) -> Self {
        ColumnValue::TimestampNanos(v)
    }
}

/// Datetimes are stored as microsecond timestamps.
impl TryFrom<SystemTime> for ColumnValue<'_> {
    type Error = crate::Error;

    fn try_from(v: SystemTime) -> crate::Result<Self> {
        TimestampMicros::from_systemtime(v).map(ColumnValue::TimestampMicros)
    }
}

#[cfg(feature = "chrono_timestamp")]
impl<T: chrono::TimeZone> TryFrom<chrono::DateTime<T>> for ColumnValue<'_> {
    type Error = crate::Error;

    fn try_from(v: chrono::DateTime<T>) -> crate::Result<Self> {
        TimestampMicros::from_datetime(v).map(ColumnValue::TimestampMicros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn int_bounds() {
        assert!(matches!(
            ColumnValue::try_from(i64::MAX as u64),
            Ok(ColumnValue::I64(i64::MAX))
        ));
        assert!(matches!(
            ColumnValue::try_from(i64::MIN as i128),
            Ok(ColumnValue::I64(i64::MIN))
        ));

        let err = ColumnValue::try_from(1u64 << 63).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IntOverflow);
        assert!(err.msg().contains("9223372036854775808"));

        let err = ColumnValue::try_from(i64::MIN as i128 - 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IntOverflow);
    }

    #[test]
    fn array_from_ref() {
        let arr = vec![1.0f64, 2.0];
        let value = ColumnValue::F64Array(&arr);
        assert!(format!("{value:?}").contains("F64Array"));
    }
}
