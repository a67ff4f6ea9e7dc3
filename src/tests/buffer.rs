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

use crate::ingress::{
    At, Buffer, ColumnName, ColumnValue, ProtocolVersion, RowSink, RowSource,
    ServerTimestamp, TableName, Text, TimestampMicros, TimestampNanos,
};
use crate::tests::{assert_err_contains, f64_binary, TestResult};
use crate::ErrorCode;
use rstest::rstest;

fn f2s(n: f64) -> String {
    let mut out = Vec::new();
    crate::ingress::push_f64_text(&mut out, n);
    String::from_utf8(out).unwrap()
}

#[rstest]
#[case(0.0, "0.0")]
#[case(-0.0, "-0.0")]
#[case(1.0, "1.0")]
#[case(-1.0, "-1.0")]
#[case(10.0, "10.0")]
#[case(0.1, "0.1")]
#[case(0.01, "0.01")]
#[case(0.000001, "1e-6")]
#[case(-0.000001, "-1e-6")]
#[case(1234.5678, "1234.5678")]
#[case(1.2345678901234567, "1.2345678901234567")]
#[case(1000000000000000000000000.0, "1e24")]
#[case(-1000000000000000000000000.0, "-1e24")]
#[case(f64::NAN, "NaN")]
#[case(f64::INFINITY, "Infinity")]
#[case(f64::NEG_INFINITY, "-Infinity")]
fn f64_text_form(#[case] value: f64, #[case] expected: &str) {
    assert_eq!(f2s(value), expected);
}

#[test]
fn basic_line() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer
        .table("test")?
        .symbol("t1", "v1")?
        .symbol("t2", "v2")?
        .column_bool("b", true)?
        .column_i64("i", -5)?
        .column_f64("f", 0.5)?
        .column_str("s", "hi")?
        .at(TimestampNanos::new(10)?)?;
    let exp = b"test,t1=v1,t2=v2 b=t,i=-5i,f=0.5,s=\"hi\" 10\n";
    assert_eq!(buffer.as_bytes(), exp);
    assert_eq!(buffer.len(), exp.len());
    assert_eq!(buffer.row_count(), 1);
    assert!(buffer.transactional());
    buffer.check_can_flush()?;
    Ok(())
}

#[test]
fn columns_without_symbols() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer
        .table("tbl")?
        .column_bool("a", false)?
        .column_i64("b", i64::MIN)?
        .at_now()?;
    assert_eq!(buffer.as_bytes(), b"tbl a=f,b=-9223372036854775808i\n");
    Ok(())
}

#[test]
fn escaping() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer
        .table("my table")?
        .symbol("sym col", "a,b=c d\\e")?
        .column_str("s", "say \"hi\"\nback\\slash\r")?
        .at_now()?;
    assert_eq!(
        buffer.as_bytes(),
        b"my\\ table,sym\\ col=a\\,b\\=c\\ d\\\\e s=\"say \\\"hi\\\"\\\nback\\\\slash\\\r\"\n"
    );
    Ok(())
}

#[test]
fn call_order_enforced() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    assert_err_contains(
        buffer.column_i64("x", 1).map(|_| ()),
        ErrorCode::InvalidApiCall,
        "State error: Bad call to `column`, should have called `table` instead.",
    );
    buffer.table("t")?;
    assert_err_contains(
        buffer.at_now(),
        ErrorCode::InvalidApiCall,
        "State error: Bad call to `at`, should have called `symbol` or `column` instead.",
    );
    buffer.column_i64("x", 1)?;
    assert_err_contains(
        buffer.symbol("s", "v").map(|_| ()),
        ErrorCode::InvalidApiCall,
        "State error: Bad call to `symbol`, should have called `column` or `at` instead.",
    );
    assert_err_contains(
        buffer.check_can_flush(),
        ErrorCode::InvalidApiCall,
        "State error: Bad call to `flush`, should have called `column` or `at` instead.",
    );
    buffer.at_now()?;
    assert_err_contains(
        buffer.column_i64("x", 1).map(|_| ()),
        ErrorCode::InvalidApiCall,
        "should have called `flush` or `table` instead",
    );
    Ok(())
}

#[test]
fn name_validation() {
    let err = TableName::new("a.b").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidName);
    assert_eq!(
        err.msg(),
        "Bad string \"a.b\": Found invalid dot `.` at position 1."
    );

    // Dots are rejected everywhere in a name, not just at the edges.
    assert!(TableName::new(".ab").is_err());
    assert!(TableName::new("ab.").is_err());
    assert!(ColumnName::new("x.y.z").is_err());

    // Columns report a dot like any other forbidden character.
    let err = ColumnName::new("sym.bol").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidName);
    assert_eq!(
        err.msg(),
        "Bad string \"sym.bol\": Column names can't contain a '.' character, \
        which was found at byte position 3."
    );

    assert_eq!(
        TableName::new("").unwrap_err().msg(),
        "Table names must have a non-zero length."
    );
    assert_eq!(
        ColumnName::new("").unwrap_err().msg(),
        "Column names must have a non-zero length."
    );

    // Dashes are fine for tables but not columns.
    assert!(TableName::new("a-b").is_ok());
    let err = ColumnName::new("a-b").unwrap_err();
    assert!(err.msg().contains("can't contain a '-' character"), "{}", err.msg());

    for bad in ["a?b", "a,b", "a'b", "a\"b", "a\\b", "a/b", "a:b", "a)b", "a(b", "a+b", "a*b", "a%b", "a~b", "a\nb", "a\u{7f}b"] {
        assert_eq!(
            TableName::new(bad).unwrap_err().code(),
            ErrorCode::InvalidName,
            "{bad:?}"
        );
    }

    let err = TableName::new("\u{feff}tbl").unwrap_err();
    assert!(err.msg().contains("UTF-8 BOM"));

    assert!(TableName::new("テーブル").is_ok());
}

#[test]
fn name_too_long() -> TestResult {
    let mut buffer = Buffer::with_max_name_len(ProtocolVersion::V1, 4);
    let err = buffer.table("a name too long").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidName);
    assert_eq!(
        err.msg(),
        r#"Bad name: "a name too long": Too long (max 4 characters)"#
    );

    buffer.table("tbl")?;
    for res in [
        buffer.symbol("sym_too_long", "v").map(|_| ()),
        buffer.column_bool("bool_too_long", true).map(|_| ()),
        buffer.column_i64("i64_too_long", 1).map(|_| ()),
        buffer.column_f64("f64_too_long", 1.0).map(|_| ()),
        buffer.column_str("str_too_long", "x").map(|_| ()),
    ] {
        assert_err_contains(res, ErrorCode::InvalidName, "Too long (max 4 characters)");
    }
    Ok(())
}

#[test]
fn row_skips_nulls() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.row(
        "tab1",
        &[("t1", Some("val1".into())), ("t2", None)],
        &[("f1", None), ("f2", Some(12345.into()))],
        TimestampNanos::new(111222233333)?,
    )?;
    assert_eq!(buffer.as_bytes(), b"tab1,t1=val1 f2=12345i 111222233333\n");
    Ok(())
}

#[test]
fn all_null_row_is_noop() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.row("tab1", &[("t1", None)], &[("f1", None)], ServerTimestamp)?;
    buffer.row("tab1", &[], &[], ServerTimestamp)?;
    assert!(buffer.is_empty());
    assert_eq!(buffer.row_count(), 0);
    Ok(())
}

#[test]
fn failed_row_leaves_no_trace() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.row("tbl", &[("s", Some("a".into()))], &[], ServerTimestamp)?;
    let before = buffer.as_bytes().to_vec();

    assert_err_contains(
        buffer.row(
            "tbl",
            &[("s", Some("b".into()))],
            &[("ok", Some(1.into())), ("bad.col", Some(2.into()))],
            ServerTimestamp,
        ),
        ErrorCode::InvalidName,
        "Column names can't contain a '.' character",
    );
    assert_eq!(buffer.as_bytes(), before.as_slice());
    assert_eq!(buffer.row_count(), 1);

    let bad_units = [0x61u16, 0xdc00];
    assert_err_contains(
        buffer.row(
            "tbl",
            &[("s", Some(Text::Ucs2(&bad_units)))],
            &[],
            ServerTimestamp,
        ),
        ErrorCode::InvalidUtf8,
        "Invalid codepoint 0xdc00",
    );
    assert_eq!(buffer.as_bytes(), before.as_slice());

    // The buffer is still usable for whole rows afterwards.
    buffer.row("tbl", &[("s", Some("c".into()))], &[], ServerTimestamp)?;
    assert_eq!(buffer.as_bytes(), b"tbl,s=a\ntbl,s=c\n");
    assert_eq!(buffer.row_count(), 2);
    Ok(())
}

#[test]
fn int_out_of_range() {
    let err = ColumnValue::try_from(u64::MAX).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IntOverflow);
    assert_eq!(
        err.msg(),
        "int value 18446744073709551615 is out of range for a 64-bit signed integer \
        (must be between -9223372036854775808 and 9223372036854775807)"
    );
}

#[test]
fn designated_timestamp_required() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    assert_err_contains(
        buffer.row("tbl", &[], &[("c", Some(1.into()))], None::<At>),
        ErrorCode::InvalidApiCall,
        "The designated timestamp `at` must be of type TimestampNanos",
    );
    assert!(buffer.is_empty());
    buffer.row("tbl", &[], &[("c", Some(1.into()))], Some(At::Server))?;
    assert_eq!(buffer.as_bytes(), b"tbl c=1i\n");
    Ok(())
}

#[test]
fn timestamps_v1() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer
        .table("t")?
        .column_ts("a", TimestampNanos::new(1_500_999)?)?
        .column_ts("b", TimestampMicros::new(7)?)?
        .at(TimestampNanos::new(5)?)?;
    buffer
        .table("t")?
        .column_i64("c", 0)?
        .at(TimestampMicros::new(3)?)?;
    assert_eq!(buffer.as_bytes(), b"t a=1500t,b=7t 5\nt c=0i 3000\n");
    Ok(())
}

#[test]
fn timestamps_v2() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V2);
    buffer
        .table("t")?
        .column_ts("a", TimestampNanos::new(1_500_999)?)?
        .column_ts("b", TimestampMicros::new(7)?)?
        .at(TimestampNanos::new(5)?)?;
    assert_eq!(buffer.as_bytes(), b"t a=1500999n,b=7t 5\n");
    Ok(())
}

#[test]
fn column_value_with_plain_names() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer
        .table("t")?
        .column_value("flag", ColumnValue::Bool(true))?
        .column_value("seen", ColumnValue::TimestampMicros(TimestampMicros::new(9)?))?
        .column_value(ColumnName::new("qty")?, ColumnValue::I64(4))?
        .at(ServerTimestamp)?;
    assert_eq!(buffer.as_bytes(), b"t flag=t,seen=9t,qty=4i\n");
    Ok(())
}

#[test]
fn timestamp_conversions() -> TestResult {
    use std::time::{Duration, SystemTime};

    let ts = SystemTime::UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789);
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.table("t")?.column_ts("ts", ts)?.at(ts)?;
    assert_eq!(
        buffer.as_bytes(),
        b"t ts=1700000000123456t 1700000000123456789\n"
    );

    let micros = TimestampMicros::from_systemtime(ts)?;
    assert_eq!(TimestampNanos::try_from(micros)?.as_i64(), 1_700_000_000_123_456_000);
    Ok(())
}

#[cfg(feature = "chrono_timestamp")]
#[test]
fn chrono_timestamps() -> TestResult {
    use chrono::{TimeZone, Utc};

    let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let mut buffer = Buffer::new(ProtocolVersion::V2);
    buffer.table("t")?.column_ts("ts", dt)?.at(dt)?;
    assert_eq!(
        buffer.as_bytes(),
        b"t ts=1704164645000000t 1704164645000000000\n"
    );
    Ok(())
}

#[test]
fn binary_f64_v2() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V2);
    buffer
        .table("t")?
        .symbol("s", "x")?
        .column_f64("f", 1.5)?
        .column_i64("i", 2)?
        .at_now()?;
    let mut exp = b"t,s=x f=".to_vec();
    exp.extend(f64_binary(1.5));
    exp.extend_from_slice(b",i=2i\n");
    assert_eq!(buffer.as_bytes(), exp.as_slice());
    Ok(())
}

#[test]
fn text_layouts() -> TestResult {
    let latin1 = [b'c', b'a', b'f', 0xe9];
    let ucs4: Vec<u32> = "\u{1f600}".chars().map(|c| c as u32).collect();
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.row(
        "t",
        &[("s", Some(Text::Ucs1(&latin1)))],
        &[("c", Some(Text::Ucs4(&ucs4).into()))],
        ServerTimestamp,
    )?;
    assert_eq!(buffer.as_bytes(), "t,s=caf\u{e9} c=\"\u{1f600}\"\n".as_bytes());
    Ok(())
}

#[test]
fn markers() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    assert_err_contains(
        buffer.rewind_to_marker(),
        ErrorCode::InvalidApiCall,
        "Can't rewind to the marker: No marker set.",
    );

    buffer.table("x")?.symbol("y", "z1")?.at_now()?;
    buffer.table("x")?.symbol("y", "z2")?.at(TimestampNanos::now())?;
    buffer.set_marker()?;
    buffer.table("x")?.symbol("y", "z3")?.at_now()?;
    buffer.table("x")?;
    assert_err_contains(
        buffer.set_marker(),
        ErrorCode::InvalidApiCall,
        "Can't set the marker whilst constructing a line.",
    );
    buffer.rewind_to_marker()?;
    assert_eq!(buffer.row_count(), 2);
    buffer.check_can_flush()?;

    buffer.clear();
    assert_eq!(buffer.row_count(), 0);
    assert!(buffer.is_empty());
    Ok(())
}

#[test]
fn transactional_tracks_tables() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.table("a")?.symbol("s", "1")?.at_now()?;
    buffer.table("a")?.symbol("s", "2")?.at_now()?;
    assert!(buffer.transactional());
    buffer.set_marker()?;
    buffer.table("ab")?.symbol("s", "3")?.at_now()?;
    assert!(!buffer.transactional());
    buffer.rewind_to_marker()?;
    assert!(buffer.transactional());
    Ok(())
}

struct Readings<'a> {
    sensors: &'a [&'a str],
}

impl RowSource for Readings<'_> {
    fn write_rows(&self, sink: &mut dyn RowSink) -> crate::Result<()> {
        for (index, sensor) in self.sensors.iter().enumerate() {
            sink.append_row(
                "readings",
                &[("sensor", Some((*sensor).into()))],
                &[(*sensor, Some((index as i64).into()))],
                At::Server,
            )?;
        }
        Ok(())
    }
}

#[test]
fn dataframe_is_all_or_nothing() -> TestResult {
    let mut buffer = Buffer::new(ProtocolVersion::V1);
    buffer.dataframe(&Readings { sensors: &["a", "b"] })?;
    assert_eq!(
        buffer.as_bytes(),
        b"readings,sensor=a a=0i\nreadings,sensor=b b=1i\n"
    );

    assert_err_contains(
        buffer.dataframe(&Readings { sensors: &["c", "d.e", "f"] }),
        ErrorCode::InvalidName,
        "Column names can't contain a '.' character",
    );
    assert_eq!(buffer.row_count(), 2);
    assert_eq!(
        buffer.as_bytes(),
        b"readings,sensor=a a=0i\nreadings,sensor=b b=1i\n"
    );
    Ok(())
}
