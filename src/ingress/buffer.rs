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

use crate::error::{self, Error};
use crate::ingress::ndarr::{check_and_get_array_bytes_size, ElemDataType};
use crate::ingress::{
    At, ColumnName, ColumnValue, NdArrayView, ProtocolVersion, RowSink, RowSource, TableName,
    Text, Timestamp, TimestampMicros, ARRAY_BINARY_FORMAT_TYPE, DEFAULT_INIT_BUF_SIZE,
    DOUBLE_BINARY_FORMAT_TYPE, MAX_NAME_LEN_DEFAULT,
};
use std::fmt::{Debug, Formatter};

fn is_name_special(b: u8) -> bool {
    matches!(b, b' ' | b',' | b'=' | b'\n' | b'\r' | b'\\')
}

fn is_string_special(b: u8) -> bool {
    matches!(b, b'"' | b'\n' | b'\r' | b'\\')
}

/// Append `s`, prefixing every byte `special` selects with a backslash.
fn push_escaped(out: &mut Vec<u8>, s: &str, special: fn(u8) -> bool) {
    let bytes = s.as_bytes();
    let mut pending = 0;
    for (index, &b) in bytes.iter().enumerate() {
        if special(b) {
            out.extend_from_slice(&bytes[pending..index]);
            out.push(b'\\');
            pending = index;
        }
    }
    out.extend_from_slice(&bytes[pending..]);
}

/// Append the ILP v1 text form of a double: shortest round-trip digits,
/// or `NaN`, `Infinity`, `-Infinity`.
pub(crate) fn push_f64_text(out: &mut Vec<u8>, value: f64) {
    if value.is_finite() {
        let mut digits = ryu::Buffer::new();
        out.extend_from_slice(digits.format_finite(value).as_bytes());
    } else if value.is_nan() {
        out.extend_from_slice(b"NaN");
    } else if value > 0.0 {
        out.extend_from_slice(b"Infinity");
    } else {
        out.extend_from_slice(b"-Infinity");
    }
}

fn push_int(out: &mut Vec<u8>, value: i64) {
    let mut digits = itoa::Buffer::new();
    out.extend_from_slice(digits.format(value).as_bytes());
}

/// Position within the line being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    /// No line open.
    Between,
    AfterTable,
    AfterSymbol,
    AfterColumn,
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Table,
    Symbol,
    Column,
    At,
    Flush,
}

impl Call {
    fn name(self) -> &'static str {
        match self {
            Call::Table => "table",
            Call::Symbol => "symbol",
            Call::Column => "column",
            Call::At => "at",
            Call::Flush => "flush",
        }
    }

    fn allowed_after(self, line: Line) -> bool {
        matches!(
            (line, self),
            (Line::Between, Call::Table | Call::Flush)
                | (Line::AfterTable, Call::Symbol | Call::Column)
                | (Line::AfterSymbol, Call::Symbol | Call::Column | Call::At)
                | (Line::AfterColumn, Call::Column | Call::At)
        )
    }
}

/// Everything a rewind restores besides the byte length.
#[derive(Debug, Clone, Copy)]
struct Progress {
    line: Line,
    rows: usize,
    /// End of the first table name written, 0 while there is none.
    first_table_end: usize,
    single_table: bool,
}

impl Progress {
    const START: Progress = Progress {
        line: Line::Between,
        rows: 0,
        first_table_end: 0,
        single_table: true,
    };
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    len: usize,
    progress: Progress,
}

/// Accumulates ILP rows for one protocol version.
///
/// Whole rows go in through [`row`](Buffer::row), which never leaves a
/// partial line behind. The step-wise API writes one line piece by piece:
///
/// * [`table`](Buffer::table) opens the line,
/// * then [`symbol`](Buffer::symbol) calls, then `column_*` calls (at least
///   one of either),
/// * then [`at`](Buffer::at) or [`at_now`](Buffer::at_now) closes it.
///
/// ```
/// # fn main() -> questdb::Result<()> {
/// use questdb::ingress::{Buffer, ProtocolVersion, TimestampNanos};
///
/// let mut buffer = Buffer::new(ProtocolVersion::V1);
/// buffer
///     .table("trades")?
///     .symbol("symbol", "ETH-USD")?
///     .column_f64("price", 2615.54)?
///     .at(TimestampNanos::new(1)?)?;
/// assert_eq!(buffer.as_bytes(), b"trades,symbol=ETH-USD price=2615.54 1\n");
/// # Ok(())
/// # }
/// ```
///
/// A failed step-wise call leaves the line open. Use
/// [`set_marker`](Buffer::set_marker) and
/// [`rewind_to_marker`](Buffer::rewind_to_marker) to drop it.
#[derive(Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
    progress: Progress,
    marker: Option<Snapshot>,
    max_name_len: usize,
    protocol_version: ProtocolVersion,
}

impl Buffer {
    /// 64 KiB initial capacity, 127-byte name limit.
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self::with_params(protocol_version, DEFAULT_INIT_BUF_SIZE, MAX_NAME_LEN_DEFAULT)
    }

    /// `max_name_len` should match the server's `cairo.max.file.name.length`.
    pub fn with_max_name_len(protocol_version: ProtocolVersion, max_name_len: usize) -> Self {
        Self::with_params(protocol_version, DEFAULT_INIT_BUF_SIZE, max_name_len)
    }

    pub fn with_params(
        protocol_version: ProtocolVersion,
        init_buf_size: usize,
        max_name_len: usize,
    ) -> Self {
        Self {
            bytes: Vec::with_capacity(init_buf_size),
            progress: Progress::START,
            marker: None,
            max_name_len,
            protocol_version,
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    pub fn reserve(&mut self, additional: usize) {
        self.bytes.reserve(additional);
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Completed rows.
    pub fn row_count(&self) -> usize {
        self.progress.rows
    }

    /// True while every row targets the same table.
    pub fn transactional(&self) -> bool {
        self.progress.single_table
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            len: self.bytes.len(),
            progress: self.progress,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.bytes.truncate(snapshot.len);
        self.progress = snapshot.progress;
    }

    /// Remember the current position. Only valid between lines; replaces
    /// any earlier marker.
    pub fn set_marker(&mut self) -> crate::Result<()> {
        if self.progress.line != Line::Between {
            return Err(error::fmt!(
                InvalidApiCall,
                "Can't set the marker whilst constructing a line. \
                A marker may only be set on an empty buffer or after \
                `at` or `at_now` is called."
            ));
        }
        self.marker = Some(self.snapshot());
        Ok(())
    }

    /// Drop everything written since [`set_marker`](Buffer::set_marker),
    /// and the marker with it.
    pub fn rewind_to_marker(&mut self) -> crate::Result<()> {
        let snapshot = self.marker.take().ok_or_else(|| {
            error::fmt!(InvalidApiCall, "Can't rewind to the marker: No marker set.")
        })?;
        self.restore(snapshot);
        Ok(())
    }

    pub fn clear_marker(&mut self) {
        self.marker = None;
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.progress = Progress::START;
        self.marker = None;
    }

    fn expect(&self, call: Call) -> crate::Result<()> {
        if call.allowed_after(self.progress.line) {
            return Ok(());
        }
        let wanted = match self.progress.line {
            Line::Between if self.bytes.is_empty() => "`table`",
            Line::Between => "`flush` or `table`",
            Line::AfterTable => "`symbol` or `column`",
            Line::AfterSymbol => "`symbol`, `column` or `at`",
            Line::AfterColumn => "`column` or `at`",
        };
        Err(error::fmt!(
            InvalidApiCall,
            "State error: Bad call to `{}`, should have called {} instead.",
            call.name(),
            wanted
        ))
    }

    /// `Ok` unless a line is still open. An empty buffer may be flushed.
    pub fn check_can_flush(&self) -> crate::Result<()> {
        self.expect(Call::Flush)
    }

    fn check_name_len(&self, name: &str) -> crate::Result<()> {
        if name.len() > self.max_name_len {
            return Err(error::fmt!(
                InvalidName,
                "Bad name: {:?}: Too long (max {} characters)",
                name,
                self.max_name_len
            ));
        }
        Ok(())
    }

    fn put_table(&mut self, name: TableName<'_>) -> crate::Result<()> {
        self.check_name_len(name.as_str())?;
        self.expect(Call::Table)?;
        let begin = self.bytes.len();
        push_escaped(&mut self.bytes, name.as_str(), is_name_special);
        let end = self.bytes.len();
        let progress = &mut self.progress;
        if progress.first_table_end == 0 {
            progress.first_table_end = end;
        } else if self.bytes[..progress.first_table_end] != self.bytes[begin..end] {
            progress.single_table = false;
        }
        progress.line = Line::AfterTable;
        Ok(())
    }

    fn put_symbol(&mut self, name: ColumnName<'_>, value: &str) -> crate::Result<()> {
        self.check_name_len(name.as_str())?;
        self.expect(Call::Symbol)?;
        self.bytes.push(b',');
        push_escaped(&mut self.bytes, name.as_str(), is_name_special);
        self.bytes.push(b'=');
        push_escaped(&mut self.bytes, value, is_name_special);
        self.progress.line = Line::AfterSymbol;
        Ok(())
    }

    /// Writes the separator and `name=`.
    fn put_column_key(&mut self, name: ColumnName<'_>) -> crate::Result<()> {
        self.check_name_len(name.as_str())?;
        self.expect(Call::Column)?;
        let separator = match self.progress.line {
            Line::AfterColumn => b',',
            _ => b' ',
        };
        self.bytes.push(separator);
        push_escaped(&mut self.bytes, name.as_str(), is_name_special);
        self.bytes.push(b'=');
        self.progress.line = Line::AfterColumn;
        Ok(())
    }

    fn put_f64(&mut self, name: ColumnName<'_>, value: f64) -> crate::Result<()> {
        self.put_column_key(name)?;
        match self.protocol_version {
            ProtocolVersion::V1 => push_f64_text(&mut self.bytes, value),
            ProtocolVersion::V2 => {
                self.bytes.extend_from_slice(&[b'=', DOUBLE_BINARY_FORMAT_TYPE]);
                self.bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }

    fn put_str(&mut self, name: ColumnName<'_>, value: &str) -> crate::Result<()> {
        self.put_column_key(name)?;
        self.bytes.push(b'"');
        push_escaped(&mut self.bytes, value, is_string_special);
        self.bytes.push(b'"');
        Ok(())
    }

    fn put_ts(&mut self, name: ColumnName<'_>, value: Timestamp) -> crate::Result<()> {
        let (number, unit) = match (self.protocol_version, value) {
            (ProtocolVersion::V2, Timestamp::Nanos(ts)) => (ts.as_i64(), b'n'),
            (_, ts) => (TimestampMicros::from(ts).as_i64(), b't'),
        };
        self.put_column_key(name)?;
        push_int(&mut self.bytes, number);
        self.bytes.push(unit);
        Ok(())
    }

    fn put_arr<T>(&mut self, name: ColumnName<'_>, view: &T) -> crate::Result<()>
    where
        T: NdArrayView + ?Sized,
    {
        if self.protocol_version == ProtocolVersion::V1 {
            return Err(error::fmt!(
                ProtocolVersionError,
                "Protocol version {} does not support array datatype",
                self.protocol_version
            ));
        }
        let payload = check_and_get_array_bytes_size(view)?;
        let ndim = view.ndim();
        self.put_column_key(name)?;
        self.bytes.reserve(4 + 4 * ndim + payload);
        self.bytes.extend_from_slice(&[
            b'=',
            ARRAY_BINARY_FORMAT_TYPE,
            ElemDataType::Double.into(),
            ndim as u8,
        ]);
        for dim in (0..ndim).map(|index| view.dim(index).unwrap_or(0) as u32) {
            self.bytes.extend_from_slice(&dim.to_le_bytes());
        }
        let data_begin = self.bytes.len();
        view.write_row_major(&mut self.bytes)?;
        let written = self.bytes.len() - data_begin;
        if written != payload {
            return Err(error::fmt!(
                ArrayError,
                "Array write buffer length mismatch (actual: {}, expected: {})",
                written,
                payload
            ));
        }
        Ok(())
    }

    fn put_value(&mut self, name: ColumnName<'_>, value: ColumnValue<'_>) -> crate::Result<()> {
        match value {
            ColumnValue::Bool(v) => {
                self.put_column_key(name)?;
                self.bytes.push(if v { b't' } else { b'f' });
                Ok(())
            }
            ColumnValue::I64(v) => {
                self.put_column_key(name)?;
                push_int(&mut self.bytes, v);
                self.bytes.push(b'i');
                Ok(())
            }
            ColumnValue::F64(v) => self.put_f64(name, v),
            ColumnValue::Str(text) => self.put_str(name, &text.to_str()?),
            ColumnValue::TimestampMicros(ts) => self.put_ts(name, ts.into()),
            ColumnValue::TimestampNanos(ts) => self.put_ts(name, ts.into()),
            ColumnValue::F64Array(view) => self.put_arr(name, view),
        }
    }

    fn put_at(&mut self, at: At) -> crate::Result<()> {
        self.expect(Call::At)?;
        if let At::Timestamp(ts) = at {
            self.bytes.push(b' ');
            push_int(&mut self.bytes, ts.as_i64());
        }
        self.bytes.push(b'\n');
        self.progress.line = Line::Between;
        self.progress.rows += 1;
        Ok(())
    }

    /// Open a new line for `name`.
    pub fn table<'a, N>(&mut self, name: N) -> crate::Result<&mut Self>
    where
        N: TryInto<TableName<'a>>,
        Error: From<N::Error>,
    {
        self.put_table(name.try_into()?)?;
        Ok(self)
    }

    /// Symbols must come before any other column of the line.
    pub fn symbol<'a, N, S>(&mut self, name: N, value: S) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        S: AsRef<str>,
        Error: From<N::Error>,
    {
        self.put_symbol(name.try_into()?, value.as_ref())?;
        Ok(self)
    }

    pub fn symbol_text<'a, N>(&mut self, name: N, value: Text<'_>) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        let name = name.try_into()?;
        self.put_symbol_text(name, value)?;
        Ok(self)
    }

    fn put_symbol_text(&mut self, name: ColumnName<'_>, value: Text<'_>) -> crate::Result<()> {
        self.put_symbol(name, &value.to_str()?)
    }

    pub fn column_bool<'a, N>(&mut self, name: N, value: bool) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        self.put_value(name.try_into()?, ColumnValue::Bool(value))?;
        Ok(self)
    }

    pub fn column_i64<'a, N>(&mut self, name: N, value: i64) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        self.put_value(name.try_into()?, ColumnValue::I64(value))?;
        Ok(self)
    }

    /// Text under protocol v1, a tagged little-endian double under v2.
    pub fn column_f64<'a, N>(&mut self, name: N, value: f64) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        self.put_f64(name.try_into()?, value)?;
        Ok(self)
    }

    pub fn column_str<'a, N, S>(&mut self, name: N, value: S) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        S: AsRef<str>,
        Error: From<N::Error>,
    {
        self.put_str(name.try_into()?, value.as_ref())?;
        Ok(self)
    }

    pub fn column_text<'a, N>(&mut self, name: N, value: Text<'_>) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        self.put_value(name.try_into()?, ColumnValue::Str(value))?;
        Ok(self)
    }

    /// An N-dimensional array of doubles. Protocol v2 only.
    pub fn column_arr<'a, N, T>(&mut self, name: N, view: &T) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        T: NdArrayView + ?Sized,
        Error: From<N::Error>,
    {
        self.put_arr(name.try_into()?, view)?;
        Ok(self)
    }

    /// Protocol v1 always writes microseconds (`t`). Protocol v2 keeps the
    /// value's unit: `t` for microseconds, `n` for nanoseconds.
    pub fn column_ts<'a, N, T>(&mut self, name: N, value: T) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        T: TryInto<Timestamp>,
        Error: From<N::Error>,
        Error: From<T::Error>,
    {
        let value: Timestamp = value.try_into()?;
        self.put_ts(name.try_into()?, value)?;
        Ok(self)
    }

    /// Any [`ColumnValue`].
    pub fn column_value<'a, N>(
        &mut self,
        name: N,
        value: ColumnValue<'_>,
    ) -> crate::Result<&mut Self>
    where
        N: TryInto<ColumnName<'a>>,
        Error: From<N::Error>,
    {
        self.put_value(name.try_into()?, value)?;
        Ok(self)
    }

    /// Close the line. A timestamp is written as plain nanoseconds;
    /// [`At::Server`] writes none and lets the server assign it.
    pub fn at<T>(&mut self, timestamp: T) -> crate::Result<()>
    where
        T: TryInto<At>,
        Error: From<T::Error>,
    {
        self.put_at(timestamp.try_into()?)
    }

    /// Same as `at(At::Server)`.
    pub fn at_now(&mut self) -> crate::Result<()> {
        self.put_at(At::Server)
    }

    /// Append one complete row.
    ///
    /// `None` values are skipped, and a row with nothing but `None`s is not
    /// written at all. If any part is invalid, the buffer is left exactly
    /// as it was.
    ///
    /// ```
    /// # fn main() -> questdb::Result<()> {
    /// use questdb::ingress::{Buffer, ProtocolVersion, TimestampNanos};
    ///
    /// let mut buffer = Buffer::new(ProtocolVersion::V1);
    /// buffer.row(
    ///     "tab1",
    ///     &[("t1", Some("val1".into())), ("t2", None)],
    ///     &[("f1", Some(true.into())), ("f2", Some(12345.into()))],
    ///     TimestampNanos::new(111222233333)?,
    /// )?;
    /// assert_eq!(buffer.as_bytes(), b"tab1,t1=val1 f1=t,f2=12345i 111222233333\n");
    /// # Ok(())
    /// # }
    /// ```
    pub fn row<'a, N, A>(
        &mut self,
        table: N,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: A,
    ) -> crate::Result<()>
    where
        N: TryInto<TableName<'a>>,
        A: TryInto<At>,
        Error: From<N::Error>,
        Error: From<A::Error>,
    {
        let at: At = at.try_into()?;
        let table: TableName<'a> = table.try_into()?;
        self.append(table, symbols, columns, at)
    }

    /// [`row`](Buffer::row) with its arguments already resolved.
    pub(crate) fn append(
        &mut self,
        table: TableName<'_>,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: At,
    ) -> crate::Result<()> {
        self.expect(Call::Table)?;
        let has_values = symbols.iter().any(|(_, v)| v.is_some())
            || columns.iter().any(|(_, v)| v.is_some());
        if !has_values {
            return Ok(());
        }
        let before = self.snapshot();
        let res = self.write_row(table, symbols, columns, at);
        if res.is_err() {
            self.restore(before);
        }
        res
    }

    fn write_row(
        &mut self,
        table: TableName<'_>,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: At,
    ) -> crate::Result<()> {
        self.put_table(table)?;
        for (name, value) in symbols {
            if let Some(value) = value {
                self.put_symbol_text(ColumnName::new(name)?, *value)?;
            }
        }
        for (name, value) in columns {
            if let Some(value) = value {
                self.put_value(ColumnName::new(name)?, *value)?;
            }
        }
        self.put_at(at)
    }

    /// Append every row `source` produces. If one fails, none are kept.
    pub fn dataframe(&mut self, source: &dyn RowSource) -> crate::Result<()> {
        self.expect(Call::Table)?;
        let before = self.snapshot();
        let res = source.write_rows(self);
        if res.is_err() {
            self.restore(before);
        }
        res
    }
}

impl RowSink for Buffer {
    fn append_row(
        &mut self,
        table: &str,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: At,
    ) -> crate::Result<()> {
        self.append(TableName::new(table)?, symbols, columns, at)
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let escaped: String = self
            .bytes
            .iter()
            .flat_map(|&b| std::ascii::escape_default(b))
            .map(char::from)
            .collect();
        f.debug_struct("Buffer")
            .field("bytes", &escaped)
            .field("progress", &self.progress)
            .field("marker", &self.marker)
            .field("max_name_len", &self.max_name_len)
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}
