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

use crate::ingress::{At, ColumnValue, Text};

/// Receives rows one at a time.
///
/// Implemented by [`Buffer`](crate::ingress::Buffer),
/// [`Sender`](crate::ingress::Sender) and
/// [`Transaction`](crate::ingress::Transaction). Columnar adapters push their
/// rows through this trait and stop at the first error they get back.
pub trait RowSink {
    fn append_row(
        &mut self,
        table: &str,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: At,
    ) -> crate::Result<()>;
}

/// A batch of tabular data that can serialize itself row by row.
///
/// ```
/// use questdb::ingress::{At, Buffer, ColumnValue, ProtocolVersion, RowSink, RowSource};
///
/// struct Prices<'a> {
///     symbols: &'a [&'a str],
///     prices: &'a [Option<f64>],
/// }
///
/// impl RowSource for Prices<'_> {
///     fn write_rows(&self, sink: &mut dyn RowSink) -> questdb::Result<()> {
///         for (sym, price) in self.symbols.iter().zip(self.prices) {
///             sink.append_row(
///                 "prices",
///                 &[("sym", Some((*sym).into()))],
///                 &[("price", price.map(ColumnValue::F64))],
///                 At::Server,
///             )?;
///         }
///         Ok(())
///     }
/// }
///
/// # fn main() -> questdb::Result<()> {
/// let mut buffer = Buffer::new(ProtocolVersion::V1);
/// buffer.dataframe(&Prices { symbols: &["a", "b"], prices: &[Some(1.5), None] })?;
/// assert_eq!(buffer.as_bytes(), b"prices,sym=a price=1.5\nprices,sym=b\n");
/// # Ok(())
/// # }
/// ```
pub trait RowSource {
    fn write_rows(&self, sink: &mut dyn RowSink) -> crate::Result<()>;
}
