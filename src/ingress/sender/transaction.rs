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

use crate::error::{self, Error, Result};
use crate::ingress::{At, ColumnValue, RowSink, RowSource, Sender, TableName, Text};
use tracing::debug;

/// A batch of rows for a single table, sent as one HTTP request.
///
/// Created by [`Sender::transaction`]. While it is alive the sender can't be
/// used directly. [`commit`](Transaction::commit) sends the rows;
/// [`rollback`](Transaction::rollback), or dropping the transaction, discards
/// them. Auto-flush never splits a transaction.
///
/// ```no_run
/// # fn main() -> questdb::Result<()> {
/// use questdb::ingress::{Sender, TimestampNanos};
///
/// let mut sender = Sender::from_conf("http::addr=localhost:9000;")?;
/// let mut txn = sender.transaction("trades")?;
/// txn.row(&[("symbol", Some("BTC-USD".into()))], &[("price", Some(61234.5.into()))], TimestampNanos::now())?;
/// txn.row(&[("symbol", Some("ETH-USD".into()))], &[("price", Some(2615.54.into()))], TimestampNanos::now())?;
/// txn.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<'s> {
    sender: &'s mut Sender,
    table: String,
    completed: bool,
}

impl<'s> Transaction<'s> {
    pub(super) fn new(sender: &'s mut Sender, table: String) -> Self {
        sender.in_txn = true;
        debug!(table = %table, "transaction started");
        Self {
            sender,
            table,
            completed: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Rows staged so far.
    pub fn row_count(&self) -> usize {
        self.sender.buffer.row_count()
    }

    fn check_open(&self, action: &str) -> Result<()> {
        if self.completed {
            return Err(error::fmt!(
                InvalidApiCall,
                "Transaction already completed, can't {}.",
                action
            ));
        }
        Ok(())
    }

    /// Stage a row for the transaction's table.
    pub fn row<A>(
        &mut self,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: A,
    ) -> Result<()>
    where
        A: TryInto<At>,
        Error: From<A::Error>,
    {
        self.check_open("append rows")?;
        let at: At = at.try_into()?;
        let table = TableName::new_unchecked(&self.table);
        self.sender.buffer.append(table, symbols, columns, at)
    }

    /// Stage every row of a columnar source. If any row fails, none of the
    /// source's rows are kept.
    pub fn dataframe(&mut self, source: &dyn RowSource) -> Result<()> {
        self.check_open("append rows")?;
        self.sender.buffer.set_marker()?;
        let res = source.write_rows(self);
        if res.is_err() {
            self.sender.buffer.rewind_to_marker()?;
        } else {
            self.sender.buffer.clear_marker();
        }
        res
    }

    /// Send all staged rows as a single request. Committing with nothing
    /// staged sends nothing.
    ///
    /// The staged rows are discarded whether or not the request succeeds.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open("commit")?;
        self.completed = true;
        self.sender.in_txn = false;
        let rows = self.sender.buffer.row_count();
        let res = self.sender.flush_internal();
        match &res {
            Ok(()) => debug!(table = %self.table, rows, "transaction committed"),
            Err(err) => debug!(table = %self.table, rows, error = %err, "transaction commit failed"),
        }
        res
    }

    /// Discard all staged rows.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_open("rollback")?;
        self.completed = true;
        self.sender.in_txn = false;
        debug!(
            table = %self.table,
            rows = self.sender.buffer.row_count(),
            "transaction rolled back"
        );
        self.sender.buffer.clear();
        Ok(())
    }
}

impl RowSink for Transaction<'_> {
    fn append_row(
        &mut self,
        table: &str,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: At,
    ) -> Result<()> {
        if table != self.table {
            return Err(error::fmt!(
                InvalidApiCall,
                "Transaction is bound to table {:?}, can't append a row for table {:?}.",
                self.table,
                table
            ));
        }
        self.row(symbols, columns, at)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let _ = self.rollback();
        }
    }
}
