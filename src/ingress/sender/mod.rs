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
use crate::ingress::conf::{AuthParams, AutoFlush};
use crate::ingress::tls::TlsSettings;
use crate::ingress::{
    At, Buffer, ColumnValue, ProtocolVersion, RowSource, SenderBuilder, TableName, Text,
};
use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

mod http;
mod tcp;
mod transaction;

pub(crate) use self::http::HttpParams;
pub use self::transaction::Transaction;

use self::http::HttpHandler;
use self::tcp::TcpLink;

/// Everything needed to open the transport, resolved by [`SenderBuilder`].
pub(crate) struct ConnectParams {
    pub(crate) host: String,
    pub(crate) port: String,
    pub(crate) net_interface: Option<String>,
    pub(crate) auth_timeout: Duration,
    pub(crate) tls: Option<TlsSettings>,
    pub(crate) auth: Option<AuthParams>,
    pub(crate) http: Option<HttpParams>,
}

pub(crate) struct SenderParams {
    pub(crate) descr: String,
    pub(crate) connect: ConnectParams,
    pub(crate) max_buf_size: usize,
    pub(crate) init_buf_size: usize,
    pub(crate) max_name_len: usize,
    pub(crate) max_name_len_specified: bool,
    pub(crate) protocol_version: Option<ProtocolVersion>,
    pub(crate) auto_flush: AutoFlush,
}

enum Transport {
    Tcp(TcpLink),
    Http(HttpHandler),
}

enum ConnState {
    Unconnected,
    Established(Transport),

    /// A TCP write failed. Every further send reports the same error.
    Failed(Error),

    Closed,
}

/// The transport half of a [`Sender`], kept apart from its buffer so a flush
/// can borrow both.
struct Connection {
    params: ConnectParams,
    state: ConnState,
    max_buf_size: usize,
    protocol_version: Option<ProtocolVersion>,
    last_flush: Instant,
}

impl Connection {
    fn check_usable(&self) -> Result<()> {
        match &self.state {
            ConnState::Established(_) => Ok(()),
            ConnState::Unconnected => Err(error::fmt!(
                SocketError,
                "Not connected: call `establish()` before flushing."
            )),
            ConnState::Failed(err) => Err(err.clone()),
            ConnState::Closed => Err(error::fmt!(InvalidApiCall, "Sender is closed.")),
        }
    }

    fn since_last_flush(&self) -> Duration {
        self.last_flush.elapsed()
    }

    /// Rows may be staged before `establish()`, but not once the transport
    /// has failed or was closed.
    fn check_accepting(&self) -> Result<()> {
        match self.state {
            ConnState::Failed(_) | ConnState::Closed => self.check_usable(),
            _ => Ok(()),
        }
    }

    fn send(&mut self, buf: &Buffer) -> Result<()> {
        self.check_accepting()?;
        if buf.is_empty() {
            return Ok(());
        }
        self.check_usable()?;
        buf.check_can_flush()?;
        if buf.len() > self.max_buf_size {
            return Err(error::fmt!(
                InvalidApiCall,
                "Could not flush buffer: Buffer size of {} exceeds maximum configured allowed size of {} bytes.",
                buf.len(),
                self.max_buf_size
            ));
        }
        if let Some(version) = self.protocol_version {
            if buf.protocol_version() != version {
                return Err(error::fmt!(
                    ProtocolVersionError,
                    "Attempting to send with protocol version {} \
                    but the sender is configured to use protocol version {}",
                    buf.protocol_version(),
                    version
                ));
            }
        }

        let bytes = buf.as_bytes();
        self.last_flush = Instant::now();
        let res = match &mut self.state {
            ConnState::Established(Transport::Tcp(conn)) => conn
                .write_all(bytes)
                .map_err(|io_err| error::fmt!(SocketError, "Could not flush buffer: {}", io_err)),
            ConnState::Established(Transport::Http(handler)) => handler.send(bytes),
            _ => return self.check_usable(),
        };
        match res {
            Ok(()) => {
                debug!(
                    rows = buf.row_count(),
                    bytes = bytes.len(),
                    "flushed buffer"
                );
                Ok(())
            }
            Err(err) => {
                if matches!(self.state, ConnState::Established(Transport::Tcp(_))) {
                    warn!(error = %err, "TCP connection failed, sender must be closed");
                    self.state = ConnState::Failed(err.clone());
                }
                Err(err)
            }
        }
    }
}

/// Connects to a QuestDB instance and inserts data via the ILP protocol.
///
/// * Construct it with [`Sender::from_conf`], [`Sender::from_env`] or
///   [`SenderBuilder`].
/// * Append rows with [`row`](Sender::row) and
///   [`dataframe`](Sender::dataframe); the sender flushes automatically as
///   configured by [`AutoFlush`].
/// * Group rows for a single table into one HTTP request with
///   [`transaction`](Sender::transaction).
///
/// ```no_run
/// # fn main() -> questdb::Result<()> {
/// use questdb::ingress::{Sender, TimestampNanos};
///
/// let mut sender = Sender::from_conf("http::addr=localhost:9000;")?;
/// sender.row(
///     "trades",
///     &[("symbol", Some("ETH-USD".into()))],
///     &[("price", Some(2615.54.into()))],
///     TimestampNanos::now(),
/// )?;
/// sender.close(true)?;
/// # Ok(())
/// # }
/// ```
pub struct Sender {
    descr: String,
    conn: Connection,
    buffer: Buffer,
    init_buf_size: usize,
    max_name_len: usize,
    max_name_len_specified: bool,
    auto_flush: AutoFlush,
    in_txn: bool,
}

impl Debug for Sender {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.descr.as_str())
    }
}

impl Sender {
    pub(crate) fn new(params: SenderParams) -> Self {
        let buffer = Buffer::with_params(
            params.protocol_version.unwrap_or(ProtocolVersion::V1),
            params.init_buf_size,
            params.max_name_len,
        );
        Self {
            descr: params.descr,
            conn: Connection {
                params: params.connect,
                state: ConnState::Unconnected,
                max_buf_size: params.max_buf_size,
                protocol_version: params.protocol_version,
                last_flush: Instant::now(),
            },
            buffer,
            init_buf_size: params.init_buf_size,
            max_name_len: params.max_name_len,
            max_name_len_specified: params.max_name_len_specified,
            auto_flush: params.auto_flush,
            in_txn: false,
        }
    }

    /// Create and connect a `Sender` from a configuration string, e.g.
    /// `"http::addr=localhost:9000;"`.
    ///
    /// See [`SenderBuilder::from_conf`] for the accepted keys. Over TCP this
    /// returns once the connection, TLS handshake and authentication are
    /// complete. Over HTTP with the default `protocol_version=auto`, it asks
    /// the server which protocol version to use.
    pub fn from_conf<T: AsRef<str>>(conf: T) -> Result<Self> {
        let mut sender = SenderBuilder::from_conf(conf)?.build()?;
        sender.establish()?;
        Ok(sender)
    }

    /// Create and connect a `Sender` from the configuration stored in the
    /// `QDB_CLIENT_CONF` environment variable.
    pub fn from_env() -> Result<Self> {
        let mut sender = SenderBuilder::from_env()?.build()?;
        sender.establish()?;
        Ok(sender)
    }

    /// Open the transport.
    ///
    /// Over TCP this connects, then completes the TLS handshake and
    /// authentication. Over HTTP it prepares the connection pool and, if the
    /// protocol version is "auto", reads the server's settings.
    ///
    /// Calling it again on a connected sender does nothing. A closed sender
    /// can't be re-established.
    pub fn establish(&mut self) -> Result<()> {
        match self.conn.state {
            ConnState::Unconnected => {}
            ConnState::Established(_) | ConnState::Failed(_) => return Ok(()),
            ConnState::Closed => {
                return Err(error::fmt!(
                    InvalidApiCall,
                    "Sender is closed and can't be established again."
                ))
            }
        }

        let transport = match self.conn.params.http.as_ref() {
            None => Transport::Tcp(tcp::open(&self.conn.params)?),
            Some(http_params) => {
                let handler = HttpHandler::new(http_params)?;
                if self.conn.protocol_version.is_none() {
                    self.negotiate(&handler)?;
                }
                Transport::Http(handler)
            }
        };

        self.conn.state = ConnState::Established(transport);
        self.conn.last_flush = Instant::now();
        info!(sender = %self.descr, "connection established");
        Ok(())
    }

    fn negotiate(&mut self, handler: &HttpHandler) -> Result<()> {
        let settings = handler.read_server_settings()?;
        let version = http::choose_protocol_version(settings.protocol_versions.as_deref())?;
        if !self.max_name_len_specified {
            if let Some(max_name_len) = settings.max_name_len {
                self.max_name_len = max_name_len;
            }
        }
        info!(
            settings_url = handler.settings_url(),
            protocol_version = %version,
            max_name_len = self.max_name_len,
            "negotiated line protocol version"
        );
        self.conn.protocol_version = Some(version);
        self.buffer = Buffer::with_params(version, self.init_buf_size, self.max_name_len);
        Ok(())
    }

    /// Flush any remaining rows if `flush` is true, then release the
    /// transport. Closing twice is a no-op.
    pub fn close(&mut self, flush: bool) -> Result<()> {
        if matches!(self.conn.state, ConnState::Closed) {
            return Ok(());
        }
        let res = if flush && !self.buffer.is_empty() && !self.in_txn {
            self.flush()
        } else {
            Ok(())
        };
        if !self.buffer.is_empty() {
            debug!(rows = self.buffer.row_count(), "discarding unflushed rows on close");
            self.buffer.clear();
        }
        self.conn.state = ConnState::Closed;
        info!(sender = %self.descr, "sender closed");
        res
    }

    fn check_not_in_txn(&self, msg: &str) -> Result<()> {
        if self.in_txn {
            return Err(error::fmt!(InvalidApiCall, "{}", msg));
        }
        Ok(())
    }

    fn check_version_known(&self) -> Result<()> {
        if self.conn.protocol_version.is_none() {
            return Err(error::fmt!(
                ProtocolVersionError,
                "The protocol version is not known yet. \
                Call `establish()` to detect it before appending rows."
            ));
        }
        Ok(())
    }

    /// Append a row to the sender's buffer, then flush if an auto-flush
    /// threshold is reached.
    ///
    /// See [`Buffer::row`] for the argument conventions.
    pub fn row<'a, N, A>(
        &mut self,
        table: N,
        symbols: &[(&str, Option<Text<'_>>)],
        columns: &[(&str, Option<ColumnValue<'_>>)],
        at: A,
    ) -> Result<()>
    where
        N: TryInto<TableName<'a>>,
        A: TryInto<At>,
        Error: From<N::Error>,
        Error: From<A::Error>,
    {
        let at: At = at.try_into()?;
        let table: TableName<'a> = table.try_into()?;
        self.check_appendable()?;
        self.buffer.append(table, symbols, columns, at)?;
        self.maybe_auto_flush()
    }

    /// Append every row of a columnar source, then check auto-flush once.
    /// If any row fails, none of the source's rows are kept.
    pub fn dataframe(&mut self, source: &dyn RowSource) -> Result<()> {
        self.check_appendable()?;
        self.buffer.dataframe(source)?;
        self.maybe_auto_flush()
    }

    fn check_appendable(&self) -> Result<()> {
        self.check_not_in_txn("Cannot append rows explicitly inside a transaction")?;
        self.conn.check_accepting()?;
        self.check_version_known()
    }

    fn maybe_auto_flush(&mut self) -> Result<()> {
        if matches!(self.conn.state, ConnState::Unconnected) {
            return Ok(());
        }
        if self.auto_flush.is_due(
            self.buffer.row_count(),
            self.buffer.len(),
            self.conn.since_last_flush(),
        ) {
            trace!(
                rows = self.buffer.row_count(),
                bytes = self.buffer.len(),
                "auto-flushing"
            );
            return self.flush_internal();
        }
        Ok(())
    }

    fn flush_internal(&mut self) -> Result<()> {
        if matches!(self.conn.state, ConnState::Unconnected | ConnState::Closed) {
            return self.conn.check_usable();
        }
        let res = self.conn.send(&self.buffer);
        self.buffer.clear();
        res
    }

    /// Send the sender's own buffer and clear it.
    ///
    /// The buffer is cleared even if sending fails: rows handed to a failed
    /// transport are not kept for a retry. Only "not connected" and "closed"
    /// errors leave the rows in place.
    ///
    /// Over HTTP this waits for the server's response and retries transient
    /// failures for up to `retry_timeout`. Over TCP it returns once the bytes
    /// are written to the socket; a write failure makes the sender unusable
    /// (see [`must_close`](Sender::must_close)).
    pub fn flush(&mut self) -> Result<()> {
        self.check_not_in_txn("Cannot flush explicitly inside a transaction")?;
        self.flush_internal()
    }

    /// Send a caller-owned buffer and clear it on success.
    pub fn flush_buffer(&mut self, buf: &mut Buffer) -> Result<()> {
        self.check_not_in_txn("Cannot flush explicitly inside a transaction")?;
        self.conn.send(buf)?;
        buf.clear();
        Ok(())
    }

    /// Send a caller-owned buffer, leaving its contents in place.
    pub fn flush_and_keep(&mut self, buf: &Buffer) -> Result<()> {
        self.check_not_in_txn("Cannot flush explicitly inside a transaction")?;
        self.conn.send(buf)
    }

    /// Flush either the sender's own buffer (`None`) or the given one.
    ///
    /// `clear = false` is only valid together with an explicit buffer: the
    /// sender's own buffer is always cleared.
    pub fn flush_with(&mut self, buffer: Option<&mut Buffer>, clear: bool) -> Result<()> {
        match (buffer, clear) {
            (None, true) => self.flush(),
            (None, false) => Err(error::fmt!(
                InvalidApiCall,
                "The internal buffer must always be cleared. \
                Pass an explicit buffer to flush without clearing."
            )),
            (Some(buf), true) => self.flush_buffer(buf),
            (Some(buf), false) => self.flush_and_keep(buf),
        }
    }

    /// Start a transaction for `table`. ILP/HTTP only.
    ///
    /// The rows appended through the returned [`Transaction`] are sent as a
    /// single request on [`commit`](Transaction::commit). Dropping the
    /// transaction without committing discards them.
    ///
    /// If the sender's buffer holds rows, they are flushed first when
    /// auto-flush is enabled; otherwise starting the transaction fails.
    pub fn transaction<'a, N>(&mut self, table: N) -> Result<Transaction<'_>>
    where
        N: TryInto<TableName<'a>>,
        Error: From<N::Error>,
    {
        self.check_not_in_txn("Already inside a transaction, can't start another.")?;
        if self.conn.params.http.is_none() {
            return Err(error::fmt!(
                InvalidApiCall,
                "Transactions aren't supported for ILP/TCP, use ILP/HTTP instead."
            ));
        }
        let table: TableName<'a> = table.try_into()?;
        if !self.buffer.is_empty() {
            if !self.auto_flush.enabled {
                return Err(error::fmt!(
                    InvalidApiCall,
                    "Sender buffer must be clear when starting a transaction. \
                    You must call `flush()` before this call."
                ));
            }
            self.flush_internal()?;
        }
        self.check_version_known()?;
        Ok(Transaction::new(self, table.as_ref().to_owned()))
    }

    /// Run `f` inside a transaction for `table`: commit if it returns `Ok`,
    /// roll back if it returns `Err`.
    pub fn in_transaction<'a, N, F, T>(&mut self, table: N, f: F) -> Result<T>
    where
        N: TryInto<TableName<'a>>,
        Error: From<N::Error>,
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut txn = self.transaction(table)?;
        match f(&mut txn) {
            Ok(value) => {
                if !txn.is_completed() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                if !txn.is_completed() {
                    txn.rollback()?;
                }
                Err(err)
            }
        }
    }

    /// A new standalone [`Buffer`] matching the sender's protocol version and
    /// name length limit.
    pub fn new_buffer(&self) -> Result<Buffer> {
        self.check_version_known()?;
        Ok(Buffer::with_params(
            self.buffer.protocol_version(),
            self.init_buf_size,
            self.max_name_len,
        ))
    }

    /// Bytes pending in the sender's buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn row_count(&self) -> usize {
        self.buffer.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// The configured or negotiated protocol version. `None` until an HTTP
    /// sender set to "auto" is established.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.conn.protocol_version
    }

    /// Maximum table or column name length. Read from the server when not
    /// set explicitly and the protocol version is auto-detected.
    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    pub fn init_buf_size(&self) -> usize {
        self.init_buf_size
    }

    pub fn auto_flush(&self) -> AutoFlush {
        self.auto_flush
    }

    /// True once a TCP write has failed. The sender then rejects every send
    /// with the original error and must be closed.
    pub fn must_close(&self) -> bool {
        matches!(self.conn.state, ConnState::Failed(_))
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        if !self.buffer.is_empty() && !matches!(self.conn.state, ConnState::Closed) {
            warn!(
                sender = %self.descr,
                rows = self.buffer.row_count(),
                bytes = self.buffer.len(),
                "sender dropped with unflushed rows"
            );
        }
    }
}
