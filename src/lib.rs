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

//! # QuestDB Ingestion Client for Rust
//!
//! Serializes rows into the InfluxDB Line Protocol (ILP) and sends them to
//! QuestDB over TCP or HTTP, optionally with TLS and authentication.
//!
//! ```toml
//! [dependencies]
//! questdb-ingress = "1.0.0"
//! ```
//!
//! The [`ingress`] module contains the row encoder ([`ingress::Buffer`]),
//! the auto-flushing [`ingress::Sender`] and its HTTP-only
//! [`ingress::Transaction`] batches.
//!
//! ```no_run
//! # fn main() -> questdb::Result<()> {
//! use questdb::ingress::{ColumnValue, Sender, TimestampNanos};
//!
//! let mut sender = Sender::from_conf("http::addr=localhost:9000;")?;
//! sender.row(
//!     "trades",
//!     &[("symbol", Some("ETH-USD".into()))],
//!     &[("price", Some(ColumnValue::F64(2615.54)))],
//!     TimestampNanos::now(),
//! )?;
//! sender.close(true)?;
//! # Ok(())
//! # }
//! ```
//!
//! The library logs via the [`tracing`](https://docs.rs/tracing) facade and
//! never installs a subscriber on its own.

mod error;
mod gai;
pub mod ingress;

pub use error::*;

#[cfg(test)]
mod tests;
