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

//! IPv4 name resolution via `getaddrinfo`.

use crate::error;
use dns_lookup::{AddrInfoHints, LookupError};
use socket2::SockAddr;

#[cfg(unix)]
use libc::{AF_INET, SOCK_STREAM};

#[cfg(windows)]
use winapi::shared::ws2def::{AF_INET, SOCK_STREAM};

/// First IPv4 stream address for `host` (and `port`, if given). `label`
/// names the lookup in errors.
fn first_addr(label: &str, host: &str, port: Option<&str>) -> crate::Result<SockAddr> {
    let hints = AddrInfoHints {
        socktype: SOCK_STREAM,
        address: AF_INET,
        ..AddrInfoHints::default()
    };
    let unresolved = |reason: &dyn std::fmt::Display| {
        error::fmt!(CouldNotResolveAddr, "Could not resolve {label:?}: {reason}")
    };
    let mut found = dns_lookup::getaddrinfo(Some(host), port, Some(hints))
        .map_err(|e: LookupError| unresolved(&std::io::Error::from(e)))?;
    match found.next() {
        Some(Ok(info)) => Ok(info.sockaddr.into()),
        Some(Err(io_err)) => Err(unresolved(&io_err)),
        None => Err(unresolved(&"No addresses found")),
    }
}

/// Local interface address to bind to before connecting.
pub(crate) fn resolve_host(host: &str) -> crate::Result<SockAddr> {
    first_addr(host, host, None)
}

pub(crate) fn resolve_host_port(host: &str, port: &str) -> crate::Result<SockAddr> {
    first_addr(&format!("{host}:{port}"), host, Some(port))
}
