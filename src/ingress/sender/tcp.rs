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

//! ILP/TCP transport: socket setup, optional TLS and the ECDSA
//! challenge/response handshake.

use crate::error;
use crate::gai;
use crate::ingress::conf::{AuthParams, EcdsaAuthParams};
use crate::ingress::sender::ConnectParams;
use crate::ingress::tls::configure_tls;
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use rustls::{ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::time::Duration;
use tracing::debug;

/// Length of one P-256 coordinate.
const COORD_LEN: usize = 32;

const KEY_HINT: &str = "Hint: Check the keys for a possible typo.";

fn socket_err(context: &str, io_err: io::Error) -> crate::Error {
    error::fmt!(SocketError, "{context}: {io_err}")
}

/// Open stream to the server, in the clear or wrapped in TLS.
pub(crate) enum TcpLink {
    Plain(Socket),
    Tls(Box<StreamOwned<ClientConnection, Socket>>),
}

impl TcpLink {
    fn raw(&self) -> &Socket {
        match self {
            TcpLink::Plain(sock) => sock,
            TcpLink::Tls(stream) => stream.get_ref(),
        }
    }

    /// Read one `\n`-terminated line, without the terminator.
    fn read_line(&mut self) -> crate::Result<Vec<u8>> {
        let mut line = Vec::new();
        BufReader::new(&mut *self)
            .read_until(b'\n', &mut line)
            .map_err(|e| socket_err("Failed to read authentication challenge (timed out?)", e))?;
        match line.pop() {
            Some(b'\n') => Ok(line),
            None => Err(error::fmt!(
                AuthError,
                "Did not receive auth challenge. \
                Is the database configured to require authentication?"
            )),
            Some(last) => {
                line.push(last);
                Err(error::fmt!(
                    AuthError,
                    "Received incomplete auth challenge: {line:?}"
                ))
            }
        }
    }

    fn write_line(&mut self, what: &str, line: &str) -> crate::Result<()> {
        self.write_all(line.as_bytes())
            .and_then(|()| self.write_all(b"\n"))
            .map_err(|e| socket_err(what, e))
    }

    fn authenticate(&mut self, auth: &EcdsaAuthParams) -> crate::Result<()> {
        if auth.key_id.contains('\n') {
            return Err(error::fmt!(
                AuthError,
                "Bad key id {:?}: Should not contain new-line char.",
                auth.key_id
            ));
        }
        let signer = Signer::from_params(auth)?;
        self.write_line("Failed to send key_id", &auth.key_id)?;
        let challenge = self.read_line()?;
        let signature = signer.sign(&challenge)?;
        self.write_line("Could not send signed challenge", &signature)?;
        debug!(key_id = %auth.key_id, "authenticated");
        Ok(())
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TcpLink::Plain(sock) => sock.read(buf),
            TcpLink::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TcpLink::Plain(sock) => sock.write(buf),
            TcpLink::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TcpLink::Plain(sock) => sock.flush(),
            TcpLink::Tls(stream) => stream.flush(),
        }
    }
}

// Half-close so the server reads everything written before the drop.
impl Drop for TcpLink {
    fn drop(&mut self) {
        if let TcpLink::Tls(stream) = self {
            stream.conn.send_close_notify();
            let _ = stream.flush();
        }
        let _ = self.raw().shutdown(Shutdown::Write);
    }
}

/// P-256 key pair decoded from the `token`/`token_x`/`token_y` settings.
struct Signer {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl Signer {
    fn from_params(auth: &EcdsaAuthParams) -> crate::Result<Self> {
        let private_key = decode_key("private authentication key", &auth.priv_key)?;
        let x = decode_key("public key x", &auth.pub_key_x)?;
        let y = decode_key("public key y", &auth.pub_key_y)?;
        let public_key = sec1_point(&x, &y)?;
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_private_key_and_public_key(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            &private_key,
            &public_key,
            &rng,
        )
        .map_err(|rejected| {
            error::fmt!(
                AuthError,
                "Misconfigured ILP authentication keys: {rejected}. {KEY_HINT}"
            )
        })?;
        Ok(Signer { key_pair, rng })
    }

    /// Base64-encoded signature of `challenge`.
    fn sign(&self, challenge: &[u8]) -> crate::Result<String> {
        let signature = self
            .key_pair
            .sign(&self.rng, challenge)
            .map_err(|e| error::fmt!(AuthError, "Failed to sign challenge: {e}"))?;
        Ok(Base64::encode_string(signature.as_ref()))
    }
}

fn decode_key(descr: &str, encoded: &str) -> crate::Result<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(encoded).map_err(|b64_err| {
        error::fmt!(
            AuthError,
            "Misconfigured ILP authentication keys. Could not decode {descr}: {b64_err}. {KEY_HINT}"
        )
    })
}

/// Uncompressed SEC1 point: `0x04 || X || Y`, coordinates left-padded with
/// zeros.
fn sec1_point(x: &[u8], y: &[u8]) -> crate::Result<[u8; 1 + 2 * COORD_LEN]> {
    let mut point = [0u8; 1 + 2 * COORD_LEN];
    point[0] = 0x04;
    for (name, coord, end) in [("x", x, 1 + COORD_LEN), ("y", y, point.len())] {
        if coord.len() > COORD_LEN {
            return Err(error::fmt!(
                AuthError,
                "Misconfigured ILP authentication keys. Public key {name} is too long. {KEY_HINT}"
            ));
        }
        point[end - coord.len()..end].copy_from_slice(coord);
    }
    Ok(point)
}

fn new_socket() -> crate::Result<Socket> {
    let sock = Socket::new(Domain::IPV4, Type::STREAM, Some(SockProtocol::TCP))
        .map_err(|e| socket_err("Could not open TCP socket", e))?;
    sock.set_reuse_address(true)
        .map_err(|e| socket_err("Could not set SO_REUSEADDR", e))?;
    sock.set_linger(Some(Duration::from_secs(120)))
        .map_err(|e| socket_err("Could not set socket linger", e))?;
    sock.set_keepalive(true)
        .map_err(|e| socket_err("Could not set SO_KEEPALIVE", e))?;
    sock.set_nodelay(true)
        .map_err(|e| socket_err("Could not set TCP_NODELAY", e))?;
    Ok(sock)
}

fn wrap_tls(
    mut sock: Socket,
    host: &str,
    tls: &crate::ingress::tls::TlsSettings,
    timeout: Duration,
) -> crate::Result<TcpLink> {
    let server_name = ServerName::try_from(host)
        .map_err(|e| error::fmt!(TlsError, "Bad host: {e}"))?
        .to_owned();
    let mut session = ClientConnection::new(configure_tls(tls)?, server_name)
        .map_err(|e| error::fmt!(TlsError, "Could not create TLS client: {e}"))?;
    while session.is_handshaking() || session.wants_write() {
        session.complete_io(&mut sock).map_err(|io_err| {
            if matches!(io_err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
                error::fmt!(
                    TlsError,
                    "Failed to complete TLS handshake: \
                    Timed out waiting for server response after {timeout:?}."
                )
            } else {
                error::fmt!(TlsError, "Failed to complete TLS handshake: {io_err}")
            }
        })?;
    }
    debug!(host, "TLS handshake complete");
    Ok(TcpLink::Tls(Box::new(StreamOwned::new(session, sock))))
}

/// Connect, then run the TLS and authentication handshakes the parameters
/// ask for.
pub(crate) fn open(params: &ConnectParams) -> crate::Result<TcpLink> {
    let (host, port) = (params.host.as_str(), params.port.as_str());
    let addr = gai::resolve_host_port(host, port)?;
    let sock = new_socket()?;
    if let Some(interface) = params.net_interface.as_deref() {
        let local = gai::resolve_host(interface)?;
        sock.bind(&local).map_err(|e| {
            socket_err(
                &format!("Could not bind to interface address {interface:?}"),
                e,
            )
        })?;
    }
    sock.connect(&addr)
        .map_err(|e| socket_err(&format!("Could not connect to \"{host}:{port}\""), e))?;
    debug!(host, port, "TCP connection open");

    // Applies to both handshakes.
    sock.set_read_timeout(Some(params.auth_timeout))
        .map_err(|e| socket_err("Failed to set read timeout on socket", e))?;

    let mut link = match params.tls.as_ref() {
        Some(tls) => wrap_tls(sock, host, tls, params.auth_timeout)?,
        None => TcpLink::Plain(sock),
    };
    if let Some(AuthParams::Ecdsa(auth)) = params.auth.as_ref() {
        link.authenticate(auth)?;
    }
    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn sec1_point_pads_short_coordinates() {
        let point = sec1_point(&[1, 2], &[3]).unwrap();
        assert_eq!(point[0], 0x04);
        assert_eq!(&point[31..33], &[1, 2]);
        assert!(point[1..31].iter().all(|&b| b == 0));
        assert_eq!(point[64], 3);
        assert!(point[33..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn sec1_point_rejects_long_coordinate() {
        let err = sec1_point(&[0; 32], &[0; 33]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthError);
        assert!(err.msg().contains("Public key y is too long"), "{}", err.msg());
    }
}
