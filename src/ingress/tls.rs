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

use crate::error::{fmt, Result};
use crate::ingress::CertificateAuthority;
use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

type Certs = Vec<CertificateDer<'static>>;

#[cfg(feature = "insecure-skip-verify")]
mod unverified {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};
    use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

    /// Accepts any server certificate. Only reachable with `tls_verify=unsafe_off`.
    #[derive(Debug)]
    pub(super) struct AcceptAnyCert;

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _: &CertificateDer<'_>,
            _: &[CertificateDer<'_>],
            _: &ServerName<'_>,
            _: &[u8],
            _: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(feature = "tls-native-certs")]
fn os_roots() -> Result<Certs> {
    let loaded = rustls_native_certs::load_native_certs();
    if let Some(first) = loaded.errors.first() {
        return Err(fmt!(
            TlsError,
            "Could not load OS native TLS certificates: {first} ({} error(s) total)",
            loaded.errors.len()
        ));
    }
    if loaded.certs.is_empty() {
        return Err(fmt!(TlsError, "No certificates found in the OS native root store"));
    }
    Ok(loaded.certs)
}

fn pem_roots(path: &Path) -> Result<Certs> {
    let file = std::fs::File::open(path).map_err(|e| {
        fmt!(
            TlsError,
            "Could not open tls_roots certificate authority file from path {path:?}: {e}"
        )
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Certs>>()
        .map_err(|e| {
            fmt!(
                TlsError,
                "Could not read certificate authority file from path {path:?}: {e}"
            )
        })?;
    if certs.is_empty() {
        return Err(fmt!(
            TlsError,
            "No certificates found in certificate authority file {path:?}"
        ));
    }
    Ok(certs)
}

/// Resolved TLS trust settings, shared by the TCP and HTTP transports.
///
/// PEM files are read when the sender is built, so a bad path fails early.
/// OS roots are loaded lazily on each connect.
#[derive(Debug, Clone)]
pub(crate) struct TlsSettings {
    verify: bool,
    webpki: bool,
    os: bool,
    pem: Certs,
}

impl TlsSettings {
    /// `None` when TLS is disabled.
    pub(crate) fn build(
        enabled: bool,
        verify: bool,
        ca: CertificateAuthority,
        roots: Option<&Path>,
    ) -> Result<Option<Self>> {
        if !enabled {
            return Ok(None);
        }
        let mut settings = TlsSettings {
            verify: true,
            webpki: false,
            os: false,
            pem: Vec::new(),
        };
        if !verify {
            #[cfg(feature = "insecure-skip-verify")]
            {
                settings.verify = false;
                return Ok(Some(settings));
            }
        }
        let ca_name = match ca {
            #[cfg(feature = "tls-webpki-certs")]
            CertificateAuthority::WebpkiRoots => {
                settings.webpki = true;
                "webpki_roots"
            }
            #[cfg(feature = "tls-native-certs")]
            CertificateAuthority::OsRoots => {
                settings.os = true;
                "os_roots"
            }
            #[cfg(all(feature = "tls-webpki-certs", feature = "tls-native-certs"))]
            CertificateAuthority::WebpkiAndOsRoots => {
                settings.webpki = true;
                settings.os = true;
                "webpki_and_os_roots"
            }
            CertificateAuthority::PemFile => {
                let path = roots.ok_or_else(|| {
                    fmt!(
                        ConfigError,
                        "Config parameter \"tls_roots\" is required when \"tls_ca\" is set to \"pem_file\"."
                    )
                })?;
                settings.pem = pem_roots(path)?;
                return Ok(Some(settings));
            }
        };
        if roots.is_some() {
            return Err(fmt!(
                ConfigError,
                "Config parameter \"tls_roots\" must be unset when \"tls_ca\" is set to {ca_name:?}."
            ));
        }
        Ok(Some(settings))
    }

    /// Certificates from the OS store and PEM file. Webpki roots are added
    /// by each transport in its own way.
    fn extra_roots(&self) -> Result<Certs> {
        let mut certs = self.pem.clone();
        #[cfg(feature = "tls-native-certs")]
        if self.os {
            certs.extend(os_roots()?);
        }
        Ok(certs)
    }
}

/// Client configuration for ILP over TCP.
pub(crate) fn configure_tls(tls: &TlsSettings) -> Result<Arc<rustls::ClientConfig>> {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| fmt!(TlsError, "Bad protocol version selection: {e}"))?;

    let mut config = if tls.verify {
        let mut store = RootCertStore::empty();
        #[cfg(feature = "tls-webpki-certs")]
        if tls.webpki {
            store.roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        let (_, invalid) = store.add_parsable_certificates(tls.extra_roots()?);
        if store.is_empty() {
            return Err(fmt!(
                TlsError,
                "No valid root certificates found ({invalid} were invalid)"
            ));
        }
        builder.with_root_certificates(store).with_no_client_auth()
    } else {
        skip_verification(builder)?
    };

    // SSLKEYLOGFILE
    config.key_log = Arc::new(rustls::KeyLogFile::new());
    Ok(Arc::new(config))
}

#[cfg(feature = "insecure-skip-verify")]
fn skip_verification(
    builder: rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier>,
) -> Result<rustls::ClientConfig> {
    Ok(builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(unverified::AcceptAnyCert))
        .with_no_client_auth())
}

#[cfg(not(feature = "insecure-skip-verify"))]
fn skip_verification(
    _: rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier>,
) -> Result<rustls::ClientConfig> {
    Err(fmt!(TlsError, "TLS verification can't be disabled"))
}

/// TLS configuration for ILP over HTTP.
pub(crate) fn configure_http_tls(tls: &TlsSettings) -> Result<ureq::tls::TlsConfig> {
    use ureq::tls::{Certificate, RootCerts, TlsConfig, TlsProvider};

    let builder = TlsConfig::builder().provider(TlsProvider::Rustls);
    if !tls.verify {
        return Ok(builder.disable_verification(true).build());
    }
    let roots = match (tls.webpki, tls.os) {
        (true, true) => {
            return Err(fmt!(
                ConfigError,
                "\"tls_ca=webpki_and_os_roots\" is not supported for ILP over HTTP. \
                Use either \"webpki_roots\" or \"os_roots\"."
            ))
        }
        (true, false) => RootCerts::WebPki,
        _ => {
            let certs: Vec<Certificate<'static>> = tls
                .extra_roots()?
                .iter()
                .map(|der| Certificate::from_der(der.as_ref()).to_owned())
                .collect();
            RootCerts::Specific(Arc::new(certs))
        }
    };
    Ok(builder.root_certs(roots).build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use std::io::Write;

    #[test]
    fn disabled_yields_nothing() {
        let tls = TlsSettings::build(false, true, CertificateAuthority::PemFile, None).unwrap();
        assert!(tls.is_none());
    }

    #[test]
    fn pem_file_needs_path() {
        let err = TlsSettings::build(true, true, CertificateAuthority::PemFile, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigError);
        assert!(err.msg().contains("\"tls_roots\" is required"), "{}", err.msg());
    }

    #[test]
    fn empty_pem_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        let err = TlsSettings::build(true, true, CertificateAuthority::PemFile, Some(file.path()))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TlsError);
        assert!(err.msg().starts_with("No certificates found"), "{}", err.msg());
    }

    #[cfg(feature = "tls-webpki-certs")]
    #[test]
    fn webpki_rejects_roots_path() {
        let err = TlsSettings::build(
            true,
            true,
            CertificateAuthority::WebpkiRoots,
            Some(Path::new("ca.pem")),
        )
        .unwrap_err();
        assert_eq!(
            err.msg(),
            "Config parameter \"tls_roots\" must be unset when \"tls_ca\" is set to \"webpki_roots\"."
        );
    }

    #[cfg(feature = "insecure-skip-verify")]
    #[test]
    fn skip_verify_builds_both_configs() {
        let tls = TlsSettings::build(true, false, CertificateAuthority::PemFile, None)
            .unwrap()
            .unwrap();
        assert!(configure_tls(&tls).is_ok());
        assert!(configure_http_tls(&tls).is_ok());
    }
}
