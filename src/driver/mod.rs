//! TLS handshake driver
//!
//! Performs exactly one TLS 1.3 handshake per call against the configured
//! endpoint, with the key-exchange group pinned to a single named group, and
//! reports wall-clock elapsed time from connection-open to handshake-complete.
//! Failures are captured as trial data, never as errors: one refused
//! connection or TLS alert must not unwind a whole sampling campaign.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::crypto::{aws_lc_rs, CryptoProvider, SupportedKxGroup, WebPkiSupportedAlgorithms};
use rustls::pki_types::ServerName;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Key-exchange groups the embedded stack can pin.
///
/// `X25519MLKEM768` and `MLKEM768` come from the aws-lc-rs provider; the
/// hybrid combines X25519 with the ML-KEM-768 KEM so the exchange stays
/// secure if either component remains unbroken.
pub const SUPPORTED_GROUPS: &[&str] = &[
    "X25519",
    "secp256r1",
    "secp384r1",
    "MLKEM768",
    "X25519MLKEM768",
];

/// Why a handshake trial failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// TCP connect was refused by the endpoint
    ConnectionRefused,
    /// The per-trial timeout fired before the handshake completed
    Timeout,
    /// The peer would not negotiate the pinned group
    GroupRejected,
    /// The peer sent a fatal TLS alert during the handshake
    TlsAlert(String),
    /// Any other transport-level failure
    Io(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConnectionRefused => write!(f, "connection refused"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::GroupRejected => write!(f, "group rejected by peer"),
            FailureReason::TlsAlert(desc) => write!(f, "TLS alert: {}", desc),
            FailureReason::Io(msg) => write!(f, "IO: {}", msg),
        }
    }
}

/// Outcome of one handshake trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialOutcome {
    Success,
    Failure(FailureReason),
}

/// One recorded handshake attempt. Immutable once created.
#[derive(Debug, Clone)]
pub struct HandshakeTrial {
    /// Campaign configuration this trial belongs to
    pub configuration_id: String,
    /// Key-exchange group that was pinned for the ClientHello
    pub group_name: String,
    /// Wall-clock time the attempt started
    pub start_timestamp: DateTime<Utc>,
    /// Connection-open to handshake-complete (teardown excluded)
    pub elapsed: Duration,
    pub outcome: TrialOutcome,
}

impl HandshakeTrial {
    pub fn is_success(&self) -> bool {
        self.outcome == TrialOutcome::Success
    }

    /// Elapsed time in milliseconds at full sub-millisecond resolution
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Seam between the sampling controller and whatever issues handshakes.
///
/// Retry or backoff behavior belongs in a wrapper implementing this trait,
/// never inside the driver itself: a retried trial's latency must not merge
/// with a fresh one.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issue exactly one handshake attempt and record it as a trial.
    async fn probe(
        &self,
        configuration_id: &str,
        group_name: &str,
        deadline: Duration,
    ) -> HandshakeTrial;
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Endpoint as host:port
    pub target: String,
    /// Server name for SNI; defaults to the target host
    pub sni: Option<String>,
    /// Groups the driver must be able to pin
    pub groups: Vec<String>,
    /// Optional PEM file with additional trust anchors (lab CAs)
    pub ca_certificate: Option<PathBuf>,
    /// Accept any server certificate (lab endpoints with throwaway certs)
    pub skip_cert_verify: bool,
}

/// Issues single TLS 1.3 handshakes with a pinned key-exchange group.
///
/// One rustls `ClientConfig` is prebuilt per group at construction so that
/// per-trial work is exactly: TCP connect, handshake, close.
pub struct HandshakeDriver {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    connectors: HashMap<String, TlsConnector>,
}

impl HandshakeDriver {
    pub fn new(config: &DriverConfig) -> Result<Self> {
        let (host, port) = split_target(&config.target)?;

        let sni = config.sni.as_deref().unwrap_or(&host);
        let server_name: ServerName<'static> = sni
            .to_string()
            .try_into()
            .map_err(|_| Error::tls(format!("invalid server name: {}", sni)))?;

        let roots = build_root_store(config.ca_certificate.as_deref())?;

        let mut connectors = HashMap::new();
        for group in &config.groups {
            let kx = lookup_kx_group(group)?;
            let tls_config =
                build_pinned_client_config(kx, roots.clone(), config.skip_cert_verify)?;
            connectors.insert(group.clone(), TlsConnector::from(Arc::new(tls_config)));
            debug!("prepared TLS config for group {}", group);
        }

        Ok(HandshakeDriver {
            host,
            port,
            server_name,
            connectors,
        })
    }

    /// Perform exactly one handshake against the configured endpoint with
    /// the given group pinned, and record it as a trial.
    ///
    /// Never fails: refused connections, timeouts and TLS alerts all come
    /// back as `Failure` outcomes so a sampling run keeps going.
    pub async fn perform_handshake(
        &self,
        configuration_id: &str,
        group_name: &str,
        deadline: Duration,
    ) -> HandshakeTrial {
        let start_timestamp = Utc::now();
        let started = Instant::now();

        let outcome = match self.connectors.get(group_name) {
            None => {
                // Driver construction validates groups; reaching this means a
                // configuration/driver mismatch, which is still trial data.
                TrialOutcome::Failure(FailureReason::Io(format!(
                    "no TLS config prepared for group {}",
                    group_name
                )))
            }
            Some(connector) => match timeout(deadline, self.attempt(connector)).await {
                Ok(Ok(elapsed)) => {
                    trace!(
                        "{}: handshake ok in {:.2}ms",
                        group_name,
                        elapsed.as_secs_f64() * 1000.0
                    );
                    return HandshakeTrial {
                        configuration_id: configuration_id.to_string(),
                        group_name: group_name.to_string(),
                        start_timestamp,
                        elapsed,
                        outcome: TrialOutcome::Success,
                    };
                }
                Ok(Err(reason)) => TrialOutcome::Failure(reason),
                // Dropping the future force-closes the in-flight connection.
                Err(_) => TrialOutcome::Failure(FailureReason::Timeout),
            },
        };

        HandshakeTrial {
            configuration_id: configuration_id.to_string(),
            group_name: group_name.to_string(),
            start_timestamp,
            elapsed: started.elapsed(),
            outcome,
        }
    }

    /// One TCP connect + TLS handshake, timed. Returns the elapsed time on
    /// success; classifies the failure otherwise. The stream is dropped only
    /// after the clock stops, so teardown never pollutes the measurement.
    async fn attempt(&self, connector: &TlsConnector) -> std::result::Result<Duration, FailureReason> {
        let started = Instant::now();

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| classify_io_error(&e))?;
        let _ = stream.set_nodelay(true);

        let tls_stream = connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| classify_handshake_error(&e))?;

        let elapsed = started.elapsed();
        drop(tls_stream);
        Ok(elapsed)
    }
}

#[async_trait]
impl Prober for HandshakeDriver {
    async fn probe(
        &self,
        configuration_id: &str,
        group_name: &str,
        deadline: Duration,
    ) -> HandshakeTrial {
        self.perform_handshake(configuration_id, group_name, deadline)
            .await
    }
}

/// Map a group name onto the aws-lc-rs implementation.
fn lookup_kx_group(name: &str) -> Result<&'static dyn SupportedKxGroup> {
    match name {
        "X25519" => Ok(aws_lc_rs::kx_group::X25519),
        "secp256r1" => Ok(aws_lc_rs::kx_group::SECP256R1),
        "secp384r1" => Ok(aws_lc_rs::kx_group::SECP384R1),
        "MLKEM768" => Ok(aws_lc_rs::kx_group::MLKEM768),
        "X25519MLKEM768" => Ok(aws_lc_rs::kx_group::X25519MLKEM768),
        other => Err(Error::unsupported(format!(
            "unknown key-exchange group '{}' (supported: {})",
            other,
            SUPPORTED_GROUPS.join(", ")
        ))),
    }
}

fn split_target(target: &str) -> Result<(String, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("target must be host:port, got '{}'", target)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config(format!("invalid port in target '{}'", target)))?;
    if host.is_empty() {
        return Err(Error::config("target host is empty"));
    }
    Ok((host.to_string(), port))
}

fn build_root_store(ca_certificate: Option<&std::path::Path>) -> Result<rustls::RootCertStore> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_certificate {
        let pem = std::fs::read(path)?;
        let mut added = 0;
        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            let cert = cert.map_err(|e| Error::parse(format!("bad CA PEM: {}", e)))?;
            roots
                .add(cert)
                .map_err(|e| Error::tls(format!("rejected CA certificate: {}", e)))?;
            added += 1;
        }
        if added == 0 {
            return Err(Error::config(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
        debug!("loaded {} extra trust anchor(s) from {}", added, path.display());
    }

    Ok(roots)
}

/// Build a TLS 1.3-only client config whose provider offers exactly one
/// key-exchange group, so the ClientHello cannot negotiate anything else.
fn build_pinned_client_config(
    kx: &'static dyn SupportedKxGroup,
    roots: rustls::RootCertStore,
    skip_cert_verify: bool,
) -> Result<rustls::ClientConfig> {
    let provider = CryptoProvider {
        kx_groups: vec![kx],
        ..aws_lc_rs::default_provider()
    };
    let verify_algorithms = provider.signature_verification_algorithms;

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let mut config = if skip_cert_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(verify_algorithms)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    // Resumption would let later handshakes skip the key exchange under
    // measurement, so every trial must run the full handshake.
    config.resumption = rustls::client::Resumption::disabled();
    Ok(config)
}

/// Certificate verifier for lab endpoints with throwaway certificates.
/// Chain validation is skipped; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert(WebPkiSupportedAlgorithms);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.supported_schemes()
    }
}

fn classify_io_error(e: &io::Error) -> FailureReason {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => FailureReason::ConnectionRefused,
        io::ErrorKind::TimedOut => FailureReason::Timeout,
        _ => FailureReason::Io(e.to_string()),
    }
}

/// tokio-rustls surfaces handshake failures as `io::Error` wrapping a
/// `rustls::Error`; unwrap it to keep the negotiation diagnostics.
fn classify_handshake_error(e: &io::Error) -> FailureReason {
    if let Some(inner) = e.get_ref() {
        if let Some(tls) = inner.downcast_ref::<rustls::Error>() {
            return match tls {
                rustls::Error::AlertReceived(alert) => match alert {
                    rustls::AlertDescription::HandshakeFailure
                    | rustls::AlertDescription::InsufficientSecurity => {
                        FailureReason::GroupRejected
                    }
                    other => FailureReason::TlsAlert(format!("{:?}", other)),
                },
                rustls::Error::PeerIncompatible(_) => FailureReason::GroupRejected,
                other => FailureReason::TlsAlert(other.to_string()),
            };
        }
    }
    classify_io_error(e)
}
