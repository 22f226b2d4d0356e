//! MDM signature verification.
//!
//! The `Mdm-Signature` header carries a base64-encoded detached CMS signature
//! over the request body. Verification is delegated to an external program
//! that prints the signer certificate; the signer is then checked against the
//! trusted CA.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt as _;
use x509_parser::prelude::*;

/// Default time allowed for the external verifier.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(3);

/// Identity verification failures.
///
/// [`IdentityError::Unavailable`] means the verifier itself could not run;
/// every other variant means the caller is not trusted.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("signature verifier unavailable: {0}")]
    Unavailable(String),

    #[error("signature verifier failed: {0}")]
    Verifier(String),

    #[error("signature verifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid signer certificate")]
    InvalidCertificate(#[source] color_eyre::eyre::Report),

    #[error("signer certificate was not issued by the trusted CA")]
    Untrusted,
}

/// Verifies a request signature and returns the signer certificate (DER).
#[trait_variant::make(Send)]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, signature: &str, body: &[u8]) -> Result<Vec<u8>, IdentityError>;
}

/// Runs an external program to verify the signature.
///
/// The program receives the signature as its only argument and the body on
/// stdin, and prints the PEM signer certificate on stdout.
#[derive(Debug, Clone)]
pub struct ScriptVerifier {
    program: PathBuf,
    timeout: Duration,
}

impl ScriptVerifier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, signature: &str, body: &[u8]) -> Result<std::process::Output, IdentityError> {
        let mut child = tokio::process::Command::new(&self.program)
            .arg(signature)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                IdentityError::Unavailable(format!("spawn {}: {e}", self.program.display()))
            })?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                // the program may exit without reading stdin
                if let Err(e) = stdin.write_all(body).await {
                    tracing::debug!(error = %e, "verifier closed stdin early");
                }
            }
        };

        let ((), output) = tokio::join!(write, child.wait_with_output());
        output.map_err(|e| IdentityError::Unavailable(e.to_string()))
    }
}

impl IdentityVerifier for ScriptVerifier {
    async fn verify(&self, signature: &str, body: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let output = tokio::time::timeout(self.timeout, self.run(signature, body))
            .await
            .map_err(|_| IdentityError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IdentityError::Verifier(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pem = String::from_utf8_lossy(&output.stdout);
        crate::parse_pem_cert(&pem).map_err(IdentityError::InvalidCertificate)
    }
}

/// Trusted CA for device identity certificates.
#[derive(Debug, Clone)]
pub struct CaTrust {
    ca_der: Vec<u8>,
}

impl CaTrust {
    /// Load a CA from PEM.
    pub fn from_pem(pem: &str) -> color_eyre::eyre::Result<Self> {
        let ca_der = crate::parse_pem_cert(pem)?;
        X509Certificate::from_der(&ca_der)
            .map_err(|e| color_eyre::eyre::eyre!("failed to parse CA certificate: {e}"))?;
        Ok(Self { ca_der })
    }

    /// Check that `cert_der` was signed by this CA.
    pub fn verify_cert(&self, cert_der: &[u8]) -> Result<(), IdentityError> {
        let (_, ca) = X509Certificate::from_der(&self.ca_der).map_err(|e| {
            IdentityError::InvalidCertificate(color_eyre::eyre::eyre!("CA certificate: {e}"))
        })?;
        let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| {
            IdentityError::InvalidCertificate(color_eyre::eyre::eyre!("signer certificate: {e}"))
        })?;

        cert.verify_signature(Some(ca.public_key()))
            .map_err(|_| IdentityError::Untrusted)
    }
}

/// A verifier whose signers must also chain to a trusted CA.
#[derive(Debug, Clone)]
pub struct TrustedVerifier<V> {
    inner: V,
    ca: Option<CaTrust>,
}

impl<V> TrustedVerifier<V> {
    pub fn new(inner: V, ca: Option<CaTrust>) -> Self {
        if ca.is_none() {
            tracing::warn!("no identity CA configured; signer certificates are not checked");
        }
        Self { inner, ca }
    }
}

impl<V: IdentityVerifier> IdentityVerifier for TrustedVerifier<V> {
    async fn verify(&self, signature: &str, body: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let signer = self.inner.verify(signature, body).await?;
        if let Some(ca) = &self.ca {
            ca.verify_cert(&signer)?;
        }
        Ok(signer)
    }
}
