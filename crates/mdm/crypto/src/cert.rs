//! Certificate utilities.

use color_eyre::eyre::WrapErr as _;
use sha2::Digest as _;
use x509_parser::prelude::*;

/// Prefix of the UID subject attribute that carries a push topic.
pub const PUSH_TOPIC_PREFIX: &str = "com.apple.mgmt";

/// Object identifier of the `UID` (userId) naming attribute.
const UID_OID: &str = "0.9.2342.19200300.100.1.1";

/// Extract the push topic from a push certificate.
///
/// The topic is stored in the UID attribute of the subject with prefix "com.apple.mgmt".
pub fn extract_topic_from_cert(cert_der: &[u8]) -> color_eyre::eyre::Result<String> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).wrap_err("failed to parse certificate DER")?;

    for rdn in cert.subject().iter() {
        for attr in rdn.iter() {
            let Ok(value) = attr.attr_value().as_str() else {
                continue;
            };
            if let Some(topic) = uid_topic(&attr.attr_type().to_id_string(), value) {
                return Ok(topic);
            }
        }
    }

    color_eyre::eyre::bail!("no push topic found in certificate subject")
}

/// A subject attribute names the push topic only when it is a UID with the topic prefix.
fn uid_topic(oid: &str, value: &str) -> Option<String> {
    (oid == UID_OID && value.starts_with(PUSH_TOPIC_PREFIX)).then(|| value.to_string())
}

/// Parse a certificate from PEM format.
pub fn parse_pem_cert(pem_str: &str) -> color_eyre::eyre::Result<Vec<u8>> {
    let pem_data =
        ::pem::parse(pem_str).map_err(|e| color_eyre::eyre::eyre!("failed to parse PEM: {}", e))?;

    if pem_data.tag() != "CERTIFICATE" {
        color_eyre::eyre::bail!("PEM is not a certificate, got: {}", pem_data.tag());
    }

    Ok(pem_data.into_contents())
}

/// SHA-256 fingerprint of a DER certificate, lowercase hex.
pub fn cert_fingerprint(cert_der: &[u8]) -> String {
    format!("{:x}", sha2::Sha256::digest(cert_der))
}
