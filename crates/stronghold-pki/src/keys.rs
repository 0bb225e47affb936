//! Key material generation and PEM framing
//!
//! RSA, P-256, P-384 and P-521 keys are rcgen key pairs. rcgen has no
//! signature algorithm for P-224, so those keys are held as `p224` secret
//! keys and certificates for them are assembled in [`crate::x509`].

use aws_lc_rs::digest;
use aws_lc_rs::encoding::{AsDer, Pkcs8V1Der};
use p224::elliptic_curve::sec1::ToEncodedPoint;
use p224::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rcgen::{KeyPair, PublicKeyData, RsaKeySize, SignatureAlgorithm};

use crate::scheme::{EcCurve, KeyScheme};
use crate::{PkiError, Result};

/// PEM label for X.509 certificates
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// PEM label for PKCS#8 private keys
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// PEM label for SubjectPublicKeyInfo
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Parse a PEM block and return the DER bytes, requiring the given label
pub fn parse_pem(pem_data: &str, expected_label: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    if pem_obj.tag() != expected_label {
        return Err(PkiError::ParseError(format!(
            "unexpected PEM label {:?}, expected {:?}",
            pem_obj.tag(),
            expected_label
        )));
    }
    Ok(pem_obj.contents().to_vec())
}

/// Frame DER bytes as PEM with LF line endings
pub fn encode_pem(label: &str, der: &[u8]) -> String {
    let block = ::pem::Pem::new(label, der.to_vec());
    ::pem::encode_config(
        &block,
        ::pem::EncodeConfig::new().set_line_ending(::pem::LineEnding::LF),
    )
}

enum Inner {
    Rcgen(KeyPair),
    P224 {
        secret: p224::SecretKey,
        pkcs8: Vec<u8>,
        public_raw: Vec<u8>,
    },
}

/// A freshly generated or loaded key pair
///
/// Private material stays inside; callers get PEM/DER encodings on demand.
pub struct KeyMaterial {
    inner: Inner,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("KeyMaterial");
        match &self.inner {
            Inner::Rcgen(key_pair) => out.field("algorithm", key_pair.algorithm()),
            Inner::P224 { .. } => out.field("curve", &EcCurve::P224),
        };
        out.finish_non_exhaustive()
    }
}

/// Generate a key pair matching the scheme
pub fn generate_key_pair(scheme: KeyScheme) -> Result<KeyMaterial> {
    KeyMaterial::generate(scheme)
}

fn signature_algorithm(curve: EcCurve) -> Option<&'static SignatureAlgorithm> {
    match curve {
        EcCurve::P256 => Some(&rcgen::PKCS_ECDSA_P256_SHA256),
        EcCurve::P384 => Some(&rcgen::PKCS_ECDSA_P384_SHA384),
        EcCurve::P521 => Some(&rcgen::PKCS_ECDSA_P521_SHA512),
        EcCurve::P224 => None,
    }
}

fn rsa_key_size(bits: u32) -> Result<RsaKeySize> {
    match bits {
        2048 => Ok(RsaKeySize::_2048),
        3072 => Ok(RsaKeySize::_3072),
        4096 => Ok(RsaKeySize::_4096),
        other => Err(PkiError::config(format!(
            "unsupported RSA key size {}",
            other
        ))),
    }
}

/// rcgen stops at 4096 bits; aws-lc-rs generates the 8192-bit modulus
fn generate_rsa_8192() -> Result<KeyPair> {
    let failed = |what: &str| {
        PkiError::KeyGenerationFailed(format!("failed to generate RSA-8192 key: {}", what))
    };
    let key = aws_lc_rs::rsa::KeyPair::generate(aws_lc_rs::rsa::KeySize::Rsa8192)
        .map_err(|_| failed("key generation"))?;
    let pkcs8: Pkcs8V1Der<'static> = key.as_der().map_err(|_| failed("PKCS#8 encoding"))?;
    KeyPair::from_pem(&encode_pem(PRIVATE_KEY_LABEL, pkcs8.as_ref()))
        .map_err(|e| failed(&e.to_string()))
}

fn p224_inner(secret: p224::SecretKey) -> Result<Inner> {
    let pkcs8 = secret
        .to_pkcs8_der()
        .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to encode P-224 key: {}", e)))?
        .as_bytes()
        .to_vec();
    let public_raw = secret
        .public_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();
    Ok(Inner::P224 {
        secret,
        pkcs8,
        public_raw,
    })
}

impl KeyMaterial {
    /// Generate a new key pair for the scheme
    pub fn generate(scheme: KeyScheme) -> Result<Self> {
        let inner = match scheme {
            KeyScheme::EllipticCurve {
                curve: EcCurve::P224,
            } => p224_inner(p224::SecretKey::random(&mut rand::rngs::OsRng))?,
            KeyScheme::EllipticCurve { curve } => {
                let alg = signature_algorithm(curve).ok_or_else(|| {
                    PkiError::config(format!("no signature algorithm for {}", curve))
                })?;
                Inner::Rcgen(KeyPair::generate_for(alg).map_err(|e| {
                    PkiError::KeyGenerationFailed(format!(
                        "failed to generate {} key: {}",
                        curve, e
                    ))
                })?)
            }
            KeyScheme::Rsa { key_size_bits: 8192 } => Inner::Rcgen(generate_rsa_8192()?),
            KeyScheme::Rsa { key_size_bits } => {
                let size = rsa_key_size(key_size_bits)?;
                Inner::Rcgen(
                    KeyPair::generate_rsa_for(&rcgen::PKCS_RSA_SHA256, size).map_err(|e| {
                        PkiError::KeyGenerationFailed(format!(
                            "failed to generate RSA-{} key: {}",
                            key_size_bits, e
                        ))
                    })?,
                )
            }
        };
        Ok(Self { inner })
    }

    /// Load a PKCS#8 private key from PEM
    pub fn from_pem(key_pem: &str) -> Result<Self> {
        // Reject other labels (e.g. "EC PRIVATE KEY") before handing off
        let der = parse_pem(key_pem, PRIVATE_KEY_LABEL)?;
        if let Ok(secret) = p224::SecretKey::from_pkcs8_der(&der) {
            return Ok(Self {
                inner: p224_inner(secret)?,
            });
        }
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse private key: {}", e)))?;
        Ok(Self {
            inner: Inner::Rcgen(key_pair),
        })
    }

    /// The rcgen key pair, `None` for P-224 keys
    pub(crate) fn rcgen_key(&self) -> Option<&KeyPair> {
        match &self.inner {
            Inner::Rcgen(key_pair) => Some(key_pair),
            Inner::P224 { .. } => None,
        }
    }

    /// ECDSA signing key for a P-224 key
    pub(crate) fn p224_signing_key(&self) -> Option<p224::ecdsa::SigningKey> {
        match &self.inner {
            Inner::P224 { secret, .. } => Some(p224::ecdsa::SigningKey::from(secret)),
            Inner::Rcgen(_) => None,
        }
    }

    /// Curve of an ECDSA key, `None` for RSA
    pub fn curve(&self) -> Option<EcCurve> {
        let alg = match &self.inner {
            Inner::P224 { .. } => return Some(EcCurve::P224),
            Inner::Rcgen(key_pair) => key_pair.algorithm(),
        };
        if alg == &rcgen::PKCS_ECDSA_P256_SHA256 {
            Some(EcCurve::P256)
        } else if alg == &rcgen::PKCS_ECDSA_P384_SHA384 {
            Some(EcCurve::P384)
        } else if alg == &rcgen::PKCS_ECDSA_P521_SHA512 {
            Some(EcCurve::P521)
        } else {
            None
        }
    }

    /// Whether this is an RSA key
    pub fn is_rsa(&self) -> bool {
        matches!(&self.inner, Inner::Rcgen(key_pair) if key_pair.algorithm() == &rcgen::PKCS_RSA_SHA256)
    }

    /// PKCS#8 DER encoding of the private key
    pub fn private_key_der(&self) -> Vec<u8> {
        match &self.inner {
            Inner::Rcgen(key_pair) => key_pair.serialize_der(),
            Inner::P224 { pkcs8, .. } => pkcs8.clone(),
        }
    }

    /// PKCS#8 PEM encoding of the private key
    pub fn private_key_pem(&self) -> String {
        encode_pem(PRIVATE_KEY_LABEL, &self.private_key_der())
    }

    /// Raw public key, i.e. the SubjectPublicKeyInfo BIT STRING contents
    pub fn public_key_raw(&self) -> &[u8] {
        match &self.inner {
            Inner::Rcgen(key_pair) => key_pair.der_bytes(),
            Inner::P224 { public_raw, .. } => public_raw,
        }
    }

    /// Subject Key Identifier: SHA-1 over the raw public key
    pub fn subject_key_identifier(&self) -> Vec<u8> {
        subject_key_identifier(self.public_key_raw())
    }
}

/// SHA-1 of the public key bits, as in RFC 5280 section 4.2.1.2 method (1)
pub fn subject_key_identifier(public_key_raw: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, public_key_raw)
        .as_ref()
        .to_vec()
}
