//! Certificate assembly for issuance involving P-224 keys
//!
//! rcgen cannot sign with or describe a P-224 key, so whenever the CA key or
//! the leaf key is on P-224 the TBS certificate is built with `x509-cert` and
//! signed here. P-224 keys sign a SHA-256 digest truncated to the field size;
//! every other key signs through aws-lc-rs with the algorithm rcgen would
//! have used. The resulting profiles match the rcgen ones in
//! [`crate::authority`].

use std::time::Duration;

use aws_lc_rs::digest::{digest, SHA256};
use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING, ECDSA_P521_SHA512_ASN1_SIGNING, RSA_PKCS1_SHA256,
};
use p224::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::der::asn1::{BitString, GeneralizedTime, Ia5String, OctetString, SetOfVec, UtcTime};
use x509_cert::der::oid::{AssociatedOid, ObjectIdentifier};
use x509_cert::der::{Any, DateTime, Decode, Encode, Tag};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};

use crate::authority::{CertificateRequest, Subject};
use crate::keys::KeyMaterial;
use crate::scheme::EcCurve;
use crate::{PkiError, Result};

const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP224R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.33");
const PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

const SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");

fn encode_error(e: x509_cert::der::Error) -> PkiError {
    PkiError::CertificateGenerationFailed(format!("failed to encode certificate: {}", e))
}

fn parse_error(e: x509_cert::der::Error) -> PkiError {
    PkiError::ParseError(format!("failed to parse certificate: {}", e))
}

fn signing_error(e: impl std::fmt::Display) -> PkiError {
    PkiError::CertificateGenerationFailed(format!("failed to sign certificate: {}", e))
}

fn name(subject: &Subject) -> Result<Name> {
    let attributes = [
        (COUNTRY, &subject.country),
        (STATE, &subject.state),
        (LOCALITY, &subject.locality),
        (ORGANIZATION, &subject.organization),
        (ORGANIZATIONAL_UNIT, &subject.organizational_unit),
        (COMMON_NAME, &subject.common_name),
    ];
    let mut rdns = Vec::new();
    for (oid, value) in attributes {
        if value.is_empty() {
            continue;
        }
        let attribute = AttributeTypeAndValue {
            oid,
            value: Any::new(Tag::Utf8String, value.as_bytes()).map_err(encode_error)?,
        };
        rdns.push(RelativeDistinguishedName(
            SetOfVec::try_from(vec![attribute]).map_err(encode_error)?,
        ));
    }
    Ok(RdnSequence(rdns))
}

fn time(at: OffsetDateTime) -> Result<Time> {
    let secs = u64::try_from(at.unix_timestamp()).map_err(|_| {
        PkiError::CertificateGenerationFailed(format!("validity bound {} precedes 1970", at))
    })?;
    let at = DateTime::from_unix_duration(Duration::from_secs(secs)).map_err(encode_error)?;
    // RFC 5280: UTCTime through 2049, GeneralizedTime afterwards
    if at.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(at).map_err(encode_error)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(at)))
    }
}

fn null() -> Result<Any> {
    Any::new(Tag::Null, Vec::new()).map_err(encode_error)
}

fn curve_oid(curve: EcCurve) -> ObjectIdentifier {
    match curve {
        EcCurve::P224 => SECP224R1,
        EcCurve::P256 => PRIME256V1,
        EcCurve::P384 => SECP384R1,
        EcCurve::P521 => SECP521R1,
    }
}

fn public_key_info(key: &KeyMaterial) -> Result<SubjectPublicKeyInfoOwned> {
    let algorithm = match key.curve() {
        Some(curve) => AlgorithmIdentifierOwned {
            oid: EC_PUBLIC_KEY,
            parameters: Some(
                Any::new(Tag::ObjectIdentifier, curve_oid(curve).as_bytes())
                    .map_err(encode_error)?,
            ),
        },
        None => AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(null()?),
        },
    };
    Ok(SubjectPublicKeyInfoOwned {
        algorithm,
        subject_public_key: BitString::from_bytes(key.public_key_raw()).map_err(encode_error)?,
    })
}

/// Signature algorithm `key` signs with
fn signature_algorithm(key: &KeyMaterial) -> Result<AlgorithmIdentifierOwned> {
    Ok(match key.curve() {
        Some(EcCurve::P224 | EcCurve::P256) => AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA256,
            parameters: None,
        },
        Some(EcCurve::P384) => AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA384,
            parameters: None,
        },
        Some(EcCurve::P521) => AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA512,
            parameters: None,
        },
        None => AlgorithmIdentifierOwned {
            oid: SHA256_WITH_RSA,
            parameters: Some(null()?),
        },
    })
}

fn sign(key: &KeyMaterial, message: &[u8]) -> Result<Vec<u8>> {
    if let Some(signing_key) = key.p224_signing_key() {
        let prehash = digest(&SHA256, message);
        let signature: p224::ecdsa::Signature = signing_key
            .sign_prehash(prehash.as_ref())
            .map_err(signing_error)?;
        return Ok(signature.to_der().as_bytes().to_vec());
    }

    let rng = SystemRandom::new();
    let pkcs8 = key.private_key_der();
    let ecdsa: &'static EcdsaSigningAlgorithm = match key.curve() {
        Some(EcCurve::P256) => &ECDSA_P256_SHA256_ASN1_SIGNING,
        Some(EcCurve::P384) => &ECDSA_P384_SHA384_ASN1_SIGNING,
        Some(EcCurve::P521) => &ECDSA_P521_SHA512_ASN1_SIGNING,
        Some(EcCurve::P224) => return Err(signing_error("P-224 key without a signing key")),
        None => {
            let pair = RsaKeyPair::from_pkcs8(&pkcs8).map_err(signing_error)?;
            let mut signature = vec![0; pair.public_modulus_len()];
            pair.sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)
                .map_err(signing_error)?;
            return Ok(signature);
        }
    };
    let pair = EcdsaKeyPair::from_pkcs8(ecdsa, &pkcs8).map_err(signing_error)?;
    let signature = pair.sign(&rng, message).map_err(signing_error)?;
    Ok(signature.as_ref().to_vec())
}

fn extension<T: AssociatedOid + Encode>(critical: bool, value: &T) -> Result<Extension> {
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der().map_err(encode_error)?)
            .map_err(encode_error)?,
    })
}

fn ia5(value: &str, what: &str) -> Result<Ia5String> {
    Ia5String::new(value).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("invalid {} '{}': {}", what, value, e))
    })
}

fn key_identifier(id: &[u8]) -> Result<OctetString> {
    OctetString::new(id.to_vec()).map_err(encode_error)
}

struct Draft<'a> {
    issuer: Name,
    subject: Name,
    serial: &'a [u8],
    validity: (OffsetDateTime, OffsetDateTime),
    subject_key: &'a KeyMaterial,
    extensions: Vec<Extension>,
}

impl Draft<'_> {
    fn sign(self, signer: &KeyMaterial) -> Result<Vec<u8>> {
        let algorithm = signature_algorithm(signer)?;
        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(self.serial).map_err(encode_error)?,
            signature: algorithm.clone(),
            issuer: self.issuer,
            validity: Validity {
                not_before: time(self.validity.0)?,
                not_after: time(self.validity.1)?,
            },
            subject: self.subject,
            subject_public_key_info: public_key_info(self.subject_key)?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(self.extensions),
        };
        let tbs = tbs_certificate.to_der().map_err(encode_error)?;
        let signature = sign(signer, &tbs)?;

        Certificate {
            tbs_certificate,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&signature).map_err(encode_error)?,
        }
        .to_der()
        .map_err(encode_error)
    }
}

/// Self-signed root with the same profile as the rcgen root
pub(crate) fn root_certificate(
    subject: &Subject,
    email: &str,
    serial: &[u8],
    validity: (OffsetDateTime, OffsetDateTime),
    key: &KeyMaterial,
    subject_key_id: &[u8],
) -> Result<Vec<u8>> {
    let mut extensions = vec![
        extension(
            true,
            &BasicConstraints {
                ca: true,
                path_len_constraint: Some(0),
            },
        )?,
        extension(true, &KeyUsage(KeyUsages::KeyCertSign.into()))?,
    ];
    if !email.is_empty() {
        extensions.push(extension(
            false,
            &SubjectAltName(vec![GeneralName::Rfc822Name(ia5(email, "e-mail address")?)]),
        )?);
    }
    extensions.push(extension(
        false,
        &SubjectKeyIdentifier(key_identifier(subject_key_id)?),
    )?);

    let name = name(subject)?;
    Draft {
        issuer: name.clone(),
        subject: name,
        serial,
        validity,
        subject_key: key,
        extensions,
    }
    .sign(key)
}

/// TLS server leaf with the same profile as the rcgen leaf
pub(crate) fn leaf_certificate(
    request: &CertificateRequest,
    serial: &[u8],
    validity: (OffsetDateTime, OffsetDateTime),
    leaf_key: &KeyMaterial,
    ca_cert_der: &[u8],
    ca_key: &KeyMaterial,
    ca_key_id: &[u8],
) -> Result<Vec<u8>> {
    let ca = Certificate::from_der(ca_cert_der).map_err(parse_error)?;

    let mut extensions = vec![
        extension(
            true,
            &BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
        )?,
        extension(
            true,
            &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment),
        )?,
        extension(false, &ExtendedKeyUsage(vec![SERVER_AUTH]))?,
    ];

    let mut sans = request
        .dns_names()
        .map(|dns| ia5(dns, "DNS name").map(GeneralName::DnsName))
        .collect::<Result<Vec<_>>>()?;
    if let Some(email) = request.email_address() {
        sans.push(GeneralName::Rfc822Name(ia5(email, "e-mail address")?));
    }
    if !sans.is_empty() {
        extensions.push(extension(false, &SubjectAltName(sans))?);
    }

    extensions.push(extension(
        false,
        &SubjectKeyIdentifier(key_identifier(&leaf_key.subject_key_identifier())?),
    )?);
    extensions.push(extension(
        false,
        &AuthorityKeyIdentifier {
            key_identifier: Some(key_identifier(ca_key_id)?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        },
    )?);

    Draft {
        issuer: ca.tbs_certificate.subject,
        subject: name(&request.subject)?,
        serial,
        validity,
        subject_key: leaf_key,
        extensions,
    }
    .sign(ca_key)
}

/// Verify a signature made by a P-224 CA key
///
/// Returns `None` when the CA key is not on P-224.
pub(crate) fn verify_p224_signature(cert_der: &[u8], ca_cert_der: &[u8]) -> Result<Option<bool>> {
    let ca = Certificate::from_der(ca_cert_der).map_err(parse_error)?;
    let spki = &ca.tbs_certificate.subject_public_key_info;
    let on_p224 = spki.algorithm.oid == EC_PUBLIC_KEY
        && spki
            .algorithm
            .parameters
            .as_ref()
            .is_some_and(|params| params.value() == SECP224R1.as_bytes());
    if !on_p224 {
        return Ok(None);
    }

    let cert = Certificate::from_der(cert_der).map_err(parse_error)?;
    if cert.signature_algorithm.oid != ECDSA_WITH_SHA256 {
        return Ok(Some(false));
    }
    let Ok(verifying_key) =
        p224::ecdsa::VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
    else {
        return Ok(Some(false));
    };
    let Ok(signature) = p224::ecdsa::Signature::from_der(cert.signature.raw_bytes()) else {
        return Ok(Some(false));
    };

    let tbs = cert.tbs_certificate.to_der().map_err(parse_error)?;
    let prehash = digest(&SHA256, &tbs);
    Ok(Some(
        verifying_key
            .verify_prehash(prehash.as_ref(), &signature)
            .is_ok(),
    ))
}
