//! Asymmetric key scheme selection
//!
//! Legacy configuration files select the scheme with a pair of flags
//! (`rsa`, `ec`). They are folded into a single [`KeyScheme`] exactly once;
//! "both set", "neither set", unknown curves and unsupported sizes are
//! rejected here, before anything touches the filesystem.

use std::fmt;
use std::str::FromStr;

use crate::{PkiError, Result};

/// RSA modulus sizes the key-generation primitive accepts
pub const SUPPORTED_RSA_KEY_SIZES: [u32; 4] = [2048, 3072, 4096, 8192];

/// Named NIST curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    /// secp224r1
    P224,
    /// secp256r1 / prime256v1
    P256,
    /// secp384r1
    P384,
    /// secp521r1
    P521,
}

impl EcCurve {
    /// Field size in bits
    pub fn bits(self) -> u32 {
        match self {
            EcCurve::P224 => 224,
            EcCurve::P256 => 256,
            EcCurve::P384 => 384,
            EcCurve::P521 => 521,
        }
    }
}

impl FromStr for EcCurve {
    type Err = PkiError;

    /// Accepts `256`, `P256`, `P-256` and `secp256r1` spellings
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "224" | "p224" | "secp224r1" => Ok(EcCurve::P224),
            "256" | "p256" | "secp256r1" | "prime256v1" => Ok(EcCurve::P256),
            "384" | "p384" | "secp384r1" => Ok(EcCurve::P384),
            "521" | "p521" | "secp521r1" => Ok(EcCurve::P521),
            _ => Err(PkiError::config(format!("unknown elliptic curve: {:?}", s))),
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.bits())
    }
}

/// Key scheme used for a CA or leaf key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScheme {
    /// RSA with the given modulus size
    Rsa {
        /// Modulus size in bits
        key_size_bits: u32,
    },
    /// ECDSA on a named curve
    EllipticCurve {
        /// The curve
        curve: EcCurve,
    },
}

impl KeyScheme {
    /// Build an RSA scheme, rejecting sizes the generator cannot produce
    pub fn rsa(key_size_bits: u32) -> Result<Self> {
        if !SUPPORTED_RSA_KEY_SIZES.contains(&key_size_bits) {
            return Err(PkiError::config(format!(
                "unsupported RSA key size {} (supported: {:?})",
                key_size_bits, SUPPORTED_RSA_KEY_SIZES
            )));
        }
        Ok(KeyScheme::Rsa { key_size_bits })
    }

    /// Fold the legacy flag pair into a scheme
    ///
    /// Exactly one of `rsa` and `ec` must be set; the matching parameter must
    /// be present and valid.
    pub fn from_selection(
        rsa: bool,
        rsa_key_size: Option<&str>,
        ec: bool,
        ec_curve: Option<&str>,
    ) -> Result<Self> {
        match (rsa, ec) {
            (true, true) => Err(PkiError::config(
                "contradictory key scheme: both rsa and ec are selected",
            )),
            (false, false) => Err(PkiError::config(
                "no key scheme selected: set exactly one of rsa or ec",
            )),
            (true, false) => {
                let raw = rsa_key_size
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| PkiError::config("rsa selected but rsa_key_size is missing"))?;
                let bits = raw.trim().parse::<u32>().map_err(|e| {
                    PkiError::config(format!("invalid rsa_key_size {:?}: {}", raw, e))
                })?;
                Self::rsa(bits)
            }
            (false, true) => {
                let raw = ec_curve
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| PkiError::config("ec selected but ec_curve is missing"))?;
                Ok(KeyScheme::EllipticCurve {
                    curve: raw.parse()?,
                })
            }
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScheme::Rsa { key_size_bits } => write!(f, "RSA-{}", key_size_bits),
            KeyScheme::EllipticCurve { curve } => write!(f, "EC {}", curve),
        }
    }
}
