/*
[INPUT]:  Per-subscription credentials supplied by the caller
[OUTPUT]: Opaque credential values that serialize into subscribe frames
[POS]:    Data layer - subscription authentication
[UPDATE]: When the service adds a new credential kind
*/

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Credentials attached to a single subscription.
///
/// Only presence is observable; secret material is never compared or logged.
#[derive(Clone)]
pub enum Credentials {
    /// CLOB API key triple, sent as `clob_auth`
    Clob(ClobApiKeyCreds),
    /// Address-based credential, sent as `gamma_auth`
    Gamma(GammaAuth),
}

impl Credentials {
    pub fn clob(
        key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Credentials::Clob(ClobApiKeyCreds::new(key, secret, passphrase))
    }

    pub fn gamma(address: impl Into<String>) -> Self {
        Credentials::Gamma(GammaAuth {
            address: address.into(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Clob(_) => f.write_str("Credentials::Clob([REDACTED])"),
            Credentials::Gamma(_) => f.write_str("Credentials::Gamma([REDACTED])"),
        }
    }
}

/// CLOB API key credentials
#[derive(Clone)]
pub struct ClobApiKeyCreds {
    key: SecretString,
    secret: SecretString,
    passphrase: SecretString,
}

impl ClobApiKeyCreds {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            key: SecretString::new(key.into()),
            secret: SecretString::new(secret.into()),
            passphrase: SecretString::new(passphrase.into()),
        }
    }
}

#[derive(Serialize)]
struct ClobWire<'a> {
    key: &'a str,
    secret: &'a str,
    passphrase: &'a str,
}

#[derive(Deserialize)]
struct ClobOwned {
    key: String,
    secret: String,
    passphrase: String,
}

impl Serialize for ClobApiKeyCreds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ClobWire {
            key: self.key.expose_secret(),
            secret: self.secret.expose_secret(),
            passphrase: self.passphrase.expose_secret(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClobApiKeyCreds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = ClobOwned::deserialize(deserializer)?;
        Ok(Self::new(raw.key, raw.secret, raw.passphrase))
    }
}

/// Address-based credential
#[derive(Clone, Serialize, Deserialize)]
pub struct GammaAuth {
    pub address: String,
}
