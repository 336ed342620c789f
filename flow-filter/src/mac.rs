// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type, as carried by flow actions and by the ethernet field cache.

use arrayvec::ArrayVec;
use std::fmt::Display;

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]`. In configuration records it is written in
/// its usual colon-separated hexadecimal form (e.g. `02:00:00:00:00:01`).
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[repr(transparent)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

/// Errors which can occur while converting a string to a [`Mac`]
#[derive(Debug, thiserror::Error)]
pub enum MacFromStringError {
    /// Invalid string representation of mac address
    #[error("invalid string representation of mac address: {0}")]
    Invalid(String),
}

impl TryFrom<&str> for Mac {
    type Error = MacFromStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        const MAX_OCTETS: usize = 6;
        let invalid = || MacFromStringError::Invalid(value.to_string());
        let octets = value
            .split(':')
            .try_fold(ArrayVec::<u8, MAX_OCTETS>::new(), |mut acc, octet| {
                if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                let parsed = u8::from_str_radix(octet, 16).map_err(|_| invalid())?;
                acc.try_push(parsed).map_err(|_| invalid())?;
                Ok(acc)
            })?;
        let octets: [u8; MAX_OCTETS] = octets.into_inner().map_err(|_| invalid())?;
        Ok(Mac(octets))
    }
}

impl TryFrom<String> for Mac {
    type Error = MacFromStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mac::try_from(value.as_str())
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

impl Mac {
    /// The broadcast `Mac`
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// The zero `Mac`.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the binary representation of the [`Mac`] is exclusively ones.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self == &Mac::BROADCAST
    }

    /// Returns true iff the least significant bit of the first octet of the `[Mac]` is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Returns true iff the binary representation of the [`Mac`] is exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// Returns true iff the [`Mac`] may be written as the source of an ethernet frame.
    #[must_use]
    pub fn is_valid_src(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }

    /// Returns true iff the [`Mac`] may be written as the destination of an ethernet frame.
    #[must_use]
    pub fn is_valid_dst(&self) -> bool {
        !self.is_zero()
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::Mac;

    #[test]
    fn parse_and_display() {
        let mac = Mac::try_from("02:0a:00:ff:00:01").unwrap();
        assert_eq!(mac, Mac([0x02, 0x0a, 0x00, 0xff, 0x00, 0x01]));
        assert_eq!(mac.to_string(), "02:0a:00:ff:00:01");
        assert!(mac.is_valid_src());
    }

    #[test]
    fn reject_malformed() {
        for bad in ["", "02:00:00:00:00", "02:00:00:00:00:00:00", "2:00:00:00:00:01", "zz:00:00:00:00:01"] {
            assert!(Mac::try_from(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn multicast_is_not_a_source() {
        assert!(!Mac::BROADCAST.is_valid_src());
        assert!(Mac::BROADCAST.is_valid_dst());
        assert!(!Mac::ZERO.is_valid_dst());
    }
}
