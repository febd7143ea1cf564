//! Optional fragment authentication.
//!
//! A sealed fragment carries the first 8 bytes of
//! `HMAC-SHA256(key, header || payload)`. The header is taken with the
//! auth-tag flag set, so stripping the tag also breaks the header checksum.
//! Keys are supplied by the caller; managing them is out of scope here.

use crate::error::{Error, FragmentError, Result};
use crate::fragment::{Fragment, AUTH_TAG_SIZE};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Shared secret for sealing and checking fragments.
#[derive(Clone)]
pub struct IntegrityKey {
    key: Vec<u8>,
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityKey").finish_non_exhaustive()
    }
}

impl IntegrityKey {
    /// # Errors
    /// `Error::Config` for an empty key.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::Config("integrity key must not be empty".into()));
        }
        Ok(Self { key })
    }

    fn mac(&self, fragment: &Fragment) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Config(format!("integrity key rejected: {e}")))?;
        mac.update(&fragment.authenticated_bytes());
        Ok(mac)
    }

    /// Attach an authentication tag to `fragment`.
    pub fn seal(&self, fragment: &mut Fragment) -> Result<()> {
        let code = self.mac(fragment)?.finalize().into_bytes();
        let mut tag = [0u8; AUTH_TAG_SIZE];
        tag.copy_from_slice(&code[..AUTH_TAG_SIZE]);
        fragment.auth_tag = Some(tag);
        Ok(())
    }

    /// Check the tag of `fragment` in constant time.
    ///
    /// # Errors
    /// `FragmentError::AuthenticationFailure` if the tag is missing or wrong.
    pub fn verify(&self, fragment: &Fragment) -> Result<()> {
        let failure = || FragmentError::AuthenticationFailure {
            index: fragment.sequence_index,
        };
        let tag = fragment.auth_tag.ok_or_else(failure)?;
        self.mac(fragment)?
            .verify_truncated_left(&tag)
            .map_err(|_| failure().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedundancyLevel;
    use crate::fragment::{fragment, TransmissionMeta};

    fn sample() -> Fragment {
        let meta = TransmissionMeta {
            transmission_id: 3,
            dictionary_version: 1,
            strict_morse: false,
        };
        fragment(&[5; 20], 16, RedundancyLevel::None, meta).unwrap().remove(0)
    }

    #[test]
    fn test_seal_and_verify() {
        let key = IntegrityKey::new(b"station key".to_vec()).unwrap();
        let mut frag = sample();
        key.seal(&mut frag).unwrap();

        let parsed = Fragment::deserialize(&frag.serialize()).unwrap();
        assert!(parsed.auth_tag.is_some());
        assert!(key.verify(&parsed).is_ok());
    }

    #[test]
    fn test_wrong_key_or_tampering_fails() {
        let key = IntegrityKey::new(b"station key".to_vec()).unwrap();
        let other = IntegrityKey::new(b"other key".to_vec()).unwrap();
        let mut frag = sample();
        key.seal(&mut frag).unwrap();

        assert!(matches!(
            other.verify(&frag),
            Err(Error::Fragment(FragmentError::AuthenticationFailure { index: 0 }))
        ));

        let mut tampered = frag.clone();
        tampered.payload[0] ^= 1;
        tampered.integrity_digest = crate::fragment::digest(&tampered.payload);
        assert!(key.verify(&tampered).is_err());

        assert!(key.verify(&sample()).is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(IntegrityKey::new(Vec::new()).is_err());
        let key = IntegrityKey::new(b"k".to_vec()).unwrap();
        assert_eq!(format!("{key:?}"), "IntegrityKey { .. }");
    }
}
