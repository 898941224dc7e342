//! Password-reset capability tokens. Only the SHA-256 fingerprint is ever
//! stored; the plain token travels by email.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::Duration;

pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

pub struct ResetToken {
    pub plain: String,
    pub fingerprint: String,
}

pub fn generate() -> ResetToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    let fingerprint = fingerprint(&plain);
    ResetToken { plain, fingerprint }
}

pub fn fingerprint(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_hex_with_matching_fingerprint() {
        let a = generate();
        let b = generate();
        assert_eq!(a.plain.len(), 64);
        assert_ne!(a.plain, b.plain);
        assert_eq!(a.fingerprint, fingerprint(&a.plain));
        assert_ne!(a.fingerprint, a.plain);
    }

    #[test]
    fn fingerprint_is_plain_sha256() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
