//! Derivation of display ids and secret-use site ids.
//!
//! Two modes: a plan-mode factory derives the same ids every time for
//! the same plan salt, so a contract built twice from identical inputs
//! is byte-identical; a run-mode factory draws a fresh key from the OS
//! CSPRNG, so a value rendered for a human during one run can never be
//! correlated with the same value in another run or in the stored plan.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use sha3::Sha3_256;

const PLAN_MODE_INFO: &[u8] = b"opal/displayid/plan/v1";

/// Derives display ids and secret-use site ids from a single 32-byte key.
///
/// The key itself never leaves this type; every derived id is a
/// one-way HMAC-SHA256 tag, so recovering the key or one id from
/// another is infeasible.
pub struct IdFactory {
    key: [u8; 32],
}

impl IdFactory {
    /// Derives the factory's key from `plan_salt` via HKDF (extract with
    /// `plan_salt` as input keying material, then expand with a fixed
    /// info string). The same salt always yields the same key, and
    /// hence the same display ids for the same inputs.
    pub fn from_plan_salt(plan_salt: &[u8]) -> Self {
        let hk = Hkdf::<Sha3_256>::new(None, plan_salt);
        let mut key = [0u8; 32];
        hk.expand(PLAN_MODE_INFO, &mut key)
            .expect("32 bytes is a valid HKDF-SHA3-256 output length");
        Self { key }
    }

    /// Draws a fresh 32-byte key from the OS CSPRNG. Two factories built
    /// this way almost never agree on a display id for the same input,
    /// by construction.
    pub fn from_os_rng() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Derives a stable display id for a `(context, value)` pair as a
    /// lowercase hex HMAC-SHA256 tag. `context` namespaces unrelated
    /// callers (e.g. a secret name vs. a transport label) so they never
    /// collide even given the same underlying value.
    pub fn display_id(&self, context: &str, value: &str) -> String {
        hex::encode(self.tag(&[context.as_bytes(), b"\0", value.as_bytes()]))
    }

    /// Derives a secret-use site id binding a display id to the
    /// decorator-parameter site where the secret is consumed.
    pub fn site_id(&self, display_id: &str, site: &str) -> String {
        hex::encode(self.tag(&[display_id.as_bytes(), b"\0", site.as_bytes()]))
    }

    fn tag(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC accepts any key length");
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_salt_same_display_id() {
        let a = IdFactory::from_plan_salt(b"identical-salt-bytes-0123456789");
        let b = IdFactory::from_plan_salt(b"identical-salt-bytes-0123456789");
        assert_eq!(
            a.display_id("secret", "db_password"),
            b.display_id("secret", "db_password")
        );
    }

    #[test]
    fn different_salt_different_display_id() {
        let a = IdFactory::from_plan_salt(b"salt-one-0123456789012345678901");
        let b = IdFactory::from_plan_salt(b"salt-two-0123456789012345678901");
        assert_ne!(
            a.display_id("secret", "db_password"),
            b.display_id("secret", "db_password")
        );
    }

    #[test]
    fn context_namespaces_values() {
        let f = IdFactory::from_plan_salt(b"salt-0123456789012345678901234567");
        assert_ne!(
            f.display_id("secret", "x"),
            f.display_id("transport", "x")
        );
    }

    #[test]
    fn run_mode_keys_are_not_fixed() {
        let a = IdFactory::from_os_rng();
        let b = IdFactory::from_os_rng();
        assert_ne!(a.display_id("secret", "x"), b.display_id("secret", "x"));
    }
}
