//! Opaque refresh credentials
//!
//! A refresh credential is a random string with no structure of its own. It only
//! means something as the key of a credential store entry.

use rand::Rng;

/// Default refresh credential length
pub const REFRESH_CREDENTIAL_LEN: usize = 20;

/// Characters a credential is drawn from (cookie-safe)
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

/// Generate a refresh credential of `len` characters.
///
/// Uses the thread-local CSPRNG.
pub fn generate_refresh_credential(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
