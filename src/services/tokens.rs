use rand::Rng;
use sha2::{Digest, Sha256};

// No 0/O or 1/I, the token may end up read out loud over a call.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TOKEN_LEN: usize = 24;

/// Mints a fresh session-binding token. The raw value goes to the client
/// exactly once; only the hash is kept.
pub(crate) fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    let mut output = String::with_capacity(TOKEN_LEN);
    for _ in 0..TOKEN_LEN {
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}

pub(crate) fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn token_matches(raw: &str, hash: &str) -> bool {
    hash_token(raw) == hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_fixed_length() {
        let one = generate_session_token();
        let two = generate_session_token();
        assert_eq!(one.len(), TOKEN_LEN);
        assert_ne!(one, two);
    }

    #[test]
    fn hash_is_stable_and_detects_mismatch() {
        let raw = generate_session_token();
        let hash = hash_token(&raw);
        assert!(token_matches(&raw, &hash));
        assert!(!token_matches("SOMETHINGELSE", &hash));
    }
}
