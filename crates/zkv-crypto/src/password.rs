//! Strong random password generation

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use secrecy::SecretString;
use zkv_core::{VaultError, VaultResult};

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Shortest length that can hold one character from every class.
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Generate a password with at least one uppercase letter, lowercase letter,
/// digit, and symbol, then shuffle it. Characters are sampled uniformly
/// from `OsRng`.
pub fn generate_strong_password(length: usize) -> VaultResult<SecretString> {
    if length < MIN_PASSWORD_LENGTH {
        return Err(VaultError::InvalidInput(format!(
            "password length must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let mut rng = OsRng;
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();
    let pick = |rng: &mut OsRng, set: &[u8]| set[rng.gen_range(0..set.len())];

    let mut chars = Vec::with_capacity(length);
    for set in [UPPER, LOWER, DIGITS, SYMBOLS] {
        chars.push(pick(&mut rng, set));
    }
    while chars.len() < length {
        chars.push(pick(&mut rng, &all));
    }
    chars.shuffle(&mut rng);

    // Every byte comes from the ASCII tables above.
    let password: String = chars.into_iter().map(char::from).collect();
    Ok(SecretString::from(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_length_and_classes() {
        for len in [4, 5, 16, 64] {
            let pw = generate_strong_password(len).unwrap();
            let s = pw.expose_secret();
            assert_eq!(s.len(), len);
            assert!(s.bytes().any(|b| UPPER.contains(&b)));
            assert!(s.bytes().any(|b| LOWER.contains(&b)));
            assert!(s.bytes().any(|b| DIGITS.contains(&b)));
            assert!(s.bytes().any(|b| SYMBOLS.contains(&b)));
        }
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            generate_strong_password(3),
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_passwords_differ() {
        let a = generate_strong_password(24).unwrap();
        let b = generate_strong_password(24).unwrap();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }
}
