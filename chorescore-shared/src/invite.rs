//! Family invite codes.

/// Uppercase letters and digits minus the easily confused `0 O 1 I`.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Codes are stored uppercase; lookups go through here first.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn generate() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    bytes
        .iter()
        .take(CODE_LEN)
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize(" abc123\n"), "ABC123");
        assert_eq!(normalize("ABC123"), "ABC123");
    }

    #[test]
    fn generated_codes_are_short_and_uppercase() {
        for _ in 0..64 {
            let code = generate();
            assert_eq!(code.len(), CODE_LEN);
            assert_eq!(normalize(&code), code);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }
}
