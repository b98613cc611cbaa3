use uuid::Uuid;

/// Characters a random name token is drawn from.
pub(crate) const ALPHABET: &[u8; 38] = b"abcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of a random name token.
pub(crate) const TOKEN_LEN: usize = 8;

// Largest multiple of the alphabet size that fits in a byte; bytes at or above
// it are rejected so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// An endless sequence of random name tokens.
///
/// Entropy comes from version 4 UUIDs. The version and variant bytes carry
/// fixed bits and are skipped.
#[derive(Debug, Default)]
pub(crate) struct RandomNames {
    pool: Vec<u8>,
}

impl RandomNames {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_byte(&mut self) -> u8 {
        loop {
            if let Some(b) = self.pool.pop() {
                if b < ACCEPT_BELOW {
                    return b;
                }
                continue;
            }
            let id = Uuid::new_v4();
            self.pool.extend(
                id.as_bytes()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != 6 && *i != 8)
                    .map(|(_, b)| *b),
            );
        }
    }
}

impl Iterator for RandomNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let token = (0..TOKEN_LEN)
            .map(|_| {
                let b = self.next_byte();
                ALPHABET[(b as usize) % ALPHABET.len()] as char
            })
            .collect();
        Some(token)
    }
}

/// Returns `true` if `token` could have been produced by [`RandomNames`].
#[cfg(test)]
pub(crate) fn is_token(token: &[u8]) -> bool {
    token.len() == TOKEN_LEN && token.iter().all(|c| ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_use_the_alphabet() {
        for token in RandomNames::new().take(500) {
            assert!(is_token(token.as_bytes()), "bad token {token:?}");
        }
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<String> = RandomNames::new().take(1000).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn acceptance_bound_is_a_multiple_of_the_alphabet() {
        assert_eq!(ACCEPT_BELOW as usize % ALPHABET.len(), 0);
        assert!(ACCEPT_BELOW as usize + ALPHABET.len() > 255);
    }
}
