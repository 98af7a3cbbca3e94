// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Random id generation.

/// Alphabet for generated ids: lowercase alphanumerics, no lookalikes.
///
/// Ids appear in log lines and socket payloads; keeping them lowercase
/// avoids case-sensitivity surprises on case-preserving filesystems.
const ALPHABET: [char; 32] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'k', 'm',
    'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0',
];

const ID_LEN: usize = 16;

/// Generator for random id suffixes.
#[derive(Clone, Copy, Default)]
pub struct IdGen;

impl IdGen {
    /// Produce a fresh 16-character random id suffix.
    pub fn next(&self) -> String {
        nanoid::nanoid!(ID_LEN, &ALPHABET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_fixed_length_and_alphabet() {
        let id = IdGen.next();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| ALPHABET.contains(&c)));
    }

    #[test]
    fn ids_are_unique_enough() {
        let a = IdGen.next();
        let b = IdGen.next();
        assert_ne!(a, b);
    }
}
