//! Opaque encrypted payload envelope.

use serde::{Deserialize, Serialize};

/// Ciphertext plus the header describing how it was produced.
///
/// The header (algorithm, IV) is never interpreted here.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedData {
    header: String,
    encrypted_data: Vec<u8>,
}

impl EncryptedData {
    pub fn new(header: impl Into<String>, encrypted_data: impl Into<Vec<u8>>) -> Self {
        Self {
            header: header.into(),
            encrypted_data: encrypted_data.into(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn encrypted_data(&self) -> &[u8] {
        &self.encrypted_data
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.header, self.encrypted_data)
    }
}

// Ciphertext stays out of logs.
impl std::fmt::Debug for EncryptedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedData")
            .field("header", &self.header)
            .field("len", &self.encrypted_data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_what_was_given() {
        let data = EncryptedData::new("AES/CBC;iv=00ff", vec![1u8, 2, 3]);
        assert_eq!(data.header(), "AES/CBC;iv=00ff");
        assert_eq!(data.encrypted_data(), &[1, 2, 3]);
        assert_eq!(data.clone().into_parts(), ("AES/CBC;iv=00ff".to_string(), vec![1, 2, 3]));
    }

    #[test]
    fn debug_omits_ciphertext() {
        let data = EncryptedData::new("h", vec![0xAB; 32]);
        let debug = format!("{data:?}");
        assert!(debug.contains("len: 32"));
        assert!(!debug.contains("171"));
    }
}
