//! At-rest encryption hook (spec §1: "the engine exposes hooks; the
//! cipher implementation is external"). The engine never implements a
//! cipher itself — [`NullCipher`] is the default no-op, for databases
//! opened without `encryption_key`.

use crate::common::Result;

pub trait CipherHook: Send + Sync {
    /// Transform a page's bytes before they are handed to the block
    /// store.
    fn encrypt_page(&self, page_index: u32, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Recover a page's bytes after they are fetched from the block
    /// store.
    fn decrypt_page(&self, page_index: u32, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Re-key in place: re-encrypt already-stored pages under a new key.
    /// The default implementation is a no-op cipher swap; a real cipher
    /// hook re-encrypts every page during `rekey`.
    fn rekey(&mut self, _new_key: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// The default hook when no `encryption_key` is configured: bytes pass
/// through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCipher;

impl CipherHook for NullCipher {
    fn encrypt_page(&self, _page_index: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt_page(&self, _page_index: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// Builds the cipher hook for a newly opened database, given its
/// `open()` config. A real integration supplies one that inspects
/// `config.encryption_key` and returns the actual cipher; the default
/// always returns [`NullCipher`] regardless of what was configured,
/// since the cipher implementation itself is external (spec §1).
pub trait CipherHookFactory: Send + Sync {
    fn create(&self, config: &crate::host::config::OpenConfig) -> Box<dyn CipherHook>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullCipherFactory;

impl CipherHookFactory for NullCipherFactory {
    fn create(&self, _config: &crate::host::config::OpenConfig) -> Box<dyn CipherHook> {
        Box::new(NullCipher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_cipher_roundtrips_unchanged() {
        let cipher = NullCipher;
        let plain = b"page bytes".to_vec();
        let encrypted = cipher.encrypt_page(0, &plain).unwrap();
        assert_eq!(encrypted, plain);
        let decrypted = cipher.decrypt_page(0, &encrypted).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_null_cipher_rekey_is_a_no_op() {
        let mut cipher = NullCipher;
        cipher.rekey(b"new-key").unwrap();
    }
}
