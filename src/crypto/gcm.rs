//! Incremental AES-256-GCM.
//!
//! `aes-gcm` only encrypts whole buffers, so the streaming cipher runs the
//! GCM construction itself: AES-CTR starting at `inc32(J0)` for the
//! keystream, GHASH over the ciphertext, and `E(K, J0)` as the tag mask.
//! The output is byte-for-byte what one-shot AES-256-GCM produces with an
//! empty AAD, which the tests below check.

use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use ghash::universal_hash::UniversalHash;
use ghash::GHash;
use subtle::ConstantTimeEq;

use crate::errors::{FileVaultError, Result};

use super::keys::DataKey;
use super::{IV_LEN, TAG_LEN};

type Aes256Ctr = ctr::Ctr32BE<Aes256>;
type Block = ghash::Block;

const BLOCK_LEN: usize = 16;

/// Longest plaintext a single GCM invocation may cover (2^36 - 32 bytes).
const MAX_STREAM_LEN: u64 = (1 << 36) - 32;

/// Keystream plus running authenticator for one stream.
pub(crate) struct GcmState {
    ctr: Aes256Ctr,
    ghash: GHash,
    tag_mask: Block,
    /// Ciphertext bytes not yet making up a full GHASH block.
    partial: [u8; BLOCK_LEN],
    partial_len: usize,
    /// Total ciphertext bytes seen so far.
    len: u64,
    /// Keystream bytes consumed so far.
    applied: u64,
}

impl GcmState {
    pub(crate) fn new(key: &DataKey, iv: &[u8; IV_LEN]) -> Self {
        let aes = Aes256::new(key.as_bytes().into());

        let mut hash_key = Block::default();
        aes.encrypt_block(&mut hash_key);

        let mut j0 = Block::default();
        j0[..IV_LEN].copy_from_slice(iv);
        j0[BLOCK_LEN - 1] = 1;

        let mut tag_mask = j0;
        aes.encrypt_block(&mut tag_mask);

        // Content keystream starts one block after J0.
        let mut counter = j0;
        counter[BLOCK_LEN - 1] = 2;

        Self {
            ctr: Aes256Ctr::new(key.as_bytes().into(), &counter),
            ghash: GHash::new(&hash_key),
            tag_mask,
            partial: [0u8; BLOCK_LEN],
            partial_len: 0,
            len: 0,
            applied: 0,
        }
    }

    /// XOR the keystream into `buf` in place.
    pub(crate) fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<()> {
        let next = self.applied.saturating_add(buf.len() as u64);
        if next > MAX_STREAM_LEN {
            return Err(FileVaultError::EncryptionFailed(format!(
                "stream exceeds the AES-GCM limit of {MAX_STREAM_LEN} bytes"
            )));
        }
        self.ctr
            .try_apply_keystream(buf)
            .map_err(|e| FileVaultError::EncryptionFailed(format!("keystream exhausted: {e}")))?;
        self.applied = next;
        Ok(())
    }

    /// Feed ciphertext into the authenticator.
    pub(crate) fn absorb(&mut self, mut data: &[u8]) {
        self.len += data.len() as u64;

        if self.partial_len > 0 {
            let take = (BLOCK_LEN - self.partial_len).min(data.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
            self.partial_len += take;
            data = &data[take..];

            if self.partial_len < BLOCK_LEN {
                return;
            }
            let block = Block::clone_from_slice(&self.partial);
            self.ghash.update(&[block]);
            self.partial_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for chunk in &mut blocks {
            self.ghash.update(&[Block::clone_from_slice(chunk)]);
        }

        let rest = blocks.remainder();
        self.partial[..rest.len()].copy_from_slice(rest);
        self.partial_len = rest.len();
    }

    /// Close the authenticator and produce the tag.
    pub(crate) fn tag(mut self) -> [u8; TAG_LEN] {
        if self.partial_len > 0 {
            self.ghash.update_padded(&self.partial[..self.partial_len]);
        }

        // Length block: AAD bits (always zero here) then ciphertext bits.
        let mut lengths = Block::default();
        lengths[BLOCK_LEN / 2..].copy_from_slice(&(self.len * 8).to_be_bytes());
        self.ghash.update(&[lengths]);

        let hash = self.ghash.finalize();
        let mut tag = [0u8; TAG_LEN];
        for (out, (h, m)) in tag.iter_mut().zip(hash.iter().zip(self.tag_mask.iter())) {
            *out = h ^ m;
        }
        tag
    }

    /// Constant-time comparison against the tag received from the stream.
    pub(crate) fn verify(self, received: &[u8]) -> Result<()> {
        let expected = self.tag();
        if bool::from(expected[..].ct_eq(received)) {
            Ok(())
        } else {
            Err(FileVaultError::AuthenticationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::Aead;
    use aes_gcm::{Aes256Gcm, Nonce};

    fn one_shot(key: &DataKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        cipher.encrypt(Nonce::from_slice(iv), plaintext).unwrap()
    }

    fn incremental(key: &DataKey, iv: &[u8; IV_LEN], plaintext: &[u8], step: usize) -> Vec<u8> {
        let mut state = GcmState::new(key, iv);
        let mut out = Vec::new();
        for chunk in plaintext.chunks(step) {
            let mut buf = chunk.to_vec();
            state.apply_keystream(&mut buf).unwrap();
            state.absorb(&buf);
            out.extend_from_slice(&buf);
        }
        out.extend_from_slice(&state.tag());
        out
    }

    #[test]
    fn matches_one_shot_gcm() {
        let key = DataKey::new([0x42; 32]);
        let iv = [0x24; IV_LEN];
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let expected = one_shot(&key, &iv, &plaintext);
        for step in [1, 7, 16, 17, 64, 999, 4096] {
            assert_eq!(incremental(&key, &iv, &plaintext, step), expected, "step {step}");
        }
    }

    #[test]
    fn empty_plaintext_matches_one_shot_tag() {
        let key = DataKey::new([0x01; 32]);
        let iv = [0x02; IV_LEN];
        let expected = one_shot(&key, &iv, b"");
        assert_eq!(expected.len(), TAG_LEN);
        assert_eq!(GcmState::new(&key, &iv).tag().to_vec(), expected);
    }

    #[test]
    fn verify_rejects_wrong_tag() {
        let key = DataKey::new([0x09; 32]);
        let iv = [0x0A; IV_LEN];
        let mut state = GcmState::new(&key, &iv);
        state.absorb(b"ciphertext bytes");
        assert!(matches!(
            state.verify(&[0u8; TAG_LEN]),
            Err(FileVaultError::AuthenticationFailed)
        ));
    }
}
