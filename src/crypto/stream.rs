//! Streaming content encryption and decryption.
//!
//! A stored blob is exactly `ciphertext || tag`: one AES-256-GCM context
//! spans the whole file and the 16-byte tag is a fixed suffix, with no
//! length prefix and no separate tag channel.
//!
//! The decryptor does not know the blob length up front.  It keeps the
//! most recent 16 bytes back on every chunk, because those might be (or
//! become) the tag once the source ends, and verifies them at the end.

use std::io::{Read, Seek, Write};

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tempfile::SpooledTempFile;
use tracing::{debug, warn};

use crate::errors::{FileVaultError, Result};
use crate::storage::{BlobStream, ByteStream};

use super::gcm::GcmState;
use super::keys::DataKey;
use super::{IV_LEN, TAG_LEN};

/// Verified plaintext above this size is spooled to a temporary file.
const MAX_SPOOL_IN_MEMORY: usize = 32 * 1024 * 1024;

/// When decrypted bytes are handed to the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePolicy {
    /// Release plaintext as soon as it is decrypted.  A consumer may see
    /// bytes from a tampered blob before the final item reports
    /// `AuthenticationFailed`, and must discard them on that error.
    #[default]
    Optimistic,
    /// Hold everything back until the tag is verified.
    Verified,
}

/// Encrypts a plaintext stream chunk by chunk.
pub struct StreamEncryptor {
    state: GcmState,
}

impl StreamEncryptor {
    pub fn new(key: &DataKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            state: GcmState::new(key, iv),
        }
    }

    /// Encrypt one chunk.  The output has the same length as the input.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let mut buf = chunk.to_vec();
        self.state.apply_keystream(&mut buf)?;
        self.state.absorb(&buf);
        Ok(buf)
    }

    /// Finish the stream and return the tag to append after the ciphertext.
    pub fn finalize(self) -> [u8; TAG_LEN] {
        self.state.tag()
    }
}

/// Decrypts a `ciphertext || tag` stream of unknown length.
pub struct StreamDecryptor {
    state: GcmState,
    /// Trailing bytes held back; at most `TAG_LEN` between calls.
    tail: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(key: &DataKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            state: GcmState::new(key, iv),
            tail: Vec::with_capacity(TAG_LEN),
        }
    }

    /// Accept one ciphertext chunk and return whatever plaintext can be
    /// released without touching the last 16 bytes seen.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        self.tail.extend_from_slice(chunk);
        if self.tail.len() <= TAG_LEN {
            return Ok(Vec::new());
        }

        let release = self.tail.len() - TAG_LEN;
        let kept = self.tail.split_off(release);
        let mut out = std::mem::replace(&mut self.tail, kept);

        self.state.absorb(&out);
        self.state.apply_keystream(&mut out)?;
        Ok(out)
    }

    /// Treat the buffered bytes as the tag and verify it.
    pub fn finalize(self) -> Result<()> {
        if self.tail.len() < TAG_LEN {
            return Err(FileVaultError::TruncatedCiphertext(self.tail.len()));
        }
        self.state.verify(&self.tail)
    }
}

/// Encrypt a plaintext stream.  The last item is the 16-byte tag.
///
/// A source error ends the stream with `Transport`.
pub fn encrypt_stream<'a>(key: &DataKey, iv: &[u8; IV_LEN], source: BlobStream<'a>) -> ByteStream<'a> {
    let encryptor = StreamEncryptor::new(key, iv);

    stream::unfold(Some((encryptor, source)), |state| async move {
        let (mut encryptor, mut source) = state?;
        match source.next().await {
            Some(Ok(chunk)) => match encryptor.update(&chunk) {
                Ok(ciphertext) => Some((Ok(Bytes::from(ciphertext)), Some((encryptor, source)))),
                Err(e) => Some((Err(e), None)),
            },
            Some(Err(e)) => Some((Err(FileVaultError::Transport(e)), None)),
            None => {
                let tag = encryptor.finalize();
                Some((Ok(Bytes::copy_from_slice(&tag)), None))
            }
        }
    })
    .boxed()
}

/// Decrypt a `ciphertext || tag` stream.
///
/// The stream ends after the first error.  Verification failures surface
/// as `AuthenticationFailed` or `TruncatedCiphertext`, source failures as
/// `Transport`.
pub fn decrypt_stream(
    key: &DataKey,
    iv: &[u8; IV_LEN],
    source: BlobStream<'static>,
    policy: ReleasePolicy,
    chunk_size: usize,
) -> ByteStream<'static> {
    let decryptor = StreamDecryptor::new(key, iv);
    match policy {
        ReleasePolicy::Optimistic => release_as_decrypted(decryptor, source),
        ReleasePolicy::Verified => release_after_verify(decryptor, source, chunk_size.max(1)),
    }
}

fn release_as_decrypted(decryptor: StreamDecryptor, source: BlobStream<'static>) -> ByteStream<'static> {
    stream::unfold(Some((decryptor, source)), |state| async move {
        let (mut decryptor, mut source) = state?;
        loop {
            match source.next().await {
                Some(Ok(chunk)) => match decryptor.update(&chunk) {
                    Ok(plain) if plain.is_empty() => continue,
                    Ok(plain) => return Some((Ok(Bytes::from(plain)), Some((decryptor, source)))),
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => {
                    warn!(%e, "ciphertext source failed mid-stream");
                    return Some((Err(FileVaultError::Transport(e)), None));
                }
                None => {
                    return match decryptor.finalize() {
                        Ok(()) => None,
                        Err(e) => {
                            warn!(%e, "content tag verification failed");
                            Some((Err(e), None))
                        }
                    };
                }
            }
        }
    })
    .boxed()
}

fn release_after_verify(
    decryptor: StreamDecryptor,
    source: BlobStream<'static>,
    chunk_size: usize,
) -> ByteStream<'static> {
    stream::once(spool_verified(decryptor, source))
        .map_ok(move |spool| read_spool(spool, chunk_size))
        .try_flatten()
        .boxed()
}

async fn spool_verified(
    mut decryptor: StreamDecryptor,
    mut source: BlobStream<'static>,
) -> Result<SpooledTempFile> {
    let mut spool = SpooledTempFile::new(MAX_SPOOL_IN_MEMORY);
    while let Some(chunk) = source.next().await {
        let plain = decryptor.update(&chunk?)?;
        spool.write_all(&plain).map_err(spool_error)?;
    }
    if let Err(e) = decryptor.finalize() {
        warn!(%e, "content tag verification failed, discarding spooled plaintext");
        return Err(e);
    }
    debug!(on_disk = spool.is_rolled(), "plaintext verified");
    spool.rewind().map_err(spool_error)?;
    Ok(spool)
}

fn spool_error(e: std::io::Error) -> FileVaultError {
    FileVaultError::StorageError(format!("plaintext spool: {e}"))
}

fn read_spool(spool: SpooledTempFile, chunk_size: usize) -> ByteStream<'static> {
    stream::try_unfold(spool, move |spool| next_spooled(spool, chunk_size)).boxed()
}

async fn next_spooled(
    mut spool: SpooledTempFile,
    chunk_size: usize,
) -> Result<Option<(Bytes, SpooledTempFile)>> {
    let mut buf = vec![0u8; chunk_size];
    let n = spool.read(&mut buf).map_err(spool_error)?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((Bytes::from(buf), spool)))
}
