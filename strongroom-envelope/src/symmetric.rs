//! AES-256-CFB envelope: base64(IV || ciphertext).

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

use crate::error::EnvelopeError;
use crate::{DEK_BYTES, IV_BYTES};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt `plaintext` under `key` with a freshly sampled IV.
///
/// The on-disk envelope is base64 of the IV immediately followed by the
/// CFB ciphertext; CFB needs no padding, so the body length equals the
/// plaintext length.
pub fn seal(key: &[u8; DEK_BYTES], plaintext: &[u8]) -> Result<String, EnvelopeError> {
    let mut iv = [0u8; IV_BYTES];
    getrandom::getrandom(&mut iv).map_err(|e| EnvelopeError::CryptoFailure(e.to_string()))?;

    let enc = Aes256CfbEnc::new_from_slices(key, &iv)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;

    let mut envelope = Vec::with_capacity(IV_BYTES + plaintext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(plaintext);
    enc.encrypt(&mut envelope[IV_BYTES..]);

    Ok(BASE64.encode(envelope))
}

/// Decrypt a base64 `IV || ciphertext` envelope.
///
/// Anything that cannot possibly hold an IV plus body (bad base64, or
/// fewer bytes than one AES block) is reported as [`EnvelopeError::Corrupt`].
pub fn open(key: &[u8; DEK_BYTES], envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let raw = BASE64.decode(envelope).map_err(|_| EnvelopeError::Corrupt)?;
    if raw.len() < IV_BYTES {
        return Err(EnvelopeError::Corrupt);
    }

    let (iv, body) = raw.split_at(IV_BYTES);
    let dec = Aes256CfbDec::new_from_slices(key, iv)
        .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;

    let mut plaintext = body.to_vec();
    dec.decrypt(&mut plaintext);
    Ok(plaintext)
}
