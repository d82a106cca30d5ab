//! The RSA→AES handshake and AES-CBC bulk encryption layer (§4.D).
//!
//! Serialization for both the handshake records and the bulk envelope uses
//! `rmp_serde`'s struct-map mode, the same centralized `encode_to`/
//! `decode_from` pattern the teacher uses for its own control protocol —
//! msgpack is self-describing and reproducible across implementations,
//! which the wire format here explicitly requires.

use std::io::{Read, Write};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use anyhow::{bail, Context};
use rand::{rngs::OsRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_derive::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use sha2::Sha256;

use crate::framing::{read_frame, write_frame};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const AES_KEY_LEN: usize = 32; // 256 bits
const AES_IV_LEN: usize = 16; // one AES block

/// Centralized msgpack encoder, mirroring the teacher's
/// `protocol::encode_to`.
fn encode_to<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer = rmp_serde::Serializer::new(&mut buf).with_struct_map();
    value.serialize(&mut serializer).context("serializing secure transport record")?;
    Ok(buf)
}

/// Centralized msgpack decoder, mirroring the teacher's
/// `protocol::decode_from`.
fn decode_from<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> anyhow::Result<T> {
    let mut deserializer = rmp_serde::Deserializer::new(bytes);
    T::deserialize(&mut deserializer).context("deserializing secure transport record")
}

/// Public form of [`decode_from`], for callers that read raw plaintext via
/// [`SecureChannel::recv_raw`] and need to decode it themselves.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> anyhow::Result<T> {
    decode_from(bytes)
}

#[derive(Debug, DeriveSerialize, DeriveDeserialize)]
struct HandshakeRequest {
    /// The fresh AES-256 key, RSA-OAEP encrypted under the server's public
    /// key.
    aes_key: Vec<u8>,
}

#[derive(Debug, DeriveSerialize, DeriveDeserialize)]
struct HandshakeReply {
    status: String,
}

const HANDSHAKE_SUCCESS: &str = "success";

#[derive(Debug, DeriveSerialize, DeriveDeserialize)]
struct EncryptedMessage {
    iv: Vec<u8>,
    data: Vec<u8>,
}

/// A handshake-complete, encrypted duplex channel over some underlying
/// stream `S` (a `TcpStream` in production, anything `Read + Write` in
/// tests).
pub struct SecureChannel<S> {
    stream: S,
    aes_key: [u8; AES_KEY_LEN],
}

impl<S: Read + Write> SecureChannel<S> {
    /// Client side of the handshake (§4.D steps 1-5): generate a fresh AES
    /// key, encrypt it under the server's RSA public key, send it, and
    /// expect a success reply.
    pub fn connect(mut stream: S, server_public_key: &RsaPublicKey) -> anyhow::Result<SecureChannel<S>> {
        let mut aes_key = [0u8; AES_KEY_LEN];
        OsRng.fill_bytes(&mut aes_key);

        let padding = Oaep::new::<Sha256>();
        let encrypted_key = server_public_key
            .encrypt(&mut OsRng, padding, &aes_key)
            .context("rsa-oaep encrypting aes key")?;

        let req = HandshakeRequest { aes_key: encrypted_key };
        write_frame(&mut stream, &encode_to(&req)?).context("sending handshake request")?;

        let reply_bytes = read_frame(&mut stream).context("reading handshake reply")?;
        let reply: HandshakeReply = decode_from(&reply_bytes)?;
        if reply.status != HANDSHAKE_SUCCESS {
            bail!("backend rejected handshake: {}", reply.status);
        }

        Ok(SecureChannel { stream, aes_key })
    }

    /// Server side of the handshake: decrypt the client's AES key with the
    /// server's private key and reply with a success status. Any failure
    /// here must close the connection per §4.D step 5 — the caller is
    /// expected to drop the stream on `Err`.
    pub fn accept(mut stream: S, server_private_key: &RsaPrivateKey) -> anyhow::Result<SecureChannel<S>> {
        let req_bytes = read_frame(&mut stream).context("reading handshake request")?;
        let req: HandshakeRequest = decode_from(&req_bytes)?;

        let padding = Oaep::new::<Sha256>();
        let decrypted = server_private_key
            .decrypt(padding, &req.aes_key)
            .context("rsa-oaep decrypting aes key")?;
        if decrypted.len() != AES_KEY_LEN {
            bail!("decrypted aes key has wrong length: {}", decrypted.len());
        }
        let mut aes_key = [0u8; AES_KEY_LEN];
        aes_key.copy_from_slice(&decrypted);

        let reply = HandshakeReply { status: HANDSHAKE_SUCCESS.to_string() };
        write_frame(&mut stream, &encode_to(&reply)?).context("sending handshake reply")?;

        Ok(SecureChannel { stream, aes_key })
    }

    /// Encrypts `value` with a fresh random IV and writes it as one framed
    /// message. IV reuse within a session is forbidden (§8 invariant 6);
    /// a fresh IV is drawn from the OS CSPRNG on every call.
    pub fn send<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        let plaintext = encode_to(value)?;

        let mut iv = [0u8; AES_IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(&self.aes_key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let envelope = EncryptedMessage { iv: iv.to_vec(), data: ciphertext };
        write_frame(&mut self.stream, &encode_to(&envelope)?).context("writing encrypted frame")
    }

    /// Reads one framed message, decrypts it, and returns the raw msgpack
    /// plaintext without decoding it into any particular type. Separated
    /// from [`SecureChannel::recv`] so callers that need to tell a
    /// transport/crypto failure (close the connection) apart from a record
    /// that simply doesn't match the expected shape (reply with an error,
    /// keep the connection open) can decode the bytes themselves.
    pub fn recv_raw(&mut self) -> anyhow::Result<Vec<u8>> {
        let frame = read_frame(&mut self.stream).context("reading encrypted frame")?;
        let envelope: EncryptedMessage = decode_from(&frame)?;
        if envelope.iv.len() != AES_IV_LEN {
            bail!("received iv with wrong length: {}", envelope.iv.len());
        }
        let mut iv = [0u8; AES_IV_LEN];
        iv.copy_from_slice(&envelope.iv);

        Aes256CbcDec::new(&self.aes_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&envelope.data)
            .map_err(|e| anyhow::anyhow!("aes-cbc decryption failed: {:?}", e))
    }

    /// Reads one framed message and decodes it as `T`.
    pub fn recv<T: for<'de> Deserialize<'de>>(&mut self) -> anyhow::Result<T> {
        let plaintext = self.recv_raw()?;
        decode_from(&plaintext)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
