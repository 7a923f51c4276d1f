// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Bit-exact wire framing: the generic message frame, the reconnect
//! handshake constants, and the signed-state file format (current v5 and
//! the legacy pre-v5 layout).

use crate::hash::{Hash48, HASH_LEN};
use anyhow::{bail, ensure, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic byte exchanged after the peer-identification handshake to open a
/// reconnect session.
pub const COMM_CONNECT: u8 = 0xC0;

/// Current signed-state file format version.
pub const SIGNED_STATE_VERSION_CURRENT: u32 = 5;

/// Lesson variant tags, in wire order.
pub const LESSON_TAG_NODE_INTERNAL: u8 = 0;
pub const LESSON_TAG_NODE_LEAF: u8 = 1;
pub const LESSON_TAG_UP_TO_DATE: u8 = 2;
pub const LESSON_TAG_CUSTOM_VIEW_ROOT: u8 = 3;

/// Writes a `u32` length-prefixed byte string.
pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    w.write_u32::<BigEndian>(bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

/// Reads a `u32` length-prefixed byte string.
pub fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// The generic frame header shared by every message on the wire: a 32-bit
/// big-endian length (of everything that follows), a 64-bit class-id, and a
/// 32-bit version, followed by a variant-specific payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FrameHeader {
    pub class_id: u64,
    pub version: u32,
}

impl FrameHeader {
    pub fn write<W: Write>(&self, w: &mut W, payload_len: u32) -> Result<()> {
        // length covers class-id + version + payload.
        w.write_u32::<BigEndian>(8 + 4 + payload_len)?;
        w.write_u64::<BigEndian>(self.class_id)?;
        w.write_u32::<BigEndian>(self.version)?;
        Ok(())
    }

    /// Reads the length prefix and header, returning the header and the
    /// number of remaining payload bytes the caller must consume.
    pub fn read<R: Read>(r: &mut R) -> Result<(Self, u32)> {
        let total_len = r.read_u32::<BigEndian>()?;
        ensure!(total_len >= 12, "frame shorter than header");
        let class_id = r.read_u64::<BigEndian>()?;
        let version = r.read_u32::<BigEndian>()?;
        Ok((Self { class_id, version }, total_len - 12))
    }
}

/// Signature algorithm identifiers used in the `algorithm-id ‖ length ‖
/// bytes` signature variant encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    Ed25519 = 1,
}

impl SignatureAlgorithm {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(Self::Ed25519),
            other => bail!("unknown signature algorithm id {other}"),
        }
    }
}

/// `algorithm-id (1B) ‖ length (4B BE) ‖ signature bytes`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureVariant {
    pub algorithm: SignatureAlgorithm,
    pub bytes: Vec<u8>,
}

impl SignatureVariant {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(self.algorithm as u8)?;
        write_bytes(w, &self.bytes)
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let algorithm = SignatureAlgorithm::from_u8(r.read_u8()?)?;
        let bytes = read_bytes(r)?;
        Ok(Self { algorithm, bytes })
    }
}

/// Version-5 signed-state file contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignedStateFileV5 {
    pub entire_hash: Hash48,
    pub entire_signature: SignatureVariant,
    pub meta_hash: Hash48,
    pub meta_signature: SignatureVariant,
}

impl SignedStateFileV5 {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<BigEndian>(SIGNED_STATE_VERSION_CURRENT)?;
        w.write_all(self.entire_hash.as_bytes())?;
        self.entire_signature.write(w)?;
        w.write_all(self.meta_hash.as_bytes())?;
        self.meta_signature.write(w)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut hash_buf = [0u8; HASH_LEN];
        r.read_exact(&mut hash_buf)?;
        let entire_hash = Hash48::new(hash_buf);
        let entire_signature = SignatureVariant::read(r)?;
        r.read_exact(&mut hash_buf)?;
        let meta_hash = Hash48::new(hash_buf);
        let meta_signature = SignatureVariant::read(r)?;
        Ok(Self {
            entire_hash,
            entire_signature,
            meta_hash,
            meta_signature,
        })
    }
}

const LEGACY_FILE_HASH_TAG: u8 = 0x04;
const LEGACY_SIGNATURE_TAG: u8 = 0x03;

/// Pre-v5 legacy signed-state file: `0x04 ‖ file_hash(48B) ‖ 0x03 ‖
/// sig_length(4B) ‖ signature bytes`. Preserved bit-exact; see the design
/// notes on whether a reimplementation must match the standalone signing
/// tool's legacy output (resolved: yes, see DESIGN.md).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LegacySignedStateFile {
    pub file_hash: Hash48,
    pub signature: Vec<u8>,
}

impl LegacySignedStateFile {
    /// Legacy files carry no version header at all: the very first byte on
    /// the wire is the `0x04` file-hash tag. Callers distinguish formats by
    /// peeking that first byte rather than reading a 4-byte version (see
    /// `read_signed_state_file`).
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(LEGACY_FILE_HASH_TAG)?;
        w.write_all(self.file_hash.as_bytes())?;
        w.write_u8(LEGACY_SIGNATURE_TAG)?;
        w.write_u32::<BigEndian>(self.signature.len() as u32)?;
        w.write_all(&self.signature)?;
        Ok(())
    }

    /// Reads the body assuming the `0x04` tag has already been consumed by
    /// the caller.
    pub fn read_after_tag<R: Read>(r: &mut R) -> Result<Self> {
        let mut hash_buf = [0u8; HASH_LEN];
        r.read_exact(&mut hash_buf)?;
        let file_hash = Hash48::new(hash_buf);
        let sig_tag = r.read_u8()?;
        ensure!(sig_tag == LEGACY_SIGNATURE_TAG, "expected legacy signature tag");
        let sig_len = r.read_u32::<BigEndian>()? as usize;
        let mut signature = vec![0u8; sig_len];
        r.read_exact(&mut signature)?;
        Ok(Self {
            file_hash,
            signature,
        })
    }
}

/// Reads a signed-state file of either format. The legacy format has no
/// version header: its first byte is the `0x04` file-hash tag, which never
/// collides with a v5 version integer's leading byte (v5's leading byte is
/// always `0x00`). Peeking one byte is enough to dispatch.
pub fn read_signed_state_file<R: Read>(r: &mut R) -> Result<SignedStateFile> {
    let first_byte = r.read_u8().context("reading signed-state file header")?;
    if first_byte == LEGACY_FILE_HASH_TAG {
        return Ok(SignedStateFile::Legacy(
            LegacySignedStateFile::read_after_tag(r)?,
        ));
    }
    let rest = {
        let mut buf = [0u8; 3];
        r.read_exact(&mut buf)?;
        buf
    };
    let version = u32::from_be_bytes([first_byte, rest[0], rest[1], rest[2]]);
    ensure!(
        version == SIGNED_STATE_VERSION_CURRENT,
        "unsupported signed-state file version {version}"
    );
    Ok(SignedStateFile::Current(SignedStateFileV5::read(r)?))
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SignedStateFile {
    Current(SignedStateFileV5),
    Legacy(LegacySignedStateFile),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signature(tag: u8) -> SignatureVariant {
        SignatureVariant {
            algorithm: SignatureAlgorithm::Ed25519,
            bytes: vec![tag; 64],
        }
    }

    #[test]
    fn v5_signed_state_file_round_trips() {
        let original = SignedStateFileV5 {
            entire_hash: Hash48::digest(b"entire"),
            entire_signature: sample_signature(0xAA),
            meta_hash: Hash48::digest(b"meta"),
            meta_signature: sample_signature(0xBB),
        };
        let mut buf = Vec::new();
        original.write(&mut buf).unwrap();

        let decoded = match read_signed_state_file(&mut &buf[..]).unwrap() {
            SignedStateFile::Current(v5) => v5,
            SignedStateFile::Legacy(_) => panic!("expected current-format dispatch"),
        };
        assert_eq!(decoded, original);
    }

    #[test]
    fn legacy_signed_state_file_round_trips_and_is_dispatched_by_first_byte() {
        let original = LegacySignedStateFile {
            file_hash: Hash48::digest(b"legacy-file"),
            signature: vec![0x42; 32],
        };
        let mut buf = Vec::new();
        original.write(&mut buf).unwrap();

        // The legacy format's first byte is the 0x04 tag, never a v5
        // version header.
        assert_eq!(buf[0], LEGACY_FILE_HASH_TAG);

        let decoded = match read_signed_state_file(&mut &buf[..]).unwrap() {
            SignedStateFile::Legacy(legacy) => legacy,
            SignedStateFile::Current(_) => panic!("expected legacy-format dispatch"),
        };
        assert_eq!(decoded, original);
    }

    #[test]
    fn legacy_file_rejects_wrong_signature_tag() {
        let mut buf = Vec::new();
        buf.push(LEGACY_FILE_HASH_TAG);
        buf.extend_from_slice(Hash48::digest(b"x").as_bytes());
        buf.push(0xFF); // wrong signature tag
        buf.extend_from_slice(&0u32.to_be_bytes());
        assert!(read_signed_state_file(&mut &buf[..]).is_err());
    }

    #[test]
    fn current_file_rejects_unsupported_version() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(999).unwrap();
        buf.write_all(Hash48::digest(b"x").as_bytes()).unwrap();
        sample_signature(1).write(&mut buf).unwrap();
        buf.write_all(Hash48::digest(b"y").as_bytes()).unwrap();
        sample_signature(2).write(&mut buf).unwrap();
        assert!(read_signed_state_file(&mut &buf[..]).is_err());
    }

    #[test]
    fn frame_header_round_trips_with_payload_length() {
        let header = FrameHeader {
            class_id: 0xDEAD_BEEF,
            version: 7,
        };
        let mut buf = Vec::new();
        header.write(&mut buf, 10).unwrap();
        buf.extend_from_slice(&[0u8; 10]);

        let (decoded, remaining) = FrameHeader::read(&mut &buf[..]).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(remaining, 10);
    }
}
