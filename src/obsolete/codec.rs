//! Binary obsstore file format.
//!
//! ```text
//! header : "EVOB" version:u8
//! record : len:u32be crc32:u32be payload[len]
//! payload: flags:u8 precursor[20] nsucc:varint succ[20]*nsucc
//!          date:zigzag offset:zigzag nmeta:varint (klen:varint key vlen:varint value)*nmeta
//! ```
//!
//! Markers are written verbatim, null successors included; repairing
//! legacy records is the store's job.

use std::collections::BTreeMap;

use crate::obsolete::marker::{Marker, MarkerFlags};
use crate::primitives::bytes::{buf::Cursor, var};
use crate::types::checksum::record_crc32;
use crate::types::{EvolveError, NodeId, Result, Timestamp, NODE_LEN};

/// File magic.
pub const MAGIC: &[u8; 4] = b"EVOB";
/// Current format version.
pub const VERSION: u8 = 1;
/// Header length in bytes.
pub const HEADER_LEN: usize = MAGIC.len() + 1;

const RECORD_PREFIX_LEN: usize = 8;

/// Bytes of an empty obsstore file.
pub fn encode_header() -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out
}

/// Appends one framed record for `marker` to `out`.
pub fn encode_record(marker: &Marker, out: &mut Vec<u8>) {
    let payload = encode_payload(marker);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&record_crc32(&payload).to_be_bytes());
    out.extend_from_slice(&payload);
}

/// Header followed by one record per marker.
pub fn encode_file<'a, I: IntoIterator<Item = &'a Marker>>(markers: I) -> Vec<u8> {
    let mut out = encode_header();
    for marker in markers {
        encode_record(marker, &mut out);
    }
    out
}

fn encode_payload(marker: &Marker) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + NODE_LEN * (1 + marker.successors.len()) + 16);
    out.push(marker.flags.0);
    out.extend_from_slice(&marker.precursor.0);
    var::encode_u64(marker.successors.len() as u64, &mut out);
    for succ in &marker.successors {
        out.extend_from_slice(&succ.0);
    }
    var::encode_i64(marker.date.secs, &mut out);
    var::encode_i64(i64::from(marker.date.offset), &mut out);
    var::encode_u64(marker.metadata.len() as u64, &mut out);
    for (key, value) in &marker.metadata {
        var::encode_u64(key.len() as u64, &mut out);
        out.extend_from_slice(key.as_bytes());
        var::encode_u64(value.len() as u64, &mut out);
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Decodes a whole obsstore file. An empty input is an empty store.
pub fn decode_file(bytes: &[u8]) -> Result<Vec<Marker>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut cur = Cursor::new(bytes);
    let magic = cur.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(EvolveError::Corruption("obsstore magic mismatch".into()));
    }
    let version = cur.u8()?;
    if version != VERSION {
        return Err(EvolveError::Corruption(format!(
            "unsupported obsstore version {version}"
        )));
    }
    let mut markers = Vec::new();
    while !cur.is_empty() {
        let offset = cur.off;
        if cur.remaining() < RECORD_PREFIX_LEN {
            return Err(EvolveError::Corruption(format!(
                "truncated record header at offset {offset}"
            )));
        }
        let len = cur.u32_be()? as usize;
        let crc = cur.u32_be()?;
        let payload = cur.take(len).map_err(|_| {
            EvolveError::Corruption(format!("truncated record at offset {offset}"))
        })?;
        if record_crc32(payload) != crc {
            return Err(EvolveError::Corruption(format!(
                "checksum mismatch for record at offset {offset}"
            )));
        }
        markers.push(decode_payload(payload)?);
    }
    Ok(markers)
}

fn decode_payload(payload: &[u8]) -> Result<Marker> {
    let mut cur = Cursor::new(payload);
    let flags = MarkerFlags(cur.u8()?);
    let precursor = NodeId::from_slice(cur.take(NODE_LEN)?)?;
    let count = bounded_len(cur.var_u64()?, cur.remaining() / NODE_LEN)?;
    let mut successors = Vec::with_capacity(count);
    for _ in 0..count {
        successors.push(NodeId::from_slice(cur.take(NODE_LEN)?)?);
    }
    let secs = cur.var_i64()?;
    let offset = i32::try_from(cur.var_i64()?)
        .map_err(|_| EvolveError::Corruption("timezone offset out of range".into()))?;
    let entries = bounded_len(cur.var_u64()?, cur.remaining())?;
    let mut metadata = BTreeMap::new();
    for _ in 0..entries {
        let key = read_string(&mut cur)?;
        let value = read_string(&mut cur)?;
        metadata.insert(key, value);
    }
    if !cur.is_empty() {
        return Err(EvolveError::Corruption(format!(
            "{} trailing bytes in marker record",
            cur.remaining()
        )));
    }
    Ok(Marker {
        precursor,
        successors,
        flags,
        metadata,
        date: Timestamp::new(secs, offset),
    })
}

fn bounded_len(raw: u64, limit: usize) -> Result<usize> {
    usize::try_from(raw)
        .ok()
        .filter(|len| *len <= limit)
        .ok_or_else(|| EvolveError::Corruption(format!("length {raw} exceeds record size")))
}

fn read_string(cur: &mut Cursor<'_>) -> Result<String> {
    let len = bounded_len(cur.var_u64()?, cur.remaining())?;
    let raw = cur.take(len)?;
    String::from_utf8(raw.to_vec())
        .map_err(|err| EvolveError::Corruption(format!("metadata is not UTF-8: {err}")))
}
