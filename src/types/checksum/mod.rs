#![forbid(unsafe_code)]
//! Checksums guarding persisted marker records.

/// Checksum of one marker record: the record length is mixed in so a
/// truncated-then-extended payload does not verify.
pub fn record_crc32(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(payload.len() as u32).to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_crc32_detects_payload_changes() {
        let payload = vec![0u8; 16];
        assert_eq!(record_crc32(&payload), record_crc32(&payload));

        let mut different = payload.clone();
        different[3] = 1;
        assert_ne!(record_crc32(&payload), record_crc32(&different));
        assert_ne!(record_crc32(&payload), record_crc32(&payload[..15]));
    }

    #[test]
    fn record_length_is_part_of_the_checksum() {
        let payload = b"marker";
        assert_ne!(record_crc32(payload), crc32fast::hash(payload));
    }
}
