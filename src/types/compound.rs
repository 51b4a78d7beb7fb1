//! Compound datum encoding
//!
//! A compound datum concatenates two child data with a 4-byte native-endian
//! head-length prefix, so variable-length heads self-delimit:
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┐
//! │ head_len (4) │ head     │ tail     │
//! └──────────────┴──────────┴──────────┘
//! ```

use bytes::Bytes;

/// Concatenate two data into one compound datum
pub(crate) fn encode_pair(head: &[u8], tail: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(4 + head.len() + tail.len());
    buf.extend_from_slice(&(head.len() as u32).to_ne_bytes());
    buf.extend_from_slice(head);
    buf.extend_from_slice(tail);
    Bytes::from(buf)
}

/// Recover the two parts of a compound datum, or `None` if malformed
pub(crate) fn split_pair(datum: &[u8]) -> Option<(&[u8], &[u8])> {
    let prefix: [u8; 4] = datum.get(..4)?.try_into().ok()?;
    let head_len = u32::from_ne_bytes(prefix) as usize;
    if 4 + head_len > datum.len() {
        return None;
    }
    Some((&datum[4..4 + head_len], &datum[4 + head_len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let pair = encode_pair(b"abc", b"defg");
        let (head, tail) = split_pair(&pair).unwrap();
        assert_eq!(head, b"abc");
        assert_eq!(tail, b"defg");
    }

    #[test]
    fn empty_parts() {
        let pair = encode_pair(b"", b"");
        let (head, tail) = split_pair(&pair).unwrap();
        assert!(head.is_empty());
        assert!(tail.is_empty());
    }

    #[test]
    fn malformed_is_none() {
        assert!(split_pair(b"ab").is_none());
        assert!(split_pair(&[9, 0, 0, 0, 1]).is_none());
    }
}
