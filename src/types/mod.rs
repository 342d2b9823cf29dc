#![forbid(unsafe_code)]
//! Identifiers, phases, timestamps and the crate-wide error type.

pub mod checksum;
mod error;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use error::{EvolveError, Result};

/// Length in bytes of a changeset identifier.
pub const NODE_LEN: usize = 20;

/// Content hash identifying a changeset.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct NodeId(pub [u8; NODE_LEN]);

impl NodeId {
    /// The null sentinel: "no changeset". Never a valid marker successor.
    pub const NULL: NodeId = NodeId([0u8; NODE_LEN]);

    /// Returns true for the null sentinel.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Builds an identifier from a byte slice of exactly [`NODE_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NODE_LEN] = bytes
            .try_into()
            .map_err(|_| EvolveError::Corruption(format!("node id of {} bytes", bytes.len())))?;
        Ok(NodeId(arr))
    }

    /// Full 40-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated 12-character hex form used in user-facing output.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl FromStr for NodeId {
    type Err = EvolveError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != NODE_LEN * 2 {
            return Err(EvolveError::InvalidArgument(format!(
                "expected {} hex characters, got {}",
                NODE_LEN * 2,
                s.len()
            )));
        }
        let bytes =
            hex::decode(s).map_err(|err| EvolveError::InvalidArgument(format!("{s}: {err}")))?;
        NodeId::from_slice(&bytes)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Local revision number: the position of a changeset in creation order.
///
/// Revisions are only meaningful inside one repository and give every
/// "first"/"last" choice in the engine a deterministic total order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Rev(pub u32);

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Rev {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Mutability tier of a changeset. Ordering follows mutability:
/// `Public < Draft < Secret`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Immutable, shared history.
    Public,
    /// Mutable, not yet published.
    Draft,
    /// Mutable and never exchanged.
    Secret,
}

impl Phase {
    /// Whether changesets in this phase may be rewritten.
    pub fn is_mutable(self) -> bool {
        self > Phase::Public
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Public => "public",
            Phase::Draft => "draft",
            Phase::Secret => "secret",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EvolveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Phase::Public),
            "draft" => Ok(Phase::Draft),
            "secret" => Ok(Phase::Secret),
            other => Err(EvolveError::InvalidArgument(format!("unknown phase '{other}'"))),
        }
    }
}

/// Seconds since the epoch plus the author's UTC offset in seconds.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Timestamp {
    /// Unix time in seconds.
    pub secs: i64,
    /// Offset from UTC in seconds (east positive).
    pub offset: i32,
}

impl Timestamp {
    /// Builds a timestamp from raw parts.
    pub const fn new(secs: i64, offset: i32) -> Self {
        Self { secs, offset }
    }

    /// Current wall-clock time in UTC.
    pub fn now() -> Self {
        let now = time::OffsetDateTime::now_utc();
        Self {
            secs: now.unix_timestamp(),
            offset: 0,
        }
    }

    /// Parses either `"<secs> <offset>"` or an RFC 3339 date.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut parts = trimmed.split_whitespace();
        if let (Some(secs), Some(offset), None) = (parts.next(), parts.next(), parts.next()) {
            if let (Ok(secs), Ok(offset)) = (secs.parse::<i64>(), offset.parse::<i32>()) {
                return Ok(Self { secs, offset });
            }
        }
        let parsed =
            time::OffsetDateTime::parse(trimmed, &time::format_description::well_known::Rfc3339)
                .map_err(|err| EvolveError::InvalidArgument(format!("bad date '{raw}': {err}")))?;
        Ok(Self {
            secs: parsed.unix_timestamp(),
            offset: parsed.offset().whole_seconds(),
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.secs, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_hex_roundtrip() {
        let node = NodeId([0xab; NODE_LEN]);
        let parsed: NodeId = node.to_hex().parse().unwrap();
        assert_eq!(parsed, node);
        assert_eq!(node.short().len(), 12);
    }

    #[test]
    fn node_parse_rejects_short_input() {
        assert!("abcd".parse::<NodeId>().is_err());
    }

    #[test]
    fn phase_order_tracks_mutability() {
        assert!(Phase::Public < Phase::Draft);
        assert!(Phase::Draft < Phase::Secret);
        assert!(!Phase::Public.is_mutable());
        assert!(Phase::Secret.is_mutable());
    }

    #[test]
    fn timestamp_parses_both_forms() {
        assert_eq!(Timestamp::parse("10 -3600").unwrap(), Timestamp::new(10, -3600));
        let ts = Timestamp::parse("1970-01-01T00:01:00Z").unwrap();
        assert_eq!(ts, Timestamp::new(60, 0));
        assert!(Timestamp::parse("yesterday").is_err());
    }
}
