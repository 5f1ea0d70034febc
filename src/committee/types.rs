use serde::{Serialize, Deserialize};
use std::fmt;

/// Identifier of a logical service tracked by a committee
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Namespace([u8; 32]);

impl Namespace {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a namespace from its hex representation
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self)
    }
}

/// Identity of a committee member (its node signing key)
///
/// Distinct from the member's transport peer identity, which is resolved through the
/// chain's node directory.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId([u8; 32]);

impl MemberId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell members apart in logs
        write!(f, "MemberId({})", &hex::encode(self.0)[..16])
    }
}

/// Committee status snapshot published by the chain
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServiceStatus {
    /// Service the status belongs to
    pub id: Namespace,

    /// Whether the service is able to serve requests
    pub is_initialized: bool,

    /// Current committee members
    pub nodes: Vec<MemberId>,
}

/// Caller's verdict on the previous committee call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerVerdict {
    Success,
    Failure,
    BadPeer,
}

/// Kind of enclave call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Call over an established secure session
    NoiseSession,

    /// Query that does not need a secure session
    InsecureQuery,

    /// Query answered by the local node only
    LocalQuery,
}

/// Reasons a set of peers is important to keep connected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportanceKind {
    /// Members of a tracked committee
    CommitteeMember,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_hex() {
        let ns = Namespace::new([0xab; 32]);
        let parsed = Namespace::from_hex(&ns.to_string()).unwrap();
        assert_eq!(parsed, ns);

        assert!(Namespace::from_hex("abcd").is_err());
        assert!(Namespace::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_member_id_display() {
        let member = MemberId::new([1; 32]);
        assert_eq!(member.to_string(), "01".repeat(32));
        assert_eq!(format!("{:?}", member), format!("MemberId({})", "01".repeat(8)));
    }
}
