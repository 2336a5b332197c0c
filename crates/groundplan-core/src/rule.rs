//! Trust rule model
//!
//! One firewall permission entry: protocol, port range and an allowed
//! source. Rules are pure data; the only behavior is validation at
//! construction. A rule set has union semantics, so re-ordering rules never
//! changes meaning and duplicates are idempotent.

use crate::deferred::Deferred;
use crate::error::{PlanError, Result};
use crate::id::GroupId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel port for [`Protocol::All`] rules, where the range is ignored.
pub const FULL_RANGE_PORT: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

impl Protocol {
    /// Wire representation used in materialized rules (`-1` means all).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "-1",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Where permitted traffic may come from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// Other members of the same group. Structural: needs no identifier.
    SelfGroup,
    /// Members of another group, identified once that group materializes.
    PeerGroup(Deferred<GroupId>),
    /// A fixed CIDR block.
    Cidr(String),
    /// The CIDR blocks of a set of subnets, known after an async lookup.
    VpcCidrs(Deferred<Vec<String>>),
}

impl RuleSource {
    /// Stable key used to deduplicate rules. Deferred sources key on their
    /// handle label, so two references to the same pending group collapse.
    fn dedup_key(&self) -> String {
        match self {
            RuleSource::SelfGroup => "self".to_string(),
            RuleSource::PeerGroup(group) => format!("peer:{}", group.label()),
            RuleSource::Cidr(cidr) => format!("cidr:{cidr}"),
            RuleSource::VpcCidrs(cidrs) => format!("vpc:{}", cidrs.label()),
        }
    }
}

/// One firewall permission.
#[derive(Debug, Clone)]
pub struct TrustRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
    pub description: String,
}

impl TrustRule {
    /// Validates the port range; `Protocol::All` ignores the given range
    /// and normalizes to the full-range sentinel.
    pub fn new(
        protocol: Protocol,
        from_port: i64,
        to_port: i64,
        source: RuleSource,
        description: impl Into<String>,
    ) -> Result<Self> {
        let (from_port, to_port) = match protocol {
            Protocol::All => (FULL_RANGE_PORT, FULL_RANGE_PORT),
            _ => {
                let valid = 0..=i64::from(u16::MAX);
                if !valid.contains(&from_port) || !valid.contains(&to_port) || from_port > to_port
                {
                    return Err(PlanError::InvalidRuleRange {
                        from: from_port,
                        to: to_port,
                    });
                }
                (from_port as u16, to_port as u16)
            }
        };

        Ok(Self {
            protocol,
            from_port,
            to_port,
            source,
            description: description.into(),
        })
    }

    /// TCP on one port from other members of the same group.
    pub fn tcp(port: i64, description: impl Into<String>) -> Result<Self> {
        Self::new(Protocol::Tcp, port, port, RuleSource::SelfGroup, description)
    }

    /// UDP on one port from other members of the same group.
    pub fn udp(port: i64, description: impl Into<String>) -> Result<Self> {
        Self::new(Protocol::Udp, port, port, RuleSource::SelfGroup, description)
    }

    /// TCP on one port from members of a peer group.
    pub fn tcp_from_group(
        port: i64,
        group: Deferred<GroupId>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            Protocol::Tcp,
            port,
            port,
            RuleSource::PeerGroup(group),
            description,
        )
    }

    /// UDP on one port from members of a peer group.
    pub fn udp_from_group(
        port: i64,
        group: Deferred<GroupId>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            Protocol::Udp,
            port,
            port,
            RuleSource::PeerGroup(group),
            description,
        )
    }

    /// TCP on one port from a fixed CIDR block.
    pub fn tcp_from_cidr(
        port: i64,
        cidr: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            Protocol::Tcp,
            port,
            port,
            RuleSource::Cidr(cidr.into()),
            description,
        )
    }

    /// TCP on one port from the CIDR blocks of a set of subnets.
    pub fn tcp_from_vpc_cidrs(
        port: i64,
        cidrs: Deferred<Vec<String>>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            Protocol::Tcp,
            port,
            port,
            RuleSource::VpcCidrs(cidrs),
            description,
        )
    }

    /// The standard egress rule: all traffic to anywhere.
    pub fn all_to_anywhere() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: FULL_RANGE_PORT,
            to_port: FULL_RANGE_PORT,
            source: RuleSource::Cidr("0.0.0.0/0".to_string()),
            description: "all traffic".to_string(),
        }
    }

    /// Key identifying the effective permission; the description does not
    /// participate, so two rules differing only in wording deduplicate.
    pub(crate) fn dedup_key(&self) -> String {
        format!(
            "{}:{}-{}:{}",
            self.protocol,
            self.from_port,
            self.to_port,
            self.source.dedup_key()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_range_is_rejected() {
        let err = TrustRule::new(Protocol::Tcp, 100, 50, RuleSource::SelfGroup, "bad").unwrap_err();
        assert_eq!(err, PlanError::InvalidRuleRange { from: 100, to: 50 });
    }

    #[test]
    fn negative_and_oversized_ports_are_rejected() {
        assert!(matches!(
            TrustRule::new(Protocol::Tcp, -1, 22, RuleSource::SelfGroup, "bad"),
            Err(PlanError::InvalidRuleRange { .. })
        ));
        assert!(matches!(
            TrustRule::new(Protocol::Udp, 0, 70000, RuleSource::SelfGroup, "bad"),
            Err(PlanError::InvalidRuleRange { .. })
        ));
    }

    #[test]
    fn all_protocol_normalizes_to_full_range() {
        let rule =
            TrustRule::new(Protocol::All, 8000, 9000, RuleSource::SelfGroup, "anything").unwrap();
        assert_eq!(rule.from_port, FULL_RANGE_PORT);
        assert_eq!(rule.to_port, FULL_RANGE_PORT);
        assert_eq!(rule.protocol.wire_name(), "-1");
    }

    #[test]
    fn dedup_key_ignores_description() {
        let a = TrustRule::tcp(8301, "serf lan").unwrap();
        let b = TrustRule::tcp(8301, "gossip").unwrap();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_distinguishes_sources() {
        let peer = Deferred::ready("sg:consul-client", GroupId::new("sg-consul-client"));
        let from_self = TrustRule::tcp(8300, "rpc").unwrap();
        let from_peer = TrustRule::tcp_from_group(8300, peer, "rpc from clients").unwrap();
        assert_ne!(from_self.dedup_key(), from_peer.dedup_key());
    }

    #[test]
    fn same_peer_handle_collapses() {
        let peer = Deferred::ready("sg:consul-client", GroupId::new("sg-consul-client"));
        let a = TrustRule::tcp_from_group(8500, peer.clone(), "http api").unwrap();
        let b = TrustRule::tcp_from_group(8500, peer, "http api from clients").unwrap();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
