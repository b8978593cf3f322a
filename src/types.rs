//! Data structures used throughout the tray agent.
//!
//! A [`Snapshot`] is the typed form of one `tailscale status --json` fetch.
//! Snapshots are rebuilt from scratch on every reconciliation cycle and are
//! never cached between cycles.  Only the fields the agent acts on are
//! decoded; everything else in the status document is ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static DNS_ENABLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Tailscale DNS:\s*enabled").expect("valid regex"));
static DNS_DISABLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Tailscale DNS:\s*disabled").expect("valid regex"));
static ACCEPT_ROUTES_FALSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--accept-routes\s+is\s+false").expect("valid regex"));

/// Display name of a node.
///
/// Nodes with a MagicDNS name are grouped under "My Devices"; nodes that
/// only carry a host name (shared services, funnels) under "Tailscale
/// Services".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerName {
    /// First label of the node's DNS name.
    AddressNamed(String),
    /// Bare host name, used when the node has no DNS name.
    HostNamed(String),
}

impl PeerName {
    fn from_raw(dns_name: &str, host_name: &str) -> Self {
        let dns_name = dns_name.trim_end_matches('.');
        match dns_name.split('.').next() {
            Some(label) if !label.is_empty() => PeerName::AddressNamed(label.to_string()),
            _ => PeerName::HostNamed(host_name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PeerName::AddressNamed(name) | PeerName::HostNamed(name) => name,
        }
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfNode {
    pub name: PeerName,
    pub addresses: Vec<String>,
    pub exit_node_active: bool,
}

impl SelfNode {
    pub fn canonical_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

/// A remote node visible to the local client.
///
/// `addresses` is never empty: peers without an address are dropped while
/// decoding since there is nothing to copy for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: PeerName,
    pub addresses: Vec<String>,
    pub exit_node_eligible: bool,
    pub exit_node_active: bool,
}

impl PeerRecord {
    /// Stable key used to correlate the peer with its menu entries.
    pub fn display_key(&self) -> &str {
        self.name.as_str()
    }

    pub fn canonical_address(&self) -> &str {
        self.addresses.first().map(String::as_str).unwrap_or_default()
    }
}

/// One status fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub self_node: SelfNode,
    pub connected: bool,
    /// Peers in node-key order.
    pub peers: Vec<PeerRecord>,
    pub health: Vec<String>,
}

impl Snapshot {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let status: RawStatus = serde_json::from_slice(raw)?;
        Ok(status.into())
    }

    /// True if the local node or any peer is currently routing as exit node.
    pub fn has_active_exit_node(&self) -> bool {
        self.self_node.exit_node_active || self.peers.iter().any(|p| p.exit_node_active)
    }

    /// Route acceptance as reported through the health advisories.
    pub fn routes_state(&self) -> ToggleState {
        if self.health.iter().any(|msg| ACCEPT_ROUTES_FALSE.is_match(msg)) {
            ToggleState::Disabled
        } else {
            ToggleState::Enabled
        }
    }
}

/// State of a boolean preference whose query may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Enabled,
    Disabled,
    Unknown,
}

impl ToggleState {
    pub fn is_checked(self) -> bool {
        matches!(self, ToggleState::Enabled)
    }
}

/// Parse the text output of `tailscale dns status`.
///
/// The first line announcing the state wins.  Output without such a line is
/// reported as disabled, not unknown.
pub fn parse_dns_status(text: &str) -> ToggleState {
    for line in text.lines() {
        if DNS_ENABLED.is_match(line) {
            return ToggleState::Enabled;
        }
        if DNS_DISABLED.is_match(line) {
            return ToggleState::Disabled;
        }
    }
    ToggleState::Disabled
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStatus {
    #[serde(default)]
    backend_state: String,
    #[serde(default)]
    tailscale_up: Option<bool>,
    #[serde(rename = "Self")]
    self_node: RawNode,
    #[serde(default, rename = "Peer")]
    peers: Option<BTreeMap<String, RawNode>>,
    #[serde(default)]
    health: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNode {
    #[serde(rename = "DNSName")]
    dns_name: String,
    #[serde(rename = "HostName")]
    host_name: String,
    #[serde(rename = "TailscaleIPs")]
    addresses: Option<Vec<String>>,
    #[serde(rename = "ExitNode")]
    exit_node: bool,
    #[serde(rename = "ExitNodeOption")]
    exit_node_option: bool,
}

impl From<RawStatus> for Snapshot {
    fn from(raw: RawStatus) -> Self {
        let connected = raw
            .tailscale_up
            .unwrap_or(raw.backend_state == "Running");

        let self_node = SelfNode {
            name: PeerName::from_raw(&raw.self_node.dns_name, &raw.self_node.host_name),
            addresses: raw.self_node.addresses.unwrap_or_default(),
            exit_node_active: raw.self_node.exit_node,
        };

        let peers = raw
            .peers
            .unwrap_or_default()
            .into_values()
            .filter_map(|node| {
                let name = PeerName::from_raw(&node.dns_name, &node.host_name);
                let addresses = node.addresses.unwrap_or_default();
                if addresses.is_empty() {
                    log::debug!("Skipping peer {} without addresses", name);
                    return None;
                }
                Some(PeerRecord {
                    name,
                    addresses,
                    exit_node_eligible: node.exit_node_option,
                    exit_node_active: node.exit_node,
                })
            })
            .collect();

        Snapshot {
            self_node,
            connected,
            peers,
            health: raw.health.unwrap_or_default(),
        }
    }
}
