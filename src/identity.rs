//! Node identity model: overlay addressing, group membership, and the
//! lighthouse collection gathered during the signing wizard.
//!
//! The wizard accumulates state into [`NodeIdentityBuilder`] and only a
//! successful [`NodeIdentityBuilder::finish`] yields the immutable
//! [`NodeIdentity`] handed to the signing orchestrator. A non-lighthouse
//! identity cannot be finished without at least one lighthouse endpoint.

use crate::error::{NurseryError, Result};

/// A lighthouse a node can use for peer discovery: its overlay address plus
/// the public endpoint it listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LighthouseEndpoint {
    pub overlay_ip: String,
    pub public_host: String,
    pub public_port: u16,
}

/// Finalized identity for one node signing run.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub name: String,
    /// Overlay address in `a.b.c.d/n` form, passed through to the signer.
    pub overlay_ip: String,
    pub groups: Vec<String>,
    pub is_lighthouse: bool,
    /// Ordered, duplicate-tolerant. Never empty.
    pub lighthouses: Vec<LighthouseEndpoint>,
}

impl NodeIdentity {
    /// Comma-joined group list for the signer's `-groups` flag, or `None`
    /// when the node has no groups.
    pub fn groups_csv(&self) -> Option<String> {
        if self.groups.is_empty() {
            None
        } else {
            Some(self.groups.join(","))
        }
    }
}

/// Accumulates wizard input for one node. Mutable only until `finish`.
#[derive(Debug)]
pub struct NodeIdentityBuilder {
    name: String,
    overlay_ip: String,
    groups: Vec<String>,
    is_lighthouse: bool,
    lighthouses: Vec<LighthouseEndpoint>,
}

impl NodeIdentityBuilder {
    /// Start a builder from validated core fields.
    pub fn new(name: &str, overlay_ip: &str, groups_csv: &str, is_lighthouse: bool) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(NurseryError::Validation("node name must not be empty".into()));
        }
        validate_ipv4_subnet(overlay_ip).map_err(NurseryError::Validation)?;
        Ok(Self {
            name: name.trim().to_string(),
            overlay_ip: overlay_ip.trim().to_string(),
            groups: parse_groups(groups_csv),
            is_lighthouse,
            lighthouses: Vec::new(),
        })
    }

    pub fn is_lighthouse(&self) -> bool {
        self.is_lighthouse
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overlay_ip(&self) -> &str {
        &self.overlay_ip
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn lighthouse_count(&self) -> usize {
        self.lighthouses.len()
    }

    pub fn lighthouses(&self) -> &[LighthouseEndpoint] {
        &self.lighthouses
    }

    /// Register this node itself as the first lighthouse, using its own
    /// overlay address (subnet stripped) and the supplied public endpoint.
    pub fn seed_self_lighthouse(&mut self, public_host: &str, public_port: u16) {
        let overlay_ip = strip_subnet(&self.overlay_ip).to_string();
        self.lighthouses.push(LighthouseEndpoint {
            overlay_ip,
            public_host: public_host.trim().to_string(),
            public_port,
        });
    }

    /// Append a lighthouse. The collection is ordered and duplicates are
    /// kept as entered.
    pub fn add_lighthouse(&mut self, endpoint: LighthouseEndpoint) {
        self.lighthouses.push(endpoint);
    }

    /// Finalize into an immutable identity. Fails if no lighthouse was
    /// collected, so the signing flow can never proceed with an
    /// unreachable node.
    pub fn finish(self) -> Result<NodeIdentity> {
        if self.lighthouses.is_empty() {
            return Err(NurseryError::Validation(
                "at least one lighthouse is required before signing".into(),
            ));
        }
        Ok(NodeIdentity {
            name: self.name,
            overlay_ip: self.overlay_ip,
            groups: self.groups,
            is_lighthouse: self.is_lighthouse,
            lighthouses: self.lighthouses,
        })
    }
}

/// Split a comma-separated group list, trimming whitespace and dropping
/// empty items.
pub fn parse_groups(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate a dotted-quad IPv4 address. Octets must be in range; shape-only
/// acceptance of values like `999.999.999.999` is deliberately not carried
/// over.
pub fn validate_ipv4(input: &str) -> std::result::Result<(), String> {
    let input = input.trim();
    let octets: Vec<&str> = input.split('.').collect();
    if octets.len() != 4 {
        return Err("invalid IPv4 address".to_string());
    }
    for octet in octets {
        if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err("invalid IPv4 address".to_string());
        }
        if octet.parse::<u16>().map_err(|_| "invalid IPv4 address".to_string())? > 255 {
            return Err("IPv4 octets must be 0-255".to_string());
        }
    }
    Ok(())
}

/// Validate an IPv4 address with subnet in `a.b.c.d/n` form, prefix 0-32.
pub fn validate_ipv4_subnet(input: &str) -> std::result::Result<(), String> {
    let input = input.trim();
    let Some((addr, prefix)) = input.split_once('/') else {
        return Err("invalid IPv4 address, maybe you are missing the subnet?".to_string());
    };
    validate_ipv4(addr)?;
    match prefix.parse::<u8>() {
        Ok(n) if n <= 32 => Ok(()),
        _ => Err("subnet prefix must be 0-32".to_string()),
    }
}

fn strip_subnet(input: &str) -> &str {
    input.split('/').next().unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_subnet_accepts_valid() {
        assert!(validate_ipv4_subnet("10.0.0.5/24").is_ok());
        assert!(validate_ipv4_subnet("192.168.100.1/32").is_ok());
        assert!(validate_ipv4_subnet(" 10.10.0.5/24 ").is_ok());
    }

    #[test]
    fn test_ipv4_subnet_rejects_missing_subnet() {
        assert!(validate_ipv4_subnet("10.0.0.5").is_err());
    }

    #[test]
    fn test_ipv4_subnet_rejects_garbage() {
        assert!(validate_ipv4_subnet("not-an-ip/24").is_err());
        assert!(validate_ipv4_subnet("10.0.0/24").is_err());
        assert!(validate_ipv4_subnet("10.0.0.5/33").is_err());
        assert!(validate_ipv4_subnet("10.0.0.5/x").is_err());
    }

    #[test]
    fn test_ipv4_rejects_out_of_range_octets() {
        assert!(validate_ipv4("999.999.999.999").is_err());
        assert!(validate_ipv4("10.0.0.256").is_err());
        assert!(validate_ipv4("10.0.0.1").is_ok());
        assert!(validate_ipv4("0.0.0.0").is_ok());
        assert!(validate_ipv4("255.255.255.255").is_ok());
    }

    #[test]
    fn test_parse_groups() {
        assert_eq!(parse_groups("home, servers ,laptops"), vec![
            "home".to_string(),
            "servers".to_string(),
            "laptops".to_string()
        ]);
        assert!(parse_groups("").is_empty());
        assert!(parse_groups(" , ,").is_empty());
    }

    #[test]
    fn test_builder_requires_lighthouse() {
        let builder = NodeIdentityBuilder::new("laptop", "10.10.0.5/24", "", false).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(NurseryError::Validation(_))
        ));
    }

    #[test]
    fn test_builder_seeds_own_endpoint() {
        let mut builder =
            NodeIdentityBuilder::new("beacon", "10.10.0.1/24", "infra", true).unwrap();
        builder.seed_self_lighthouse("vpn.example.com", 4242);
        let identity = builder.finish().unwrap();
        assert_eq!(identity.lighthouses.len(), 1);
        assert_eq!(identity.lighthouses[0].overlay_ip, "10.10.0.1");
        assert_eq!(identity.lighthouses[0].public_host, "vpn.example.com");
        assert_eq!(identity.lighthouses[0].public_port, 4242);
    }

    #[test]
    fn test_builder_keeps_duplicates_in_order() {
        let mut builder = NodeIdentityBuilder::new("laptop", "10.10.0.5/24", "", false).unwrap();
        let lh = LighthouseEndpoint {
            overlay_ip: "10.10.0.1".into(),
            public_host: "vpn.example.com".into(),
            public_port: 4242,
        };
        builder.add_lighthouse(lh.clone());
        builder.add_lighthouse(lh.clone());
        let identity = builder.finish().unwrap();
        assert_eq!(identity.lighthouses, vec![lh.clone(), lh]);
    }

    #[test]
    fn test_builder_rejects_bad_core_fields() {
        assert!(NodeIdentityBuilder::new("", "10.0.0.5/24", "", false).is_err());
        assert!(NodeIdentityBuilder::new("laptop", "10.0.0.5", "", false).is_err());
    }

    #[test]
    fn test_groups_csv() {
        let mut builder =
            NodeIdentityBuilder::new("laptop", "10.10.0.5/24", "home,laptops", false).unwrap();
        builder.add_lighthouse(LighthouseEndpoint {
            overlay_ip: "10.10.0.1".into(),
            public_host: "vpn.example.com".into(),
            public_port: 4242,
        });
        let identity = builder.finish().unwrap();
        assert_eq!(identity.groups_csv(), Some("home,laptops".to_string()));

        let mut builder = NodeIdentityBuilder::new("laptop", "10.10.0.5/24", "", false).unwrap();
        builder.add_lighthouse(LighthouseEndpoint {
            overlay_ip: "10.10.0.1".into(),
            public_host: "vpn.example.com".into(),
            public_port: 4242,
        });
        assert_eq!(builder.finish().unwrap().groups_csv(), None);
    }
}
