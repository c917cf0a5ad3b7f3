use std::fmt;

/// Validation style of a fabric. Enterprise fabrics validate layered
/// per-level nodes; service-provider fabrics and logical-router maps use a
/// single combined node. The claim state machine is shared, only the set of
/// node paths differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FabricStyle {
    Enterprise,
    ServiceProvider,
    LogicalRouter,
}

impl FabricStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FabricStyle::Enterprise => "enterprise",
            FabricStyle::ServiceProvider => "service-provider",
            FabricStyle::LogicalRouter => "logical-router",
        }
    }
}

impl fmt::Display for FabricStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Fabric,
    VirtualNetwork,
    VirtualPortGroup,
    Vlan,
    /// Marker for the untagged-VLAN slot of a port group; carries no id.
    Untagged,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Fabric => "fabric",
            ScopeKind::VirtualNetwork => "virtual-network",
            ScopeKind::VirtualPortGroup => "virtual-port-group",
            ScopeKind::Vlan => "vlan",
            ScopeKind::Untagged => "untagged",
        }
    }
}

/// One `(kind, id)` element of a claim scope, rendered as `<kind>:<id>`
/// in node paths (`untagged` renders bare).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeSegment {
    kind: ScopeKind,
    id: String,
}

impl ScopeSegment {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn fabric(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Fabric, id)
    }

    pub fn virtual_network(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::VirtualNetwork, id)
    }

    pub fn virtual_port_group(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::VirtualPortGroup, id)
    }

    pub fn vlan(tag: u16) -> Self {
        Self::new(ScopeKind::Vlan, tag.to_string())
    }

    pub fn untagged() -> Self {
        Self::new(ScopeKind::Untagged, String::new())
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ScopeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}:{}", self.kind.as_str(), self.id)
        }
    }
}

/// Ordered scope segments identifying one uniqueness boundary, parent
/// first. Immutable once constructed; every node path in the system goes
/// through this builder so addressing stays collision-free across styles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    segments: Vec<ScopeSegment>,
}

impl ResourceKey {
    pub fn new(segments: Vec<ScopeSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[ScopeSegment] {
        &self.segments
    }

    /// Single node path holding the whole key under `prefix`.
    pub fn node_path(&self, prefix: &str) -> String {
        let mut path = prefix.trim_end_matches('/').to_string();
        for seg in &self.segments {
            path.push('/');
            path.push_str(&seg.to_string());
        }
        path
    }

    /// One node path per cumulative parent-to-child prefix of the key:
    /// `[a]`, `[a, b]`, `[a, b, c]` for a three-segment key.
    pub fn layered_paths(&self, prefix: &str) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.segments.len());
        let mut path = prefix.trim_end_matches('/').to_string();
        for seg in &self.segments {
            path.push('/');
            path.push_str(&seg.to_string());
            paths.push(path.clone());
        }
        paths
    }

    /// The cumulative sub-keys matching [`Self::layered_paths`], parent
    /// first. Each layered node is scoped by its own prefix of the key.
    pub fn prefix_keys(&self) -> Vec<ResourceKey> {
        (1..=self.segments.len())
            .map(|n| ResourceKey::new(self.segments[..n].to_vec()))
            .collect()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_rendering() {
        assert_eq!(
            ScopeSegment::virtual_network("vn-1").to_string(),
            "virtual-network:vn-1"
        );
        assert_eq!(ScopeSegment::vlan(101).to_string(), "vlan:101");
        assert_eq!(ScopeSegment::untagged().to_string(), "untagged");
    }

    #[test]
    fn test_combined_node_path() {
        let key = ResourceKey::new(vec![
            ScopeSegment::virtual_port_group("vpg-1"),
            ScopeSegment::virtual_network("vn-1"),
            ScopeSegment::vlan(101),
        ]);
        assert_eq!(
            key.node_path("/vnc/fabric-validate/service-provider"),
            "/vnc/fabric-validate/service-provider/virtual-port-group:vpg-1/virtual-network:vn-1/vlan:101"
        );
    }

    #[test]
    fn test_layered_paths_are_cumulative() {
        let key = ResourceKey::new(vec![
            ScopeSegment::fabric("fab-1"),
            ScopeSegment::virtual_network("vn-1"),
        ]);
        assert_eq!(
            key.layered_paths("/vnc/fabric-validate/enterprise"),
            vec![
                "/vnc/fabric-validate/enterprise/fabric:fab-1".to_string(),
                "/vnc/fabric-validate/enterprise/fabric:fab-1/virtual-network:vn-1".to_string(),
            ]
        );
    }

    #[test]
    fn test_trailing_slash_in_prefix_is_ignored() {
        let key = ResourceKey::new(vec![ScopeSegment::fabric("f")]);
        assert_eq!(key.node_path("/p/"), "/p/fabric:f");
    }

    #[test]
    fn test_untagged_slot_path() {
        let key = ResourceKey::new(vec![
            ScopeSegment::virtual_port_group("vpg-1"),
            ScopeSegment::untagged(),
        ]);
        assert_eq!(
            key.node_path("/vnc/fabric-validate/enterprise"),
            "/vnc/fabric-validate/enterprise/virtual-port-group:vpg-1/untagged"
        );
    }
}
