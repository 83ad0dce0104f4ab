//! Internal Address Record (C3): the virtual-IP / DNS / NBNS attribute
//! bundle exchanged in ModeCfg.

use std::net::Ipv4Addr;

/// The closed enum of attribute kinds ModeCfg recognizes (spec.md §6).
/// This is the single source of truth for which kinds are "supported":
/// the ACK intersection mask in `modecfg::protocol` is built from this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttrKind {
    Ipv4Address = 1,
    Ipv4Netmask = 2,
    Ipv4Dns = 3,
    Ipv4Nbns = 4,
    Ipv4Subnet = 13,
}

impl AttrKind {
    pub const ALL: [AttrKind; 5] = [
        AttrKind::Ipv4Address,
        AttrKind::Ipv4Netmask,
        AttrKind::Ipv4Dns,
        AttrKind::Ipv4Nbns,
        AttrKind::Ipv4Subnet,
    ];

    pub fn from_wire(kind: u16) -> Option<AttrKind> {
        match kind {
            1 => Some(AttrKind::Ipv4Address),
            2 => Some(AttrKind::Ipv4Netmask),
            3 => Some(AttrKind::Ipv4Dns),
            4 => Some(AttrKind::Ipv4Nbns),
            13 => Some(AttrKind::Ipv4Subnet),
            _ => None,
        }
    }

    pub fn wire_value(self) -> u16 {
        self as u16
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Bitset over `AttrKind`. A kind-bit is set only when the corresponding
/// field in `InternalAddress` is present and meaningful (spec.md §3
/// invariant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrSet(u32);

impl AttrSet {
    pub const fn empty() -> Self {
        AttrSet(0)
    }

    pub fn insert(&mut self, kind: AttrKind) {
        self.0 |= kind.bit() as u32;
    }

    pub fn contains(self, kind: AttrKind) -> bool {
        self.0 & (kind.bit() as u32) != 0
    }

    pub fn intersection(self, other: AttrSet) -> AttrSet {
        AttrSet(self.0 & other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = AttrKind> {
        AttrKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Mode-config attribute bundle (spec.md §3 "InternalAddress").
///
/// Default construction sets all addresses to the any-address sentinel and
/// `attr_set = ∅`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalAddress {
    pub attr_set: AttrSet,
    pub ipaddr: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    pub nbns: Vec<Ipv4Addr>,
}

impl Default for InternalAddress {
    fn default() -> Self {
        Self::default_impl()
    }
}

impl InternalAddress {
    fn default_impl() -> Self {
        Self {
            attr_set: AttrSet::empty(),
            ipaddr: Ipv4Addr::UNSPECIFIED,
            dns: Vec::new(),
            nbns: Vec::new(),
        }
    }

    /// Alias for `InternalAddress::default()`, named to match spec.md §4.3's
    /// `init()` operation.
    pub fn init() -> Self {
        Self::default_impl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_and_any_address() {
        let ia = InternalAddress::default();
        assert!(ia.attr_set.is_empty());
        assert_eq!(ia.ipaddr, Ipv4Addr::UNSPECIFIED);
        assert!(ia.dns.is_empty());
        assert!(ia.nbns.is_empty());
    }

    #[test]
    fn attr_set_bit_tracks_kind_presence() {
        let mut set = AttrSet::empty();
        assert!(!set.contains(AttrKind::Ipv4Address));

        set.insert(AttrKind::Ipv4Address);
        assert!(set.contains(AttrKind::Ipv4Address));
        assert!(!set.contains(AttrKind::Ipv4Dns));
    }

    #[test]
    fn unknown_wire_kind_does_not_parse() {
        assert_eq!(AttrKind::from_wire(99), None);
    }
}
