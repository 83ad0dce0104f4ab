//! Connection Store (C2): lookup of a configured connection by host-pair
//! with priority-based tie-breaking.

use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::address::AttrSet;
use crate::error::ConnectionStoreError;

/// Sentinel meaning "unspecified" (spec.md GLOSSARY: Any-address).
pub const ANY_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Mutable fields that ModeCfg may update in place (spec.md §4.3).
#[derive(Debug, Default, Clone)]
struct MutableState {
    host_srcip: Option<Ipv4Addr>,
    client_subnet: Option<(Ipv4Addr, u8)>,
    has_client: bool,
}

/// A configuration entry (spec.md §3 "Connection").
///
/// Identity fields (`name`, `local`, `remote`) are fixed at construction.
/// The fields ModeCfg can assign (`host_srcip` and friends) live behind a
/// lock so every `Arc<Connection>` handed out by the store observes the
/// same mutation, matching "the store retains the authoritative reference".
#[derive(Debug)]
pub struct Connection {
    pub name: String,
    pub local: Ipv4Addr,
    pub remote: Ipv4Addr,
    pub local_id: String,
    pub remote_id: String,
    pub dns: Vec<Ipv4Addr>,
    pub nbns: Vec<Ipv4Addr>,
    state: Mutex<MutableState>,
}

impl Connection {
    pub fn new(name: impl Into<String>, local: Ipv4Addr, remote: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            local,
            remote,
            local_id: String::new(),
            remote_id: String::new(),
            dns: Vec::new(),
            nbns: Vec::new(),
            state: Mutex::new(MutableState::default()),
        }
    }

    pub fn with_host_srcip(mut self, addr: Ipv4Addr) -> Self {
        self.state.get_mut().host_srcip = Some(addr);
        self
    }

    pub fn with_dns(mut self, dns: Vec<Ipv4Addr>) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_nbns(mut self, nbns: Vec<Ipv4Addr>) -> Self {
        self.nbns = nbns;
        self
    }

    pub fn host_srcip(&self) -> Option<Ipv4Addr> {
        self.state.lock().host_srcip
    }

    pub fn client_subnet(&self) -> Option<(Ipv4Addr, u8)> {
        self.state.lock().client_subnet
    }

    pub fn has_client(&self) -> bool {
        self.state.lock().has_client
    }

    /// Assigns `host_srcip` and the derived `/32` client subnet, as
    /// `apply_to_connection` (spec.md §4.3) requires. Replacing an existing,
    /// different `host_srcip` is logged, not rejected.
    fn set_host_srcip(&self, addr: Ipv4Addr) {
        let mut state = self.state.lock();
        if let Some(previous) = state.host_srcip {
            if previous != addr {
                warn!(connection = %self.name, %previous, new = %addr, "replacing host_srcip");
            }
        }
        state.host_srcip = Some(addr);
        state.client_subnet = Some((addr, 32));
        state.has_client = true;
    }

    fn remote_match_priority(&self, remote: Ipv4Addr) -> Option<u8> {
        if self.remote == remote {
            Some(2) // ADDR_MATCH
        } else if self.remote == ANY_ADDR {
            Some(1) // ADDR_ANY
        } else {
            None
        }
    }
}

/// Concurrent registry of configured connections (spec.md §4.2).
///
/// A single mutex serializes all operations. This is coarse, but the store
/// is consulted at session setup, not per-packet, so contention is not a
/// concern worth a lock-free structure.
pub struct ConnectionStore {
    entries: Mutex<Vec<Arc<Connection>>>,
}

impl Default for ConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends `connection`. Duplicate names are rejected by the
    /// configuration layer, not here.
    pub fn add(&self, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        debug!(name = %connection.name, "connection added");
        self.entries.lock().push(connection.clone());
        connection
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<Connection>, ConnectionStoreError> {
        self.entries
            .lock()
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| ConnectionStoreError::NotFound(name.to_string()))
    }

    /// Scans all entries; classifies the remote match as `ADDR_MATCH`
    /// (priority 2, exact) or `ADDR_ANY` (priority 1, wildcard remote).
    /// The highest-priority candidate wins; ties are broken first-inserted-wins.
    pub fn get_by_hosts(
        &self,
        local: Ipv4Addr,
        remote: Ipv4Addr,
    ) -> Result<Arc<Connection>, ConnectionStoreError> {
        let entries = self.entries.lock();

        let mut best: Option<(u8, &Arc<Connection>)> = None;
        for candidate in entries.iter() {
            if candidate.local != local {
                continue;
            }

            let Some(priority) = candidate.remote_match_priority(remote) else {
                continue;
            };

            match best {
                Some((best_priority, _)) if priority <= best_priority => {}
                _ => best = Some((priority, candidate)),
            }
        }

        best.map(|(_, c)| c.clone())
            .ok_or(ConnectionStoreError::NoHostMatch {
                local: local.into(),
                remote: remote.into(),
            })
    }

    /// Removes and destroys the entry named `name`.
    pub fn delete(&self, name: &str) -> Result<(), ConnectionStoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|c| c.name != name);
        if entries.len() == before {
            return Err(ConnectionStoreError::NotFound(name.to_string()));
        }
        debug!(%name, "connection removed");
        Ok(())
    }

    /// Snapshot of the current entries. Unlike the teacher's iterator, this
    /// clones the `Arc`s up front rather than holding the store's lock for
    /// the iterator's lifetime: callers "release it promptly" by construction.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies a ModeCfg-derived virtual address to `connection` (spec.md
/// §4.3 `apply_to_connection`). Returns `true` iff an address was applied.
pub fn apply_to_connection(connection: &Connection, ia: &crate::address::InternalAddress) -> bool {
    if !ia.attr_set.contains(crate::address::AttrKind::Ipv4Address) {
        return false;
    }

    connection.set_host_srcip(ia.ipaddr);
    true
}

/// Builds an `InternalAddress` to offer `connection`'s peer (spec.md §4.3
/// `get_from_connection`).
pub fn get_from_connection(connection: &Connection) -> crate::address::InternalAddress {
    let mut ia = crate::address::InternalAddress::default();

    if let Some(addr) = connection.host_srcip() {
        ia.ipaddr = addr;
        ia.attr_set.insert(crate::address::AttrKind::Ipv4Address);
        ia.attr_set.insert(crate::address::AttrKind::Ipv4Netmask);
    }

    if !connection.dns.is_empty() {
        ia.dns = connection.dns.clone();
        ia.attr_set.insert(crate::address::AttrKind::Ipv4Dns);
    }

    if !connection.nbns.is_empty() {
        ia.nbns = connection.nbns.clone();
        ia.attr_set.insert(crate::address::AttrKind::Ipv4Nbns);
    }

    ia
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ip(s: &str) -> Ipv4Addr {
        Ipv4Addr::from_str(s).unwrap()
    }

    #[test]
    fn priority_tie_break_favours_exact_remote_over_wildcard() {
        let store = ConnectionStore::new();
        store.add(Connection::new("A", ip("1.1.1.1"), ip("2.2.2.2")));
        store.add(Connection::new("B", ip("1.1.1.1"), ANY_ADDR));

        let got = store.get_by_hosts(ip("1.1.1.1"), ip("2.2.2.2")).unwrap();
        assert_eq!(got.name, "A");

        let got = store.get_by_hosts(ip("1.1.1.1"), ip("3.3.3.3")).unwrap();
        assert_eq!(got.name, "B");
    }

    #[test]
    fn get_by_hosts_requires_exact_local_match() {
        let store = ConnectionStore::new();
        store.add(Connection::new("A", ip("1.1.1.1"), ANY_ADDR));

        assert!(store.get_by_hosts(ip("9.9.9.9"), ip("2.2.2.2")).is_err());
    }

    #[test]
    fn first_inserted_wins_among_equal_priority_candidates() {
        let store = ConnectionStore::new();
        store.add(Connection::new("first", ip("1.1.1.1"), ip("2.2.2.2")));
        store.add(Connection::new("second", ip("1.1.1.1"), ip("2.2.2.2")));

        let got = store.get_by_hosts(ip("1.1.1.1"), ip("2.2.2.2")).unwrap();
        assert_eq!(got.name, "first");
    }

    #[test]
    fn delete_removes_and_reports_not_found() {
        let store = ConnectionStore::new();
        store.add(Connection::new("A", ip("1.1.1.1"), ip("2.2.2.2")));
        store.delete("A").unwrap();
        assert!(store.delete("A").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn apply_to_connection_is_idempotent() {
        let conn = Connection::new("A", ip("1.1.1.1"), ip("2.2.2.2"));
        let mut ia = crate::address::InternalAddress::default();
        ia.ipaddr = ip("10.1.2.3");
        ia.attr_set.insert(crate::address::AttrKind::Ipv4Address);

        assert!(apply_to_connection(&conn, &ia));
        let after_first = conn.client_subnet();

        assert!(apply_to_connection(&conn, &ia));
        assert_eq!(conn.client_subnet(), after_first);
        assert_eq!(conn.host_srcip(), Some(ip("10.1.2.3")));
    }
}
