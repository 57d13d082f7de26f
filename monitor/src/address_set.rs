//! Deduplicating address container built during a single read pass.
//!
//! Addresses are compared by value after canonicalisation, so an IPv4-mapped
//! IPv6 literal (`::ffff:10.0.0.5`) and its IPv4 form (`10.0.0.5`) are the
//! same entry. Insertion order is preserved so that the sink receives
//! addresses in the order they appeared in the log.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An ordered, deduplicating set of IP addresses.
///
/// The set is internally synchronized. In practice only the owning tailer
/// mutates an instance, but the stats path or a forwarding task may read it
/// concurrently.
#[derive(Debug, Default)]
pub struct AddressSet {
    addresses: Mutex<Vec<IpAddr>>,
}

impl AddressSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an address, returning `true` if it was not already present.
    pub fn add(&self, address: IpAddr) -> bool {
        let address = address.to_canonical();
        let mut guard = self.lock();
        if guard.contains(&address) {
            return false;
        }
        guard.push(address);
        true
    }

    /// Adds every address of `other`, preserving its order.
    pub fn extend<I>(&self, other: I)
    where
        I: IntoIterator<Item = IpAddr>,
    {
        for address in other {
            self.add(address);
        }
    }

    /// Returns a copy of the current contents in insertion order.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.lock().clone()
    }

    /// Consumes the set and returns its contents.
    pub fn into_addresses(self) -> Vec<IpAddr> {
        self.addresses
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of distinct addresses.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no address has been added.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IpAddr>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIterator<IpAddr> for AddressSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        let set = Self::new();
        set.extend(iter);
        set
    }
}
