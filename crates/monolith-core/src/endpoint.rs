//! Priority-ordered endpoint candidates for a single service.

use crate::error::{ConfigError, ConfigResult};
use crate::types::ServiceId;

/// Ordered candidate addresses for one logical service.
///
/// Index 0 is the primary. Addresses are opaque strings (a base URL or
/// `host:port`) compared by exact value. The set is immutable once built
/// and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    service_id: ServiceId,
    addresses: Vec<String>,
}

impl EndpointSet {
    /// Build an endpoint set, rejecting empty sets and blank addresses.
    pub fn new(service_id: impl Into<ServiceId>, addresses: Vec<String>) -> ConfigResult<Self> {
        let service_id = service_id.into();
        if addresses.is_empty() {
            return Err(ConfigError::EmptyEndpointSet(service_id));
        }
        if let Some(index) = addresses.iter().position(|a| a.trim().is_empty()) {
            return Err(ConfigError::BlankAddress {
                service: service_id,
                index,
            });
        }
        Ok(Self {
            service_id,
            addresses,
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.addresses.get(index).map(String::as_str)
    }

    /// The highest-priority address.
    pub fn primary(&self) -> &str {
        &self.addresses[0]
    }

    /// Index of an address in priority order, by exact match.
    pub fn position(&self, address: &str) -> Option<usize> {
        self.addresses.iter().position(|a| a == address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.position(address).is_some()
    }

    /// Iterate `(index, address)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.addresses.iter().map(String::as_str).enumerate()
    }
}
