//! In-process directory.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nodegrid_config::SocketEndpoint;
use tracing::debug;

use super::{DIRECTORY_TARGET, Directory, DirectoryError, ServiceDescriptor};
use crate::capability::Capability;

/// Directory held in a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    services: DashMap<String, ServiceDescriptor>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Directory for InMemoryDirectory {
    fn create(
        &self,
        id: &str,
        service_interface: Capability,
        implementation: Capability,
    ) -> Result<ServiceDescriptor, DirectoryError> {
        match self.services.entry(id.to_owned()) {
            Entry::Occupied(_) => Err(DirectoryError::AlreadyExists { id: id.to_owned() }),
            Entry::Vacant(vacant) => {
                let descriptor = ServiceDescriptor::new(id, service_interface, implementation);
                vacant.insert(descriptor.clone());
                debug!(target: DIRECTORY_TARGET, id, "service created");
                Ok(descriptor)
            }
        }
    }

    fn lookup(&self, id: &str) -> Result<Option<ServiceDescriptor>, DirectoryError> {
        Ok(self.services.get(id).map(|entry| entry.value().clone()))
    }

    fn remove(&self, id: &str) -> Result<bool, DirectoryError> {
        let removed = self.services.remove(id).is_some();
        if removed {
            debug!(target: DIRECTORY_TARGET, id, "service removed");
        }
        Ok(removed)
    }

    fn bind_address(
        &self,
        id: &str,
        transport: &str,
        endpoint: SocketEndpoint,
    ) -> Result<ServiceDescriptor, DirectoryError> {
        let mut entry = self
            .services
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound { id: id.to_owned() })?;
        debug!(target: DIRECTORY_TARGET, id, transport, endpoint = %endpoint, "address bound");
        entry.addresses.insert(transport.to_owned(), endpoint);
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::sync::Arc;
    use std::thread;

    #[fixture]
    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
    }

    fn create_node(directory: &InMemoryDirectory, id: &str) -> Result<ServiceDescriptor, DirectoryError> {
        directory.create(id, Capability::EXECUTION_NODE, Capability::new("test"))
    }

    #[rstest]
    fn create_then_lookup(directory: InMemoryDirectory) {
        let created = create_node(&directory, "n1").expect("create");

        assert!(created.addresses.is_empty());
        assert_eq!(directory.lookup("n1").expect("lookup"), Some(created));
        assert_eq!(directory.lookup("n2").expect("lookup"), None);
    }

    #[rstest]
    fn duplicate_create_is_rejected(directory: InMemoryDirectory) {
        create_node(&directory, "n1").expect("create");
        let error = create_node(&directory, "n1").expect_err("duplicate");
        assert!(matches!(error, DirectoryError::AlreadyExists { .. }));
    }

    #[rstest]
    fn bind_address_replaces_per_transport(directory: InMemoryDirectory) {
        create_node(&directory, "n1").expect("create");
        directory
            .bind_address("n1", "socket", SocketEndpoint::tcp("127.0.0.1", 1))
            .expect("first bind");
        let descriptor = directory
            .bind_address("n1", "socket", SocketEndpoint::tcp("127.0.0.1", 2))
            .expect("second bind");

        assert_eq!(descriptor.address("socket"), Some(&SocketEndpoint::tcp("127.0.0.1", 2)));
        assert_eq!(descriptor.addresses.len(), 1);
    }

    #[rstest]
    fn bind_address_requires_descriptor(directory: InMemoryDirectory) {
        let error = directory
            .bind_address("ghost", "socket", SocketEndpoint::tcp("127.0.0.1", 1))
            .expect_err("missing descriptor");
        assert!(matches!(error, DirectoryError::NotFound { .. }));
    }

    #[rstest]
    fn remove_reports_presence(directory: InMemoryDirectory) {
        create_node(&directory, "n1").expect("create");
        assert!(directory.remove("n1").expect("remove"));
        assert!(!directory.remove("n1").expect("remove again"));
    }

    #[test]
    fn concurrent_creates_admit_exactly_one() {
        let directory = Arc::new(InMemoryDirectory::new());
        let winners: usize = (0..8)
            .map(|_| {
                let directory = Arc::clone(&directory);
                thread::spawn(move || usize::from(create_node(&directory, "n1").is_ok()))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|worker| worker.join().expect("worker thread"))
            .sum();
        assert_eq!(winners, 1);
    }
}
