//! Registration resolution.

use crate::models::{EventSource, Registration, RegistrationScope};
use crate::storage::RegistrationStore;
use crate::Result;
use std::sync::Arc;

/// Finds the registrations that apply to an event source.
#[derive(Clone)]
pub struct RegistrationResolver {
    store: Arc<dyn RegistrationStore>,
}

impl RegistrationResolver {
    /// Creates a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Active registrations scoped to the source's repository, its owner, or
    /// the whole system.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; no partial result is returned.
    pub fn resolve(&self, source: &EventSource) -> Result<Vec<Registration>> {
        let mut scopes = Vec::with_capacity(3);
        if let Some(repository) = &source.repository {
            scopes.push(RegistrationScope::Repository {
                repo_id: repository.id,
            });
        }
        if let Some(owner_id) = source.owner_id() {
            scopes.push(RegistrationScope::Owner { owner_id });
        }
        scopes.push(RegistrationScope::System);

        let mut registrations = Vec::new();
        for scope in &scopes {
            registrations.extend(self.store.find_active(scope)?);
        }

        tracing::debug!(
            repository = ?source.repository.as_ref().map(|r| r.id),
            owner = ?source.owner_id(),
            matched = registrations.len(),
            "Resolved webhook registrations"
        );
        Ok(registrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HookId, OwnerRef, RepositoryRef};
    use crate::storage::MemoryRegistrationStore;
    use crate::Error;

    fn repo(id: i64, owner_id: i64) -> RepositoryRef {
        RepositoryRef {
            id,
            owner_id,
            name: "widgets".to_string(),
            full_name: "acme/widgets".to_string(),
            html_url: String::new(),
        }
    }

    fn store() -> Arc<MemoryRegistrationStore> {
        Arc::new(MemoryRegistrationStore::new(vec![
            Registration::new(1, "https://a", RegistrationScope::Repository { repo_id: 10 }),
            Registration::new(2, "https://b", RegistrationScope::Repository { repo_id: 11 }),
            Registration::new(3, "https://c", RegistrationScope::Owner { owner_id: 5 }),
            Registration::new(4, "https://d", RegistrationScope::Owner { owner_id: 6 }),
            Registration::new(5, "https://e", RegistrationScope::System),
            Registration::new(6, "https://f", RegistrationScope::Repository { repo_id: 10 })
                .with_active(false),
        ]))
    }

    fn ids(registrations: &[Registration]) -> Vec<i64> {
        let mut ids: Vec<i64> = registrations.iter().map(|r| r.id.get()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_repository_source_unions_all_scopes() {
        let resolver = RegistrationResolver::new(store());
        let found = resolver.resolve(&EventSource::repository(repo(10, 5))).unwrap();
        assert_eq!(ids(&found), vec![1, 3, 5]);
    }

    #[test]
    fn test_owner_only_source() {
        let resolver = RegistrationResolver::new(store());
        let source = EventSource::owner(OwnerRef {
            id: 6,
            login: "globex".to_string(),
        });
        assert_eq!(ids(&resolver.resolve(&source).unwrap()), vec![4, 5]);
    }

    #[test]
    fn test_empty_source_gets_system_hooks() {
        let resolver = RegistrationResolver::new(store());
        let found = resolver.resolve(&EventSource::default()).unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![HookId::new(5)]);
    }

    struct FailingStore;

    impl RegistrationStore for FailingStore {
        fn find_active(&self, _scope: &RegistrationScope) -> Result<Vec<Registration>> {
            Err(Error::OperationFailed {
                operation: "find_registrations".to_string(),
                cause: "database is locked".to_string(),
            })
        }

        fn get(&self, _id: HookId) -> Result<Option<Registration>> {
            Ok(None)
        }
    }

    #[test]
    fn test_storage_error_aborts_resolution() {
        let resolver = RegistrationResolver::new(Arc::new(FailingStore));
        let result = resolver.resolve(&EventSource::repository(repo(10, 5)));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
