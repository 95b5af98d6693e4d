//! Registration lookup trait.

use crate::Result;
use crate::models::{HookId, Registration, RegistrationScope};

/// Read access to webhook registrations.
///
/// Registrations are managed elsewhere; delivery only looks them up.
pub trait RegistrationStore: Send + Sync {
    /// Returns the active registrations with exactly this scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn find_active(&self, scope: &RegistrationScope) -> Result<Vec<Registration>>;

    /// Looks up a registration by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn get(&self, id: HookId) -> Result<Option<Registration>>;
}
