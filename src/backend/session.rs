use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::Identity;

/// Process-wide signed-in user, set by the login flow and read by the
/// backend.
#[derive(Default)]
pub struct SessionStore {
    user: RwLock<Option<Identity>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Identity> {
        self.read().clone()
    }

    pub fn set_user(&self, user: Identity) {
        *self.write() = Some(user);
    }

    pub fn clear(&self) {
        self.write().take();
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Identity>> {
        match self.user.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Identity>> {
        match self.user.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
