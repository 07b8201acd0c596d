//! In-memory state store for tests and embedding hosts

use super::{KeyRouterState, StateStore};
use crate::error::{AppError, AppResult};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<KeyRouterState>,
    read_only: bool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: KeyRouterState) -> Self {
        Self {
            state: Mutex::new(state),
            read_only: false,
        }
    }

    /// A store whose saves always fail
    pub fn read_only() -> Self {
        Self {
            state: Mutex::default(),
            read_only: true,
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> KeyRouterState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, state: &KeyRouterState) -> AppResult<()> {
        if self.read_only {
            return Err(AppError::StateWrite {
                path: "<memory>".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "store is read-only",
                ),
            });
        }
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state.clone();
        Ok(())
    }
}
