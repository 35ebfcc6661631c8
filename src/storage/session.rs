//! Database handle and per-request sessions
//!
//! A [`Database`] is the explicit connection context handed to every
//! DataStore. Each logical request checks out a [`Session`], which is
//! released by [`Session::close`] or, on every other exit path, by `Drop`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::config::StorageConfig;
use crate::core::types::ObjectIdSource;
use crate::core::{Result, StorageError};
use crate::datastore::Store;
use crate::query::{QueryBuilder, RestrictedQueryBuilder, UnrestrictedQueryBuilder};
use crate::security::CallerIdentity;
use crate::storage::factory::{create_backend, SharedBackend};
use crate::storage::StorageResult;
use crate::system::metrics;

/// Connection context shared by all sessions
#[derive(Debug, Clone)]
pub struct Database {
    backend: SharedBackend,
    config: StorageConfig,
    active: Arc<AtomicUsize>,
}

impl Database {
    /// Connect using the configured backend
    pub fn connect(config: &StorageConfig) -> Self {
        Self::with_backend(config, create_backend(config))
    }

    /// Wrap an existing backend
    pub fn with_backend(config: &StorageConfig, backend: SharedBackend) -> Self {
        debug!(database = %config.database, "Database connected");
        Self {
            backend,
            config: config.clone(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Storage configuration in effect
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Number of sessions currently checked out
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Check out a session, failing once `max_sessions` are open
    pub fn session(&self) -> StorageResult<Session> {
        let max = self.config.max_sessions;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (max == 0 || open < max).then_some(open + 1)
            })
            .map_err(|_| StorageError::SessionLimit { max })?;

        metrics::session_opened();
        debug!(active = self.active_sessions(), "Session opened");

        Ok(Session {
            backend: self.backend.clone(),
            active: self.active.clone(),
            open: AtomicBool::new(true),
        })
    }

    /// Open a session bound to the query builder for `caller`: unrestricted
    /// when anonymous, restricted when authenticated
    pub fn datastore(&self, caller: Option<CallerIdentity>) -> Result<Store> {
        let builder: Arc<dyn QueryBuilder> = match caller {
            Some(caller) => Arc::new(RestrictedQueryBuilder::new(caller)),
            None => Arc::new(UnrestrictedQueryBuilder::new()),
        };

        Ok(Store::new(self.session()?, builder, Arc::new(ObjectIdSource)))
    }
}

/// A checked-out connection
#[derive(Debug)]
pub struct Session {
    backend: SharedBackend,
    active: Arc<AtomicUsize>,
    open: AtomicBool,
}

impl Session {
    /// Backend for this session; fails once the session was closed
    pub fn backend(&self) -> StorageResult<&SharedBackend> {
        if self.is_open() {
            Ok(&self.backend)
        } else {
            Err(StorageError::SessionClosed)
        }
    }

    /// True until closed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Release the session; later calls are no-ops
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.active.fetch_sub(1, Ordering::AcqRel);
            metrics::session_closed();
            debug!("Session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(max: usize) -> Database {
        Database::connect(&StorageConfig {
            max_sessions: max,
            ..Default::default()
        })
    }

    #[test]
    fn test_session_limit_and_release() {
        let db = limited(2);
        let first = db.session().unwrap();
        let _second = db.session().unwrap();

        assert!(matches!(
            db.session(),
            Err(StorageError::SessionLimit { max: 2 })
        ));

        first.close();
        assert_eq!(db.active_sessions(), 1);
        let _third = db.session().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let db = limited(1);
        {
            let _session = db.session().unwrap();
            assert_eq!(db.active_sessions(), 1);
        }
        assert_eq!(db.active_sessions(), 0);
    }

    #[test]
    fn test_closed_session_refuses_work() {
        let db = limited(0);
        let session = db.session().unwrap();
        session.close();
        session.close();

        assert!(matches!(session.backend(), Err(StorageError::SessionClosed)));
        assert_eq!(db.active_sessions(), 0);
    }

    #[test]
    fn test_datastore_releases_on_error_path() {
        let db = limited(1);
        {
            let _store = db.datastore(None).unwrap();
            assert!(db.datastore(None).is_err());
        }
        assert!(db.datastore(None).is_ok());
    }
}
