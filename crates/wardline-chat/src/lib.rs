//! Two-party staff messaging over the wardline store.
//!
//! Write paths (`repository`, `stream`, `notifications`) go through atomic
//! store batches. Read paths are live: `subscription` turns the store's
//! change feed into ordered snapshots and `view` runs read-state
//! reconciliation for the conversation a user has open.

pub mod error;
pub mod identity;
pub mod notifications;
pub mod projector;
pub mod reconciler;
pub mod repository;
pub mod stream;
pub mod subscription;
pub mod view;

use std::sync::Arc;

use wardline_db::Database;

pub use error::{ChatError, Result};

/// Run a synchronous store call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use wardline_db::Database;
    use wardline_types::models::StaffProfile;

    pub fn staff(id: &str, name: &str, role: &str) -> StaffProfile {
        StaffProfile {
            id: id.into(),
            name: name.into(),
            surname: "Test".into(),
            role: role.into(),
        }
    }

    /// In-memory store seeded with a nurse ("u1"), a doctor ("u2") and an admin.
    pub fn seeded_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.put_user(&staff("u1", "Alice", "nurse")).unwrap();
        db.put_user(&staff("u2", "Bob", "doctor")).unwrap();
        db.put_user(&staff("admin1", "Ada", "admin")).unwrap();
        Arc::new(db)
    }
}
