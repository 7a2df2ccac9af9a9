//! Finalizer removal with optimistic retry

use tracing::{debug, warn};

use crate::cluster::StateStore;
use crate::error::{Result, SyncError};

/// Remove `finalizer` from the unit `name`.
///
/// Each attempt re-reads the unit and writes back a copy without the
/// finalizer, so a conflict from a concurrent writer is resolved by the next
/// attempt. Succeeds as soon as the unit is gone or no longer holds the
/// finalizer. After `attempts` failures the last error is returned.
pub async fn remove_finalizer<S>(store: &S, name: &str, finalizer: &str, attempts: u32) -> Result<()>
where
    S: StateStore + ?Sized,
{
    if attempts == 0 {
        return Err(SyncError::InvalidConfig(
            "finalizer removal needs at least one attempt".to_string(),
        ));
    }

    let mut last_error = None;
    for attempt in 1..=attempts {
        let mut unit = match store.get_unit(name).await {
            Ok(Some(unit)) => unit,
            Ok(None) => return Ok(()),
            Err(e) => {
                debug!(name, attempt, error = %e, "failed to read unit");
                last_error = Some(e);
                continue;
            }
        };

        if !unit.remove_finalizer(finalizer) {
            return Ok(());
        }

        match store.replace_unit(&unit).await {
            Ok(_) => {
                debug!(name, attempt, "removed finalizer");
                return Ok(());
            }
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                debug!(name, attempt, error = %e, "failed to remove finalizer");
                last_error = Some(e);
            }
        }
    }

    warn!(name, attempts, "giving up on finalizer removal");
    Err(last_error.unwrap_or_else(|| SyncError::Conflict {
        kind: crate::unit::UNIT_KIND.to_string(),
        name: name.to_string(),
        message: "finalizer still present".to_string(),
    }))
}
