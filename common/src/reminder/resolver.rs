// Recipient resolution for a matched event

use crate::errors::StorageError;
use crate::models::{Event, Registration};
use crate::reminder::store::ReminderStore;
use tracing::{debug, instrument};

/// Confirmed registrations for `event`, loaded fresh at dispatch time.
///
/// Nothing is cached between runs: registrations confirmed or cancelled since
/// the previous run are reflected immediately.
#[instrument(skip(store, event), fields(event_id = %event.id))]
pub async fn resolve_recipients(
    store: &dyn ReminderStore,
    event: &Event,
) -> Result<Vec<Registration>, StorageError> {
    let recipients = store.find_confirmed_registrations(event.id).await?;
    debug!(count = recipients.len(), "Resolved confirmed recipients");
    Ok(recipients)
}
