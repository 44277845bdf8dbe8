//! Admin notifications
//!
//! Delivery is best-effort by contract: callers log a failed send and move
//! on, so a broken relay can never stall change propagation.

use crate::error::Result;
use crate::models::NewConflict;

/// Outbound notification channel
pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that writes the message to the log instead of a mail relay
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!("Notification for {recipient}: {subject}\n{body}");
        Ok(())
    }
}

/// Subject and body for a newly recorded conflict
#[must_use]
pub fn conflict_notification(
    conflict_id: i64,
    conflict: &NewConflict,
    link: &str,
) -> (String, String) {
    let subject = format!(
        "[trisync] Data conflict #{conflict_id}: {} pk={}",
        conflict.table_name, conflict.pk_value
    );
    let body = format!(
        "A data conflict was detected during synchronization.\n\
         \n\
         Table: {table}\n\
         Primary key: {pk}\n\
         Source db: {source} (version {source_version})\n\
         Target db: {target} (version {target_version})\n\
         \n\
         View details and resolve: {link}\n\
         The link is valid for 24 hours.\n",
        table = conflict.table_name,
        pk = conflict.pk_value,
        source = conflict.source_db,
        source_version = fmt_version(conflict.source_version),
        target = conflict.target_db,
        target_version = fmt_version(conflict.target_version),
    );
    (subject, body)
}

fn fmt_version(version: Option<i64>) -> String {
    version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}
