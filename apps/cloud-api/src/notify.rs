//! Receipt notification capability.
//!
//! Settlement fires a "receipt ready" event after its transaction commits.
//! Delivery (push, chat, printer spooler) belongs to an external
//! collaborator; this subsystem only calls the capability and does not care
//! whether delivery succeeds. A notifier failure is logged, never surfaced,
//! never retried here, and can never roll settlement back.

use tracing::info;

use vela_core::Sale;

/// Fire-and-forget notification capability.
///
/// Implementations must return quickly and swallow their own failures; the
/// call happens outside the settlement transaction and is never awaited
/// inside it.
pub trait ReceiptNotifier: Send + Sync {
    /// A sale has been settled and its receipt can be produced.
    fn receipt_ready(&self, sale: &Sale);
}

/// Default notifier: emits a structured log line.
pub struct LogNotifier;

impl ReceiptNotifier for LogNotifier {
    fn receipt_ready(&self, sale: &Sale) {
        info!(
            sale_id = %sale.id,
            total = sale.total_minor,
            customer = sale.customer_id.as_deref().unwrap_or("-"),
            "Receipt ready"
        );
    }
}

/// No-op notifier for tests.
pub struct NoOpNotifier;

impl ReceiptNotifier for NoOpNotifier {
    fn receipt_ready(&self, _sale: &Sale) {}
}
