//! The request-scoped bag threaded through the pipeline (
//! "Context propagation"): deadline, cancellation, correlation id. Every
//! suspension point (upstream call, profile-DB call, GeoIP call, cache I/O)
//! consults it rather than being handed a bare `tokio::time::Instant`.

use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;

/// Per-request deadline/cancellation/correlation bag.
///
/// Cloning shares the same cancellation token: cancelling any clone cancels
/// the whole request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: u64,
    deadline: TokioInstant,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(id: u64, deadline: TokioInstant) -> Self {
        Self {
            id,
            deadline,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> TokioInstant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        TokioInstant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Race an arbitrary future against this context's deadline/cancellation.
    /// Returns `None` if the deadline passed or the request was cancelled
    /// before `fut` resolved.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            _ = tokio::time::sleep_until(self.deadline) => None,
            out = fut => Some(out),
        }
    }
}
