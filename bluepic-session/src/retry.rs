//! Retry budget, eligibility policy and backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::{Response, SessionError, TransportErrorKind};

/// Remaining automatic retries for one logical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RetryBudget(u32);

impl RetryBudget {
    /// Budget allowing `retries` automatic resends.
    pub fn new(retries: u32) -> Self {
        Self(retries)
    }

    /// Remaining retries.
    pub fn remaining(&self) -> u32 {
        self.0
    }

    /// Whether no retries are left.
    pub fn is_exhausted(&self) -> bool {
        self.0 == 0
    }

    /// Budget for the next attempt, or `None` when exhausted.
    pub fn decrement(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl From<u32> for RetryBudget {
    fn from(retries: u32) -> Self {
        Self(retries)
    }
}

/// Decides whether a failed exchange is resent automatically.
pub trait RetryPolicy: Send + Sync {
    /// Check if the logical request should be resent.
    ///
    /// Implementations must return `false` when `budget` is exhausted.
    fn should_retry(
        &self,
        response: Option<&Response>,
        error: Option<&SessionError>,
        budget: RetryBudget,
    ) -> bool;

    /// Delay before the given retry (0-indexed).
    fn retry_delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Retry policy for timeouts, lost connections and gateway timeouts.
///
/// Transport failures are only retried while the connectivity monitor reports
/// some network. Without a monitor the connectivity gate is skipped.
#[derive(Clone)]
pub struct DefaultRetryPolicy {
    /// Transport failures that trigger a retry.
    pub retryable_kinds: Vec<TransportErrorKind>,
    /// Status codes that trigger a retry.
    pub retryable_status_codes: Vec<u16>,
    /// Backoff between retries.
    pub backoff: BackoffStrategy,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
}

impl fmt::Debug for DefaultRetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRetryPolicy")
            .field("retryable_kinds", &self.retryable_kinds)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("backoff", &self.backoff)
            .field("connectivity_gate", &self.connectivity.is_some())
            .finish()
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self {
            retryable_kinds: vec![
                TransportErrorKind::TimedOut,
                TransportErrorKind::CannotConnectToHost,
                TransportErrorKind::NetworkConnectionLost,
            ],
            retryable_status_codes: vec![504],
            backoff: BackoffStrategy::None,
            connectivity: None,
        }
    }
}

impl DefaultRetryPolicy {
    /// Create the default policy without a connectivity gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate transport retries on the given connectivity monitor.
    pub fn with_connectivity(mut self, monitor: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the retryable status codes.
    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    fn has_connectivity(&self) -> bool {
        match &self.connectivity {
            Some(monitor) => monitor.current_connectivity() != Connectivity::None,
            None => true,
        }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(
        &self,
        response: Option<&Response>,
        error: Option<&SessionError>,
        budget: RetryBudget,
    ) -> bool {
        if budget.is_exhausted() {
            return false;
        }

        if let Some(kind) = error.and_then(SessionError::transport_kind)
            && self.retryable_kinds.contains(&kind)
        {
            if self.has_connectivity() {
                return true;
            }
            error!(
                kind = %kind,
                "Cannot retry the request because the device has no internet connection"
            );
            return false;
        }

        response.is_some_and(|r| self.retryable_status_codes.contains(&r.status().as_u16()))
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Default)]
pub enum BackoffStrategy {
    /// No delay between retries.
    #[default]
    None,
    /// Constant delay between retries.
    Constant(Duration),
    /// Linear backoff: delay increases by a fixed amount.
    Linear {
        /// Delay increment per attempt.
        delay: Duration,
        /// Maximum delay.
        max: Duration,
    },
    /// Exponential backoff: delay doubles each attempt.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier (typically 2.0).
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Linear { delay, max } => {
                let total = delay.saturating_mul(attempt + 1);
                total.min(*max)
            }
            Self::Exponential { initial, max, multiplier } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::FixedConnectivity;
    use http::StatusCode;

    fn timeout() -> SessionError {
        SessionError::transport(TransportErrorKind::TimedOut, "timed out")
    }

    #[test]
    fn test_budget_never_goes_negative() {
        let budget = RetryBudget::new(1);
        let next = budget.decrement().unwrap();

        assert_eq!(next.remaining(), 0);
        assert!(next.is_exhausted());
        assert!(next.decrement().is_none());
    }

    #[test]
    fn test_exhausted_budget_is_never_eligible() {
        let policy = DefaultRetryPolicy::new();
        let gateway = Response::new(StatusCode::GATEWAY_TIMEOUT);

        assert!(!policy.should_retry(None, Some(&timeout()), RetryBudget::new(0)));
        assert!(!policy.should_retry(Some(&gateway), None, RetryBudget::new(0)));
    }

    #[test]
    fn test_transport_errors() {
        let policy = DefaultRetryPolicy::new();
        let budget = RetryBudget::new(2);

        for kind in [
            TransportErrorKind::TimedOut,
            TransportErrorKind::CannotConnectToHost,
            TransportErrorKind::NetworkConnectionLost,
        ] {
            let err = SessionError::transport(kind, "failed");
            assert!(policy.should_retry(None, Some(&err), budget));
        }

        let other = SessionError::transport(TransportErrorKind::Other, "tls");
        assert!(!policy.should_retry(None, Some(&other), budget));
    }

    #[test]
    fn test_connectivity_gate() {
        let offline = DefaultRetryPolicy::new()
            .with_connectivity(Arc::new(FixedConnectivity(Connectivity::None)));
        assert!(!offline.should_retry(None, Some(&timeout()), RetryBudget::new(3)));

        let local = DefaultRetryPolicy::new()
            .with_connectivity(Arc::new(FixedConnectivity(Connectivity::Local)));
        assert!(local.should_retry(None, Some(&timeout()), RetryBudget::new(3)));
    }

    #[test]
    fn test_only_gateway_timeout_status_is_retried() {
        let policy = DefaultRetryPolicy::new();
        let budget = RetryBudget::new(1);

        let gateway = Response::new(StatusCode::GATEWAY_TIMEOUT);
        let unavailable = Response::new(StatusCode::SERVICE_UNAVAILABLE);
        let ok = Response::new(StatusCode::OK);

        assert!(policy.should_retry(Some(&gateway), None, budget));
        assert!(!policy.should_retry(Some(&unavailable), None, budget));
        assert!(!policy.should_retry(Some(&ok), None, budget));
        assert!(!policy.should_retry(None, None, budget));
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = BackoffStrategy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        };

        assert_eq!(strategy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(strategy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_linear_and_default_backoff() {
        let strategy = BackoffStrategy::Linear {
            delay: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };

        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(strategy.delay_for_attempt(9), Duration::from_secs(1));
        assert_eq!(DefaultRetryPolicy::new().retry_delay(4), Duration::ZERO);
    }
}
