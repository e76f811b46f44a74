//! Resilient calls against the external store.
//!
//! The store reports failures only as text. Classification by substring
//! lives here and nowhere else: the rest of the crate sees [`ErrorKind`].

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::config::GatewayConfig;
use crate::error::{CallError, ErrorKind};
use crate::store::StoreResult;

/// Markers of a busy store (server-call-retry-later and friends).
const TRANSIENT_MARKERS: [&str; 3] = [
    "rpc_e_servercall_retrylater",
    "call was rejected by callee",
    "0x8001010a",
];

/// Markers of an item or folder that no longer exists.
const NOT_FOUND_MARKERS: [&str; 3] = [
    "mapi_e_not_found",
    "object could not be found",
    "does not exist",
];

/// Classify a store failure by its message text.
pub fn classify(message: &str) -> ErrorKind {
    let text = message.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::Transient
    } else if NOT_FOUND_MARKERS.iter().any(|m| text.contains(m)) {
        ErrorKind::NotFound
    } else {
        ErrorKind::Unexpected
    }
}

/// Executes store calls, retrying transient failures a bounded number of times.
///
/// Holds no state between calls: every `execute` starts from attempt zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gateway {
    retries: u32,
    delay: Duration,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_millis(400),
        }
    }
}

impl Gateway {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.retries, Duration::from_millis(config.delay_ms))
    }

    /// Run `action`, retrying while it fails transiently and attempts remain.
    pub fn execute<T, F>(&self, description: &str, mut action: F) -> Result<T, CallError>
    where
        F: FnMut() -> StoreResult<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    let kind = classify(&err.message);
                    warn!(
                        description,
                        attempt,
                        ?kind,
                        error = %err,
                        "Store call failed"
                    );
                    if kind.is_transient() && attempt <= self.retries {
                        if !self.delay.is_zero() {
                            thread::sleep(self.delay);
                        }
                        continue;
                    }
                    return Err(CallError::new(description, err, kind));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::cell::Cell;

    fn fast(retries: u32) -> Gateway {
        Gateway::new(retries, Duration::ZERO)
    }

    #[test]
    fn test_classify_transient_markers() {
        assert_eq!(
            classify("(-2147418111, 'Call was rejected by callee.', None, None)"),
            ErrorKind::Transient
        );
        assert_eq!(classify("RPC_E_SERVERCALL_RETRYLATER"), ErrorKind::Transient);
        assert_eq!(classify("HRESULT 0x8001010A"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_not_found_markers() {
        assert_eq!(classify("MAPI_E_NOT_FOUND"), ErrorKind::NotFound);
        assert_eq!(
            classify("The object could not be found."),
            ErrorKind::NotFound
        );
        assert_eq!(classify("Folder does not exist"), ErrorKind::NotFound);
    }

    #[test]
    fn test_classify_unknown_is_unexpected() {
        assert_eq!(classify("Access denied"), ErrorKind::Unexpected);
        assert_eq!(classify(""), ErrorKind::Unexpected);
        // "busy" alone is not a marker
        assert_eq!(classify("server busy"), ErrorKind::Unexpected);
    }

    #[test]
    fn test_success_on_first_attempt() {
        let calls = Cell::new(0);
        let result = fast(1).execute("read", || {
            calls.set(calls.get() + 1);
            Ok::<_, StoreError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_transient_failure_is_retried_once() {
        let calls = Cell::new(0);
        let result = fast(1).execute("read", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(StoreError::new("Call was rejected by callee."))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_transient_failure_exhausts_retries() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(2).execute("read", || {
            calls.set(calls.get() + 1);
            Err(StoreError::new("RPC_E_SERVERCALL_RETRYLATER"))
        });
        let err = result.unwrap_err();
        assert_eq!(calls.get(), 3);
        assert!(err.transient());
        assert_eq!(err.description, "read");
    }

    #[test]
    fn test_not_found_is_never_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast(5).execute("fetch item", || {
            calls.set(calls.get() + 1);
            Err(StoreError::new("The object could not be found."))
        });
        let err = result.unwrap_err();
        assert_eq!(calls.get(), 1);
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!err.transient());
    }
}
