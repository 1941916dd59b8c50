use super::types::ProbeError;

/// What the caller should do after an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Abort the whole run.
    Fatal,
    /// Throw the browser session away, create a new one and retry the payload.
    RecreateSession,
    /// Give up on the current payload and move to the next one.
    SkipPayload,
    /// Dismiss whatever blocked the page and carry on as if nothing happened.
    Transparent,
    /// Log and keep going; the current step degrades but the payload completes.
    Continue,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub recovery: Recovery,
}

impl ErrorClassification {
    pub fn retryable(&self) -> bool {
        self.recovery == Recovery::RecreateSession
    }
}

/// Transport failures that mean the automation backend process is gone.
const CRASH_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection aborted",
    "connection reset",
    "remotedisconnected",
    "remote disconnected",
    "broken pipe",
    "invalid session id",
    "session deleted because of page crash",
    "browsing context has been discarded",
];

/// Returns true when an error message from the backend looks like a dead
/// browser process rather than a page-level failure.
pub fn is_crash_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    CRASH_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

impl ProbeError {
    /// Classify this error to determine how the worker recovers from it.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            ProbeError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                recovery: Recovery::Fatal,
            },
            ProbeError::SessionCreation(_) => ErrorClassification {
                error_type: "SessionCreationError",
                recovery: Recovery::Fatal,
            },
            ProbeError::NavigationTimeout(_) => ErrorClassification {
                error_type: "NavigationTimeout",
                recovery: Recovery::SkipPayload,
            },
            ProbeError::BackendCrash(_) => ErrorClassification {
                error_type: "BackendCrash",
                recovery: Recovery::RecreateSession,
            },
            ProbeError::Interstitial(_) => ErrorClassification {
                error_type: "InterstitialInterrupt",
                recovery: Recovery::Transparent,
            },
            ProbeError::Detection(_) => ErrorClassification {
                error_type: "DetectionError",
                recovery: Recovery::Continue,
            },
            ProbeError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                recovery: Recovery::Continue,
            },
            ProbeError::Network(msg) | ProbeError::Browser(msg) if is_crash_message(msg) => {
                ErrorClassification {
                    error_type: "BackendCrash",
                    recovery: Recovery::RecreateSession,
                }
            }
            ProbeError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                recovery: Recovery::SkipPayload,
            },
            ProbeError::Browser(_) => ErrorClassification {
                error_type: "BrowserError",
                recovery: Recovery::SkipPayload,
            },
            ProbeError::Io(_) => ErrorClassification {
                error_type: "IoError",
                recovery: Recovery::Continue,
            },
            ProbeError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                recovery: Recovery::SkipPayload,
            },
            ProbeError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                recovery: Recovery::Fatal,
            },
            ProbeError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                recovery: Recovery::SkipPayload,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_fatal() {
        let class = ProbeError::Config("missing marker".into()).classify();
        assert_eq!(class.recovery, Recovery::Fatal);
        assert_eq!(class.error_type, "ConfigError");
    }

    #[test]
    fn test_backend_crash_recreates_session() {
        let class = ProbeError::BackendCrash("gone".into()).classify();
        assert!(class.retryable());
    }

    #[test]
    fn test_network_connection_refused_is_crash() {
        let err = ProbeError::Network("error sending request: Connection refused (os error 111)".into());
        let class = err.classify();
        assert_eq!(class.error_type, "BackendCrash");
        assert!(class.retryable());
    }

    #[test]
    fn test_browser_invalid_session_is_crash() {
        let err = ProbeError::Browser("invalid session id: session deleted".into());
        assert!(err.classify().retryable());
    }

    #[test]
    fn test_plain_browser_error_skips_payload() {
        let err = ProbeError::Browser("no such element".into());
        let class = err.classify();
        assert_eq!(class.recovery, Recovery::SkipPayload);
        assert_eq!(class.error_type, "BrowserError");
    }

    #[test]
    fn test_timeout_is_not_retried() {
        let class = ProbeError::NavigationTimeout("10s".into()).classify();
        assert!(!class.retryable());
        assert_eq!(class.recovery, Recovery::SkipPayload);
    }

    #[test]
    fn test_interstitial_is_transparent() {
        let class = ProbeError::Interstitial("alert(1)".into()).classify();
        assert_eq!(class.recovery, Recovery::Transparent);
    }

    #[test]
    fn test_persistence_continues() {
        let class = ProbeError::Persistence("disk full".into()).classify();
        assert_eq!(class.recovery, Recovery::Continue);
    }

    #[test]
    fn test_crash_signatures_case_insensitive() {
        assert!(is_crash_message("RemoteDisconnected('Remote end closed')"));
        assert!(is_crash_message("Connection aborted."));
        assert!(!is_crash_message("element not interactable"));
    }
}
