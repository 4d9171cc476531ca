use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Result of looking a handle up in the relay's user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityLookup {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
}

impl IdentityLookup {
    #[must_use]
    pub const fn not_found() -> Self {
        Self { exists: false, display_name: None, external_id: None }
    }

    #[must_use]
    pub const fn found(display_name: String, external_id: Option<i64>) -> Self {
        Self { exists: true, display_name: Some(display_name), external_id }
    }
}

/// Confirms a sender or receiver handle exists.
///
/// Implementations fail closed: any transport or directory error yields
/// `exists = false` and is only logged.
#[async_trait]
pub trait IdentityValidator: Send + Sync + std::fmt::Debug {
    async fn validate(&self, handle: &str) -> IdentityLookup;
}

#[derive(Clone, Debug)]
pub struct IdentityService {
    validator: Arc<dyn IdentityValidator>,
}

impl IdentityService {
    #[must_use]
    pub fn new(validator: Arc<dyn IdentityValidator>) -> Self {
        Self { validator }
    }

    /// Looks a handle up. Blank handles are reported missing without a directory call.
    #[tracing::instrument(skip(self))]
    pub async fn validate(&self, handle: &str) -> IdentityLookup {
        let handle = handle.trim();
        if handle.is_empty() {
            return IdentityLookup::not_found();
        }

        let lookup = self.validator.validate(handle).await;
        tracing::debug!(exists = lookup.exists, "Identity lookup finished");
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingValidator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityValidator for CountingValidator {
        async fn validate(&self, handle: &str) -> IdentityLookup {
            self.calls.fetch_add(1, Ordering::SeqCst);
            IdentityLookup::found(handle.to_uppercase(), Some(7))
        }
    }

    #[tokio::test]
    async fn test_blank_handle_skips_directory() {
        let validator = Arc::new(CountingValidator::default());
        let service = IdentityService::new(validator.clone());

        assert_eq!(service.validate("   ").await, IdentityLookup::not_found());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_is_trimmed() {
        let validator = Arc::new(CountingValidator::default());
        let service = IdentityService::new(validator.clone());

        let lookup = service.validate(" alice ").await;

        assert_eq!(lookup.display_name.as_deref(), Some("ALICE"));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }
}
