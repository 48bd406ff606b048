//! Thread-safe registry of per-type expiration policies.
//!
//! Writers are configuration-time callers; the scan only takes a snapshot at
//! the start of each pass, so re-registering mid-pass affects the next pass.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use super::policy::{ExpirationPolicy, PolicyError, PolicyInput};

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First policy for this record type.
    Added,
    /// An earlier policy for this record type was overwritten.
    Replaced,
    /// The store does not know the record type; nothing was registered.
    UnknownType,
}

struct RegisteredPolicy {
    seq: u64,
    policy: ExpirationPolicy,
}

#[derive(Default)]
struct RegistryInner {
    policies: HashMap<String, RegisteredPolicy>,
    next_seq: u64,
}

/// Mapping from record type to its expiration policy.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `input` and store it for `record_type`.
    ///
    /// On error the registry is left unchanged. Re-registering a type keeps
    /// its original position in iteration order.
    pub fn register(
        &self,
        record_type: &str,
        input: PolicyInput,
    ) -> Result<RegisterOutcome, PolicyError> {
        let policy = input.resolve(record_type)?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.policies.get_mut(record_type) {
            existing.policy = policy;
            return Ok(RegisterOutcome::Replaced);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .policies
            .insert(record_type.to_string(), RegisteredPolicy { seq, policy });
        Ok(RegisterOutcome::Added)
    }

    pub fn get(&self, record_type: &str) -> Option<ExpirationPolicy> {
        self.inner
            .read()
            .policies
            .get(record_type)
            .map(|entry| entry.policy.clone())
    }

    /// Remove a record type. Returns whether it was registered.
    pub fn unregister(&self, record_type: &str) -> bool {
        self.inner.write().policies.remove(record_type).is_some()
    }

    pub fn clear(&self) {
        self.inner.write().policies.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().policies.is_empty()
    }

    /// All registered policies in insertion order.
    pub fn snapshot(&self) -> Vec<(String, ExpirationPolicy)> {
        let inner = self.inner.read();
        let mut entries: Vec<_> = inner
            .policies
            .iter()
            .map(|(record_type, entry)| (entry.seq, record_type.clone(), entry.policy.clone()))
            .collect();
        entries.sort_unstable_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, record_type, policy)| (record_type, policy))
            .collect()
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PolicyRegistry")
            .field("record_types", &inner.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiration::policy::{DEFAULT_EXPIRE_AFTER_SECS, ExpirationAction};

    #[test]
    fn test_register_then_get_returns_defaults() {
        let registry = PolicyRegistry::new();
        let outcome = registry.register("expiration-test", PolicyInput::new()).unwrap();
        assert_eq!(outcome, RegisterOutcome::Added);

        let policy = registry.get("expiration-test").unwrap();
        assert_eq!(policy.action, ExpirationAction::Draft);
        assert_eq!(policy.expire_after_secs, DEFAULT_EXPIRE_AFTER_SECS);
        assert!(policy.update_args.is_none());
    }

    #[test]
    fn test_reregister_replaces_without_merging() {
        let registry = PolicyRegistry::new();
        registry
            .register(
                "expiration-test",
                PolicyInput::new().with_expire_after(86_400i64),
            )
            .unwrap();

        let outcome = registry
            .register("expiration-test", PolicyInput::new().with_action("trash"))
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Replaced);

        // The second call's omitted expire_after is defaulted, not inherited
        let policy = registry.get("expiration-test").unwrap();
        assert_eq!(policy.action, ExpirationAction::Trash);
        assert_eq!(policy.expire_after_secs, DEFAULT_EXPIRE_AFTER_SECS);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_registration_leaves_registry_unchanged() {
        let registry = PolicyRegistry::new();
        registry
            .register("expiration-test", PolicyInput::new().with_action("trash"))
            .unwrap();

        let result = registry.register(
            "expiration-test",
            PolicyInput::new().with_action("invalid-action"),
        );
        assert!(matches!(result, Err(PolicyError::InvalidPolicy { .. })));

        let result = registry.register(
            "other",
            PolicyInput::new().with_expire_after("unknown"),
        );
        assert!(result.is_err());

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("expiration-test").unwrap().action,
            ExpirationAction::Trash
        );
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_unregister_and_clear() {
        let registry = PolicyRegistry::new();
        registry.register("a", PolicyInput::new()).unwrap();
        registry.register("b", PolicyInput::new()).unwrap();

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.get("a").is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = PolicyRegistry::new();
        for record_type in ["zeta", "alpha", "mid"] {
            registry.register(record_type, PolicyInput::new()).unwrap();
        }
        // Replacing keeps the original slot
        registry
            .register("zeta", PolicyInput::new().with_action("delete"))
            .unwrap();

        let order: Vec<String> = registry.snapshot().into_iter().map(|(t, _)| t).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = PolicyRegistry::new();
        let handle = registry.clone();
        handle.register("post", PolicyInput::new()).unwrap();
        assert!(registry.get("post").is_some());
    }
}
