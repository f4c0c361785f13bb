//! Idempotency key - 論理的に同一なジョブの指紋
//!
//! `"{namespace}:duplicate:{queue}:{sha256(class:args_json)}"`
//!
//! serde_json の Map は BTreeMap なので、同じ引数なら常に同じ JSON になり、
//! 再 enqueue をまたいでもキーは安定します。

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::JobPayload;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key for `payload`, or `None` when no deterministic key can be formed.
    ///
    /// An explicit `idempotency_key` on the payload wins; an empty one, or a
    /// blank worker class, yields no key at all.
    pub fn for_payload(namespace: &str, payload: &JobPayload) -> Option<Self> {
        if let Some(explicit) = &payload.idempotency_key {
            let explicit = explicit.trim();
            return (!explicit.is_empty()).then(|| Self(explicit.to_string()));
        }

        let class = payload.class.as_str().trim();
        if class.is_empty() {
            return None;
        }

        let args = serde_json::to_string(&payload.args).ok()?;
        let digest = Sha256::digest(format!("{class}:{args}").as_bytes());
        Some(Self(format!(
            "{namespace}:duplicate:{}:{}",
            payload.queue,
            hex::encode(digest)
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the exclusive lease guarding this idempotency key.
    pub fn lock_key(&self) -> String {
        format!("{}:lock", self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Jid, WorkerClass};
    use serde_json::json;
    use ulid::Ulid;

    fn payload(class: &str, args: Vec<serde_json::Value>) -> JobPayload {
        JobPayload::new(WorkerClass::new(class), args, Jid::from_ulid(Ulid::new()))
    }

    #[test]
    fn same_work_gets_the_same_key_across_jids() {
        let a = IdempotencyKey::for_payload("bobbin", &payload("Refresh", vec![json!(1)])).unwrap();
        let b = IdempotencyKey::for_payload("bobbin", &payload("Refresh", vec![json!(1)])).unwrap();

        assert_eq!(a, b);
        assert!(a.as_str().starts_with("bobbin:duplicate:default:"));
        assert_eq!(a.as_str().rsplit(':').next().unwrap().len(), 64);
    }

    #[test]
    fn different_args_or_class_differ() {
        let base = IdempotencyKey::for_payload("bobbin", &payload("Refresh", vec![json!(1)]));
        let other_args = IdempotencyKey::for_payload("bobbin", &payload("Refresh", vec![json!(2)]));
        let other_class = IdempotencyKey::for_payload("bobbin", &payload("Recalc", vec![json!(1)]));

        assert_ne!(base, other_args);
        assert_ne!(base, other_class);
    }

    #[test]
    fn object_args_are_order_insensitive() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();

        assert_eq!(
            IdempotencyKey::for_payload("ns", &payload("Refresh", vec![a])),
            IdempotencyKey::for_payload("ns", &payload("Refresh", vec![b])),
        );
    }

    #[test]
    fn explicit_key_overrides_and_blank_means_none() {
        let mut p = payload("Refresh", vec![json!(1)]);
        p.idempotency_key = Some("custom".into());
        assert_eq!(IdempotencyKey::for_payload("ns", &p).unwrap().as_str(), "custom");

        p.idempotency_key = Some("  ".into());
        assert!(IdempotencyKey::for_payload("ns", &p).is_none());

        assert!(IdempotencyKey::for_payload("ns", &payload("", vec![])).is_none());
    }
}
