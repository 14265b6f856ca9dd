use std::collections::{BTreeMap, HashMap};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use agentdag_core::error::{DagError, Result};
use agentdag_core::types::NodeOutcome;

/// Per-run result store.
///
/// One write-once slot per node, backed by a `watch` channel so any number
/// of dependents can wait on the same node without polling. A slot is
/// created for every node before any task starts, so waiting never races
/// slot creation.
pub struct ResultRegistry {
    slots: HashMap<String, watch::Sender<Option<NodeOutcome>>>,
}

impl ResultRegistry {
    /// Create an empty slot for each id.
    pub fn create_all<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = ids
            .into_iter()
            .map(|id| (id.into(), watch::Sender::new(None)))
            .collect();
        Self { slots }
    }

    fn slot(&self, id: &str) -> Result<&watch::Sender<Option<NodeOutcome>>> {
        self.slots
            .get(id)
            .ok_or_else(|| DagError::UnknownNode(id.to_string()))
    }

    /// Store a node's outcome and wake everyone waiting on it.
    ///
    /// Each slot accepts exactly one value; a second publish is rejected and
    /// the stored value is left untouched.
    pub fn publish(&self, id: &str, outcome: NodeOutcome) -> Result<()> {
        let slot = self.slot(id)?;
        let mut pending = Some(outcome);
        let stored = slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = pending.take();
            true
        });

        if stored {
            debug!(node = %id, "Result published");
            Ok(())
        } else {
            error!(node = %id, "Result already published");
            Err(DagError::AlreadyPublished(id.to_string()))
        }
    }

    /// Wait until `id` has an outcome, or until the run is cancelled.
    ///
    /// A value that is already present is returned even if the run has been
    /// cancelled in the meantime.
    pub async fn await_outcome(&self, id: &str, cancel: &CancellationToken) -> Result<NodeOutcome> {
        let mut rx = self.slot(id)?.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return Ok(outcome);
            }
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(DagError::UnknownNode(id.to_string()));
                    }
                }
                _ = cancel.cancelled() => return Err(DagError::Cancelled),
            }
        }
    }

    /// Current outcome without waiting.
    pub fn try_get(&self, id: &str) -> Option<NodeOutcome> {
        self.slots.get(id).and_then(|slot| slot.borrow().clone())
    }

    /// Every published outcome, keyed by node id.
    pub fn snapshot(&self) -> BTreeMap<String, NodeOutcome> {
        self.slots
            .iter()
            .filter_map(|(id, slot)| slot.borrow().clone().map(|o| (id.clone(), o)))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_publish_then_await() {
        let registry = ResultRegistry::create_all(["a"]);
        registry
            .publish("a", NodeOutcome::Success("done".into()))
            .unwrap();
        let outcome = registry
            .await_outcome("a", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.value(), Some("done"));
    }

    #[tokio::test]
    async fn test_waiters_wake_on_publish() {
        let registry = Arc::new(ResultRegistry::create_all(["a"]));
        let cancel = CancellationToken::new();

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move {
                registry.await_outcome("a", &cancel).await
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry
            .publish("a", NodeOutcome::Success("v".into()))
            .unwrap();

        for waiter in waiters {
            let outcome = waiter.await.unwrap().unwrap();
            assert_eq!(outcome, NodeOutcome::Success("v".into()));
        }
    }

    #[test]
    fn test_second_publish_rejected() {
        let registry = ResultRegistry::create_all(["a"]);
        registry
            .publish("a", NodeOutcome::Success("first".into()))
            .unwrap();
        let err = registry
            .publish("a", NodeOutcome::Success("second".into()))
            .unwrap_err();
        assert!(matches!(err, DagError::AlreadyPublished(ref id) if id == "a"));
        assert_eq!(
            registry.try_get("a"),
            Some(NodeOutcome::Success("first".into()))
        );
    }

    #[test]
    fn test_unknown_node() {
        let registry = ResultRegistry::create_all(["a"]);
        let err = registry
            .publish("b", NodeOutcome::Cancelled)
            .unwrap_err();
        assert!(matches!(err, DagError::UnknownNode(_)));
        assert!(registry.try_get("b").is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_waiter() {
        let registry = ResultRegistry::create_all(["a"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = registry.await_outcome("a", &cancel).await.unwrap_err();
        assert!(matches!(err, DagError::Cancelled));
    }

    #[tokio::test]
    async fn test_published_value_wins_over_cancel() {
        let registry = ResultRegistry::create_all(["a"]);
        registry.publish("a", NodeOutcome::Failed("x".into())).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = registry.await_outcome("a", &cancel).await.unwrap();
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_snapshot_only_published() {
        let registry = ResultRegistry::create_all(["a", "b"]);
        registry.publish("b", NodeOutcome::Success("1".into())).unwrap();
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key("b"));
        assert_eq!(registry.len(), 2);
    }
}
