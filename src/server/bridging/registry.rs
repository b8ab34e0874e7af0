//! Leg registry
//!
//! Process-wide map from a call leg id to the id of the bridge joining it.
//! Both legs of a bridged call carry the same bridge id.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct LegRegistry {
    legs: Arc<RwLock<HashMap<String, String>>>,
}

impl LegRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, leg_id: &str, bridge_id: &str) {
        let mut legs = self.legs.write().await;
        legs.insert(leg_id.to_string(), bridge_id.to_string());
    }

    pub async fn get(&self, leg_id: &str) -> Option<String> {
        let legs = self.legs.read().await;
        legs.get(leg_id).cloned()
    }

    pub async fn delete(&self, leg_id: &str) -> Option<String> {
        let mut legs = self.legs.write().await;
        legs.remove(leg_id)
    }

    /// Register both legs of a freshly created bridge
    pub async fn bind(&self, leg_a: &str, leg_b: &str, bridge_id: &str) {
        let mut legs = self.legs.write().await;
        legs.insert(leg_a.to_string(), bridge_id.to_string());
        legs.insert(leg_b.to_string(), bridge_id.to_string());
    }

    /// Remove `leg_id` and every other leg sharing its bridge.
    ///
    /// Returns the bridge id and the removed legs, or `None` if `leg_id` was
    /// not registered.
    pub async fn release(&self, leg_id: &str) -> Option<(String, Vec<String>)> {
        let mut legs = self.legs.write().await;
        let bridge_id = legs.get(leg_id)?.clone();

        let mut released: Vec<String> = legs
            .iter()
            .filter(|(_, bridge)| **bridge == bridge_id)
            .map(|(leg, _)| leg.clone())
            .collect();
        for leg in &released {
            legs.remove(leg);
        }
        released.sort();

        Some((bridge_id, released))
    }

    /// Whether any leg still points at `bridge_id`
    pub async fn references(&self, bridge_id: &str) -> bool {
        let legs = self.legs.read().await;
        legs.values().any(|bridge| bridge == bridge_id)
    }

    pub async fn len(&self) -> usize {
        self.legs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.legs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let registry = LegRegistry::new();
        assert_eq!(registry.get("c-1").await, None);

        registry.set("c-1", "brg-1").await;
        assert_eq!(registry.get("c-1").await.as_deref(), Some("brg-1"));

        assert_eq!(registry.delete("c-1").await.as_deref(), Some("brg-1"));
        assert_eq!(registry.delete("c-1").await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_removes_both_legs_only() {
        let registry = LegRegistry::new();
        registry.bind("c-1", "c-2", "brg-1").await;
        registry.bind("c-3", "c-4", "brg-2").await;

        let (bridge_id, released) = registry.release("c-2").await.unwrap();
        assert_eq!(bridge_id, "brg-1");
        assert_eq!(released, vec!["c-1".to_string(), "c-2".to_string()]);

        assert!(!registry.references("brg-1").await);
        assert!(registry.references("brg-2").await);
        assert_eq!(registry.len().await, 2);

        // Second release of the same leg finds nothing
        assert!(registry.release("c-1").await.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = LegRegistry::new();
        let other = registry.clone();

        registry.bind("c-1", "c-2", "brg-1").await;
        assert_eq!(other.get("c-2").await.as_deref(), Some("brg-1"));
    }
}
