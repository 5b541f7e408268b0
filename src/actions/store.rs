//! Action store — in-memory pending-action map with expiry sweep.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{ActionKind, ActionPayload, ActionStatus, PendingAction};

/// In-memory store owning every `PendingAction`. Callers get copies;
/// mutation happens only through `approve`/`reject`, and memory is freed
/// only by `sweep`.
#[derive(Default)]
pub struct ActionStore {
    actions: RwLock<HashMap<Uuid, PendingAction>>,
}

impl ActionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create and register a fresh action. Returns a copy.
    pub async fn create(
        &self,
        kind: ActionKind,
        payload: ActionPayload,
        ttl: chrono::Duration,
    ) -> PendingAction {
        let action = PendingAction::new(kind, payload, ttl);
        info!(
            action_id = %action.id,
            kind = %action.kind,
            expires_at = %action.expires_at,
            "Created pending action"
        );
        let copy = action.clone();
        self.actions.write().await.insert(action.id, action);
        copy
    }

    /// Register an already-built action (used by handlers that construct
    /// the record themselves). Returns a copy.
    pub async fn register(&self, action: PendingAction) -> PendingAction {
        info!(action_id = %action.id, kind = %action.kind, "Registered pending action");
        let copy = action.clone();
        self.actions.write().await.insert(action.id, action);
        copy
    }

    pub async fn get(&self, id: Uuid) -> Option<PendingAction> {
        self.actions.read().await.get(&id).cloned()
    }

    /// All unswept actions, optionally filtered by status. Does not hide
    /// expired-but-unresolved entries — callers that care must check
    /// `is_expired` (or use `list_pending`).
    pub async fn list(&self, status: Option<ActionStatus>) -> Vec<PendingAction> {
        let actions = self.actions.read().await;
        let mut out: Vec<PendingAction> = actions
            .values()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.created_at);
        out
    }

    /// Actions still awaiting a decision: status pending and not expired.
    /// This is the view the router consults.
    pub async fn list_pending(&self) -> Vec<PendingAction> {
        let actions = self.actions.read().await;
        let mut out: Vec<PendingAction> = actions
            .values()
            .filter(|a| a.status == ActionStatus::Pending && !a.is_expired())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.created_at);
        out
    }

    /// The most recently created action that is pending and not expired.
    pub async fn most_recent_pending(&self) -> Option<PendingAction> {
        self.actions
            .read()
            .await
            .values()
            .filter(|a| a.status == ActionStatus::Pending && !a.is_expired())
            .max_by_key(|a| a.created_at)
            .cloned()
    }

    /// Transition pending → approved. Fails (no state change) when the
    /// action is missing, already resolved, or expired.
    pub async fn approve(&self, id: Uuid, reply: &str) -> bool {
        self.resolve(id, reply, ActionStatus::Approved).await
    }

    /// Transition pending → rejected. Same failure rules as `approve`.
    pub async fn reject(&self, id: Uuid, reply: &str) -> bool {
        self.resolve(id, reply, ActionStatus::Rejected).await
    }

    async fn resolve(&self, id: Uuid, reply: &str, target: ActionStatus) -> bool {
        let mut actions = self.actions.write().await;
        let Some(action) = actions.get_mut(&id) else {
            return false;
        };
        if action.status != ActionStatus::Pending {
            warn!(action_id = %id, status = ?action.status, "Action already resolved");
            return false;
        }
        if action.is_expired() {
            warn!(action_id = %id, "Action expired, refusing resolution");
            return false;
        }
        action.status = target;
        action.user_response = Some(reply.to_string());
        action.resolved_at = Some(Utc::now());
        info!(action_id = %id, status = ?target, "Action resolved");
        true
    }

    /// Remove all expired entries regardless of status. Returns the count
    /// removed. The only path that frees memory for abandoned actions.
    pub async fn sweep(&self) -> usize {
        let mut actions = self.actions.write().await;
        let before = actions.len();
        actions.retain(|_, a| !a.is_expired());
        let removed = before - actions.len();
        if removed > 0 {
            info!(count = removed, "Swept expired actions");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.actions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.read().await.is_empty()
    }
}

/// Spawn a background task that sweeps expired actions periodically.
pub fn spawn_sweep_task(
    store: Arc<ActionStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = store.sweep().await;
            if removed > 0 {
                debug!(removed, "Periodic sweep completed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::model::EmailReplyPayload;

    fn payload() -> ActionPayload {
        ActionPayload::EmailReply(EmailReplyPayload {
            to: "alice@example.com".into(),
            subject: "Re: Hola".into(),
            summary: "saludo".into(),
            suggested_reply: "¡Hola Alice!".into(),
            message_ref: None,
        })
    }

    async fn create(store: &ActionStore, ttl_minutes: i64) -> PendingAction {
        store
            .create(
                ActionKind::EmailReply,
                payload(),
                chrono::Duration::minutes(ttl_minutes),
            )
            .await
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = ActionStore::new();
        let action = create(&store, 30).await;
        let fetched = store.get(action.id).await.unwrap();
        assert_eq!(fetched.id, action.id);
        assert_eq!(fetched.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn approve_records_reply_and_time() {
        let store = ActionStore::new();
        let action = create(&store, 30).await;
        assert!(store.approve(action.id, "sí, envíalo").await);

        let resolved = store.get(action.id).await.unwrap();
        assert_eq!(resolved.status, ActionStatus::Approved);
        assert_eq!(resolved.user_response.as_deref(), Some("sí, envíalo"));
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn second_resolution_fails() {
        let store = ActionStore::new();
        let action = create(&store, 30).await;
        assert!(store.approve(action.id, "sí").await);
        assert!(!store.approve(action.id, "sí otra vez").await);
        assert!(!store.reject(action.id, "no").await);
        // First resolution stands
        let resolved = store.get(action.id).await.unwrap();
        assert_eq!(resolved.status, ActionStatus::Approved);
        assert_eq!(resolved.user_response.as_deref(), Some("sí"));
    }

    #[tokio::test]
    async fn expired_action_cannot_be_resolved() {
        let store = ActionStore::new();
        let action = create(&store, -1).await;
        assert!(!store.approve(action.id, "sí").await);
        assert!(!store.reject(action.id, "no").await);
        // Still present and still pending until swept
        let stale = store.get(action.id).await.unwrap();
        assert_eq!(stale.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn missing_action_resolution_fails() {
        let store = ActionStore::new();
        assert!(!store.approve(Uuid::new_v4(), "sí").await);
    }

    #[tokio::test]
    async fn list_keeps_expired_but_list_pending_hides_them() {
        let store = ActionStore::new();
        let live = create(&store, 30).await;
        let stale = create(&store, -5).await;

        let all = store.list(None).await;
        assert_eq!(all.len(), 2);

        let pending = store.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, live.id);
        assert_ne!(pending[0].id, stale.id);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = ActionStore::new();
        let a = create(&store, 30).await;
        let _b = create(&store, 30).await;
        store.approve(a.id, "sí").await;

        let approved = store.list(Some(ActionStatus::Approved)).await;
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, a.id);
        assert_eq!(store.list(Some(ActionStatus::Pending)).await.len(), 1);
    }

    #[tokio::test]
    async fn most_recent_pending_prefers_latest_creation() {
        let store = ActionStore::new();
        let _older = create(&store, 30).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = create(&store, 30).await;

        let recent = store.most_recent_pending().await.unwrap();
        assert_eq!(recent.id, newer.id);
    }

    #[tokio::test]
    async fn most_recent_pending_skips_resolved_and_expired() {
        let store = ActionStore::new();
        let resolved = create(&store, 30).await;
        store.reject(resolved.id, "no").await;
        let _expired = create(&store, -1).await;

        assert!(store.most_recent_pending().await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_expired_regardless_of_status() {
        let store = ActionStore::new();
        let _live = create(&store, 30).await;
        let _stale_pending = create(&store, -1).await;
        let stale_resolved = create(&store, 30).await;
        store.approve(stale_resolved.id, "sí").await;

        // Only the expired pending one goes; the resolved one is not expired
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 2);

        // Nothing else to sweep
        assert_eq!(store.sweep().await, 0);
    }
}
