//! Approval matcher — maps free-text replies to approve/reject decisions
//! and the pending action they target.

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use super::model::{ActionStatus, PendingAction};
use super::store::ActionStore;

/// Built-in approval tokens, checked after operator-configured patterns.
const APPROVE_TOKENS: &[&str] = &["✅", "yes", "y", "approve", "ok", "sí", "si", "confirm"];

/// Built-in rejection tokens. Approve wins when both sets hit.
const REJECT_TOKENS: &[&str] = &["❌", "no", "n", "reject", "cancel"];

/// Classified intent of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Approve,
    Reject,
    None,
}

/// What `resolve` decided about a reply.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The action was approved; execute its payload.
    Approved(PendingAction),
    /// The action was rejected; nothing to execute.
    Rejected(PendingAction),
    /// The reply referenced an action that is missing or expired.
    Stale { reference: String },
    /// The reply targeted an action but its intent could not be read.
    Indeterminate { action_id: Uuid },
    /// Not an approval-related message at all; continue normal routing.
    NotApproval,
}

/// Operator-editable approval pattern lists, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalPatterns {
    #[serde(default)]
    pub auto_approve: Vec<String>,
    #[serde(default)]
    pub auto_reject: Vec<String>,
}

impl ApprovalPatterns {
    /// Load from a JSON file; missing or unreadable files yield defaults.
    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                error!(path = %path.display(), "Bad approval pattern file: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist to the JSON file, creating parent directories as needed.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
    }
}

/// Matches operator replies against pending actions using explicit ids,
/// configured patterns, and built-in token sets.
pub struct ApprovalMatcher {
    store: Arc<ActionStore>,
    patterns: RwLock<ApprovalPatterns>,
    patterns_path: PathBuf,
    id_patterns: Vec<Regex>,
}

impl ApprovalMatcher {
    pub fn new(store: Arc<ActionStore>, patterns_path: PathBuf) -> Self {
        let patterns = ApprovalPatterns::load(&patterns_path);
        if !patterns.auto_approve.is_empty() || !patterns.auto_reject.is_empty() {
            info!(
                approve = patterns.auto_approve.len(),
                reject = patterns.auto_reject.len(),
                "Loaded approval patterns"
            );
        }
        Self {
            store,
            patterns: RwLock::new(patterns),
            patterns_path,
            id_patterns: vec![
                Regex::new(r"(?i)(?:approve|reject|yes|no)\s+([a-f0-9-]{8,})").unwrap(),
                Regex::new(r"(?i)action\s+([a-f0-9-]{8,})").unwrap(),
                Regex::new(r"#([a-f0-9-]{8,})").unwrap(),
            ],
        }
    }

    // ── Pattern management ──────────────────────────────────────────

    /// Add an auto-approve substring pattern. Returns false when the
    /// pattern is already present or the file cannot be written.
    pub async fn add_auto_approve(&self, pattern: &str) -> bool {
        self.add_pattern(pattern, true).await
    }

    /// Add an auto-reject substring pattern.
    pub async fn add_auto_reject(&self, pattern: &str) -> bool {
        self.add_pattern(pattern, false).await
    }

    async fn add_pattern(&self, pattern: &str, approve: bool) -> bool {
        let mut patterns = self.patterns.write().await;
        let list = if approve {
            &mut patterns.auto_approve
        } else {
            &mut patterns.auto_reject
        };
        if list.iter().any(|p| p == pattern) {
            return false;
        }
        list.push(pattern.to_string());
        if let Err(e) = patterns.save(&self.patterns_path) {
            error!("Failed to save approval patterns: {e}");
            return false;
        }
        true
    }

    /// Current pattern counts (for the status report).
    pub async fn pattern_counts(&self) -> (usize, usize) {
        let patterns = self.patterns.read().await;
        (patterns.auto_approve.len(), patterns.auto_reject.len())
    }

    // ── Classification ──────────────────────────────────────────────

    /// Extract an explicitly referenced action id from the reply, e.g.
    /// "approve 3f1c…", "action 3f1c…", or "#3f1c…". First match wins.
    pub fn extract_explicit_id(&self, text: &str) -> Option<String> {
        for pattern in &self.id_patterns {
            if let Some(caps) = pattern.captures(text) {
                return Some(caps[1].to_string());
            }
        }
        None
    }

    /// Classify the reply's intent. Operator-configured patterns are
    /// checked first, then the built-in token sets; all matching is
    /// case-insensitive substring containment, and approve is checked
    /// before reject when both would hit.
    pub async fn classify_intent(&self, text: &str) -> Intent {
        let lowered = text.to_lowercase();
        let lowered = lowered.trim();

        {
            let patterns = self.patterns.read().await;
            if patterns
                .auto_approve
                .iter()
                .any(|p| lowered.contains(&p.to_lowercase()))
            {
                return Intent::Approve;
            }
            if patterns
                .auto_reject
                .iter()
                .any(|p| lowered.contains(&p.to_lowercase()))
            {
                return Intent::Reject;
            }
        }

        if APPROVE_TOKENS.iter().any(|t| lowered.contains(t)) {
            return Intent::Approve;
        }
        if REJECT_TOKENS.iter().any(|t| lowered.contains(t)) {
            return Intent::Reject;
        }
        Intent::None
    }

    // ── Resolution ──────────────────────────────────────────────────

    /// Match a free-text reply to a pending action.
    ///
    /// An explicitly referenced id is tried first; otherwise, a reply
    /// whose intent classifies targets the most recent pending action.
    pub async fn resolve(&self, text: &str) -> Resolution {
        if let Some(reference) = self.extract_explicit_id(text) {
            let Some(action) = self.lookup_by_prefix(&reference).await else {
                return Resolution::Stale { reference };
            };
            return self.handle(action, text).await;
        }

        if self.classify_intent(text).await != Intent::None {
            if let Some(action) = self.store.most_recent_pending().await {
                return self.handle(action, text).await;
            }
        }

        Resolution::NotApproval
    }

    /// Ids are long; the operator may type a prefix. Exact uuid parse is
    /// tried first, then a unique prefix match over live actions.
    async fn lookup_by_prefix(&self, reference: &str) -> Option<PendingAction> {
        if let Ok(id) = reference.parse::<Uuid>() {
            return self.store.get(id).await;
        }
        let candidates: Vec<PendingAction> = self
            .store
            .list(None)
            .await
            .into_iter()
            .filter(|a| a.id.to_string().starts_with(reference))
            .collect();
        match candidates.len() {
            1 => candidates.into_iter().next(),
            _ => None,
        }
    }

    async fn handle(&self, action: PendingAction, text: &str) -> Resolution {
        if action.is_expired() || action.status != ActionStatus::Pending {
            return Resolution::Stale {
                reference: action.id.to_string(),
            };
        }

        match self.classify_intent(text).await {
            Intent::Approve => {
                if self.store.approve(action.id, text).await {
                    // Re-read so the caller sees the resolved record
                    match self.store.get(action.id).await {
                        Some(resolved) => Resolution::Approved(resolved),
                        None => Resolution::Stale {
                            reference: action.id.to_string(),
                        },
                    }
                } else {
                    Resolution::Stale {
                        reference: action.id.to_string(),
                    }
                }
            }
            Intent::Reject => {
                if self.store.reject(action.id, text).await {
                    match self.store.get(action.id).await {
                        Some(resolved) => Resolution::Rejected(resolved),
                        None => Resolution::Stale {
                            reference: action.id.to_string(),
                        },
                    }
                } else {
                    Resolution::Stale {
                        reference: action.id.to_string(),
                    }
                }
            }
            Intent::None => Resolution::Indeterminate {
                action_id: action.id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::model::{ActionKind, ActionPayload, EmailReplyPayload};

    fn payload() -> ActionPayload {
        ActionPayload::EmailReply(EmailReplyPayload {
            to: "alice@example.com".into(),
            subject: "Re: Hola".into(),
            summary: "saludo".into(),
            suggested_reply: "¡Hola!".into(),
            message_ref: None,
        })
    }

    fn matcher(store: Arc<ActionStore>) -> (ApprovalMatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let m = ApprovalMatcher::new(store, dir.path().join("patterns.json"));
        (m, dir)
    }

    // ── Explicit id extraction ──────────────────────────────────────

    #[test]
    fn extracts_id_after_verbs() {
        let (m, _dir) = matcher(ActionStore::new());
        assert_eq!(
            m.extract_explicit_id("approve 3f1c2a9b-0000"),
            Some("3f1c2a9b-0000".to_string())
        );
        assert_eq!(
            m.extract_explicit_id("REJECT deadbeef01"),
            Some("deadbeef01".to_string())
        );
    }

    #[test]
    fn extracts_action_and_hash_references() {
        let (m, _dir) = matcher(ActionStore::new());
        assert_eq!(
            m.extract_explicit_id("action cafebabe99"),
            Some("cafebabe99".to_string())
        );
        assert_eq!(
            m.extract_explicit_id("ok #0123456789ab"),
            Some("0123456789ab".to_string())
        );
    }

    #[test]
    fn short_tokens_are_not_ids() {
        let (m, _dir) = matcher(ActionStore::new());
        assert_eq!(m.extract_explicit_id("approve abc"), None);
        assert_eq!(m.extract_explicit_id("sí, claro"), None);
    }

    // ── Intent classification ───────────────────────────────────────

    #[tokio::test]
    async fn builtin_tokens_classify() {
        let (m, _dir) = matcher(ActionStore::new());
        assert_eq!(m.classify_intent("Sí").await, Intent::Approve);
        assert_eq!(m.classify_intent("✅").await, Intent::Approve);
        assert_eq!(m.classify_intent("confirm").await, Intent::Approve);
        assert_eq!(m.classify_intent("❌").await, Intent::Reject);
        assert_eq!(m.classify_intent("cancel").await, Intent::Reject);
        assert_eq!(m.classify_intent("qué tal").await, Intent::None);
    }

    #[tokio::test]
    async fn approve_wins_over_reject_when_both_match() {
        let (m, _dir) = matcher(ActionStore::new());
        // Contains both "yes" and "no"
        assert_eq!(m.classify_intent("yes... or no").await, Intent::Approve);
    }

    #[tokio::test]
    async fn operator_patterns_take_precedence() {
        let (m, _dir) = matcher(ActionStore::new());
        assert!(m.add_auto_reject("nunca").await);
        // "nunca" contains "n" (built-in reject) anyway, but also add a
        // custom reject word that would otherwise classify as approve:
        assert!(m.add_auto_reject("ok pero no lo mandes").await);
        assert_eq!(
            m.classify_intent("ok pero no lo mandes").await,
            Intent::Reject
        );
    }

    #[tokio::test]
    async fn duplicate_pattern_is_refused() {
        let (m, _dir) = matcher(ActionStore::new());
        assert!(m.add_auto_approve("mándalo").await);
        assert!(!m.add_auto_approve("mándalo").await);
        assert_eq!(m.pattern_counts().await, (1, 0));
    }

    #[test]
    fn patterns_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let patterns = ApprovalPatterns {
            auto_approve: vec!["mándalo".into()],
            auto_reject: vec!["descarta".into()],
        };
        patterns.save(&path).unwrap();

        let loaded = ApprovalPatterns::load(&path);
        assert_eq!(loaded.auto_approve, vec!["mándalo"]);
        assert_eq!(loaded.auto_reject, vec!["descarta"]);
    }

    #[test]
    fn missing_pattern_file_loads_defaults() {
        let loaded = ApprovalPatterns::load(std::path::Path::new("/nonexistent/patterns.json"));
        assert!(loaded.auto_approve.is_empty());
        assert!(loaded.auto_reject.is_empty());
    }

    // ── Resolution ──────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_approval_targets_most_recent_pending() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let _older = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;

        match m.resolve("Sí").await {
            Resolution::Approved(action) => {
                assert_eq!(action.id, newer.id);
                assert_eq!(action.status, ActionStatus::Approved);
                assert_eq!(action.user_response.as_deref(), Some("Sí"));
            }
            other => panic!("Expected Approved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_id_overrides_recency() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let older = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _newer = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;

        let reply = format!("approve {}", older.id);
        match m.resolve(&reply).await {
            Resolution::Approved(action) => assert_eq!(action.id, older.id),
            other => panic!("Expected Approved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn id_prefix_resolves_when_unique() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let action = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;

        let prefix: String = action.id.to_string().chars().take(8).collect();
        match m.resolve(&format!("yes #{prefix}")).await {
            Resolution::Approved(resolved) => assert_eq!(resolved.id, action.id),
            other => panic!("Expected Approved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_resolves_without_execution_data() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let action = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;

        match m.resolve("❌").await {
            Resolution::Rejected(rejected) => {
                assert_eq!(rejected.id, action.id);
                assert_eq!(rejected.status, ActionStatus::Rejected);
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_action_is_stale() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let action = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(-1))
            .await;

        let reply = format!("approve {}", action.id);
        match m.resolve(&reply).await {
            Resolution::Stale { reference } => assert_eq!(reference, action.id.to_string()),
            other => panic!("Expected Stale, got {other:?}"),
        }
        // Store unchanged
        assert_eq!(
            store.get(action.id).await.unwrap().status,
            ActionStatus::Pending
        );
    }

    #[tokio::test]
    async fn unknown_id_is_stale() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(store);
        match m.resolve("approve deadbeef-0000-0000").await {
            Resolution::Stale { reference } => assert_eq!(reference, "deadbeef-0000-0000"),
            other => panic!("Expected Stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_id_without_readable_intent_is_indeterminate() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(Arc::clone(&store));
        let action = store
            .create(ActionKind::EmailReply, payload(), chrono::Duration::minutes(30))
            .await;

        // References the action but carries no approve/reject token.
        // "#<id>" plus filler words chosen to avoid the substring sets.
        let reply = format!("hmm #{} qué era esto", action.id);
        match m.resolve(&reply).await {
            Resolution::Indeterminate { action_id } => assert_eq!(action_id, action.id),
            other => panic!("Expected Indeterminate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrelated_text_with_no_pending_is_not_approval() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(store);
        match m.resolve("¿qué hora es?").await {
            Resolution::NotApproval => {}
            other => panic!("Expected NotApproval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn approval_token_with_no_pending_is_not_approval() {
        let store = ActionStore::new();
        let (m, _dir) = matcher(store);
        match m.resolve("Sí").await {
            Resolution::NotApproval => {}
            other => panic!("Expected NotApproval, got {other:?}"),
        }
    }
}
