//! Loop guard — feedback-loop and flood prevention for inbound events.
//!
//! Every inbound event passes `should_process` before the router touches
//! it; every candidate outbound send passes `check_cooldown` and
//! `should_send`. The guard owns all the mutable anti-flood state
//! (cooldown ledger, recent-outbound cache, processed-id set, emergency
//! stop flag) in one `GuardState`, owned by the router.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::events::InboundEvent;

/// Provider event tags that describe our own outbound traffic rather
/// than new user content.
const ECHO_EVENT_TAGS: &[&str] = &[
    "message_ack",
    "message_create",
    "message_sent",
    "message_delivered",
];

/// Low-information bodies the provider (or the operator's client) emits
/// as delivery chatter.
const ACK_TOKENS: &[&str] = &["sent", "delivered", "read", "ok", "true"];

/// Canonical fragments of the assistant's own phrasing. A body containing
/// one of these is almost certainly our prior output echoed back in.
/// Substring matching is a heuristic, not a proof of origin.
pub const ASSISTANT_FRAGMENTS: &[&str] = &[
    "puedo platicar contigo sobre cualquier tema",
    "lo siento, estoy teniendo problemas para procesar tu mensaje",
    "entiendo que dijiste",
    "estoy aquí para ayudarte",
];

/// Why the guard refused an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Emergency stop is active; everything but the resume command drops.
    EmergencyStop,
    /// Neither sender nor recipient is the configured operator.
    NotOperator,
    /// Provider notification about our own message (ack/create/sent).
    EchoEvent(String),
    /// Empty, sub-2-char, or pure acknowledgement body.
    LowInformation,
    /// Body contains the assistant's own phrasing.
    AssistantEcho,
    /// Provider message id was already routed.
    AlreadyProcessed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmergencyStop => write!(f, "emergency stop active"),
            Self::NotOperator => write!(f, "event does not involve the operator"),
            Self::EchoEvent(tag) => write!(f, "echo event: {tag}"),
            Self::LowInformation => write!(f, "empty or acknowledgement body"),
            Self::AssistantEcho => write!(f, "contains assistant response"),
            Self::AlreadyProcessed => write!(f, "already processed"),
        }
    }
}

/// Bounded insertion-ordered id set. At capacity the oldest half is
/// evicted in one batch.
#[derive(Debug, Default)]
struct ProcessedIds {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl ProcessedIds {
    /// Insert an id if it isn't tracked yet. Returns false when the id
    /// was already present.
    fn insert(&mut self, id: &str, capacity: usize) -> bool {
        if self.set.contains(id) {
            return false;
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        if self.order.len() > capacity {
            let keep_from = self.order.len() / 2;
            for old in self.order.drain(..keep_from) {
                self.set.remove(&old);
            }
        }
        true
    }

    fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Shared mutable guard state. One instance per relay process, handed by
/// reference into the router.
#[derive(Debug, Default)]
pub struct GuardState {
    /// peer → unix time of the last response charged against them.
    cooldowns: Mutex<HashMap<String, i64>>,
    /// peer → last bodies sent to them (FIFO, bounded).
    recent_outbound: Mutex<HashMap<String, VecDeque<String>>>,
    /// Provider message ids already routed.
    processed: Mutex<ProcessedIds>,
    /// Kill switch. Set/cleared only by the operator's stop/resume commands.
    emergency_stop: AtomicBool,
}

/// The feedback-loop and flood-prevention gate.
pub struct LoopGuard {
    config: RelayConfig,
    state: GuardState,
}

impl LoopGuard {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            state: GuardState::default(),
        }
    }

    // ── Emergency stop ──────────────────────────────────────────────

    pub fn set_emergency_stop(&self, active: bool) {
        self.state.emergency_stop.store(active, Ordering::SeqCst);
        if active {
            warn!("Emergency stop engaged — discarding all non-control traffic");
        } else {
            info!("Emergency stop cleared");
        }
    }

    pub fn emergency_stopped(&self) -> bool {
        self.state.emergency_stop.load(Ordering::SeqCst)
    }

    // ── Inbound gate ────────────────────────────────────────────────

    /// Decide whether the router should process an inbound event at all.
    ///
    /// On acceptance the event's provider message id (if any) is recorded
    /// so redelivered webhooks become no-ops. The membership check and
    /// the insert happen under one lock, so two concurrent deliveries of
    /// the same id cannot both pass.
    pub fn should_process(&self, event: &InboundEvent) -> Result<(), SkipReason> {
        if self.emergency_stopped() {
            return Err(SkipReason::EmergencyStop);
        }

        if !event.involves_operator {
            return Err(SkipReason::NotOperator);
        }

        if let Some(tag) = event.event_type.as_deref()
            && ECHO_EVENT_TAGS.contains(&tag)
        {
            return Err(SkipReason::EchoEvent(tag.to_string()));
        }

        let body = event.body.trim().to_lowercase();
        if body.chars().count() < 2 || ACK_TOKENS.contains(&body.as_str()) {
            return Err(SkipReason::LowInformation);
        }

        if ASSISTANT_FRAGMENTS
            .iter()
            .any(|fragment| body.contains(fragment))
        {
            return Err(SkipReason::AssistantEcho);
        }

        if let Some(id) = event.message_id.as_deref() {
            let mut processed = self.state.processed.lock().expect("processed ids lock");
            if !processed.insert(id, self.config.max_processed_ids) {
                return Err(SkipReason::AlreadyProcessed);
            }
        }

        Ok(())
    }

    // ── Outbound gates ──────────────────────────────────────────────

    /// Atomic cooldown check-and-charge for one peer. Returns false when
    /// the previous response to this peer is still inside the window.
    pub fn check_cooldown(&self, peer: &str, now: DateTime<Utc>) -> bool {
        let window = self.config.cooldown_window.as_secs() as i64;
        let ts = now.timestamp();
        let mut cooldowns = self.state.cooldowns.lock().expect("cooldown lock");
        if let Some(last) = cooldowns.get(peer)
            && ts - last < window
        {
            debug!(peer, elapsed = ts - last, "Cooldown active, suppressing response");
            return false;
        }
        cooldowns.insert(peer.to_string(), ts);
        true
    }

    /// Duplicate-send suppression. Returns false (and logs) when the
    /// exact body was recently sent to this recipient; otherwise records
    /// the body, evicting the oldest entry past capacity.
    pub fn should_send(&self, recipient: &str, body: &str) -> bool {
        let mut cache = self.state.recent_outbound.lock().expect("outbound cache lock");
        let recent = cache.entry(recipient.to_string()).or_default();
        if recent.iter().any(|prior| prior == body) {
            warn!(recipient, "Duplicate outbound body suppressed");
            return false;
        }
        recent.push_back(body.to_string());
        while recent.len() > self.config.max_recent_outbound {
            recent.pop_front();
        }
        true
    }

    /// Number of tracked processed ids (for the status report).
    pub fn processed_count(&self) -> usize {
        self.state.processed.lock().expect("processed ids lock").len()
    }
}
