use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use crate::audio::features::DescriptorVector;
use crate::scoring::{AudioFeatures, CompositeScore, KeyEstimate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Identification,
    #[default]
    FeatureExtraction,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Microphone,
    #[default]
    File,
    Spotify,
}

/// One stored analysis result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: SessionId,
    pub analysis_type: AnalysisType,
    pub input_type: InputType,
    pub created_at: DateTime<Utc>,
    pub descriptor: DescriptorVector,
    /// True when `descriptor` is the synthetic default.
    pub fallback: bool,
    pub key: KeyEstimate,
    pub scores: CompositeScore,
    pub features: AudioFeatures,
}

pub trait SessionStore: Send + Sync {
    fn put(&self, session: AnalysisSession);

    /// Live sessions only; expired entries are invisible even before eviction.
    fn get(&self, id: &SessionId) -> Option<AnalysisSession>;

    fn remove(&self, id: &SessionId) -> Option<AnalysisSession>;

    /// Drop every expired session, returning how many went.
    fn evict_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp new sessions should carry.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Process-local store with a time-to-live and an entry cap.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, AnalysisSession>>,
    ttl: chrono::Duration,
    max_entries: usize,
    clock: Clock,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(Utc::now))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Clock) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    fn is_expired(&self, session: &AnalysisSession, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.created_at) >= self.ttl
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, session: AnalysisSession) {
        let now = (self.clock)();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if !sessions.contains_key(&session.id) && sessions.len() >= self.max_entries {
            sessions.retain(|_, s| !self.is_expired(s, now));
            while sessions.len() >= self.max_entries {
                let Some(oldest) = sessions
                    .values()
                    .min_by_key(|s| s.created_at)
                    .map(|s| s.id)
                else {
                    break;
                };
                log::debug!("Session store full, evicting {}", oldest);
                sessions.remove(&oldest);
            }
        }
        sessions.insert(session.id, session);
    }

    fn get(&self, id: &SessionId) -> Option<AnalysisSession> {
        let now = (self.clock)();
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(id)
            .filter(|s| !self.is_expired(s, now))
            .cloned()
    }

    fn remove(&self, id: &SessionId) -> Option<AnalysisSession> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn evict_expired(&self) -> usize {
        let now = (self.clock)();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            log::debug!("Evicted {} expired sessions", evicted);
        }
        evicted
    }

    fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Background thread sweeping a store every `interval`. Stops on drop.
pub struct EvictionWorker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EvictionWorker {
    pub fn spawn(store: Arc<dyn SessionStore>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("session-eviction".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        store.evict_expired();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for EvictionWorker {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Session eviction thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeClock(Arc<AtomicI64>);

    impl FakeClock {
        fn new() -> Self {
            Self(Arc::new(AtomicI64::new(1_700_000_000)))
        }

        fn clock(&self) -> Clock {
            let secs = self.0.clone();
            Arc::new(move || DateTime::from_timestamp(secs.load(Ordering::SeqCst), 0).unwrap())
        }

        fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    fn session(store: &dyn SessionStore) -> AnalysisSession {
        let descriptor = DescriptorVector::fallback();
        let scores = CompositeScore::NEUTRAL;
        let key = KeyEstimate::C_MAJOR;
        AnalysisSession {
            id: SessionId::new(),
            analysis_type: AnalysisType::FeatureExtraction,
            input_type: InputType::File,
            created_at: store.now(),
            features: AudioFeatures::from_analysis(&descriptor, &scores, &key),
            descriptor,
            fallback: true,
            key,
            scores,
        }
    }

    #[test]
    fn put_get_remove() {
        let store = InMemorySessionStore::new(Duration::from_secs(60), 10);
        let s = session(&store);
        let id = s.id;
        store.put(s.clone());
        assert_eq!(store.get(&id), Some(s));
        assert!(store.remove(&id).is_some());
        assert_eq!(store.get(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn expired_sessions_are_hidden_then_evicted() {
        let clock = FakeClock::new();
        let store = InMemorySessionStore::with_clock(Duration::from_secs(60), 10, clock.clock());
        let old = session(&store);
        let old_id = old.id;
        store.put(old);

        clock.advance(30);
        let fresh = session(&store);
        let fresh_id = fresh.id;
        store.put(fresh);

        clock.advance(30);
        assert_eq!(store.get(&old_id), None);
        assert!(store.get(&fresh_id).is_some());
        assert_eq!(store.len(), 2);

        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn cap_evicts_oldest() {
        let clock = FakeClock::new();
        let store = InMemorySessionStore::with_clock(Duration::from_secs(3600), 2, clock.clock());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let s = session(&store);
            ids.push(s.id);
            store.put(s);
            clock.advance(1);
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&ids[0]), None);
        assert!(store.get(&ids[1]).is_some());
        assert!(store.get(&ids[2]).is_some());
    }

    #[test]
    fn worker_sweeps_and_stops() {
        let clock = FakeClock::new();
        let store: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::with_clock(Duration::from_secs(5), 10, clock.clock()));
        store.put(session(store.as_ref()));
        clock.advance(10);

        let worker = EvictionWorker::spawn(store.clone(), Duration::from_millis(10)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !store.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        drop(worker);
        assert!(store.is_empty());
    }

    #[test]
    fn session_id_round_trips_through_text() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }
}
