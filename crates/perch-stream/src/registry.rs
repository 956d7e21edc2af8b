//! Session registry — tracks viewing sessions through their lifecycle.
//!
//! One record per session ID, moving through three phases:
//!
//!   Prepared — transport parameters negotiated, no subprocess
//!   Starting — a start request is in flight (transcoder spawning)
//!   Active   — transcoder running, kill switch armed
//!
//! Termination is represented by removal; a removed entry releases its
//! synchronization sources. Every mutation is a single entry-level
//! operation, so transitions for one session ID never interleave.

use std::net::IpAddr;

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::oneshot;

use perch_core::srtp::SrtpMaterial;
use perch_core::CryptoSuite;

use crate::error::StreamError;

/// Consumed to make the supervisor kill its subprocess.
pub type KillSwitch = oneshot::Sender<()>;

/// Negotiated transport parameters for one media stream.
pub struct PreparedEndpoint {
    pub port: u16,
    pub crypto_suite: CryptoSuite,
    pub srtp: SrtpMaterial,
    pub ssrc: u32,
}

/// A session that has been negotiated but not started.
pub struct PreparedSession {
    /// Address the media transport must send to.
    pub peer_address: IpAddr,
    /// Local address advertised as the media source.
    pub local_address: IpAddr,
    pub video: PreparedEndpoint,
    pub audio: PreparedEndpoint,
}

enum Phase {
    Prepared(Box<PreparedSession>),
    /// Start in flight. The kill switch is armed once the subprocess
    /// exists, so a concurrent stop can interrupt a pending start.
    Starting(Option<KillSwitch>),
    Active(KillSwitch),
}

struct SessionEntry {
    /// Incarnation number. Session IDs may be reused by the controller
    /// right after a stop; teardown paths spawned for an earlier
    /// incarnation must never touch a later one.
    epoch: u64,
    video_ssrc: u32,
    audio_ssrc: u32,
    phase: Phase,
}

/// What `remove` hands back for teardown.
pub enum RemovedSession {
    Prepared,
    Starting(Option<KillSwitch>),
    Active(KillSwitch),
}

/// The registry — shared across the router, supervisor monitors, and
/// the status API.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    /// Synchronization sources currently in use by any session.
    ssrcs: Arc<DashSet<u32>>,
    epochs: Arc<std::sync::atomic::AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a synchronization source distinct from every one
    /// currently in use on this process.
    pub fn allocate_ssrc(&self) -> u32 {
        loop {
            let candidate: u32 = rand::random();
            if candidate != 0 && self.ssrcs.insert(candidate) {
                return candidate;
            }
        }
    }

    /// Release a synchronization source allocated but never stored in a
    /// session (e.g. when prepare fails after allocation).
    pub fn release_ssrc(&self, ssrc: u32) {
        self.ssrcs.remove(&ssrc);
    }

    /// Store a freshly negotiated session. Fails if the ID is already
    /// prepared or active.
    pub fn insert_prepared(
        &self,
        session_id: &str,
        session: PreparedSession,
    ) -> Result<(), StreamError> {
        match self.sessions.entry(session_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StreamError::Conflict(session_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(SessionEntry {
                    epoch: self
                        .epochs
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                    video_ssrc: session.video.ssrc,
                    audio_ssrc: session.audio.ssrc,
                    phase: Phase::Prepared(Box::new(session)),
                });
                Ok(())
            }
        }
    }

    /// Take a Prepared session out for starting; the entry stays,
    /// marked Starting, so the ID cannot be re-prepared meanwhile.
    /// Returns the incarnation epoch the start call must use for every
    /// later transition.
    pub fn begin_start(
        &self,
        session_id: &str,
    ) -> Result<(PreparedSession, u64), StreamError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StreamError::UnknownSession(session_id.to_string()))?;
        match std::mem::replace(&mut entry.phase, Phase::Starting(None)) {
            Phase::Prepared(session) => Ok((*session, entry.epoch)),
            other => {
                // Not Prepared — put the phase back untouched.
                entry.phase = other;
                Err(StreamError::Conflict(session_id.to_string()))
            }
        }
    }

    /// Arm the kill switch of a Starting session. Hands the switch back
    /// if the session was stopped (or replaced) while the subprocess
    /// was spawning.
    pub fn arm_kill(
        &self,
        session_id: &str,
        epoch: u64,
        kill: KillSwitch,
    ) -> Result<(), KillSwitch> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) if entry.epoch == epoch => match entry.phase {
                Phase::Starting(ref mut slot) if slot.is_none() => {
                    *slot = Some(kill);
                    Ok(())
                }
                _ => Err(kill),
            },
            _ => Err(kill),
        }
    }

    /// Promote a Starting session to Active once the transcoder has
    /// produced output. Returns false if that incarnation is gone
    /// (stopped while the start was pending).
    pub fn activate(&self, session_id: &str, epoch: u64) -> bool {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if entry.epoch != epoch {
            return false;
        }
        match std::mem::replace(&mut entry.phase, Phase::Starting(None)) {
            Phase::Starting(Some(kill)) => {
                entry.phase = Phase::Active(kill);
                true
            }
            other => {
                entry.phase = other;
                false
            }
        }
    }

    /// Remove whatever session currently holds this ID, releasing its
    /// synchronization sources. Returns what teardown has to deal with.
    pub fn remove(&self, session_id: &str) -> Option<RemovedSession> {
        let (_, entry) = self.sessions.remove(session_id)?;
        Some(self.release(entry))
    }

    /// Remove the session only if it is still the given incarnation.
    /// Failure/monitor paths use this so they can never tear down a
    /// later session that reused the ID.
    pub fn remove_if_epoch(&self, session_id: &str, epoch: u64) -> Option<RemovedSession> {
        let (_, entry) = self
            .sessions
            .remove_if(session_id, |_, entry| entry.epoch == epoch)?;
        Some(self.release(entry))
    }

    fn release(&self, entry: SessionEntry) -> RemovedSession {
        self.ssrcs.remove(&entry.video_ssrc);
        self.ssrcs.remove(&entry.audio_ssrc);
        match entry.phase {
            Phase::Prepared(_) => RemovedSession::Prepared,
            Phase::Starting(kill) => RemovedSession::Starting(kill),
            Phase::Active(kill) => RemovedSession::Active(kill),
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// IDs of every session currently known, in no particular order.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn ssrc_in_use(&self, ssrc: u32) -> bool {
        self.ssrcs.contains(&ssrc)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// (prepared-or-starting, active) counts for the status surface.
    pub fn counts(&self) -> (usize, usize) {
        let mut pending = 0;
        let mut active = 0;
        for entry in self.sessions.iter() {
            match entry.phase {
                Phase::Active(_) => active += 1,
                _ => pending += 1,
            }
        }
        (pending, active)
    }
}
