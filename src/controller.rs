//! ==============================================================================
//! controller.rs - session arbitration and display sequencing
//! ==============================================================================
//!
//! purpose:
//!     owns the one-badge-at-a-time rule. a scan is accepted only while the
//!     terminal is idle; from then on this module drives the leaderboard calls,
//!     the display texts and the idle watchdog until the terminal is idle again.
//!
//! state machine:
//!
//!     Idle ──scan──▶ Lookup ──"none"──▶ NeedsName ──name ok──▶ WelcomeBack
//!                      │                   │  ▲                     │
//!                      │ nick found        └──┘ name taken          │
//!                      ▼                                            │
//!                  WelcomeBack ◀───────────────────────────────────-┘
//!
//!     any busy state ──watchdog / esc key──▶ Idle
//!
//!     WelcomeBack has no exit of its own: the terminal stays busy until the
//!     watchdog fires, which doubles as a cooldown between badges.
//!
//! cancellation:
//!     every accepted scan bumps an epoch. after each remote call the flow
//!     re-checks the epoch under the lock and stops if the session it belongs
//!     to has already been reset.
//!
//! relationships:
//!     - uses: leaderboard.rs (remote calls), display.rs (text slots),
//!             watchdog.rs (idle deadline)
//!     - fed by: main.rs (serial scans), server.rs (display events)
//!
//! ==============================================================================

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::display::{Display, Slot};
use crate::domain::{NameSubmission, Phase, ScanRecord, Session};
use crate::leaderboard::{Leaderboard, LeaderboardRecord, NameAvailability};
use crate::watchdog::Watchdog;

pub const WELCOME_BACK: &str = "WELCOME BACK,";
pub const WELCOME: &str = "WELCOME,";
pub const SCORE_LABEL: &str = "YOUR SCORE IS:";
pub const NAME_TAKEN: &str = "NAME TAKEN, TRY AGAIN";

struct ControllerState {
    phase: Phase,
    session: Option<Session>,
    epoch: u64,
    watchdog: Watchdog,
}

struct Inner<L> {
    leaderboard: L,
    display: Display,
    config: SessionConfig,
    state: Mutex<ControllerState>,
}

/// cloneable handle to the kiosk's single session controller
pub struct SessionController<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for SessionController<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Leaderboard> SessionController<L> {
    pub fn new(leaderboard: L, display: Display, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                leaderboard,
                display,
                config,
                state: Mutex::new(ControllerState {
                    phase: Phase::Idle,
                    session: None,
                    epoch: 0,
                    watchdog: Watchdog::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn display(&self) -> &Display {
        &self.inner.display
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// pending idle deadline, if any
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.lock().watchdog.deadline()
    }

    /// paint the idle screen on a freshly connected page
    pub fn on_display_connected(&self) {
        let st = self.lock();
        if st.phase == Phase::Idle {
            self.show_idle();
        }
    }

    /// entry point for an ingested badge scan
    pub async fn on_scan(&self, scan: ScanRecord) {
        let epoch = {
            let mut st = self.lock();
            if st.phase != Phase::Idle {
                info!(device = %scan.device_id, phase = ?st.phase, "terminal busy, ignoring scan");
                return;
            }
            st.epoch += 1;
            st.phase = Phase::Lookup;
            st.session = Some(Session::from(&scan));
            self.arm(&mut st, self.inner.config.lookup_timeout());
            st.epoch
        };

        info!(
            device = %scan.device_id,
            game = %scan.game_name,
            score = %scan.score,
            rename = scan.rename_requested,
            "session started"
        );

        match serde_json::to_string(&scan) {
            Ok(raw) => self.inner.display.send_scan_data(raw),
            Err(e) => warn!(error = %e, "could not echo scan to display"),
        }

        if scan.rename_requested {
            match self.inner.leaderboard.remove(&scan.device_id).await {
                Ok(true) => info!(device = %scan.device_id, "registered nickname removed"),
                Ok(false) => warn!(device = %scan.device_id, "leaderboard refused to remove nickname"),
                Err(e) => warn!(device = %scan.device_id, error = %e, "nickname removal failed"),
            }
            if !self.is_live(epoch) {
                debug!(device = %scan.device_id, "session ended during removal");
                return;
            }
        }

        let lookup = self.inner.leaderboard.lookup(&scan.device_id, &scan.score).await;

        let record = {
            let mut st = self.lock();
            if st.epoch != epoch {
                debug!(device = %scan.device_id, "session ended during lookup, dropping result");
                return;
            }
            // the idle window starts once the lookup has answered
            self.arm(&mut st, self.inner.config.lookup_timeout());

            match lookup {
                Ok(None) => {
                    info!(device = %scan.device_id, "no nickname registered, prompting");
                    st.phase = Phase::NeedsName;
                    if let Some(session) = st.session.as_mut() {
                        session.awaiting_name = true;
                    }
                    self.inner
                        .display
                        .show([&self.inner.config.name_prompt, "", "", "", ""]);
                    return;
                }
                Ok(Some(nick)) => {
                    info!(device = %scan.device_id, nick = %nick, "returning player");
                    st.phase = Phase::WelcomeBack;
                    if let Some(session) = st.session.as_mut() {
                        session.candidate_name = Some(nick.clone());
                    }
                    self.inner
                        .display
                        .show([WELCOME_BACK, &nick, "", SCORE_LABEL, &scan.score]);
                    LeaderboardRecord {
                        id: scan.device_id.clone(),
                        nick,
                        game: scan.game_name.clone(),
                        score: scan.score.clone(),
                        crc: scan.crc.clone(),
                    }
                }
                Err(e) => {
                    warn!(device = %scan.device_id, error = %e, "lookup failed, waiting for watchdog");
                    return;
                }
            }
        };

        self.submit_score(record).await;
    }

    /// entry point for a nickname relayed by the display
    pub async fn on_name_submitted(&self, submission: NameSubmission) {
        let nickname = submission.nickname.trim().to_string();
        if nickname.is_empty() {
            debug!("ignoring empty nickname");
            return;
        }

        let (epoch, session) = {
            let mut st = self.lock();
            if st.phase != Phase::NeedsName {
                debug!(phase = ?st.phase, "not waiting for a nickname, ignoring");
                return;
            }
            let Some(session) = st.session.as_mut() else {
                return;
            };
            if !session.awaiting_name {
                debug!("nickname check already in flight, ignoring");
                return;
            }
            session.awaiting_name = false;
            let session = session.clone();
            st.watchdog.cancel();
            (st.epoch, session)
        };

        let other_device = submission.device_id.as_deref().is_some_and(|d| d != session.device_id);
        let other_score = submission.score.as_deref().is_some_and(|s| s != session.score);
        if other_device || other_score {
            warn!(
                session = %session.device_id,
                display_device = ?submission.device_id,
                display_score = ?submission.score,
                display_crc = ?submission.crc,
                "display relayed a different badge, keeping the scanned one"
            );
        }

        let availability = match self
            .inner
            .leaderboard
            .check_unique(&session.device_id, &nickname)
            .await
        {
            Ok(availability) => availability,
            Err(e) => {
                warn!(nick = %nickname, error = %e, "uniqueness check failed, treating name as taken");
                NameAvailability::Taken
            }
        };

        let record = {
            let mut st = self.lock();
            if st.epoch != epoch {
                debug!(nick = %nickname, "session ended during uniqueness check");
                return;
            }

            match availability {
                NameAvailability::Taken => {
                    info!(nick = %nickname, "nickname taken");
                    if let Some(session) = st.session.as_mut() {
                        session.awaiting_name = true;
                    }
                    self.inner.display.set_field(Slot::Text4, NAME_TAKEN);
                    self.arm(&mut st, self.inner.config.retry_timeout());
                    return;
                }
                NameAvailability::Available => {
                    info!(device = %session.device_id, nick = %nickname, "nickname registered");
                    st.phase = Phase::WelcomeBack;
                    if let Some(session) = st.session.as_mut() {
                        session.candidate_name = Some(nickname.clone());
                    }
                    self.inner
                        .display
                        .show([WELCOME, &nickname, "", SCORE_LABEL, &session.score]);
                    self.arm(&mut st, self.inner.config.welcome_timeout());
                    LeaderboardRecord {
                        id: session.device_id.clone(),
                        nick: nickname,
                        game: session.game_name.clone(),
                        score: session.score.clone(),
                        crc: session.crc.clone(),
                    }
                }
            }
        };

        self.submit_score(record).await;
    }

    /// explicit cancel from the display
    pub fn on_cancel(&self) {
        info!("cancel key pressed");
        self.force_idle();
    }

    /// drop any live session and show the idle screen
    pub fn force_idle(&self) {
        let mut st = self.lock();
        self.reset(&mut st);
    }

    fn reset(&self, st: &mut ControllerState) {
        st.watchdog.cancel();
        if let Some(session) = st.session.take() {
            info!(device = %session.device_id, phase = ?st.phase, "session ended");
        }
        st.phase = Phase::Idle;
        st.epoch += 1;
        self.show_idle();
    }

    fn show_idle(&self) {
        self.inner
            .display
            .show(["", "", &self.inner.config.idle_prompt, "", ""]);
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    fn arm(&self, st: &mut ControllerState, delay: Duration) {
        let weak: Weak<Inner<L>> = Arc::downgrade(&self.inner);
        st.watchdog.arm(delay, move |generation| {
            if let Some(inner) = weak.upgrade() {
                SessionController { inner }.on_watchdog(generation);
            }
        });
        debug!(seconds = delay.as_secs(), "watchdog armed");
    }

    fn on_watchdog(&self, generation: u64) {
        let mut st = self.lock();
        if !st.watchdog.claim(generation) {
            debug!(generation, "stale watchdog, ignoring");
            return;
        }
        info!("idle timeout");
        self.reset(&mut st);
    }

    async fn submit_score(&self, record: LeaderboardRecord) {
        match self.inner.leaderboard.upsert(&record).await {
            Ok(()) => info!(device = %record.id, nick = %record.nick, score = %record.score, "high score saved"),
            Err(e) => warn!(device = %record.id, error = %e, "high score not saved"),
        }
    }
}
