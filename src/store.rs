//! Client-side feeding state.
//!
//! All transitions go through [`reduce`], a pure function over a closed set of
//! [`Action`]s. [`FeedingStore`] runs the network calls and funnels their
//! outcomes into a single `watch` channel, so overlapping tasks only ever queue
//! whole transitions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use crate::client::{AuthSession, FeedingApi};
use crate::errors::ApiError;
use crate::models::{DailyAggregate, FeedingEvent};
use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub current: Option<DailyAggregate>,
    /// Past days, unique by date, newest first.
    pub history: Vec<DailyAggregate>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Server target displaced by an unconfirmed target change.
    pub pending_target: Option<f64>,
    pub refreshes_in_flight: usize,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            current: None,
            history: Vec::new(),
            loading: true,
            error: None,
            last_updated: None,
            pending_target: None,
            refreshes_in_flight: 0,
        }
    }
}

/// Everything one refresh read from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshData {
    pub date: String,
    pub total: f64,
    pub target: f64,
    pub events: Vec<FeedingEvent>,
    pub history: Vec<DailyAggregate>,
    /// When the refresh was issued; orders overlapping refreshes.
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Unauthenticated,
    RefreshStarted,
    RefreshSucceeded(RefreshData),
    RefreshFailed { message: String },
    /// `date` is the server day the feeding was filed under, when reported.
    FeedingConfirmed {
        event: FeedingEvent,
        total: Option<f64>,
        date: Option<String>,
        confirmed_at: DateTime<Utc>,
    },
    FeedingFailed { message: String },
    TargetProposed { target: f64 },
    TargetConfirmed { target: f64, confirmed_at: DateTime<Utc> },
    TargetRejected { message: String },
    /// Local validation failure; nothing in flight is touched.
    InputRejected { message: String },
    ErrorDismissed,
}

pub fn reduce(mut state: SyncState, action: Action) -> SyncState {
    match action {
        Action::Unauthenticated => {
            state.loading = state.refreshes_in_flight > 0;
        }
        Action::RefreshStarted => {
            state.refreshes_in_flight += 1;
            state.loading = true;
        }
        Action::RefreshSucceeded(data) => {
            finish_refresh(&mut state);
            if state.last_updated.is_some_and(|last| data.fetched_at <= last) {
                debug!(fetched_at = %data.fetched_at, "discarding stale refresh");
                return state;
            }
            apply_refresh(&mut state, data);
        }
        Action::RefreshFailed { message } => {
            finish_refresh(&mut state);
            state.error = Some(message);
        }
        Action::FeedingConfirmed {
            event,
            total,
            date,
            confirmed_at,
        } => {
            if let Some(current) = state.current.as_mut() {
                if date.as_deref().is_some_and(|date| date != current.date) {
                    debug!(id = %event.id, ?date, current = %current.date, "feeding filed under another day");
                    return state;
                }
                let duplicate = current.events.iter().any(|known| known.id == event.id);
                let summed = current.amount_fed + if duplicate { 0.0 } else { event.amount };
                current.amount_fed = non_negative(total.unwrap_or(summed), "amount fed");
                if !duplicate {
                    current.events.push(event);
                }
                state.error = None;
                mark_confirmed(&mut state, confirmed_at);
            }
        }
        Action::FeedingFailed { message } => {
            state.error = Some(message);
        }
        Action::TargetProposed { target } => {
            if let Some(current) = state.current.as_mut() {
                state.pending_target.get_or_insert(current.target);
                current.target = target;
            }
        }
        Action::TargetConfirmed { target, confirmed_at } => {
            if let Some(current) = state.current.as_mut() {
                current.target = non_negative(target, "target");
                mark_confirmed(&mut state, confirmed_at);
            }
            state.pending_target = None;
            state.error = None;
        }
        Action::TargetRejected { message } => {
            if let (Some(previous), Some(current)) = (state.pending_target.take(), state.current.as_mut()) {
                current.target = previous;
            }
            state.error = Some(message);
        }
        Action::InputRejected { message } => {
            state.error = Some(message);
        }
        Action::ErrorDismissed => {
            state.error = None;
        }
    }
    state
}

fn finish_refresh(state: &mut SyncState) {
    state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);
    state.loading = state.refreshes_in_flight > 0;
}

/// A confirmed write is newer than any refresh issued before it returned.
fn mark_confirmed(state: &mut SyncState, confirmed_at: DateTime<Utc>) {
    state.last_updated = state.last_updated.max(Some(confirmed_at));
}

fn apply_refresh(state: &mut SyncState, data: RefreshData) {
    let mut events = data.events;
    events.sort_by_key(FeedingEvent::instant);

    let server_target = non_negative(data.target, "target");
    // An unconfirmed target change stays on screen; the fresh server value
    // becomes what a rejection restores.
    let target = match (state.pending_target, state.current.as_ref()) {
        (Some(_), Some(current)) => {
            state.pending_target = Some(server_target);
            current.target
        }
        _ => server_target,
    };

    state.history = normalize_history(data.history, &data.date);
    state.current = Some(DailyAggregate {
        date: data.date,
        amount_fed: non_negative(data.total, "amount fed"),
        target,
        events,
    });
    state.last_updated = Some(data.fetched_at);
    state.error = None;
}

fn normalize_history(history: Vec<DailyAggregate>, today: &str) -> Vec<DailyAggregate> {
    let mut seen = HashSet::new();
    let mut days: Vec<DailyAggregate> = history
        .into_iter()
        .filter(|day| day.date != today)
        .filter(|day| seen.insert(day.date.clone()))
        .collect();
    days.sort_by(|a, b| b.date.cmp(&a.date));
    days
}

fn non_negative(value: f64, what: &str) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(value, "server sent invalid {what}, clamping to zero");
        0.0
    }
}

/// Why a re-sync was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Mount,
    Timer,
    Foreground,
    DayChanged,
    Manual,
}

pub struct FeedingStore<A> {
    api: Arc<A>,
    clock: Arc<dyn Clock>,
    session: AuthSession,
    state: Arc<watch::Sender<SyncState>>,
}

impl<A> Clone for FeedingStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            clock: Arc::clone(&self.clock),
            session: self.session.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: FeedingApi> FeedingStore<A> {
    pub fn new(api: Arc<A>, session: AuthSession) -> Self {
        Self::with_clock(api, session, Arc::new(SystemClock))
    }

    pub fn with_clock(api: Arc<A>, session: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            api,
            clock,
            session,
            state: Arc::new(state),
        }
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn dispatch(&self, action: Action) {
        self.state
            .send_modify(|state| *state = reduce(std::mem::take(state), action));
    }

    pub fn dismiss_error(&self) {
        self.dispatch(Action::ErrorDismissed);
    }

    /// Initial load; does nothing but settle `loading` without a session.
    pub async fn mount(&self) -> Result<(), ApiError> {
        if !self.session.is_authenticated() {
            info!("no session, skipping initial refresh");
            self.dispatch(Action::Unauthenticated);
            return Ok(());
        }
        self.resync(SyncTrigger::Mount).await
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        let fetched_at = self.clock.now();
        let date = self.clock.today_key();
        self.dispatch(Action::RefreshStarted);

        let (total, target, events, history) = tokio::join!(
            self.api.today_total(),
            self.api.daily_target(),
            self.api.today_feedings(),
            self.api.history(),
        );

        let outcome = total.and_then(|total| {
            Ok(RefreshData {
                date,
                total,
                target: target?,
                events: events?,
                history: history?,
                fetched_at,
            })
        });

        match outcome {
            Ok(data) => {
                debug!(date = %data.date, events = data.events.len(), "refresh complete");
                self.dispatch(Action::RefreshSucceeded(data));
                Ok(())
            }
            Err(err) => {
                error!(code = %err.code, message = %err.message, "refresh failed");
                self.dispatch(Action::RefreshFailed {
                    message: err.message.clone(),
                });
                Err(err)
            }
        }
    }

    pub async fn resync(&self, trigger: SyncTrigger) -> Result<(), ApiError> {
        debug!(?trigger, "re-sync");
        self.refresh().await
    }

    /// Records a feeding once the server confirms it; nothing is shown
    /// before that.
    pub async fn add_feeding(&self, amount: f64) -> Result<FeedingEvent, ApiError> {
        if !amount.is_finite() {
            let err = ApiError::invalid_input("Amount must be a number");
            self.dispatch(Action::InputRejected {
                message: err.message.clone(),
            });
            return Err(err);
        }

        match self.api.add_feeding(amount).await {
            Ok(created) => {
                let shown_day = self.state.borrow().current.as_ref().map(|current| current.date.clone());
                let needs_refresh = match (&shown_day, &created.date) {
                    (None, _) => true,
                    (Some(shown), Some(filed)) => shown != filed,
                    (Some(_), None) => false,
                };
                info!(id = %created.event.id, amount, "feeding recorded");
                self.dispatch(Action::FeedingConfirmed {
                    event: created.event.clone(),
                    total: created.total,
                    date: created.date,
                    confirmed_at: self.clock.now(),
                });
                if needs_refresh {
                    if let Err(err) = self.resync(SyncTrigger::Manual).await {
                        warn!(message = %err.message, "refresh after recording feeding failed");
                    }
                }
                Ok(created.event)
            }
            Err(err) => {
                error!(code = %err.code, message = %err.message, "failed to add feeding");
                self.dispatch(Action::FeedingFailed {
                    message: err.message.clone(),
                });
                Err(err)
            }
        }
    }

    /// Shows `target` immediately and restores the previous value if the
    /// server refuses it.
    pub async fn update_target(&self, target: f64) -> Result<f64, ApiError> {
        if !target.is_finite() || target < 0.0 {
            let err = ApiError::invalid_input("Target must be a non-negative number");
            self.dispatch(Action::InputRejected {
                message: err.message.clone(),
            });
            return Err(err);
        }

        self.dispatch(Action::TargetProposed { target });
        match self.api.update_target(target).await {
            Ok(stored) => {
                info!(target = stored, "target updated");
                self.dispatch(Action::TargetConfirmed {
                    target: stored,
                    confirmed_at: self.clock.now(),
                });
                Ok(stored)
            }
            Err(err) => {
                error!(code = %err.code, message = %err.message, "failed to update target");
                self.dispatch(Action::TargetRejected {
                    message: err.message.clone(),
                });
                Err(err)
            }
        }
    }

    /// True when the cached day is no longer the local today.
    pub fn day_changed(&self) -> bool {
        let today = self.clock.today_key();
        self.state
            .borrow()
            .current
            .as_ref()
            .is_some_and(|current| current.date != today)
    }

    /// Refreshes only when the local day rolled over; returns whether it did.
    pub async fn check_day_boundary(&self) -> Result<bool, ApiError> {
        if !self.day_changed() {
            return Ok(false);
        }
        info!("local day changed, refreshing");
        self.resync(SyncTrigger::DayChanged).await?;
        Ok(true)
    }

    pub async fn on_foreground(&self) -> Result<(), ApiError> {
        let trigger = if self.day_changed() {
            SyncTrigger::DayChanged
        } else {
            SyncTrigger::Foreground
        };
        self.resync(trigger).await
    }
}

impl<A: FeedingApi + 'static> FeedingStore<A> {
    /// Re-syncs every `period` until the returned handle is stopped or
    /// dropped. The first tick fires one full period after the call.
    pub fn start_polling(&self, period: Duration) -> PollingHandle {
        let store = self.clone();
        let period = period.max(Duration::from_millis(1));
        let (shutdown, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let trigger = if store.day_changed() {
                            SyncTrigger::DayChanged
                        } else {
                            SyncTrigger::Timer
                        };
                        if let Err(err) = store.resync(trigger).await {
                            debug!(code = %err.code, "scheduled refresh failed");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("polling stopped");
        });

        info!(period_ms = period.as_millis() as u64, "polling started");
        PollingHandle {
            shutdown,
            task: Some(task),
        }
    }
}

/// Owns the polling task; dropping it cancels the task.
pub struct PollingHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the task and waits for any in-progress refresh to land.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
