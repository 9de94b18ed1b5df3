use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::counter::config::{ConfigPatch, Configuration};
use crate::counter::delta::{DeltaTicker, TimeDelta};
use crate::counter::history::{HistoryError, HistoryItem, HistoryLedger, LedgerOutcome};
use crate::counter::params::QueryParams;
use crate::counter::store::{ConfigStore, ParamProvider};
use crate::storage::KeyValueStore;

/// Ties the configuration store, the delta ticker and the history ledger to
/// one parameter provider.
pub struct Session<P: ParamProvider, S: KeyValueStore> {
    store: ConfigStore<P>,
    ledger: HistoryLedger<S>,
    ticker: DeltaTicker,
    clock: Arc<dyn Clock>,
    current: Configuration,
    seen_revision: Option<u64>,
}

impl<P: ParamProvider, S: KeyValueStore> Session<P, S> {
    /// Opening counts as the first navigation, so a titled link is recorded.
    pub fn open(provider: P, kv: S, clock: Arc<dyn Clock>) -> Result<Self, HistoryError> {
        let store = ConfigStore::new(provider, Arc::clone(&clock));
        let current = store.read();
        let ticker = DeltaTicker::start(current.end_date, clock.now());
        let mut session = Self {
            store,
            ledger: HistoryLedger::new(kv),
            ticker,
            clock,
            current,
            seen_revision: None,
        };
        session.sync()?;
        Ok(session)
    }

    pub fn config(&self) -> &Configuration {
        &self.current
    }

    pub fn params(&self) -> QueryParams {
        self.store.params()
    }

    pub fn delta(&self) -> TimeDelta {
        self.ticker.delta()
    }

    pub fn is_countdown(&self) -> bool {
        self.ticker.is_countdown()
    }

    pub fn ticker(&self) -> &DeltaTicker {
        &self.ticker
    }

    pub fn ledger(&self) -> &HistoryLedger<S> {
        &self.ledger
    }

    pub fn history(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        self.ledger.items()
    }

    pub fn preview_merge(&self, patch: &ConfigPatch) -> QueryParams {
        self.store.preview_merge(patch)
    }

    pub fn merge(&mut self, patch: &ConfigPatch) -> Result<Option<LedgerOutcome>, HistoryError> {
        self.store.merge(patch);
        self.sync()
    }

    pub fn navigate(&mut self, params: QueryParams) -> Result<Option<LedgerOutcome>, HistoryError> {
        self.store.navigate(params);
        self.sync()
    }

    /// Reacts to a new parameter snapshot. Returns `None` when the snapshot
    /// identity is unchanged since the last call.
    pub fn sync(&mut self) -> Result<Option<LedgerOutcome>, HistoryError> {
        let revision = self.store.revision();
        if self.seen_revision == Some(revision) {
            return Ok(None);
        }
        self.seen_revision = Some(revision);

        let now = self.clock.now();
        self.current = self.store.read();
        if self.current.end_date != self.ticker.target() || !self.ticker.is_active() {
            self.ticker.retarget(self.current.end_date, now);
        }

        let raw_params = self.store.params().to_query_string();
        debug!("parameter snapshot {revision} observed");
        self.ledger
            .on_navigation_change(&self.current, &raw_params, now)
            .map(Some)
    }

    /// Fires due timers against the session clock.
    pub fn poll(&mut self) -> Option<TimeDelta> {
        self.ticker.poll(self.clock.now())
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.ticker.next_deadline()
    }

    pub fn close(&mut self) {
        self.ticker.cancel();
    }
}

impl<P: ParamProvider, S: KeyValueStore> Drop for Session<P, S> {
    fn drop(&mut self) {
        self.close();
    }
}
