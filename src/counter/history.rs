use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::counter::config::Configuration;
use crate::storage::{KeyValueStore, StorageError};

pub const MAX_HISTORY_LEN: usize = 5;
pub const HISTORY_KEY: &str = "history";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unable to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A previously shown counter, keyed by its title.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub date: DateTime<FixedOffset>,
    pub title: String,
    #[serde(rename = "searchParams")]
    pub serialized_params: String,
}

pub fn serialize_history(items: &[HistoryItem]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// Unreadable payloads are treated as an empty history.
pub fn parse_history(raw: &str) -> Vec<HistoryItem> {
    match serde_json::from_str::<Vec<HistoryItem>>(raw) {
        Ok(items) => items,
        Err(err) => {
            warn!("discarding unreadable history at line {}: {err}", err.line());
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LedgerOutcome {
    /// Untitled configurations are not recorded.
    Skipped,
    Updated,
    Inserted { evicted: Option<HistoryItem> },
}

/// Bounded most-recently-used list of titled configurations.
pub struct HistoryLedger<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> HistoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored items, newest first.
    pub fn items(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        let mut items = self.load()?;
        sort_newest_first(&mut items);
        items.truncate(MAX_HISTORY_LEN);
        Ok(items)
    }

    /// Records `config` after the parameter set changed identity.
    pub fn on_navigation_change(
        &mut self,
        config: &Configuration,
        raw_params: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, HistoryError> {
        if config.title.is_empty() {
            return Ok(LedgerOutcome::Skipped);
        }

        let mut items = self.items()?;
        let date = now.fixed_offset();
        let outcome = match items.iter_mut().find(|item| item.title == config.title) {
            Some(existing) => {
                existing.date = date;
                existing.serialized_params = raw_params.to_string();
                debug!("refreshed history entry '{}'", config.title);
                LedgerOutcome::Updated
            }
            None => {
                let evicted = if items.len() >= MAX_HISTORY_LEN {
                    items.pop()
                } else {
                    None
                };
                if let Some(old) = &evicted {
                    debug!("evicting history entry '{}'", old.title);
                }
                items.insert(
                    0,
                    HistoryItem {
                        date,
                        title: config.title.clone(),
                        serialized_params: raw_params.to_string(),
                    },
                );
                debug!("added history entry '{}'", config.title);
                LedgerOutcome::Inserted { evicted }
            }
        };

        self.save(&items)?;
        Ok(outcome)
    }

    fn load(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        Ok(self
            .store
            .get(HISTORY_KEY)?
            .map(|raw| parse_history(&raw))
            .unwrap_or_default())
    }

    fn save(&mut self, items: &[HistoryItem]) -> Result<(), HistoryError> {
        let payload = serialize_history(items)?;
        self.store.set(HISTORY_KEY, &payload)?;
        Ok(())
    }
}

fn sort_newest_first(items: &mut [HistoryItem]) {
    items.sort_by(|a, b| b.date.cmp(&a.date));
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::counter::params::QueryParams;
    use crate::storage::MemoryStore;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0)
            .single()
            .expect("valid")
    }

    fn titled(title: &str) -> (Configuration, String) {
        let mut params = QueryParams::new();
        params.append("title", title);
        params.append("endDate", "20300101T000000Z");
        let raw = params.to_query_string();
        (Configuration::decode(&params, base_time()), raw)
    }

    fn titles(items: &[HistoryItem]) -> Vec<&str> {
        items.iter().map(|item| item.title.as_str()).collect()
    }

    #[test]
    fn untitled_configurations_are_not_recorded() {
        let mut ledger = HistoryLedger::new(MemoryStore::new());
        let (config, raw) = titled("");
        let outcome = ledger
            .on_navigation_change(&config, &raw, base_time())
            .expect("ledger");
        assert_eq!(outcome, LedgerOutcome::Skipped);
        assert_eq!(ledger.store().get(HISTORY_KEY).expect("get"), None);
    }

    #[test]
    fn same_title_updates_in_place() {
        let mut ledger = HistoryLedger::new(MemoryStore::new());
        let (config, _) = titled("Launch");
        ledger
            .on_navigation_change(&config, "title=Launch&digits=d", base_time())
            .expect("first");
        let later = base_time() + Duration::minutes(5);
        let outcome = ledger
            .on_navigation_change(&config, "title=Launch&digits=s", later)
            .expect("second");

        assert_eq!(outcome, LedgerOutcome::Updated);
        let items = ledger.items().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].date, later);
        assert_eq!(items[0].serialized_params, "title=Launch&digits=s");
    }

    #[test]
    fn never_holds_more_than_capacity() {
        let mut ledger = HistoryLedger::new(MemoryStore::new());
        for index in 0..8 {
            let (config, raw) = titled(&format!("event-{index}"));
            ledger
                .on_navigation_change(&config, &raw, base_time() + Duration::seconds(index))
                .expect("record");
            assert!(ledger.items().expect("items").len() <= MAX_HISTORY_LEN);
        }
        let items = ledger.items().expect("items");
        assert_eq!(
            titles(&items),
            vec!["event-7", "event-6", "event-5", "event-4", "event-3"]
        );
    }

    #[test]
    fn sixth_title_evicts_only_the_oldest() {
        let mut ledger = HistoryLedger::new(MemoryStore::new());
        for index in 0..5 {
            let (config, raw) = titled(&format!("t{index}"));
            ledger
                .on_navigation_change(&config, &raw, base_time() + Duration::seconds(index))
                .expect("record");
        }
        let before = ledger.items().expect("items");

        let (config, raw) = titled("t5");
        let outcome = ledger
            .on_navigation_change(&config, &raw, base_time() + Duration::seconds(10))
            .expect("record");

        let evicted = before.last().cloned();
        assert_eq!(outcome, LedgerOutcome::Inserted { evicted });
        let after = ledger.items().expect("items");
        assert_eq!(after.len(), MAX_HISTORY_LEN);
        assert_eq!(after[0].title, "t5");
        assert_eq!(&after[1..], &before[..4]);
    }

    #[test]
    fn retouching_an_old_title_moves_it_to_the_front() {
        let mut ledger = HistoryLedger::new(MemoryStore::new());
        for (index, title) in ["a", "b", "c"].into_iter().enumerate() {
            let (config, raw) = titled(title);
            ledger
                .on_navigation_change(&config, &raw, base_time() + Duration::seconds(index as i64))
                .expect("record");
        }
        let (config, raw) = titled("a");
        ledger
            .on_navigation_change(&config, &raw, base_time() + Duration::seconds(30))
            .expect("record");
        assert_eq!(titles(&ledger.items().expect("items")), vec!["a", "c", "b"]);
    }

    #[test]
    fn oversized_stored_list_is_trimmed_before_matching() {
        let mut store = MemoryStore::new();
        let items = (0..7)
            .map(|index| HistoryItem {
                date: (base_time() + Duration::seconds(index)).fixed_offset(),
                title: format!("s{index}"),
                serialized_params: String::new(),
            })
            .collect::<Vec<_>>();
        store
            .set(HISTORY_KEY, &serialize_history(&items).expect("encode"))
            .expect("seed");
        let mut ledger = HistoryLedger::new(store);

        // s0 was cut off by the trim, so it is inserted fresh rather than updated.
        let (config, raw) = titled("s0");
        let outcome = ledger
            .on_navigation_change(&config, &raw, base_time() + Duration::minutes(1))
            .expect("record");
        assert!(matches!(outcome, LedgerOutcome::Inserted { evicted: Some(_) }));
        assert_eq!(
            titles(&ledger.items().expect("items")),
            vec!["s0", "s6", "s5", "s4", "s3"]
        );
    }

    #[test]
    fn corrupt_payload_reads_as_empty() {
        assert!(parse_history("{not json").is_empty());
        assert!(parse_history(r#"[{"date":"yesterday","title":"x","searchParams":""}]"#).is_empty());

        let mut store = MemoryStore::new();
        store.set(HISTORY_KEY, "{not json").expect("seed");
        let mut ledger = HistoryLedger::new(store);
        assert!(ledger.items().expect("items").is_empty());

        let (config, raw) = titled("fresh");
        ledger
            .on_navigation_change(&config, &raw, base_time())
            .expect("record");
        assert_eq!(titles(&ledger.items().expect("items")), vec!["fresh"]);
    }

    #[test]
    fn serialized_form_uses_iso_dates_and_search_params_key() {
        let item = HistoryItem {
            date: base_time().fixed_offset(),
            title: "Launch".to_string(),
            serialized_params: "title=Launch".to_string(),
        };
        let json = serialize_history(std::slice::from_ref(&item)).expect("encode");
        assert!(json.starts_with(r#"[{"date":"2024-02-01T08:00:00"#));
        assert!(json.contains(r#""searchParams":"title=Launch""#));
        assert_eq!(parse_history(&json), vec![item]);
    }
}
