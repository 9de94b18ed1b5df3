//! State core of a shareable countdown: a typed configuration kept in sync with
//! URL query parameters, a wall-clock aligned delta ticker, and a bounded
//! history of titled counters.

pub mod clock;
pub mod counter;
pub mod display;
pub mod session;
pub mod storage;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::config::{ConfigError, ConfigPatch, Configuration, Digit, Field, FieldValue};
pub use counter::delta::{DeltaTicker, TimeDelta};
pub use counter::history::{HistoryItem, HistoryLedger, MAX_HISTORY_LEN};
pub use counter::params::QueryParams;
pub use counter::store::{ConfigStore, MemoryParams, ParamProvider};
pub use session::Session;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
