//! OAuth token management with storage and refresh capabilities.

mod manager;
mod schedule;
mod storage;
mod tokens;

pub use manager::{ExchangeOutcome, ExchangeTrigger, TokenManager};
pub use schedule::RefreshSchedule;
pub use storage::{MemoryStorage, Storage};
pub use tokens::{refresh_delay, Tokens, REFRESH_MARGIN_SECS};
