//! Domain model (ids, payload, WAL locations, options, verdicts, errors).

pub mod cookie;
pub mod errors;
pub mod idempotency_key;
pub mod ids;
pub mod options;
pub mod payload;
pub mod state;
pub mod verdict;
pub mod wal;

pub use self::cookie::IdempotencyCookie;
pub use self::errors::{DedupError, ErrorKind, JobError};
pub use self::idempotency_key::IdempotencyKey;
pub use self::ids::{Jid, LeaseToken};
pub use self::options::{DeduplicationOptions, IfDeduplicated};
pub use self::payload::{JobPayload, WorkerClass, DEFAULT_QUEUE};
pub use self::state::AttemptState;
pub use self::verdict::{Completion, RescheduleReason, Verdict};
pub use self::wal::{WalLocation, WalLocations};
