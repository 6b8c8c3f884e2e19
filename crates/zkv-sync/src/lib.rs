//! zkv-sync: the vault session. Envelope state machine, local-first
//! reconciliation between device cache and remote store, and the decrypted
//! working set.

pub mod cache;
pub mod envelope;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod source;
pub mod view;

pub use envelope::{EnvelopeState, PassphraseStatus, ReadyKind, UnlockOutcome};
pub use reconcile::{AuditReport, Origin};
pub use retry::RetryPolicy;
pub use session::{SessionSettings, VaultSession};
pub use view::{SortOrder, SpaceFilter, ViewQuery, WorkingSet};
