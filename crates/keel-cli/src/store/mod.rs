//! Install state: the SQLite database and the actor that owns it.

pub mod actor;
pub mod db;

pub use actor::DbHandle;
pub use db::{DbError, HistoryEvent, InstallRecord, NewHistory, RecordStatus, StateDb};
