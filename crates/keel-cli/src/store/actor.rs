//! DB Actor - Thread-safe access to SQLite
//!
//! SQLite connections are not `Sync`, so the database lives on a dedicated
//! thread and callers talk to it through a cloneable [`DbHandle`]. This also
//! makes the actor the single writer of install state.

use std::fmt;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use keel_schema::PackageName;
use tokio::sync::oneshot;

use super::db::{DbError, HistoryEvent, InstallRecord, NewHistory, RecordStatus, StateDb};

type Reply<T> = oneshot::Sender<Result<T, DbError>>;

/// Events that can be sent to the DB actor
pub enum DbEvent {
    Get {
        name: PackageName,
        resp: Reply<Option<InstallRecord>>,
    },
    Put {
        record: Box<InstallRecord>,
        resp: Reply<()>,
    },
    SetStatus {
        name: PackageName,
        status: RecordStatus,
        resp: Reply<bool>,
    },
    Remove {
        name: PackageName,
        resp: Reply<Option<InstallRecord>>,
    },
    ListAll {
        resp: Reply<Vec<InstallRecord>>,
    },
    Dependents {
        name: PackageName,
        resp: Reply<Vec<PackageName>>,
    },
    AddHistory {
        event: Box<NewHistory>,
        resp: Reply<()>,
    },
    History {
        name: PackageName,
        resp: Reply<Vec<HistoryEvent>>,
    },
    /// Shutdown the actor
    Shutdown,
}

impl fmt::Debug for DbEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get { name, .. } => f
                .debug_struct("Get")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Put { record, .. } => f
                .debug_struct("Put")
                .field("name", &record.name)
                .field("version", &record.version)
                .finish_non_exhaustive(),
            Self::SetStatus { name, status, .. } => f
                .debug_struct("SetStatus")
                .field("name", name)
                .field("status", status)
                .finish_non_exhaustive(),
            Self::Remove { name, .. } => f
                .debug_struct("Remove")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::ListAll { .. } => f.debug_struct("ListAll").finish_non_exhaustive(),
            Self::Dependents { name, .. } => f
                .debug_struct("Dependents")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::AddHistory { event, .. } => f
                .debug_struct("AddHistory")
                .field("action", &event.action)
                .field("package", &event.package)
                .finish_non_exhaustive(),
            Self::History { name, .. } => f
                .debug_struct("History")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A handle to the Database Actor that is Send + Sync and Clone.
#[derive(Clone)]
pub struct DbHandle {
    sender: mpsc::Sender<DbEvent>,
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbHandle").finish_non_exhaustive()
    }
}

impl DbHandle {
    /// Open the database at `path` and spawn the actor thread.
    pub fn spawn(path: &Path) -> Result<Self, DbError> {
        Ok(Self::from_db(StateDb::open_at(path)?))
    }

    /// Spawn an actor around an already opened database.
    pub fn from_db(db: StateDb) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            run_db_event_loop(db, receiver);
        });
        Self { sender }
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(Reply<T>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| DbError::ActorDied)?;
        rx.await.map_err(|_| DbError::ActorDied)?
    }

    pub async fn get(&self, name: &PackageName) -> Result<Option<InstallRecord>, DbError> {
        let name = name.clone();
        self.request(|resp| DbEvent::Get { name, resp }).await
    }

    pub async fn put(&self, record: InstallRecord) -> Result<(), DbError> {
        self.request(|resp| DbEvent::Put {
            record: Box::new(record),
            resp,
        })
        .await
    }

    pub async fn set_status(
        &self,
        name: &PackageName,
        status: RecordStatus,
    ) -> Result<bool, DbError> {
        let name = name.clone();
        self.request(|resp| DbEvent::SetStatus { name, status, resp })
            .await
    }

    pub async fn remove(&self, name: &PackageName) -> Result<Option<InstallRecord>, DbError> {
        let name = name.clone();
        self.request(|resp| DbEvent::Remove { name, resp }).await
    }

    pub async fn list_all(&self) -> Result<Vec<InstallRecord>, DbError> {
        self.request(|resp| DbEvent::ListAll { resp }).await
    }

    pub async fn dependents(&self, name: &PackageName) -> Result<Vec<PackageName>, DbError> {
        let name = name.clone();
        self.request(|resp| DbEvent::Dependents { name, resp })
            .await
    }

    pub async fn add_history(&self, event: NewHistory) -> Result<(), DbError> {
        self.request(|resp| DbEvent::AddHistory {
            event: Box::new(event),
            resp,
        })
        .await
    }

    pub async fn history(&self, name: &PackageName) -> Result<Vec<HistoryEvent>, DbError> {
        let name = name.clone();
        self.request(|resp| DbEvent::History { name, resp }).await
    }

    /// Ask the actor thread to exit once queued events are drained.
    pub fn shutdown(&self) {
        let _ = self.sender.send(DbEvent::Shutdown);
    }
}

/// The actual event loop running in the background thread
#[allow(clippy::needless_pass_by_value)]
fn run_db_event_loop(mut db: StateDb, receiver: mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::Get { name, resp } => {
                let _ = resp.send(db.get(&name));
            }
            DbEvent::Put { record, resp } => {
                let _ = resp.send(db.put(&record));
            }
            DbEvent::SetStatus { name, status, resp } => {
                let _ = resp.send(db.set_status(&name, status));
            }
            DbEvent::Remove { name, resp } => {
                let _ = resp.send(db.remove(&name));
            }
            DbEvent::ListAll { resp } => {
                let _ = resp.send(db.list_all());
            }
            DbEvent::Dependents { name, resp } => {
                let _ = resp.send(db.dependents(&name));
            }
            DbEvent::AddHistory { event, resp } => {
                let _ = resp.send(db.add_history(&event));
            }
            DbEvent::History { name, resp } => {
                let _ = resp.send(db.history(&name));
            }
            DbEvent::Shutdown => break,
        }
    }
}
