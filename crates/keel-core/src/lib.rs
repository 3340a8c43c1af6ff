pub mod actions;
pub mod io;
pub mod paths;
pub mod plan;
pub mod reporter;
pub mod resolver;

pub use actions::{ActionError, InstallActions, ShellActions};
pub use paths::{Layout, try_keel_home};
pub use plan::{PlanEntry, PlanError, ResolvedPlan};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{ConflictReport, Requester, Requirement, ResolveError, resolve};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("keel-core/", env!("CARGO_PKG_VERSION"));
