pub mod config;
pub mod database;
pub mod errors;
pub mod index;
pub mod lock;
pub mod metrics;
pub mod results;
pub mod search;
pub mod workspace;

pub use config::DbConfig;
pub use errors::{CodeDbError, CodeDbResult};
pub use index::build_database;
pub use metrics::PassStats;
pub use search::{find, FindOptions};
pub use workspace::{init_workspace, locate_workspace, Workspace};
