//! Pull-sync orchestration: the REST client seam, the manager that applies
//! one pull cycle, and the interval scheduler.

pub mod api;
pub mod manager;
pub mod scheduler;

pub use api::{
    ApiEvent, ApiFriend, ApiNotification, ApiPreferences, ApiRsvp, ApiUser, BackendApi,
    HttpBackendApi,
};
pub use manager::{PullReport, SyncManager};
pub use scheduler::AutoSync;
