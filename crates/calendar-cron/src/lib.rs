//! Books remediation meetings on users' calendars when their hosts fail
//! calendar-enabled compliance policies, and removes them once the hosts
//! pass again.

pub mod body;
pub mod calendar;
pub mod config;
pub mod cron;
pub mod datastore;
pub mod db;
pub mod error;
pub mod lock;
mod models;
pub mod reconcile;
pub mod schedule;
pub mod scheduler;
mod schema;
pub mod snapshot;

pub use config::{CronConfig, ExistingEventPolicy};
pub use cron::{CalendarCron, CycleOutcome};
pub use error::{CronError, CronResult};
pub use reconcile::{CycleStats, Reconciler};
pub use scheduler::CronScheduler;
