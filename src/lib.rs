//! sitesorter - Moves console agents out of the default site
//!
//! Agents waiting in the management console's default site are matched by
//! display name against an ordered list of group patterns and moved into the
//! site carrying the group's name.
//!
//! ## Modules
//!
//! - [`config`]: Rule file and environment settings
//! - [`console`]: Management console API integration
//! - [`resolve`]: Group to console site mapping
//! - [`classify`]: Pattern rules and endpoint classification
//! - [`relocate`]: Confirmation gate and move calls
//! - [`output`]: Terminal and daily log file output
//! - [`pipeline`]: The end-to-end sorting run

pub mod classify;
pub mod config;
pub mod console;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod relocate;
pub mod resolve;

pub use classify::{ClassificationResult, RuleSet};
pub use config::{Config, EnvSettings, RunMode, Settings};
pub use console::{ConsoleApi, ConsoleClient, Endpoint, RemoteSite};
pub use error::SorterError;
pub use output::{DailyLog, Emit, OutputSink};
pub use pipeline::{Pipeline, RunOptions, RunOutcome};
pub use relocate::{Confirm, PromptConfirm};
pub use resolve::SiteDirectory;
