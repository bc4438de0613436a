//! Refresh Loop
//!
//! Client-side polling core: fetch every data source concurrently, hand the
//! results to render bindings, repeat on a fixed delay.
//!
//! ## Architecture
//!
//! - **Fetcher**: concurrent requests, per-source failure isolation,
//!   remediate-then-retry for precondition failures
//! - **Dispatcher**: per-source render callbacks, then the summary callback
//! - **Scheduler**: fixed-delay timer, coalescing manual triggers
//! - **RefreshController**: owns the above, built from explicit registrations
//!
//! ## Cycle
//!
//! `Idle -> Fetching -> Rendering -> Idle`. A cycle never starts while
//! another one is fetching or rendering.

mod controller;
mod dispatch;
mod error;
mod fetcher;
mod scheduler;
mod source;

pub use controller::{CyclePhase, CycleReport, RefreshController, RefreshControllerBuilder};
pub use dispatch::{
    DispatchReport, Dispatcher, RenderBinding, Reporter, SummaryBinding, TracingReporter,
};
pub use error::{
    ControllerError, ErrorKind, Failure, RegistryError, RenderError, SchedulerError,
};
pub use fetcher::{FetchConfig, Fetcher, Remediation, SourceClient};
pub use scheduler::{CycleClaim, CycleError, Scheduler};
pub use source::{DataSourceSpec, Outcome, RefreshCycle};
