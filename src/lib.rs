//! # Painel
//!
//! Dashboard client for the Árvore Pão analytics API. Polls the backend on a
//! timer, renders KPIs, charts, products, alerts and AI insights, and keeps
//! going when individual sources fail.
//!
//! ## Features
//!
//! - **Concurrent fetch**: every source is requested in parallel per cycle
//! - **Failure isolation**: one failing source or render callback never
//!   blocks the others
//! - **Recovery**: "models not trained" style failures trigger a remediation
//!   action and a single retry
//! - **Fixed-delay refresh**: the interval runs from the end of a cycle, and
//!   manual refreshes are coalesced while a cycle is in flight
//!
//! ## Modules
//!
//! - [`refresh`]: Transport-agnostic refresh loop
//! - [`client`]: HTTP client for the analytics API
//! - [`dashboard`]: Wire shapes and terminal render bindings
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use painel::{build_controller, Config, Screen};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let controller = build_controller(&config, Screen::stdout())?;
//!
//!     // One cycle now, then one every `refresh.interval_ms`
//!     controller.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     controller.stop();
//!     controller.join().await;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dashboard;
pub mod refresh;

pub use refresh::{
    ControllerError, CyclePhase, CycleReport, DataSourceSpec, ErrorKind, Failure, FetchConfig,
    Outcome, RefreshController, RefreshControllerBuilder, RefreshCycle, RegistryError,
    Remediation, RenderBinding, RenderError, Reporter, SchedulerError, SourceClient,
    SummaryBinding, TracingReporter,
};

pub use client::{HttpClientConfig, HttpRemediation, HttpSourceClient, PreconditionRule};

pub use dashboard::{build_controller, BuildError, PanelBinding, Screen, ScreenSummary};

pub use config::{
    generate_default_config, ApiConfig, Config, ConfigError, LoggingConfig, PanelKind,
    RefreshConfig, RemediationConfig, SourceConfig,
};
