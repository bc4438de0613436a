//! Árvore Pão Dashboard
//!
//! The embedding application for the refresh loop: wire shapes of the
//! analytics API, text views, and the terminal render bindings, plus the
//! wiring from [`Config`] to a ready [`RefreshController`].

mod models;
mod terminal;
mod view;

pub use models::{
    AlertaInteligente, AnalyticsPorCategoria, Insight, InsightsPayload, MetricaProduto,
    ResumoAnalytics,
};
pub use terminal::{PanelBinding, Screen, ScreenSummary};
pub use view::{
    format_brl, format_percent, format_quantity, format_timestamp, status_label, AlertSeverity,
};

use crate::client::{HttpClientConfig, HttpSourceClient, PreconditionRule};
use crate::config::{Config, PanelKind};
use crate::refresh::{
    DataSourceSpec, FetchConfig, RefreshController, RegistryError, Reporter, TracingReporter,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while wiring the dashboard
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Panel title for a panel kind
pub fn panel_title(kind: PanelKind, source: &str) -> String {
    match kind {
        PanelKind::Resumo => "Indicadores".to_string(),
        PanelKind::Produtos => "Produtos".to_string(),
        PanelKind::Categorias => "Produtos por categoria".to_string(),
        PanelKind::Alertas => "Alertas".to_string(),
        PanelKind::Insights => "Insights de IA".to_string(),
        PanelKind::Raw => source.to_string(),
    }
}

/// Build a refresh controller that renders into `screen`
///
/// Panels are added to the screen in the order the sources are configured;
/// the first `alertas` source drives the alert counter.
pub fn build_controller(config: &Config, screen: Screen) -> Result<RefreshController, BuildError> {
    build_controller_with_reporter(config, screen, Arc::new(TracingReporter))
}

/// Same as [`build_controller`] with an explicit failure reporter
pub fn build_controller_with_reporter(
    config: &Config,
    mut screen: Screen,
    reporter: Arc<dyn Reporter>,
) -> Result<RefreshController, BuildError> {
    let client = HttpSourceClient::new(HttpClientConfig {
        base_url: config.api.base_url.clone(),
        request_timeout_ms: config.api.request_timeout_ms,
        precondition: PreconditionRule {
            status: config.api.precondition_status,
            markers: config.api.precondition_markers.clone(),
        },
    })?;

    for source in config.enabled_sources() {
        screen.add_panel(source.name.clone(), panel_title(source.panel, &source.name));
    }
    let screen = Arc::new(screen);

    let mut builder = RefreshController::builder(Arc::new(client.clone()))
        .interval(Duration::from_millis(config.refresh.interval_ms))
        .reporter(reporter)
        .fetch_config(FetchConfig {
            request_timeout: Duration::from_millis(config.api.request_timeout_ms),
            remediation_timeout: Duration::from_millis(config.refresh.remediation_timeout_ms),
        });

    for remediation in &config.remediations {
        builder = builder.remediation(
            remediation.name.clone(),
            Arc::new(client.remediation(&remediation.path)),
        );
    }

    let mut alert_source = None;
    for source in config.enabled_sources() {
        let mut spec = DataSourceSpec::new(source.name.clone(), source.path.clone());
        if let Some(recovery) = &source.recovery {
            spec = spec.with_recovery(recovery.clone());
        }
        if source.panel == PanelKind::Alertas && alert_source.is_none() {
            alert_source = Some(source.name.clone());
        }
        let binding = PanelBinding::new(screen.clone(), source.name.clone(), source.panel);
        builder = builder.source(spec, Arc::new(binding));
    }

    let summary = ScreenSummary::new(screen, alert_source);
    Ok(builder.summary(Arc::new(summary)).build()?)
}
