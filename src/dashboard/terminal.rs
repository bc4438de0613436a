//! Terminal Renderer
//!
//! Render bindings that keep one text panel per data source and a summary
//! binding that prints the whole screen once every panel of the cycle has
//! been updated.

use super::models::{
    AlertaInteligente, AnalyticsPorCategoria, InsightsPayload, MetricaProduto, ResumoAnalytics,
};
use super::view;
use crate::config::PanelKind;
use crate::refresh::{Failure, RefreshCycle, RenderBinding, RenderError, SummaryBinding};
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone)]
struct Panel {
    lines: Vec<String>,
    healthy: bool,
}

/// Text screen made of panels, written to an output sink
pub struct Screen {
    layout: Vec<(String, String)>,
    panels: Mutex<HashMap<String, Panel>>,
    out: Mutex<Box<dyn Write + Send>>,
    clear: bool,
}

impl Screen {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            layout: Vec::new(),
            panels: Mutex::new(HashMap::new()),
            out: Mutex::new(out),
            clear: false,
        }
    }

    /// Screen on stdout that redraws in place
    pub fn stdout() -> Self {
        let mut screen = Self::new(Box::new(std::io::stdout()));
        screen.clear = true;
        screen
    }

    /// Add a titled panel for `source`, in display order
    pub fn add_panel(&mut self, source: impl Into<String>, title: impl Into<String>) {
        self.layout.push((source.into(), title.into()));
    }

    fn title<'a>(&'a self, source: &'a str) -> &'a str {
        self.layout
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, title)| title.as_str())
            .unwrap_or(source)
    }

    fn set(&self, source: &str, lines: Vec<String>, healthy: bool) {
        lock(&self.panels).insert(source.to_string(), Panel { lines, healthy });
    }

    /// Whether the last update of `source` was a success
    pub fn is_healthy(&self, source: &str) -> Option<bool> {
        lock(&self.panels).get(source).map(|p| p.healthy)
    }

    /// Compose the screen text below `header`
    pub fn compose(&self, header: &[String]) -> String {
        let panels = lock(&self.panels);
        let mut text = String::new();

        for line in header {
            text.push_str(line);
            text.push('\n');
        }

        for (source, title) in &self.layout {
            text.push('\n');
            text.push_str(&format!("== {} ==\n", title));
            match panels.get(source) {
                Some(panel) => {
                    for line in &panel.lines {
                        text.push_str(line);
                        text.push('\n');
                    }
                }
                None => text.push_str("carregando...\n"),
            }
        }

        text
    }

    fn write(&self, text: &str) -> Result<(), RenderError> {
        let mut out = lock(&self.out);
        if self.clear {
            out.write_all(CLEAR_SCREEN.as_bytes())?;
        }
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Render binding that fills one panel
pub struct PanelBinding {
    screen: Arc<Screen>,
    source: String,
    kind: PanelKind,
}

impl PanelBinding {
    pub fn new(screen: Arc<Screen>, source: impl Into<String>, kind: PanelKind) -> Self {
        Self {
            screen,
            source: source.into(),
            kind,
        }
    }

    fn lines(&self, payload: &Value) -> Result<Vec<String>, RenderError> {
        let lines = match self.kind {
            PanelKind::Resumo => {
                let resumo = ResumoAnalytics::deserialize(payload)?;
                view::kpi_lines(&resumo)
            }
            PanelKind::Produtos => {
                let produtos = Vec::<MetricaProduto>::deserialize(payload)?;
                let mut lines = vec!["Top produtos por valor em estoque:".to_string()];
                lines.extend(view::top_products_chart(&produtos));
                lines.push(String::new());
                lines.extend(view::product_table(&produtos));
                lines
            }
            PanelKind::Categorias => {
                let categorias = Vec::<AnalyticsPorCategoria>::deserialize(payload)?;
                view::category_chart(&categorias)
            }
            PanelKind::Alertas => {
                let alertas = Vec::<AlertaInteligente>::deserialize(payload)?;
                view::alert_lines(&alertas)
            }
            PanelKind::Insights => {
                let insights = InsightsPayload::deserialize(payload)?.into_vec();
                view::insight_lines(&insights)
            }
            PanelKind::Raw => serde_json::to_string_pretty(payload)?
                .lines()
                .take(40)
                .map(str::to_string)
                .collect(),
        };
        Ok(lines)
    }
}

impl RenderBinding for PanelBinding {
    fn on_success(&self, payload: &Value) -> Result<(), RenderError> {
        match self.lines(payload) {
            Ok(lines) => {
                self.screen.set(&self.source, lines, true);
                Ok(())
            }
            Err(e) => {
                self.screen.set(
                    &self.source,
                    vec![format!("(!) Dados inválidos: {}", e)],
                    false,
                );
                Err(e)
            }
        }
    }

    fn on_failure(&self, failure: &Failure) -> Result<(), RenderError> {
        let title = self.screen.title(&self.source).to_string();
        self.screen.set(
            &self.source,
            vec![format!("(!) {} indisponível: {}", title, failure)],
            false,
        );
        Ok(())
    }
}

/// Summary binding: alert counter, timestamp, then the full redraw
pub struct ScreenSummary {
    screen: Arc<Screen>,
    alert_source: Option<String>,
}

impl ScreenSummary {
    pub fn new(screen: Arc<Screen>, alert_source: Option<String>) -> Self {
        Self {
            screen,
            alert_source,
        }
    }

    /// Stamped when the screen is drawn, after every panel of the cycle rendered
    fn header(&self, cycle: &RefreshCycle) -> Vec<String> {
        let alerts = self
            .alert_source
            .as_deref()
            .and_then(|source| cycle.payload(source))
            .and_then(Value::as_array)
            .map(|alerts| alerts.len().to_string())
            .unwrap_or_else(|| "-".to_string());

        vec![
            format!(
                "Árvore Pão | atualizado em {} | ciclo #{}",
                view::format_timestamp(&Local::now()),
                cycle.id
            ),
            format!(
                "Alertas ativos: {} | fontes ok: {}/{}",
                alerts,
                cycle.succeeded(),
                cycle.results.len()
            ),
        ]
    }
}

impl SummaryBinding for ScreenSummary {
    fn on_cycle(&self, cycle: &RefreshCycle) -> Result<(), RenderError> {
        let text = self.screen.compose(&self.header(cycle));
        self.screen.write(&text)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}


#[cfg(test)]
mod tests {
    use super::testing::SharedBuffer;
    use super::*;
    use crate::refresh::Outcome;
    use serde_json::json;

    fn screen(buffer: &SharedBuffer) -> Arc<Screen> {
        let mut screen = Screen::new(Box::new(buffer.clone()));
        screen.add_panel("resumo", "Resumo");
        screen.add_panel("alertas", "Alertas");
        Arc::new(screen)
    }

    #[test]
    fn test_panels_and_summary() {
        let buffer = SharedBuffer::default();
        let screen = screen(&buffer);

        let resumo = PanelBinding::new(screen.clone(), "resumo", PanelKind::Resumo);
        let alertas = PanelBinding::new(screen.clone(), "alertas", PanelKind::Alertas);
        let summary = ScreenSummary::new(screen.clone(), Some("alertas".to_string()));

        let resumo_payload = json!({"total_produtos": 12, "valor_total_estoque": "1234.5", "margem_media": 40});
        let alertas_payload = json!([
            {"tipo": "CRITICO", "titulo": "Farinha acabando", "descricao": "2 kg restantes", "urgencia": 5},
            {"tipo": "MEDIO", "titulo": "Margem baixa", "urgencia": 2}
        ]);

        resumo.on_success(&resumo_payload).unwrap();
        alertas.on_success(&alertas_payload).unwrap();

        let mut results = HashMap::new();
        results.insert("resumo".to_string(), Outcome::Success(resumo_payload));
        results.insert("alertas".to_string(), Outcome::Success(alertas_payload));
        summary.on_cycle(&RefreshCycle::new(3, chrono::Utc::now(), results)).unwrap();

        let text = buffer.contents();
        assert!(text.contains("ciclo #3"));
        assert!(text.contains("Alertas ativos: 2"));
        assert!(text.contains("R$ 1.234,50"));
        assert!(text.contains("[!!] Farinha acabando"));
        assert!(text.find("== Resumo ==").unwrap() < text.find("== Alertas ==").unwrap());
    }

    #[test]
    fn test_failed_source_shows_indicator() {
        let buffer = SharedBuffer::default();
        let screen = screen(&buffer);
        let alertas = PanelBinding::new(screen.clone(), "alertas", PanelKind::Alertas);
        let summary = ScreenSummary::new(screen.clone(), Some("alertas".to_string()));

        let failure = Failure::http_status(500, "Internal Server Error");
        alertas.on_failure(&failure).unwrap();

        let mut results = HashMap::new();
        results.insert("alertas".to_string(), Outcome::Failure(failure));
        summary.on_cycle(&RefreshCycle::new(1, chrono::Utc::now(), results)).unwrap();

        let text = buffer.contents();
        assert!(text.contains("Alertas ativos: -"));
        assert!(text.contains("(!) Alertas indisponível: HTTP status 500"));
        assert!(text.contains("== Resumo ==\ncarregando..."));
        assert_eq!(screen.is_healthy("alertas"), Some(false));
    }

    #[test]
    fn test_malformed_payload_is_callback_error() {
        let buffer = SharedBuffer::default();
        let screen = screen(&buffer);
        let resumo = PanelBinding::new(screen.clone(), "resumo", PanelKind::Resumo);

        let result = resumo.on_success(&json!("not an object"));
        assert!(matches!(result, Err(RenderError::Payload(_))));
        assert_eq!(screen.is_healthy("resumo"), Some(false));
    }

    #[test]
    fn test_raw_panel() {
        let buffer = SharedBuffer::default();
        let mut screen = Screen::new(Box::new(buffer.clone()));
        screen.add_panel("estoque", "Estoque");
        let screen = Arc::new(screen);

        let raw = PanelBinding::new(screen.clone(), "estoque", PanelKind::Raw);
        raw.on_success(&json!({"farinha": 10})).unwrap();

        let text = screen.compose(&[]);
        assert!(text.contains("\"farinha\": 10"));
    }
}
