//! Text views for dashboard panels
//!
//! Pure functions that turn wire shapes into lines of text. Money and
//! quantities use the pt-BR conventions of the web dashboard
//! (`R$ 1.234,56`).

use super::models::{
    AlertaInteligente, AnalyticsPorCategoria, Insight, MetricaProduto, ResumoAnalytics,
};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Products listed in the table
pub const TABLE_ROWS: usize = 10;
/// Products in the top-value chart
pub const TOP_PRODUCTS: usize = 5;
/// Alerts listed in the alert panel
pub const ALERT_ROWS: usize = 5;

const BAR_WIDTH: usize = 24;

/// Format a value as Brazilian currency: `R$ 1.234,56`
pub fn format_brl(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!(
        "{}R$ {},{:02}",
        sign,
        group_thousands(cents / 100),
        cents % 100
    )
}

/// Format a quantity with pt-BR separators, up to three decimals
pub fn format_quantity(value: f64) -> String {
    let thousandths = (value * 1000.0).round() as i64;
    let sign = if thousandths < 0 { "-" } else { "" };
    let thousandths = thousandths.unsigned_abs();
    let whole = group_thousands(thousandths / 1000);
    let fraction = thousandths % 1000;

    if fraction == 0 {
        format!("{}{}", sign, whole)
    } else {
        let digits = format!("{:03}", fraction);
        format!("{}{},{}", sign, whole, digits.trim_end_matches('0'))
    }
}

fn group_thousands(mut n: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if n < 1000 {
            groups.push(n.to_string());
            break;
        }
        groups.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    groups.reverse();
    groups.join(".")
}

/// Format a percentage with one decimal: `38.3%`
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Last-updated stamp: `dd/mm/yyyy hh:mm`
pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%d/%m/%Y %H:%M").to_string()
}

/// Display label for a stock status
pub fn status_label(status: &str) -> &'static str {
    match status {
        "normal" => "Normal",
        "baixo" => "Baixo",
        "sem_estoque" => "Sem Estoque",
        "critico" => "Crítico",
        _ => "N/A",
    }
}

/// Severity of an alert type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Info,
}

impl AlertSeverity {
    pub fn from_tipo(tipo: &str) -> Self {
        match tipo {
            "CRITICO" => AlertSeverity::Critical,
            "ALTO" => AlertSeverity::High,
            "MEDIO" => AlertSeverity::Medium,
            _ => AlertSeverity::Info,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "[!!]",
            AlertSeverity::High => "[! ]",
            AlertSeverity::Medium => "[i ]",
            AlertSeverity::Info => "[ ·]",
        }
    }
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(len.clamp(1, BAR_WIDTH))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// KPI block
pub fn kpi_lines(resumo: &ResumoAnalytics) -> Vec<String> {
    vec![
        format!("Produtos ........ {}", resumo.total_produtos),
        format!("Valor estoque ... {}", format_brl(resumo.valor_total_estoque)),
        format!("Margem média .... {}", format_percent(resumo.margem_media)),
    ]
}

/// Products sorted by stock value, highest first
pub fn top_products(produtos: &[MetricaProduto], n: usize) -> Vec<&MetricaProduto> {
    let mut sorted: Vec<&MetricaProduto> = produtos.iter().collect();
    sorted.sort_by(|a, b| b.valor_estoque_total.total_cmp(&a.valor_estoque_total));
    sorted.truncate(n);
    sorted
}

/// Bar chart of the top products by stock value
pub fn top_products_chart(produtos: &[MetricaProduto]) -> Vec<String> {
    let top = top_products(produtos, TOP_PRODUCTS);
    let max = top.first().map(|p| p.valor_estoque_total).unwrap_or(0.0);

    top.iter()
        .map(|p| {
            format!(
                "{:<20} {:<24} {}",
                truncate(&p.nome, 20),
                bar(p.valor_estoque_total, max),
                format_brl(p.valor_estoque_total)
            )
        })
        .collect()
}

/// Product table, first rows in backend order
pub fn product_table(produtos: &[MetricaProduto]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<24} {:<12} {:>10} {:>14} {:>16} {}",
        "Produto", "Categoria", "Qtd", "Preço", "Valor estoque", "Status"
    )];

    lines.extend(produtos.iter().take(TABLE_ROWS).map(|p| {
        format!(
            "{:<24} {:<12} {:>10} {:>14} {:>16} {}",
            truncate(&p.nome, 24),
            truncate(&p.categoria.to_uppercase(), 12),
            format_quantity(p.quantidade_atual),
            format_brl(p.preco_venda),
            format_brl(p.valor_estoque_total),
            status_label(&p.status_estoque)
        )
    }));

    lines
}

/// Share of products per category
pub fn category_chart(categorias: &[AnalyticsPorCategoria]) -> Vec<String> {
    let total: u64 = categorias.iter().map(|c| c.total_produtos).sum();
    let max = categorias
        .iter()
        .map(|c| c.total_produtos)
        .max()
        .unwrap_or(0) as f64;

    categorias
        .iter()
        .map(|c| {
            let share = if total > 0 {
                c.total_produtos as f64 * 100.0 / total as f64
            } else {
                0.0
            };
            format!(
                "{:<14} {:<24} {:>4} ({})",
                truncate(&c.categoria.to_uppercase(), 14),
                bar(c.total_produtos as f64, max),
                c.total_produtos,
                format_percent(share)
            )
        })
        .collect()
}

/// Alert list, or the all-clear line
pub fn alert_lines(alertas: &[AlertaInteligente]) -> Vec<String> {
    if alertas.is_empty() {
        return vec!["Nenhum alerta ativo!".to_string()];
    }

    alertas
        .iter()
        .take(ALERT_ROWS)
        .map(|a| {
            let severity = AlertSeverity::from_tipo(&a.tipo);
            let mut line = format!("{} {} (urgência {})", severity.marker(), a.titulo, a.urgencia);
            if !a.descricao.is_empty() {
                line.push_str(" - ");
                line.push_str(&a.descricao);
            }
            line
        })
        .collect()
}

/// AI insights
pub fn insight_lines(insights: &[Insight]) -> Vec<String> {
    if insights.is_empty() {
        return vec!["Sem insights no momento".to_string()];
    }

    insights
        .iter()
        .map(|i| {
            let mut line = format!("* {}", i.titulo);
            if let Some(confianca) = i.confianca {
                line.push_str(&format!(" [{}]", format_percent(confianca * 100.0)));
            }
            if !i.descricao.is_empty() {
                line.push_str(": ");
                line.push_str(&i.descricao);
            }
            if let Some(rec) = &i.recomendacao {
                line.push_str(&format!(" -> {}", rec));
            }
            line
        })
        .collect()
}
