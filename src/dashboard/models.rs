//! Wire shapes consumed from the analytics API
//!
//! Decimal columns arrive either as JSON strings ("12.50") or numbers,
//! and are read into `f64` either way. Missing or null numbers, counts
//! included, become zero.

use serde::{Deserialize, Deserializer};

/// `GET /api/v1/analytics/resumo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumoAnalytics {
    #[serde(default, deserialize_with = "or_zero")]
    pub total_produtos: u64,
    #[serde(default, deserialize_with = "or_zero")]
    pub produtos_ativos: u64,
    #[serde(default, deserialize_with = "or_zero")]
    pub produtos_estoque_baixo: u64,
    #[serde(default, deserialize_with = "or_zero")]
    pub produtos_sem_estoque: u64,
    #[serde(default, deserialize_with = "decimal")]
    pub valor_total_estoque: f64,
    #[serde(default, deserialize_with = "decimal")]
    pub margem_media: f64,
}

/// One row of `GET /api/v1/analytics/produtos`
#[derive(Debug, Clone, Deserialize)]
pub struct MetricaProduto {
    #[serde(default)]
    pub produto_id: Option<i64>,
    pub nome: String,
    #[serde(default)]
    pub categoria: String,
    #[serde(default, deserialize_with = "decimal")]
    pub quantidade_atual: f64,
    #[serde(default, deserialize_with = "decimal")]
    pub preco_venda: f64,
    #[serde(default, deserialize_with = "decimal")]
    pub valor_estoque_total: f64,
    #[serde(default)]
    pub status_estoque: String,
    #[serde(default)]
    pub precisa_reposicao: bool,
}

/// One row of `GET /api/v1/analytics/categorias`
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsPorCategoria {
    pub categoria: String,
    #[serde(default, deserialize_with = "or_zero")]
    pub total_produtos: u64,
    #[serde(default, deserialize_with = "decimal")]
    pub valor_total_estoque: f64,
}

/// One row of `GET /api/v1/analytics/alertas`
#[derive(Debug, Clone, Deserialize)]
pub struct AlertaInteligente {
    pub tipo: String,
    #[serde(default)]
    pub categoria: String,
    pub titulo: String,
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub produto_nome: Option<String>,
    #[serde(default, deserialize_with = "or_zero")]
    pub urgencia: u8,
    #[serde(default)]
    pub acao_sugerida: String,
}

/// One AI insight
#[derive(Debug, Clone, Deserialize)]
pub struct Insight {
    #[serde(alias = "title")]
    pub titulo: String,
    #[serde(default, alias = "description")]
    pub descricao: String,
    #[serde(default, alias = "confidence")]
    pub confianca: Option<f64>,
    #[serde(default, alias = "recommendation")]
    pub recomendacao: Option<String>,
}

/// Insights arrive either as a bare list or wrapped in `{"insights": [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InsightsPayload {
    List(Vec<Insight>),
    Wrapped { insights: Vec<Insight> },
}

impl InsightsPayload {
    pub fn into_vec(self) -> Vec<Insight> {
        match self {
            InsightsPayload::List(items) => items,
            InsightsPayload::Wrapped { insights } => insights,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Number(f64),
    Text(String),
}

fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<DecimalRepr>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(DecimalRepr::Number(n)) => Ok(n),
        Some(DecimalRepr::Text(s)) if s.trim().is_empty() => Ok(0.0),
        Some(DecimalRepr::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal: {:?}", s))),
    }
}

fn or_zero<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
