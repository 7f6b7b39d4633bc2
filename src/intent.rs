//! Intent Classifier - keyword heuristics over the raw request
//!
//! Four independent checks, no scoring and no negation handling. Text is
//! lower-cased and stripped of diacritics before matching, so "gráfico" and
//! "grafico" hit the same keyword.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Keywords meaning the request needs data from the store
pub const QUERY_KEYWORDS: &[&str] = &[
    // Spanish
    "top", "total", "suma", "cuanto", "cuantos", "vendedor", "producto", "sede", "ventas",
    "lista", "mejor", "mayor",
    // English
    "sum", "how many", "seller", "product", "site", "sales", "list", "best", "highest",
];

pub const CHART_KEYWORDS: &[&str] = &["grafico", "grafica", "visualiz", "chart", "graph"];

pub const EXPORT_KEYWORDS: &[&str] = &[
    "archivo", "csv", "excel", "exporta", "guarda", "guardar", "file", "export", "save",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

/// Downstream actions inferred from one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentFlags {
    pub needs_query: bool,
    pub needs_chart: bool,
    pub needs_export: bool,
    pub export_format: ExportFormat,
}

/// Lower-case and drop combining marks ("Más Gráficos" -> "mas graficos")
pub fn fold_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn contains_any(folded: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| folded.contains(kw))
}

/// Classify a request. Total over all inputs; the empty string yields all-false flags.
pub fn classify(request: &str) -> IntentFlags {
    let folded = fold_text(request);

    let needs_export = contains_any(&folded, EXPORT_KEYWORDS);
    let export_format = if needs_export && folded.contains("excel") {
        ExportFormat::Excel
    } else {
        ExportFormat::Csv
    };

    IntentFlags {
        needs_query: contains_any(&folded, QUERY_KEYWORDS),
        needs_chart: contains_any(&folded, CHART_KEYWORDS),
        needs_export,
        export_format,
    }
}
