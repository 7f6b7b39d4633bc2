//! Chart - render a query result as a standalone HTML page
//!
//! The first column gives the labels, the second the values. The page loads
//! Plotly from its CDN and embeds the data as JSON.

use crate::error::{AgentError, Result};
use crate::executor::QueryResult;
use crate::export::artifact_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Pie,
    Line,
}

impl ChartKind {
    fn title(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Análisis de Ventas",
            ChartKind::Pie => "Distribución",
            ChartKind::Line => "Tendencia",
        }
    }
}

impl FromStr for ChartKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(ChartKind::Bar),
            "pie" => Ok(ChartKind::Pie),
            "line" => Ok(ChartKind::Line),
            other => Err(AgentError::Config(format!("unknown chart type: {}", other))),
        }
    }
}

pub struct ChartRenderer {
    output_dir: PathBuf,
}

impl ChartRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn render(&self, result: &QueryResult, kind: ChartKind) -> Result<PathBuf> {
        let html = chart_html(result, kind)?;
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            AgentError::ArtifactWrite(format!("cannot create {}: {}", self.output_dir.display(), e))
        })?;
        let path = self.output_dir.join(artifact_name("chart", None, "html"));
        std::fs::write(&path, html)
            .map_err(|e| AgentError::ArtifactWrite(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), ?kind, "Chart written");
        Ok(path)
    }
}

fn plotly_trace(result: &QueryResult, kind: ChartKind) -> serde_json::Value {
    let labels: Vec<String> = result.rows.iter().map(|row| row[0].to_string()).collect();
    let values: Vec<Option<f64>> = result.rows.iter().map(|row| row[1].as_f64()).collect();

    match kind {
        ChartKind::Bar => serde_json::json!({"type": "bar", "x": labels, "y": values}),
        ChartKind::Line => serde_json::json!({"type": "scatter", "mode": "lines+markers", "x": labels, "y": values}),
        ChartKind::Pie => serde_json::json!({"type": "pie", "labels": labels, "values": values}),
    }
}

/// Full HTML document for a chart
pub fn chart_html(result: &QueryResult, kind: ChartKind) -> Result<String> {
    if result.columns.len() < 2 || result.rows.iter().any(|row| row.len() < 2) {
        return Err(AgentError::ArtifactWrite(
            "a chart needs at least 2 columns".to_string(),
        ));
    }

    let trace = plotly_trace(result, kind);
    let layout = serde_json::json!({
        "title": kind.title(),
        "xaxis": {"title": result.columns[0]},
        "yaxis": {"title": result.columns[1]},
    });

    // "</" inside a script block would end it early
    let data_json = serde_json::to_string(&[trace])?.replace("</", "<\\/");
    let layout_json = serde_json::to_string(&layout)?.replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body>
<div id="chart" style="width:100%;height:90vh;"></div>
<script>
Plotly.newPlot("chart", {data}, {layout});
</script>
</body>
</html>
"#,
        title = kind.title(),
        cdn = PLOTLY_CDN,
        data = data_json,
        layout = layout_json,
    ))
}
