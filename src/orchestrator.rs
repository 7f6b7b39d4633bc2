//! Orchestrator - one request through classify, synthesize, execute, chart, export
//!
//! Stages run in a fixed order and every path ends in `Stage::Done`. Failures
//! from synthesis or execution stop the request before any artifact is
//! written; artifact failures are reported next to the query result, which
//! is kept.

use crate::chart::{ChartKind, ChartRenderer};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::executor::{QueryExecutor, QueryResult};
use crate::export::Exporter;
use crate::intent::{classify, ExportFormat, IntentFlags};
use crate::llm::ModelGateway;
use crate::store::schema_description;
use crate::synthesis::SqlSynthesizer;
use itertools::Itertools;
use std::fmt::Write as _;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Sample requests shown when nothing query-like was detected
pub const SAMPLE_REQUESTS: [&str; 3] = [
    "Top 5 productos más vendidos",
    "Ventas totales por sede con gráfico",
    "Guarda las ventas por vendedor en CSV",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classified,
    QueryAttempted,
    NoQueryNeeded,
    ChartAttempted,
    ExportAttempted,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactOutcome {
    Written(PathBuf),
    Failed(String),
}

impl ArtifactOutcome {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ArtifactOutcome::Written(path) => Some(path),
            ArtifactOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// The query ran; artifacts may or may not have been written
    Answered,
    /// Synthesis or execution failed, nothing after it ran
    QueryFailed(AgentError),
    /// No query keyword found, the help text is shown instead
    NoQueryNeeded,
}

/// Everything the operator sees for one request
#[derive(Debug)]
pub struct PresentationOutput {
    pub request_id: String,
    pub request: String,
    pub flags: IntentFlags,
    pub sql: Option<String>,
    pub result: Option<QueryResult>,
    pub chart: Option<ArtifactOutcome>,
    pub export: Option<ArtifactOutcome>,
    pub outcome: Outcome,
    pub stages: Vec<Stage>,
}

impl PresentationOutput {
    fn new(request: &str, flags: IntentFlags) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            request: request.to_string(),
            flags,
            sql: None,
            result: None,
            chart: None,
            export: None,
            outcome: Outcome::Answered,
            stages: vec![Stage::Classified],
        }
    }

    fn finish(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self.stages.push(Stage::Done);
        self
    }

    /// Plain-text rendering for the terminal
    pub fn render(&self, preview_rows: usize) -> String {
        let mut out = String::new();

        if let Some(sql) = &self.sql {
            let _ = writeln!(out, "SQL: {}", sql);
        }

        match &self.outcome {
            Outcome::NoQueryNeeded => {
                let _ = writeln!(out, "No data query detected in the request.");
                let _ = writeln!(out, "Try something like:");
                for sample in SAMPLE_REQUESTS {
                    let _ = writeln!(out, "  - {}", sample);
                }
                return out;
            }
            Outcome::QueryFailed(err) => {
                let _ = writeln!(out, "Error: {}", err);
                return out;
            }
            Outcome::Answered => {}
        }

        if let Some(result) = &self.result {
            let _ = writeln!(out, "Query executed: {} rows found", result.row_count);
            out.push('\n');
            out.push_str(&format_table(result, preview_rows));
            if result.row_count > preview_rows {
                let _ = writeln!(out, "\n... (showing {} of {} rows)", preview_rows, result.row_count);
            }
        }

        for (label, artifact) in [("Chart", &self.chart), ("Export", &self.export)] {
            match artifact {
                Some(ArtifactOutcome::Written(path)) => {
                    let _ = writeln!(out, "{} written: {}", label, path.display());
                }
                Some(ArtifactOutcome::Failed(reason)) => {
                    let _ = writeln!(out, "{} failed: {}", label, reason);
                }
                None => {}
            }
        }

        out
    }
}

/// Aligned text table of the first `limit` rows
pub fn format_table(result: &QueryResult, limit: usize) -> String {
    let shown: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(limit)
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            shown
                .iter()
                .map(|row| row[idx].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let pad = |text: &str, width: usize| {
        let fill = width.saturating_sub(text.chars().count());
        format!("{}{}", text, " ".repeat(fill))
    };

    let mut out = String::new();
    let header = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| pad(name, *w))
        .join("  ");
    let _ = writeln!(out, "{}", header.trim_end());
    for row in &shown {
        let line = row.iter().zip(&widths).map(|(cell, w)| pad(cell, *w)).join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    executor: QueryExecutor,
    exporter: Exporter,
    charts: ChartRenderer,
    schema: String,
    chart_kind: ChartKind,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &AppConfig) -> Self {
        Self {
            gateway,
            executor: QueryExecutor::new(&config.db_path),
            exporter: Exporter::new(&config.output_dir),
            charts: ChartRenderer::new(&config.output_dir),
            schema: schema_description(),
            chart_kind: ChartKind::default(),
        }
    }

    pub fn with_chart_kind(mut self, kind: ChartKind) -> Self {
        self.chart_kind = kind;
        self
    }

    /// Handle one request end to end. Never returns an error; failures are
    /// carried in the output.
    pub async fn handle(&self, request: &str) -> PresentationOutput {
        let flags = classify(request);
        let output = PresentationOutput::new(request, flags);
        let span = info_span!("request", id = %output.request_id);

        async move {
            info!(?flags, "Classified request");
            self.run_stages(output).await
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, mut output: PresentationOutput) -> PresentationOutput {
        let flags = output.flags;

        if !flags.needs_query {
            output.stages.push(Stage::NoQueryNeeded);
            return output.finish(Outcome::NoQueryNeeded);
        }

        output.stages.push(Stage::QueryAttempted);
        let synthesizer = SqlSynthesizer::new(self.gateway.as_ref());
        let sql = match synthesizer.synthesize(&output.request, &self.schema).await {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                return output.finish(Outcome::QueryFailed(e));
            }
        };
        output.sql = Some(sql.clone());

        let result = self.executor.execute(&sql);
        if let Some(err) = result.error.clone() {
            return output.finish(Outcome::QueryFailed(err.into()));
        }

        if flags.needs_chart {
            output.stages.push(Stage::ChartAttempted);
            output.chart = Some(artifact(self.charts.render(&result, self.chart_kind)));
        }

        if flags.needs_export {
            output.stages.push(Stage::ExportAttempted);
            output.export = Some(artifact(self.export(&result, flags.export_format)));
        }

        output.result = Some(result);
        output.finish(Outcome::Answered)
    }

    fn export(&self, result: &QueryResult, format: ExportFormat) -> crate::error::Result<PathBuf> {
        self.exporter.export(result, format)
    }
}

/// Drive `work` to completion even if `interrupt` fires first. Returns the
/// output and whether the interrupt fired.
pub async fn finish_then_stop<W, I>(work: W, interrupt: I) -> (W::Output, bool)
where
    W: Future,
    I: Future,
{
    tokio::pin!(work);
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            output = &mut work => return (output, interrupted),
            _ = &mut interrupt, if !interrupted => {
                info!("Interrupt received, finishing the current request");
                interrupted = true;
            }
        }
    }
}

fn artifact(written: crate::error::Result<PathBuf>) -> ArtifactOutcome {
    match written {
        Ok(path) => ArtifactOutcome::Written(path),
        Err(e) => {
            warn!("Artifact step failed: {}", e);
            ArtifactOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CellValue;

    #[test]
    fn test_format_table_aligns_columns() {
        let result = QueryResult::success(
            "q",
            vec!["producto".into(), "total".into()],
            vec![
                vec![CellValue::Text("SSD 1TB".into()), CellValue::Integer(120)],
                vec![CellValue::Text("Audífonos Sony".into()), CellValue::Integer(7)],
            ],
            0,
        );
        let table = format_table(&result, 20);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "producto        total");
        assert_eq!(lines[1], "SSD 1TB         120");
        assert_eq!(lines[2], "Audífonos Sony  7");
    }

    #[test]
    fn test_preview_is_truncated() {
        let rows = (0..25).map(|i| vec![CellValue::Integer(i)]).collect();
        let result = QueryResult::success("q", vec!["n".into()], rows, 0);
        let mut output = PresentationOutput::new("ventas", classify("ventas"));
        output.result = Some(result);
        let output = output.finish(Outcome::Answered);

        let text = output.render(20);
        assert!(text.contains("25 rows found"));
        assert!(text.contains("showing 20 of 25 rows"));
        assert!(!text.lines().any(|l| l == "24"));
    }

    #[tokio::test]
    async fn test_interrupt_lets_the_request_finish() {
        let work = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            42
        };
        let (output, interrupted) = finish_then_stop(work, async {}).await;
        assert_eq!(output, 42);
        assert!(interrupted);

        let (output, interrupted) = finish_then_stop(async { 7 }, std::future::pending::<()>()).await;
        assert_eq!(output, 7);
        assert!(!interrupted);
    }

    #[test]
    fn test_help_text_lists_samples() {
        let output = PresentationOutput::new("", classify("")).finish(Outcome::NoQueryNeeded);
        let text = output.render(20);
        for sample in SAMPLE_REQUESTS {
            assert!(text.contains(sample));
        }
    }
}
