use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upper bound on concurrently in-flight LLM calls within one investigation.
/// The original ran its per-trace analysis and verification loops serially;
/// `futures::stream::buffer_unordered` (the crate is already a dependency
/// for the SSE bridge in `handlers::chat`) gives the same fan-out the
/// agents' own cache-aware, stateless design already allows for.
const MAX_CONCURRENT_TRACE_TASKS: usize = 4;

use crate::models::cache::CachePolicy;
use crate::models::search::{EnvDescriptor, ProjectSource, SearchParameters};
use crate::models::trace::TraceBundle;
use crate::services::agents::{AnalyzeAgent, ContextRuleTable, ParameterAgent, RelevanceAnalyzer};
use crate::services::files::FileLogReader;
use crate::services::loki::{LokiClient, QueryBuilderInput};
use crate::services::trace_compiler::compile_trace_bundles;
use crate::services::trace_extractor::{extract_trace_id_at, extract_trace_ids_from_loki, unique_xml_trace_ids};

/// One progress update the orchestrator emits as it advances through its
/// stages. Event names match
/// `original_source/app/orchestrator.py::analyze_stream` verbatim, so a
/// client built against the original's SSE stream needs no changes.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(tag = "event", content = "data")]
pub enum ProgressEvent {
    #[serde(rename = "Extracted Parameters")]
    ExtractedParameters { parameters: SearchParameters },
    #[serde(rename = "Found relevant files")]
    FoundRelevantFiles { total_files: usize },
    #[serde(rename = "Downloaded logs in file")]
    DownloadedLogsInFile {},
    #[serde(rename = "Found trace id(s)")]
    FoundTraceIds { count: usize },
    #[serde(rename = "Compiled Request Traces")]
    CompiledRequestTraces { traces_compiled: usize },
    #[serde(rename = "Compiled Summary")]
    CompiledSummary { created_files: Vec<String>, master_summary_file: String },
    #[serde(rename = "Verification Results")]
    VerificationResults { summary: String },
    #[serde(rename = "done")]
    Done { message: String },
    #[serde(rename = "error")]
    Error { message: String },
}

pub struct Orchestrator {
    parameter_agent: Arc<ParameterAgent>,
    analyze_agent: Arc<AnalyzeAgent>,
    relevance_analyzer: Arc<RelevanceAnalyzer>,
    context_rules: Arc<ContextRuleTable>,
    loki_client: Arc<LokiClient>,
    output_dir: std::path::PathBuf,
}

impl Orchestrator {
    pub fn new(
        parameter_agent: Arc<ParameterAgent>,
        analyze_agent: Arc<AnalyzeAgent>,
        relevance_analyzer: Arc<RelevanceAnalyzer>,
        context_rules: Arc<ContextRuleTable>,
        loki_client: Arc<LokiClient>,
        output_dir: std::path::PathBuf,
    ) -> Self {
        Self { parameter_agent, analyze_agent, relevance_analyzer, context_rules, loki_client, output_dir }
    }

    /// Drives the full six-stage pipeline, pushing one `ProgressEvent` per
    /// stage onto `tx`. Grounded precisely on `orchestrator.py`'s
    /// `analyze_stream` generator: every `yield` there is one `tx.send`
    /// here, in the same order, under the same names.
    pub async fn run(
        &self,
        tx: mpsc::Sender<ProgressEvent>,
        text: String,
        env: EnvDescriptor,
        cache_policy: CachePolicy,
    ) {
        if let Err(e) = self.run_inner(&tx, &text, &env, &cache_policy).await {
            let _ = tx.send(ProgressEvent::Error { message: e.to_string() }).await;
            return;
        }
        let _ = tx.send(ProgressEvent::Done { message: "Analysis complete.".to_string() }).await;
    }

    async fn run_inner(
        &self,
        tx: &mpsc::Sender<ProgressEvent>,
        text: &str,
        env: &EnvDescriptor,
        cache_policy: &CachePolicy,
    ) -> Result<(), crate::utils::error::ApiError> {
        // S0 -> S1: parameter extraction
        let parameters = self.parameter_agent.run(text).await;
        tx.send(ProgressEvent::ExtractedParameters { parameters: parameters.clone() }).await.ok();

        // S1 -> S2: log acquisition (file-based vs loki-based)
        let (sources, trace_ids): (Vec<(String, String)>, Vec<String>) = match env {
            ProjectSource::File { root_dir } => {
                let sources = self.read_file_sources(root_dir)?;
                tx.send(ProgressEvent::FoundRelevantFiles { total_files: sources.len() }).await.ok();

                // Trace-id discovery is restricted to lines matching the
                // prompt's query_keys, same as the original's
                // `log_searcher.search_with_trace_ids(lf, patterns)`. With no
                // query_keys there is nothing to filter by, so every
                // well-formed record in the file is taken.
                let mut ids = Vec::new();
                if parameters.query_keys.is_empty() {
                    for (_, content) in &sources {
                        for id in unique_xml_trace_ids(content) {
                            if !ids.contains(&id) {
                                ids.push(id);
                            }
                        }
                    }
                } else {
                    for (path, _) in &sources {
                        let found = FileLogReader::search_with_trace_ids(
                            Path::new(path),
                            &parameters.query_keys,
                            extract_trace_id_at,
                        )
                        .unwrap_or_default();
                        for id in found {
                            if !ids.contains(&id) {
                                ids.push(id);
                            }
                        }
                    }
                }
                tx.send(ProgressEvent::FoundTraceIds { count: ids.len() }).await.ok();
                (sources, ids)
            },
            ProjectSource::Remote { service_namespace } => {
                let mut filters = BTreeMap::new();
                filters.insert("service_namespace".to_string(), service_namespace.to_lowercase());
                let input = QueryBuilderInput {
                    filters,
                    search: parameters.query_keys.clone(),
                    date: parameters.time_frame.clone(),
                    ..Default::default()
                };
                let response = self.loki_client.query_cached(&input).await?;
                tx.send(ProgressEvent::DownloadedLogsInFile {}).await.ok();

                let ids = extract_trace_ids_from_loki(&response);
                tx.send(ProgressEvent::FoundTraceIds { count: ids.len() }).await.ok();

                let sources: Vec<(String, String)> = response
                    .data
                    .result
                    .iter()
                    .map(|r| {
                        let body =
                            r.values.iter().map(|(_, msg)| msg.clone()).collect::<Vec<_>>().join("\n");
                        ("loki".to_string(), body)
                    })
                    .collect();
                (sources, ids)
            },
        };

        // S2 -> S3: compile trace bundles
        let bundles = compile_trace_bundles(&trace_ids, &sources);
        tx.send(ProgressEvent::CompiledRequestTraces { traces_compiled: bundles.len() }).await.ok();

        // S3 -> S4: per-trace analysis + report rendering, bounded-concurrent
        std::fs::create_dir_all(&self.output_dir)?;
        let mut per_trace: Vec<(usize, String, crate::services::agents::TraceAnalysis)> = stream::iter(
            bundles.iter().enumerate(),
        )
        .map(|(idx, bundle)| {
            let text = text.to_string();
            let parameters = parameters.clone();
            let cache_policy = cache_policy.clone();
            async move {
                let analysis =
                    self.analyze_agent.analyze_trace(&text, &parameters, bundle, &cache_policy).await;
                let report = AnalyzeAgent::render_report(&bundle.trace_id, &analysis, bundle, &parameters);
                let path = self.output_dir.join(format!("trace_{}.md", bundle.trace_id));
                std::fs::write(&path, &report)?;
                Ok::<_, crate::utils::error::ApiError>((idx, path.to_string_lossy().to_string(), analysis))
            }
        })
        .buffer_unordered(MAX_CONCURRENT_TRACE_TASKS)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
        per_trace.sort_by_key(|(idx, _, _)| *idx);
        let created_files: Vec<String> = per_trace.iter().map(|(_, path, _)| path.clone()).collect();
        let analyses: Vec<crate::services::agents::TraceAnalysis> =
            per_trace.into_iter().map(|(_, _, analysis)| analysis).collect();
        let quality = self.analyze_agent.assess_quality(&analyses, cache_policy).await;
        let master_summary_file = self.output_dir.join("master_summary.md");
        std::fs::write(&master_summary_file, render_master_summary(&bundles, &quality))?;
        tx.send(ProgressEvent::CompiledSummary {
            created_files: created_files.clone(),
            master_summary_file: master_summary_file.to_string_lossy().to_string(),
        })
        .await
        .ok();

        // S4 -> S5: relevance scoring, bounded-concurrent
        let mut results: Vec<(usize, crate::models::relevance::RelevanceResult)> = stream::iter(
            bundles.iter().zip(created_files.iter()).enumerate(),
        )
        .map(|(idx, (bundle, path))| {
            let text = text.to_string();
            let parameters = parameters.clone();
            let timeline = bundle.timeline_text();
            let cache_policy = cache_policy.clone();
            async move {
                let result = self
                    .relevance_analyzer
                    .analyze_trace_relevance(
                        &text,
                        &parameters,
                        &self.context_rules,
                        path,
                        &bundle.trace_id,
                        &timeline,
                        &cache_policy,
                    )
                    .await;
                (idx, result)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_TRACE_TASKS)
        .collect()
        .await;
        results.sort_by_key(|(idx, _)| *idx);
        let results: Vec<crate::models::relevance::RelevanceResult> =
            results.into_iter().map(|(_, r)| r).collect();
        let summary = render_verification_summary(&results);
        tx.send(ProgressEvent::VerificationResults { summary }).await.ok();

        Ok(())
    }

    fn read_file_sources(&self, root_dir: &str) -> Result<Vec<(String, String)>, crate::utils::error::ApiError> {
        let root = Path::new(root_dir);
        let mut sources = Vec::new();
        if !root.exists() {
            return Ok(sources);
        }
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Ok(content) = FileLogReader::read_full_content(&path) {
                    sources.push((path.to_string_lossy().to_string(), content));
                }
            }
        }
        Ok(sources)
    }
}

fn render_master_summary(
    bundles: &[TraceBundle],
    quality: &crate::services::agents::QualityAssessment,
) -> String {
    format!(
        "# Master Summary\n\nTraces analyzed: {}\n\nOverall quality: {} / {} / {} / {} ({})\n\n{}\n",
        bundles.len(),
        quality.completeness_score,
        quality.relevance_score,
        quality.coverage_score,
        quality.overall_confidence,
        quality.status,
        format!("Generated: {}", chrono::Utc::now().to_rfc3339()),
    )
}

fn render_verification_summary(results: &[crate::models::relevance::RelevanceResult]) -> String {
    let highly_relevant = results
        .iter()
        .filter(|r| r.relevance_level == crate::models::relevance::RelevanceLevel::HighlyRelevant)
        .count();
    let ignored = results
        .iter()
        .filter(|r| r.relevance_level == crate::models::relevance::RelevanceLevel::Ignored)
        .count();
    format!(
        "Scored {} traces: {} highly relevant, {} ignored via pre-filter.",
        results.len(),
        highly_relevant,
        ignored
    )
}

/// Creates a fresh, process-unique session id for one analysis run, used as
/// the SSE stream route parameter.
pub fn new_session_id() -> Uuid {
    Uuid::new_v4()
}
