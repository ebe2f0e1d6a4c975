//! The two-round ingest pipeline.
//!
//! Round 1 buffers every merged entry in memory, discovers templates with
//! the Drain clusterer, labels the generalised ones through the LLM in a
//! single call, and persists the patterns. Round 2 re-scans the buffered
//! entries, attaches labels via the template matcher, and writes entries to
//! the store in batches. Template identity depends on the complete input,
//! which is why entries cannot be tagged on first read.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LappError;
use crate::labeler::{self, LabelerConfig, PatternInput};
use crate::multiline::{Detector, DetectorConfig, MergedEntry, merge_stream};
use crate::pattern::{DrainClusterer, DrainConfig, Template, match_template};
use crate::source;
use crate::store::{DuckDbStore, LogEntry, StoredPattern};

/// Entries are written to the store in transactions of this size.
const INSERT_BATCH_SIZE: usize = 500;

/// Samples collected per template as labeler context.
const SAMPLES_PER_PATTERN: usize = 3;

/// Counters describing a completed ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Logical entries stored.
    pub entries: usize,
    /// Templates discovered, including single-match clusters.
    pub templates_total: usize,
    /// Templates with more than one match, i.e. the labeled set.
    pub templates_labeled: usize,
}

/// Run the full two-round ingest of `log_path` into `store`.
///
/// The reader and merger run on their own tasks; this function drains their
/// channel, so the source is fully consumed before pattern discovery starts.
/// The first read error aborts the run with nothing committed. A labeling
/// failure also aborts: labels are part of the contract of a run.
pub async fn run_ingest(
    log_path: impl AsRef<Path>,
    store: &mut DuckDbStore,
    labeler_config: &LabelerConfig,
    detector_config: DetectorConfig,
    cancel: CancellationToken,
) -> Result<IngestReport, LappError> {
    store.init()?;

    let detector = Detector::new(detector_config)?;
    let lines = source::read_lines(log_path, cancel.clone()).await?;
    let mut merged = merge_stream(lines, detector);

    // Round 1: collect all entries in memory. No store writes yet.
    let mut entries: Vec<MergedEntry> = Vec::new();
    while let Some(result) = merged.recv().await {
        entries.push(result?);
    }
    if cancel.is_cancelled() {
        return Err(LappError::Cancelled);
    }
    debug!(entries = entries.len(), "collected merged entries");

    let clusterer = DrainClusterer::new(DrainConfig::default());
    clusterer.feed(entries.iter().map(|e| e.content.as_str()));
    let templates = clusterer.templates();

    // Single-match clusters are literal lines, not generalisations; only the
    // rest is worth labeling.
    let generalized: Vec<Template> = templates.iter().filter(|t| t.count > 1).cloned().collect();

    let mut semantic_ids: HashMap<Uuid, String> = HashMap::new();
    if !generalized.is_empty() {
        let inputs = build_label_inputs(&generalized, &entries);
        info!(patterns = inputs.len(), "labeling discovered patterns");
        let labels = labeler::label(labeler_config, &inputs).await?;

        let by_id: HashMap<&str, &labeler::SemanticLabel> =
            labels.iter().map(|l| (l.pattern_id.as_str(), l)).collect();

        let mut stored = Vec::with_capacity(generalized.len());
        for template in &generalized {
            let id_string = template.id.to_string();
            let mut pattern = StoredPattern {
                pattern_id: id_string.clone(),
                pattern_type: "drain".to_string(),
                raw_pattern: template.pattern.clone(),
                semantic_id: None,
                description: None,
            };
            if let Some(label) = by_id.get(id_string.as_str()) {
                pattern.semantic_id = Some(label.semantic_id.clone());
                pattern.description = Some(label.description.clone());
                semantic_ids.insert(template.id, label.semantic_id.clone());
            }
            stored.push(pattern);
        }
        store.insert_patterns(&stored)?;
    }

    // Round 2: match every entry against the full template list (including
    // single-match clusters) and persist in batches.
    let mut batch: Vec<LogEntry> = Vec::with_capacity(INSERT_BATCH_SIZE);
    for entry in &entries {
        let mut labels = HashMap::new();
        if let Some(template) = match_template(&entry.content, &templates) {
            if let Some(semantic_id) = semantic_ids.get(&template.id) {
                labels.insert("pattern".to_string(), semantic_id.clone());
                labels.insert("pattern_id".to_string(), template.id.to_string());
            }
        }

        batch.push(LogEntry {
            id: 0,
            line_number: entry.start_line,
            end_line_number: entry.end_line,
            timestamp: Utc::now(),
            raw: entry.content.clone(),
            labels,
        });

        if batch.len() >= INSERT_BATCH_SIZE {
            store.insert_log_batch(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        store.insert_log_batch(&batch)?;
    }

    let report = IngestReport {
        entries: entries.len(),
        templates_total: templates.len(),
        templates_labeled: generalized.len(),
    };
    info!(
        entries = report.entries,
        templates = report.templates_total,
        labeled = report.templates_labeled,
        "ingest complete"
    );
    Ok(report)
}

/// Collect up to [`SAMPLES_PER_PATTERN`] sample lines per template by
/// scanning the buffered entries with the matcher.
fn build_label_inputs(templates: &[Template], entries: &[MergedEntry]) -> Vec<PatternInput> {
    templates
        .iter()
        .map(|template| {
            let candidates = std::slice::from_ref(template);
            let samples: Vec<String> = entries
                .iter()
                .filter(|e| match_template(&e.content, candidates).is_some())
                .take(SAMPLES_PER_PATTERN)
                .map(|e| e.content.clone())
                .collect();
            PatternInput {
                pattern_id: template.id,
                pattern: template.pattern.clone(),
                samples,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_inputs_cap_samples_per_template() {
        let template = Template {
            id: Uuid::from_u128(7),
            pattern: "PacketResponder <*> for block <*> terminating".to_string(),
            count: 5,
        };
        let entries: Vec<MergedEntry> = (0..5)
            .map(|i| MergedEntry {
                start_line: i + 1,
                end_line: i + 1,
                content: format!("PacketResponder {i} for block blk_{i} terminating"),
            })
            .collect();

        let inputs = build_label_inputs(std::slice::from_ref(&template), &entries);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].pattern_id, template.id);
        assert_eq!(inputs[0].samples.len(), SAMPLES_PER_PATTERN);
        assert_eq!(
            inputs[0].samples[0],
            "PacketResponder 0 for block blk_0 terminating"
        );
    }

    #[test]
    fn label_inputs_allow_templates_without_samples() {
        let template = Template {
            id: Uuid::from_u128(8),
            pattern: "never matches anything".to_string(),
            count: 2,
        };
        let inputs = build_label_inputs(std::slice::from_ref(&template), &[]);
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].samples.is_empty());
    }
}
