use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::aliases::{AliasTable, DiscoveredAlias};
use crate::config::EngineConfig;
use crate::error::{NameCollision, OrphanEvent, UnresolvedIdentity};
use crate::normalize::{NormalizedBatch, normalize};
use crate::query::MetricStore;
use crate::records::RawRow;
use crate::schema::{Rejection, validate};
use crate::window::Window;

#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub label: String,
    pub rows: Vec<RawRow>,
    /// Empty means the season window only.
    pub windows: Vec<Window>,
}

impl AnalysisRequest {
    pub fn new(label: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            label: label.into(),
            rows,
            windows: Vec::new(),
        }
    }

    pub fn with_window(mut self, window: Window) -> Self {
        if !self.windows.contains(&window) {
            self.windows.push(window);
        }
        self
    }
}

/// Everything the pipeline set aside while producing the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub rows_in: usize,
    pub rows_valid: usize,
    pub rejected: Vec<Rejection>,
    pub unresolved: Vec<UnresolvedIdentity>,
    pub discovered: Vec<DiscoveredAlias>,
    pub superseded: Vec<String>,
    pub collisions: Vec<NameCollision>,
    pub orphaned: Vec<OrphanEvent>,
    pub alias_version: u64,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub label: String,
    pub batch: NormalizedBatch,
    pub store: MetricStore,
    pub report: PipelineReport,
}

/// validate → normalize → aggregate → metrics, synchronously.
pub fn analyze(request: AnalysisRequest, aliases: Arc<AliasTable>, cfg: &EngineConfig) -> Analysis {
    let AnalysisRequest {
        label,
        rows,
        mut windows,
    } = request;
    if windows.is_empty() {
        windows.push(Window::Season);
    }
    let rows_in = rows.len();

    let validation = validate(rows, cfg);
    let rows_valid = validation.valid.len();
    let normalized = normalize(validation.valid, &aliases);
    for u in &normalized.unresolved {
        tracing::warn!(kind = ?u.kind, raw = %u.raw, assigned = %u.assigned, "unresolved name");
    }

    let store = MetricStore::build(&normalized.batch, &windows, Arc::clone(&aliases), cfg);

    let report = PipelineReport {
        rows_in,
        rows_valid,
        rejected: validation.rejected,
        unresolved: normalized.unresolved,
        discovered: normalized.discovered,
        superseded: normalized.superseded,
        collisions: normalized.collisions,
        orphaned: normalized.orphaned,
        alias_version: aliases.version(),
    };

    tracing::info!(
        label = %label,
        rows_in,
        rejected = report.rejected.len(),
        matches = normalized.batch.matches.len(),
        events = normalized.batch.events.len(),
        windows = windows.len(),
        "analysis complete"
    );

    Analysis {
        label,
        batch: normalized.batch,
        store,
        report,
    }
}

/// Independent requests in parallel; results keep request order.
pub fn analyze_many(
    requests: Vec<AnalysisRequest>,
    aliases: Arc<AliasTable>,
    cfg: &EngineConfig,
) -> Vec<Analysis> {
    requests
        .into_par_iter()
        .map(|req| analyze(req, Arc::clone(&aliases), cfg))
        .collect()
}
