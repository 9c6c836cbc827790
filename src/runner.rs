//! Event routing, stage chaining and batch runs.
//!
//! A deployed pipeline receives one notification per created object and
//! [`Pipeline::handle`] routes it to the stage that owns its namespace. When
//! no external trigger links the stages (a local run, a backfill) the
//! Compressor's output is fed straight into the Extractor.

use crate::compressor::Compressor;
use crate::config::PipelineConfig;
use crate::error::GeoRefError;
use crate::extractor::{Extractor, Services};
use crate::job::{ObjectEvent, Stage};
use crate::output::InvocationStatus;
use crate::progress::ProgressCallback;
use crate::store::ObjectStore;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{info, warn};

/// Both stages over one set of services.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    store: ObjectStore,
    compressor: Compressor,
    extractor: Extractor,
    chain: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> Self {
        let store = services.store.clone();
        Self {
            compressor: Compressor::new(config.clone(), store.clone()),
            extractor: Extractor::new(config.clone(), services),
            config,
            store,
            chain: true,
        }
    }

    /// Whether a compressed PNG is analysed in the same invocation.
    ///
    /// Turn this off when the store itself notifies the Extractor, or every
    /// map would be analysed twice.
    pub fn with_chaining(mut self, chain: bool) -> Self {
        self.chain = chain;
        self
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Route one event; returns one status per stage that ran.
    pub async fn handle(&self, event: &ObjectEvent) -> Vec<InvocationStatus> {
        match Stage::route(event, &self.config.namespaces) {
            Some(Stage::Compress) => {
                let status = self.compressor.handle(event).await;
                let chained = match (&status, self.chain) {
                    (InvocationStatus::Compressed { output_key, .. }, true) => {
                        Some(self.extractor.handle(&ObjectEvent::new(output_key.clone())).await)
                    }
                    _ => None,
                };
                std::iter::once(status).chain(chained).collect()
            }
            Some(Stage::Extract) => vec![self.extractor.handle(event).await],
            None => {
                info!("No stage handles {}", event.key);
                vec![InvocationStatus::skipped(
                    &event.key,
                    "outside the raw and compressed namespaces",
                )]
            }
        }
    }

    /// Parse an S3-style notification and handle each record in order.
    pub async fn handle_notification(&self, json: &str) -> Result<Vec<InvocationStatus>, GeoRefError> {
        let events = ObjectEvent::from_notification(json)?;
        let mut statuses = Vec::new();
        for event in &events {
            statuses.extend(self.handle(event).await);
        }
        Ok(statuses)
    }

    /// Every object currently in the raw namespace, as events.
    pub async fn pending_raw(&self) -> Result<Vec<ObjectEvent>, GeoRefError> {
        let keys = self.store.list(&self.config.namespaces.raw).await?;
        Ok(keys.into_iter().map(ObjectEvent::new).collect())
    }

    /// Handle `events` with at most `config.concurrency` in flight.
    ///
    /// Completion order is not submission order.
    pub async fn run_batch(
        &self,
        events: Vec<ObjectEvent>,
        progress: Option<ProgressCallback>,
    ) -> Vec<InvocationStatus> {
        let start = Instant::now();
        let total = events.len();
        if let Some(ref cb) = progress {
            cb.on_batch_start(total);
        }

        let statuses: Vec<Vec<InvocationStatus>> = stream::iter(events.into_iter().map(|event| {
            let progress = progress.clone();
            async move {
                if let Some(ref cb) = progress {
                    cb.on_object_start(&event.key);
                }
                let statuses = self.handle(&event).await;
                if let (Some(cb), Some(last)) = (progress.as_ref(), statuses.last()) {
                    cb.on_object_complete(&event.key, last);
                }
                statuses
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await;

        let statuses: Vec<InvocationStatus> = statuses.into_iter().flatten().collect();
        let failed = statuses.iter().filter(|s| s.is_failure()).count();
        if failed > 0 {
            warn!("{} of {} invocations failed", failed, statuses.len());
        }
        info!(
            "Batch of {} objects done in {:?} ({} statuses, {} failed)",
            total,
            start.elapsed(),
            statuses.len(),
            failed
        );
        if let Some(ref cb) = progress {
            cb.on_batch_complete(total, failed);
        }
        statuses
    }
}
