//! The Compressor stage: raw TIFF scan → size-bounded PNG.
//!
//! ```text
//! raw/<name>.tif ──▶ compress (spawn_blocking) ──▶ compressed/<name>.png
//!                                └─ on failure ──▶ error/<name>.txt
//! ```
//!
//! Non-TIFF keys are skipped without an error record.

use crate::config::{Namespaces, PipelineConfig};
use crate::error::GeoRefError;
use crate::job::{Job, JobState, ObjectEvent, Stage};
use crate::output::InvocationStatus;
use crate::pipeline::compress::compress_blocking;
use crate::store::{ErrorChannel, ObjectStore};
use std::time::Instant;
use tracing::{error, info};

/// Handles raw-namespace objects.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: PipelineConfig,
    store: ObjectStore,
    errors: ErrorChannel,
}

impl Compressor {
    pub fn new(config: PipelineConfig, store: ObjectStore) -> Self {
        let errors = ErrorChannel::new(store.clone(), config.namespaces.error.clone());
        Self {
            config,
            store,
            errors,
        }
    }

    /// Handle every record of a notification.
    pub async fn handle_all(&self, events: &[ObjectEvent]) -> Vec<InvocationStatus> {
        let mut statuses = Vec::with_capacity(events.len());
        for event in events {
            statuses.push(self.handle(event).await);
        }
        statuses
    }

    /// Handle one created object. Never returns an error: failures are
    /// recorded in the error namespace and reported in the status.
    pub async fn handle(&self, event: &ObjectEvent) -> InvocationStatus {
        let mut job = Job::new(event.key.clone());

        if !event.is_tiff() {
            info!("Skipping non-TIFF file: {}", event.key);
            job.skip();
            return InvocationStatus::skipped(&event.key, "not a TIFF file");
        }

        match self.process(event, &mut job).await {
            Ok(written) => InvocationStatus::Compressed {
                key: event.key.clone(),
                location: self.store.location(&written.key),
                output_key: written.key,
                width: written.width,
                height: written.height,
                size_bytes: written.size_bytes,
                within_target: written.within_target,
            },
            Err(e) => {
                job.fail();
                let message = format!("Error processing file {}: {}", event.key, e);
                error!("{}", message);
                let error_record = self.errors.record(&record_name(event), &message).await;
                InvocationStatus::Failed {
                    key: event.key.clone(),
                    stage: Stage::Compress,
                    error: message,
                    error_record,
                }
            }
        }
    }

    async fn process(
        &self,
        event: &ObjectEvent,
        job: &mut Job,
    ) -> Result<CompressedOutput, GeoRefError> {
        let start = Instant::now();
        let base = event.base_name()?.to_string();
        let bytes = self.store.get(&event.key).await?;
        info!("Compressing {} ({} bytes)", event.key, bytes.len());

        let report =
            compress_blocking(event.key.clone(), bytes, self.config.target_bytes()).await?;

        let output_key = Namespaces::key(&self.config.namespaces.compressed, &format!("{base}.png"));
        let written = CompressedOutput {
            key: output_key,
            width: report.image.width,
            height: report.image.height,
            size_bytes: report.image.size_bytes(),
            within_target: report.within_target,
        };
        self.store.put(&written.key, report.image.png).await?;
        job.advance(JobState::Converted)?;

        info!(
            "Converted {} → {} ({}x{}, {} bytes, scale {:.3}) in {:?}",
            event.key,
            self.store.location(&written.key),
            written.width,
            written.height,
            written.size_bytes,
            report.scale,
            start.elapsed()
        );
        Ok(written)
    }
}

/// What `process` wrote, once the PNG bytes have moved into the store.
struct CompressedOutput {
    key: String,
    width: u32,
    height: u32,
    size_bytes: u64,
    within_target: bool,
}

/// Error-record name for `event`: its base name, or the sanitised key when
/// the key has no file name.
pub(crate) fn record_name(event: &ObjectEvent) -> String {
    match event.base_name() {
        Ok(base) => base.to_string(),
        Err(_) => event.key.trim_matches('/').replace('/', "_"),
    }
}
