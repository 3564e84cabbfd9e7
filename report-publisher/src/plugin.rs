use object_store::path::Path as ObjectPath;
use tokio::sync::mpsc::UnboundedSender;

use std::sync::Arc;

use crate::config::PublisherArgs;
use crate::errors::Error;
use crate::publisher::{PublishReport, Publisher, ReportSummary};
use crate::storage::ResultStorage;
use crate::store::UploadClient;

/// Signals sent by the run orchestrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrchestratorMessage {
    Setup,
    /// The run wrote all of its results and they can be published
    RunFinished,
}

/// Events the plugin reports back to the orchestrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginEvent {
    SetupAcknowledged,
    UploadFinished(Option<ReportSummary>),
    Error(String),
}

/// Publishes a run's results when the orchestrator says the run is done
pub struct UploadPlugin {
    args: PublisherArgs,
    publisher: Publisher,
    storage: Arc<dyn ResultStorage>,
    events: UnboundedSender<PluginEvent>,
}

impl UploadPlugin {
    /// Validates the configuration before anything else happens
    pub fn new(
        args: PublisherArgs,
        client: Arc<dyn UploadClient>,
        storage: Arc<dyn ResultStorage>,
        events: UnboundedSender<PluginEvent>,
    ) -> Result<Self, Error> {
        let bucket = args.bucket()?;
        tracing::debug!(bucket, "Upload plugin configured");
        let publisher = Publisher::new(client)
            .with_max_concurrent_uploads(args.max_concurrent_uploads)
            .with_validation(args.validation)
            .with_resumable(args.resumable);
        Ok(UploadPlugin {
            args,
            publisher,
            storage,
            events,
        })
    }

    pub async fn handle(&self, message: OrchestratorMessage) {
        match message {
            OrchestratorMessage::Setup => self.emit(PluginEvent::SetupAcknowledged),
            OrchestratorMessage::RunFinished => match self.upload_results().await {
                Ok(report) => {
                    tracing::info!(
                        uploaded = report.total(),
                        "Finished uploading results"
                    );
                    self.emit(PluginEvent::UploadFinished(Some(report.summary())));
                }
                Err(e) => {
                    tracing::error!(error = e.to_string(), "Failed to upload results");
                    self.emit(PluginEvent::Error(e.to_string()));
                    // Completion is still signalled so the pipeline is never left waiting
                    self.emit(PluginEvent::UploadFinished(None));
                }
            },
        }
    }

    /// Publish the result directory, the optional latest mirror, then clean up on a clean run
    pub async fn upload_results(&self) -> Result<PublishReport, Error> {
        let result_dir = self.storage.result_dir();
        let run_name = self.storage.default_prefix();
        if run_name.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "results directory {} has no name to publish under",
                result_dir.display()
            )));
        }
        let target = self.args.upload_target(&run_name)?;

        let mut report = self.publisher.publish(&result_dir, &target).await?;

        if self.args.copy_latest_files_to_parent {
            let parent_prefix = parent_prefix(&target.destination_prefix);
            let mirror = self
                .publisher
                .publish_latest_mirror(&result_dir, &target, &parent_prefix)
                .await?;
            report.merge(mirror);
        }

        let report = report.into_result()?;

        if self.args.remove_local_result_after_upload {
            self.storage.remove_local_results()?;
        }
        Ok(report)
    }

    fn emit(&self, event: PluginEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::trace!(
                event = tracing::field::debug(&e.0),
                "No orchestrator listening for plugin event"
            );
        }
    }
}

/// The prefix one level above `prefix`; the bucket root for single-segment prefixes
pub fn parent_prefix(prefix: &ObjectPath) -> ObjectPath {
    let parts: Vec<_> = prefix.parts().collect();
    match parts.split_last() {
        Some((_, parents)) => ObjectPath::from_iter(parents.iter().cloned()),
        None => ObjectPath::default(),
    }
}
