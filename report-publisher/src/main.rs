use dotenv::dotenv;
use tokio::sync::mpsc::unbounded_channel;

use std::path::Path;
use std::sync::Arc;

use report_publisher::{
    config::{Backend, Cli},
    errors::Error,
    plugin::{OrchestratorMessage, PluginEvent, UploadPlugin},
    storage::LocalResultStorage,
    store::{ObjectStoreClient, UploadClient},
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli: Cli = Cli::args();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = tracing::field::debug(&e), "Publisher failed");
            std::process::exit(if e.is_fatal() { 2 } else { 1 });
        }
    }
}

/// Drive one setup and publish cycle; returns whether every upload succeeded
async fn run(cli: Cli) -> Result<bool, Error> {
    let args = cli.publisher_args()?;
    let bucket = args.bucket()?.to_string();
    tracing::info!(config = tracing::field::debug(&args), "Publisher request");

    let client: Arc<dyn UploadClient> = match args.backend {
        Backend::Gcs => Arc::new(ObjectStoreClient::gcs(
            &bucket,
            args.service_account_key_path.as_deref(),
            args.public,
        )?),
        Backend::Local => Arc::new(ObjectStoreClient::local(&args.local_store_dir, &bucket)?),
    };
    let storage = Arc::new(LocalResultStorage::new(&cli.results_dir));

    let (tx, mut rx) = unbounded_channel();
    let plugin = UploadPlugin::new(args, client, storage, tx)?;

    plugin.handle(OrchestratorMessage::Setup).await;
    plugin.handle(OrchestratorMessage::RunFinished).await;
    drop(plugin);

    let mut success = true;
    while let Some(event) = rx.recv().await {
        match event {
            PluginEvent::SetupAcknowledged => tracing::debug!("Setup acknowledged"),
            PluginEvent::Error(detail) => {
                success = false;
                tracing::error!(detail = detail.as_str(), "Publish failed");
            }
            PluginEvent::UploadFinished(summary) => {
                tracing::info!(summary = tracing::field::debug(&summary), "Upload finished");
                if let (Some(summary), Some(report_file)) = (summary, &cli.report_file) {
                    summary.write_json(Path::new(report_file))?;
                }
            }
        }
    }
    Ok(success)
}
