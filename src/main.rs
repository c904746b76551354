use std::env;
use std::error::Error;
use std::sync::Arc;

use arn_client::transport::HttpTransport;
use arn_client::transport::SasSigner;
use arn_client::transport::SharedSas;
use arn_client::transport::StaticToken;
use arn_client::transport::TokenCredential;
use arn_client::ClientBuilder;
use arn_client::Context;
use arn_client::Notification;
use arn_client::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const TOKEN_ENV: &str = "ARN_BEARER_TOKEN";
const SAS_ENV: &str = "ARN_BLOB_SAS";

/// Publishes one batch read from a JSON file.
///
/// Usage: `arn-notify <batch.json> [config-file]`
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn Error>> {
    init_observability();

    let mut args = env::args().skip(1);
    let Some(batch_path) = args.next() else {
        return Err("usage: arn-notify <batch.json> [config-file]".into());
    };
    let settings = Settings::load(args.next().as_deref())?;

    let token = env::var(TOKEN_ENV).map_err(|_| format!("{TOKEN_ENV} is not set"))?;
    let credential: Arc<dyn TokenCredential> = Arc::new(StaticToken::new(token));
    let transport = match env::var(SAS_ENV) {
        Ok(sas) => {
            let signer: Arc<dyn SasSigner> = Arc::new(SharedSas::new(sas));
            HttpTransport::from_settings(&settings, credential, Some(signer))?
        }
        Err(_) => HttpTransport::with_delegated_signing(&settings, credential).await?,
    };

    let notification = Notification::from_json(&tokio::fs::read(&batch_path).await?)?;
    let client = ClientBuilder::new(settings).transport(Arc::new(transport)).build()?;

    let ctx = Context::background();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = graceful_shutdown(&shutdown).await {
            error!("Failed to listen for shutdown: {:?}", e);
        }
    });

    let items = notification.item_count();
    let outcome = client.notify(&ctx, notification).await;
    client.close().await;

    match outcome {
        Ok(()) => {
            info!(items, "batch delivered");
            Ok(())
        }
        Err(e) => {
            error!(items, "batch failed: {}", e);
            Err(e.into())
        }
    }
}

/// Cancels `ctx` on the first termination signal.
async fn graceful_shutdown(ctx: &Context) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }
    ctx.cancel();
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
