use anyhow::Context;

cfg_if::cfg_if! {
    if #[cfg(feature = "filesystem-meta-backend")] {
        use stowage_fs_meta::FsMetadataStore as SelectedMetadataStore;
    } else if #[cfg(feature = "postgresql-meta-backend")] {
        use stowage_pg_meta::PgMetadataStore as SelectedMetadataStore;
    } else {
        compile_error!("Use cargo features to select a metadata backend");
    }
}
cfg_if::cfg_if! {
    if #[cfg(feature = "filesystem-auth-backend")] {
        use stowage_auth::fs_backend::FsAuthProvider as SelectedAuthProvider;
    } else if #[cfg(feature = "yes-auth-backend")] {
        use stowage_auth::yes_backend::YesAuthProvider as SelectedAuthProvider;
    } else {
        use stowage_auth::no_backend::NoAuthProvider as SelectedAuthProvider;
    }
}
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::read_to_string;
use std::future::Future;
use tokio::net::TcpListener;

pub mod cli;
mod config;

/// Builds every backend from the config file and binds the listener.
///
/// The returned future serves requests until SIGTERM.
pub async fn start_listening(
    args: cli::StowageArgs,
) -> anyhow::Result<impl Future<Output = anyhow::Result<()>>> {
    let config: config::Config<SelectedMetadataStore, SelectedAuthProvider> =
        serde_yaml::from_str(
            &read_to_string(&args.config)
                .with_context(|| format!("Failed to read config file {}", args.config.display()))?,
        )
        .context("Failed to deserialize config file, please make sure its in the right format")?;

    let config::Config {
        service,
        meta_config,
        auth_config,
        blob_store,
    } = config;

    PrometheusBuilder::new()
        .with_http_listener(service.metrics_address)
        .set_buckets(&[
            100e-6, 500e-6, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1, 2e-1, 3e-1, 4e-1, 5e-1, 6e-1, 7e-1, 8e-1,
            9e-1, 1.0, 5.0, 10.0, 30.0, 60.0,
        ])
        .context("Failed to set buckets for prometheus")?
        .install()
        .context("Failed to install prometheus exporter")?;

    let addr = service.address;

    let meta_client =
        SelectedMetadataStore::new(meta_config).context("Failed to construct metadata client")?;
    let blob_client = blob_store
        .build()
        .context("Failed to construct blob store client")?;
    let auth_client =
        SelectedAuthProvider::new(auth_config).context("Failed to initialize auth client")?;

    let router = stowage_server::router(service, meta_client, blob_client, auth_client);

    tracing::info!(
        ?addr,
        "Starting stowage instance with {} metadata and {} auth",
        std::any::type_name::<SelectedMetadataStore>(),
        std::any::type_name::<SelectedAuthProvider>()
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    Ok(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Stowage server exited with error")?;

        tracing::info!("Completed graceful shutdown");

        Ok(())
    })
}

// Based on: https://github.com/tokio-rs/axum/blob/main/examples/graceful-shutdown/src/main.rs
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal;

        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    terminate.await;

    tracing::info!("SIGTERM received, beginning graceful shutdown");
}
