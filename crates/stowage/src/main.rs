use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = stowage::cli::StowageArgs::parse();

    stowage::start_listening(args).await?.await
}
