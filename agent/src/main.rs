//! Shim binary that calls into the `linkshift_agent` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    linkshift_agent::inner_main(linkshift_agent::cli::Cli::parse()).await
}
