mod cli;

use crate::cli::app::{App, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    App::from_args().run().await
}
