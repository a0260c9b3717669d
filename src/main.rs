//! FundWatch - Batch risk-signal pipeline for mutual funds

use anyhow::Result;

use fundwatch::adapters::cli;

fn main() -> Result<()> {
    // Load .env file if it exists (directory overrides go here)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app)
}
