use clap::Parser;

use networth::api::{Cli, run_cli};

#[tokio::main]
async fn main() {
    networth::init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
