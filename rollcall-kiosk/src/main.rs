use clap::Parser;
use rollcall_kiosk::{Cli, run};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), rollcall_kiosk::AppError> {
    run(Cli::parse()).await
}
