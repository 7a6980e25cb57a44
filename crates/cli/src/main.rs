use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    pagepilot_cli::run().await
}
