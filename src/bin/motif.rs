//! Binary entry point for the Motif operator CLI.

#[tokio::main]
async fn main() {
    let code = motif::cli::run().await;
    std::process::exit(code);
}
