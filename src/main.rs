#[tokio::main]
async fn main() {
    if let Err(e) = traindesk::run().await {
        eprintln!("traindesk failed: {}", e);
        std::process::exit(1);
    }
}
