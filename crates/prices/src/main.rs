#[tokio::main]
async fn main() {
    prices::start(std::env::args()).await;
}
