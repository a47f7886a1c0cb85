#[tokio::main]
async fn main() {
    bookstore::start_server().await;
}
