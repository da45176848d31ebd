#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fieldhub_lib::run().await
}
