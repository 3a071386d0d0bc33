#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vidcraft_billing::server::run().await
}
