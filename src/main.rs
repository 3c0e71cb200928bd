#[tokio::main]
async fn main() -> anyhow::Result<()> {
    snowjam_dashboard::run().await
}
