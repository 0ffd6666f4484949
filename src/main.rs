#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shift_desk::run().await
}
