mod host;
mod invoker;
mod registry;
mod sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
