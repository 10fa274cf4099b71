#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examgate::run_sweeper().await {
        eprintln!("examgate-sweeper fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
