fn main() -> anyhow::Result<()> {
    smartserve::cli::run_cli()
}
