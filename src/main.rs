fn main() -> anyhow::Result<()> {
    notebeam::cli::run()
}
