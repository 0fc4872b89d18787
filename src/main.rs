fn main() -> anyhow::Result<()> {
    cribwatch_lib::run()
}
