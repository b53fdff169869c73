fn main() -> anyhow::Result<()> {
    vizcheck_lib::run()
}
