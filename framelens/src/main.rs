fn main() -> anyhow::Result<()> {
    framelens::run()
}
