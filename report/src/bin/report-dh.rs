fn main() -> eyre::Result<()> {
    report::App::new().run()
}
