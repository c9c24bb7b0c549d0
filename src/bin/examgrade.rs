use anyhow::Result;

fn main() -> Result<()> {
    examgrade::cli::run()
}
