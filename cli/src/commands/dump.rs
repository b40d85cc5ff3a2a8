use std::fs;

use camino::Utf8PathBuf;
use clap::{Parser, ValueHint};
use intcode_machine::parse;

#[derive(Parser, Debug)]
pub struct DumpOpt {
    /// Program file
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    program: Utf8PathBuf,
}

impl DumpOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.program)?;
        let program = parse(&text)?;
        for (address, value) in program.cells().iter().enumerate() {
            println!("{address:>6}: {value}");
        }
        Ok(())
    }
}
