use std::fs;
use std::io::{self, Write as _};

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueHint};
use intcode_machine::constants::Word;
use intcode_machine::runtime::RunState;
use intcode_machine::{parse, Machine};
use tracing::{debug, info};

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Program file
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    program: Utf8PathBuf,

    /// Queue a value on the input channel before the program starts. Can be
    /// used multiple times.
    #[clap(short, long = "input")]
    inputs: Vec<Word>,

    /// Drive the program as an ASCII console on stdin/stdout
    #[clap(short, long, action = ArgAction::SetTrue)]
    ascii: bool,
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.program, "Reading program");
        let text = fs::read_to_string(&self.program)?;

        debug!("Parsing program");
        let program = parse(&text)?;

        let mut machine = Machine::new(&program);
        for &value in &self.inputs {
            machine.send_input(value)?;
        }

        if self.ascii {
            run_console(&mut machine)?;
        } else {
            info!("Running program");
            for value in machine.run_to_completion()? {
                println!("{value}");
            }
        }

        info!(state = %machine.state(), "End of program");
        Ok(())
    }
}

/// Drive an ASCII-protocol program interactively: outputs in the ASCII
/// range print as characters, anything else as a decimal on its own line;
/// a blocked read is serviced with one line from stdin.
fn run_console(machine: &mut Machine) -> anyhow::Result<()> {
    loop {
        let state = machine.resume()?;
        flush_outputs(machine)?;
        match state {
            RunState::Halted => return Ok(()),
            RunState::ReadBlocked => {
                let mut line = String::new();
                if io::stdin().read_line(&mut line)? == 0 {
                    anyhow::bail!("program wants input but stdin is closed");
                }
                if !line.is_ascii() {
                    anyhow::bail!("program input must be ASCII");
                }
                for byte in line.bytes() {
                    machine.send_input(Word::from(byte))?;
                }
            }
            RunState::WriteReady | RunState::Running => {}
        }
    }
}

fn flush_outputs(machine: &mut Machine) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for value in machine.take_outputs() {
        match u8::try_from(value) {
            Ok(byte) if value < 128 => stdout.write_all(&[byte])?,
            _ => writeln!(stdout, "{value}")?,
        }
    }
    stdout.flush()?;
    Ok(())
}
