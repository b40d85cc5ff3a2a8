use std::fmt;

use parse_display::Display;

use super::arguments::{Mode, Param};
use super::memory::Memory;
use super::{Machine, MachineError};
use crate::constants::{Word, MAX_PARAMS};

/// Operation selector: the two low decimal digits of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Opcode {
    /// Sum two parameters into a target cell
    #[display("add")]
    Add,

    /// Multiply two parameters into a target cell
    #[display("mul")]
    Mul,

    /// Pop one value from the input queue into a target cell; blocks the
    /// machine when the queue is empty
    #[display("in")]
    Read,

    /// Push one parameter onto the output queue and pause
    #[display("out")]
    Write,

    /// Jump to the second parameter when the first is non-zero
    #[display("jnz")]
    JumpIfTrue,

    /// Jump to the second parameter when the first is zero
    #[display("jz")]
    JumpIfFalse,

    /// Store 1 in the target cell when the first parameter is strictly less
    /// than the second, 0 otherwise
    #[display("lt")]
    LessThan,

    /// Store 1 in the target cell when both parameters are equal, 0
    /// otherwise
    #[display("eq")]
    Equals,

    /// Adjust the relative base by one parameter
    #[display("arb")]
    AdjustBase,

    /// Stop the machine for good
    #[display("halt")]
    Halt,
}

impl Opcode {
    fn from_word(word: Word) -> Option<Self> {
        match word % 100 {
            1 => Some(Self::Add),
            2 => Some(Self::Mul),
            3 => Some(Self::Read),
            4 => Some(Self::Write),
            5 => Some(Self::JumpIfTrue),
            6 => Some(Self::JumpIfFalse),
            7 => Some(Self::LessThan),
            8 => Some(Self::Equals),
            9 => Some(Self::AdjustBase),
            99 => Some(Self::Halt),
            _ => None,
        }
    }

    /// Number of parameters the opcode carries
    pub(crate) const fn arity(self) -> usize {
        match self {
            Self::Add | Self::Mul | Self::LessThan | Self::Equals => 3,
            Self::JumpIfTrue | Self::JumpIfFalse => 2,
            Self::Read | Self::Write | Self::AdjustBase => 1,
            Self::Halt => 0,
        }
    }

    /// Cells occupied by the instruction: the opcode plus its parameters.
    /// Taken jumps ignore this and set `ip` directly.
    const fn width(self) -> Word {
        match self {
            Self::Add | Self::Mul | Self::LessThan | Self::Equals => 4,
            Self::JumpIfTrue | Self::JumpIfFalse => 3,
            Self::Read | Self::Write | Self::AdjustBase => 2,
            Self::Halt => 1,
        }
    }
}

/// A decoded instruction: ephemeral, derived from the cell at `ip` and
/// discarded after the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    params: [Param; MAX_PARAMS],
}

impl Instruction {
    /// Decode the instruction starting at `ip`.
    ///
    /// The opcode is `word % 100`; the i-th parameter's mode is the decimal
    /// digit at `10^(2+i)`, read least-significant-first.
    pub(crate) fn decode(word: Word, memory: &Memory, ip: Word) -> Result<Self, MachineError> {
        let opcode = Opcode::from_word(word).ok_or(MachineError::UnknownOpcode(word))?;

        let mut params = [Param::default(); MAX_PARAMS];
        let mut digits = word / 100;
        let mut address = ip;
        for param in params.iter_mut().take(opcode.arity()) {
            address += 1;
            let mode =
                Mode::from_digit(digits % 10).ok_or(MachineError::UnknownOpcode(word))?;
            *param = Param::new(memory.read(address)?, mode);
            digits /= 10;
        }

        Ok(Self { opcode, params })
    }

    /// The operation this instruction performs
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The decoded parameters, in instruction order
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params[..self.opcode.arity()]
    }

    /// Execute the instruction, mutating the machine per its semantics
    pub(crate) fn execute(&self, machine: &mut Machine) -> Result<(), MachineError> {
        let [a, b, c] = self.params;
        let width = self.opcode.width();

        match self.opcode {
            Opcode::Add => {
                let sum = machine.value(a)? + machine.value(b)?;
                machine.store(c, sum)?;
                machine.advance(width);
            }

            Opcode::Mul => {
                let product = machine.value(a)? * machine.value(b)?;
                machine.store(c, product)?;
                machine.advance(width);
            }

            Opcode::Read => match machine.pop_input() {
                Some(value) => {
                    machine.store(a, value)?;
                    machine.advance(width);
                }
                // Leave `ip` on the read so re-entry re-attempts it
                None => machine.block_on_read(),
            },

            Opcode::Write => {
                let value = machine.value(a)?;
                machine.advance(width);
                machine.emit(value);
            }

            Opcode::JumpIfTrue => {
                if machine.value(a)? == 0 {
                    machine.advance(width);
                } else {
                    machine.jump(machine.value(b)?);
                }
            }

            Opcode::JumpIfFalse => {
                if machine.value(a)? == 0 {
                    machine.jump(machine.value(b)?);
                } else {
                    machine.advance(width);
                }
            }

            Opcode::LessThan => {
                let flag = Word::from(machine.value(a)? < machine.value(b)?);
                machine.store(c, flag)?;
                machine.advance(width);
            }

            Opcode::Equals => {
                let flag = Word::from(machine.value(a)? == machine.value(b)?);
                machine.store(c, flag)?;
                machine.advance(width);
            }

            Opcode::AdjustBase => {
                let delta = machine.value(a)?;
                machine.adjust_base(delta);
                machine.advance(width);
            }

            Opcode::Halt => machine.halt(),
        }

        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, param) in self.params().iter().enumerate() {
            if i == 0 {
                write!(f, " {param}")?;
            } else {
                write!(f, ", {param}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decode_modes() {
        let memory = Memory::load(&[1002, 4, 3, 4, 33]);
        let instruction = Instruction::decode(1002, &memory, 0).unwrap();
        assert_eq!(instruction.opcode(), Opcode::Mul);
        assert_eq!(
            instruction
                .params()
                .iter()
                .map(|p| p.mode())
                .collect::<Vec<_>>(),
            vec![Mode::Position, Mode::Immediate, Mode::Position]
        );
        assert_eq!(
            instruction
                .params()
                .iter()
                .map(|p| p.raw())
                .collect::<Vec<_>>(),
            vec![4, 3, 4]
        );
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        let memory = Memory::load(&[98, 0, 0]);
        assert!(matches!(
            Instruction::decode(98, &memory, 0),
            Err(MachineError::UnknownOpcode(98))
        ));
        assert!(matches!(
            Instruction::decode(0, &memory, 0),
            Err(MachineError::UnknownOpcode(0))
        ));
        assert!(matches!(
            Instruction::decode(-1, &memory, 0),
            Err(MachineError::UnknownOpcode(-1))
        ));
    }

    #[test]
    fn decode_rejects_unknown_mode_digit() {
        let memory = Memory::load(&[302, 0, 0]);
        assert!(matches!(
            Instruction::decode(302, &memory, 0),
            Err(MachineError::UnknownOpcode(302))
        ));
    }

    #[test]
    fn halt_has_no_params() {
        let memory = Memory::load(&[99]);
        let instruction = Instruction::decode(99, &memory, 0).unwrap();
        assert_eq!(instruction.opcode(), Opcode::Halt);
        assert!(instruction.params().is_empty());
    }

    #[test]
    fn display() {
        let memory = Memory::load(&[1002, 4, 3, 4, 33]);
        let instruction = Instruction::decode(1002, &memory, 0).unwrap();
        insta::assert_snapshot!(instruction, @"mul 4, #3, 4");

        let memory = Memory::load(&[204, -1, 99]);
        let instruction = Instruction::decode(204, &memory, 0).unwrap();
        insta::assert_snapshot!(instruction, @"out @-1");
    }
}
