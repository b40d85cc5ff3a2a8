//! The machine: memory, registers, I/O queues and the cooperative
//! fetch/decode/execute loop.

use std::collections::VecDeque;
use std::fmt;

use parse_display::Display;
use thiserror::Error;
use tracing::{debug, trace};

use crate::constants::Word;
use crate::parser::Program;

mod arguments;
mod instructions;
mod memory;
mod trace;

pub use self::arguments::{Mode, Param};
pub use self::instructions::{Instruction, Opcode};
pub use self::memory::{Memory, MemoryError};
pub use self::trace::{InstructionLog, LogEntry, Tracer};

/// Errors aborting execution of a machine.
///
/// All of them are fatal: they indicate a defect in the program or in the
/// host driving it, not a recoverable runtime condition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MachineError {
    /// The decoded instruction word has no handler
    #[error("unknown opcode {0}")]
    UnknownOpcode(Word),

    /// An instruction used an immediate parameter as its write destination
    #[error("immediate parameter {0} used as a write target")]
    ImmediateWriteTarget(Word),

    /// The host resumed or fed a machine in the wrong state
    #[error("illegal resume: machine is {0}")]
    IllegalResume(RunState),

    /// A resolved address was out of range
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Run state of a machine.
///
/// Exactly one holds at any instant; [`Halted`][RunState::Halted] is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunState {
    /// Executing instructions (or ready to, for a machine not yet started)
    #[display("running")]
    Running,

    /// A read executed with an empty input queue; parked until the host
    /// sends input
    #[display("read-blocked")]
    ReadBlocked,

    /// An output was just emitted; the host may drain it before resuming
    #[display("write-ready")]
    WriteReady,

    /// The halt opcode executed; the machine never runs again
    #[display("halted")]
    Halted,
}

/// A single Intcode machine: exclusive memory, instruction pointer,
/// relative base, run state and its two I/O queues.
///
/// Many machines can be built from one [`Program`]; each gets a fresh copy
/// of the image and shares nothing with its siblings. The host drives a
/// machine through [`resume`][Machine::resume],
/// [`send_input`][Machine::send_input] and
/// [`take_outputs`][Machine::take_outputs]; `resume` returns control as
/// soon as the machine halts, needs input or has produced output, which is
/// what lets a host round-robin any number of machines without threads.
pub struct Machine {
    memory: Memory,
    ip: Word,
    rb: Word,
    state: RunState,
    input: VecDeque<Word>,
    output: VecDeque<Word>,
    tracer: Option<Box<dyn Tracer>>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Machine {{ ip: {}, rb: {}, state: {:?}, inputs: {}, outputs: {}, memory: [...] }}",
            self.ip,
            self.rb,
            self.state,
            self.input.len(),
            self.output.len()
        )
    }
}

impl Machine {
    /// Create a machine over a fresh copy of `program`
    #[must_use]
    pub fn new(program: &Program) -> Self {
        Self {
            memory: Memory::load(program.cells()),
            ip: 0,
            rb: 0,
            state: RunState::Running,
            input: VecDeque::new(),
            output: VecDeque::new(),
            tracer: None,
        }
    }

    /// Create a machine with an observer attached.
    ///
    /// The tracer is invoked at the pre-decode and post-execute points of
    /// every step; see [`Tracer`].
    #[must_use]
    pub fn with_tracer(program: &Program, tracer: Box<dyn Tracer>) -> Self {
        Self {
            tracer: Some(tracer),
            ..Self::new(program)
        }
    }

    /// The current run state
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self.state, RunState::Halted)
    }

    #[must_use]
    pub const fn is_read_blocked(&self) -> bool {
        matches!(self.state, RunState::ReadBlocked)
    }

    #[must_use]
    pub const fn is_write_ready(&self) -> bool {
        matches!(self.state, RunState::WriteReady)
    }

    /// Execute instructions until the machine stops running; returns the
    /// state it stopped in, one of `Halted`, `ReadBlocked` or `WriteReady`.
    ///
    /// Legal while `Running` (including a machine not yet started) and
    /// while `WriteReady`, which it clears.
    ///
    /// # Errors
    ///
    /// [`MachineError::IllegalResume`] when called on a halted or
    /// read-blocked machine; any execution error aborts the machine.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn resume(&mut self) -> Result<RunState, MachineError> {
        match self.state {
            RunState::Running => {}
            RunState::WriteReady => self.state = RunState::Running,
            state @ (RunState::ReadBlocked | RunState::Halted) => {
                return Err(MachineError::IllegalResume(state));
            }
        }

        while matches!(self.state, RunState::Running) {
            self.step()?;
        }
        Ok(self.state)
    }

    /// Queue a value on the input channel.
    ///
    /// Legal while `Running`, where the value waits for the next read, and
    /// while `ReadBlocked`, where it completes the pending read and leaves
    /// the machine resumable.
    ///
    /// # Errors
    ///
    /// [`MachineError::IllegalResume`] when the machine is write-ready or
    /// halted.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn send_input(&mut self, value: Word) -> Result<(), MachineError> {
        match self.state {
            RunState::Running => {
                self.input.push_back(value);
                Ok(())
            }
            RunState::ReadBlocked => {
                self.input.push_back(value);
                self.state = RunState::Running;
                // `ip` still points at the read that blocked
                self.step()
            }
            state @ (RunState::WriteReady | RunState::Halted) => {
                Err(MachineError::IllegalResume(state))
            }
        }
    }

    /// Drain the output channel, preserving emission order
    pub fn take_outputs(&mut self) -> Vec<Word> {
        self.output.drain(..).collect()
    }

    /// Loop [`resume`][Self::resume], ignoring the write-ready pauses,
    /// until the machine halts; returns everything it output.
    ///
    /// For programs pre-seeded with all the input they need.
    ///
    /// # Errors
    ///
    /// [`MachineError::IllegalResume`] if the program asks for input that
    /// was never queued; any execution error aborts the machine.
    pub fn run_to_completion(&mut self) -> Result<Vec<Word>, MachineError> {
        while !self.is_halted() {
            self.resume()?;
        }
        Ok(self.take_outputs())
    }

    /// Read a memory cell directly
    ///
    /// # Errors
    ///
    /// Fails on a negative address.
    pub fn peek(&self, address: Word) -> Result<Word, MachineError> {
        Ok(self.memory.read(address)?)
    }

    /// Overwrite a memory cell directly
    ///
    /// # Errors
    ///
    /// Fails on a negative address.
    pub fn poke(&mut self, address: Word, value: Word) -> Result<(), MachineError> {
        Ok(self.memory.write(address, value)?)
    }

    /// Fetch, decode and execute the instruction at `ip`
    fn step(&mut self) -> Result<(), MachineError> {
        let ip = self.ip;
        let word = self.memory.read(ip)?;

        // Parked aside so the instruction can borrow the machine mutably
        let mut tracer = self.tracer.take();
        if let Some(t) = tracer.as_mut() {
            t.pre_decode(ip, word);
        }

        let result = Instruction::decode(word, &self.memory, ip).and_then(|instruction| {
            trace!(ip, %instruction, "executing");
            instruction.execute(self).map(|()| instruction)
        });
        if let (Some(t), Ok(instruction)) = (tracer.as_mut(), &result) {
            t.post_execute(ip, instruction, self.state);
        }
        self.tracer = tracer;

        result.map(|_| ())
    }

    pub(crate) fn value(&self, param: Param) -> Result<Word, MemoryError> {
        param.read(&self.memory, self.rb)
    }

    pub(crate) fn store(&mut self, param: Param, value: Word) -> Result<(), MachineError> {
        let address = param.target(self.rb)?;
        self.memory.write(address, value)?;
        Ok(())
    }

    pub(crate) fn advance(&mut self, width: Word) {
        self.ip += width;
    }

    pub(crate) fn jump(&mut self, target: Word) {
        debug!(target, "jump");
        self.ip = target;
    }

    pub(crate) fn adjust_base(&mut self, delta: Word) {
        self.rb += delta;
    }

    pub(crate) fn pop_input(&mut self) -> Option<Word> {
        self.input.pop_front()
    }

    pub(crate) fn block_on_read(&mut self) {
        debug!(ip = self.ip, "input queue empty, blocking");
        self.state = RunState::ReadBlocked;
    }

    pub(crate) fn emit(&mut self, value: Word) {
        debug!(value, "output emitted, pausing");
        self.output.push_back(value);
        self.state = RunState::WriteReady;
    }

    pub(crate) fn halt(&mut self) {
        debug!(ip = self.ip, "halt");
        self.state = RunState::Halted;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse;

    fn machine(text: &str) -> Machine {
        Machine::new(&parse(text).unwrap())
    }

    #[test]
    fn add_mul_program() {
        let mut m = machine("1,9,10,3,2,3,11,0,99,30,40,50");
        let outputs = m.run_to_completion().unwrap();
        assert!(outputs.is_empty());
        assert_eq!(m.peek(0), Ok(3500));
        assert_eq!(m.peek(3), Ok(70));
        assert!(m.is_halted());
    }

    #[test]
    fn echo_blocks_then_completes() {
        let mut m = machine("3,0,4,0,99");
        assert_eq!(m.state(), RunState::Running);
        assert_eq!(m.resume(), Ok(RunState::ReadBlocked));
        assert!(m.is_read_blocked());

        m.send_input(1234).unwrap();
        assert_eq!(m.state(), RunState::Running);
        assert_eq!(m.resume(), Ok(RunState::WriteReady));
        assert!(m.is_write_ready());
        assert_eq!(m.take_outputs(), vec![1234]);
        assert_eq!(m.resume(), Ok(RunState::Halted));
        assert!(m.is_halted());
    }

    #[test]
    fn pre_seeded_input_never_blocks() {
        let mut m = machine("3,0,4,0,99");
        m.send_input(-7).unwrap();
        assert_eq!(m.run_to_completion(), Ok(vec![-7]));
    }

    #[test]
    fn write_pauses_each_output() {
        let mut m = machine("104,1,104,2,104,3,99");
        assert_eq!(m.resume(), Ok(RunState::WriteReady));
        assert_eq!(m.take_outputs(), vec![1]);
        assert_eq!(m.resume(), Ok(RunState::WriteReady));
        assert_eq!(m.resume(), Ok(RunState::WriteReady));
        assert_eq!(m.take_outputs(), vec![2, 3]);
        assert_eq!(m.resume(), Ok(RunState::Halted));
    }

    #[test]
    fn resume_in_wrong_state_is_fatal() {
        let mut m = machine("99");
        assert_eq!(m.resume(), Ok(RunState::Halted));
        assert_eq!(
            m.resume(),
            Err(MachineError::IllegalResume(RunState::Halted))
        );
        assert_eq!(
            m.send_input(1),
            Err(MachineError::IllegalResume(RunState::Halted))
        );

        let mut m = machine("3,0,99");
        assert_eq!(m.resume(), Ok(RunState::ReadBlocked));
        assert_eq!(
            m.resume(),
            Err(MachineError::IllegalResume(RunState::ReadBlocked))
        );
    }

    #[test]
    fn send_input_while_write_ready_is_fatal() {
        let mut m = machine("104,5,3,0,99");
        assert_eq!(m.resume(), Ok(RunState::WriteReady));
        assert_eq!(
            m.send_input(1),
            Err(MachineError::IllegalResume(RunState::WriteReady))
        );
    }

    #[test]
    fn comparison_programs() {
        // position mode: is the input equal to 8?
        for (input, expected) in [(7, 0), (8, 1), (9, 0)] {
            let mut m = machine("3,9,8,9,10,9,4,9,99,-1,8");
            m.send_input(input).unwrap();
            assert_eq!(m.run_to_completion(), Ok(vec![expected]));
        }
        // immediate mode: is the input less than 8?
        for (input, expected) in [(7, 1), (8, 0)] {
            let mut m = machine("3,3,1107,-1,8,3,4,3,99");
            m.send_input(input).unwrap();
            assert_eq!(m.run_to_completion(), Ok(vec![expected]));
        }
    }

    #[test]
    fn jump_programs() {
        // outputs 0 when the input is 0, 1 otherwise
        for (input, expected) in [(0, 0), (42, 1)] {
            let mut m = machine("3,12,6,12,15,1,13,14,13,4,13,99,-1,0,1,9");
            m.send_input(input).unwrap();
            assert_eq!(m.run_to_completion(), Ok(vec![expected]));
        }
    }

    #[test]
    fn relative_base_addressing() {
        let mut m = machine("109,5,204,-3,99");
        assert_eq!(m.run_to_completion(), Ok(vec![204]));
    }

    #[test]
    fn relative_writes_round_trip() {
        let mut m = machine("109,10,21101,3,4,0,4,10,99");
        assert_eq!(m.run_to_completion(), Ok(vec![7]));
        assert_eq!(m.peek(10), Ok(7));
    }

    #[test]
    fn immediate_write_target_is_fatal() {
        let mut m = machine("11101,1,1,0,99");
        assert_eq!(m.resume(), Err(MachineError::ImmediateWriteTarget(0)));
    }

    #[test]
    fn negative_address_is_fatal() {
        let mut m = machine("4,-1,99");
        assert_eq!(
            m.resume(),
            Err(MachineError::Memory(MemoryError::NegativeAddress(-1)))
        );
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut m = machine("98,0,0");
        assert_eq!(m.resume(), Err(MachineError::UnknownOpcode(98)));
    }

    #[test]
    fn poke_patches_memory() {
        let mut m = machine("1,0,0,0,99");
        m.poke(1, 4).unwrap();
        m.poke(2, 4).unwrap();
        m.run_to_completion().unwrap();
        assert_eq!(m.peek(0), Ok(198));
    }

    #[test]
    fn tracer_records_instructions() {
        let log = InstructionLog::new();
        let program = parse("1,0,0,0,99").unwrap();
        let mut m = Machine::with_tracer(&program, Box::new(log.clone()));
        m.run_to_completion().unwrap();
        assert_eq!(
            log.entries(),
            vec![
                LogEntry {
                    ip: 0,
                    opcode: Opcode::Add,
                    state: RunState::Running,
                },
                LogEntry {
                    ip: 4,
                    opcode: Opcode::Halt,
                    state: RunState::Halted,
                },
            ]
        );
    }
}
