//! Parse Intcode program text.
//!
//! A program is a single line (or stream) of comma-separated base-10 signed
//! integers, optionally surrounded by whitespace, e.g. `1002,4,3,4,33`.

use std::fmt;
use std::str::FromStr;

use nom::{
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map_res, opt, recognize},
    multi::separated_list1,
    sequence::{delimited, pair},
    Finish, IResult,
};
use thiserror::Error;

use crate::constants::Word;

/// How much of the offending input a parse error carries
const SNIPPET_LEN: usize = 24;

/// Failure to parse program text, reported at the first non-integer token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed program text near {snippet:?}")]
pub struct ParseError {
    snippet: String,
}

impl ParseError {
    fn new(input: &str) -> Self {
        Self {
            snippet: input.chars().take(SNIPPET_LEN).collect(),
        }
    }
}

/// An immutable parsed program: the seed image copied into every
/// [`Machine`][crate::Machine] built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    cells: Vec<Word>,
}

impl Program {
    /// The program image, in memory order
    #[must_use]
    pub fn cells(&self) -> &[Word] {
        &self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cells = self.cells.iter();
        if let Some(first) = cells.next() {
            write!(f, "{first}")?;
        }
        for cell in cells {
            write!(f, ",{cell}")?;
        }
        Ok(())
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse a signed decimal number
fn number(input: &str) -> IResult<&str, Word> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(input)
}

/// Parse a comma-separated list of numbers, each optionally surrounded by
/// whitespace
fn cell_list(input: &str) -> IResult<&str, Vec<Word>> {
    separated_list1(char(','), delimited(multispace0, number, multispace0))(input)
}

/// Parse program text into a [`Program`].
///
/// # Errors
///
/// Fails on empty input or any non-integer token.
pub fn parse(text: &str) -> Result<Program, ParseError> {
    let (_, cells) = all_consuming(cell_list)(text.trim())
        .finish()
        .map_err(|e| ParseError::new(e.input))?;
    Ok(Program { cells })
}
