//! Line grammar for the operator REPL.
//!
//! ```text
//! relay on|off [now]
//! burst duty=<n> | burst off
//! stats [reset]
//! status
//! help [command]
//! ```
//!
//! Keywords are case insensitive. The command word is dispatched through the
//! [`catalog`](super::catalog) so the parser, executor, and `help` output
//! agree on the command set.

use core::fmt;

use winnow::ascii::{Caseless, digit1, multispace0, multispace1};
use winnow::combinator::{alt, eof, fail, not, opt, preceded, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::catalog::{self, CommandTag};
use crate::RelayState;

type PResult<O> = Result<O, ContextError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Relay(RelayArgs),
    Burst(BurstCommand),
    Stats(StatsCommand),
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayArgs {
    pub state: RelayState,
    /// Skip zero-cross synchronisation.
    pub immediate: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurstCommand {
    Duty(u8),
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsCommand {
    Show,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unexpected {
        /// Byte offset into the line.
        offset: usize,
        expected: &'static str,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::Unexpected { offset, expected } => {
                write!(f, "expected {expected} at column {}", offset + 1)
            }
        }
    }
}

/// Parses one REPL line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError> {
    let mut input = line.trim_start();
    if input.trim_end().is_empty() {
        return Err(ParseError::Empty);
    }

    let name = word
        .parse_next(&mut input)
        .map_err(|_| unexpected(line, input, "command"))?;
    let Some(spec) = catalog::find(name) else {
        return Err(unexpected(line, line.trim_start(), "command"));
    };

    let arguments = input.trim_start();
    let command = match spec.tag {
        CommandTag::Relay => relay_args.map(Command::Relay).parse_next(&mut input),
        CommandTag::Burst => burst_args.map(Command::Burst).parse_next(&mut input),
        CommandTag::Stats => stats_args.map(Command::Stats).parse_next(&mut input),
        CommandTag::Status => Ok(Command::Status),
        CommandTag::Help => help_args.map(Command::Help).parse_next(&mut input),
    }
    .map_err(|_| unexpected(line, arguments, spec.usage))?;

    input = input.trim_start();
    eof.parse_next(&mut input)
        .map_err(|_: ContextError| unexpected(line, input, "end of line"))?;
    Ok(command)
}

fn unexpected(line: &str, rest: &str, expected: &'static str) -> ParseError {
    ParseError::Unexpected {
        offset: line.len() - rest.len(),
        expected,
    }
}

fn relay_args(input: &mut &str) -> PResult<RelayArgs> {
    let state = preceded(
        ws1,
        alt((
            keyword("on").value(RelayState::On),
            keyword("off").value(RelayState::Off),
        )),
    )
    .parse_next(input)?;
    let immediate = opt(preceded(ws1, keyword("now")))
        .parse_next(input)?
        .is_some();
    Ok(RelayArgs { state, immediate })
}

fn burst_args(input: &mut &str) -> PResult<BurstCommand> {
    preceded(ws1, alt((keyword("off").value(BurstCommand::Off), duty))).parse_next(input)
}

fn duty(input: &mut &str) -> PResult<BurstCommand> {
    let (_, _, _, _, digits) = (keyword("duty"), ws0, "=", ws0, digit1).parse_next(input)?;

    match digits.parse::<u8>() {
        Ok(value) => Ok(BurstCommand::Duty(value)),
        Err(_) => fail.parse_next(input),
    }
}

fn stats_args(input: &mut &str) -> PResult<StatsCommand> {
    let reset = opt(preceded(ws1, keyword("reset"))).parse_next(input)?;
    Ok(if reset.is_some() {
        StatsCommand::Reset
    } else {
        StatsCommand::Show
    })
}

fn help_args<'a>(input: &mut &'a str) -> PResult<HelpCommand<'a>> {
    let topic = opt(preceded(ws1, word)).parse_next(input)?;
    Ok(HelpCommand { topic })
}

/// Case-insensitive keyword that must not run into further word characters.
fn keyword<'a>(literal: &'static str) -> impl Parser<&'a str, &'a str, ContextError> {
    terminated(Caseless(literal), not(word_char))
}

fn word<'a>(input: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., is_word_char).parse_next(input)
}

fn word_char(input: &mut &str) -> PResult<char> {
    one_of(is_word_char).parse_next(input)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn ws0(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

fn ws1(input: &mut &str) -> PResult<()> {
    multispace1.void().parse_next(input)
}
