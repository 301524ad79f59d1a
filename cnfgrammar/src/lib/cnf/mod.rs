#![deny(unreachable_pub)]

use std::{error::Error, fmt};

use crate::Span;

pub(crate) mod ast;
pub mod grammar;
mod normal;
pub(crate) mod parser;
pub mod useful;

pub use self::grammar::{CnfGrammar, CnfProd};

/// The various different possible grammar errors. Syntax errors are found by the grammar
/// parser; the remainder are found when validating the parsed grammar.
#[derive(Debug, PartialEq, Eq)]
pub enum CnfGrammarErrorKind {
    IllegalName,
    IllegalString,
    IncompleteRule,
    IncompleteComment,
    MissingColon,
    PrematureEnd,
    ProgramsNotSupported,
    UnknownDeclaration,
    ReachedEOL,
    /// Contains the spans of all duplicate start declarations.
    DuplicateStartDeclaration(Vec<Span>),
    NoStartRule,
    InvalidStartRule(String),
    UnknownRuleRef(String),
    /// Binary normal form has no way of expressing the empty string.
    EmptyProduction,
}

/// Any error from building a grammar returns an instance of this struct.
#[derive(Debug, PartialEq, Eq)]
pub struct CnfGrammarError {
    pub kind: CnfGrammarErrorKind,
    pub span: Span,
}

impl Error for CnfGrammarError {}

impl fmt::Display for CnfGrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for CnfGrammarErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CnfGrammarErrorKind::IllegalName => "Illegal name",
            CnfGrammarErrorKind::IllegalString => "Illegal string",
            CnfGrammarErrorKind::IncompleteRule => "Incomplete rule",
            CnfGrammarErrorKind::IncompleteComment => "Incomplete comment",
            CnfGrammarErrorKind::MissingColon => "Missing ':'",
            CnfGrammarErrorKind::PrematureEnd => "File ends prematurely",
            CnfGrammarErrorKind::ProgramsNotSupported => "Programs not supported",
            CnfGrammarErrorKind::UnknownDeclaration => "Unknown declaration",
            CnfGrammarErrorKind::ReachedEOL => {
                "Reached end of line without finding expected content"
            }
            CnfGrammarErrorKind::DuplicateStartDeclaration(_) => "Duplicated %start declaration",
            CnfGrammarErrorKind::NoStartRule => "No start rule specified",
            CnfGrammarErrorKind::InvalidStartRule(name) => {
                return write!(f, "Start rule '{}' does not appear in grammar", name);
            }
            CnfGrammarErrorKind::UnknownRuleRef(name) => {
                return write!(f, "Unknown reference to rule '{}'", name);
            }
            CnfGrammarErrorKind::EmptyProduction => "Empty productions are not supported",
        };
        write!(f, "{}", s)
    }
}
