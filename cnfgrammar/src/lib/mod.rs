#![allow(clippy::cognitive_complexity)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![forbid(unsafe_code)]

//! A library for context-free grammars in *binary normal form*: every production is either a
//! single token or exactly two rules. This is the form that CYK-style algorithms (and the
//! Bar-Hillel intersection construction) want to consume, and it is the only form this library
//! hands out.
//!
//! Grammars are written in a small subset of Yacc and normalised on the way in. We use the
//! following terminology throughout:
//!
//!   * A *grammar* is an ordered sequence of *productions*.
//!   * A *production* is an ordered sequence of *symbols*.
//!   * A *rule* maps a name to one or more productions (rules are the grammar's nonterminals).
//!   * A *token* is the name of a syntactic element (the grammar's terminals).
//!
//! For example, in the following grammar:
//!
//! ```text
//!   %start S
//!   %%
//!   S: 'a' S 'b' | 'a' 'b';
//! ```
//!
//! the user wrote one rule and two productions, neither of which is in binary normal form.
//! After normalisation `S` has the productions `S: T~a S~1` and `S: T~a T~b`, with the fresh
//! rules `S~1: S T~b`, `T~a: 'a'` and `T~b: 'b'`. Fresh names are guaranteed not to clash with
//! each other or with user names.
//!
//! cnfgrammar makes the following guarantees about grammars:
//!
//!   * Productions are numbered from `0` to `prods_len() - 1` (inclusive).
//!   * Rules are numbered from `0` to `rules_len() - 1` (inclusive).
//!   * Tokens are numbered from `0` to `tokens_len() - 1` (inclusive).
//!   * Every rule other than the start rule generates at least one token string and is reachable
//!     from the start rule. The start rule may have no productions at all, in which case the
//!     grammar's language is empty.
//!   * The StorageT type used to store productions, rules, and token indices can be infallibly
//!     converted into usize (see [`TIdx`] and friends for more details).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod cnf;
mod idxnewtype;
pub mod span;

pub use span::Span;

/// A type specifically for rule indices.
pub use crate::idxnewtype::{PIdx, RIdx, TIdx};
pub use crate::cnf::{
    CnfGrammar, CnfGrammarError, CnfGrammarErrorKind, CnfProd, useful::Usefulness,
};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Symbol<StorageT> {
    Rule(RIdx<StorageT>),
    Token(TIdx<StorageT>),
}
