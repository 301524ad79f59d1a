#![allow(clippy::many_single_char_names)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

//! `ledpar` finds the *language edit distance* between a token sequence and a context-free
//! language, and builds the grammatical strings ("repairs") which lie at that distance.
//!
//! The input is a [`CnfGrammar`](cnfgrammar::CnfGrammar) and a sequence of token names. Around
//! the input we build an edit-distance ball: an acyclic automaton ([`Automaton`]) whose language
//! is every string within a given radius of the input ([`LevBall`]). The intersection of the
//! grammar's language with the ball's language is either materialised as a new grammar
//! ([`intersect`]) or, more cheaply, decided by a CYK parse over the automaton's state pairs
//! ([`nonempty`], [`forest`]). Searching radii `0, 1, 2, ...` until the intersection is non-empty
//! yields the language edit distance ([`Repairer::led`]).
//!
//! ```text
//!   let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
//!   let rpr = RepairerBuilder::new(&grm).max_radius(3).build();
//!   assert_eq!(rpr.led(&["a", "a", "b"]), Led::Found(1));
//!   let repairs = rpr.repairs(&["a", "a", "b"]).unwrap();
//!   assert!(repairs.ranked(None).iter().any(|r| r == &["a", "a", "b", "b"]));
//! ```

mod automaton;
mod barhillel;
mod cyk;
mod forest;
mod levball;
mod repairer;
mod state;

pub use crate::{
    automaton::{Automaton, AutomatonError, AutomatonErrorKind, Transition},
    barhillel::{IntersectionError, IntersectionErrorKind, IntersectionGrammar, intersect},
    cyk::{BitChart, bitchart, forest, nonempty, recognise},
    forest::{Forest, NodeIdx, PTree, Sampler, Sentences},
    levball::{LevBall, levenshtein},
    repairer::{Led, Repairer, RepairerBuilder, Repairs, Strategy},
    state::{StIdx, StateLabel, Triple},
};

use std::borrow::Cow;

use cnfgrammar::{CnfGrammar, TIdx};
use num_traits::{AsPrimitive, PrimInt, Unsigned};

/// Return the name of token `tidx`, or `#n` for a token index `n` outside the grammar.
pub(crate) fn token_str<StorageT: 'static + PrimInt + Unsigned>(
    grm: &CnfGrammar<StorageT>,
    tidx: TIdx<StorageT>,
) -> Cow<'_, str>
where
    usize: AsPrimitive<StorageT>,
{
    if tidx < grm.tokens_len() {
        Cow::Borrowed(grm.token_name(tidx))
    } else {
        Cow::Owned(format!("#{}", usize::from(tidx)))
    }
}
