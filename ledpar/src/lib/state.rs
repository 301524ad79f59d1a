use std::fmt;

use cnfgrammar::RIdx;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// StIdx is a wrapper for a 32-bit index into an automaton's states. States are numbered in a
/// topological order, so `p < q` implies that `p` cannot be reached from `q`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StIdx(u32);

impl From<u32> for StIdx {
    fn from(v: u32) -> Self {
        StIdx(v)
    }
}

impl From<usize> for StIdx {
    fn from(v: usize) -> Self {
        if v > u32::MAX as usize {
            panic!("Overflow");
        }
        StIdx(v as u32)
    }
}

impl From<StIdx> for usize {
    fn from(st: StIdx) -> Self {
        st.0 as usize
    }
}

impl From<StIdx> for u32 {
    fn from(st: StIdx) -> Self {
        st.0
    }
}

/// The label of an automaton state. States of edit-distance automata are points on a grid: `i`
/// input tokens have been consumed and `j` edits have been spent getting there. Any other
/// automaton labels its states with opaque integers.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StateLabel {
    Opaque(u32),
    Grid { i: u32, j: u32 },
}

impl StateLabel {
    pub fn grid(i: usize, j: usize) -> Self {
        StateLabel::Grid {
            i: i as u32,
            j: j as u32,
        }
    }

    /// Does `self` dominate `other`, i.e. is `self` componentwise less than or equal to `other`?
    /// Opaque labels are incomparable with everything, including themselves.
    pub fn dominates(&self, other: &StateLabel) -> bool {
        match (*self, *other) {
            (StateLabel::Grid { i: i1, j: j1 }, StateLabel::Grid { i: i2, j: j2 }) => {
                i1 <= i2 && j1 <= j2
            }
            _ => false,
        }
    }

    /// The anti-diagonal `i + j` of a grid label.
    pub fn antidiagonal(&self) -> Option<u32> {
        match *self {
            StateLabel::Grid { i, j } => Some(i + j),
            StateLabel::Opaque(_) => None,
        }
    }

    pub fn is_grid(&self) -> bool {
        matches!(self, StateLabel::Grid { .. })
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StateLabel::Opaque(n) => write!(f, "q_{}", n),
            StateLabel::Grid { i, j } => write!(f, "q_{}/{}", i, j),
        }
    }
}

/// A rule `ridx` localised to the automaton states `p` (where it starts) and `q` (where it ends):
/// the nonterminals of an intersection grammar, and the labels of parse forest nodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triple<StorageT> {
    pub p: StIdx,
    pub ridx: RIdx<StorageT>,
    pub q: StIdx,
}

impl<StorageT> Triple<StorageT> {
    pub fn new(p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> Self {
        Triple { p, ridx, q }
    }
}
