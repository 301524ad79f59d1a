use std::marker::PhantomData;

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use super::{CnfGrammar, CnfProd};
use crate::RIdx;

/// `Usefulness` records which rules of a grammar can take part in the derivation of a sentence.
/// For example, given this grammar:
/// ```text
///   S: A B | 'a';
///   A: 'a' A;
///   B: 'b';
///   C: 'c';
/// ```
/// then `A` is not generating (every derivation from `A` is infinite), `C` is not reachable, and
/// `B` is generating but not reachable (the only production mentioning `B` also mentions `A`).
///
/// Reachability is computed only through productions whose rules are all generating, so a rule
/// is useful if and only if it is both generating and reachable. The start rule is always
/// reachable.
#[derive(Debug)]
pub struct Usefulness<StorageT> {
    generating: Vob,
    reachable: Vob,
    phantom: PhantomData<StorageT>,
}

impl<StorageT: 'static + PrimInt + Unsigned> Usefulness<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn new(grm: &CnfGrammar<StorageT>) -> Self {
        let rules_len = usize::from(grm.rules_len());
        let mut generating = Vob::from_elem(false, rules_len);
        // Loop until we reach a fixed point: a rule is generating if any of its productions is a
        // token or consists of two generating rules.
        loop {
            let mut changed = false;
            for pidx in grm.iter_pidxs() {
                let ridx = usize::from(grm.prod_to_rule(pidx));
                if generating[ridx] {
                    continue;
                }
                let generates = match grm.prod(pidx) {
                    CnfProd::Term(_) => true,
                    CnfProd::Binary(b, c) => {
                        generating[usize::from(b)] && generating[usize::from(c)]
                    }
                };
                if generates {
                    generating.set(ridx, true);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut reachable = Vob::from_elem(false, rules_len);
        let mut todo = vec![grm.start_rule_idx()];
        reachable.set(usize::from(grm.start_rule_idx()), true);
        while let Some(ridx) = todo.pop() {
            for &pidx in grm.rule_to_prods(ridx) {
                if let CnfProd::Binary(b, c) = grm.prod(pidx) {
                    if !(generating[usize::from(b)] && generating[usize::from(c)]) {
                        continue;
                    }
                    for x in [b, c] {
                        if !reachable[usize::from(x)] {
                            reachable.set(usize::from(x), true);
                            todo.push(x);
                        }
                    }
                }
            }
        }

        Usefulness {
            generating,
            reachable,
            phantom: PhantomData,
        }
    }

    /// Does rule `ridx` derive at least one token string? Panics if `ridx` doesn't exist.
    pub fn is_generating(&self, ridx: RIdx<StorageT>) -> bool {
        self.generating[usize::from(ridx)]
    }

    /// Is rule `ridx` reachable from the start rule? Panics if `ridx` doesn't exist.
    pub fn is_reachable(&self, ridx: RIdx<StorageT>) -> bool {
        self.reachable[usize::from(ridx)]
    }

    pub fn is_useful(&self, ridx: RIdx<StorageT>) -> bool {
        self.is_generating(ridx) && self.is_reachable(ridx)
    }

    /// Is every rule useful?
    pub fn all_useful(&self) -> bool {
        self.generating.iter().zip(self.reachable.iter()).all(|(g, r)| g && r)
    }
}
