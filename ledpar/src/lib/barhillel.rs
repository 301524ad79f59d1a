use std::{error::Error, fmt, fmt::Debug, hash::Hash};

use cnfgrammar::{CnfGrammar, CnfProd, RIdx, TIdx};
use indexmap::IndexSet;
use log::debug;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use vob::Vob;

use crate::{Automaton, StIdx, StateLabel, Triple, token_str};

#[derive(Debug, PartialEq, Eq)]
pub enum IntersectionErrorKind {
    /// No derivation from the start rule survived pruning: the grammar's language and the
    /// automaton's language are disjoint.
    EmptyIntersection,
}

/// Any error from the Bar-Hillel construction returns an instance of this struct.
#[derive(Debug, PartialEq, Eq)]
pub struct IntersectionError {
    pub kind: IntersectionErrorKind,
    /// How many productions the construction created before pruning.
    pub productions: usize,
}

impl Error for IntersectionError {}

impl fmt::Display for IntersectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self.kind {
            IntersectionErrorKind::EmptyIntersection => "Empty intersection",
        };
        write!(f, "{} ({} productions before pruning)", s, self.productions)
    }
}

/// The grammar produced by intersecting a grammar `G` with an automaton `M`. Its nonterminals are
/// triples `[p, A, q]` (`A` a rule of `G`, `p` and `q` states of `M`) deriving exactly the
/// strings which `A` derives and which lead `M` from `p` to `q`. A synthetic start rule `^` has
/// a unit production `^: [p, S, q]` for every initial `p` and final `q` whose triple survived
/// pruning (its *start alternatives*).
///
/// Nonterminals are referred to by their index in [`nonterminals`](Self::nonterminals). Every
/// nonterminal is useful: it derives at least one string and is reachable from `^`.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntersectionGrammar<StorageT> {
    nonterminals: Vec<Triple<StorageT>>,
    start_alternatives: Vec<usize>,
    /// `(x, y, z)` for every production `x: y z`.
    binary_prods: Vec<(usize, usize, usize)>,
    /// `(x, t)` for every production `x: 't'`.
    term_prods: Vec<(usize, TIdx<StorageT>)>,
    /// The labels of the automaton's states, indexed by `StIdx`.
    labels: Vec<StateLabel>,
}

/// Intersect `grm` with `aut` using the Bar-Hillel construction, and prune the result of every
/// nonterminal which cannot take part in a derivation from the start rule. Returns
/// `EmptyIntersection` if no such derivation exists.
///
/// The construction builds `[p, A, r]: [p, B, q] [q, C, r]` for every production `A: B C` of
/// `grm` and every triple of states `p, q, r` such that `q` lies strictly between `p` and `r`.
/// For automata whose labels form a grid (see [`Automaton::is_grid`]) "between" is checked by
/// label dominance; otherwise it is checked by reachability.
pub fn intersect<StorageT: 'static + Debug + Hash + PrimInt + Unsigned>(
    grm: &CnfGrammar<StorageT>,
    aut: &Automaton<StorageT>,
) -> Result<IntersectionGrammar<StorageT>, IntersectionError>
where
    usize: AsPrimitive<StorageT>,
{
    let mut nts = IndexSet::<Triple<StorageT>>::new();
    let mut term_prods = Vec::new();
    for &(p, tidx, q) in aut.edges() {
        for &ridx in grm.token_rules(tidx) {
            let (x, _) = nts.insert_full(Triple::new(p, ridx, q));
            term_prods.push((x, tidx));
        }
    }

    let grid = aut.is_grid();
    let between = |p: StIdx, q: StIdx| {
        if grid {
            p != q && aut.label(p).dominates(&aut.label(q))
        } else {
            aut.reaches(p, q)
        }
    };
    let n = aut.num_states();
    let mut binary_prods = Vec::new();
    if !grm.binary_prods().is_empty() {
        for p in (0..n).map(StIdx::from) {
            for q in (usize::from(p) + 1..n).map(StIdx::from) {
                if !between(p, q) {
                    continue;
                }
                for r in (usize::from(q) + 1..n).map(StIdx::from) {
                    if !between(q, r) {
                        continue;
                    }
                    for &(a, b, c) in grm.binary_prods() {
                        let (x, _) = nts.insert_full(Triple::new(p, a, r));
                        let (y, _) = nts.insert_full(Triple::new(p, b, q));
                        let (z, _) = nts.insert_full(Triple::new(q, c, r));
                        binary_prods.push((x, y, z));
                    }
                }
            }
        }
    }

    let start = grm.start_rule_idx();
    let mut start_alternatives = Vec::new();
    for &p in aut.initials() {
        for q in aut.finals() {
            if let Some(x) = nts.get_index_of(&Triple::new(p, start, q)) {
                start_alternatives.push(x);
            }
        }
    }
    let before = start_alternatives.len() + binary_prods.len() + term_prods.len();

    let useful = useful_nonterminals(nts.len(), &start_alternatives, &binary_prods, &term_prods);
    let mut map = vec![None; nts.len()];
    let mut nonterminals = Vec::new();
    for (x, t) in nts.into_iter().enumerate() {
        if useful[x] {
            map[x] = Some(nonterminals.len());
            nonterminals.push(t);
        }
    }
    let start_alternatives = start_alternatives
        .into_iter()
        .filter_map(|x| map[x])
        .collect::<Vec<_>>();
    let binary_prods = binary_prods
        .into_iter()
        .filter_map(|(x, y, z)| Some((map[x]?, map[y]?, map[z]?)))
        .collect::<Vec<_>>();
    let term_prods = term_prods
        .into_iter()
        .filter_map(|(x, t)| Some((map[x]?, t)))
        .collect::<Vec<_>>();
    let after = start_alternatives.len() + binary_prods.len() + term_prods.len();
    debug!(
        "Bar-Hillel: {} states, {} productions, {} after pruning",
        n, before, after
    );

    if start_alternatives.is_empty() {
        return Err(IntersectionError {
            kind: IntersectionErrorKind::EmptyIntersection,
            productions: before,
        });
    }
    Ok(IntersectionGrammar {
        nonterminals,
        start_alternatives,
        binary_prods,
        term_prods,
        labels: aut.states().to_vec(),
    })
}

/// Return the nonterminals which are generating and reachable from a generating start
/// alternative. Generating nonterminals are found with a worklist: each binary production
/// counts down its not-yet-generating right hand side occurrences, so every production is
/// visited at most twice.
fn useful_nonterminals<StorageT>(
    nts_len: usize,
    start_alternatives: &[usize],
    binary_prods: &[(usize, usize, usize)],
    term_prods: &[(usize, TIdx<StorageT>)],
) -> Vob {
    let mut occurs = vec![Vec::new(); nts_len];
    let mut lhs_prods = vec![Vec::new(); nts_len];
    for (i, &(x, y, z)) in binary_prods.iter().enumerate() {
        occurs[y].push(i);
        occurs[z].push(i);
        lhs_prods[x].push(i);
    }
    let mut pending = vec![2u8; binary_prods.len()];
    let mut generating = Vob::from_elem(false, nts_len);
    let mut todo = Vec::new();
    for &(x, _) in term_prods {
        if !generating[x] {
            generating.set(x, true);
            todo.push(x);
        }
    }
    while let Some(y) = todo.pop() {
        for &i in &occurs[y] {
            pending[i] -= 1;
            let x = binary_prods[i].0;
            if pending[i] == 0 && !generating[x] {
                generating.set(x, true);
                todo.push(x);
            }
        }
    }

    let mut reachable = Vob::from_elem(false, nts_len);
    let mut todo = Vec::new();
    for &x in start_alternatives {
        if generating[x] && !reachable[x] {
            reachable.set(x, true);
            todo.push(x);
        }
    }
    while let Some(x) = todo.pop() {
        for &i in &lhs_prods[x] {
            let (_, y, z) = binary_prods[i];
            if !(generating[y] && generating[z]) {
                continue;
            }
            for w in [y, z] {
                if !reachable[w] {
                    reachable.set(w, true);
                    todo.push(w);
                }
            }
        }
    }
    reachable
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned> IntersectionGrammar<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn nonterminals(&self) -> &[Triple<StorageT>] {
        &self.nonterminals
    }

    /// The nonterminals `[p, S, q]` with `p` initial and `q` final.
    pub fn start_alternatives(&self) -> &[usize] {
        &self.start_alternatives
    }

    pub fn binary_prods(&self) -> &[(usize, usize, usize)] {
        &self.binary_prods
    }

    pub fn term_prods(&self) -> &[(usize, TIdx<StorageT>)] {
        &self.term_prods
    }

    /// How many productions (including the start rule's) does this grammar have?
    pub fn prods_len(&self) -> usize {
        self.start_alternatives.len() + self.binary_prods.len() + self.term_prods.len()
    }

    /// The name of nonterminal `x`, e.g. `[q_0/0,S,q_2/1]`. Panics if `x` doesn't exist.
    pub fn nonterminal_name(&self, grm: &CnfGrammar<StorageT>, x: usize) -> String {
        let t = self.nonterminals[x];
        format!(
            "[{},{},{}]",
            self.labels[usize::from(t.p)],
            grm.rule_name_str(t.ridx),
            self.labels[usize::from(t.q)]
        )
    }

    /// Pretty print this grammar in the style of [`CnfGrammar::pp`], with `^` as the start rule.
    pub fn pp(&self, grm: &CnfGrammar<StorageT>) -> String {
        let mut rhss = vec![Vec::new(); self.nonterminals.len()];
        for &(x, y, z) in &self.binary_prods {
            rhss[x].push(format!(
                "{} {}",
                self.nonterminal_name(grm, y),
                self.nonterminal_name(grm, z)
            ));
        }
        for &(x, t) in &self.term_prods {
            rhss[x].push(format!("'{}'", token_str(grm, t)));
        }
        let start = self
            .start_alternatives
            .iter()
            .map(|x| self.nonterminal_name(grm, *x))
            .collect::<Vec<_>>();

        let mut s = "%start ^\n%%\n".to_string();
        let rules = Some(("^".to_string(), start)).into_iter().chain(
            rhss.into_iter()
                .enumerate()
                .map(|(x, rhs)| (self.nonterminal_name(grm, x), rhs)),
        );
        for (name, rhs) in rules {
            s.push_str(&name);
            s.push(':');
            for (i, r) in rhs.iter().enumerate() {
                if i > 0 {
                    s.push_str("\n  |");
                }
                s.push(' ');
                s.push_str(r);
            }
            s.push_str(";\n");
        }
        s
    }

    /// Convert this grammar into a [`CnfGrammar`] over `grm`'s tokens. The start rule `^` is
    /// given the productions of each start alternative, so the result is again in binary normal
    /// form. Start alternatives which no other production refers to are then unreachable, and are
    /// pruned away along with their productions.
    pub fn to_cnf(&self, grm: &CnfGrammar<StorageT>) -> CnfGrammar<StorageT> {
        let ridx = |x: usize| RIdx((x + 1).as_());
        let mut names = Vec::with_capacity(self.nonterminals.len() + 1);
        names.push("^".to_string());
        names.extend((0..self.nonterminals.len()).map(|x| self.nonterminal_name(grm, x)));

        let mut prods = Vec::with_capacity(self.prods_len());
        for &(x, y, z) in &self.binary_prods {
            prods.push((ridx(x), CnfProd::Binary(ridx(y), ridx(z))));
        }
        for &(x, t) in &self.term_prods {
            prods.push((ridx(x), CnfProd::Term(t)));
        }
        let mut start_prods = Vec::new();
        for &a in &self.start_alternatives {
            for &(x, prod) in &prods {
                if x == ridx(a) {
                    start_prods.push((RIdx(StorageT::zero()), prod));
                }
            }
        }
        start_prods.extend(prods);
        CnfGrammar::from_parts(
            names,
            RIdx(StorageT::zero()),
            grm.iter_tidxs()
                .map(|t| grm.token_name(t).to_string())
                .collect(),
            start_prods,
        )
        .prune()
    }
}
