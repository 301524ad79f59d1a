use std::{fmt::Debug, hash::Hash};

use cnfgrammar::{CnfGrammar, TIdx};
use fnv::{FnvHashMap, FnvHashSet};
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use rand::Rng;

use crate::{Automaton, Triple, token_str};

/// An index into a [`Forest`]'s nodes.
pub type NodeIdx = usize;

/// A parse forest node: every derivation of the rule `label.ridx` which leads the automaton from
/// `label.p` to `label.q`. A node has one alternative per leaf (`A: 't'`) and one per branch
/// (`A: B C`, split at some intermediate state).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PTree<StorageT> {
    pub label: Triple<StorageT>,
    pub leaves: Vec<TIdx<StorageT>>,
    pub branches: Vec<(NodeIdx, NodeIdx)>,
}

impl<StorageT> PTree<StorageT> {
    pub(crate) fn new(label: Triple<StorageT>) -> Self {
        PTree {
            label,
            leaves: Vec::new(),
            branches: Vec::new(),
        }
    }
}

/// A shared parse forest. Nodes are stored in an arena in which children always precede their
/// parents. The forest's roots are the alternatives of a synthetic start rule: one node
/// `[p, S, q]` for every initial `p` and final `q` that derive something.
///
/// Derivations are numbered from `0` to `count() - 1`: derivation numbers are a mixed radix
/// encoding of the choices made at each node. Counts saturate at `u128::MAX`, after which
/// derivation numbering is no longer exact.
#[derive(Debug)]
pub struct Forest<StorageT> {
    nodes: Vec<PTree<StorageT>>,
    roots: Vec<NodeIdx>,
    /// `counts[x]` is the number of derivations of node `x`.
    counts: Vec<u128>,
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned> Forest<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Build a forest from an arena of nodes (in any order) and its roots. Nodes which aren't
    /// reachable from a root are discarded; the remainder are ordered by the topological distance
    /// between their start and end states, so that children precede parents.
    pub(crate) fn new(nodes: Vec<PTree<StorageT>>, roots: Vec<NodeIdx>) -> Self {
        let mut seen = vec![false; nodes.len()];
        let mut todo = roots.clone();
        while let Some(x) = todo.pop() {
            if seen[x] {
                continue;
            }
            seen[x] = true;
            for &(l, r) in &nodes[x].branches {
                todo.push(l);
                todo.push(r);
            }
        }
        let mut order = (0..nodes.len()).filter(|x| seen[*x]).collect::<Vec<_>>();
        order.sort_by_key(|x| usize::from(nodes[*x].label.q) - usize::from(nodes[*x].label.p));
        let mut map = vec![0; nodes.len()];
        for (i, x) in order.iter().enumerate() {
            map[*x] = i;
        }

        let mut nodes = nodes.into_iter().map(Some).collect::<Vec<_>>();
        let mut kept = Vec::with_capacity(order.len());
        let mut counts: Vec<u128> = Vec::with_capacity(order.len());
        for x in order {
            let Some(mut node) = nodes[x].take() else {
                continue;
            };
            for b in node.branches.iter_mut() {
                *b = (map[b.0], map[b.1]);
            }
            let mut count = node.leaves.len() as u128;
            for &(l, r) in &node.branches {
                count = count.saturating_add(counts[l].saturating_mul(counts[r]));
            }
            counts.push(count);
            kept.push(node);
        }
        let mut roots = roots.into_iter().map(|x| map[x]).collect::<Vec<_>>();
        roots.sort();
        roots.dedup();
        Forest {
            nodes: kept,
            roots,
            counts,
        }
    }

    pub fn nodes(&self) -> &[PTree<StorageT>] {
        &self.nodes
    }

    /// Return node `x`. Panics if `x` doesn't exist.
    pub fn node(&self, x: NodeIdx) -> &PTree<StorageT> {
        &self.nodes[x]
    }

    pub fn roots(&self) -> &[NodeIdx] {
        &self.roots
    }

    /// How many derivations does node `x` have? Panics if `x` doesn't exist.
    pub fn node_count(&self, x: NodeIdx) -> u128 {
        self.counts[x]
    }

    /// How many derivations does this forest have? Distinct derivations can yield the same
    /// string if the grammar, or the automaton, is ambiguous.
    pub fn count(&self) -> u128 {
        self.roots
            .iter()
            .fold(0u128, |acc, x| acc.saturating_add(self.counts[*x]))
    }

    /// How many distinct strings does this forest yield? This is at most `count()`, and equal to
    /// it when neither the grammar nor the automaton is ambiguous. Edit-distance balls are
    /// ambiguous (e.g. either `a` of `a a b` can be deleted to give `a b`), so forests built from
    /// them typically have fewer strings than derivations. Every derivation is visited.
    pub fn distinct_count(&self) -> usize {
        self.sentences().count()
    }

    /// Return the tokens of derivation `k`, or `None` if `k >= self.count()`.
    pub fn derivation(&self, mut k: u128) -> Option<Vec<TIdx<StorageT>>> {
        let mut root = None;
        for &x in &self.roots {
            if k < self.counts[x] {
                root = Some(x);
                break;
            }
            k -= self.counts[x];
        }
        let mut st = vec![(root?, k)];
        let mut toks = Vec::new();
        while let Some((x, mut k)) = st.pop() {
            let node = &self.nodes[x];
            if k < node.leaves.len() as u128 {
                toks.push(node.leaves[usize::try_from(k).ok()?]);
                continue;
            }
            k -= node.leaves.len() as u128;
            for &(l, r) in &node.branches {
                let c = self.counts[l].saturating_mul(self.counts[r]);
                if k < c {
                    st.push((r, k % self.counts[r]));
                    st.push((l, k / self.counts[r]));
                    break;
                }
                k -= c;
            }
        }
        Some(toks)
    }

    /// Return a lazy iterator over the distinct strings of this forest. Each call to this
    /// function starts a fresh enumeration.
    pub fn sentences(&self) -> Sentences<'_, StorageT> {
        Sentences {
            forest: self,
            next: 0,
            seen: FnvHashSet::default(),
        }
    }

    /// Sample one derivation uniformly at random (over derivations, not strings).
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<Vec<TIdx<StorageT>>> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        self.derivation(rng.gen_range(0..count))
    }

    /// Return an iterator which samples derivations without replacement, yielding each distinct
    /// string at most once and ending when every derivation has been drawn.
    pub fn sampler<R: Rng>(&self, rng: R) -> Sampler<'_, StorageT, R> {
        Sampler {
            forest: self,
            rng,
            remaining: self.count(),
            swaps: FnvHashMap::default(),
            seen: FnvHashSet::default(),
        }
    }

    /// Pretty print this forest as a `String`. Each node is expanded the first time it is seen
    /// and abbreviated to `label *` thereafter. Nodes with more than one alternative list each
    /// alternative under a `|` line.
    pub fn pp(&self, grm: &CnfGrammar<StorageT>, aut: &Automaton<StorageT>) -> String {
        enum Item<StorageT> {
            Node(NodeIdx),
            Alt,
            Leaf(TIdx<StorageT>),
        }
        let label = |x: NodeIdx| {
            let t = self.nodes[x].label;
            format!(
                "[{},{},{}]",
                aut.label(t.p),
                grm.rule_name_str(t.ridx),
                aut.label(t.q)
            )
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut st = self
            .roots
            .iter()
            .rev()
            .map(|x| (0, Item::Node(*x)))
            .collect::<Vec<_>>();
        let mut s = String::new();
        while let Some((indent, e)) = st.pop() {
            for _ in 0..indent {
                s.push(' ');
            }
            match e {
                Item::Leaf(tidx) => s.push_str(&format!("'{}'\n", token_str(grm, tidx))),
                Item::Alt => s.push_str("|\n"),
                Item::Node(x) if seen[x] => s.push_str(&format!("{} *\n", label(x))),
                Item::Node(x) => {
                    seen[x] = true;
                    s.push_str(&format!("{}\n", label(x)));
                    let node = &self.nodes[x];
                    let alts = node.leaves.len() + node.branches.len();
                    let child = if alts > 1 { indent + 2 } else { indent + 1 };
                    for &(l, r) in node.branches.iter().rev() {
                        st.push((child, Item::Node(r)));
                        st.push((child, Item::Node(l)));
                        if alts > 1 {
                            st.push((indent + 1, Item::Alt));
                        }
                    }
                    for &tidx in node.leaves.iter().rev() {
                        st.push((child, Item::Leaf(tidx)));
                        if alts > 1 {
                            st.push((indent + 1, Item::Alt));
                        }
                    }
                }
            }
        }
        s
    }
}

/// An iterator over the distinct strings of a [`Forest`], in derivation order.
pub struct Sentences<'a, StorageT> {
    forest: &'a Forest<StorageT>,
    next: u128,
    seen: FnvHashSet<Vec<TIdx<StorageT>>>,
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned> Iterator for Sentences<'_, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    type Item = Vec<TIdx<StorageT>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.forest.count() {
            let toks = self.forest.derivation(self.next)?;
            self.next += 1;
            if self.seen.insert(toks.clone()) {
                return Some(toks);
            }
        }
        None
    }
}

/// Samples derivations from a [`Forest`] without replacement, using a sparse Fisher-Yates
/// shuffle of the derivation numbers.
pub struct Sampler<'a, StorageT, R> {
    forest: &'a Forest<StorageT>,
    rng: R,
    /// How many derivations have not yet been drawn.
    remaining: u128,
    /// The displaced entries of the (conceptual) array `0..count()`.
    swaps: FnvHashMap<u128, u128>,
    seen: FnvHashSet<Vec<TIdx<StorageT>>>,
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned, R: Rng> Iterator
    for Sampler<'_, StorageT, R>
where
    usize: AsPrimitive<StorageT>,
{
    type Item = Vec<TIdx<StorageT>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            let i = self.rng.gen_range(0..self.remaining);
            let last = self.remaining - 1;
            let k = self.swaps.get(&i).copied().unwrap_or(i);
            let moved = self.swaps.remove(&last).unwrap_or(last);
            if i != last {
                self.swaps.insert(i, moved);
            }
            self.remaining -= 1;
            let toks = self.forest.derivation(k)?;
            if self.seen.insert(toks.clone()) {
                return Some(toks);
            }
        }
        None
    }
}
