use std::{fmt::Debug, hash::Hash};

use cnfgrammar::{CnfGrammar, RIdx, TIdx};
use fnv::FnvHashMap;
use log::trace;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{Automaton, Forest, LevBall, NodeIdx, PTree, StIdx, Triple};

/// The cells of a CYK parse over an automaton: which rules derive a string leading from state
/// `p` to state `q`, and (depending on the chart) how.
pub(crate) trait Chart<StorageT> {
    /// Record that `t.ridx: 'tidx'` leads from `t.p` to `t.q`.
    fn leaf(&mut self, t: Triple<StorageT>, tidx: TIdx<StorageT>);
    /// Has `[p, ridx, q]` been derived?
    fn has(&self, p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> bool;
    /// May `[p, ridx, q]` be derived at all?
    fn allowed(&self, p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> bool;
    /// Record the derivation `[t.p, t.ridx, t.q]: [t.p, b, r] [r, c, t.q]`.
    fn branch(&mut self, t: Triple<StorageT>, r: StIdx, b: RIdx<StorageT>, c: RIdx<StorageT>);
    /// Does this chart want every derivation of a cell, or just one?
    fn exhaustive(&self) -> bool;
}

/// Fill `chart` by CYK over the states of `aut`, visiting pairs of states `(p, q)` in order of
/// increasing topological distance `q - p`; the cells a pair depends on are therefore complete
/// before the pair is visited. If `stop_early` is true, return as soon as an accepting cell has
/// been derived. Returns true if the start rule derives a string from an initial to a final
/// state.
fn fill<StorageT, C>(
    grm: &CnfGrammar<StorageT>,
    aut: &Automaton<StorageT>,
    chart: &mut C,
    stop_early: bool,
) -> bool
where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
    C: Chart<StorageT>,
{
    let accepting = |chart: &C| {
        let start = grm.start_rule_idx();
        aut.initials()
            .iter()
            .any(|&p| aut.finals().any(|q| chart.has(p, start, q)))
    };

    for &(p, tidx, q) in aut.edges() {
        for &ridx in grm.token_rules(tidx) {
            if chart.allowed(p, ridx, q) {
                chart.leaf(Triple::new(p, ridx, q), tidx);
            }
        }
    }
    if stop_early && accepting(&*chart) {
        return true;
    }

    let n = aut.num_states();
    let mut mids = Vec::new();
    for dist in 1..n {
        let mut visited = 0;
        for p in 0..n - dist {
            let (p, q) = (StIdx::from(p), StIdx::from(p + dist));
            if !aut.reaches(p, q) {
                continue;
            }
            mids.clear();
            mids.extend(aut.midpoints(p, q));
            if mids.is_empty() {
                continue;
            }
            visited += 1;
            for &(a, b, c) in grm.binary_prods() {
                if !chart.allowed(p, a, q) || (!chart.exhaustive() && chart.has(p, a, q)) {
                    continue;
                }
                for &r in &mids {
                    if chart.has(p, b, r) && chart.has(r, c, q) {
                        chart.branch(Triple::new(p, a, q), r, b, c);
                        if !chart.exhaustive() {
                            break;
                        }
                    }
                }
            }
        }
        trace!("CYK: distance {}, {} pairs", dist, visited);
        if stop_early && accepting(&*chart) {
            return true;
        }
    }
    accepting(&*chart)
}

/// A CYK chart holding, for each pair of states `(p, q)`, the set of rules which derive a string
/// leading from `p` to `q`.
#[derive(Debug)]
pub struct BitChart {
    num_states: usize,
    rules_len: usize,
    /// Indexed by `p * num_states + q`; `None` if no rule derives anything over `(p, q)`.
    cells: Vec<Option<Vob>>,
}

impl BitChart {
    fn new(num_states: usize, rules_len: usize) -> Self {
        BitChart {
            num_states,
            rules_len,
            cells: vec![None; num_states * num_states],
        }
    }

    fn set(&mut self, p: StIdx, ridx: usize, q: StIdx) {
        let rules_len = self.rules_len;
        self.cells[usize::from(p) * self.num_states + usize::from(q)]
            .get_or_insert_with(|| Vob::from_elem(false, rules_len))
            .set(ridx, true);
    }

    /// The rules deriving a string from `p` to `q`, or `None` if there are none. Panics if either
    /// state doesn't exist.
    pub fn cell(&self, p: StIdx, q: StIdx) -> Option<&Vob> {
        self.cells[usize::from(p) * self.num_states + usize::from(q)].as_ref()
    }

    /// Does `ridx` derive a string from `p` to `q`?
    pub fn contains<StorageT: PrimInt + Unsigned>(
        &self,
        p: StIdx,
        ridx: RIdx<StorageT>,
        q: StIdx,
    ) -> bool {
        self.cell(p, q)
            .map(|v| v[usize::from(ridx)])
            .unwrap_or(false)
    }

    /// How many `(p, rule, q)` entries does this chart hold?
    pub fn len(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .map(|v| v.iter_set_bits(..).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|v| v.iter_set_bits(..).next().is_none())
    }

    /// Return a chart containing only those entries of `self` which take part in a derivation
    /// from the start rule over an initial and a final state. Passing the result to [`forest`]
    /// confines the forest construction to exactly the cells it will keep.
    pub fn template<StorageT>(
        &self,
        grm: &CnfGrammar<StorageT>,
        aut: &Automaton<StorageT>,
    ) -> BitChart
    where
        StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
        usize: AsPrimitive<StorageT>,
    {
        let n = self.num_states;
        let mut tmpl = BitChart::new(n, self.rules_len);
        let start = grm.start_rule_idx();
        for &p in aut.initials() {
            for q in aut.finals() {
                if self.contains(p, start, q) {
                    tmpl.set(p, usize::from(start), q);
                }
            }
        }
        // A cell only feeds cells at a strictly greater distance, so visiting distances in
        // decreasing order sees every parent of a cell before the cell itself.
        for dist in (1..n).rev() {
            for p in 0..n - dist {
                let (p, q) = (StIdx::from(p), StIdx::from(p + dist));
                let Some(active) = tmpl.cell(p, q).cloned() else {
                    continue;
                };
                for &(a, b, c) in grm.binary_prods() {
                    if !active[usize::from(a)] {
                        continue;
                    }
                    for r in aut.midpoints(p, q) {
                        if self.contains(p, b, r) && self.contains(r, c, q) {
                            tmpl.set(p, usize::from(b), r);
                            tmpl.set(r, usize::from(c), q);
                        }
                    }
                }
            }
        }
        tmpl
    }
}

impl<StorageT: PrimInt + Unsigned> Chart<StorageT> for BitChart {
    fn leaf(&mut self, t: Triple<StorageT>, _: TIdx<StorageT>) {
        self.set(t.p, usize::from(t.ridx), t.q);
    }

    fn has(&self, p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> bool {
        self.contains(p, ridx, q)
    }

    fn allowed(&self, _: StIdx, _: RIdx<StorageT>, _: StIdx) -> bool {
        true
    }

    fn branch(&mut self, t: Triple<StorageT>, _: StIdx, _: RIdx<StorageT>, _: RIdx<StorageT>) {
        self.set(t.p, usize::from(t.ridx), t.q);
    }

    fn exhaustive(&self) -> bool {
        false
    }
}

/// A CYK chart holding one forest node per derived `[p, A, q]`.
struct ForestChart<'a, StorageT> {
    nodes: Vec<PTree<StorageT>>,
    ids: FnvHashMap<Triple<StorageT>, NodeIdx>,
    template: Option<&'a BitChart>,
}

impl<StorageT: Hash + PrimInt + Unsigned> ForestChart<'_, StorageT> {
    fn node(&mut self, t: Triple<StorageT>) -> &mut PTree<StorageT> {
        let nodes = &mut self.nodes;
        let x = *self.ids.entry(t).or_insert_with(|| {
            nodes.push(PTree::new(t));
            nodes.len() - 1
        });
        &mut self.nodes[x]
    }
}

impl<StorageT: Hash + PrimInt + Unsigned> Chart<StorageT> for ForestChart<'_, StorageT> {
    fn leaf(&mut self, t: Triple<StorageT>, tidx: TIdx<StorageT>) {
        self.node(t).leaves.push(tidx);
    }

    fn has(&self, p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> bool {
        self.ids.contains_key(&Triple::new(p, ridx, q))
    }

    fn allowed(&self, p: StIdx, ridx: RIdx<StorageT>, q: StIdx) -> bool {
        self.template
            .map(|tmpl| tmpl.contains(p, ridx, q))
            .unwrap_or(true)
    }

    fn branch(&mut self, t: Triple<StorageT>, r: StIdx, b: RIdx<StorageT>, c: RIdx<StorageT>) {
        let l = self.ids[&Triple::new(t.p, b, r)];
        let r = self.ids[&Triple::new(r, c, t.q)];
        self.node(t).branches.push((l, r));
    }

    fn exhaustive(&self) -> bool {
        true
    }
}

/// Is the intersection of `grm`'s language and `aut`'s language non-empty? Stops as soon as one
/// accepting derivation is found.
pub fn nonempty<StorageT>(grm: &CnfGrammar<StorageT>, aut: &Automaton<StorageT>) -> bool
where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
{
    let mut chart = BitChart::new(aut.num_states(), usize::from(grm.rules_len()));
    fill(grm, aut, &mut chart, true)
}

/// Build the full boolean CYK chart of `grm` over `aut`.
pub fn bitchart<StorageT>(grm: &CnfGrammar<StorageT>, aut: &Automaton<StorageT>) -> BitChart
where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
{
    let mut chart = BitChart::new(aut.num_states(), usize::from(grm.rules_len()));
    fill(grm, aut, &mut chart, false);
    chart
}

/// Build the parse forest of every derivation from `grm`'s start rule of a string in `aut`'s
/// language, or `None` if there are no such derivations. If `template` is given, only the
/// entries it contains are considered (see [`BitChart::template`]).
pub fn forest<StorageT>(
    grm: &CnfGrammar<StorageT>,
    aut: &Automaton<StorageT>,
    template: Option<&BitChart>,
) -> Option<Forest<StorageT>>
where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
{
    let mut chart = ForestChart {
        nodes: Vec::new(),
        ids: FnvHashMap::default(),
        template,
    };
    if !fill(grm, aut, &mut chart, false) {
        return None;
    }
    let start = grm.start_rule_idx();
    let mut roots = Vec::new();
    for &p in aut.initials() {
        for q in aut.finals() {
            if let Some(x) = chart.ids.get(&Triple::new(p, start, q)) {
                roots.push(*x);
            }
        }
    }
    Some(Forest::new(chart.nodes, roots))
}

/// Is `toks` a sentence of `grm`?
pub fn recognise<StorageT>(grm: &CnfGrammar<StorageT>, toks: &[TIdx<StorageT>]) -> bool
where
    StorageT: 'static + Debug + Hash + PrimInt + Unsigned,
    usize: AsPrimitive<StorageT>,
{
    nonempty(grm, &LevBall::new(toks, 0).build())
}

#[cfg(test)]
mod test {
    use super::{bitchart, forest, nonempty, recognise};
    use crate::{Automaton, LevBall, StIdx, StateLabel, Transition};
    use cnfgrammar::{CnfGrammar, TIdx};

    fn ball(grm: &CnfGrammar<u32>, toks: &[&str], radius: usize) -> Automaton<u32> {
        let (input, _) = grm.token_idxs(toks);
        LevBall::new(&input, radius)
            .alphabet(grm.iter_tidxs().collect())
            .build()
    }

    #[test]
    fn test_recognise() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        let (a, b) = (TIdx(0), TIdx(1));
        assert!(recognise(&grm, &[a, b]));
        assert!(recognise(&grm, &[a, a, a, b, b, b]));
        assert!(!recognise(&grm, &[]));
        assert!(!recognise(&grm, &[a, b, a, b]));
        assert!(!recognise(&grm, &[a, a, b]));
        // A token foreign to the grammar.
        assert!(!recognise(&grm, &[a, TIdx(7), b]));
    }

    #[test]
    fn test_nonempty() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        assert!(!nonempty(&grm, &ball(&grm, &["a", "a", "b"], 0)));
        assert!(nonempty(&grm, &ball(&grm, &["a", "a", "b"], 1)));
        assert!(!nonempty(&grm, &ball(&grm, &["b", "a"], 1)));
        assert!(nonempty(&grm, &ball(&grm, &["b", "a"], 2)));
        let empty = CnfGrammar::new("%%\nS: S S;").unwrap();
        assert!(!nonempty(&empty, &ball(&empty, &[], 3)));
    }

    #[test]
    fn test_forest() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        let aut = ball(&grm, &["a", "a", "b"], 1);
        let f = forest(&grm, &aut, None).unwrap();
        for (x, node) in f.nodes().iter().enumerate() {
            for &(l, r) in &node.branches {
                assert!(l < x && r < x);
            }
        }
        let sentences = f.sentences().collect::<Vec<_>>();
        let (a, b) = (TIdx(0), TIdx(1));
        assert!(sentences.contains(&vec![a, b]));
        assert!(sentences.contains(&vec![a, a, b, b]));
        assert_eq!(sentences.len(), 2);
        for s in &sentences {
            assert!(recognise(&grm, s) && aut.accepts(s));
        }
        assert!(forest(&grm, &ball(&grm, &["a", "a", "b"], 0), None).is_none());
    }

    #[test]
    fn test_template() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        let aut = ball(&grm, &["a", "b", "b", "a"], 2);
        let chart = bitchart(&grm, &aut);
        let tmpl = chart.template(&grm, &aut);
        assert!(!tmpl.is_empty());
        assert!(tmpl.len() < chart.len());
        let full = forest(&grm, &aut, None).unwrap();
        let pruned = forest(&grm, &aut, Some(&tmpl)).unwrap();
        assert_eq!(full.count(), pruned.count());
        assert_eq!(full.nodes().len(), pruned.nodes().len());
        assert_eq!(
            full.sentences().collect::<Vec<_>>(),
            pruned.sentences().collect::<Vec<_>>()
        );
        // Every entry of the template is in the chart.
        for p in aut.topological_order() {
            for q in aut.topological_order() {
                if let Some(v) = tmpl.cell(p, q) {
                    for ridx in v.iter_set_bits(..) {
                        assert!(chart.cell(p, q).unwrap()[ridx]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_opaque_automaton() {
        // "a b" via states 0, 1, 2 and "a a b b" via 0, 3, 4, 5, 2.
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        let (a, b) = (TIdx(0), TIdx(1));
        let op = StateLabel::Opaque;
        let aut = Automaton::new(
            vec![
                Transition::new(op(0), a, op(1)),
                Transition::new(op(1), b, op(2)),
                Transition::new(op(0), a, op(3)),
                Transition::new(op(3), a, op(4)),
                Transition::new(op(4), b, op(5)),
                Transition::new(op(5), b, op(2)),
            ],
            vec![op(0)],
            vec![op(2)],
        )
        .unwrap();
        let f = forest(&grm, &aut, None).unwrap();
        assert_eq!(f.count(), 2);
        assert_eq!(f.roots().len(), 1);
        assert_eq!(aut.state_id(&op(0)), Some(StIdx::from(0usize)));
        assert!(nonempty(&grm, &aut));
    }
}
