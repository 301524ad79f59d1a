use std::{
    cell::OnceCell,
    collections::VecDeque,
    error::Error,
    fmt::{self, Debug},
    hash::Hash,
};

use cnfgrammar::{CnfGrammar, TIdx};
use fnv::FnvHashMap;
use indexmap::IndexSet;
use log::debug;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{StIdx, StateLabel, token_str};

/// A transition `from --tidx--> to`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Transition<StorageT> {
    pub from: StateLabel,
    pub tidx: TIdx<StorageT>,
    pub to: StateLabel,
}

impl<StorageT> Transition<StorageT> {
    pub fn new(from: StateLabel, tidx: TIdx<StorageT>, to: StateLabel) -> Self {
        Transition { from, tidx, to }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AutomatonErrorKind {
    /// The transitions contain a cycle: `unordered` states could not be given a topological
    /// position.
    Cyclic { unordered: usize },
    NoInitialState,
}

/// Any error from building an [`Automaton`] returns an instance of this struct.
#[derive(Debug, PartialEq, Eq)]
pub struct AutomatonError {
    pub kind: AutomatonErrorKind,
}

impl Error for AutomatonError {}

impl fmt::Display for AutomatonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            AutomatonErrorKind::Cyclic { unordered } => write!(
                f,
                "Automaton is cyclic ({} states have no topological position)",
                unordered
            ),
            AutomatonErrorKind::NoInitialState => write!(f, "Automaton has no initial state"),
        }
    }
}

/// An immutable acyclic automaton. States are numbered densely in a topological order: for
/// every transition `p --t--> q`, `p < q`.
#[derive(Debug)]
pub struct Automaton<StorageT> {
    /// A mapping from `StIdx` -> label.
    labels: Vec<StateLabel>,
    ids: FnvHashMap<StateLabel, StIdx>,
    /// Every transition as `(from, tidx, to)`, sorted by `from`.
    edges: Vec<(StIdx, TIdx<StorageT>, StIdx)>,
    /// `edges[edge_starts[p]..edge_starts[p + 1]]` are the transitions out of `p`.
    edge_starts: Vec<usize>,
    preds: Vec<Vec<StIdx>>,
    initials: Vec<StIdx>,
    finals: Vob,
    grid: bool,
    /// `post[p]` is every state reachable from `p` (including `p` itself).
    post: OnceCell<Vec<Vob>>,
    /// `pre[q]` is every state which can reach `q` (including `q` itself).
    pre: OnceCell<Vec<Vob>>,
    /// Indexed by `p * num_states + q`.
    pairs: Vec<OnceCell<Vob>>,
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned> Automaton<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Build an automaton from `transitions`, with initial states `initials` and final states
    /// `finals`. Duplicate transitions are ignored. Fails if there is no initial state or if the
    /// transitions contain a cycle.
    pub fn new(
        transitions: Vec<Transition<StorageT>>,
        initials: Vec<StateLabel>,
        finals: Vec<StateLabel>,
    ) -> Result<Self, AutomatonError> {
        if initials.is_empty() {
            return Err(AutomatonError {
                kind: AutomatonErrorKind::NoInitialState,
            });
        }
        let mut labels = IndexSet::new();
        for t in &transitions {
            labels.insert(t.from);
            labels.insert(t.to);
        }
        labels.extend(initials.iter().copied());
        labels.extend(finals.iter().copied());

        let (labels, ordering) = match grid_order(&labels, &transitions) {
            Some(o) => (o, "grid"),
            None => (topological_sort(&labels, &transitions)?, "Kahn"),
        };
        let ids = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (*l, StIdx::from(i)))
            .collect::<FnvHashMap<_, _>>();
        let num_states = labels.len();

        let mut edges = transitions
            .iter()
            .map(|t| (ids[&t.from], t.tidx, ids[&t.to]))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        edges.sort();
        let mut edge_starts = Vec::with_capacity(num_states + 1);
        let mut preds = vec![Vec::new(); num_states];
        let mut e = 0;
        for p in 0..num_states {
            edge_starts.push(e);
            while e < edges.len() && usize::from(edges[e].0) == p {
                let q = edges[e].2;
                if !preds[usize::from(q)].contains(&StIdx::from(p)) {
                    preds[usize::from(q)].push(StIdx::from(p));
                }
                e += 1;
            }
        }
        edge_starts.push(e);

        let mut fvob = Vob::from_elem(false, num_states);
        for l in &finals {
            fvob.set(usize::from(ids[l]), true);
        }
        let mut initials = initials.iter().map(|l| ids[l]).collect::<Vec<_>>();
        initials.sort();
        initials.dedup();

        let grid = labels.iter().all(|l| l.is_grid())
            && transitions.iter().all(|t| t.from.dominates(&t.to));
        debug!(
            "Automaton: {} states, {} edges, {} order",
            num_states,
            edges.len(),
            ordering
        );
        Ok(Automaton {
            labels,
            ids,
            edges,
            edge_starts,
            preds,
            initials,
            finals: fvob,
            grid,
            post: OnceCell::new(),
            pre: OnceCell::new(),
            pairs: (0..num_states * num_states).map(|_| OnceCell::new()).collect(),
        })
    }

    pub fn num_states(&self) -> usize {
        self.labels.len()
    }

    /// The labels of all states, indexed by `StIdx` (i.e. in topological order).
    pub fn states(&self) -> &[StateLabel] {
        &self.labels
    }

    /// Return an iterator over all states in topological order.
    pub fn topological_order(&self) -> impl Iterator<Item = StIdx> + use<StorageT> {
        (0..self.labels.len()).map(StIdx::from)
    }

    /// Return the index of the state labelled `label` or `None` if it doesn't exist.
    pub fn state_id(&self, label: &StateLabel) -> Option<StIdx> {
        self.ids.get(label).copied()
    }

    /// Return the label of state `stidx`. Panics if `stidx` doesn't exist.
    pub fn label(&self, stidx: StIdx) -> StateLabel {
        self.labels[usize::from(stidx)]
    }

    /// Every transition as `(from, tidx, to)`, sorted by `from`.
    pub fn edges(&self) -> &[(StIdx, TIdx<StorageT>, StIdx)] {
        &self.edges
    }

    /// The transitions out of `stidx`. Panics if `stidx` doesn't exist.
    pub fn out_edges(&self, stidx: StIdx) -> &[(StIdx, TIdx<StorageT>, StIdx)] {
        let p = usize::from(stidx);
        &self.edges[self.edge_starts[p]..self.edge_starts[p + 1]]
    }

    pub fn initials(&self) -> &[StIdx] {
        &self.initials
    }

    pub fn finals(&self) -> impl Iterator<Item = StIdx> + '_ {
        self.finals.iter_set_bits(..).map(StIdx::from)
    }

    /// Is `stidx` a final state? Panics if `stidx` doesn't exist.
    pub fn is_final(&self, stidx: StIdx) -> bool {
        self.finals[usize::from(stidx)]
    }

    /// Is every state labelled with grid coordinates, with every transition moving from a state
    /// to one it dominates? If so, dominance is a superset of reachability and can be used in
    /// place of it.
    pub fn is_grid(&self) -> bool {
        self.grid
    }

    fn post(&self) -> &[Vob] {
        self.post.get_or_init(|| {
            let n = self.num_states();
            let mut post = vec![Vob::new(); n];
            for p in (0..n).rev() {
                let mut v = Vob::from_elem(false, n);
                v.set(p, true);
                for &(_, _, q) in self.out_edges(StIdx::from(p)) {
                    v.or(&post[usize::from(q)]);
                }
                post[p] = v;
            }
            post
        })
    }

    fn pre(&self) -> &[Vob] {
        self.pre.get_or_init(|| {
            let n = self.num_states();
            let mut pre = vec![Vob::new(); n];
            for q in 0..n {
                let mut v = Vob::from_elem(false, n);
                v.set(q, true);
                for &p in &self.preds[q] {
                    v.or(&pre[usize::from(p)]);
                }
                pre[q] = v;
            }
            pre
        })
    }

    /// Can `q` be reached from `p` by a non-empty path? Panics if either state doesn't exist.
    pub fn reaches(&self, p: StIdx, q: StIdx) -> bool {
        p != q && self.post()[usize::from(p)][usize::from(q)]
    }

    /// Return the set of states lying on some path from `p` to `q` (including `p` and `q`
    /// themselves). The set is empty if `q` is not reachable from `p` and, in particular, if `p`
    /// and `q` are the same state. Panics if either state doesn't exist.
    ///
    /// Each set is computed at most once, on first request.
    pub fn all_pairs(&self, p: StIdx, q: StIdx) -> &Vob {
        let n = self.num_states();
        self.pairs[usize::from(p) * n + usize::from(q)].get_or_init(|| {
            if !self.reaches(p, q) {
                return Vob::new();
            }
            let mut v = self.post()[usize::from(p)].clone();
            v.and(&self.pre()[usize::from(q)]);
            v
        })
    }

    /// The states lying strictly between `p` and `q` on some path from `p` to `q`, in
    /// topological order.
    pub fn midpoints(&self, p: StIdx, q: StIdx) -> impl Iterator<Item = StIdx> + '_ {
        let (lo, hi) = (usize::from(p) + 1, usize::from(q));
        let pairs = self.all_pairs(p, q);
        let range = if pairs.is_empty() { 0..0 } else { lo..hi };
        pairs.iter_set_bits(range).map(StIdx::from)
    }

    /// Does this automaton accept the token sequence `toks`?
    pub fn accepts(&self, toks: &[TIdx<StorageT>]) -> bool {
        let n = self.num_states();
        let mut cur = Vob::from_elem(false, n);
        for p in &self.initials {
            cur.set(usize::from(*p), true);
        }
        for t in toks {
            let mut next = Vob::from_elem(false, n);
            for p in cur.iter_set_bits(..) {
                for &(_, tidx, q) in self.out_edges(StIdx::from(p)) {
                    if tidx == *t {
                        next.set(usize::from(q), true);
                    }
                }
            }
            cur = next;
        }
        cur.iter_set_bits(..).any(|p| self.finals[p])
    }

    /// Pretty print this automaton as a `String`: one state per line (in topological order),
    /// followed by its transitions.
    pub fn pp(&self, grm: &CnfGrammar<StorageT>) -> String {
        let mut o = String::new();
        for stidx in self.topological_order() {
            o.push_str(&format!("{}", self.label(stidx)));
            if self.initials.contains(&stidx) {
                o.push_str(" (initial)");
            }
            if self.is_final(stidx) {
                o.push_str(" (final)");
            }
            o.push('\n');
            for &(_, tidx, q) in self.out_edges(stidx) {
                o.push_str(&format!(
                    "  '{}' -> {}\n",
                    token_str(grm, tidx),
                    self.label(q)
                ));
            }
        }
        o
    }
}

/// If every label is a grid label, order them by anti-diagonal (and then by input position),
/// returning `None` if any transition doesn't respect that order.
fn grid_order<StorageT>(
    labels: &IndexSet<StateLabel>,
    transitions: &[Transition<StorageT>],
) -> Option<Vec<StateLabel>> {
    if !labels.iter().all(|l| l.is_grid()) {
        return None;
    }
    let mut order = labels.iter().copied().collect::<Vec<_>>();
    order.sort_by_key(|l| (l.antidiagonal(), *l));
    let pos = order
        .iter()
        .enumerate()
        .map(|(i, l)| (*l, i))
        .collect::<FnvHashMap<_, _>>();
    if transitions.iter().all(|t| pos[&t.from] < pos[&t.to]) {
        Some(order)
    } else {
        None
    }
}

/// Kahn's algorithm. States with no remaining predecessors are emitted in the order they were
/// first seen.
fn topological_sort<StorageT>(
    labels: &IndexSet<StateLabel>,
    transitions: &[Transition<StorageT>],
) -> Result<Vec<StateLabel>, AutomatonError> {
    let n = labels.len();
    let mut succs = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for t in transitions {
        let (Some(p), Some(q)) = (labels.get_index_of(&t.from), labels.get_index_of(&t.to)) else {
            continue;
        };
        succs[p].push(q);
        indegree[q] += 1;
    }
    let mut todo = (0..n).filter(|x| indegree[*x] == 0).collect::<VecDeque<_>>();
    let mut order = Vec::with_capacity(n);
    while let Some(p) = todo.pop_front() {
        order.push(labels[p]);
        for &q in &succs[p] {
            indegree[q] -= 1;
            if indegree[q] == 0 {
                todo.push_back(q);
            }
        }
    }
    if order.len() < n {
        return Err(AutomatonError {
            kind: AutomatonErrorKind::Cyclic {
                unordered: n - order.len(),
            },
        });
    }
    Ok(order)
}

#[cfg(test)]
mod test {
    use super::{Automaton, AutomatonErrorKind, Transition};
    use crate::{StIdx, StateLabel};
    use cnfgrammar::{CnfGrammar, TIdx};

    fn op(n: u32) -> StateLabel {
        StateLabel::Opaque(n)
    }

    fn tr(p: u32, t: u32, q: u32) -> Transition<u32> {
        Transition::new(op(p), TIdx(t), op(q))
    }

    /// A diamond `3 -> {1, 2} -> 0`, plus an isolated final state 4, labelled so that Kahn's
    /// algorithm has to reorder states.
    fn diamond() -> Automaton<u32> {
        Automaton::new(
            vec![tr(3, 0, 1), tr(3, 1, 2), tr(1, 0, 0), tr(2, 1, 0), tr(2, 1, 0)],
            vec![op(3)],
            vec![op(0), op(4)],
        )
        .unwrap()
    }

    #[test]
    fn test_topological_numbering() {
        let aut = diamond();
        assert_eq!(aut.num_states(), 5);
        assert!(!aut.is_grid());
        for &(p, _, q) in aut.edges() {
            assert!(p < q);
        }
        // Duplicate transitions are collapsed.
        assert_eq!(aut.edges().len(), 4);
        assert_eq!(aut.initials(), &[aut.state_id(&op(3)).unwrap()]);
        assert_eq!(aut.label(aut.initials()[0]), op(3));
        assert_eq!(aut.finals().count(), 2);
    }

    #[test]
    fn test_cyclic() {
        let err = Automaton::new(
            vec![tr(0, 0, 1), tr(1, 0, 2), tr(2, 0, 1)],
            vec![op(0)],
            vec![op(2)],
        )
        .unwrap_err();
        assert_eq!(err.kind, AutomatonErrorKind::Cyclic { unordered: 2 });
        let err = Automaton::<u32>::new(vec![], vec![], vec![op(0)]).unwrap_err();
        assert_eq!(err.kind, AutomatonErrorKind::NoInitialState);
    }

    #[test]
    fn test_all_pairs() {
        let aut = diamond();
        let id = |n| aut.state_id(&op(n)).unwrap();
        let (s, a, b, f, iso) = (id(3), id(1), id(2), id(0), id(4));
        let sf = aut.all_pairs(s, f);
        assert_eq!(sf.iter_set_bits(..).count(), 4);
        assert_eq!(
            aut.midpoints(s, f).collect::<Vec<_>>(),
            if a < b { vec![a, b] } else { vec![b, a] }
        );
        assert_eq!(aut.midpoints(s, a).count(), 0);
        assert!(aut.reaches(s, a));
        for p in aut.topological_order() {
            assert!(aut.all_pairs(p, p).iter_set_bits(..).next().is_none());
            assert!(!aut.reaches(p, p));
        }
        assert!(!aut.reaches(a, b));
        assert!(aut.all_pairs(a, b).is_empty());
        assert!(!aut.reaches(s, iso));
        assert!(aut.all_pairs(f, s).is_empty());
        // Every midpoint is reachable from p and reaches q.
        for p in aut.topological_order() {
            for q in aut.topological_order() {
                for r in aut.midpoints(p, q) {
                    assert!(aut.reaches(p, r) && aut.reaches(r, q));
                }
            }
        }
    }

    #[test]
    fn test_accepts() {
        let aut = diamond();
        assert!(aut.accepts(&[TIdx(0), TIdx(0)]));
        assert!(aut.accepts(&[TIdx(1), TIdx(1)]));
        assert!(!aut.accepts(&[TIdx(0), TIdx(1)]));
        assert!(!aut.accepts(&[TIdx(0)]));
        assert!(!aut.accepts(&[]));
    }

    #[test]
    fn test_grid_order() {
        let g = |i, j| StateLabel::grid(i, j);
        let aut = Automaton::new(
            vec![
                Transition::new(g(1, 0), TIdx(0u32), g(1, 1)),
                Transition::new(g(0, 0), TIdx(0), g(1, 0)),
                Transition::new(g(0, 0), TIdx(1), g(0, 1)),
                Transition::new(g(0, 1), TIdx(0), g(1, 1)),
            ],
            vec![g(0, 0)],
            vec![g(1, 1)],
        )
        .unwrap();
        assert!(aut.is_grid());
        assert_eq!(aut.states(), &[g(0, 0), g(0, 1), g(1, 0), g(1, 1)]);
        assert_eq!(aut.state_id(&g(1, 1)), Some(StIdx::from(3usize)));
        assert_eq!(aut.out_edges(StIdx::from(0usize)).len(), 2);

        // A grid labelled automaton whose transitions go against the dominance order.
        let aut = Automaton::new(
            vec![Transition::new(g(1, 1), TIdx(0u32), g(0, 0))],
            vec![g(1, 1)],
            vec![g(0, 0)],
        )
        .unwrap();
        assert!(!aut.is_grid());
        assert_eq!(aut.states(), &[g(1, 1), g(0, 0)]);
    }

    #[test]
    fn test_pp() {
        let grm = CnfGrammar::new("%%\nS: 'a';").unwrap();
        let aut = Automaton::new(
            vec![tr(0, 0, 1), tr(0, 5, 1)],
            vec![op(0)],
            vec![op(1)],
        )
        .unwrap();
        assert_eq!(
            aut.pp(&grm),
            "q_0 (initial)\n  'a' -> q_1\n  '#5' -> q_1\nq_1 (final)\n"
        );
    }
}
