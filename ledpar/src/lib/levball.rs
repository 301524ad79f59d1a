use std::{fmt::Debug, hash::Hash};

use cnfgrammar::TIdx;
use indexmap::IndexSet;
use num_traits::{AsPrimitive, PrimInt, Unsigned};

use crate::{Automaton, StateLabel, Transition};

/// A builder for the automaton accepting every string within Levenshtein distance `radius` of
/// `tokens`. The automaton's states are the grid points `q_i/j` for `0 <= i <= tokens.len()` and
/// `0 <= j <= radius`: `i` tokens of the input have been accounted for, at a cost of `j` edits.
/// Its transitions are:
///
///   * match: `q_{i-1}/j --tokens[i-1]--> q_i/j`.
///   * substitution: `q_{i-1}/{j-1} --σ--> q_i/j` for every `σ` in the alphabet.
///   * insertion: `q_i/{j-1} --σ--> q_i/j` for every `σ` in the alphabet.
///   * deletion: `q_{i-k-1}/{j-k} --tokens[i-1]--> q_i/j` for `1 <= k <= j`, i.e. delete the `k`
///     tokens before `tokens[i-1]` and then match it. The `k = 1` case is the "knight move".
///
/// `q_0/0` is the sole initial state and `q_i/j` is final if `tokens.len() - i + j <= radius`
/// (the remaining input can be deleted within the budget).
pub struct LevBall<'a, StorageT> {
    tokens: &'a [TIdx<StorageT>],
    radius: usize,
    alphabet: Option<Vec<TIdx<StorageT>>>,
}

impl<'a, StorageT: 'static + Debug + Hash + PrimInt + Unsigned> LevBall<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn new(tokens: &'a [TIdx<StorageT>], radius: usize) -> Self {
        LevBall {
            tokens,
            radius,
            alphabet: None,
        }
    }

    /// The tokens which substitutions and insertions may introduce. Defaults to the distinct
    /// tokens of the input.
    pub fn alphabet(mut self, alphabet: Vec<TIdx<StorageT>>) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    pub fn build(self) -> Automaton<StorageT> {
        let n = self.tokens.len();
        let r = self.radius;
        let alphabet = match self.alphabet {
            Some(a) => a.into_iter().collect::<IndexSet<_>>(),
            None => self.tokens.iter().copied().collect::<IndexSet<_>>(),
        };
        let g = StateLabel::grid;

        let mut transitions = Vec::new();
        for i in 0..=n {
            for j in 0..=r {
                if i > 0 {
                    let tok = self.tokens[i - 1];
                    transitions.push(Transition::new(g(i - 1, j), tok, g(i, j)));
                    for k in 1..=j.min(i - 1) {
                        transitions.push(Transition::new(g(i - k - 1, j - k), tok, g(i, j)));
                    }
                }
                if j > 0 {
                    for &sym in &alphabet {
                        if i > 0 {
                            transitions.push(Transition::new(g(i - 1, j - 1), sym, g(i, j)));
                        }
                        transitions.push(Transition::new(g(i, j - 1), sym, g(i, j)));
                    }
                }
            }
        }

        let finals = (0..=n)
            .flat_map(|i| (0..=r).map(move |j| (i, j)))
            .filter(|&(i, j)| n - i + j <= r)
            .map(|(i, j)| g(i, j))
            .collect::<Vec<_>>();
        match Automaton::new(transitions, vec![g(0, 0)], finals) {
            Ok(aut) => {
                debug_assert!(aut.is_grid());
                aut
            }
            Err(e) => unreachable!("{}", e),
        }
    }
}

/// The Levenshtein distance between `a` and `b`: the minimum number of single token insertions,
/// deletions, and substitutions needed to turn `a` into `b`.
pub fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev = (0..=b.len()).collect::<Vec<_>>();
    let mut cur = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(x != y);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod test {
    use super::{LevBall, levenshtein};
    use crate::{StIdx, StateLabel};
    use cnfgrammar::TIdx;

    /// Every string over `{0, 1}` of length at most `len`.
    fn strings(len: usize) -> Vec<Vec<TIdx<u32>>> {
        let mut all = vec![vec![]];
        let mut last = vec![vec![]];
        for _ in 0..len {
            let mut next = Vec::new();
            for s in &last {
                for t in 0..2 {
                    let mut s = s.clone();
                    s.push(TIdx(t));
                    next.push(s);
                }
            }
            all.extend(next.iter().cloned());
            last = next;
        }
        all
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein::<u8>(&[], &[]), 0);
        assert_eq!(levenshtein("kitten".as_bytes(), "sitting".as_bytes()), 3);
        assert_eq!(levenshtein("abc".as_bytes(), "".as_bytes()), 3);
        assert_eq!(levenshtein("".as_bytes(), "ab".as_bytes()), 2);
        assert_eq!(levenshtein("ab".as_bytes(), "ba".as_bytes()), 2);
        assert_eq!(levenshtein("flaw".as_bytes(), "lawn".as_bytes()), 2);
    }

    #[test]
    fn test_shape() {
        let input = [TIdx(0u32), TIdx(1), TIdx(0)];
        let aut = LevBall::new(&input, 2).build();
        assert_eq!(aut.num_states(), 12);
        assert!(aut.is_grid());
        assert_eq!(aut.initials(), &[StIdx::from(0usize)]);
        assert_eq!(aut.label(aut.initials()[0]), StateLabel::grid(0, 0));
        let finals = aut.finals().map(|s| aut.label(s)).collect::<Vec<_>>();
        for l in [
            StateLabel::grid(1, 0),
            StateLabel::grid(2, 1),
            StateLabel::grid(3, 0),
            StateLabel::grid(3, 2),
        ] {
            assert!(finals.contains(&l));
        }
        assert!(!finals.contains(&StateLabel::grid(0, 0)));
        assert!(!finals.contains(&StateLabel::grid(1, 1)));
    }

    #[test]
    fn test_radius_zero() {
        let input = [TIdx(0u32), TIdx(1)];
        let aut = LevBall::new(&input, 0).alphabet(vec![TIdx(0), TIdx(1)]).build();
        assert_eq!(aut.num_states(), 3);
        assert_eq!(aut.edges().len(), 2);
        for w in strings(3) {
            assert_eq!(aut.accepts(&w), w == input);
        }
    }

    #[test]
    fn test_ball_language() {
        for input in [
            vec![],
            vec![TIdx(0u32)],
            vec![TIdx(0), TIdx(1)],
            vec![TIdx(1), TIdx(1), TIdx(0)],
        ] {
            for radius in 0..=2 {
                let aut = LevBall::new(&input, radius)
                    .alphabet(vec![TIdx(0), TIdx(1)])
                    .build();
                for w in strings(input.len() + radius + 1) {
                    assert_eq!(
                        aut.accepts(&w),
                        levenshtein(&input, &w) <= radius,
                        "input {:?} radius {} string {:?}",
                        input,
                        radius,
                        w
                    );
                }
            }
        }
    }

    #[test]
    fn test_default_alphabet() {
        let input = [TIdx(0u32), TIdx(0)];
        let aut = LevBall::new(&input, 1).build();
        // With the default alphabet only token 0 can be introduced.
        assert!(aut.accepts(&[TIdx(0), TIdx(0), TIdx(0)]));
        assert!(aut.accepts(&[TIdx(0)]));
        assert!(!aut.accepts(&[TIdx(0), TIdx(1)]));
        assert!(aut.edges().iter().all(|&(_, t, _)| t == TIdx(0)));
    }
}
