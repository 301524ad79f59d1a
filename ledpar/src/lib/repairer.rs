use std::{fmt::Debug, hash::Hash};

use cnfgrammar::{CnfGrammar, TIdx};
use indexmap::IndexSet;
use log::debug;
use num_traits::{AsPrimitive, PrimInt, Unsigned};

use crate::{
    Automaton, Forest, IntersectionError, IntersectionGrammar, LevBall, bitchart, forest,
    intersect, levenshtein, nonempty,
};

/// How a [`Repairer`] decides whether a grammar and an edit-distance ball intersect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// Run a boolean CYK parse over the ball's states, stopping at the first accepting cell.
    Cyk,
    /// Materialise the Bar-Hillel intersection grammar and check that it is non-empty.
    BarHillel,
}

/// The result of a language edit distance search.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Led {
    /// The input is this many edits away from the grammar's language.
    Found(usize),
    /// No string of the grammar's language is within this many edits of the input.
    UpperBoundExceeded(usize),
}

impl Led {
    pub fn found(&self) -> bool {
        matches!(self, Led::Found(_))
    }

    /// The distance found, or the bound which was exceeded.
    pub fn radius(&self) -> usize {
        match *self {
            Led::Found(d) | Led::UpperBoundExceeded(d) => d,
        }
    }
}

pub struct RepairerBuilder<'a, StorageT> {
    grm: &'a CnfGrammar<StorageT>,
    max_radius: usize,
    alphabet: Option<Vec<TIdx<StorageT>>>,
    strategy: Strategy,
    template: bool,
}

impl<'a, StorageT: 'static + Debug + Hash + PrimInt + Unsigned> RepairerBuilder<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create a builder for repairing inputs against `grm`. By default: the maximum radius is 4;
    /// edits can introduce any of `grm`'s tokens and any token of the input; nonemptiness is
    /// decided with [`Strategy::Cyk`]; and forests are built using a pruning template.
    pub fn new(grm: &'a CnfGrammar<StorageT>) -> Self {
        RepairerBuilder {
            grm,
            max_radius: 4,
            alphabet: None,
            strategy: Strategy::Cyk,
            template: true,
        }
    }

    /// The largest radius [`Repairer::led`] will try.
    pub fn max_radius(mut self, max_radius: usize) -> Self {
        self.max_radius = max_radius;
        self
    }

    /// The tokens which substitutions and insertions may introduce.
    pub fn alphabet(mut self, alphabet: Vec<TIdx<StorageT>>) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// If true, forests are built in two passes: a boolean CYK pass works out which cells take
    /// part in an accepting derivation, and the forest pass only visits those cells.
    pub fn template(mut self, template: bool) -> Self {
        self.template = template;
        self
    }

    pub fn build(self) -> Repairer<'a, StorageT> {
        Repairer {
            grm: self.grm,
            max_radius: self.max_radius,
            alphabet: self.alphabet,
            strategy: self.strategy,
            template: self.template,
        }
    }
}

/// Searches for the nearest strings of a grammar's language to an input. Inputs are sequences of
/// token names; names which aren't tokens of the grammar are allowed (and can only be repaired
/// by deleting or substituting them).
pub struct Repairer<'a, StorageT> {
    grm: &'a CnfGrammar<StorageT>,
    max_radius: usize,
    alphabet: Option<Vec<TIdx<StorageT>>>,
    strategy: Strategy,
    template: bool,
}

impl<'a, StorageT: 'static + Debug + Hash + PrimInt + Unsigned> Repairer<'a, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    fn ball_tidxs(&self, toks: &[TIdx<StorageT>], radius: usize) -> Automaton<StorageT> {
        let alphabet = match self.alphabet {
            Some(ref a) => a.clone(),
            None => self
                .grm
                .iter_tidxs()
                .chain(toks.iter().copied())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
        };
        LevBall::new(toks, radius).alphabet(alphabet).build()
    }

    /// Build the edit-distance ball of `radius` around `input`.
    pub fn ball(&self, input: &[&str], radius: usize) -> Automaton<StorageT> {
        let (toks, _) = self.grm.token_idxs(input);
        self.ball_tidxs(&toks, radius)
    }

    /// Intersect the grammar with the edit-distance ball of `radius` around `input`.
    pub fn intersect(
        &self,
        input: &[&str],
        radius: usize,
    ) -> Result<IntersectionGrammar<StorageT>, IntersectionError> {
        intersect(self.grm, &self.ball(input, radius))
    }

    fn led_tidxs(&self, toks: &[TIdx<StorageT>]) -> Led {
        for radius in 0..=self.max_radius {
            let aut = self.ball_tidxs(toks, radius);
            let found = match self.strategy {
                Strategy::Cyk => nonempty(self.grm, &aut),
                Strategy::BarHillel => intersect(self.grm, &aut).is_ok(),
            };
            debug!(
                "LED: radius {} ({} states, {} edges): {}",
                radius,
                aut.num_states(),
                aut.edges().len(),
                if found { "non-empty" } else { "empty" }
            );
            if found {
                return Led::Found(radius);
            }
        }
        Led::UpperBoundExceeded(self.max_radius)
    }

    /// Find the language edit distance of `input`: the smallest radius, up to and including the
    /// maximum radius, at which the grammar's language and the edit-distance ball around `input`
    /// intersect.
    pub fn led(&self, input: &[&str]) -> Led {
        let (toks, _) = self.grm.token_idxs(input);
        self.led_tidxs(&toks)
    }

    /// Find the language edit distance of `input` and build the forest of every derivation of a
    /// string at that distance. Returns `None` if the upper bound is exceeded.
    pub fn repairs(&self, input: &[&str]) -> Option<Repairs<'a, StorageT>> {
        let (toks, _) = self.grm.token_idxs(input);
        let radius = match self.led_tidxs(&toks) {
            Led::Found(d) => d,
            Led::UpperBoundExceeded(_) => return None,
        };
        let aut = self.ball_tidxs(&toks, radius);
        let forest = if self.template {
            let tmpl = bitchart(self.grm, &aut).template(self.grm, &aut);
            forest(self.grm, &aut, Some(&tmpl))?
        } else {
            forest(self.grm, &aut, None)?
        };
        debug!(
            "Repairs: radius {}, {} forest nodes, {} derivations",
            radius,
            forest.nodes().len(),
            forest.count()
        );
        Some(Repairs {
            grm: self.grm,
            input: toks,
            radius,
            forest,
        })
    }
}

/// The repairs of an input at its language edit distance.
pub struct Repairs<'a, StorageT> {
    grm: &'a CnfGrammar<StorageT>,
    input: Vec<TIdx<StorageT>>,
    radius: usize,
    forest: Forest<StorageT>,
}

impl<StorageT: 'static + Debug + Hash + PrimInt + Unsigned> Repairs<'_, StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// The language edit distance of the input.
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn forest(&self) -> &Forest<StorageT> {
        &self.forest
    }

    /// The input, as token indices (see [`CnfGrammar::token_idxs`]).
    pub fn input(&self) -> &[TIdx<StorageT>] {
        &self.input
    }

    /// Return the distinct repairs as token names, ordered by their Levenshtein distance to the
    /// input and then lexicographically. At most `limit` repairs are returned if `limit` is not
    /// `None`; enumeration still visits every derivation.
    pub fn ranked(&self, limit: Option<usize>) -> Vec<Vec<String>> {
        let mut rprs = self
            .forest
            .sentences()
            .map(|toks| {
                let d = levenshtein(&self.input, &toks);
                let names = toks
                    .iter()
                    .map(|t| self.grm.token_name(*t).to_string())
                    .collect::<Vec<_>>();
                (d, names)
            })
            .collect::<Vec<_>>();
        rprs.sort();
        if let Some(l) = limit {
            rprs.truncate(l);
        }
        rprs.into_iter().map(|(_, names)| names).collect()
    }
}

#[cfg(test)]
mod test {
    use super::{Led, RepairerBuilder, Strategy};
    use cnfgrammar::CnfGrammar;

    #[test]
    fn test_led() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        let rpr = RepairerBuilder::new(&grm).build();
        assert_eq!(rpr.led(&["a", "b"]), Led::Found(0));
        assert_eq!(rpr.led(&["a", "a", "b"]), Led::Found(1));
        assert_eq!(rpr.led(&["b", "a"]), Led::Found(2));
        assert_eq!(rpr.led(&[]), Led::Found(2));
        assert_eq!(rpr.led(&["a", "x", "b"]), Led::Found(1));
        let rpr = RepairerBuilder::new(&grm).max_radius(1).build();
        let led = rpr.led(&["b", "a"]);
        assert_eq!(led, Led::UpperBoundExceeded(1));
        assert!(!led.found());
        assert_eq!(led.radius(), 1);
    }

    #[test]
    fn test_strategies_agree() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b' | S S;").unwrap();
        let cyk = RepairerBuilder::new(&grm).max_radius(3).build();
        let bh = RepairerBuilder::new(&grm)
            .max_radius(3)
            .strategy(Strategy::BarHillel)
            .build();
        for input in [
            &["a"][..],
            &["b", "b"],
            &["a", "b", "b"],
            &["a", "b", "a"],
            &["b", "a", "b", "a"],
        ] {
            assert_eq!(cyk.led(input), bh.led(input), "{:?}", input);
        }
    }

    #[test]
    fn test_repairs() {
        let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b';").unwrap();
        for template in [true, false] {
            let rpr = RepairerBuilder::new(&grm).template(template).build();
            let rprs = rpr.repairs(&["a", "a", "b"]).unwrap();
            assert_eq!(rprs.radius(), 1);
            assert_eq!(rprs.input().len(), 3);
            assert_eq!(
                rprs.ranked(None),
                vec![vec!["a", "a", "b", "b"], vec!["a", "b"]]
            );
            assert_eq!(rprs.ranked(Some(1)).len(), 1);
        }
        let rpr = RepairerBuilder::new(&grm).max_radius(0).build();
        assert!(rpr.repairs(&["a", "a", "b"]).is_none());
    }

    #[test]
    fn test_alphabet() {
        let grm = CnfGrammar::new("%%\nS: 'a' 'b' | 'c';").unwrap();
        let a = grm.token_idx("a").unwrap();
        let b = grm.token_idx("b").unwrap();
        // Without 'c' in the alphabet, "x" must become "a b".
        let rpr = RepairerBuilder::new(&grm).alphabet(vec![a, b]).build();
        assert_eq!(rpr.led(&["x"]), Led::Found(2));
        let rpr = RepairerBuilder::new(&grm).build();
        assert_eq!(rpr.led(&["x"]), Led::Found(1));
        assert_eq!(rpr.repairs(&["x"]).unwrap().ranked(None), vec![vec!["c"]]);
    }

    #[test]
    fn test_ball_and_intersect() {
        let grm = CnfGrammar::new("%%\nS: 'a' 'b';").unwrap();
        let rpr = RepairerBuilder::new(&grm).build();
        let aut = rpr.ball(&["a", "b"], 1);
        assert_eq!(aut.num_states(), 6);
        assert!(rpr.intersect(&["a", "b"], 0).is_ok());
        assert!(rpr.intersect(&["b", "a"], 1).is_err());
        assert!(rpr.intersect(&["b", "a"], 2).is_ok());
    }
}
