use std::collections::HashMap;

use indexmap::IndexSet;
use num_traits::{self, AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{CnfGrammarError, normal, parser::CnfParser, useful::Usefulness};
use crate::{PIdx, RIdx, Span, Symbol, TIdx};

/// A production in binary normal form.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CnfProd<StorageT> {
    /// `A: B C`.
    Binary(RIdx<StorageT>, RIdx<StorageT>),
    /// `A: 't'`.
    Term(TIdx<StorageT>),
}

impl<StorageT: Copy> CnfProd<StorageT> {
    /// The symbols on the right hand side of this production.
    pub fn symbols(&self) -> Vec<Symbol<StorageT>> {
        match *self {
            CnfProd::Binary(b, c) => vec![Symbol::Rule(b), Symbol::Rule(c)],
            CnfProd::Term(t) => vec![Symbol::Token(t)],
        }
    }
}

/// Representation of a `CnfGrammar`. See the [top-level documentation](../../index.html) for the
/// guarantees this struct makes about rules, tokens, and productions.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CnfGrammar<StorageT = u32> {
    /// A mapping from `RIdx` -> name.
    rule_names: IndexSet<String>,
    /// A mapping from `RIdx` -> the span of the rule's name in the grammar source. Fresh rules,
    /// and grammars not built from source, have no spans.
    rule_spans: Vec<Option<Span>>,
    start_rule: RIdx<StorageT>,
    /// A mapping from `TIdx` -> name.
    token_names: IndexSet<String>,
    /// A mapping from `TIdx` -> the span of the token's first occurrence in the grammar source (if
    /// the grammar was built from source).
    token_spans: Vec<Option<Span>>,
    prods: Vec<CnfProd<StorageT>>,
    /// A mapping from productions to their corresponding rule indexes.
    prods_rules: Vec<RIdx<StorageT>>,
    /// A mapping from rules to their productions. Productions are not necessarily stored
    /// sequentially.
    rules_prods: Vec<Vec<PIdx<StorageT>>>,
    /// For each rule `A`, the right hand sides of its binary productions.
    binary_rules: Vec<Vec<(RIdx<StorageT>, RIdx<StorageT>)>>,
    /// Every binary production as `(A, B, C)`, in production order.
    binary_prods: Vec<(RIdx<StorageT>, RIdx<StorageT>, RIdx<StorageT>)>,
    /// For each token `t`, the rules `A` with a production `A: 't'`.
    token_rules: Vec<Vec<RIdx<StorageT>>>,
}

impl CnfGrammar<u32> {
    pub fn new(s: &str) -> Result<Self, Vec<CnfGrammarError>> {
        CnfGrammar::new_with_storaget(s)
    }
}

impl<StorageT: 'static + PrimInt + Unsigned> CnfGrammar<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Takes as input a grammar `s` and returns a [`CnfGrammar`] in binary normal form (or every
    /// [`CnfGrammarError`] found in `s`).
    ///
    /// Normalisation adds fresh rules (named `T~a` for the token `a`, and `A~1`, `A~2`, ... when
    /// splitting long productions of `A`) and removes rules which can never take part in a
    /// derivation of a sentence from the start rule. The start rule always survives, even if it
    /// is left with no productions.
    pub fn new_with_storaget(s: &str) -> Result<Self, Vec<CnfGrammarError>> {
        let mut cp = CnfParser::new(s.to_string());
        cp.parse()?;
        let mut ast = cp.ast();
        ast.complete_and_validate()?;
        let nf = normal::normalise(ast);

        // Check that StorageT is big enough to hold RIdx/PIdx/TIdx values; after these checks
        // from_parts can safely convert with as_().
        let prods_len = nf.rules.values().map(|x| x.len()).sum::<usize>();
        if nf.rules.len() > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's rules.");
        }
        if nf.tokens.len() > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's tokens.");
        }
        if prods_len > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's productions.");
        }

        let ridx = |n: &str| RIdx(nf.rules.get_index_of(n).unwrap().as_());
        let tidx = |n: &str| TIdx(nf.tokens.get_index_of(n).unwrap().as_());
        let mut prods = Vec::with_capacity(prods_len);
        for (lhs, rule_prods) in &nf.rules {
            for prod in rule_prods {
                let p = match prod {
                    normal::NProd::Binary(b, c) => CnfProd::Binary(ridx(b), ridx(c)),
                    normal::NProd::Term(t) => CnfProd::Term(tidx(t)),
                };
                prods.push((ridx(lhs), p));
            }
        }
        let mut grm = CnfGrammar::from_parts(
            nf.rules.keys().cloned().collect(),
            ridx(&nf.start),
            nf.tokens.iter().cloned().collect(),
            prods,
        );
        grm.rule_spans = nf
            .rules
            .keys()
            .map(|n| nf.rule_spans.get(n).copied())
            .collect();
        grm.token_spans = nf.spans.into_iter().map(Some).collect();
        Ok(grm.prune())
    }

    /// Build a grammar directly from its parts: `prods` is a list of `(lhs, production)` pairs.
    /// Useless rules are *not* removed (see [`prune`](CnfGrammar::prune)).
    ///
    /// # Panics
    ///
    /// If a name appears twice in `rule_names` or `token_names`, if an index is out of range, or
    /// if `StorageT` is too small to index the grammar.
    pub fn from_parts(
        rule_names: Vec<String>,
        start_rule: RIdx<StorageT>,
        token_names: Vec<String>,
        prods: Vec<(RIdx<StorageT>, CnfProd<StorageT>)>,
    ) -> Self {
        let max = num_traits::cast::<StorageT, usize>(StorageT::max_value()).unwrap();
        if rule_names.len() > max || token_names.len() > max || prods.len() > max {
            panic!("StorageT is not big enough to store this grammar.");
        }
        let rules_len = rule_names.len();
        let tokens_len = token_names.len();
        let rule_names = rule_names.into_iter().collect::<IndexSet<_>>();
        let token_names = token_names.into_iter().collect::<IndexSet<_>>();
        if rule_names.len() != rules_len || token_names.len() != tokens_len {
            panic!("Duplicate rule or token name.");
        }
        if usize::from(start_rule) >= rules_len {
            panic!("Start rule out of range.");
        }

        let mut rules_prods = vec![Vec::new(); rules_len];
        let mut binary_rules = vec![Vec::new(); rules_len];
        let mut token_rules = vec![Vec::new(); tokens_len];
        let mut binary_prods = Vec::new();
        let mut prods_rules = Vec::with_capacity(prods.len());
        let mut cnf_prods = Vec::with_capacity(prods.len());
        for (i, (lhs, prod)) in prods.into_iter().enumerate() {
            rules_prods[usize::from(lhs)].push(PIdx(i.as_()));
            match prod {
                CnfProd::Binary(b, c) => {
                    if usize::from(b) >= rules_len || usize::from(c) >= rules_len {
                        panic!("Rule index out of range.");
                    }
                    binary_rules[usize::from(lhs)].push((b, c));
                    binary_prods.push((lhs, b, c));
                }
                CnfProd::Term(t) => {
                    let rules = &mut token_rules[usize::from(t)];
                    if !rules.contains(&lhs) {
                        rules.push(lhs);
                    }
                }
            }
            prods_rules.push(lhs);
            cnf_prods.push(prod);
        }

        CnfGrammar {
            rule_names,
            rule_spans: vec![None; rules_len],
            start_rule,
            token_names,
            token_spans: vec![None; tokens_len],
            prods: cnf_prods,
            prods_rules,
            rules_prods,
            binary_rules,
            binary_prods,
            token_rules,
        }
    }

    /// Return a grammar which contains only this grammar's useful rules (see [`Usefulness`]) and
    /// the start rule. Rule indices are renumbered densely, in their existing order; token
    /// indices are unchanged.
    pub fn prune(self) -> Self {
        let u = Usefulness::new(&self);
        if u.all_useful() {
            return self;
        }
        let keep = |r: RIdx<StorageT>| r == self.start_rule || u.is_useful(r);
        let mut map = vec![None; usize::from(self.rules_len())];
        let mut names = Vec::new();
        let mut rule_spans = Vec::new();
        for ridx in self.iter_rules().filter(|r| keep(*r)) {
            map[usize::from(ridx)] = Some(RIdx(names.len().as_()));
            names.push(self.rule_name_str(ridx).to_string());
            rule_spans.push(self.rule_spans[usize::from(ridx)]);
        }
        let mut prods = Vec::new();
        for pidx in self.iter_pidxs() {
            // A start rule which isn't useful keeps its name but loses all its productions.
            match (map[usize::from(self.prod_to_rule(pidx))], self.prod(pidx)) {
                (Some(lhs), CnfProd::Binary(b, c)) if u.is_useful(b) && u.is_useful(c) => {
                    if let (Some(b), Some(c)) = (map[usize::from(b)], map[usize::from(c)]) {
                        prods.push((lhs, CnfProd::Binary(b, c)));
                    }
                }
                (Some(lhs), CnfProd::Term(t)) => prods.push((lhs, CnfProd::Term(t))),
                _ => (),
            }
        }
        let start = map[usize::from(self.start_rule)].unwrap_or(RIdx(StorageT::zero()));
        let tokens = self.token_names.into_iter().collect();
        let mut grm = CnfGrammar::from_parts(names, start, tokens, prods);
        grm.rule_spans = rule_spans;
        grm.token_spans = self.token_spans;
        grm
    }

    /// How many productions does this grammar have?
    pub fn prods_len(&self) -> PIdx<StorageT> {
        PIdx(self.prods.len().as_())
    }

    /// Return an iterator which produces (in order from `0..self.prods_len()`) all this
    /// grammar's valid `PIdx`s.
    pub fn iter_pidxs(&self) -> impl Iterator<Item = PIdx<StorageT>> + use<StorageT> {
        // We can use as_ safely, because we know that we're only generating integers from
        // 0..self.prods_len() and, since prods_len() returns a PIdx<StorageT>, then by
        // definition the integers we're creating fit within StorageT.
        (0..self.prods.len()).map(|x| PIdx(x.as_()))
    }

    /// Get production `pidx`. Panics if `pidx` doesn't exist.
    pub fn prod(&self, pidx: PIdx<StorageT>) -> CnfProd<StorageT> {
        self.prods[usize::from(pidx)]
    }

    /// Return the rule index of the production `pidx`. Panics if `pidx` doesn't exist.
    pub fn prod_to_rule(&self, pidx: PIdx<StorageT>) -> RIdx<StorageT> {
        self.prods_rules[usize::from(pidx)]
    }

    /// How many rules does this grammar have?
    pub fn rules_len(&self) -> RIdx<StorageT> {
        RIdx(self.rule_names.len().as_())
    }

    /// Return an iterator which produces (in order from `0..self.rules_len()`) all this
    /// grammar's valid `RIdx`s.
    pub fn iter_rules(&self) -> impl Iterator<Item = RIdx<StorageT>> + use<StorageT> {
        (0..self.rule_names.len()).map(|x| RIdx(x.as_()))
    }

    /// Return the productions for rule `ridx`. Panics if `ridx` doesn't exist.
    pub fn rule_to_prods(&self, ridx: RIdx<StorageT>) -> &[PIdx<StorageT>] {
        &self.rules_prods[usize::from(ridx)]
    }

    /// Return the name of rule `ridx`. Panics if `ridx` doesn't exist.
    pub fn rule_name_str(&self, ridx: RIdx<StorageT>) -> &str {
        &self.rule_names[usize::from(ridx)]
    }

    /// Return the span of rule `ridx`'s name in the grammar source, or `None` if the rule was
    /// created by normalisation or the grammar was not built from source. Panics if `ridx`
    /// doesn't exist.
    pub fn rule_name_span(&self, ridx: RIdx<StorageT>) -> Option<Span> {
        self.rule_spans[usize::from(ridx)]
    }

    /// Return the index of the rule named `n` or `None` if it doesn't exist.
    pub fn rule_idx(&self, n: &str) -> Option<RIdx<StorageT>> {
        // The call to as_() is safe because rule_names is guaranteed to be small enough to fit
        // into StorageT
        self.rule_names.get_index_of(n).map(|x| RIdx(x.as_()))
    }

    /// What is the index of the start rule?
    pub fn start_rule_idx(&self) -> RIdx<StorageT> {
        self.start_rule
    }

    /// How many tokens does this grammar have?
    pub fn tokens_len(&self) -> TIdx<StorageT> {
        TIdx(self.token_names.len().as_())
    }

    /// Return an iterator which produces (in order from `0..self.tokens_len()`) all this
    /// grammar's valid `TIdx`s.
    pub fn iter_tidxs(&self) -> impl Iterator<Item = TIdx<StorageT>> + use<StorageT> {
        (0..self.token_names.len()).map(|x| TIdx(x.as_()))
    }

    /// Return the name of token `tidx`. Panics if `tidx` doesn't exist.
    pub fn token_name(&self, tidx: TIdx<StorageT>) -> &str {
        &self.token_names[usize::from(tidx)]
    }

    /// Return the span of the first occurrence of token `tidx` in the grammar source, or `None`
    /// if the grammar was not built from source. Panics if `tidx` doesn't exist.
    pub fn token_span(&self, tidx: TIdx<StorageT>) -> Option<Span> {
        self.token_spans[usize::from(tidx)]
    }

    /// Return the index of the token named `n` or `None` if it doesn't exist.
    pub fn token_idx(&self, n: &str) -> Option<TIdx<StorageT>> {
        self.token_names.get_index_of(n).map(|x| TIdx(x.as_()))
    }

    /// Returns a map from names to `TIdx`s of all this grammar's tokens.
    pub fn tokens_map(&self) -> HashMap<&str, TIdx<StorageT>> {
        self.iter_tidxs()
            .map(|tidx| (self.token_name(tidx), tidx))
            .collect()
    }

    /// Map the token names `toks` to indices. Names which are not tokens of this grammar are
    /// given fresh indices starting at `tokens_len()`, in order of first appearance, and the
    /// second element of the result lists those names (so foreign token `k` has index
    /// `tokens_len() + k`). Foreign tokens are never produced by any rule (see
    /// [`token_rules`](CnfGrammar::token_rules)). Panics if a foreign token's index does not fit
    /// in `StorageT`.
    pub fn token_idxs(&self, toks: &[&str]) -> (Vec<TIdx<StorageT>>, Vec<String>) {
        let mut foreign = IndexSet::<&str>::new();
        let tidxs = toks
            .iter()
            .map(|t| match self.token_idx(t) {
                Some(tidx) => tidx,
                None => {
                    let (i, _) = foreign.insert_full(t);
                    match num_traits::cast(self.token_names.len() + i) {
                        Some(x) => TIdx(x),
                        None => panic!("StorageT is not big enough to store this input's tokens."),
                    }
                }
            })
            .collect();
        (tidxs, foreign.into_iter().map(|x| x.to_string()).collect())
    }

    /// For every binary production `A: B C` of rule `ridx`, return `(B, C)`. Panics if `ridx`
    /// doesn't exist.
    pub fn binary_rules(&self, ridx: RIdx<StorageT>) -> &[(RIdx<StorageT>, RIdx<StorageT>)] {
        &self.binary_rules[usize::from(ridx)]
    }

    /// Every binary production `A: B C` as `(A, B, C)`.
    pub fn binary_prods(&self) -> &[(RIdx<StorageT>, RIdx<StorageT>, RIdx<StorageT>)] {
        &self.binary_prods
    }

    /// Return the rules `A` with a production `A: 't'` where `t` is `tidx`. Indices at or beyond
    /// `tokens_len()` are foreign to the grammar and have no such rules.
    pub fn token_rules(&self, tidx: TIdx<StorageT>) -> &[RIdx<StorageT>] {
        self.token_rules
            .get(usize::from(tidx))
            .map(|x| x.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the string representation of a given production `pidx`.
    pub fn pp_prod(&self, pidx: PIdx<StorageT>) -> String {
        let mut sprod = String::new();
        sprod.push_str(self.rule_name_str(self.prod_to_rule(pidx)));
        sprod.push(':');
        match self.prod(pidx) {
            CnfProd::Binary(b, c) => {
                sprod.push_str(&format!(
                    " {} {}",
                    self.rule_name_str(b),
                    self.rule_name_str(c)
                ));
            }
            CnfProd::Term(t) => sprod.push_str(&format!(" '{}'", self.token_name(t))),
        }
        sprod
    }

    /// Pretty print the grammar in Yacc style: the start rule's productions come first, and every
    /// other rule's productions follow in rule order. Rules without productions are omitted.
    pub fn pp(&self) -> String {
        let mut s = format!("%start {}\n%%\n", self.rule_name_str(self.start_rule));
        let order = Some(self.start_rule)
            .into_iter()
            .chain(self.iter_rules().filter(|r| *r != self.start_rule));
        for ridx in order {
            let pidxs = self.rule_to_prods(ridx);
            if pidxs.is_empty() {
                continue;
            }
            s.push_str(self.rule_name_str(ridx));
            s.push(':');
            for (i, pidx) in pidxs.iter().enumerate() {
                if i > 0 {
                    s.push_str("\n  |");
                }
                let pp = self.pp_prod(*pidx);
                s.push_str(&pp[self.rule_name_str(ridx).len() + 1..]);
            }
            s.push_str(";\n");
        }
        s
    }
}
