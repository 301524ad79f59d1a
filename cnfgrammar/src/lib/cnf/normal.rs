//! Normalisation of a validated [`GrammarAST`] into binary normal form. Everything here works on
//! names: index assignment (and the removal of useless rules, which needs indices) happens in
//! [`CnfGrammar::new_with_storaget`](super::CnfGrammar::new_with_storaget).

use indexmap::{IndexMap, IndexSet};

use super::ast::{self, GrammarAST};
use crate::Span;

/// The suffix used to build fresh rule names.
const FRESH: &str = "~";

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum NProd {
    Binary(String, String),
    Term(String),
}

/// A grammar in binary normal form, keyed by rule name. Rules appear in the order the user wrote
/// them, followed by fresh rules in the order they were created.
#[derive(Debug)]
pub(crate) struct NormalForm {
    pub(crate) start: String,
    pub(crate) rules: IndexMap<String, IndexSet<NProd>>,
    pub(crate) tokens: IndexSet<String>,
    pub(crate) spans: Vec<Span>,
    /// The span of the name of each rule the user wrote. Fresh rules have no span.
    pub(crate) rule_spans: IndexMap<String, Span>,
}

#[derive(Clone, Debug)]
enum Sym {
    Rule(String),
    Token(String),
}

struct Fresh<'a> {
    taken: &'a mut IndexMap<String, Vec<Vec<Sym>>>,
}

impl Fresh<'_> {
    /// Return a rule name starting with `base` which does not yet exist, and reserve it.
    fn name(&mut self, base: String) -> String {
        let mut n = base;
        while self.taken.contains_key(&n) {
            n += FRESH;
        }
        self.taken.insert(n.clone(), Vec::new());
        n
    }
}

pub(crate) fn normalise(ast: GrammarAST) -> NormalForm {
    let rule_spans = ast
        .rules
        .values()
        .map(|r| r.name.clone())
        .collect::<IndexMap<_, _>>();
    let mut rules = IndexMap::<String, Vec<Vec<Sym>>>::new();
    for (name, rule) in &ast.rules {
        let prods = rule
            .pidxs
            .iter()
            .map(|&pidx| {
                ast.prods[pidx]
                    .symbols
                    .iter()
                    .map(|s| match s {
                        ast::Symbol::Rule(n, _) => Sym::Rule(n.clone()),
                        ast::Symbol::Token(n, _) => Sym::Token(n.clone()),
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        rules.insert(name.clone(), prods);
    }

    term(&mut rules);
    bin(&mut rules);
    let rules = unit(&rules);

    NormalForm {
        // complete_and_validate guarantees that there is a start rule.
        start: ast.start.map(|(s, _)| s).unwrap_or_default(),
        rules,
        tokens: ast.tokens,
        spans: ast.spans,
        rule_spans,
    }
}

/// Replace each token in a production of length 2 or more with a rule whose sole production is
/// that token. Each token gets at most one such rule.
fn term(rules: &mut IndexMap<String, Vec<Vec<Sym>>>) {
    let mut token_rules = IndexMap::<String, String>::new();
    for ridx in 0..rules.len() {
        let mut prods = std::mem::take(&mut rules[ridx]);
        for prod in prods.iter_mut().filter(|p| p.len() > 1) {
            for sym in prod.iter_mut() {
                if let Sym::Token(t) = sym {
                    let n = match token_rules.get(t) {
                        Some(n) => n.clone(),
                        None => {
                            let n = Fresh { taken: &mut *rules }
                                .name(format!("T{}{}", FRESH, t));
                            rules[&n].push(vec![Sym::Token(t.clone())]);
                            token_rules.insert(t.clone(), n.clone());
                            n
                        }
                    };
                    *sym = Sym::Rule(n);
                }
            }
        }
        rules[ridx] = prods;
    }
}

/// Right-fold every production longer than 2 symbols: `A: X1 X2 ... Xn` becomes
/// `A: X1 A~1`, `A~1: X2 A~2`, ..., `A~{n-2}: X{n-1} Xn`.
fn bin(rules: &mut IndexMap<String, Vec<Vec<Sym>>>) {
    let mut ridx = 0;
    // Fresh rules are appended as we go, but never contain productions longer than 2.
    while ridx < rules.len() {
        let name = rules.get_index(ridx).map(|(n, _)| n.clone()).unwrap_or_default();
        let mut prods = std::mem::take(&mut rules[ridx]);
        let mut k = 0;
        for prod in prods.iter_mut().filter(|p| p.len() > 2) {
            let syms = std::mem::take(prod);
            let mut names = Vec::with_capacity(syms.len() - 2);
            for _ in 0..syms.len() - 2 {
                k += 1;
                let n = Fresh { taken: &mut *rules }.name(format!("{}{}{}", name, FRESH, k));
                names.push(n);
            }
            prod.push(syms[0].clone());
            prod.push(Sym::Rule(names[0].clone()));
            for (i, n) in names.iter().enumerate() {
                let rhs = match names.get(i + 1) {
                    Some(next) => Sym::Rule(next.clone()),
                    None => syms[syms.len() - 1].clone(),
                };
                rules[n].push(vec![syms[i + 1].clone(), rhs]);
            }
        }
        rules[ridx] = prods;
        ridx += 1;
    }
}

/// Remove unit productions `A: B` by giving `A` every non-unit production of every rule it can
/// reach through unit productions alone.
fn unit(rules: &IndexMap<String, Vec<Vec<Sym>>>) -> IndexMap<String, IndexSet<NProd>> {
    let mut out = IndexMap::with_capacity(rules.len());
    for name in rules.keys() {
        let mut seen = IndexSet::new();
        seen.insert(name.as_str());
        let mut todo = vec![name.as_str()];
        let mut prods = IndexSet::new();
        while let Some(n) = todo.pop() {
            for prod in &rules[n] {
                match prod.as_slice() {
                    [Sym::Rule(b)] => {
                        if seen.insert(b.as_str()) {
                            todo.push(b.as_str());
                        }
                    }
                    [Sym::Token(t)] => {
                        prods.insert(NProd::Term(t.clone()));
                    }
                    [Sym::Rule(b), Sym::Rule(c)] => {
                        prods.insert(NProd::Binary(b.clone(), c.clone()));
                    }
                    _ => unreachable!(),
                }
            }
        }
        out.insert(name.clone(), prods);
    }
    out
}
