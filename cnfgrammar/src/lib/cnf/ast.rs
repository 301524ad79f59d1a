// Copyright (c) 2017 King's College London
// created by the Software Development Team <http://soft-dev.org/>
//
// The Universal Permissive License (UPL), Version 1.0
//
// Subject to the condition set forth below, permission is hereby granted to any person obtaining a
// copy of this software, associated documentation and/or data (collectively the "Software"), free
// of charge and under any and all copyright rights in the Software, and any and all patent rights
// owned or freely licensable by each licensor hereunder covering either (i) the unmodified
// Software as contributed to or provided by such licensor, or (ii) the Larger Works (as defined
// below), to deal in both
//
// (a) the Software, and
// (b) any piece of software and/or hardware listed in the lrgrwrks.txt file
// if one is included with the Software (each a "Larger Work" to which the Software is contributed
// by such licensors),
//
// without restriction, including without limitation the rights to copy, create derivative works
// of, display, perform, and distribute the Software and make, use, sell, offer for sale, import,
// export, have made, and have sold the Software and the Larger Work(s), and to sublicense the
// foregoing rights on either these or other terms.
//
// This license is subject to the following condition: The above copyright notice and either this
// complete permission notice or at a minimum a reference to the UPL must be included in all copies
// or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use indexmap::{IndexMap, IndexSet};

use super::{CnfGrammarError, CnfGrammarErrorKind};
use crate::Span;

/// An AST representing a grammar exactly as the user wrote it (i.e. before normalisation). This
/// is built up gradually by the parser: when it is finished, `complete_and_validate` must be
/// called exactly once.
#[derive(Debug)]
pub(crate) struct GrammarAST {
    pub(crate) start: Option<(String, Span)>,
    // Using an IndexMap means that we retain the order of rules as they're found in the input.
    pub(crate) rules: IndexMap<String, Rule>,
    pub(crate) prods: Vec<Production>,
    pub(crate) tokens: IndexSet<String>,
    /// The span of each token's first occurrence (in the same order as `tokens`).
    pub(crate) spans: Vec<Span>,
}

#[derive(Debug)]
pub(crate) struct Rule {
    pub(crate) name: (String, Span),
    /// Indexes into `GrammarAST::prods`.
    pub(crate) pidxs: Vec<usize>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct Production {
    pub(crate) symbols: Vec<Symbol>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Symbol {
    Rule(String, Span),
    Token(String, Span),
}

impl GrammarAST {
    pub(crate) fn new() -> GrammarAST {
        GrammarAST {
            start: None,
            rules: IndexMap::new(),
            prods: Vec::new(),
            tokens: IndexSet::new(),
            spans: Vec::new(),
        }
    }

    pub(crate) fn add_rule(&mut self, (name, name_span): (String, Span)) {
        self.rules.entry(name.clone()).or_insert_with(|| Rule {
            name: (name, name_span),
            pidxs: Vec::new(),
        });
    }

    pub(crate) fn add_prod(&mut self, rule_name: String, symbols: Vec<Symbol>) {
        self.rules[&rule_name].pidxs.push(self.prods.len());
        self.prods.push(Production { symbols });
    }

    pub(crate) fn add_token(&mut self, name: String, span: Span) {
        if self.tokens.insert(name) {
            self.spans.push(span);
        }
    }

    pub(crate) fn get_rule(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }

    /// After the AST has been populated, perform any final operations, and validate the grammar
    /// checking that:
    ///   1) The start rule references a rule in the grammar
    ///   2) Every rule reference references a rule in the grammar
    ///
    /// Every error found is returned, not just the first.
    pub(crate) fn complete_and_validate(&mut self) -> Result<(), Vec<CnfGrammarError>> {
        let mut errs = Vec::new();
        match self.start {
            None => errs.push(CnfGrammarError {
                kind: CnfGrammarErrorKind::NoStartRule,
                span: Span::at(0),
            }),
            Some((ref s, span)) => {
                if !self.rules.contains_key(s) {
                    errs.push(CnfGrammarError {
                        kind: CnfGrammarErrorKind::InvalidStartRule(s.clone()),
                        span,
                    });
                }
            }
        }
        for rule in self.rules.values() {
            for &pidx in &rule.pidxs {
                for sym in &self.prods[pidx].symbols {
                    if let Symbol::Rule(name, span) = sym {
                        if !self.rules.contains_key(name) {
                            errs.push(CnfGrammarError {
                                kind: CnfGrammarErrorKind::UnknownRuleRef(name.clone()),
                                span: *span,
                            });
                        }
                    }
                }
            }
        }
        if errs.is_empty() { Ok(()) } else { Err(errs) }
    }
}
