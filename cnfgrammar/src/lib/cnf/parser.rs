use lazy_static::lazy_static;
use regex::Regex;

type CnfResult<T> = Result<T, CnfGrammarError>;

use crate::Span;

use super::{
    CnfGrammarError, CnfGrammarErrorKind,
    ast::{GrammarAST, Symbol},
};

pub(crate) struct CnfParser {
    src: String,
    ast: GrammarAST,
    duplicate_start_declarations: Option<(Span, Vec<Span>)>,
    /// Errors which don't stop parsing: these are reported alongside whatever else goes wrong.
    deferred: Vec<CnfGrammarError>,
}

lazy_static! {
    static ref RE_NAME: Regex = Regex::new(r"^[a-zA-Z_.][a-zA-Z0-9_.]*").unwrap();
    static ref RE_TOKEN: Regex =
        Regex::new("^(?:(\".+?\")|('.+?')|([a-zA-Z_][a-zA-Z_0-9]*))").unwrap();
}

impl CnfParser {
    pub(crate) fn new(src: String) -> CnfParser {
        CnfParser {
            src,
            ast: GrammarAST::new(),
            duplicate_start_declarations: None,
            deferred: Vec::new(),
        }
    }

    pub(crate) fn parse(&mut self) -> Result<usize, Vec<CnfGrammarError>> {
        // `i` is always a byte index into self.src which points to the beginning of a UTF-8
        // character.
        let mut errors = Vec::new();
        let i = self.parse_declarations(0);
        if let Some((orig_span, spans)) = &self.duplicate_start_declarations {
            errors.push(CnfGrammarError {
                kind: CnfGrammarErrorKind::DuplicateStartDeclaration(spans.clone()),
                span: *orig_span,
            });
        }
        let i = match i {
            Ok(i) => i,
            Err(e) => {
                errors.push(e);
                return Err(errors);
            }
        };

        let i = self.parse_rules(i).and_then(|i| self.parse_programs(i));
        errors.append(&mut self.deferred);
        match i {
            Err(e) => {
                errors.push(e);
                Err(errors)
            }
            Ok(i) if errors.is_empty() => Ok(i),
            Ok(_) => Err(errors),
        }
    }

    pub(crate) fn ast(self) -> GrammarAST {
        self.ast
    }

    fn parse_declarations(&mut self, mut i: usize) -> CnfResult<usize> {
        i = self.parse_ws(i, true)?;
        while i < self.src.len() {
            if self.lookahead_is("%%", i).is_some() {
                return Ok(i);
            }
            if let Some(j) = self.lookahead_is("%token", i) {
                i = self.parse_ws(j, false)?;
                while i < self.src.len() {
                    if self.lookahead_is("%", i).is_some() {
                        break;
                    }
                    let (j, n, span) = self.parse_token(i)?;
                    self.ast.add_token(n, span);
                    i = self.parse_ws(j, true)?;
                }
                continue;
            }
            if let Some(j) = self.lookahead_is("%start", i) {
                i = self.parse_ws(j, false)?;
                let (j, n) = self.parse_name(i)?;
                let span = Span::new(i, j);
                if let Some((_, orig_span)) = self.ast.start {
                    self.duplicate_start_declarations
                        .get_or_insert_with(|| (orig_span, Vec::new()))
                        .1
                        .push(span)
                } else {
                    self.ast.start = Some((n, span));
                }
                i = self.parse_ws(j, true)?;
                continue;
            }
            return Err(self.mk_error(CnfGrammarErrorKind::UnknownDeclaration, i));
        }
        Err(self.mk_error(CnfGrammarErrorKind::PrematureEnd, i.saturating_sub(1)))
    }

    fn parse_rules(&mut self, mut i: usize) -> CnfResult<usize> {
        // self.parse_declarations should have left the input at '%%'
        i = match self.lookahead_is("%%", i) {
            Some(j) => j,
            None => return Err(self.mk_error(CnfGrammarErrorKind::PrematureEnd, i)),
        };
        i = self.parse_ws(i, true)?;
        while i < self.src.len() {
            if self.lookahead_is("%%", i).is_some() {
                break;
            }
            i = self.parse_rule(i)?;
            i = self.parse_ws(i, true)?;
        }
        Ok(i)
    }

    fn parse_rule(&mut self, mut i: usize) -> CnfResult<usize> {
        let (j, rn) = self.parse_name(i)?;
        let span = Span::new(i, j);
        if self.ast.start.is_none() {
            self.ast.start = Some((rn.clone(), span));
        }
        if self.ast.get_rule(&rn).is_none() {
            self.ast.add_rule((rn.clone(), span));
        }
        i = self.parse_ws(j, true)?;
        match self.lookahead_is(":", i) {
            Some(j) => i = j,
            None => {
                return Err(self.mk_error(CnfGrammarErrorKind::MissingColon, i));
            }
        }
        let mut syms = Vec::new();
        i = self.parse_ws(i, true)?;
        while i < self.src.len() {
            if let Some(j) = self.lookahead_is("|", i) {
                self.end_prod(&rn, syms, i);
                syms = Vec::new();
                i = self.parse_ws(j, true)?;
                continue;
            } else if let Some(j) = self.lookahead_is(";", i) {
                self.end_prod(&rn, syms, i);
                return Ok(j);
            }

            if self.lookahead_is("\"", i).is_some() || self.lookahead_is("'", i).is_some() {
                let (j, sym, span) = self.parse_token(i)?;
                self.ast.add_token(sym.clone(), span);
                syms.push(Symbol::Token(sym, span));
                i = j;
            } else {
                let (j, sym, span) = self.parse_token(i)?;
                if self.ast.tokens.contains(&sym) {
                    syms.push(Symbol::Token(sym, span));
                } else {
                    syms.push(Symbol::Rule(sym, span));
                }
                i = j;
            }
            i = self.parse_ws(i, true)?;
        }
        Err(self.mk_error(CnfGrammarErrorKind::IncompleteRule, i))
    }

    /// Finish a production of rule `rn` whose terminating `|` or `;` is at `i`.
    fn end_prod(&mut self, rn: &str, syms: Vec<Symbol>, i: usize) {
        if syms.is_empty() {
            let e = self.mk_error(CnfGrammarErrorKind::EmptyProduction, i);
            self.deferred.push(e);
        } else {
            self.ast.add_prod(rn.to_string(), syms);
        }
    }

    fn parse_name(&self, i: usize) -> CnfResult<(usize, String)> {
        match RE_NAME.find(&self.src[i..]) {
            Some(m) => {
                assert_eq!(m.start(), 0);
                Ok((i + m.end(), self.src[i..i + m.end()].to_string()))
            }
            None => Err(self.mk_error(CnfGrammarErrorKind::IllegalName, i)),
        }
    }

    fn parse_token(&self, i: usize) -> CnfResult<(usize, String, Span)> {
        match RE_TOKEN.find(&self.src[i..]) {
            Some(m) => {
                assert!(m.start() == 0 && m.end() > 0);
                if self.src[i..].starts_with(['"', '\'']) {
                    debug_assert!('"'.len_utf8() == 1 && '\''.len_utf8() == 1);
                    let start_cidx = i + 1;
                    let end_cidx = i + m.end() - 1;
                    Ok((
                        i + m.end(),
                        self.src[start_cidx..end_cidx].to_string(),
                        Span::new(start_cidx, end_cidx),
                    ))
                } else {
                    Ok((
                        i + m.end(),
                        self.src[i..i + m.end()].to_string(),
                        Span::new(i, i + m.end()),
                    ))
                }
            }
            None => Err(self.mk_error(CnfGrammarErrorKind::IllegalString, i)),
        }
    }

    /// A trailing `%%` is tolerated only if nothing but whitespace follows it.
    fn parse_programs(&mut self, i: usize) -> CnfResult<usize> {
        if let Some(j) = self.lookahead_is("%%", i) {
            let k = self.parse_ws(j, true)?;
            if k < self.src.len() {
                return Err(self.mk_error(CnfGrammarErrorKind::ProgramsNotSupported, k));
            }
            return Ok(k);
        }
        Ok(i)
    }

    /// Skip whitespace and comments from `i` onwards. If `inc_newlines` is `false`, will return
    /// `Err` if a newline is encountered; otherwise newlines are consumed and skipped.
    fn parse_ws(&self, mut i: usize, inc_newlines: bool) -> CnfResult<usize> {
        while i < self.src.len() {
            let c = self.src[i..].chars().next().unwrap();
            match c {
                ' ' | '\t' => i += c.len_utf8(),
                '\n' | '\r' => {
                    if !inc_newlines {
                        return Err(self.mk_error(CnfGrammarErrorKind::ReachedEOL, i));
                    }
                    i += c.len_utf8();
                }
                '/' if self.lookahead_is("//", i).is_some() => {
                    i += 2;
                    for c in self.src[i..].chars() {
                        i += c.len_utf8();
                        if c == '\n' || c == '\r' {
                            break;
                        }
                    }
                }
                '/' if self.lookahead_is("/*", i).is_some() => match self.src[i + 2..].find("*/")
                {
                    Some(off) => {
                        let body = &self.src[i + 2..i + 2 + off];
                        if !inc_newlines && body.contains(['\n', '\r']) {
                            return Err(self.mk_error(CnfGrammarErrorKind::ReachedEOL, i));
                        }
                        i += 2 + off + 2;
                    }
                    None => {
                        return Err(self.mk_error(CnfGrammarErrorKind::IncompleteComment, i));
                    }
                },
                _ => break,
            }
        }
        Ok(i)
    }

    fn lookahead_is(&self, s: &'static str, i: usize) -> Option<usize> {
        if self.src[i..].starts_with(s) {
            Some(i + s.len())
        } else {
            None
        }
    }

    fn mk_error(&self, k: CnfGrammarErrorKind, off: usize) -> CnfGrammarError {
        CnfGrammarError {
            kind: k,
            span: Span::at(off),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        super::ast::{GrammarAST, Production, Symbol},
        CnfGrammarError, CnfGrammarErrorKind, CnfParser, Span,
    };

    fn parse(s: &str) -> Result<GrammarAST, Vec<CnfGrammarError>> {
        let mut cp = CnfParser::new(s.to_string());
        cp.parse()?;
        Ok(cp.ast())
    }

    fn token_span(n: &str, span: Span) -> Symbol {
        Symbol::Token(n.to_string(), span)
    }

    fn rule_span(n: &str, span: Span) -> Symbol {
        Symbol::Rule(n.to_string(), span)
    }

    fn kinds(errs: &[CnfGrammarError]) -> Vec<&CnfGrammarErrorKind> {
        errs.iter().map(|e| &e.kind).collect()
    }

    #[test]
    fn test_rule() {
        let src = "%%\nA : 'a';";
        let grm = parse(src).unwrap();
        assert_eq!(grm.get_rule("A").unwrap().pidxs, vec![0]);
        assert_eq!(
            grm.prods[0],
            Production {
                symbols: vec![token_span("a", Span::new(8, 9))]
            }
        );
        assert_eq!(&src[8..9], "a");
        assert_eq!(grm.start, Some(("A".to_string(), Span::new(3, 4))));
    }

    #[test]
    fn test_alternatives_and_rule_refs() {
        let src = "%%\nS: 'a' S 'b' | 'a' 'b';";
        let grm = parse(src).unwrap();
        let s = grm.get_rule("S").unwrap();
        assert_eq!(s.pidxs, vec![0, 1]);
        assert_eq!(
            grm.prods[0].symbols,
            vec![
                token_span("a", Span::new(7, 8)),
                rule_span("S", Span::new(10, 11)),
                token_span("b", Span::new(13, 14)),
            ]
        );
        assert_eq!(grm.prods[1].symbols.len(), 2);
        assert_eq!(grm.tokens.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_declared_tokens() {
        let src = "
            %start E
            %token id plus
            %%
            E : id | E plus id;
        ";
        let grm = parse(src).unwrap();
        assert_eq!(grm.start.as_ref().unwrap().0, "E");
        assert!(grm.prods[1]
            .symbols
            .iter()
            .all(|s| !matches!(s, Symbol::Rule(n, _) if n != "E")));
        assert!(matches!(&grm.prods[0].symbols[0], Symbol::Token(n, _) if n == "id"));
    }

    #[test]
    fn test_repeated_rule_merges() {
        let grm = parse("%%\nA: 'a';\nB: 'b';\nA: 'c';").unwrap();
        assert_eq!(grm.get_rule("A").unwrap().pidxs, vec![0, 2]);
        assert_eq!(grm.rules.len(), 2);
    }

    #[test]
    fn test_comments() {
        let src = "
            // leading comment
            %%
            /* a block
               comment */
            A : 'a' /* inline */ B; // trailing
            B : 'b';
        ";
        let grm = parse(src).unwrap();
        assert_eq!(grm.prods.len(), 2);
    }

    #[test]
    fn test_incomplete_comment() {
        let errs = parse("%%\nA: 'a' /* oops").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::IncompleteComment]);
        assert_eq!(errs[0].span, Span::at(10));
    }

    #[test]
    fn test_empty_productions() {
        let errs = parse("%%\nA: 'a' | ;\nB: | 'b';").unwrap_err();
        assert_eq!(
            kinds(&errs),
            vec![
                &CnfGrammarErrorKind::EmptyProduction,
                &CnfGrammarErrorKind::EmptyProduction
            ]
        );
        assert_eq!(errs[0].span, Span::at(12));
        assert_eq!(errs[1].span, Span::at(17));
    }

    #[test]
    fn test_empty_program_section() {
        parse("%%\nA : 'a';\n%%\n").unwrap();
        let errs = parse("%%\nA : 'a';\n%%\nfn main() {}").unwrap_err();
        assert_eq!(
            kinds(&errs),
            vec![&CnfGrammarErrorKind::ProgramsNotSupported]
        );
    }

    #[test]
    fn test_missing_colon() {
        let errs = parse("%%\nA 'a';").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::MissingColon]);
        assert_eq!(errs[0].span, Span::at(5));
    }

    #[test]
    fn test_incomplete_rule() {
        let errs = parse("%%\nA : 'a'").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::IncompleteRule]);
    }

    #[test]
    fn test_premature_end() {
        let errs = parse("%token a").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::PrematureEnd]);
    }

    #[test]
    fn test_unknown_declaration() {
        let errs = parse("%left a\n%%\nA: 'a';").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::UnknownDeclaration]);
    }

    #[test]
    fn test_start_eol() {
        let errs = parse("%start\nA\n%%\nA: 'a';").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::ReachedEOL]);
    }

    #[test]
    fn test_duplicate_start() {
        let src = "%start A\n%start B\n%start A\n%%\nA: 'a';";
        let errs = parse(src).unwrap_err();
        assert_eq!(
            kinds(&errs),
            vec![&CnfGrammarErrorKind::DuplicateStartDeclaration(vec![
                Span::new(16, 17),
                Span::new(25, 26)
            ])]
        );
        assert_eq!(errs[0].span, Span::new(7, 8));
    }

    #[test]
    fn test_illegal_name() {
        let errs = parse("%%\n1A: 'a';").unwrap_err();
        assert_eq!(kinds(&errs), vec![&CnfGrammarErrorKind::IllegalName]);
    }
}
