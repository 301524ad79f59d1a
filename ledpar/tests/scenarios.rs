use cnfgrammar::{CnfGrammar, TIdx};
use fnv::FnvHashSet;
use ledpar::{
    Automaton, IntersectionErrorKind, Led, LevBall, RepairerBuilder, StateLabel, Transition,
    forest, intersect, nonempty, recognise,
};
use rand::{SeedableRng, rngs::StdRng};

const BALANCED: &str = "%%\nS: 'a' S 'b' | 'a' 'b';";

fn ball(grm: &CnfGrammar<u32>, input: &[&str], radius: usize) -> Automaton<u32> {
    let (toks, _) = grm.token_idxs(input);
    LevBall::new(&toks, radius)
        .alphabet(grm.iter_tidxs().collect())
        .build()
}

fn toks(grm: &CnfGrammar<u32>, input: &[&str]) -> Vec<TIdx<u32>> {
    grm.token_idxs(input).0
}

#[test]
fn balanced_missing_b() {
    let grm = CnfGrammar::new(BALANCED).unwrap();
    let rpr = RepairerBuilder::new(&grm).build();
    assert_eq!(rpr.led(&["a", "a", "b"]), Led::Found(1));

    let ig = rpr.intersect(&["a", "a", "b"], 1).unwrap();
    let cnf = ig.to_cnf(&grm);
    assert!(recognise(&cnf, &toks(&grm, &["a", "a", "b", "b"])));

    let rprs = rpr.repairs(&["a", "a", "b"]).unwrap();
    assert!(
        rprs.ranked(None)
            .iter()
            .any(|r| r == &["a", "a", "b", "b"])
    );
}

#[test]
fn exact_match() {
    let grm = CnfGrammar::new("%%\nS: 'a' 'b';").unwrap();
    let rpr = RepairerBuilder::new(&grm).build();
    assert_eq!(rpr.led(&["a", "b"]), Led::Found(0));

    let rprs = rpr.repairs(&["a", "b"]).unwrap();
    assert_eq!(rprs.radius(), 0);
    assert_eq!(rprs.ranked(None), vec![vec!["a", "b"]]);
    assert_eq!(rprs.forest().count(), 1);

    let cnf = rpr.intersect(&["a", "b"], 0).unwrap().to_cnf(&grm);
    let (a, b) = (TIdx(0), TIdx(1));
    for w in [vec![a], vec![b, a], vec![a, b, b], vec![a, a, b]] {
        assert!(!recognise(&cnf, &w));
    }
    assert!(recognise(&cnf, &[a, b]));
}

#[test]
fn no_terminal_derivations() {
    let grm = CnfGrammar::new("%%\nS: A B;\nA: A 'a';\nB: 'b';").unwrap();
    for radius in 0..=3 {
        let err = intersect(&grm, &ball(&grm, &["a", "b"], radius)).unwrap_err();
        assert_eq!(err.kind, IntersectionErrorKind::EmptyIntersection);
    }
    let rpr = RepairerBuilder::new(&grm).max_radius(3).build();
    assert_eq!(rpr.led(&["a", "b"]), Led::UpperBoundExceeded(3));
    assert!(rpr.repairs(&["a", "b"]).is_none());
}

#[test]
fn monotonicity() {
    let grm = CnfGrammar::new(BALANCED).unwrap();
    let input = ["b", "a", "a"];
    for d1 in 0..3 {
        let Some(f1) = forest(&grm, &ball(&grm, &input, d1), None) else {
            continue;
        };
        for d2 in d1 + 1..=3 {
            let cnf2 = intersect(&grm, &ball(&grm, &input, d2))
                .unwrap()
                .to_cnf(&grm);
            for s in f1.sentences() {
                assert!(recognise(&cnf2, &s));
            }
        }
    }
}

#[test]
fn minimality() {
    let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b' | S S;").unwrap();
    let rpr = RepairerBuilder::new(&grm).max_radius(5).build();
    for input in [
        &["b"][..],
        &["b", "a"],
        &["a", "b", "b", "a"],
        &["b", "b", "b"],
        &["a", "b", "a", "b"],
    ] {
        let Led::Found(d) = rpr.led(input) else {
            panic!("No repair for {:?}", input);
        };
        assert!(nonempty(&grm, &ball(&grm, input, d)));
        if d > 0 {
            assert!(!nonempty(&grm, &ball(&grm, input, d - 1)));
            assert!(intersect(&grm, &ball(&grm, input, d - 1)).is_err());
        }
    }
}

#[test]
fn count_consistency() {
    // A deterministic automaton accepting "a b", "a a b" and "a a b b". Since both the grammar
    // and the automaton are unambiguous, every derivation yields a different string.
    let grm = CnfGrammar::new(BALANCED).unwrap();
    let (a, b) = (TIdx(0), TIdx(1));
    let op = StateLabel::Opaque;
    let aut = Automaton::new(
        vec![
            Transition::new(op(0), a, op(1)),
            Transition::new(op(1), b, op(2)),
            Transition::new(op(1), a, op(3)),
            Transition::new(op(3), b, op(4)),
            Transition::new(op(4), b, op(5)),
        ],
        vec![op(0)],
        vec![op(2), op(4), op(5)],
    )
    .unwrap();
    let f = forest(&grm, &aut, None).unwrap();
    assert_eq!(f.count(), 2);
    assert_eq!(f.distinct_count() as u128, f.count());
}

#[test]
fn ball_forest_counts() {
    // "a b" is reachable by deleting either `a`, and "a a b b" by inserting `b` before or after
    // the existing `b`, so the ball's forest has two derivations per string.
    let grm = CnfGrammar::new(BALANCED).unwrap();
    let rprs = RepairerBuilder::new(&grm).build().repairs(&["a", "a", "b"]).unwrap();
    let f = rprs.forest();
    assert_eq!(f.count(), 4);
    assert_eq!(f.distinct_count(), 2);
    assert_eq!(f.distinct_count(), f.sentences().count());
    assert_eq!(f.sampler(StdRng::seed_from_u64(3)).count(), 2);

    let f = forest(&grm, &ball(&grm, &["a", "a", "b", "b"], 0), None).unwrap();
    assert_eq!(f.count(), 1);
    assert_eq!(f.distinct_count(), 1);
}

#[test]
fn sampling_without_replacement() {
    let grm = CnfGrammar::new("%%\nS: 'a' S 'b' | 'a' 'b' | S S;").unwrap();
    let rpr = RepairerBuilder::new(&grm).build();
    let rprs = rpr.repairs(&["a", "b", "a"]).unwrap();
    let f = rprs.forest();
    let all = f.sentences().collect::<FnvHashSet<_>>();
    let mut seen = FnvHashSet::default();
    for s in f.sampler(StdRng::seed_from_u64(0)) {
        assert!(all.contains(&s));
        assert!(seen.insert(s));
    }
    assert_eq!(seen, all);
}

#[test]
fn forest_pp() {
    let grm = CnfGrammar::new("%%\nS: 'a' 'b';").unwrap();
    let aut = ball(&grm, &["a", "b"], 0);
    let f = forest(&grm, &aut, None).unwrap();
    assert_eq!(
        f.pp(&grm, &aut),
        "[q_0/0,S,q_2/0]
 [q_0/0,T~a,q_1/0]
  'a'
 [q_1/0,T~b,q_2/0]
  'b'
"
    );
}
