//! Literal behavioral scenarios the interpreter must get right, built
//! directly against [`apg_core::GrammarImageBuilder`] rather than any
//! external grammar compiler.

use std::sync::Arc;

use apg_core::{
    AstFilterResult, BackrefScope, BackrefTarget, GrammarImage, GrammarImageBuilder, Opcode,
    PpptState, RuleIndex,
};
use apg_runtime::{AstFilter, ApgError, ParseConfig, Parser, ParserBuilder, ParserState};

fn build<F>(alphabet_range: u32, f: F) -> Arc<GrammarImage<u8>>
where
    F: FnOnce(&mut GrammarImageBuilder<u8>),
{
    let mut b: GrammarImageBuilder<u8> = GrammarImageBuilder::new(alphabet_range);
    f(&mut b);
    Arc::new(b.build().expect("well-formed test grammar"))
}

fn parser(image: Arc<GrammarImage<u8>>) -> Parser<u8> {
    ParserBuilder::new(image).build()
}

// Scenario 1: ALT picks the first child that succeeds.
#[test]
fn alt_matches_first_successful_alternative() {
    let image = build(256, |b| {
        let (a_off, a_len) = b.add_literal(b"a");
        let (b_off, b_len) = b.add_literal(b"b");
        let tls_a = b.add_opcode(Opcode::Tls { offset: a_off, len: a_len, pppt: None });
        let tls_b = b.add_opcode(Opcode::Tls { offset: b_off, len: b_len, pppt: None });
        let children = b.add_children(&[tls_a, tls_b]);
        let alt = b.add_opcode(Opcode::Alt { children, pppt: None });
        b.add_rule("S", alt, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"b")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert!(outcome.consumed_all);
    assert_eq!(outcome.matched_length, 1);
}

#[test]
fn alt_with_no_successful_alternative_fails() {
    let image = build(256, |b| {
        let (a_off, a_len) = b.add_literal(b"a");
        let tls_a = b.add_opcode(Opcode::Tls { offset: a_off, len: a_len, pppt: None });
        let children = b.add_children(&[tls_a]);
        let alt = b.add_opcode(Opcode::Alt { children, pppt: None });
        b.add_rule("S", alt, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"z")).unwrap();
    assert_eq!(outcome.state, ParserState::NoMatch);
}

// Scenario 2: a greedy REP never backtracks, so a required literal
// positioned after it can starve it of input.
#[test]
fn greedy_rep_blocks_a_trailing_required_literal() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"a");
        let rep_child = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let rep = b.add_opcode(Opcode::Rep { min: 0, max: None, child: rep_child, pppt: None });
        let tail = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let children = b.add_children(&[rep, tail]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("reps", cat, 3, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"aaa")).unwrap();
    assert_eq!(outcome.state, ParserState::NoMatch);
}

#[test]
fn rep_below_minimum_fails() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"a");
        let rep_child = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let rep = b.add_opcode(Opcode::Rep { min: 3, max: None, child: rep_child, pppt: None });
        b.add_rule("reps", rep, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"aa")).unwrap();
    assert_eq!(outcome.state, ParserState::NoMatch);
}

// Scenario 3: ABG/AEN anchor a match to the whole configured substring.
#[test]
fn anchors_reject_a_partial_match_of_the_substring() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"a");
        let abg = b.add_opcode(Opcode::Abg);
        let tls = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let aen = b.add_opcode(Opcode::Aen);
        let children = b.add_children(&[abg, tls, aen]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("whole", cat, 3, false);
        b.set_starting_rule(0);
    });

    let mut p = parser(image.clone());
    let ok = p.parse(ParseConfig::new(b"a")).unwrap();
    assert_eq!(ok.state, ParserState::Match);
    assert!(ok.consumed_all);

    let mut p2 = parser(image);
    let short = p2.parse(ParseConfig::new(b"ab")).unwrap();
    assert_eq!(short.state, ParserState::NoMatch);
}

// Scenario 4: universal back-reference scope sees the most recent
// match anywhere in the parse, while parent-frame scope sees only
// matches recorded directly inside the enclosing rule call.
fn build_backref_grammar(scope: BackrefScope) -> Arc<GrammarImage<u8>> {
    build(256, |b| {
        let (a_off, a_len) = b.add_literal(b"a");
        let (b_off, b_len) = b.add_literal(b"b");
        let tls_a = b.add_opcode(Opcode::Tls { offset: a_off, len: a_len, pppt: None });
        let tls_b = b.add_opcode(Opcode::Tls { offset: b_off, len: b_len, pppt: None });
        let alt_children = b.add_children(&[tls_a, tls_b]);
        let alt = b.add_opcode(Opcode::Alt { children: alt_children, pppt: None });
        let rule_a: RuleIndex = b.add_rule("A", alt, 1, false);

        let rnm_a_inner = b.add_opcode(Opcode::Rnm { rule: rule_a, pppt: None });
        let bkr_inner = b.add_opcode(Opcode::Bkr {
            target: BackrefTarget::Rule(rule_a),
            case_insensitive: false,
            scope: BackrefScope::ParentFrame,
        });
        let inner_children = b.add_children(&[rnm_a_inner, bkr_inner]);
        let inner_cat = b.add_opcode(Opcode::Cat { children: inner_children, pppt: None });
        let rule_inner = b.add_rule("inner", inner_cat, 2, false);

        let rnm_a_outer = b.add_opcode(Opcode::Rnm { rule: rule_a, pppt: None });
        let rnm_inner = b.add_opcode(Opcode::Rnm { rule: rule_inner, pppt: None });
        let bkr_outer = b.add_opcode(Opcode::Bkr {
            target: BackrefTarget::Rule(rule_a),
            case_insensitive: false,
            scope,
        });
        let outer_children = b.add_children(&[rnm_a_outer, rnm_inner, bkr_outer]);
        let outer_cat = b.add_opcode(Opcode::Cat { children: outer_children, pppt: None });
        b.add_rule("outer", outer_cat, 3, false);
        b.set_starting_rule(2);
    })
}

#[test]
fn universal_backref_sees_the_most_recent_match_anywhere() {
    // outer matches "a", inner matches "b" then re-confirms it via its
    // own parent-frame BKR; the outer BKR, scoped universally, must
    // then see inner's "b" rather than outer's own "a".
    let image = build_backref_grammar(BackrefScope::Universal);
    let mut p = parser(image);
    let outcome = p.parse(ParseConfig::new(b"abbb")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert!(outcome.consumed_all);
}

#[test]
fn parent_frame_backref_ignores_matches_from_nested_calls() {
    // Same grammar, but the outer BKR is scoped to its own frame, so it
    // must require another "a" (outer's own match), not "b".
    let image = build_backref_grammar(BackrefScope::ParentFrame);
    let mut p = parser(image);

    let wrong = p.parse(ParseConfig::new(b"abbb")).unwrap();
    assert_eq!(wrong.state, ParserState::NoMatch);

    let mut p2 = parser(build_backref_grammar(BackrefScope::ParentFrame));
    let right = p2.parse(ParseConfig::new(b"abba")).unwrap();
    assert_eq!(right.state, ParserState::Match);
    assert!(right.consumed_all);
}

// Scenario 5: a PPPT map predicting NoMatch must short-circuit before
// ever invoking a UDT callback nested underneath it.
#[test]
fn pppt_no_match_short_circuits_without_invoking_the_udt() {
    let image = build(256, |b| {
        let udt = b.add_udt("u_unreachable", false);
        let udt_op = b.add_opcode(Opcode::Udt { udt });
        let children = b.add_children(&[udt_op]);
        let mut map = vec![PpptState::NoMatch; 256];
        map[b'a' as usize] = PpptState::Active;
        let pppt = b.add_pppt_map(&map);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: Some(pppt) });
        b.add_rule("S", cat, 1, false);
        b.set_starting_rule(0);
    });

    let mut p = ParserBuilder::new(image)
        .register_udt(0, |_input: &[u8], _cursor: usize, _end: usize| {
            panic!("UDT must not run when PPPT already predicts NoMatch")
        })
        .build();

    let outcome = p.parse(ParseConfig::new(b"z")).unwrap();
    assert_eq!(outcome.state, ParserState::NoMatch);
}

// Scenario 6: AND/NOT are zero-consumption predicates regardless of
// how much input their child would itself consume.
#[test]
fn and_predicate_consumes_nothing_on_success() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"a");
        let peek = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let and = b.add_opcode(Opcode::And { child: peek, pppt: None });
        let real = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let children = b.add_children(&[and, real]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("S", cat, 2, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"a")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert_eq!(outcome.matched_length, 1);
}

#[test]
fn not_predicate_consumes_nothing_on_success() {
    let image = build(256, |b| {
        let (a_off, a_len) = b.add_literal(b"a");
        let (b_off, b_len) = b.add_literal(b"b");
        let lookahead = b.add_opcode(Opcode::Tls { offset: a_off, len: a_len, pppt: None });
        let not = b.add_opcode(Opcode::Not { child: lookahead, pppt: None });
        let real = b.add_opcode(Opcode::Tls { offset: b_off, len: b_len, pppt: None });
        let children = b.add_children(&[not, real]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("T", cat, 2, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let outcome = p.parse(ParseConfig::new(b"b")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert_eq!(outcome.matched_length, 1);
}

// Determinism: the same grammar and input produce the same outcome
// across repeated calls, including after a `reset`.
#[test]
fn parsing_is_deterministic_across_reuse() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"ok");
        let tls = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        b.add_rule("S", tls, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let first = p.parse(ParseConfig::new(b"ok")).unwrap();
    p.reset();
    let second = p.parse(ParseConfig::new(b"ok")).unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.matched_length, second.matched_length);
}

// A directly left-recursive rule has no base case and would overflow a
// recursive-descent host stack; the explicit execution-item stack must
// instead report DepthExceeded once its configured budget is spent.
#[test]
fn left_recursive_grammar_hits_the_depth_guard_instead_of_overflowing() {
    let image = build(256, |b| {
        let rnm = b.add_opcode(Opcode::Rnm { rule: 0, pppt: None });
        b.add_rule("Loop", rnm, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = parser(image);

    let err = p
        .parse(ParseConfig::new(b"x").max_depth(64))
        .expect_err("unbounded left recursion must not silently succeed");
    assert!(matches!(err, ApgError::DepthExceeded { max_depth: 64 }));
}

// A rule captured for AST purposes that only ever matches inside an
// AND/NOT predicate must leave no trace in the AST log: it was never
// really part of the parse, only probed.
#[test]
fn captured_rule_matched_only_inside_and_predicate_is_not_recorded() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"x");
        let probe = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let inner_rule = b.add_rule("Inner", probe, 1, false);

        let rnm_inner = b.add_opcode(Opcode::Rnm { rule: inner_rule, pppt: None });
        let and = b.add_opcode(Opcode::And { child: rnm_inner, pppt: None });
        let real = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        let children = b.add_children(&[and, real]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("S", cat, 2, false);
        b.set_starting_rule(1);
    });
    let mut p = ParserBuilder::new(image).capture_rule(0).build();

    let outcome = p.parse(ParseConfig::new(b"x")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert_eq!(outcome.matched_length, 1);
    assert!(p.ast_records().is_empty());
}

// The live AST pruning filter does not just hide a record; a `Skip`
// synthesizes an empty match and keeps the interpreter from ever
// descending into the rule, which changes what the surrounding grammar
// can go on to match.
struct AlwaysSkip;

impl AstFilter for AlwaysSkip {
    fn filter_pre(&mut self, _is_udt: bool, _index: u32, _phrase_offset: usize) -> AstFilterResult {
        AstFilterResult::Skip
    }
}

#[test]
fn live_pruning_filter_skip_forces_an_empty_match_without_descending() {
    let image = build(256, |b| {
        let (hi_off, hi_len) = b.add_literal(b"hi");
        let (bang_off, bang_len) = b.add_literal(b"!");
        let greeting_body = b.add_opcode(Opcode::Tls { offset: hi_off, len: hi_len, pppt: None });
        let greeting = b.add_rule("Greeting", greeting_body, 1, false);

        let rnm_greeting = b.add_opcode(Opcode::Rnm { rule: greeting, pppt: None });
        let tail = b.add_opcode(Opcode::Tls { offset: bang_off, len: bang_len, pppt: None });
        let children = b.add_children(&[rnm_greeting, tail]);
        let cat = b.add_opcode(Opcode::Cat { children, pppt: None });
        b.add_rule("S", cat, 2, false);
        b.set_starting_rule(1);
    });

    let mut p = ParserBuilder::new(image).capture_rule(0).ast_filter(AlwaysSkip).build();

    // If Greeting were actually evaluated it would consume "hi" and
    // leave the cursor unable to match "!" against "hi!"'s tail; with
    // it skipped, the cursor never moves and "!" alone satisfies S.
    let outcome = p.parse(ParseConfig::new(b"!")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    assert!(outcome.consumed_all);
    assert_eq!(outcome.matched_length, 1);

    let records = p.ast_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].phrase_length, 0);
}

#[test]
fn ast_capture_records_a_pre_post_pair_for_a_captured_rule() {
    let image = build(256, |b| {
        let (off, len) = b.add_literal(b"hi");
        let tls = b.add_opcode(Opcode::Tls { offset: off, len, pppt: None });
        b.add_rule("Greeting", tls, 1, false);
        b.set_starting_rule(0);
    });
    let mut p = ParserBuilder::new(image).capture_rule(0).build();

    let outcome = p.parse(ParseConfig::new(b"hi")).unwrap();
    assert_eq!(outcome.state, ParserState::Match);
    let records = p.ast_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sibling_pair_index, 1);
    assert_eq!(records[1].sibling_pair_index, 0);
    assert_eq!(records[1].phrase_length, 2);
}
