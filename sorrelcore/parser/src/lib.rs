// SPDX-License-Identifier: MIT

//! Generalized LR(0) parser with a Tomita-style graph-structured stack.
//!
//! The dialect's grammar is ambiguous where history made it so: function
//! calls and array accesses share syntax, single-line and block IF share a
//! prefix, a bare identifier is a call or a label. A GLR parse carries every
//! viable stack forward, merging them in a shared graph, and defers
//! disambiguation to FOLLOW filtering and rule declaration order.
//!
//! LR(0) states are interned closures of `(rule, dot)` items with lazily
//! memoized GOTO edges. The runtime graph has shift nodes (one terminal),
//! reduce nodes (one non-terminal, aggregating alternative derivations as
//! interior nodes), and a bottom node for the initial state.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use sorrel_ast::{Node, Program};
use sorrel_common::{CompileError, Locus};
use sorrel_grammar::{RuleSet, Sym, GRAMMAR};
use sorrel_lexer::{Token, Tokenizer, EOF};

type StateId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Item {
    rule: usize,
    dot: usize,
}

struct StateInfo {
    items: Vec<Item>,
    gotos: HashMap<Sym, Option<StateId>>,
    reductions: Vec<usize>,
    accepting: bool,
}

enum GKind {
    Bottom,
    Shift { id: &'static str, text: String },
    Reduce { name: &'static str, inodes: RefCell<Vec<INode>> },
}

struct GNode {
    state: StateId,
    locus: Locus,
    parents: RefCell<Vec<Rc<GNode>>>,
    kind: GKind,
}

/// One concrete derivation of a reduce node: the rule applied and the child
/// nodes, captured left-to-right at reduction time.
struct INode {
    rule: usize,
    kids: Vec<Rc<GNode>>,
}

pub struct Parser {
    grammar: &'static RuleSet,
    states: Vec<StateInfo>,
    intern: HashMap<Vec<Item>, StateId>,
    pub errors: Vec<CompileError>,
    trace: bool,
}

/// Parse a whole source text into the AST, or the accumulated error list.
pub fn parse(src: &str) -> Result<Program, Vec<CompileError>> {
    let mut p = Parser::new();
    match p.parse_source(src) {
        Some(program) => Ok(program),
        None => Err(p.errors),
    }
}

impl Parser {
    pub fn new() -> Self {
        Self { grammar: &*GRAMMAR, states: Vec::new(), intern: HashMap::new(), errors: Vec::new(), trace: false }
    }

    /// Print ambiguity diagnostics to stderr while evaluating the forest.
    pub fn trace(mut self, on: bool) -> Self {
        self.trace = on;
        self
    }

    pub fn parse_source(&mut self, src: &str) -> Option<Program> {
        let start = self.start_state();
        let bottom = Rc::new(GNode {
            state: start,
            locus: Locus::new(1, 1),
            parents: RefCell::new(Vec::new()),
            kind: GKind::Bottom,
        });
        let mut tops: Vec<Rc<GNode>> = vec![bottom];
        let mut lexer = Tokenizer::new(src);
        loop {
            let tok = match lexer.next_token() {
                Ok(t) => t,
                Err(e) => {
                    self.errors.push(e);
                    return None;
                }
            };
            self.reduce_all(&mut tops, &tok);
            if tok.id == EOF {
                if let Some(top) = tops.iter().find(|t| self.states[t.state].accepting).cloned() {
                    return Some(self.eval(&top).into_program());
                }
                let err = self.syntax_error(&tok, &tops);
                self.errors.push(err);
                return None;
            }
            let mut next: Vec<Rc<GNode>> = Vec::new();
            for top in &tops {
                let target = self.goto_memo(top.state, Sym::T(tok.id));
                if let Some(s2) = target {
                    if let Some(existing) = next.iter().find(|n| n.state == s2) {
                        existing.parents.borrow_mut().push(top.clone());
                    } else {
                        next.push(Rc::new(GNode {
                            state: s2,
                            locus: tok.locus,
                            parents: RefCell::new(vec![top.clone()]),
                            kind: GKind::Shift { id: tok.id, text: tok.text.clone() },
                        }));
                    }
                }
            }
            if next.is_empty() {
                let err = self.syntax_error(&tok, &tops);
                self.errors.push(err);
                return None;
            }
            tops = next;
        }
    }

    /// Exhaustively apply reductions against the lookahead. Each reduce
    /// node is processed once per token; gaining a new parent re-queues it
    /// so derivations through the merged edge are not lost.
    fn reduce_all(&mut self, tops: &mut Vec<Rc<GNode>>, lookahead: &Token) {
        let mut work: Vec<Rc<GNode>> = tops.clone();
        let mut processed: HashSet<*const GNode> = HashSet::new();
        while let Some(node) = work.pop() {
            if !processed.insert(Rc::as_ptr(&node)) {
                continue;
            }
            let rule_ids = self.states[node.state].reductions.clone();
            for rule_id in rule_ids {
                let name = self.grammar.rules[rule_id].name;
                let len = self.grammar.rules[rule_id].rhs.len();
                if !self.grammar.follow_allows(name, lookahead.id) {
                    continue;
                }
                for (kids, base) in paths(&node, len) {
                    let target = match self.goto_memo(base.state, Sym::N(name)) {
                        Some(s) => s,
                        None => continue,
                    };
                    let locus = kids.first().map(|k| k.locus).unwrap_or(lookahead.locus);
                    let existing = tops
                        .iter()
                        .find(|t| t.state == target && matches!(t.kind, GKind::Reduce { .. }))
                        .cloned();
                    match existing {
                        Some(node2) => {
                            let added_parent = {
                                let mut ps = node2.parents.borrow_mut();
                                if ps.iter().any(|p| Rc::ptr_eq(p, &base)) {
                                    false
                                } else {
                                    ps.push(base.clone());
                                    true
                                }
                            };
                            if let GKind::Reduce { inodes, .. } = &node2.kind {
                                let mut ins = inodes.borrow_mut();
                                let dup = ins.iter().any(|i| {
                                    i.rule == rule_id
                                        && i.kids.len() == kids.len()
                                        && i.kids.iter().zip(&kids).all(|(a, b)| Rc::ptr_eq(a, b))
                                });
                                if !dup {
                                    ins.push(INode { rule: rule_id, kids });
                                }
                            }
                            if added_parent {
                                processed.remove(&Rc::as_ptr(&node2));
                                work.push(node2);
                            }
                        }
                        None => {
                            let node2 = Rc::new(GNode {
                                state: target,
                                locus,
                                parents: RefCell::new(vec![base.clone()]),
                                kind: GKind::Reduce {
                                    name,
                                    inodes: RefCell::new(vec![INode { rule: rule_id, kids }]),
                                },
                            });
                            tops.push(node2.clone());
                            work.push(node2);
                        }
                    }
                }
            }
        }
    }

    /// Evaluate a forest node bottom-up. A reduce node with several
    /// derivations resolves to the one with the smallest rule id, i.e. the
    /// production declared first.
    fn eval(&self, node: &Rc<GNode>) -> Node {
        match &node.kind {
            GKind::Bottom => Node::Empty,
            GKind::Shift { id, text } => Node::Tok(Token { id, text: text.clone(), locus: node.locus }),
            GKind::Reduce { name, inodes } => {
                let inodes = inodes.borrow();
                if inodes.len() > 1 && self.trace {
                    eprintln!("parse: ambiguous {} at {} ({} derivations)", name, node.locus, inodes.len());
                }
                let chosen = inodes
                    .iter()
                    .min_by_key(|i| i.rule)
                    .expect("reduce node carries at least one derivation");
                let kids: Vec<Node> = chosen.kids.iter().map(|k| self.eval(k)).collect();
                match self.grammar.rules[chosen.rule].action {
                    Some(f) => f(kids, node.locus),
                    None => kids.into_iter().next().unwrap_or(Node::Empty),
                }
            }
        }
    }

    fn syntax_error(&self, tok: &Token, tops: &[Rc<GNode>]) -> CompileError {
        let mut expected: Vec<&str> = Vec::new();
        for top in tops {
            for item in &self.states[top.state].items {
                if let Some(Sym::T(term)) = self.grammar.rules[item.rule].rhs.get(item.dot) {
                    if !expected.contains(term) {
                        expected.push(*term);
                    }
                }
            }
        }
        expected.sort_unstable();
        let found = if tok.id == EOF { "end of input".to_string() } else { format!("'{}'", tok.text) };
        CompileError::new(
            format!("Syntax error: unexpected {} (expected {})", found, expected.join(" ")),
            tok.locus,
        )
    }

    fn start_state(&mut self) -> StateId {
        let seeds: Vec<Item> = self
            .grammar
            .rules_for(self.grammar.start)
            .iter()
            .map(|id| Item { rule: *id, dot: 0 })
            .collect();
        self.state_for(seeds)
    }

    fn goto_memo(&mut self, from: StateId, sym: Sym) -> Option<StateId> {
        if let Some(r) = self.states[from].gotos.get(&sym) {
            return *r;
        }
        let seeds: Vec<Item> = self.states[from]
            .items
            .iter()
            .filter(|it| self.grammar.rules[it.rule].rhs.get(it.dot) == Some(&sym))
            .map(|it| Item { rule: it.rule, dot: it.dot + 1 })
            .collect();
        let result = if seeds.is_empty() { None } else { Some(self.state_for(seeds)) };
        self.states[from].gotos.insert(sym, result);
        result
    }

    /// Close a seed item set and intern the resulting state. Identical
    /// closures deduplicate to the same id.
    fn state_for(&mut self, seeds: Vec<Item>) -> StateId {
        let mut items = seeds;
        let mut seen: HashSet<Item> = items.iter().copied().collect();
        let mut i = 0;
        while i < items.len() {
            let it = items[i];
            i += 1;
            if let Some(Sym::N(m)) = self.grammar.rules[it.rule].rhs.get(it.dot) {
                for rid in self.grammar.rules_for(m) {
                    let cand = Item { rule: *rid, dot: 0 };
                    if seen.insert(cand) {
                        items.push(cand);
                    }
                }
            }
        }
        items.sort_unstable();
        if let Some(id) = self.intern.get(&items) {
            return *id;
        }
        let reductions: Vec<usize> = items
            .iter()
            .filter(|it| self.grammar.rules[it.rule].rhs.len() == it.dot)
            .map(|it| it.rule)
            .collect();
        let accepting = items.iter().any(|it| {
            let rule = &self.grammar.rules[it.rule];
            it.dot == rule.rhs.len() && rule.name == self.grammar.start
        });
        let id = self.states.len();
        self.intern.insert(items.clone(), id);
        self.states.push(StateInfo { items, gotos: HashMap::new(), reductions, accepting });
        id
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerate every path of `len` edges up the graph from `node`, yielding
/// the visited nodes left-to-right plus the node below the leftmost child.
fn paths(node: &Rc<GNode>, len: usize) -> Vec<(Vec<Rc<GNode>>, Rc<GNode>)> {
    let mut out = Vec::new();
    if len == 0 {
        out.push((Vec::new(), node.clone()));
        return out;
    }
    let mut acc: Vec<Rc<GNode>> = Vec::new();
    walk(node, len, &mut acc, &mut out);
    out
}

fn walk(
    cur: &Rc<GNode>,
    remaining: usize,
    acc: &mut Vec<Rc<GNode>>,
    out: &mut Vec<(Vec<Rc<GNode>>, Rc<GNode>)>,
) {
    acc.push(cur.clone());
    if remaining == 1 {
        for p in cur.parents.borrow().iter() {
            let kids: Vec<Rc<GNode>> = acc.iter().rev().cloned().collect();
            out.push((kids, p.clone()));
        }
    } else {
        for p in cur.parents.borrow().iter() {
            walk(p, remaining - 1, acc, out);
        }
    }
    acc.pop();
}
