//! Declarative grammar for the Sorrel BASIC dialect.
//!
//! Productions carry a rule id (declaration order) and an optional semantic
//! action building [`Node`] values. The parser resolves ambiguous forests
//! by picking the derivation with the smallest rule id, so the order of
//! declarations below is meaningful: the preferred reading comes first.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use sorrel_ast::{BinOp, Node};
use sorrel_common::Locus;
use sorrel_lexer::EOF;

mod rules;

/// A grammar symbol: terminal (token id) or non-terminal (rule name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sym {
    T(&'static str),
    N(&'static str),
}

pub fn t(name: &'static str) -> Sym {
    Sym::T(name)
}

pub fn n(name: &'static str) -> Sym {
    Sym::N(name)
}

pub type Action = fn(Vec<Node>, Locus) -> Node;

pub struct Rule {
    pub id: usize,
    pub name: &'static str,
    pub rhs: Vec<Sym>,
    pub action: Option<Action>,
}

pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub by_name: HashMap<&'static str, Vec<usize>>,
    pub follow: HashMap<&'static str, HashSet<&'static str>>,
    pub start: &'static str,
}

impl RuleSet {
    pub fn rules_for(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn follow_allows(&self, name: &str, lookahead: &str) -> bool {
        self.follow.get(name).map_or(false, |s| s.contains(lookahead))
    }
}

pub(crate) struct Builder {
    rules: Vec<Rule>,
}

impl Builder {
    fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub(crate) fn r(&mut self, name: &'static str, rhs: &[Sym], action: Option<Action>) {
        let id = self.rules.len();
        self.rules.push(Rule { id, name, rhs: rhs.to_vec(), action });
    }

    fn finish(self, start: &'static str) -> RuleSet {
        let mut by_name: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for rule in &self.rules {
            by_name.entry(rule.name).or_default().push(rule.id);
        }
        let follow = compute_follow(&self.rules, &by_name, start);
        RuleSet { rules: self.rules, by_name, follow, start }
    }
}

/// The dialect grammar, built once.
pub static GRAMMAR: Lazy<RuleSet> = Lazy::new(|| {
    let mut b = Builder::new();
    rules::install(&mut b);
    b.finish("_start")
});

fn compute_follow(
    rules: &[Rule],
    by_name: &HashMap<&'static str, Vec<usize>>,
    start: &'static str,
) -> HashMap<&'static str, HashSet<&'static str>> {
    // Nullable non-terminals, to fixpoint.
    let mut nullable: HashSet<&'static str> = HashSet::new();
    loop {
        let mut changed = false;
        for rule in rules {
            if nullable.contains(rule.name) {
                continue;
            }
            let all = rule.rhs.iter().all(|s| match s {
                Sym::T(_) => false,
                Sym::N(m) => nullable.contains(m),
            });
            if all {
                nullable.insert(rule.name);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // FIRST sets per non-terminal, to fixpoint.
    let mut first: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    for name in by_name.keys() {
        first.insert(*name, HashSet::new());
    }
    loop {
        let mut changed = false;
        for rule in rules {
            let mut add: Vec<&'static str> = Vec::new();
            for sym in &rule.rhs {
                match sym {
                    Sym::T(tname) => {
                        add.push(*tname);
                        break;
                    }
                    Sym::N(m) => {
                        if let Some(set) = first.get(m) {
                            add.extend(set.iter().copied());
                        }
                        if !nullable.contains(m) {
                            break;
                        }
                    }
                }
            }
            let set = first.get_mut(rule.name).expect("rule name registered");
            for tname in add {
                if set.insert(tname) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // FOLLOW sets, to fixpoint.
    let mut follow: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
    for name in by_name.keys() {
        follow.insert(*name, HashSet::new());
    }
    follow.get_mut(start).expect("start rule exists").insert(EOF);
    loop {
        let mut changed = false;
        for rule in rules {
            for (i, sym) in rule.rhs.iter().enumerate() {
                let b = match sym {
                    Sym::N(b) => *b,
                    Sym::T(_) => continue,
                };
                let mut add: Vec<&'static str> = Vec::new();
                let mut rest_nullable = true;
                for sym2 in &rule.rhs[i + 1..] {
                    match sym2 {
                        Sym::T(tname) => {
                            add.push(*tname);
                            rest_nullable = false;
                            break;
                        }
                        Sym::N(m) => {
                            if let Some(set) = first.get(m) {
                                add.extend(set.iter().copied());
                            }
                            if !nullable.contains(m) {
                                rest_nullable = false;
                                break;
                            }
                        }
                    }
                }
                if rest_nullable {
                    if let Some(set) = follow.get(rule.name) {
                        add.extend(set.iter().copied());
                    }
                }
                let set = follow.get_mut(b).expect("nonterminal registered");
                for tname in add {
                    if set.insert(tname) {
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    follow
}

pub(crate) fn binop(text: &str) -> BinOp {
    match text {
        "^" => BinOp::Pow,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "MOD" => BinOp::Mod,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "=" => BinOp::Eq,
        "<>" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "AND" => BinOp::And,
        "OR" => BinOp::Or,
        other => unreachable!("no binary operator for token {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorrel_lexer::{IDENT, NEWLINE, NUMBER, STRING_LIT};

    #[test]
    fn grammar_builds() {
        let g = &*GRAMMAR;
        assert!(g.rules.len() > 80);
        assert_eq!(g.rules[0].name, "_start");
    }

    #[test]
    fn follow_of_stmt_has_separators() {
        let g = &*GRAMMAR;
        assert!(g.follow_allows("stmt", NEWLINE));
        assert!(g.follow_allows("stmt", ":"));
        assert!(g.follow_allows("stmt", EOF));
        assert!(g.follow_allows("stmt", "ELSE"));
        // LOOP WHILE must not allow a plain DO..LOOP to swallow the WHILE.
        assert!(!g.follow_allows("stmt", "WHILE"));
    }

    #[test]
    fn follow_of_expr_has_structural_terminals() {
        let g = &*GRAMMAR;
        for term in ["TO", "STEP", "THEN", ";", ",", ")", NEWLINE, ":"] {
            assert!(g.follow_allows("expr", term), "expr FOLLOW missing {term}");
        }
    }

    #[test]
    fn preferred_rules_come_first() {
        let g = &*GRAMMAR;
        // Single-line IF without ELSE must precede the ELSE form so the
        // dangling ELSE binds to the nearest IF.
        let ids = g.rules_for("stmt");
        let no_else = ids.iter().find(|id| {
            let r = &g.rules[**id];
            r.rhs.first() == Some(&Sym::T("IF")) && !r.rhs.contains(&Sym::T("ELSE"))
        });
        let with_else = ids.iter().find(|id| {
            let r = &g.rules[**id];
            r.rhs.first() == Some(&Sym::T("IF")) && r.rhs.contains(&Sym::T("ELSE"))
        });
        assert!(no_else.unwrap() < with_else.unwrap());
    }

    #[test]
    fn number_terminal_reachable() {
        let g = &*GRAMMAR;
        assert!(g.rules.iter().any(|r| r.rhs.contains(&Sym::T(NUMBER))));
        assert!(g.rules.iter().any(|r| r.rhs.contains(&Sym::T(STRING_LIT))));
        assert!(g.rules.iter().any(|r| r.rhs.contains(&Sym::T(IDENT))));
    }
}
