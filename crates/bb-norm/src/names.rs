//! Name collection, slot assignment, and the rename pass.
//!
//! The slot map is one ordered association list keyed by slot index; the
//! forward (original -> slot) and reverse (slot -> original) views are
//! derived from it on demand. Collection is a depth-first pre-order walk
//! of the function tree with children visited in declared field order, so
//! two inputs differing only in identifier spelling assign identical slots.

use std::collections::{BTreeMap, HashMap, HashSet};

use bb_parser::ast::{Arg, Comprehension, Expr, Param, Params, Pattern, Stmt, WithItem};
use bb_types::slot_name;

use crate::builtins::is_builtin;

/// Names that are never slot-renamed.
#[derive(Debug, Clone, Default)]
pub struct ExcludedNames {
    names: HashSet<String>,
}

impl ExcludedNames {
    /// Build the exclusion set for one normalization run: imported names,
    /// pool alias names, and the canonical outer-slot attribute itself.
    /// Builtins are consulted separately from the fixed table.
    pub fn new<I, J>(imported: I, pool_aliases: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let mut names: HashSet<String> = imported.into_iter().collect();
        names.extend(pool_aliases);
        names.insert(bb_types::OUTER_SLOT.to_owned());
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        is_builtin(name) || self.names.contains(name)
    }

    pub fn insert(&mut self, name: String) {
        self.names.insert(name);
    }
}

/// Bijection between original identifiers and canonical slots.
///
/// Entry `i` holds the original spelling of slot `_bb_v_<i>`; entry 0 is
/// always the outer function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMap {
    originals: Vec<String>,
}

impl NameMap {
    /// Collect user-defined names from a function definition and assign
    /// slots in first-encounter order. The outer function name takes
    /// slot 0 unconditionally.
    pub fn build(func: &Stmt, excluded: &ExcludedNames) -> Self {
        let mut collector = Collector {
            excluded,
            seen: HashSet::new(),
            ordered: Vec::new(),
        };
        if let Stmt::FunctionDef { name, .. } = func {
            collector.seen.insert(name.clone());
            collector.ordered.push(name.clone());
        }
        collector.stmt(func);
        Self {
            originals: collector.ordered,
        }
    }

    /// Rebuild from a stored slot -> original mapping.
    ///
    /// Returns `None` when the slot keys are not a dense `_bb_v_0..N`
    /// range, which indicates a corrupt overlay.
    pub fn from_reverse(reverse: &BTreeMap<String, String>) -> Option<Self> {
        let mut originals = vec![None; reverse.len()];
        for (slot, original) in reverse {
            let index = bb_types::slot_index(slot)?;
            if index >= originals.len() || originals[index].is_some() {
                return None;
            }
            originals[index] = Some(original.clone());
        }
        originals
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .map(|originals| Self { originals })
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// original -> slot view, used by the normalizer.
    pub fn forward(&self) -> HashMap<String, String> {
        self.originals
            .iter()
            .enumerate()
            .map(|(i, original)| (original.clone(), slot_name(i)))
            .collect()
    }

    /// slot -> original view, the form stored in overlays.
    pub fn reverse(&self) -> BTreeMap<String, String> {
        self.originals
            .iter()
            .enumerate()
            .map(|(i, original)| (slot_name(i), original.clone()))
            .collect()
    }
}

struct Collector<'a> {
    excluded: &'a ExcludedNames,
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl Collector<'_> {
    fn record(&mut self, name: &str) {
        if self.excluded.contains(name) || self.seen.contains(name) {
            return;
        }
        self.seen.insert(name.to_owned());
        self.ordered.push(name.to_owned());
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef {
                decorators,
                name,
                params,
                returns,
                body,
                ..
            } => {
                for decorator in decorators {
                    self.expr(decorator);
                }
                self.record(name);
                self.params(params);
                if let Some(returns) = returns {
                    self.expr(returns);
                }
                self.stmts(body);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Assign { targets, value } => {
                for target in targets {
                    self.expr(target);
                }
                self.expr(value);
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                self.expr(target);
                self.expr(annotation);
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                self.expr(target);
                self.expr(iter);
                self.stmts(body);
                self.stmts(orelse);
            }
            Stmt::While { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            Stmt::If { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            Stmt::With { items, body, .. } => {
                for WithItem { context, target } in items {
                    self.expr(context);
                    if let Some(target) = target {
                        self.expr(target);
                    }
                }
                self.stmts(body);
            }
            Stmt::Match { subject, cases } => {
                self.expr(subject);
                for case in cases {
                    self.pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.stmts(&case.body);
                }
            }
            Stmt::Raise { exc, cause } => {
                if let Some(exc) = exc {
                    self.expr(exc);
                }
                if let Some(cause) = cause {
                    self.expr(cause);
                }
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.stmts(body);
                for handler in handlers {
                    if let Some(typ) = &handler.typ {
                        self.expr(typ);
                    }
                    if let Some(name) = &handler.name {
                        self.record(name);
                    }
                    self.stmts(&handler.body);
                }
                self.stmts(orelse);
                self.stmts(finalbody);
            }
            Stmt::Assert { test, msg } => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
            // Imports inside a function body bind their names for the
            // whole unit; those names stay excluded, never slotted.
            Stmt::Import(_) | Stmt::ImportFrom { .. } => {}
            Stmt::Global(names) | Stmt::Nonlocal(names) => {
                for name in names {
                    self.record(name);
                }
            }
            Stmt::Delete(targets) => {
                for target in targets {
                    self.expr(target);
                }
            }
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Pass | Stmt::Break | Stmt::Continue => {}
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn params(&mut self, params: &Params) {
        for Param {
            name,
            annotation,
            default,
        } in params.iter()
        {
            self.record(name);
            if let Some(annotation) = annotation {
                self.expr(annotation);
            }
            if let Some(default) = default {
                self.expr(default);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(name) => self.record(name),
            Expr::Num(_)
            | Expr::Str(_)
            | Expr::Bytes(_)
            | Expr::Bool(_)
            | Expr::NoneLit
            | Expr::Ellipsis => {}
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Call { func, args } => {
                self.expr(func);
                for arg in args {
                    match arg {
                        Arg::Positional(value)
                        | Arg::Starred(value)
                        | Arg::DoubleStarred(value) => self.expr(value),
                        // Keyword names address the callee's signature,
                        // not this unit's scope.
                        Arg::Keyword { value, .. } => self.expr(value),
                    }
                }
            }
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Dict { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    if let Some(key) = key {
                        self.expr(key);
                    }
                    self.expr(value);
                }
            }
            Expr::Starred(value) => self.expr(value),
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::BoolOp { values, .. } => {
                for value in values {
                    self.expr(value);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                for comparator in comparators {
                    self.expr(comparator);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::Lambda { params, body } => {
                self.params(params);
                self.expr(body);
            }
            Expr::Await(value) | Expr::YieldFrom(value) => self.expr(value),
            Expr::Yield(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Expr::NamedExpr { target, value } => {
                self.record(target);
                self.expr(value);
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.expr(elt);
                self.comprehensions(generators);
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.expr(key);
                self.expr(value);
                self.comprehensions(generators);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension]) {
        for Comprehension {
            target, iter, ifs, ..
        } in generators
        {
            self.expr(target);
            self.expr(iter);
            for cond in ifs {
                self.expr(cond);
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Value(expr) => self.expr(expr),
            Pattern::Capture { name } | Pattern::Star { name } => {
                if let Some(name) = name {
                    self.record(name);
                }
            }
            Pattern::Sequence(items) => {
                for item in items {
                    self.pattern(item);
                }
            }
            Pattern::Mapping {
                keys,
                patterns,
                rest,
            } => {
                for (key, inner) in keys.iter().zip(patterns) {
                    self.expr(key);
                    self.pattern(inner);
                }
                if let Some(rest) = rest {
                    self.record(rest);
                }
            }
            Pattern::Class {
                cls,
                patterns,
                kwd_patterns,
                ..
            } => {
                self.expr(cls);
                for inner in patterns.iter().chain(kwd_patterns) {
                    self.pattern(inner);
                }
            }
            Pattern::Or(choices) => {
                for choice in choices {
                    self.pattern(choice);
                }
            }
            Pattern::As { pattern, name } => {
                self.pattern(pattern);
                self.record(name);
            }
        }
    }
}

/// Rewrite rules driven through one shared tree traversal.
///
/// `map_name` fires at identifier sites: name expressions, def and param
/// names, exception and pattern bindings, walrus targets, global and
/// nonlocal lists. `map_expr` fires on every rebuilt expression node,
/// children first. Attribute names, call keyword names, and import
/// clauses are never touched.
pub trait Rewrite {
    fn map_name(&self, name: String) -> String {
        name
    }

    fn map_expr(&self, expr: Expr) -> Expr {
        expr
    }
}

/// Run a rewriter over a statement, producing a new tree.
pub fn rewrite_stmt<R: Rewrite>(stmt: Stmt, rules: &R) -> Stmt {
    Walker { rules }.stmt(stmt)
}

/// Apply a name substitution to a statement.
///
/// Running the pass again with the inverse map restores the input, which
/// is exactly how denormalization undoes normalization.
pub fn rename_stmt(stmt: Stmt, map: &HashMap<String, String>) -> Stmt {
    rewrite_stmt(stmt, &NameSubst { map })
}

struct NameSubst<'a> {
    map: &'a HashMap<String, String>,
}

impl Rewrite for NameSubst<'_> {
    fn map_name(&self, name: String) -> String {
        match self.map.get(&name) {
            Some(renamed) => renamed.clone(),
            None => name,
        }
    }
}

struct Walker<'a, R: Rewrite> {
    rules: &'a R,
}

impl<R: Rewrite> Walker<'_, R> {
    fn name(&self, name: String) -> String {
        self.rules.map_name(name)
    }

    fn opt_name(&self, name: Option<String>) -> Option<String> {
        name.map(|n| self.name(n))
    }

    fn stmt(&self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::FunctionDef {
                decorators,
                name,
                params,
                returns,
                body,
                is_async,
            } => Stmt::FunctionDef {
                decorators: self.exprs(decorators),
                name: self.name(name),
                params: self.params(params),
                returns: returns.map(|r| self.expr(r)),
                body: self.stmts(body),
                is_async,
            },
            Stmt::Return(value) => Stmt::Return(value.map(|v| self.expr(v))),
            Stmt::Assign { targets, value } => Stmt::Assign {
                targets: self.exprs(targets),
                value: self.expr(value),
            },
            Stmt::AugAssign { target, op, value } => Stmt::AugAssign {
                target: self.expr(target),
                op,
                value: self.expr(value),
            },
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => Stmt::AnnAssign {
                target: self.expr(target),
                annotation: self.expr(annotation),
                value: value.map(|v| self.expr(v)),
            },
            Stmt::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            } => Stmt::For {
                target: self.expr(target),
                iter: self.expr(iter),
                body: self.stmts(body),
                orelse: self.stmts(orelse),
                is_async,
            },
            Stmt::While { test, body, orelse } => Stmt::While {
                test: self.expr(test),
                body: self.stmts(body),
                orelse: self.stmts(orelse),
            },
            Stmt::If { test, body, orelse } => Stmt::If {
                test: self.expr(test),
                body: self.stmts(body),
                orelse: self.stmts(orelse),
            },
            Stmt::With {
                items,
                body,
                is_async,
            } => Stmt::With {
                items: items
                    .into_iter()
                    .map(|item| WithItem {
                        context: self.expr(item.context),
                        target: item.target.map(|t| self.expr(t)),
                    })
                    .collect(),
                body: self.stmts(body),
                is_async,
            },
            Stmt::Match { subject, cases } => Stmt::Match {
                subject: self.expr(subject),
                cases: cases
                    .into_iter()
                    .map(|case| bb_parser::ast::MatchCase {
                        pattern: self.pattern(case.pattern),
                        guard: case.guard.map(|g| self.expr(g)),
                        body: self.stmts(case.body),
                    })
                    .collect(),
            },
            Stmt::Raise { exc, cause } => Stmt::Raise {
                exc: exc.map(|e| self.expr(e)),
                cause: cause.map(|c| self.expr(c)),
            },
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => Stmt::Try {
                body: self.stmts(body),
                handlers: handlers
                    .into_iter()
                    .map(|handler| bb_parser::ast::ExceptHandler {
                        typ: handler.typ.map(|t| self.expr(t)),
                        name: self.opt_name(handler.name),
                        body: self.stmts(handler.body),
                    })
                    .collect(),
                orelse: self.stmts(orelse),
                finalbody: self.stmts(finalbody),
            },
            Stmt::Assert { test, msg } => Stmt::Assert {
                test: self.expr(test),
                msg: msg.map(|m| self.expr(m)),
            },
            imports @ (Stmt::Import(_) | Stmt::ImportFrom { .. }) => imports,
            Stmt::Global(names) => {
                Stmt::Global(names.into_iter().map(|n| self.name(n)).collect())
            }
            Stmt::Nonlocal(names) => {
                Stmt::Nonlocal(names.into_iter().map(|n| self.name(n)).collect())
            }
            Stmt::Delete(targets) => Stmt::Delete(self.exprs(targets)),
            Stmt::Expr(expr) => Stmt::Expr(self.expr(expr)),
            terminal @ (Stmt::Pass | Stmt::Break | Stmt::Continue) => terminal,
        }
    }

    fn stmts(&self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn exprs(&self, exprs: Vec<Expr>) -> Vec<Expr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn params(&self, params: Params) -> Params {
        let rename = |param: Param| Param {
            name: self.name(param.name),
            annotation: param.annotation.map(|a| Box::new(self.expr(*a))),
            default: param.default.map(|d| self.expr(d)),
        };
        Params {
            posonly: params.posonly.into_iter().map(rename).collect(),
            args: params.args.into_iter().map(rename).collect(),
            vararg: params.vararg.map(|v| Box::new(rename(*v))),
            star: params.star,
            kwonly: params.kwonly.into_iter().map(rename).collect(),
            kwarg: params.kwarg.map(|k| Box::new(rename(*k))),
        }
    }

    fn expr(&self, expr: Expr) -> Expr {
        let rebuilt = match expr {
            Expr::Name(name) => Expr::Name(self.name(name)),
            literal @ (Expr::Num(_)
            | Expr::Str(_)
            | Expr::Bytes(_)
            | Expr::Bool(_)
            | Expr::NoneLit
            | Expr::Ellipsis) => literal,
            Expr::Attribute { value, attr } => Expr::Attribute {
                value: Box::new(self.expr(*value)),
                attr,
            },
            Expr::Subscript { value, index } => Expr::Subscript {
                value: Box::new(self.expr(*value)),
                index: Box::new(self.expr(*index)),
            },
            Expr::Call { func, args } => Expr::Call {
                func: Box::new(self.expr(*func)),
                args: args
                    .into_iter()
                    .map(|arg| match arg {
                        Arg::Positional(value) => Arg::Positional(self.expr(value)),
                        Arg::Starred(value) => Arg::Starred(self.expr(value)),
                        Arg::Keyword { name, value } => Arg::Keyword {
                            name,
                            value: self.expr(value),
                        },
                        Arg::DoubleStarred(value) => Arg::DoubleStarred(self.expr(value)),
                    })
                    .collect(),
            },
            Expr::Tuple(items) => Expr::Tuple(self.exprs(items)),
            Expr::List(items) => Expr::List(self.exprs(items)),
            Expr::Set(items) => Expr::Set(self.exprs(items)),
            Expr::Dict { keys, values } => Expr::Dict {
                keys: keys
                    .into_iter()
                    .map(|key| key.map(|k| self.expr(k)))
                    .collect(),
                values: self.exprs(values),
            },
            Expr::Starred(value) => Expr::Starred(Box::new(self.expr(*value))),
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op,
                operand: Box::new(self.expr(*operand)),
            },
            Expr::BinOp { left, op, right } => Expr::BinOp {
                left: Box::new(self.expr(*left)),
                op,
                right: Box::new(self.expr(*right)),
            },
            Expr::BoolOp { op, values } => Expr::BoolOp {
                op,
                values: self.exprs(values),
            },
            Expr::Compare {
                left,
                ops,
                comparators,
            } => Expr::Compare {
                left: Box::new(self.expr(*left)),
                ops,
                comparators: self.exprs(comparators),
            },
            Expr::IfExp { test, body, orelse } => Expr::IfExp {
                test: Box::new(self.expr(*test)),
                body: Box::new(self.expr(*body)),
                orelse: Box::new(self.expr(*orelse)),
            },
            Expr::Lambda { params, body } => Expr::Lambda {
                params: Box::new(self.params(*params)),
                body: Box::new(self.expr(*body)),
            },
            Expr::Await(value) => Expr::Await(Box::new(self.expr(*value))),
            Expr::Yield(value) => Expr::Yield(value.map(|v| Box::new(self.expr(*v)))),
            Expr::YieldFrom(value) => Expr::YieldFrom(Box::new(self.expr(*value))),
            Expr::NamedExpr { target, value } => Expr::NamedExpr {
                target: self.name(target),
                value: Box::new(self.expr(*value)),
            },
            Expr::ListComp { elt, generators } => Expr::ListComp {
                elt: Box::new(self.expr(*elt)),
                generators: self.comprehensions(generators),
            },
            Expr::SetComp { elt, generators } => Expr::SetComp {
                elt: Box::new(self.expr(*elt)),
                generators: self.comprehensions(generators),
            },
            Expr::DictComp {
                key,
                value,
                generators,
            } => Expr::DictComp {
                key: Box::new(self.expr(*key)),
                value: Box::new(self.expr(*value)),
                generators: self.comprehensions(generators),
            },
            Expr::GeneratorExp { elt, generators } => Expr::GeneratorExp {
                elt: Box::new(self.expr(*elt)),
                generators: self.comprehensions(generators),
            },
            Expr::Slice { lower, upper, step } => Expr::Slice {
                lower: lower.map(|l| Box::new(self.expr(*l))),
                upper: upper.map(|u| Box::new(self.expr(*u))),
                step: step.map(|s| Box::new(self.expr(*s))),
            },
        };
        self.rules.map_expr(rebuilt)
    }

    fn comprehensions(&self, generators: Vec<Comprehension>) -> Vec<Comprehension> {
        generators
            .into_iter()
            .map(|generator| Comprehension {
                target: self.expr(generator.target),
                iter: self.expr(generator.iter),
                ifs: self.exprs(generator.ifs),
                is_async: generator.is_async,
            })
            .collect()
    }

    fn pattern(&self, pattern: Pattern) -> Pattern {
        match pattern {
            Pattern::Value(expr) => Pattern::Value(self.expr(expr)),
            Pattern::Capture { name } => Pattern::Capture {
                name: self.opt_name(name),
            },
            Pattern::Star { name } => Pattern::Star {
                name: self.opt_name(name),
            },
            Pattern::Sequence(items) => Pattern::Sequence(
                items.into_iter().map(|item| self.pattern(item)).collect(),
            ),
            Pattern::Mapping {
                keys,
                patterns,
                rest,
            } => Pattern::Mapping {
                keys: self.exprs(keys),
                patterns: patterns
                    .into_iter()
                    .map(|inner| self.pattern(inner))
                    .collect(),
                rest: self.opt_name(rest),
            },
            Pattern::Class {
                cls,
                patterns,
                kwd_names,
                kwd_patterns,
            } => Pattern::Class {
                cls: self.expr(cls),
                patterns: patterns
                    .into_iter()
                    .map(|inner| self.pattern(inner))
                    .collect(),
                kwd_names,
                kwd_patterns: kwd_patterns
                    .into_iter()
                    .map(|inner| self.pattern(inner))
                    .collect(),
            },
            Pattern::Or(choices) => Pattern::Or(
                choices
                    .into_iter()
                    .map(|choice| self.pattern(choice))
                    .collect(),
            ),
            Pattern::As { pattern, name } => Pattern::As {
                pattern: Box::new(self.pattern(*pattern)),
                name: self.name(name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_parser::parse_module;

    fn outer_function(source: &str) -> Stmt {
        let module = parse_module(source).expect("parse");
        module
            .body
            .into_iter()
            .find(|stmt| matches!(stmt, Stmt::FunctionDef { .. }))
            .expect("function")
    }

    #[test]
    fn outer_name_is_slot_zero() {
        let func = outer_function("def add(a, b):\n    return a + b\n");
        let map = NameMap::build(&func, &ExcludedNames::default());
        let reverse = map.reverse();
        assert_eq!(reverse.get("_bb_v_0").map(String::as_str), Some("add"));
        assert_eq!(reverse.get("_bb_v_1").map(String::as_str), Some("a"));
        assert_eq!(reverse.get("_bb_v_2").map(String::as_str), Some("b"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn builtins_are_not_collected() {
        let func = outer_function("def f(xs):\n    return len(xs) + max(xs)\n");
        let map = NameMap::build(&func, &ExcludedNames::default());
        let forward = map.forward();
        assert!(!forward.contains_key("len"));
        assert!(!forward.contains_key("max"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn excluded_names_are_not_collected() {
        let func = outer_function("def f(x):\n    return helper(x)\n");
        let excluded = ExcludedNames::new(["helper".to_owned()], []);
        let map = NameMap::build(&func, &excluded);
        assert!(!map.forward().contains_key("helper"));
    }

    #[test]
    fn encounter_order_assigns_slots() {
        let func = outer_function(
            "def f(z, a):\n    m = z + a\n    return m\n",
        );
        let map = NameMap::build(&func, &ExcludedNames::default());
        let reverse = map.reverse();
        // f, z, a in signature order, then m at its first appearance.
        assert_eq!(reverse.get("_bb_v_1").map(String::as_str), Some("z"));
        assert_eq!(reverse.get("_bb_v_2").map(String::as_str), Some("a"));
        assert_eq!(reverse.get("_bb_v_3").map(String::as_str), Some("m"));
    }

    #[test]
    fn recursion_reuses_slot_zero() {
        let func = outer_function("def fact(n):\n    return 1 if n < 2 else n * fact(n - 1)\n");
        let map = NameMap::build(&func, &ExcludedNames::default());
        assert_eq!(map.len(), 2);
        assert_eq!(map.forward().get("fact").map(String::as_str), Some("_bb_v_0"));
    }

    #[test]
    fn nested_def_and_bindings_collected() {
        let func = outer_function(
            "def f(xs):\n    def inner(y):\n        return y\n    try:\n        pass\n    except ValueError as e:\n        raise e\n    return [inner(i) for i in xs]\n",
        );
        let map = NameMap::build(&func, &ExcludedNames::default());
        let forward = map.forward();
        for name in ["inner", "y", "e", "i"] {
            assert!(forward.contains_key(name), "{name} should be slotted");
        }
        assert!(!forward.contains_key("ValueError"));
    }

    #[test]
    fn identical_structure_identical_slots() {
        let english = outer_function("def add(a, b):\n    return a + b\n");
        let french = outer_function("def additionner(x, y):\n    return x + y\n");
        let excluded = ExcludedNames::default();
        let english_slots: Vec<String> =
            NameMap::build(&english, &excluded).reverse().into_keys().collect();
        let french_slots: Vec<String> =
            NameMap::build(&french, &excluded).reverse().into_keys().collect();
        assert_eq!(english_slots, french_slots);
    }

    #[test]
    fn rename_round_trips() {
        let func = outer_function(
            "def f(a):\n    b = a * 2\n    return b\n",
        );
        let map = NameMap::build(&func, &ExcludedNames::default());
        let forward = map.forward();
        let reverse: HashMap<String, String> = map
            .reverse()
            .into_iter()
            .collect();
        let renamed = rename_stmt(func.clone(), &forward);
        assert_ne!(renamed, func);
        let restored = rename_stmt(renamed, &reverse);
        assert_eq!(restored, func);
    }

    #[test]
    fn from_reverse_validates_density() {
        let good: BTreeMap<String, String> = [
            ("_bb_v_0".to_owned(), "f".to_owned()),
            ("_bb_v_1".to_owned(), "x".to_owned()),
        ]
        .into();
        assert!(NameMap::from_reverse(&good).is_some());

        let sparse: BTreeMap<String, String> = [
            ("_bb_v_0".to_owned(), "f".to_owned()),
            ("_bb_v_2".to_owned(), "x".to_owned()),
        ]
        .into();
        assert!(NameMap::from_reverse(&sparse).is_none());

        let junk: BTreeMap<String, String> =
            [("slot".to_owned(), "f".to_owned())].into();
        assert!(NameMap::from_reverse(&junk).is_none());
    }
}
