//! Deterministic source reconstruction.
//!
//! Exactly one textual form per tree: four-space indentation, no blank
//! lines, single-quoted strings, parenthesized tuples. The emitted text of
//! a canonical tree is the pool's hash preimage, so any change here is a
//! format break.

use crate::ast::{
    Arg, BinOp, BoolOp, Comprehension, ExceptHandler, Expr, ImportAlias, MatchCase, Module,
    Param, Params, Pattern, Stmt, UnaryOp, WithItem,
};

/// Serialize a module. The result always ends with a single newline
/// (or is empty for an empty module).
pub fn unparse(module: &Module) -> String {
    let mut out = String::new();
    for stmt in &module.body {
        write_stmt(&mut out, stmt, 0);
    }
    out
}

// Precedence levels, loosest binding first. `PREC_NONE` marks forms that
// need parentheses in any nested position (yield, walrus).
const PREC_NONE: u8 = 0;
const PREC_TEST: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_CMP: u8 = 5;
const PREC_BOR: u8 = 6;
const PREC_BXOR: u8 = 7;
const PREC_BAND: u8 = 8;
const PREC_SHIFT: u8 = 9;
const PREC_ARITH: u8 = 10;
const PREC_TERM: u8 = 11;
const PREC_UNARY: u8 = 12;
const PREC_POWER: u8 = 13;
const PREC_AWAIT: u8 = 14;
const PREC_POSTFIX: u8 = 15;
const PREC_ATOM: u8 = 16;

const fn bin_prec(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => PREC_BOR,
        BinOp::BitXor => PREC_BXOR,
        BinOp::BitAnd => PREC_BAND,
        BinOp::LShift | BinOp::RShift => PREC_SHIFT,
        BinOp::Add | BinOp::Sub => PREC_ARITH,
        BinOp::Mult | BinOp::MatMult | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => PREC_TERM,
        BinOp::Pow => PREC_POWER,
    }
}

fn prec(expr: &Expr) -> u8 {
    match expr {
        Expr::NamedExpr { .. } | Expr::Yield(_) | Expr::YieldFrom(_) => PREC_NONE,
        Expr::Lambda { .. } | Expr::IfExp { .. } => PREC_TEST,
        Expr::BoolOp { op, .. } => match op {
            BoolOp::Or => PREC_OR,
            BoolOp::And => PREC_AND,
        },
        Expr::UnaryOp { op, .. } => match op {
            UnaryOp::Not => PREC_NOT,
            _ => PREC_UNARY,
        },
        Expr::Compare { .. } => PREC_CMP,
        Expr::BinOp { op, .. } => bin_prec(*op),
        Expr::Await(_) => PREC_AWAIT,
        Expr::Attribute { .. } | Expr::Subscript { .. } | Expr::Call { .. } => PREC_POSTFIX,
        _ => PREC_ATOM,
    }
}

fn indent_to(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    match stmt {
        Stmt::FunctionDef {
            decorators,
            name,
            params,
            returns,
            body,
            is_async,
        } => {
            for decorator in decorators {
                indent_to(out, indent);
                out.push('@');
                write_expr(out, decorator, PREC_TEST);
                out.push('\n');
            }
            indent_to(out, indent);
            if *is_async {
                out.push_str("async ");
            }
            out.push_str("def ");
            out.push_str(name);
            out.push('(');
            write_params(out, params, true);
            out.push(')');
            if let Some(returns) = returns {
                out.push_str(" -> ");
                write_expr(out, returns, PREC_TEST);
            }
            write_block(out, body, indent);
        }
        Stmt::Return(value) => {
            indent_to(out, indent);
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, PREC_TEST);
            }
            out.push('\n');
        }
        Stmt::Assign { targets, value } => {
            indent_to(out, indent);
            for target in targets {
                write_expr(out, target, PREC_TEST);
                out.push_str(" = ");
            }
            write_expr(out, value, PREC_TEST);
            out.push('\n');
        }
        Stmt::AugAssign { target, op, value } => {
            indent_to(out, indent);
            write_expr(out, target, PREC_TEST);
            out.push(' ');
            out.push_str(op.as_str());
            out.push_str("= ");
            write_expr(out, value, PREC_TEST);
            out.push('\n');
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
        } => {
            indent_to(out, indent);
            write_expr(out, target, PREC_POSTFIX);
            out.push_str(": ");
            write_expr(out, annotation, PREC_TEST);
            if let Some(value) = value {
                out.push_str(" = ");
                write_expr(out, value, PREC_TEST);
            }
            out.push('\n');
        }
        Stmt::For {
            target,
            iter,
            body,
            orelse,
            is_async,
        } => {
            indent_to(out, indent);
            if *is_async {
                out.push_str("async ");
            }
            out.push_str("for ");
            write_expr(out, target, PREC_TEST);
            out.push_str(" in ");
            write_expr(out, iter, PREC_TEST);
            write_block(out, body, indent);
            write_else(out, orelse, indent);
        }
        Stmt::While { test, body, orelse } => {
            indent_to(out, indent);
            out.push_str("while ");
            write_expr(out, test, PREC_TEST);
            write_block(out, body, indent);
            write_else(out, orelse, indent);
        }
        Stmt::If { test, body, orelse } => {
            write_if(out, test, body, orelse, indent, "if");
        }
        Stmt::With {
            items,
            body,
            is_async,
        } => {
            indent_to(out, indent);
            if *is_async {
                out.push_str("async ");
            }
            out.push_str("with ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_with_item(out, item);
            }
            write_block(out, body, indent);
        }
        Stmt::Match { subject, cases } => {
            indent_to(out, indent);
            out.push_str("match ");
            write_expr(out, subject, PREC_TEST);
            out.push_str(":\n");
            for case in cases {
                write_case(out, case, indent + 1);
            }
        }
        Stmt::Raise { exc, cause } => {
            indent_to(out, indent);
            out.push_str("raise");
            if let Some(exc) = exc {
                out.push(' ');
                write_expr(out, exc, PREC_TEST);
                if let Some(cause) = cause {
                    out.push_str(" from ");
                    write_expr(out, cause, PREC_TEST);
                }
            }
            out.push('\n');
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            indent_to(out, indent);
            out.push_str("try");
            write_block(out, body, indent);
            for handler in handlers {
                write_handler(out, handler, indent);
            }
            write_else(out, orelse, indent);
            if !finalbody.is_empty() {
                indent_to(out, indent);
                out.push_str("finally");
                write_block(out, finalbody, indent);
            }
        }
        Stmt::Assert { test, msg } => {
            indent_to(out, indent);
            out.push_str("assert ");
            write_expr(out, test, PREC_TEST);
            if let Some(msg) = msg {
                out.push_str(", ");
                write_expr(out, msg, PREC_TEST);
            }
            out.push('\n');
        }
        Stmt::Import(names) => {
            indent_to(out, indent);
            out.push_str("import ");
            write_aliases(out, names);
            out.push('\n');
        }
        Stmt::ImportFrom {
            module,
            names,
            level,
        } => {
            indent_to(out, indent);
            out.push_str("from ");
            for _ in 0..*level {
                out.push('.');
            }
            out.push_str(module);
            out.push_str(" import ");
            write_aliases(out, names);
            out.push('\n');
        }
        Stmt::Global(names) => {
            indent_to(out, indent);
            out.push_str("global ");
            out.push_str(&names.join(", "));
            out.push('\n');
        }
        Stmt::Nonlocal(names) => {
            indent_to(out, indent);
            out.push_str("nonlocal ");
            out.push_str(&names.join(", "));
            out.push('\n');
        }
        Stmt::Delete(targets) => {
            indent_to(out, indent);
            out.push_str("del ");
            for (i, target) in targets.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, target, PREC_TEST);
            }
            out.push('\n');
        }
        Stmt::Expr(expr) => {
            indent_to(out, indent);
            // A bare yield statement is written unparenthesized.
            let ctx = if matches!(expr, Expr::Yield(_) | Expr::YieldFrom(_)) {
                PREC_NONE
            } else {
                PREC_TEST
            };
            write_expr(out, expr, ctx);
            out.push('\n');
        }
        Stmt::Pass => {
            indent_to(out, indent);
            out.push_str("pass\n");
        }
        Stmt::Break => {
            indent_to(out, indent);
            out.push_str("break\n");
        }
        Stmt::Continue => {
            indent_to(out, indent);
            out.push_str("continue\n");
        }
    }
}

fn write_if(out: &mut String, test: &Expr, body: &[Stmt], orelse: &[Stmt], indent: usize, kw: &str) {
    indent_to(out, indent);
    out.push_str(kw);
    out.push(' ');
    write_expr(out, test, PREC_TEST);
    write_block(out, body, indent);
    match orelse {
        [] => {}
        [Stmt::If {
            test: elif_test,
            body: elif_body,
            orelse: elif_orelse,
        }] => {
            write_if(out, elif_test, elif_body, elif_orelse, indent, "elif");
        }
        _ => {
            indent_to(out, indent);
            out.push_str("else");
            write_block(out, orelse, indent);
        }
    }
}

fn write_else(out: &mut String, orelse: &[Stmt], indent: usize) {
    if !orelse.is_empty() {
        indent_to(out, indent);
        out.push_str("else");
        write_block(out, orelse, indent);
    }
}

fn write_block(out: &mut String, body: &[Stmt], indent: usize) {
    out.push_str(":\n");
    if body.is_empty() {
        indent_to(out, indent + 1);
        out.push_str("pass\n");
        return;
    }
    for stmt in body {
        write_stmt(out, stmt, indent + 1);
    }
}

fn write_handler(out: &mut String, handler: &ExceptHandler, indent: usize) {
    indent_to(out, indent);
    out.push_str("except");
    if let Some(typ) = &handler.typ {
        out.push(' ');
        write_expr(out, typ, PREC_TEST);
        if let Some(name) = &handler.name {
            out.push_str(" as ");
            out.push_str(name);
        }
    }
    write_block(out, &handler.body, indent);
}

fn write_with_item(out: &mut String, item: &WithItem) {
    write_expr(out, &item.context, PREC_TEST);
    if let Some(target) = &item.target {
        out.push_str(" as ");
        write_expr(out, target, PREC_TEST);
    }
}

fn write_case(out: &mut String, case: &MatchCase, indent: usize) {
    indent_to(out, indent);
    out.push_str("case ");
    write_pattern(out, &case.pattern);
    if let Some(guard) = &case.guard {
        out.push_str(" if ");
        write_expr(out, guard, PREC_TEST);
    }
    write_block(out, &case.body, indent);
}

fn write_pattern(out: &mut String, pattern: &Pattern) {
    match pattern {
        Pattern::Value(expr) => write_expr(out, expr, PREC_TEST),
        Pattern::Capture { name } => match name {
            Some(name) => out.push_str(name),
            None => out.push('_'),
        },
        Pattern::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_pattern(out, item);
            }
            out.push(']');
        }
        Pattern::Mapping {
            keys,
            patterns,
            rest,
        } => {
            out.push('{');
            let mut first = true;
            for (key, pattern) in keys.iter().zip(patterns) {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_expr(out, key, PREC_TEST);
                out.push_str(": ");
                write_pattern(out, pattern);
            }
            if let Some(rest) = rest {
                if !first {
                    out.push_str(", ");
                }
                out.push_str("**");
                out.push_str(rest);
            }
            out.push('}');
        }
        Pattern::Class {
            cls,
            patterns,
            kwd_names,
            kwd_patterns,
        } => {
            write_expr(out, cls, PREC_POSTFIX);
            out.push('(');
            let mut first = true;
            for pattern in patterns {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_pattern(out, pattern);
            }
            for (name, pattern) in kwd_names.iter().zip(kwd_patterns) {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                out.push_str(name);
                out.push('=');
                write_pattern(out, pattern);
            }
            out.push(')');
        }
        Pattern::Or(choices) => {
            for (i, choice) in choices.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                write_pattern(out, choice);
            }
        }
        Pattern::As { pattern, name } => {
            write_pattern(out, pattern);
            out.push_str(" as ");
            out.push_str(name);
        }
        Pattern::Star { name } => {
            out.push('*');
            match name {
                Some(name) => out.push_str(name),
                None => out.push('_'),
            }
        }
    }
}

fn write_aliases(out: &mut String, names: &[ImportAlias]) {
    for (i, alias) in names.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&alias.name);
        if let Some(asname) = &alias.asname {
            out.push_str(" as ");
            out.push_str(asname);
        }
    }
}

fn write_params(out: &mut String, params: &Params, annotations: bool) {
    let mut first = true;
    let mut sep = |out: &mut String| {
        if !first {
            out.push_str(", ");
        }
        first = false;
    };

    for param in &params.posonly {
        sep(out);
        write_param(out, param, annotations);
    }
    if !params.posonly.is_empty() {
        sep(out);
        out.push('/');
    }
    for param in &params.args {
        sep(out);
        write_param(out, param, annotations);
    }
    if params.star {
        sep(out);
        out.push('*');
        if let Some(vararg) = &params.vararg {
            write_param(out, vararg, annotations);
        }
    }
    for param in &params.kwonly {
        sep(out);
        write_param(out, param, annotations);
    }
    if let Some(kwarg) = &params.kwarg {
        sep(out);
        out.push_str("**");
        write_param(out, kwarg, annotations);
    }
}

fn write_param(out: &mut String, param: &Param, annotations: bool) {
    out.push_str(&param.name);
    if annotations {
        if let Some(annotation) = &param.annotation {
            out.push_str(": ");
            write_expr(out, annotation, PREC_TEST);
        }
    }
    if let Some(default) = &param.default {
        out.push('=');
        write_expr(out, default, PREC_TEST);
    }
}

fn write_expr(out: &mut String, expr: &Expr, ctx: u8) {
    let p = prec(expr);
    let parens = p < ctx;
    if parens {
        out.push('(');
    }
    write_expr_inner(out, expr);
    if parens {
        out.push(')');
    }
}

fn write_expr_inner(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Name(name) => out.push_str(name),
        Expr::Num(text) => out.push_str(text),
        Expr::Str(value) => write_str_literal(out, value),
        Expr::Bytes(value) => write_bytes_literal(out, value),
        Expr::Bool(true) => out.push_str("True"),
        Expr::Bool(false) => out.push_str("False"),
        Expr::NoneLit => out.push_str("None"),
        Expr::Ellipsis => out.push_str("..."),
        Expr::Attribute { value, attr } => {
            // A numeric literal needs parentheses before a dot.
            if matches!(**value, Expr::Num(_)) {
                out.push('(');
                write_expr(out, value, PREC_NONE);
                out.push(')');
            } else {
                write_expr(out, value, PREC_POSTFIX);
            }
            out.push('.');
            out.push_str(attr);
        }
        Expr::Subscript { value, index } => {
            write_expr(out, value, PREC_POSTFIX);
            out.push('[');
            write_subscript_index(out, index);
            out.push(']');
        }
        Expr::Call { func, args } => {
            write_expr(out, func, PREC_POSTFIX);
            out.push('(');
            // A lone generator argument borrows the call's parentheses.
            if let [Arg::Positional(Expr::GeneratorExp { elt, generators })] = args.as_slice() {
                write_expr(out, elt, PREC_TEST);
                write_comprehensions(out, generators);
            } else {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match arg {
                        Arg::Positional(value) => write_expr(out, value, PREC_TEST),
                        Arg::Starred(value) => {
                            out.push('*');
                            write_expr(out, value, PREC_BOR);
                        }
                        Arg::Keyword { name, value } => {
                            out.push_str(name);
                            out.push('=');
                            write_expr(out, value, PREC_TEST);
                        }
                        Arg::DoubleStarred(value) => {
                            out.push_str("**");
                            write_expr(out, value, PREC_BOR);
                        }
                    }
                }
            }
            out.push(')');
        }
        Expr::Tuple(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item, PREC_TEST);
            }
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item, PREC_TEST);
            }
            out.push(']');
        }
        Expr::Set(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item, PREC_TEST);
            }
            out.push('}');
        }
        Expr::Dict { keys, values } => {
            out.push('{');
            for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match key {
                    Some(key) => {
                        write_expr(out, key, PREC_TEST);
                        out.push_str(": ");
                        write_expr(out, value, PREC_TEST);
                    }
                    None => {
                        out.push_str("**");
                        write_expr(out, value, PREC_BOR);
                    }
                }
            }
            out.push('}');
        }
        Expr::Starred(value) => {
            out.push('*');
            write_expr(out, value, PREC_BOR);
        }
        Expr::UnaryOp { op, operand } => {
            match op {
                UnaryOp::Not => {
                    out.push_str("not ");
                    write_expr(out, operand, PREC_NOT);
                }
                UnaryOp::UAdd => {
                    out.push('+');
                    write_expr(out, operand, PREC_UNARY);
                }
                UnaryOp::USub => {
                    out.push('-');
                    write_expr(out, operand, PREC_UNARY);
                }
                UnaryOp::Invert => {
                    out.push('~');
                    write_expr(out, operand, PREC_UNARY);
                }
            }
        }
        Expr::BinOp { left, op, right } => {
            let p = bin_prec(*op);
            let (left_ctx, right_ctx) = if *op == BinOp::Pow {
                (p + 1, p)
            } else {
                (p, p + 1)
            };
            write_expr(out, left, left_ctx);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            write_expr(out, right, right_ctx);
        }
        Expr::BoolOp { op, values } => {
            let (p, text) = match op {
                BoolOp::Or => (PREC_OR, " or "),
                BoolOp::And => (PREC_AND, " and "),
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(text);
                }
                write_expr(out, value, p + 1);
            }
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            write_expr(out, left, PREC_CMP + 1);
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push(' ');
                out.push_str(op.as_str());
                out.push(' ');
                write_expr(out, comparator, PREC_CMP + 1);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            write_expr(out, body, PREC_OR);
            out.push_str(" if ");
            write_expr(out, test, PREC_OR);
            out.push_str(" else ");
            write_expr(out, orelse, PREC_TEST);
        }
        Expr::Lambda { params, body } => {
            out.push_str("lambda");
            if !params.is_empty() {
                out.push(' ');
                write_params(out, params, false);
            }
            out.push_str(": ");
            write_expr(out, body, PREC_TEST);
        }
        Expr::Await(value) => {
            out.push_str("await ");
            write_expr(out, value, PREC_POSTFIX);
        }
        Expr::Yield(value) => {
            out.push_str("yield");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, PREC_TEST);
            }
        }
        Expr::YieldFrom(value) => {
            out.push_str("yield from ");
            write_expr(out, value, PREC_TEST);
        }
        Expr::NamedExpr { target, value } => {
            out.push_str(target);
            out.push_str(" := ");
            write_expr(out, value, PREC_TEST);
        }
        Expr::ListComp { elt, generators } => {
            out.push('[');
            write_expr(out, elt, PREC_TEST);
            write_comprehensions(out, generators);
            out.push(']');
        }
        Expr::SetComp { elt, generators } => {
            out.push('{');
            write_expr(out, elt, PREC_TEST);
            write_comprehensions(out, generators);
            out.push('}');
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            out.push('{');
            write_expr(out, key, PREC_TEST);
            out.push_str(": ");
            write_expr(out, value, PREC_TEST);
            write_comprehensions(out, generators);
            out.push('}');
        }
        Expr::GeneratorExp { elt, generators } => {
            out.push('(');
            write_expr(out, elt, PREC_TEST);
            write_comprehensions(out, generators);
            out.push(')');
        }
        Expr::Slice { .. } => {
            // Slices are emitted by their enclosing subscript; a lone
            // slice can only appear there.
            write_slice(out, expr);
        }
    }
}

fn write_subscript_index(out: &mut String, index: &Expr) {
    match index {
        Expr::Slice { .. } => write_slice(out, index),
        // A tuple index containing slices cannot be parenthesized.
        Expr::Tuple(items)
            if !items.is_empty()
                && items.iter().any(|item| matches!(item, Expr::Slice { .. })) =>
        {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match item {
                    Expr::Slice { .. } => write_slice(out, item),
                    other => write_expr(out, other, PREC_TEST),
                }
            }
        }
        other => write_expr(out, other, PREC_TEST),
    }
}

fn write_slice(out: &mut String, slice: &Expr) {
    let Expr::Slice { lower, upper, step } = slice else {
        return;
    };
    if let Some(lower) = lower {
        write_expr(out, lower, PREC_TEST);
    }
    out.push(':');
    if let Some(upper) = upper {
        write_expr(out, upper, PREC_TEST);
    }
    if let Some(step) = step {
        out.push(':');
        write_expr(out, step, PREC_TEST);
    }
}

fn write_comprehensions(out: &mut String, generators: &[Comprehension]) {
    for generator in generators {
        if generator.is_async {
            out.push_str(" async for ");
        } else {
            out.push_str(" for ");
        }
        write_expr(out, &generator.target, PREC_TEST);
        out.push_str(" in ");
        write_expr(out, &generator.iter, PREC_OR);
        for cond in &generator.ifs {
            out.push_str(" if ");
            write_expr(out, cond, PREC_OR);
        }
    }
}

fn write_str_literal(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn write_bytes_literal(out: &mut String, value: &[u8]) {
    out.push_str("b'");
    for &b in value {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn round_trip(source: &str) -> String {
        let module = parse_module(source).expect("parse");
        let text = unparse(&module);
        let again = parse_module(&text).expect("reparse");
        assert_eq!(module, again, "unparse must preserve structure");
        text
    }

    #[test]
    fn simple_function_text() {
        let text = round_trip("def add(a, b):\n    return a + b\n");
        assert_eq!(text, "def add(a, b):\n    return a + b\n");
    }

    #[test]
    fn normalizes_whitespace() {
        let text = round_trip("def f( a ,b ):\n\n    return a+b\n");
        assert_eq!(text, "def f(a, b):\n    return a + b\n");
    }

    #[test]
    fn unparse_is_a_fixpoint() {
        let sources = [
            "def f(x, y=1, *args, z, **kw):\n    return [a * 2 for a in x if a]\n",
            "async def g(u):\n    r = await fetch(u)\n    return r\n",
            "from a.b import c as d\nimport os\n\ndef f():\n    with open(d) as h:\n        pass\n",
            "def f(n):\n    while n > 0:\n        n -= 1\n    else:\n        pass\n    return n\n",
            "def f(x):\n    try:\n        g()\n    except ValueError as e:\n        raise RuntimeError('bad') from e\n    finally:\n        h()\n",
            "def f(d):\n    return {k: v for k, v in d.items() if k not in (1, 2)}\n",
        ];
        for source in sources {
            let once = round_trip(source);
            let module = parse_module(&once).expect("parse");
            assert_eq!(unparse(&module), once, "second pass must be identical");
        }
    }

    #[test]
    fn precedence_parentheses() {
        assert_eq!(round_trip("x = (a + b) * c\n"), "x = (a + b) * c\n");
        assert_eq!(round_trip("x = a + b * c\n"), "x = a + b * c\n");
        assert_eq!(round_trip("x = (-a) ** b\n"), "x = (-a) ** b\n");
        assert_eq!(round_trip("x = -a ** b\n"), "x = -a ** b\n");
        assert_eq!(round_trip("x = a ** b ** c\n"), "x = a ** b ** c\n");
        assert_eq!(round_trip("x = (a ** b) ** c\n"), "x = (a ** b) ** c\n");
        assert_eq!(
            round_trip("x = not (a or b) and c\n"),
            "x = not (a or b) and c\n"
        );
        assert_eq!(
            round_trip("x = (a if b else c) if d else e\n"),
            "x = (a if b else c) if d else e\n"
        );
    }

    #[test]
    fn tuples_are_parenthesized() {
        assert_eq!(round_trip("x = 1, 2\n"), "x = (1, 2)\n");
        assert_eq!(round_trip("x = 1,\n"), "x = (1,)\n");
        assert_eq!(round_trip("x = ()\n"), "x = ()\n");
    }

    #[test]
    fn slice_tuple_index_unparenthesized() {
        assert_eq!(round_trip("y = x[1:2, 3]\n"), "y = x[1:2, 3]\n");
        assert_eq!(round_trip("y = x[::2]\n"), "y = x[::2]\n");
        assert_eq!(round_trip("y = x[a:b:c]\n"), "y = x[a:b:c]\n");
    }

    #[test]
    fn string_quoting_is_canonical() {
        assert_eq!(round_trip("x = \"hi\"\n"), "x = 'hi'\n");
        assert_eq!(round_trip("x = 'it\\'s'\n"), "x = 'it\\'s'\n");
        assert_eq!(round_trip("x = '\\n\\t'\n"), "x = '\\n\\t'\n");
        assert_eq!(round_trip("x = 'caf\u{e9}'\n"), "x = 'caf\u{e9}'\n");
        assert_eq!(round_trip("x = b'\\x00a'\n"), "x = b'\\x00a'\n");
    }

    #[test]
    fn docstring_position_statement() {
        let text = round_trip("def f():\n    'doc'\n    return 1\n");
        assert_eq!(text, "def f():\n    'doc'\n    return 1\n");
    }

    #[test]
    fn attribute_on_number_gets_parens() {
        let module = parse_module("x = (1).real\n").expect("parse");
        assert_eq!(unparse(&module), "x = (1).real\n");
    }

    #[test]
    fn generator_argument_single_parens() {
        assert_eq!(
            round_trip("x = sum(i * i for i in xs)\n"),
            "x = sum(i * i for i in xs)\n"
        );
    }

    #[test]
    fn yield_and_walrus_forms() {
        assert_eq!(
            round_trip("def g():\n    x = yield 1\n    yield\n"),
            "def g():\n    x = (yield 1)\n    yield\n"
        );
        assert_eq!(
            round_trip("if (n := f()) > 0:\n    pass\n"),
            "if (n := f()) > 0:\n    pass\n"
        );
    }

    #[test]
    fn match_statement_round_trip() {
        let text = round_trip(
            "def f(p):\n    match p:\n        case [x, *rest] if x:\n            return rest\n        case {'k': v}:\n            return v\n        case Point(x=0) | None:\n            return 0\n        case _:\n            return p\n",
        );
        let module = parse_module(&text).expect("parse");
        assert_eq!(unparse(&module), text);
    }

    #[test]
    fn chained_comparison_text() {
        assert_eq!(round_trip("x = a < b <= c\n"), "x = a < b <= c\n");
        assert_eq!(round_trip("x = a not in b\n"), "x = a not in b\n");
        assert_eq!(round_trip("x = a is not b\n"), "x = a is not b\n");
    }

    #[test]
    fn positional_only_params() {
        assert_eq!(
            round_trip("def f(a, /, b, *, c):\n    pass\n"),
            "def f(a, /, b, *, c):\n    pass\n"
        );
    }

    #[test]
    fn lambda_forms() {
        assert_eq!(round_trip("f = lambda: 0\n"), "f = lambda: 0\n");
        assert_eq!(
            round_trip("f = lambda x, y=1: x + y\n"),
            "f = lambda x, y=1: x + y\n"
        );
    }
}
