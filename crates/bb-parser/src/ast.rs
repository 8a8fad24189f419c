//! Owned AST for the pool source dialect.
//!
//! Trees carry no source locations; they are rebuilt by every rewrite, so
//! two structurally identical units compare equal regardless of original
//! layout. Field declaration order is the traversal order the rest of the
//! system relies on.

/// A parsed source unit: the top-level statement list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// One name inside an import statement: `name [as asname]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImportAlias {
    /// Dotted module path (`import`) or bare imported name (`from`).
    pub name: String,
    pub asname: Option<String>,
}

impl ImportAlias {
    /// The name this alias binds in the unit's scope.
    ///
    /// For a dotted `import a.b.c` without `as`, the binding is the first
    /// component (`a`); everywhere else it is the alias or the name itself.
    pub fn bound_name(&self) -> &str {
        if let Some(asname) = &self.asname {
            return asname;
        }
        match self.name.split('.').next() {
            Some(first) => first,
            None => &self.name,
        }
    }
}

/// Function parameters, grouped the way the grammar groups them.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Params {
    /// Parameters before a `/` marker.
    pub posonly: Vec<Param>,
    pub args: Vec<Param>,
    /// `*args`, or `None` when `*` is a bare keyword-only marker.
    pub vararg: Option<Box<Param>>,
    /// Whether a `*` separator (bare or `*args`) was present.
    pub star: bool,
    pub kwonly: Vec<Param>,
    /// `**kwargs`.
    pub kwarg: Option<Box<Param>>,
}

impl Params {
    /// Iterate over every parameter in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.posonly
            .iter()
            .chain(&self.args)
            .chain(self.vararg.as_deref())
            .chain(&self.kwonly)
            .chain(self.kwarg.as_deref())
    }

    /// Mutable iteration in declaration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Param> {
        self.posonly
            .iter_mut()
            .chain(&mut self.args)
            .chain(self.vararg.as_deref_mut())
            .chain(&mut self.kwonly)
            .chain(self.kwarg.as_deref_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.posonly.is_empty()
            && self.args.is_empty()
            && self.vararg.is_none()
            && !self.star
            && self.kwonly.is_empty()
            && self.kwarg.is_none()
    }
}

/// A single parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Box<Expr>>,
    pub default: Option<Expr>,
}

/// `except [type [as name]]:` clause.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

/// One `with` item: `context [as target]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
}

/// One `case` arm of a `match` statement.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Match patterns.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    /// Literal or dotted-value pattern (`0`, `'x'`, `Color.RED`, `None`).
    Value(Expr),
    /// Capture binding, or the wildcard `_` when `name` is `None`.
    Capture { name: Option<String> },
    /// `[p, ...]` sequence pattern.
    Sequence(Vec<Pattern>),
    /// `{key: p, ..., **rest}` mapping pattern.
    Mapping {
        keys: Vec<Expr>,
        patterns: Vec<Pattern>,
        rest: Option<String>,
    },
    /// `Cls(p, ..., name=p, ...)` class pattern.
    Class {
        cls: Expr,
        patterns: Vec<Pattern>,
        kwd_names: Vec<String>,
        kwd_patterns: Vec<Pattern>,
    },
    /// `p1 | p2 | ...`
    Or(Vec<Pattern>),
    /// `p as name`.
    As {
        pattern: Box<Pattern>,
        name: String,
    },
    /// `*name` or `*_` inside a sequence pattern.
    Star { name: Option<String> },
}

/// Statements.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    FunctionDef {
        decorators: Vec<Expr>,
        name: String,
        params: Params,
        returns: Option<Expr>,
        body: Vec<Stmt>,
        is_async: bool,
    },
    Return(Option<Expr>),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        is_async: bool,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
        is_async: bool,
    },
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Import(Vec<ImportAlias>),
    ImportFrom {
        module: String,
        names: Vec<ImportAlias>,
        level: u32,
    },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Delete(Vec<Expr>),
    Expr(Expr),
    Pass,
    Break,
    Continue,
}

impl Stmt {
    /// Whether this is an import statement of either form.
    pub const fn is_import(&self) -> bool {
        matches!(self, Self::Import(_) | Self::ImportFrom { .. })
    }
}

/// Binary operators (also used for augmented assignment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mult => "*",
            Self::MatMult => "@",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
    UAdd,
    USub,
    Invert,
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

/// One argument at a call site.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Arg {
    Positional(Expr),
    Starred(Expr),
    Keyword { name: String, value: Expr },
    DoubleStarred(Expr),
}

/// One `for target in iter [if cond]*` clause of a comprehension.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Name(String),
    /// Numeric literal with its original spelling.
    Num(String),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    NoneLit,
    Ellipsis,
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict {
        /// `None` key marks a `**expr` expansion at that position.
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Starred(Box<Expr>),
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Box<Params>,
        body: Box<Expr>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    NamedExpr {
        target: String,
        value: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// `lower:upper:step`, only valid inside a subscript.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Whether this expression is a docstring-shaped literal.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::Str(_))
    }
}
