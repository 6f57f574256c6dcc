//! Frozen AST node shapes.
//!
//! Parsing is out of scope for this crate (see spec §1's "Out of scope"
//! list); callers hand a fully-built [`Module`] to [`crate::module`] and
//! this crate only evaluates it. Every node here is a plain data type with
//! no behavior beyond what §6 requires it to carry — `is_mono`/`mod_reverse`
//! on statements, `has_mono` on expressions, and the three named parameter
//! fields — mirroring the teacher's own frozen, parser-built `bytecode::Code`
//! representation, except as a tree of tagged variants rather than a flat
//! instruction array, per spec §9's explicit modeling guidance.

use crate::rational::Rational;

/// Binary operators available to [`Expr::Binop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
}

/// Unary operators available to [`Expr::Uniop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniOp {
    Not,
    Neg,
}

/// Operators available to [`Stmt::Modop`] (`x op= e`). The first four form
/// the inverse pairs `+=`/`-=` and `*=`/`/=`; the rest are self-inverse or
/// have no useful inverse and so are rejected when `Modop` itself runs
/// backward outside a mono context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
    Mod,
    Xor,
    Or,
    And,
}

impl ModOp {
    /// The operator that undoes this one when running backward.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Sub,
            Self::Sub => Self::Add,
            Self::Mul => Self::Div,
            Self::Div => Self::Mul,
            other => other,
        }
    }
}

/// An expression node. Every variant carries `has_mono`: whether evaluating
/// it reads a mono variable, which the statement executor consults when
/// deciding whether a direction flip is legal.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Rational),
    Lookup {
        name: String,
        index: Vec<Expr>,
        has_mono: bool,
    },
    Binop {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        has_mono: bool,
    },
    Uniop {
        op: UniOp,
        operand: Box<Expr>,
        has_mono: bool,
    },
    Length {
        expr: Box<Expr>,
        has_mono: bool,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
        has_mono: bool,
        /// Always `true`: array literals synthesize fresh memory, so `let`
        /// and `global` may move rather than deep-copy their result.
        unowned: bool,
    },
    ArrayRange {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Box<Expr>,
        has_mono: bool,
        unowned: bool,
    },
    ArrayTensor {
        dims: Vec<Expr>,
        fill: Box<Expr>,
        has_mono: bool,
        unowned: bool,
    },
    ThreadId,
    NumThreads,
}

impl Expr {
    #[must_use]
    pub fn has_mono(&self) -> bool {
        match self {
            Self::Literal(_) | Self::ThreadId | Self::NumThreads => false,
            Self::Lookup { has_mono, .. }
            | Self::Binop { has_mono, .. }
            | Self::Uniop { has_mono, .. }
            | Self::Length { has_mono, .. }
            | Self::ArrayLiteral { has_mono, .. }
            | Self::ArrayRange { has_mono, .. }
            | Self::ArrayTensor { has_mono, .. } => *has_mono,
        }
    }

    /// Whether this expression synthesizes fresh, unshared memory — array
    /// literals, ranges, and tensors — so `let`/`global` may move its result
    /// instead of deep-copying it.
    #[must_use]
    pub fn is_unowned(&self) -> bool {
        matches!(
            self,
            Self::ArrayLiteral { unowned: true, .. }
                | Self::ArrayRange { unowned: true, .. }
                | Self::ArrayTensor { unowned: true, .. }
        )
    }
}

/// An indexable name reference: a variable name plus zero or more index
/// expressions walking into its memory tree. Shared by `Unlet`/`Modop`/
/// `Swap`/`Push`/`Pop` targets, which all resolve a path rather than a bare
/// name.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub name: String,
    pub index: Vec<Expr>,
}

impl Path {
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: Vec::new(),
        }
    }
}

/// One call frame within a [`Stmt::CallChain`]: a function name, whether
/// this call site uncalls it, an optional thread-count expression for a
/// parallel call, and the names borrowed (not stolen) from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBlock {
    pub function_name: String,
    pub is_uncall: bool,
    pub num_threads: Option<Expr>,
    pub borrowed_args: Vec<String>,
}

/// A formal parameter: its name, whether it binds a mono variable, and
/// whether it is passed by reference rather than stolen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub mono_name: bool,
    pub is_borrowed: bool,
}

/// A statement node. `eval` (implemented in [`crate::stmt`]) takes the
/// current direction and returns the direction after the statement ran;
/// most statements return their input unchanged, but `DoUndo`, `Try`,
/// `CallChain`, and `Loop` may flip it.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        expr: Expr,
        is_mono: bool,
        mod_reverse: bool,
    },
    Unlet {
        name: String,
        expr: Expr,
        is_mono: bool,
        mod_reverse: bool,
    },
    Modop {
        target: Path,
        op: ModOp,
        expr: Expr,
        is_mono: bool,
        mod_reverse: bool,
    },
    Swap {
        left: Path,
        right: Path,
        is_mono: bool,
        mod_reverse: bool,
    },
    Push {
        src: String,
        dst: Path,
        is_mono: bool,
        mod_reverse: bool,
    },
    Pop {
        src: Path,
        dst: String,
        is_mono: bool,
        mod_reverse: bool,
    },
    Promote {
        src: String,
        dst: String,
        is_mono: bool,
        mod_reverse: bool,
    },
    If {
        entry_cond: Expr,
        exit_cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    Loop {
        forward_cond: Expr,
        backward_cond: Expr,
        body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    For {
        var: String,
        var_is_mono: bool,
        iterable: Expr,
        body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    DoUndo {
        do_body: Vec<Stmt>,
        yield_body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    Try {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    Catch {
        cond: Expr,
        is_mono: bool,
        mod_reverse: bool,
    },
    Print {
        args: Vec<Expr>,
        newline: bool,
        is_mono: bool,
        mod_reverse: bool,
    },
    Barrier {
        name: String,
        is_mono: bool,
        mod_reverse: bool,
    },
    Mutex {
        name: String,
        body: Vec<Stmt>,
        is_mono: bool,
        mod_reverse: bool,
    },
    CallChain {
        in_params: Vec<String>,
        calls: Vec<CallBlock>,
        out_params: Vec<String>,
        is_mono: bool,
        mod_reverse: bool,
    },
    Global {
        name: String,
        expr: Expr,
        is_mono: bool,
        mod_reverse: bool,
    },
    Import {
        path: String,
        alias: Option<String>,
        is_mono: bool,
        mod_reverse: bool,
    },
}

impl Stmt {
    #[must_use]
    pub fn is_mono(&self) -> bool {
        match self {
            Self::Let { is_mono, .. }
            | Self::Unlet { is_mono, .. }
            | Self::Modop { is_mono, .. }
            | Self::Swap { is_mono, .. }
            | Self::Push { is_mono, .. }
            | Self::Pop { is_mono, .. }
            | Self::Promote { is_mono, .. }
            | Self::If { is_mono, .. }
            | Self::Loop { is_mono, .. }
            | Self::For { is_mono, .. }
            | Self::DoUndo { is_mono, .. }
            | Self::Try { is_mono, .. }
            | Self::Catch { is_mono, .. }
            | Self::Print { is_mono, .. }
            | Self::Barrier { is_mono, .. }
            | Self::Mutex { is_mono, .. }
            | Self::CallChain { is_mono, .. }
            | Self::Global { is_mono, .. }
            | Self::Import { is_mono, .. } => *is_mono,
        }
    }

    /// A short, stable name for this statement kind, used only by
    /// [`crate::tracer::VmTracer`] hooks.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Let { .. } => "let",
            Self::Unlet { .. } => "unlet",
            Self::Modop { .. } => "modop",
            Self::Swap { .. } => "swap",
            Self::Push { .. } => "push",
            Self::Pop { .. } => "pop",
            Self::Promote { .. } => "promote",
            Self::If { .. } => "if",
            Self::Loop { .. } => "loop",
            Self::For { .. } => "for",
            Self::DoUndo { .. } => "do_undo",
            Self::Try { .. } => "try",
            Self::Catch { .. } => "catch",
            Self::Print { .. } => "print",
            Self::Barrier { .. } => "barrier",
            Self::Mutex { .. } => "mutex",
            Self::CallChain { .. } => "call_chain",
            Self::Global { .. } => "global",
            Self::Import { .. } => "import",
        }
    }

    #[must_use]
    pub fn mod_reverse(&self) -> bool {
        match self {
            Self::Let { mod_reverse, .. }
            | Self::Unlet { mod_reverse, .. }
            | Self::Modop { mod_reverse, .. }
            | Self::Swap { mod_reverse, .. }
            | Self::Push { mod_reverse, .. }
            | Self::Pop { mod_reverse, .. }
            | Self::Promote { mod_reverse, .. }
            | Self::If { mod_reverse, .. }
            | Self::Loop { mod_reverse, .. }
            | Self::For { mod_reverse, .. }
            | Self::DoUndo { mod_reverse, .. }
            | Self::Try { mod_reverse, .. }
            | Self::Catch { mod_reverse, .. }
            | Self::Print { mod_reverse, .. }
            | Self::Barrier { mod_reverse, .. }
            | Self::Mutex { mod_reverse, .. }
            | Self::CallChain { mod_reverse, .. }
            | Self::Global { mod_reverse, .. }
            | Self::Import { mod_reverse, .. } => *mod_reverse,
        }
    }
}

/// A function definition: its name, the two parameter lists (in-params are
/// the out-params when uncalling, and vice versa), and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub in_params: Vec<Parameter>,
    pub out_params: Vec<Parameter>,
    pub body: Vec<Stmt>,
}

/// A whole loaded source file: the lines that run at module-load time
/// (imports and global bindings) plus the functions it defines.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub global_lines: Vec<Stmt>,
    pub functions: Vec<Function>,
}
