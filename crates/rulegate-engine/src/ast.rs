//! Abstract syntax tree for the constrained rule dialect.
//!
//! The dialect is an ES5-flavored subset: plain functions and closures,
//! the usual expression operators, structured control flow, and nothing
//! that could reach outside the interpreter (no modules, no async, no
//! dynamic code).

use std::rc::Rc;

/// A statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `var`/`let`/`const` declaration (all scoped alike in this dialect).
    VarDecl {
        /// Declarators: bound name and optional initializer.
        decls: Vec<(String, Option<Expr>)>,
    },
    /// `function name(params) { body }` — hoisted within its block.
    FunctionDecl {
        /// Function name.
        name: String,
        /// Parameter names.
        params: Vec<String>,
        /// Body statements, shared with closures created from this decl.
        body: Rc<Vec<Stmt>>,
    },
    /// Bare expression statement.
    Expr(Expr),
    /// `return expr?;`
    Return(Option<Expr>),
    /// `if (cond) … else …`
    If {
        /// Condition.
        cond: Expr,
        /// Then branch.
        then_branch: Box<Stmt>,
        /// Optional else branch.
        else_branch: Option<Box<Stmt>>,
    },
    /// `{ … }`
    Block(Vec<Stmt>),
    /// `while (cond) body`
    While {
        /// Loop condition.
        cond: Expr,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `do body while (cond);`
    DoWhile {
        /// Loop body.
        body: Box<Stmt>,
        /// Loop condition.
        cond: Expr,
    },
    /// `for (init; cond; update) body`
    For {
        /// Optional init statement (declaration or expression).
        init: Option<Box<Stmt>>,
        /// Optional condition (absent means `true`).
        cond: Option<Expr>,
        /// Optional update expression.
        update: Option<Expr>,
        /// Loop body.
        body: Box<Stmt>,
    },
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `throw expr;`
    Throw(Expr),
    /// `try { … } catch (e) { … } finally { … }`
    Try {
        /// Protected block.
        block: Vec<Stmt>,
        /// Catch clause: optional binding name and body.
        catch: Option<(Option<String>, Vec<Stmt>)>,
        /// Finally block.
        finally: Option<Vec<Stmt>>,
    },
    /// `switch (disc) { case …: … default: … }`
    Switch {
        /// Discriminant.
        disc: Expr,
        /// Cases in source order.
        cases: Vec<SwitchCase>,
    },
    /// Lone `;`
    Empty,
}

/// One `case`/`default` arm of a switch.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Test expression, `None` for `default`.
    pub test: Option<Expr>,
    /// Statements until the next arm.
    pub body: Vec<Stmt>,
}

/// Property key in an object literal.
#[derive(Debug, Clone)]
pub enum PropKey {
    /// `key: value` or `"key": value` or `42: value`.
    Fixed(String),
    /// `[expr]: value`.
    Computed(Box<Expr>),
}

/// Member-access key.
#[derive(Debug, Clone)]
pub enum MemberKey {
    /// `obj.name`
    Dot(String),
    /// `obj[expr]`
    Bracket(Box<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!x`
    Not,
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `typeof x`
    TypeOf,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` (numeric addition or string concatenation)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Rem,
}

/// An expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Number literal.
    Num(f64),
    /// String literal.
    Str(String),
    /// Identifier reference.
    Ident(String),
    /// Array literal.
    Array(Vec<Expr>),
    /// Object literal.
    Object(Vec<(PropKey, Expr)>),
    /// Function expression or arrow function (arrows desugar to a body
    /// with a single `return`).
    Function {
        /// Optional name (named function expressions).
        name: Option<String>,
        /// Parameter names.
        params: Vec<String>,
        /// Body statements.
        body: Rc<Vec<Stmt>>,
    },
    /// Member access.
    Member {
        /// Receiver expression.
        object: Box<Expr>,
        /// Dot or bracket key.
        property: MemberKey,
    },
    /// Call expression.
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// `new Callee(args)` — constructor-style call.
    New {
        /// Constructor expression.
        callee: Box<Expr>,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// `++x` / `x++` / `--x` / `x--`
    Update {
        /// +1 or -1.
        delta: f64,
        /// Prefix (`++x`) vs postfix (`x++`).
        prefix: bool,
        /// Assignable target.
        target: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Short-circuiting operation.
    Logical {
        /// Operator.
        op: LogicalOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Assignment to an identifier or member.
    Assign {
        /// Operator (plain or compound).
        op: AssignOp,
        /// Assignable target.
        target: Box<Expr>,
        /// Value expression.
        value: Box<Expr>,
    },
    /// `cond ? then : other`
    Conditional {
        /// Condition.
        cond: Box<Expr>,
        /// Value when truthy.
        then: Box<Expr>,
        /// Value when falsy.
        other: Box<Expr>,
    },
}
