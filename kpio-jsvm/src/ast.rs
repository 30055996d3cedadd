//! JavaScript Abstract Syntax Tree definitions.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::token::Span;

/// Program node - the root of the AST.
#[derive(Debug, Clone)]
pub struct Program {
    /// Program body (statements).
    pub body: Vec<Statement>,
    /// Names declared with `var` anywhere in the top-level code.
    pub var_names: Vec<String>,
    /// Source span.
    pub span: Span,
}

/// Statement node.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Empty statement (;)
    Empty(Span),
    /// Expression statement
    Expression(ExpressionStmt),
    /// Block statement
    Block(BlockStmt),
    /// Variable declaration
    Variable(VariableDecl),
    /// If statement
    If(IfStmt),
    /// For statement
    For(ForStmt),
    /// For-in statement
    ForIn(ForInStmt),
    /// For-of statement
    ForOf(ForInStmt),
    /// While statement
    While(WhileStmt),
    /// Do-while statement
    DoWhile(WhileStmt),
    /// Switch statement
    Switch(SwitchStmt),
    /// Break statement
    Break(Span),
    /// Continue statement
    Continue(Span),
    /// Return statement
    Return(ReturnStmt),
    /// Throw statement
    Throw(ThrowStmt),
    /// Try statement
    Try(TryStmt),
    /// Function declaration
    Function(Rc<Function>),
}

impl Statement {
    /// Position of the statement's first token.
    pub fn span(&self) -> Span {
        match self {
            Statement::Empty(span) | Statement::Break(span) | Statement::Continue(span) => *span,
            Statement::Expression(s) => s.span,
            Statement::Block(s) => s.span,
            Statement::Variable(s) => s.span,
            Statement::If(s) => s.span,
            Statement::For(s) => s.span,
            Statement::ForIn(s) | Statement::ForOf(s) => s.span,
            Statement::While(s) | Statement::DoWhile(s) => s.span,
            Statement::Switch(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::Throw(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::Function(f) => f.span,
        }
    }
}

/// Expression statement.
#[derive(Debug, Clone)]
pub struct ExpressionStmt {
    pub expression: Expression,
    pub span: Span,
}

/// Block statement.
#[derive(Debug, Clone)]
pub struct BlockStmt {
    pub body: Vec<Statement>,
    pub span: Span,
}

/// Variable declaration.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

/// Variable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

/// Variable declarator.
#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub id: Identifier,
    pub init: Option<Expression>,
    pub span: Span,
}

/// If statement.
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
    pub span: Span,
}

/// For statement.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
    pub span: Span,
}

/// For loop initializer.
#[derive(Debug, Clone)]
pub enum ForInit {
    Variable(VariableDecl),
    Expression(Expression),
}

/// For-in and for-of statements.
#[derive(Debug, Clone)]
pub struct ForInStmt {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
    pub span: Span,
}

/// For-in/of left side.
#[derive(Debug, Clone)]
pub enum ForInLeft {
    /// `for (let x of ...)`
    Declaration(VariableKind, Identifier),
    /// `for (x of ...)`, `for (o.k in ...)`
    Target(Expression),
}

/// While and do-while statements.
#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub test: Expression,
    pub body: Box<Statement>,
    pub span: Span,
}

/// Switch statement.
#[derive(Debug, Clone)]
pub struct SwitchStmt {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

/// Switch case.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
}

/// Return statement.
#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub argument: Option<Expression>,
    pub span: Span,
}

/// Throw statement.
#[derive(Debug, Clone)]
pub struct ThrowStmt {
    pub argument: Expression,
    pub span: Span,
}

/// Try statement.
#[derive(Debug, Clone)]
pub struct TryStmt {
    pub block: BlockStmt,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<BlockStmt>,
    pub span: Span,
}

/// Catch clause.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Identifier>,
    pub body: BlockStmt,
}

/// A function declaration, expression or arrow function.
///
/// Shared behind an `Rc` so that every closure created from the same source
/// text points at one body.
#[derive(Debug)]
pub struct Function {
    pub id: Option<Identifier>,
    pub params: Vec<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    /// Names declared with `var` in this body, excluding nested functions.
    pub var_names: Vec<String>,
    pub span: Span,
}

impl Function {
    /// Declared name, or the empty string for anonymous functions.
    pub fn name(&self) -> &str {
        self.id.as_ref().map(|id| id.name.as_str()).unwrap_or("")
    }

    /// Number of parameters before the first default or rest parameter.
    pub fn length(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| matches!(p, Pattern::Identifier(_)))
            .count()
    }
}

/// Function body.
#[derive(Debug)]
pub enum FunctionBody {
    Block(BlockStmt),
    /// Concise arrow body: `x => x + 1`.
    Expression(Expression),
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Identifier
    Identifier(Identifier),
    /// Literal
    Literal(Literal),
    /// This expression
    This(Span),
    /// Array expression
    Array(ArrayExpr),
    /// Object expression
    Object(ObjectExpr),
    /// Function expression or arrow function
    Function(Rc<Function>),
    /// Template literal
    Template(TemplateLiteral),
    /// Member expression (a.b or a[b])
    Member(MemberExpr),
    /// Call expression
    Call(CallExpr),
    /// New expression
    New(CallExpr),
    /// Update expression (++x, x--)
    Update(UpdateExpr),
    /// Unary expression (!x, -x, etc.)
    Unary(UnaryExpr),
    /// Binary expression (a + b)
    Binary(BinaryExpr),
    /// Logical expression (a && b, a || b)
    Logical(LogicalExpr),
    /// Conditional expression (a ? b : c)
    Conditional(ConditionalExpr),
    /// Assignment expression
    Assignment(AssignmentExpr),
    /// Sequence expression (a, b, c)
    Sequence(SequenceExpr),
    /// Spread element, only valid inside call arguments and array literals
    Spread(SpreadElement),
}

impl Expression {
    /// Source position of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier(e) => e.span,
            Expression::Literal(e) => e.span(),
            Expression::This(span) => *span,
            Expression::Array(e) => e.span,
            Expression::Object(e) => e.span,
            Expression::Function(e) => e.span,
            Expression::Template(e) => e.span,
            Expression::Member(e) => e.span,
            Expression::Call(e) | Expression::New(e) => e.span,
            Expression::Update(e) => e.span,
            Expression::Unary(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Logical(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Sequence(e) => e.span,
            Expression::Spread(e) => e.span,
        }
    }
}

/// Identifier.
#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// Literal.
#[derive(Debug, Clone)]
pub enum Literal {
    Null(Span),
    Boolean(bool, Span),
    Number(f64, Span),
    String(String, Span),
}

impl Literal {
    pub fn span(&self) -> Span {
        match self {
            Literal::Null(span)
            | Literal::Boolean(_, span)
            | Literal::Number(_, span)
            | Literal::String(_, span) => *span,
        }
    }
}

/// Array expression.
#[derive(Debug, Clone)]
pub struct ArrayExpr {
    /// `None` marks a hole: `[1, , 3]`.
    pub elements: Vec<Option<Expression>>,
    pub span: Span,
}

/// Object expression.
#[derive(Debug, Clone)]
pub struct ObjectExpr {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

/// Object literal member.
#[derive(Debug, Clone)]
pub enum ObjectProperty {
    Property { key: PropertyName, value: Expression },
    Spread(Expression),
}

/// Object literal key.
#[derive(Debug, Clone)]
pub enum PropertyName {
    Static(String),
    Computed(Expression),
}

/// Template literal.
#[derive(Debug, Clone)]
pub struct TemplateLiteral {
    /// Cooked text chunks; always one more than `expressions`.
    pub quasis: Vec<String>,
    pub expressions: Vec<Expression>,
    pub span: Span,
}

/// Member expression.
#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub object: Box<Expression>,
    pub property: MemberProperty,
    pub optional: bool,
    pub span: Span,
}

/// Member access key.
#[derive(Debug, Clone)]
pub enum MemberProperty {
    /// `a.b`
    Static(String),
    /// `a[b]`
    Computed(Box<Expression>),
}

/// Call or `new` expression.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub optional: bool,
    pub span: Span,
}

/// Update expression.
#[derive(Debug, Clone)]
pub struct UpdateExpr {
    pub operator: UpdateOp,
    pub argument: Box<Expression>,
    pub prefix: bool,
    pub span: Span,
}

/// Update operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment, // ++
    Decrement, // --
}

/// Unary expression.
#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub operator: UnaryOp,
    pub argument: Box<Expression>,
    pub span: Span,
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,  // -
    Plus,   // +
    Not,    // !
    BitNot, // ~
    Typeof, // typeof
    Void,   // void
    Delete, // delete
}

/// Binary expression.
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub operator: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,                // +
    Sub,                // -
    Mul,                // *
    Div,                // /
    Mod,                // %
    Exp,                // **
    Equal,              // ==
    NotEqual,           // !=
    StrictEqual,        // ===
    StrictNotEqual,     // !==
    LessThan,           // <
    LessEqual,          // <=
    GreaterThan,        // >
    GreaterEqual,       // >=
    LeftShift,          // <<
    RightShift,         // >>
    UnsignedRightShift, // >>>
    BitAnd,             // &
    BitOr,              // |
    BitXor,             // ^
    In,                 // in
    Instanceof,         // instanceof
}

/// Logical expression.
#[derive(Debug, Clone)]
pub struct LogicalExpr {
    pub operator: LogicalOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Logical operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,     // &&
    Or,      // ||
    Nullish, // ??
}

/// Conditional expression.
#[derive(Debug, Clone)]
pub struct ConditionalExpr {
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    pub span: Span,
}

/// Assignment expression. The target is an identifier or member expression.
#[derive(Debug, Clone)]
pub struct AssignmentExpr {
    pub operator: AssignmentOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,                   // =
    AddAssign,                // +=
    SubAssign,                // -=
    MulAssign,                // *=
    DivAssign,                // /=
    ModAssign,                // %=
    ExpAssign,                // **=
    LeftShiftAssign,          // <<=
    RightShiftAssign,         // >>=
    UnsignedRightShiftAssign, // >>>=
    BitAndAssign,             // &=
    BitOrAssign,              // |=
    BitXorAssign,             // ^=
    AndAssign,                // &&=
    OrAssign,                 // ||=
    NullishAssign,            // ??=
}

impl AssignmentOp {
    /// Arithmetic operator behind a compound assignment.
    pub fn binary_op(self) -> Option<BinaryOp> {
        let op = match self {
            AssignmentOp::AddAssign => BinaryOp::Add,
            AssignmentOp::SubAssign => BinaryOp::Sub,
            AssignmentOp::MulAssign => BinaryOp::Mul,
            AssignmentOp::DivAssign => BinaryOp::Div,
            AssignmentOp::ModAssign => BinaryOp::Mod,
            AssignmentOp::ExpAssign => BinaryOp::Exp,
            AssignmentOp::LeftShiftAssign => BinaryOp::LeftShift,
            AssignmentOp::RightShiftAssign => BinaryOp::RightShift,
            AssignmentOp::UnsignedRightShiftAssign => BinaryOp::UnsignedRightShift,
            AssignmentOp::BitAndAssign => BinaryOp::BitAnd,
            AssignmentOp::BitOrAssign => BinaryOp::BitOr,
            AssignmentOp::BitXorAssign => BinaryOp::BitXor,
            _ => return None,
        };
        Some(op)
    }
}

/// Sequence expression.
#[derive(Debug, Clone)]
pub struct SequenceExpr {
    pub expressions: Vec<Expression>,
    pub span: Span,
}

/// Spread element.
#[derive(Debug, Clone)]
pub struct SpreadElement {
    pub argument: Box<Expression>,
    pub span: Span,
}

/// Function parameter.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain parameter
    Identifier(Identifier),
    /// Parameter with a default value
    Assignment(Identifier, Box<Expression>),
    /// Rest parameter
    Rest(Identifier),
}

impl Pattern {
    /// The bound name.
    pub fn identifier(&self) -> &Identifier {
        match self {
            Pattern::Identifier(id) | Pattern::Assignment(id, _) | Pattern::Rest(id) => id,
        }
    }
}
