use crate::source_location::{Locatable, SourceSpan};
use crate::token::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub value: i64,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub token: Token,
}

impl StringLiteral {
    pub fn value(&self) -> &str {
        &self.token.lexeme
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Token,
}

/// `+ - * /`
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub left_expr: Box<Expression>,
    pub op: Token,
    pub right_expr: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(NumberLiteral),
    String(StringLiteral),
    Variable(Variable),
    Binary(BinaryExpression),
}

impl Locatable for Expression {
    fn source_span(&self) -> SourceSpan {
        match self {
            Expression::Number(n) => n.token.span.clone(),
            Expression::String(s) => s.token.span.clone(),
            Expression::Variable(v) => v.name.span.clone(),
            Expression::Binary(b) => b.left_expr.source_span().to(&b.right_expr.source_span()),
        }
    }
}

/// `> < == != >= <=` between two additive expressions. Comparisons never nest.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonExpression {
    pub left_expr: Expression,
    pub op: Token,
    pub right_expr: Expression,
}

impl Locatable for ComparisonExpression {
    fn source_span(&self) -> SourceSpan {
        self.left_expr.source_span().to(&self.right_expr.source_span())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentStatement {
    pub name: Token,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintStatement {
    pub keyword: Token,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MakeTableStatement {
    pub keyword: Token,
    pub table: Token,
    pub columns: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRowStatement {
    pub keyword: Token,
    pub table: Token,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditCellStatement {
    pub keyword: Token,
    pub table: Token,
    pub column: Expression,
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatement {
    pub keyword: Token,
    pub table: Token,
    pub condition: Option<ComparisonExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportCsvStatement {
    pub keyword: Token,
    pub table: Token,
    pub path: StringLiteral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportCsvStatement {
    pub keyword: Token,
    pub path: StringLiteral,
    pub table: Token,
}

/// `import "path"`: evaluates only the table definitions of another file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub keyword: Token,
    pub path: StringLiteral,
}

/// `runfile "path"`: runs another file in a sandbox, then requests termination.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFileStatement {
    pub keyword: Token,
    pub path: StringLiteral,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment(AssignmentStatement),
    Print(PrintStatement),
    MakeTable(MakeTableStatement),
    EditRow(EditRowStatement),
    EditCell(EditCellStatement),
    Query(QueryStatement),
    ExportCsv(ExportCsvStatement),
    ImportCsv(ImportCsvStatement),
    Import(ImportStatement),
    RunFile(RunFileStatement),
}

impl Statement {
    /// The only statements evaluated when a file is pulled in with `import`.
    pub fn defines_tables(&self) -> bool {
        matches!(self, Statement::MakeTable(_) | Statement::EditRow(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statement::Assignment(_) => "assignment",
            Statement::Print(_) => "print",
            Statement::MakeTable(_) => "maketable",
            Statement::EditRow(_) => "editrow",
            Statement::EditCell(_) => "editcell",
            Statement::Query(_) => "query",
            Statement::ExportCsv(_) => "exportcsv",
            Statement::ImportCsv(_) => "importcsv",
            Statement::Import(_) => "import",
            Statement::RunFile(_) => "runfile",
        }
    }
}

impl Locatable for Statement {
    // statements are located by their leading token
    fn source_span(&self) -> SourceSpan {
        match self {
            Statement::Assignment(s) => s.name.span.clone(),
            Statement::Print(s) => s.keyword.span.clone(),
            Statement::MakeTable(s) => s.keyword.span.clone(),
            Statement::EditRow(s) => s.keyword.span.clone(),
            Statement::EditCell(s) => s.keyword.span.clone(),
            Statement::Query(s) => s.keyword.span.clone(),
            Statement::ExportCsv(s) => s.keyword.span.clone(),
            Statement::ImportCsv(s) => s.keyword.span.clone(),
            Statement::Import(s) => s.keyword.span.clone(),
            Statement::RunFile(s) => s.keyword.span.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
        }
    }
}
