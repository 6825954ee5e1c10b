use crate::source_location::{SourceLocation, SourceSpan};
use crate::syntax::*;
use crate::token::*;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
#[error("Expected {expected}, found {found} at line {line}, column {column}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub line: usize,
    pub column: usize,
    #[label("unexpected {found}")]
    pub span: SourceSpan,
    pub at_eof: bool,
}

impl ParseError {
    pub fn new(expected: impl Into<String>, found: Option<&Token>) -> Self {
        match found {
            Some(token) => ParseError {
                expected: expected.into(),
                found: token.describe(),
                line: token.line(),
                column: token.column(),
                span: token.span.clone(),
                at_eof: token.kind == TokenKind::Eof,
            },
            None => {
                let loc = SourceLocation::new();
                ParseError {
                    expected: expected.into(),
                    found: "end of input".to_string(),
                    line: loc.line,
                    column: loc.column,
                    span: SourceSpan::new(loc.clone(), loc),
                    at_eof: true,
                }
            }
        }
    }
}

struct Parser<'a> {
    remaining: &'a [Token],
}

impl<'a> Parser<'a> {
    fn new(remaining: &'a [Token]) -> Parser<'a> {
        Parser { remaining }
    }

    fn current(&self) -> Option<&'a Token> {
        self.remaining.first()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().map_or(false, |token| token.kind == kind)
    }

    fn is_at_end(&self) -> bool {
        self.current().map_or(true, |token| token.kind == TokenKind::Eof)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.current()?.clone();
        self.remaining = &self.remaining[1..];
        Some(token)
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        ParseError::new(expected, self.current())
    }

    fn token(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            if let Some(token) = self.advance() {
                return Ok(token);
            }
        }
        Err(self.error(expected))
    }

    fn identifier(&mut self, expected: &str) -> Result<Token, ParseError> {
        self.token(TokenKind::Identifier, expected)
    }

    fn string_literal(&mut self, expected: &str) -> Result<StringLiteral, ParseError> {
        self.token(TokenKind::String, expected)
            .map(|token| StringLiteral { token })
    }

    // program := statement* EOF
    fn program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::new();
        while !self.is_at_end() {
            program.statements.push(self.statement()?);
        }
        Ok(program)
    }

    // statement := print_statement | maketable_statement | editrow_statement
    //            | editcell_statement | query_statement | exportcsv_statement
    //            | importcsv_statement | import_statement | runfile_statement
    //            | assignment_statement
    fn statement(&mut self) -> Result<Statement, ParseError> {
        let kind = match self.current() {
            Some(token) => token.kind,
            None => return Err(self.error("statement")),
        };

        match kind {
            TokenKind::Print => self.print_statement().map(Statement::Print),
            TokenKind::MakeTable => self.maketable_statement().map(Statement::MakeTable),
            TokenKind::EditRow => self.editrow_statement().map(Statement::EditRow),
            TokenKind::EditCell => self.editcell_statement().map(Statement::EditCell),
            TokenKind::Query => self.query_statement().map(Statement::Query),
            TokenKind::ExportCsv => self.exportcsv_statement().map(Statement::ExportCsv),
            TokenKind::ImportCsv => self.importcsv_statement().map(Statement::ImportCsv),
            TokenKind::Import => self.import_statement().map(Statement::Import),
            TokenKind::RunFile => self.runfile_statement().map(Statement::RunFile),
            _ => self.assignment_statement().map(Statement::Assignment),
        }
    }

    // print_statement := "print" expression
    fn print_statement(&mut self) -> Result<PrintStatement, ParseError> {
        let keyword = self.token(TokenKind::Print, "'print'")?;
        let expr = self.expression()?;
        Ok(PrintStatement { keyword, expr })
    }

    // maketable_statement := "maketable" identifier "[" (identifier ("," identifier)*)? "]"
    fn maketable_statement(&mut self) -> Result<MakeTableStatement, ParseError> {
        let keyword = self.token(TokenKind::MakeTable, "'maketable'")?;
        let table = self.identifier("table name after 'maketable'")?;
        let columns = self.bracketed_list("column list", |parser| {
            parser.identifier("column name")
        })?;
        Ok(MakeTableStatement {
            keyword,
            table,
            columns,
        })
    }

    // editrow_statement := "editrow" identifier "[" (expression ("," expression)*)? "]"
    fn editrow_statement(&mut self) -> Result<EditRowStatement, ParseError> {
        let keyword = self.token(TokenKind::EditRow, "'editrow'")?;
        let table = self.identifier("table name after 'editrow'")?;
        let values = self.bracketed_list("value list", |parser| parser.expression())?;
        Ok(EditRowStatement {
            keyword,
            table,
            values,
        })
    }

    // editcell_statement := "editcell" identifier "[" expression "," expression "," expression "]"
    fn editcell_statement(&mut self) -> Result<EditCellStatement, ParseError> {
        let keyword = self.token(TokenKind::EditCell, "'editcell'")?;
        let table = self.identifier("table name after 'editcell'")?;
        let _lbracket = self.token(TokenKind::LeftBracket, "'[' after table name")?;

        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            arguments.push(self.expression()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                arguments.push(self.expression()?);
            }
        }

        let rbracket = self.token(TokenKind::RightBracket, "']' to close editcell arguments")?;

        let count = arguments.len();
        let mut arguments = arguments.into_iter();
        match (arguments.next(), arguments.next(), arguments.next(), count) {
            (Some(column), Some(key), Some(value), 3) => Ok(EditCellStatement {
                keyword,
                table,
                column,
                key,
                value,
            }),
            _ => {
                let mut error = ParseError::new("exactly 3 arguments in editcell", Some(&rbracket));
                error.found = format!("{count} arguments");
                Err(error)
            }
        }
    }

    // query_statement := "query" identifier comparison?
    //
    // the condition is present unless the table name is followed by the end of
    // input or by a keyword that begins the next statement
    fn query_statement(&mut self) -> Result<QueryStatement, ParseError> {
        let keyword = self.token(TokenKind::Query, "'query'")?;
        let table = self.identifier("table name after 'query'")?;

        let has_condition = match self.current() {
            Some(token) => token.kind != TokenKind::Eof && !token.kind.starts_statement(),
            None => false,
        };

        let condition = if has_condition {
            Some(self.comparison()?)
        } else {
            None
        };

        Ok(QueryStatement {
            keyword,
            table,
            condition,
        })
    }

    // exportcsv_statement := "exportcsv" identifier string
    fn exportcsv_statement(&mut self) -> Result<ExportCsvStatement, ParseError> {
        let keyword = self.token(TokenKind::ExportCsv, "'exportcsv'")?;
        let table = self.identifier("table name after 'exportcsv'")?;
        let path = self.string_literal("filename string after table name")?;
        Ok(ExportCsvStatement {
            keyword,
            table,
            path,
        })
    }

    // importcsv_statement := "importcsv" string "as" identifier
    fn importcsv_statement(&mut self) -> Result<ImportCsvStatement, ParseError> {
        let keyword = self.token(TokenKind::ImportCsv, "'importcsv'")?;
        let path = self.string_literal("filename string after 'importcsv'")?;
        let _as = self.token(TokenKind::As, "'as' after filename")?;
        let table = self.identifier("table name after 'as'")?;
        Ok(ImportCsvStatement {
            keyword,
            path,
            table,
        })
    }

    // import_statement := "import" string
    fn import_statement(&mut self) -> Result<ImportStatement, ParseError> {
        let keyword = self.token(TokenKind::Import, "'import'")?;
        let path = self.string_literal("filename string after 'import'")?;
        Ok(ImportStatement { keyword, path })
    }

    // runfile_statement := "runfile" string
    fn runfile_statement(&mut self) -> Result<RunFileStatement, ParseError> {
        let keyword = self.token(TokenKind::RunFile, "'runfile'")?;
        let path = self.string_literal("filename string after 'runfile'")?;
        Ok(RunFileStatement { keyword, path })
    }

    // assignment_statement := identifier "=" expression
    fn assignment_statement(&mut self) -> Result<AssignmentStatement, ParseError> {
        let name = self.identifier("statement")?;
        let _equal = self.token(TokenKind::Equal, &format!("'=' after identifier '{}'", name.lexeme))?;
        let expr = self.expression()?;
        Ok(AssignmentStatement { name, expr })
    }

    // "[" (item ("," item)*)? "]"
    fn bracketed_list<T>(
        &mut self,
        what: &str,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let _lbracket = self.token(TokenKind::LeftBracket, "'[' after table name")?;

        let mut items = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            items.push(item(self)?);
            while self.check(TokenKind::Comma) {
                self.advance();
                items.push(item(self)?);
            }
        }

        let _rbracket = self.token(TokenKind::RightBracket, &format!("']' to close {what}"))?;
        Ok(items)
    }

    // comparison := expression comparison_operator expression
    fn comparison(&mut self) -> Result<ComparisonExpression, ParseError> {
        let left_expr = self.expression()?;

        let op = match self.current() {
            Some(token) if token.kind.is_comparison_operator() => token.clone(),
            _ => return Err(self.error("comparison operator")),
        };
        self.advance();

        let right_expr = self.expression()?;
        Ok(ComparisonExpression {
            left_expr,
            op,
            right_expr,
        })
    }

    // expression := term (("+" | "-") term)*
    fn expression(&mut self) -> Result<Expression, ParseError> {
        let mut result = self.term()?;

        while self.check(TokenKind::Plus) || self.check(TokenKind::Minus) {
            let op = self.advance().ok_or_else(|| self.error("operator"))?;
            let right_expr = self.term()?;
            result = Expression::Binary(BinaryExpression {
                left_expr: Box::new(result),
                op,
                right_expr: Box::new(right_expr),
            });
        }

        Ok(result)
    }

    // term := factor (("*" | "/") factor)*
    fn term(&mut self) -> Result<Expression, ParseError> {
        let mut result = self.factor()?;

        while self.check(TokenKind::Star) || self.check(TokenKind::Slash) {
            let op = self.advance().ok_or_else(|| self.error("operator"))?;
            let right_expr = self.factor()?;
            result = Expression::Binary(BinaryExpression {
                left_expr: Box::new(result),
                op,
                right_expr: Box::new(right_expr),
            });
        }

        Ok(result)
    }

    // factor := number | string | identifier | "(" expression ")"
    fn factor(&mut self) -> Result<Expression, ParseError> {
        let token = match self.current() {
            Some(token) => token,
            None => return Err(self.error("expression")),
        };

        match token.kind {
            TokenKind::Number => {
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| self.error("integer literal within the 64-bit range"))?;
                let token = token.clone();
                self.advance();
                Ok(Expression::Number(NumberLiteral { value, token }))
            }
            TokenKind::String => {
                let token = token.clone();
                self.advance();
                Ok(Expression::String(StringLiteral { token }))
            }
            TokenKind::Identifier => {
                let name = token.clone();
                self.advance();
                Ok(Expression::Variable(Variable { name }))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                let _rparen = self.token(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error("expression")),
        }
    }
}

pub fn parse_program(tokens: &[Token]) -> Result<Program, ParseError> {
    Parser::new(tokens).program()
}
