use crate::csv_codec::{self, CodecError};
use crate::environment::Environment;
use crate::file_system::{FileSystem, StdFileSystem};
use crate::lexer::{scan, LexError};
use crate::parser::{parse_program, ParseError};
use crate::source_location::{Locatable, SourceSpan};
use crate::syntax::*;
use crate::token::Token;
use crate::value::{OperationError, Scalar, Table, Value};
use miette::Diagnostic;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error("Name '{name}' is not defined")]
    UnboundName {
        name: String,
        #[label("not defined")]
        span: SourceSpan,
    },

    #[error("{message}")]
    Type {
        message: String,
        #[label("wrong kind of value")]
        span: SourceSpan,
    },

    #[error("{message}")]
    InvalidComparison {
        message: String,
        #[label("invalid comparison")]
        span: SourceSpan,
    },

    #[error("Division by zero")]
    DivisionByZero {
        #[label("divisor is zero")]
        span: SourceSpan,
    },

    #[error("{message}")]
    Overflow {
        message: String,
        #[label("result does not fit in 64 bits")]
        span: SourceSpan,
    },

    #[error("Table '{name}' not found")]
    UnknownTable {
        name: String,
        #[label("no such table")]
        span: SourceSpan,
    },

    #[error("'{name}' is {kind}, not a table")]
    NotATable {
        name: String,
        kind: &'static str,
        #[label("not a table")]
        span: SourceSpan,
    },

    #[error("Column '{column}' not found in table '{table}'")]
    UnknownColumn {
        column: String,
        table: String,
        #[label("no such column")]
        span: SourceSpan,
    },

    #[error("Column '{column}' appears more than once in table '{table}'")]
    DuplicateColumn {
        column: String,
        table: String,
        #[label("duplicate column")]
        span: SourceSpan,
    },

    #[error("Row with key {key} not found in table '{table}'")]
    UnknownRow {
        key: Scalar,
        table: String,
        #[label("no row has this key")]
        span: SourceSpan,
    },

    #[error("Table '{table}' expects {expected} values, got {found}")]
    Arity {
        table: String,
        expected: usize,
        found: usize,
        #[label("wrong number of values")]
        span: SourceSpan,
    },

    #[error("Circular import detected: {}", format_chain(.chain))]
    CircularImport {
        chain: Vec<PathBuf>,
        #[label("already being loaded")]
        span: SourceSpan,
    },

    #[error("Circular execution detected: {}", format_chain(.chain))]
    CircularExecution {
        chain: Vec<PathBuf>,
        #[label("already being executed")]
        span: SourceSpan,
    },

    #[error("Import of '{}' failed: {cause}", .path.display())]
    ImportFailed {
        path: PathBuf,
        #[source]
        cause: Box<Error>,
        #[label("imported here")]
        span: SourceSpan,
    },

    #[error("runfile '{}' failed: {cause}", .path.display())]
    RunFileFailed {
        path: PathBuf,
        #[source]
        cause: Box<Error>,
        #[label("run here")]
        span: SourceSpan,
    },

    #[error("File '{}' not found", .path.display())]
    FileNotFound {
        path: PathBuf,
        #[label("file not found")]
        span: Option<SourceSpan>,
    },

    #[error("Failed to read '{}': {cause}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        cause: io::Error,
        #[label("read here")]
        span: Option<SourceSpan>,
    },

    #[error("Failed to export CSV to '{}': {cause}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        cause: CodecError,
        #[label("export failed")]
        span: SourceSpan,
    },

    #[error("Failed to import CSV from '{}': {cause}", .path.display())]
    ImportCsv {
        path: PathBuf,
        #[source]
        cause: CodecError,
        #[label("import failed")]
        span: SourceSpan,
    },
}

impl Error {
    /// Follows `ImportFailed`/`RunFileFailed` wrappers down to the error that
    /// started the failure.
    pub fn innermost(&self) -> &Error {
        match self {
            Error::ImportFailed { cause, .. } | Error::RunFileFailed { cause, .. } => {
                cause.innermost()
            }
            other => other,
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

// attaches the location of the offending expression to value-level faults
trait ErrorContext<T> {
    fn err_ctx(self, location: &SourceSpan) -> Result<T, Error>;
}

impl<T> ErrorContext<T> for Result<T, OperationError> {
    fn err_ctx(self, location: &SourceSpan) -> Result<T, Error> {
        self.map_err(|e| {
            let span = location.clone();
            match &e {
                OperationError::Unsupported { .. } => Error::Type {
                    message: e.to_string(),
                    span,
                },
                OperationError::InvalidComparison { .. } => Error::InvalidComparison {
                    message: e.to_string(),
                    span,
                },
                OperationError::DivisionByZero => Error::DivisionByZero { span },
                OperationError::Overflow(_) => Error::Overflow {
                    message: e.to_string(),
                    span,
                },
            }
        })
    }
}

fn parse_source(source: &str) -> Result<Program, Error> {
    let tokens = scan(source)?;
    Ok(parse_program(&tokens)?)
}

fn format_record<T: ToString>(fields: &[T]) -> String {
    let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
    format!("| {} |", fields.join(" | "))
}

/// Tree-walking evaluator for one session.
///
/// The interpreter owns the environment, the printed output, and the stack
/// of files currently being imported or run. Nothing is shared between
/// instances.
pub struct Interpreter {
    env: Environment,
    output: Vec<String>,
    should_exit: bool,
    current_file: Option<PathBuf>,
    inclusion_stack: Vec<PathBuf>,
    file_system: Box<dyn FileSystem>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_file_system(StdFileSystem)
    }

    pub fn with_file_system(file_system: impl FileSystem + 'static) -> Self {
        Self {
            env: Environment::new(),
            output: Vec::new(),
            should_exit: false,
            current_file: None,
            inclusion_stack: Vec::new(),
            file_system: Box::new(file_system),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Every line printed so far and not yet taken.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Set once a `runfile` statement completes; the host should stop feeding input.
    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        self.file_system.as_ref()
    }

    /// Scans, parses and evaluates `source` against the current environment.
    ///
    /// The first failure aborts the remaining statements. Effects of the
    /// statements that already ran are kept.
    pub fn run(&mut self, source: &str) -> Result<(), Error> {
        self.should_exit = false;
        let program = parse_source(source)?;
        self.interpret_program(&program)
    }

    /// Runs a script file. Its directory becomes the base for relative
    /// `import`/`runfile` paths, and the file counts as being loaded for
    /// cycle detection.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref().to_path_buf();
        let source = self.read_source(&path, None)?;
        self.with_current_file(path, |interp| interp.run(&source))
    }

    pub fn interpret_program(&mut self, program: &Program) -> Result<(), Error> {
        for stmt in &program.statements {
            self.interpret_statement(stmt)?;
            if self.should_exit {
                debug!("runfile requested termination, skipping remaining statements");
                break;
            }
        }
        Ok(())
    }

    fn interpret_statement(&mut self, stmt: &Statement) -> Result<(), Error> {
        debug!(line = stmt.source_span().line(), "executing {}", stmt.name());
        match stmt {
            Statement::Assignment(s) => self.interpret_assignment_statement(s),
            Statement::Print(s) => self.interpret_print_statement(s),
            Statement::MakeTable(s) => self.interpret_maketable_statement(s),
            Statement::EditRow(s) => self.interpret_editrow_statement(s),
            Statement::EditCell(s) => self.interpret_editcell_statement(s),
            Statement::Query(s) => self.interpret_query_statement(s),
            Statement::ExportCsv(s) => self.interpret_exportcsv_statement(s),
            Statement::ImportCsv(s) => self.interpret_importcsv_statement(s),
            Statement::Import(s) => self.interpret_import_statement(s),
            Statement::RunFile(s) => self.interpret_runfile_statement(s),
        }
    }

    fn emit(&mut self, line: impl Into<String>) {
        let line = line.into();
        trace!(%line, "output");
        self.output.push(line);
    }

    fn emit_table<'r>(
        &mut self,
        title: String,
        columns: &[String],
        rows: impl IntoIterator<Item = &'r Vec<Scalar>>,
    ) {
        self.emit(title);
        self.emit(format_record(columns));
        for row in rows {
            self.emit(format_record(row));
        }
    }

    // expressions

    fn interpret_expression(&self, expr: &Expression) -> Result<Value, Error> {
        match expr {
            Expression::Number(n) => Ok(Scalar::Integer(n.value).into()),
            Expression::String(s) => Ok(Scalar::from(s.value()).into()),
            Expression::Variable(v) => self.interpret_variable(v),
            Expression::Binary(b) => self.interpret_binary_expression(b),
        }
    }

    fn interpret_variable(&self, var: &Variable) -> Result<Value, Error> {
        self.env
            .get(&var.name.lexeme)
            .cloned()
            .ok_or_else(|| Error::UnboundName {
                name: var.name.lexeme.clone(),
                span: var.name.span.clone(),
            })
    }

    fn interpret_binary_expression(&self, expr: &BinaryExpression) -> Result<Value, Error> {
        let lhs = self.interpret_expression(&expr.left_expr)?;
        let rhs = self.interpret_expression(&expr.right_expr)?;
        let location = expr.left_expr.source_span().to(&expr.right_expr.source_span());

        match (&lhs, &rhs) {
            (Value::Scalar(l), Value::Scalar(r)) => l
                .evaluate_binary_operation(expr.op.kind, r)
                .map(Value::Scalar)
                .err_ctx(&location),
            _ => Err(OperationError::Unsupported {
                op: expr.op.kind,
                left: lhs.kind_name(),
                right: rhs.kind_name(),
            })
            .err_ctx(&location),
        }
    }

    fn interpret_comparison(&self, expr: &ComparisonExpression) -> Result<bool, Error> {
        let lhs = self.interpret_expression(&expr.left_expr)?;
        let rhs = self.interpret_expression(&expr.right_expr)?;

        match (&lhs, &rhs) {
            (Value::Scalar(l), Value::Scalar(r)) => l
                .evaluate_comparison(expr.op.kind, r)
                .err_ctx(&expr.source_span()),
            _ => Err(OperationError::InvalidComparison {
                op: expr.op.kind,
                left: lhs.kind_name(),
                right: rhs.kind_name(),
            })
            .err_ctx(&expr.source_span()),
        }
    }

    // evaluates an expression whose value is stored in a table cell
    fn interpret_scalar(&self, expr: &Expression) -> Result<Scalar, Error> {
        match self.interpret_expression(expr)? {
            Value::Scalar(s) => Ok(s),
            Value::Table(_) => Err(Error::Type {
                message: "A table cannot be stored in a table cell".to_string(),
                span: expr.source_span(),
            }),
        }
    }

    // tables

    fn table(&self, name: &Token) -> Result<&Table, Error> {
        match self.env.get(&name.lexeme) {
            Some(Value::Table(table)) => Ok(table),
            Some(other) => Err(Error::NotATable {
                name: name.lexeme.clone(),
                kind: other.kind_name(),
                span: name.span.clone(),
            }),
            None => Err(Error::UnknownTable {
                name: name.lexeme.clone(),
                span: name.span.clone(),
            }),
        }
    }

    fn table_mut(&mut self, name: &Token) -> Result<&mut Table, Error> {
        // report NotATable/UnknownTable consistently with `table`
        self.table(name)?;
        self.env
            .get_table_mut(&name.lexeme)
            .ok_or_else(|| Error::UnknownTable {
                name: name.lexeme.clone(),
                span: name.span.clone(),
            })
    }

    // statements

    fn interpret_assignment_statement(&mut self, stmt: &AssignmentStatement) -> Result<(), Error> {
        let value = self.interpret_expression(&stmt.expr)?;
        self.env.define(stmt.name.lexeme.clone(), value);
        Ok(())
    }

    fn interpret_print_statement(&mut self, stmt: &PrintStatement) -> Result<(), Error> {
        match self.interpret_expression(&stmt.expr)? {
            Value::Scalar(s) => self.emit(s.to_string()),
            Value::Table(table) => {
                let name = match &stmt.expr {
                    Expression::Variable(v) => v.name.lexeme.as_str(),
                    _ => "<table>",
                };
                self.emit_table(format!("Table {name}:"), table.columns(), table.rows());
            }
        }
        Ok(())
    }

    fn interpret_maketable_statement(&mut self, stmt: &MakeTableStatement) -> Result<(), Error> {
        let columns: Vec<String> = stmt.columns.iter().map(|c| c.lexeme.clone()).collect();

        if let Some(column) = Table::duplicate_column(&columns) {
            let span = stmt
                .columns
                .iter()
                .filter(|c| c.lexeme == column)
                .nth(1)
                .map_or_else(|| stmt.table.span.clone(), |c| c.span.clone());
            return Err(Error::DuplicateColumn {
                column: column.to_string(),
                table: stmt.table.lexeme.clone(),
                span,
            });
        }

        self.env.define(stmt.table.lexeme.clone(), Table::new(columns));
        Ok(())
    }

    fn interpret_editrow_statement(&mut self, stmt: &EditRowStatement) -> Result<(), Error> {
        let expected = self.table(&stmt.table)?.columns().len();

        let values = stmt
            .values
            .iter()
            .map(|expr| self.interpret_scalar(expr))
            .collect::<Result<Vec<_>, _>>()?;

        if values.len() != expected {
            return Err(Error::Arity {
                table: stmt.table.lexeme.clone(),
                expected,
                found: values.len(),
                span: stmt.keyword.span.to(&stmt.table.span),
            });
        }

        self.table_mut(&stmt.table)?.upsert_row(values);
        Ok(())
    }

    fn interpret_editcell_statement(&mut self, stmt: &EditCellStatement) -> Result<(), Error> {
        self.table(&stmt.table)?;

        let column = self.interpret_scalar(&stmt.column)?;
        let key = self.interpret_scalar(&stmt.key)?;
        let value = self.interpret_scalar(&stmt.value)?;

        let column_name = column.as_text().ok_or_else(|| Error::Type {
            message: format!("Column name must be text, got {}", column.kind_name()),
            span: stmt.column.source_span(),
        })?;

        let table = self.table(&stmt.table)?;
        let column_index = table
            .column_index(column_name)
            .ok_or_else(|| Error::UnknownColumn {
                column: column_name.to_string(),
                table: stmt.table.lexeme.clone(),
                span: stmt.column.source_span(),
            })?;
        let row_index = table.find_row(Some(&key)).ok_or_else(|| Error::UnknownRow {
            key: key.clone(),
            table: stmt.table.lexeme.clone(),
            span: stmt.key.source_span(),
        })?;

        self.table_mut(&stmt.table)?
            .set_cell(row_index, column_index, value);
        Ok(())
    }

    fn interpret_query_statement(&mut self, stmt: &QueryStatement) -> Result<(), Error> {
        let table = self.table(&stmt.table)?.clone();

        let selected: Vec<&Vec<Scalar>> = match &stmt.condition {
            None => table.rows().iter().collect(),
            Some(condition) => {
                let mut selected = Vec::new();
                for row in table.rows() {
                    // column names shadow outer bindings for the duration of one row
                    let saved = self.env.bind_all(table.columns().iter().zip(row.iter()));
                    let matched = self.interpret_comparison(condition);
                    self.env.restore(saved);

                    trace!(?row, ?matched, "query row");
                    if matched? {
                        selected.push(row);
                    }
                }
                selected
            }
        };

        debug!(table = %stmt.table.lexeme, matched = selected.len(), "query");
        self.emit_table(
            format!("Query results for {}:", stmt.table.lexeme),
            table.columns(),
            selected,
        );
        Ok(())
    }

    fn interpret_exportcsv_statement(&mut self, stmt: &ExportCsvStatement) -> Result<(), Error> {
        let path = PathBuf::from(stmt.path.value());
        let span = stmt.keyword.span.to(&stmt.path.token.span);

        let table = self.table(&stmt.table)?;
        let row_count = table.row_count();
        let text = csv_codec::encode_table(table).map_err(|cause| Error::Export {
            path: path.clone(),
            cause,
            span: span.clone(),
        })?;

        self.file_system
            .write(&path, &text)
            .map_err(|cause| Error::Export {
                path: path.clone(),
                cause: cause.into(),
                span,
            })?;

        info!(table = %stmt.table.lexeme, path = %path.display(), rows = row_count, "exported csv");
        self.emit(format!("Exported {row_count} rows to {}", path.display()));
        Ok(())
    }

    fn interpret_importcsv_statement(&mut self, stmt: &ImportCsvStatement) -> Result<(), Error> {
        let path = PathBuf::from(stmt.path.value());
        let span = stmt.keyword.span.to(&stmt.table.span);

        let text = self
            .file_system
            .read_to_string(&path)
            .map_err(|cause| match cause.kind() {
                io::ErrorKind::NotFound => Error::FileNotFound {
                    path: path.clone(),
                    span: Some(stmt.path.token.span.clone()),
                },
                _ => Error::ImportCsv {
                    path: path.clone(),
                    cause: cause.into(),
                    span: span.clone(),
                },
            })?;

        let table = csv_codec::decode_table(&text).map_err(|cause| Error::ImportCsv {
            path: path.clone(),
            cause,
            span,
        })?;

        let row_count = table.row_count();
        self.env.define(stmt.table.lexeme.clone(), table);

        info!(table = %stmt.table.lexeme, path = %path.display(), rows = row_count, "imported csv");
        self.emit(format!(
            "Imported {row_count} rows into table '{}'",
            stmt.table.lexeme
        ));
        Ok(())
    }

    fn interpret_import_statement(&mut self, stmt: &ImportStatement) -> Result<(), Error> {
        let path = self.resolve_path(stmt.path.value());
        let span = stmt.keyword.span.to(&stmt.path.token.span);

        if self.inclusion_stack.contains(&path) {
            return Err(Error::CircularImport {
                chain: self.inclusion_chain(&path),
                span,
            });
        }

        info!(path = %path.display(), "importing tables");

        // a failed import leaves no tables behind
        let snapshot = self.env.clone();
        if let Err(cause) = self.import_tables(&path, stmt.path.token.span) {
            self.env = snapshot;
            return Err(Error::ImportFailed {
                path,
                cause: Box::new(cause),
                span,
            });
        }

        self.emit(format!("Imported tables from '{}'", path.display()));
        Ok(())
    }

    // evaluates only the table definitions of the file, directly in our environment
    fn import_tables(&mut self, path: &Path, path_span: SourceSpan) -> Result<(), Error> {
        let source = self.read_source(path, Some(path_span))?;
        let program = parse_source(&source)?;

        self.with_current_file(path.to_path_buf(), |interp| {
            for stmt in program.statements.iter().filter(|s| s.defines_tables()) {
                interp.interpret_statement(stmt)?;
            }
            Ok(())
        })
    }

    fn interpret_runfile_statement(&mut self, stmt: &RunFileStatement) -> Result<(), Error> {
        let path = self.resolve_path(stmt.path.value());
        let span = stmt.keyword.span.to(&stmt.path.token.span);

        if self.inclusion_stack.contains(&path) {
            return Err(Error::CircularExecution {
                chain: self.inclusion_chain(&path),
                span,
            });
        }

        info!(path = %path.display(), "running file");
        self.run_nested_file(&path, stmt.path.token.span)
            .map_err(|cause| Error::RunFileFailed {
                path: path.clone(),
                cause: Box::new(cause),
                span,
            })?;

        self.should_exit = true;
        Ok(())
    }

    // runs the whole program of the file; its environment changes are discarded
    fn run_nested_file(&mut self, path: &Path, path_span: SourceSpan) -> Result<(), Error> {
        let source = self.read_source(path, Some(path_span))?;
        let program = parse_source(&source)?;

        self.with_sandboxed_environment(|interp| {
            interp.with_current_file(path.to_path_buf(), |interp| {
                interp.interpret_program(&program)
            })
        })
    }

    // files

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.current_file {
            Some(current) if path.is_relative() => match current.parent() {
                Some(dir) => dir.join(path),
                None => path.to_path_buf(),
            },
            _ => path.to_path_buf(),
        }
    }

    fn inclusion_chain(&self, path: &Path) -> Vec<PathBuf> {
        self.inclusion_stack
            .iter()
            .cloned()
            .chain(std::iter::once(path.to_path_buf()))
            .collect()
    }

    fn read_source(&self, path: &Path, span: Option<SourceSpan>) -> Result<String, Error> {
        self.file_system
            .read_to_string(path)
            .map_err(|cause| match cause.kind() {
                io::ErrorKind::NotFound => Error::FileNotFound {
                    path: path.to_path_buf(),
                    span,
                },
                _ => Error::ReadFile {
                    path: path.to_path_buf(),
                    cause,
                    span,
                },
            })
    }

    fn with_current_file<T>(&mut self, path: PathBuf, f: impl FnOnce(&mut Self) -> T) -> T {
        self.inclusion_stack.push(path.clone());
        let previous = self.current_file.replace(path);
        let result = f(self);
        self.current_file = previous;
        self.inclusion_stack.pop();
        result
    }

    // restores the environment afterwards, whether or not `f` succeeded
    fn with_sandboxed_environment<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let mut saved = self.env.clone();
        let result = f(self);
        std::mem::swap(&mut self.env, &mut saved);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_system::MemoryFileSystem;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Interpreter, Result<(), Error>) {
        let mut interp = Interpreter::new();
        let result = interp.run(source);
        (interp, result)
    }

    fn output_of(source: &str) -> Vec<String> {
        let (mut interp, result) = run(source);
        if let Err(e) = result {
            panic!("program failed: {e}");
        }
        interp.take_output()
    }

    fn error_of(source: &str) -> Error {
        run(source).1.expect_err("program should fail")
    }

    fn rows(interp: &Interpreter, table: &str) -> Vec<Vec<Scalar>> {
        interp
            .environment()
            .get_table(table)
            .expect("table should exist")
            .rows()
            .to_vec()
    }

    fn int(n: i64) -> Scalar {
        Scalar::Integer(n)
    }

    fn text(s: &str) -> Scalar {
        Scalar::from(s)
    }

    const USERS: &str = "maketable Users [id, name, age]\n\
                         editrow Users [1, \"Ann\", 31]\n\
                         editrow Users [2, \"Bea\", 17]\n\
                         editrow Users [3, \"Cid\", 45]\n";

    #[test]
    fn test_print_scalars() {
        assert_eq!(
            output_of("x = 10\ny = 3\nprint x / y\nprint \"a\" + \"b\"\nprint (1 + 2) * 3"),
            ["3", "ab", "9"]
        );
    }

    #[test]
    fn test_assignment_overwrites_without_kind_check() {
        assert_eq!(output_of("x = 1\nx = \"one\"\nprint x"), ["one"]);
    }

    #[test]
    fn test_editrow_replaces_matching_key() {
        let source = "maketable Users [id, name]\n\
                      editrow Users [1, \"Ann\"]\n\
                      editrow Users [1, \"Bea\"]\n\
                      query Users";
        assert_eq!(
            output_of(source),
            ["Query results for Users:", "| id | name |", "| 1 | Bea |"]
        );
    }

    #[test]
    fn test_editrow_is_idempotent_and_keeps_positions() {
        let (interp, result) = run(&format!(
            "{USERS}editrow Users [2, \"Bo\", 18]\neditrow Users [2, \"Bo\", 18]"
        ));
        result.unwrap();

        assert_eq!(
            rows(&interp, "Users"),
            [
                vec![int(1), text("Ann"), int(31)],
                vec![int(2), text("Bo"), int(18)],
                vec![int(3), text("Cid"), int(45)],
            ]
        );
    }

    #[test]
    fn test_editrow_evaluates_expressions() {
        let (interp, result) = run("base = 10\nmaketable T [k, v]\neditrow T [base + 1, base * 2]");
        result.unwrap();
        assert_eq!(rows(&interp, "T"), [vec![int(11), int(20)]]);
    }

    #[test]
    fn test_editrow_arity_mismatch() {
        let (interp, result) = run(&format!("{USERS}editrow Users [4, \"Dee\"]"));
        match result.unwrap_err() {
            Error::Arity {
                table,
                expected,
                found,
                ..
            } => {
                assert_eq!(table, "Users");
                assert_eq!((expected, found), (3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rows(&interp, "Users").len(), 3);
    }

    #[test]
    fn test_editrow_unknown_table() {
        assert!(matches!(
            error_of("editrow Nope [1]"),
            Error::UnknownTable { name, .. } if name == "Nope"
        ));
        assert!(matches!(
            error_of("x = 1\neditrow x [1]"),
            Error::NotATable { name, kind: "integer", .. } if name == "x"
        ));
    }

    #[test]
    fn test_editcell_overwrites_field() {
        let (interp, result) = run(&format!("{USERS}editcell Users [\"name\", 2, \"Bob\"]"));
        result.unwrap();
        assert_eq!(rows(&interp, "Users")[1], [int(2), text("Bob"), int(17)]);
    }

    #[test]
    fn test_editcell_never_creates_rows() {
        let (interp, result) = run(&format!("{USERS}editcell Users [\"name\", 999, \"X\"]"));
        assert!(matches!(
            result.unwrap_err(),
            Error::UnknownRow { key: Scalar::Integer(999), .. }
        ));
        assert_eq!(rows(&interp, "Users").len(), 3);
        assert!(rows(&interp, "Users").iter().all(|row| row[1] != text("X")));
    }

    #[test]
    fn test_editcell_errors() {
        assert!(matches!(
            error_of(&format!("{USERS}editcell Users [\"email\", 1, \"x\"]")),
            Error::UnknownColumn { column, .. } if column == "email"
        ));
        assert!(matches!(
            error_of(&format!("{USERS}editcell Users [1, 1, \"x\"]")),
            Error::Type { message, .. } if message == "Column name must be text, got integer"
        ));
        assert!(matches!(
            error_of("editcell Nope [\"a\", 1, 2]"),
            Error::UnknownTable { .. }
        ));
    }

    #[test]
    fn test_print_table() {
        assert_eq!(
            output_of("maketable T [id, name]\neditrow T [1, \"Ann\"]\nprint T"),
            ["Table T:", "| id | name |", "| 1 | Ann |"]
        );
    }

    #[test]
    fn test_query_with_condition() {
        assert_eq!(
            output_of(&format!("{USERS}query Users age >= 18")),
            [
                "Query results for Users:",
                "| id | name | age |",
                "| 1 | Ann | 31 |",
                "| 3 | Cid | 45 |",
            ]
        );
    }

    #[test]
    fn test_query_binds_columns_over_outer_names() {
        // the row's `age` shadows the outer one; `limit` comes from outside
        let output = output_of(&format!("{USERS}age = 0\nlimit = 40\nquery Users age > limit\nprint age"));
        assert_eq!(
            output,
            ["Query results for Users:", "| id | name | age |", "| 3 | Cid | 45 |", "0"]
        );
    }

    #[test]
    fn test_query_does_not_leak_bindings() {
        let (interp, result) = run(&format!("{USERS}query Users id == 1"));
        result.unwrap();
        assert!(!interp.environment().contains("id"));
        assert!(!interp.environment().contains("name"));
        assert!(!interp.environment().contains("age"));
    }

    #[test]
    fn test_query_restores_bindings_on_failure() {
        let (interp, result) = run(&format!("{USERS}name = 5\nquery Users name > 1"));
        assert!(matches!(result.unwrap_err(), Error::InvalidComparison { .. }));
        assert_eq!(
            interp.environment().get("name"),
            Some(&Value::Scalar(int(5)))
        );
        assert!(!interp.environment().contains("age"));
    }

    #[test]
    fn test_query_text_comparison() {
        assert_eq!(
            output_of(&format!("{USERS}query Users name == \"Bea\"")),
            ["Query results for Users:", "| id | name | age |", "| 2 | Bea | 17 |"]
        );
    }

    #[test]
    fn test_unbound_name() {
        match error_of("print missing + 1") {
            Error::UnboundName { name, span } => {
                assert_eq!(name, "missing");
                assert_eq!((span.line(), span.column()), (1, 7));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_operand_faults() {
        assert!(matches!(error_of("print 1 / 0"), Error::DivisionByZero { .. }));
        assert!(matches!(error_of("print \"a\" - 1"), Error::Type { .. }));
        assert!(matches!(
            error_of("maketable T [a]\nprint T + 1"),
            Error::Type { message, .. } if message == "Unsupported operand kinds for '+': table and integer"
        ));
        assert!(matches!(
            error_of("print 9223372036854775807 + 1"),
            Error::Overflow { .. }
        ));
    }

    #[test]
    fn test_maketable_overwrites_and_rejects_duplicates() {
        let (interp, result) = run(&format!("{USERS}maketable Users [id]"));
        result.unwrap();
        assert_eq!(interp.environment().get_table("Users").unwrap().row_count(), 0);

        assert!(matches!(
            error_of("maketable T [a, b, a]"),
            Error::DuplicateColumn { column, span, .. } if column == "a" && span.column() == 20
        ));
    }

    #[test]
    fn test_failure_keeps_earlier_effects_and_skips_later_statements() {
        let (interp, result) = run("x = 1\nprint x\nprint nope\ny = 2");
        assert!(result.is_err());
        assert_eq!(interp.output(), ["1"]);
        assert!(interp.environment().contains("x"));
        assert!(!interp.environment().contains("y"));
    }

    #[test]
    fn test_lex_and_parse_errors_run_nothing() {
        let (interp, result) = run("x = 1\ny = 2 $");
        assert!(matches!(result.unwrap_err(), Error::Lex(_)));
        assert!(interp.environment().is_empty());

        let (interp, result) = run("x = 1\ny = ");
        assert!(matches!(result.unwrap_err(), Error::Parse(_)));
        assert!(interp.environment().is_empty());
    }

    #[test]
    fn test_csv_round_trip() {
        let fs = MemoryFileSystem::new().with_file("in.csv", "id,name\n01,Ann\n2,Bea\n");
        let mut interp = Interpreter::with_file_system(fs);

        interp
            .run("importcsv \"in.csv\" as People\nexportcsv People \"out.csv\"")
            .unwrap();

        assert_eq!(
            interp.take_output(),
            ["Imported 2 rows into table 'People'", "Exported 2 rows to out.csv"]
        );
        assert_eq!(
            interp
                .file_system()
                .read_to_string(Path::new("out.csv"))
                .unwrap(),
            "id,name\n1,Ann\n2,Bea\n"
        );
        assert_eq!(rows(&interp, "People")[0], [int(1), text("Ann")]);
    }

    #[test]
    fn test_importcsv_missing_file() {
        let mut interp = Interpreter::with_file_system(MemoryFileSystem::new());
        assert!(matches!(
            interp.run("importcsv \"nope.csv\" as T").unwrap_err(),
            Error::FileNotFound { path, .. } if path == Path::new("nope.csv")
        ));
    }

    #[test]
    fn test_importcsv_bad_data() {
        let fs = MemoryFileSystem::new().with_file("bad.csv", "id,name\n1\n");
        let mut interp = Interpreter::with_file_system(fs);
        assert!(matches!(
            interp.run("importcsv \"bad.csv\" as T").unwrap_err(),
            Error::ImportCsv { .. }
        ));
        assert!(!interp.environment().contains("T"));
    }

    #[test]
    fn test_exportcsv_unknown_table() {
        let mut interp = Interpreter::with_file_system(MemoryFileSystem::new());
        assert!(matches!(
            interp.run("exportcsv Nope \"out.csv\"").unwrap_err(),
            Error::UnknownTable { .. }
        ));
    }

    #[test]
    fn test_import_evaluates_only_table_definitions() {
        let fs = MemoryFileSystem::new().with_file(
            "lib/tables.tadb",
            "maketable Items [id, label]\n\
             editrow Items [1, \"pen\"]\n\
             print \"should not print\"\n\
             leaked = 1\n\
             query Items\n",
        );
        let mut interp = Interpreter::with_file_system(fs);
        interp.run("import \"lib/tables.tadb\"").unwrap();

        assert_eq!(interp.output(), ["Imported tables from 'lib/tables.tadb'"]);
        assert!(!interp.environment().contains("leaked"));
        assert_eq!(rows(&interp, "Items"), [vec![int(1), text("pen")]]);
        assert_eq!(interp.current_file(), None);
    }

    #[test]
    fn test_import_resolves_relative_to_current_file() {
        let fs = MemoryFileSystem::new()
            .with_file("proj/main.tadb", "import \"tables.tadb\"\nquery Items")
            .with_file("proj/tables.tadb", "maketable Items [id]\neditrow Items [7]");
        let mut interp = Interpreter::with_file_system(fs);
        interp.run_file("proj/main.tadb").unwrap();

        assert_eq!(
            interp.take_output(),
            [
                "Imported tables from 'proj/tables.tadb'",
                "Query results for Items:",
                "| id |",
                "| 7 |",
            ]
        );
    }

    #[test]
    fn test_import_failure_is_wrapped() {
        let fs = MemoryFileSystem::new().with_file("broken.tadb", "maketable [");
        let mut interp = Interpreter::with_file_system(fs);

        let error = interp.run("import \"broken.tadb\"").unwrap_err();
        assert!(matches!(&error, Error::ImportFailed { path, .. } if path == Path::new("broken.tadb")));
        assert!(matches!(error.innermost(), Error::Parse(_)));

        let error = interp.run("import \"missing.tadb\"").unwrap_err();
        assert!(matches!(error.innermost(), Error::FileNotFound { .. }));
    }

    #[test]
    fn test_failed_import_leaves_no_tables() {
        let fs = MemoryFileSystem::new().with_file("partial.tadb", "maketable A [x]\neditrow Nope [1]");
        let mut interp = Interpreter::with_file_system(fs);

        let error = interp.run("maketable Keep [x]\nimport \"partial.tadb\"").unwrap_err();
        assert!(matches!(error.innermost(), Error::UnknownTable { name, .. } if name == "Nope"));

        let names: Vec<&str> = interp.environment().names().collect();
        assert_eq!(names, ["Keep"]);
        assert_eq!(interp.current_file(), None);
    }

    #[test]
    fn test_nested_import_is_skipped() {
        // an import inside an imported file is not a table definition
        let fs = MemoryFileSystem::new()
            .with_file("a.tadb", "maketable A [x]\nimport \"b.tadb\"")
            .with_file("b.tadb", "maketable B [x]\nimport \"a.tadb\"");
        let mut interp = Interpreter::with_file_system(fs);

        interp.run("maketable Keep [x]\nimport \"a.tadb\"").unwrap();

        let names: Vec<&str> = interp.environment().names().collect();
        assert_eq!(names, ["A", "Keep"]);
        assert_eq!(interp.output(), ["Imported tables from 'a.tadb'"]);
    }

    #[test]
    fn test_missing_nested_file_points_at_path() {
        let mut interp = Interpreter::with_file_system(MemoryFileSystem::new());

        let error = interp.run("x = 1\n\nimport \"gone.tadb\"").unwrap_err();
        match error.innermost() {
            Error::FileNotFound { span: Some(span), .. } => {
                assert_eq!((span.line(), span.column()), (3, 8));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let error = interp.run("runfile \"gone.tadb\"").unwrap_err();
        assert!(matches!(
            error.innermost(),
            Error::FileNotFound { span: Some(span), .. } if span.column() == 9
        ));
    }

    #[test]
    fn test_self_import_is_circular() {
        let fs = MemoryFileSystem::new()
            .with_file("self.tadb", "maketable T [a]\nimport \"self.tadb\"");
        let mut interp = Interpreter::with_file_system(fs);

        match interp.run_file("self.tadb").unwrap_err() {
            Error::CircularImport { chain, .. } => {
                assert_eq!(chain, [PathBuf::from("self.tadb"), PathBuf::from("self.tadb")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transitive_import_cycle_applies_no_mutation() {
        let fs = MemoryFileSystem::new()
            .with_file("a.tadb", "runfile \"b.tadb\"")
            .with_file("b.tadb", "import \"a.tadb\"\nmaketable Late [x]");
        let mut interp = Interpreter::with_file_system(fs);

        let error = interp.run_file("a.tadb").unwrap_err();
        assert!(matches!(error, Error::RunFileFailed { .. }));
        assert!(matches!(error.innermost(), Error::CircularImport { .. }));
        assert!(interp.environment().is_empty());
        assert!(!interp.should_exit());
    }

    #[test]
    fn test_runfile_cycle_is_circular_execution() {
        let fs = MemoryFileSystem::new()
            .with_file("a.tadb", "runfile \"b.tadb\"")
            .with_file("b.tadb", "runfile \"a.tadb\"");
        let mut interp = Interpreter::with_file_system(fs);

        let error = interp.run("runfile \"a.tadb\"").unwrap_err();
        match error.innermost() {
            Error::CircularExecution { chain, .. } => {
                let chain: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
                assert_eq!(chain, ["a.tadb", "b.tadb", "a.tadb"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_runfile_is_sandboxed_and_requests_exit() {
        let fs = MemoryFileSystem::new().with_file(
            "job.tadb",
            "maketable Temp [id]\neditrow Temp [1]\nx = 99\nprint x\nquery Temp",
        );
        let mut interp = Interpreter::with_file_system(fs);

        interp
            .run("x = 1\nrunfile \"job.tadb\"\nprint \"not reached\"")
            .unwrap();

        assert!(interp.should_exit());
        assert_eq!(
            interp.take_output(),
            ["99", "Query results for Temp:", "| id |", "| 1 |"]
        );
        assert_eq!(interp.environment().get("x"), Some(&Value::Scalar(int(1))));
        assert!(!interp.environment().contains("Temp"));
    }

    #[test]
    fn test_runfile_failure_restores_environment() {
        let fs = MemoryFileSystem::new().with_file("job.tadb", "x = 2\nmaketable T [a]\nprint nope");
        let mut interp = Interpreter::with_file_system(fs);

        let error = interp.run("x = 1\nrunfile \"job.tadb\"").unwrap_err();
        assert!(matches!(error.innermost(), Error::UnboundName { .. }));
        assert_eq!(interp.environment().get("x"), Some(&Value::Scalar(int(1))));
        assert!(!interp.environment().contains("T"));
        assert!(!interp.should_exit());
        assert_eq!(interp.current_file(), None);
    }

    #[test]
    fn test_next_run_clears_exit_request() {
        let fs = MemoryFileSystem::new().with_file("job.tadb", "");
        let mut interp = Interpreter::with_file_system(fs);

        interp.run("runfile \"job.tadb\"").unwrap();
        assert!(interp.should_exit());

        interp.run("print 1").unwrap();
        assert!(!interp.should_exit());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            error_of("editrow Nope [1]").to_string(),
            "Table 'Nope' not found"
        );
        assert_eq!(
            error_of("print 1 > 2").to_string(),
            "Expected statement, found '>' at line 1, column 9"
        );
    }
}
