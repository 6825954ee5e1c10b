use crate::source_location::SourceSpan;
use derive_more::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    As,
    EditCell,
    EditRow,
    ExportCsv,
    Import,
    ImportCsv,
    MakeTable,
    Print,
    Query,
    RunFile,

    // Single-character tokens
    Comma,
    Equal,
    Greater,
    LeftBracket,
    LeftParen,
    Less,
    Minus,
    Plus,
    RightBracket,
    RightParen,
    Slash,
    Star,

    // Two-character tokens
    BangEqual,
    EqualEqual,
    GreaterEqual,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Special
    Eof,
}

macro_rules! define_TokenKind_from_keyword_lexeme {
    ($($variant:ident => $str:expr),* $(,)?) => {
        impl TokenKind {
            pub fn from_keyword_lexeme(lexeme: &str) -> Option<TokenKind> {
                match lexeme {
                    $($str => Some(TokenKind::$variant),)*
                    _ => None
                }
            }
        }
    }
}

define_TokenKind_from_keyword_lexeme! {
    As => "as",
    EditCell => "editcell",
    EditRow => "editrow",
    ExportCsv => "exportcsv",
    Import => "import",
    ImportCsv => "importcsv",
    MakeTable => "maketable",
    Print => "print",
    Query => "query",
    RunFile => "runfile",
}

impl TokenKind {
    /// Keywords that begin a statement.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::EditCell
                | TokenKind::EditRow
                | TokenKind::ExportCsv
                | TokenKind::Import
                | TokenKind::ImportCsv
                | TokenKind::MakeTable
                | TokenKind::Print
                | TokenKind::Query
                | TokenKind::RunFile
        )
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::EqualEqual
                | TokenKind::BangEqual
        )
    }

    pub fn is_keyword(&self) -> bool {
        self.starts_statement() || *self == TokenKind::As
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TokenKind::As => write!(f, "as"),
            TokenKind::BangEqual => write!(f, "!="),
            TokenKind::Comma => write!(f, ","),
            TokenKind::EditCell => write!(f, "editcell"),
            TokenKind::EditRow => write!(f, "editrow"),
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::ExportCsv => write!(f, "exportcsv"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::Identifier => write!(f, "identifier"),
            TokenKind::Import => write!(f, "import"),
            TokenKind::ImportCsv => write!(f, "importcsv"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::MakeTable => write!(f, "maketable"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Number => write!(f, "number"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Print => write!(f, "print"),
            TokenKind::Query => write!(f, "query"),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::RunFile => write!(f, "runfile"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::String => write!(f, "string"),
        }
    }
}

/// A scanned lexeme. For string literals `lexeme` holds the text between the
/// quotes; `span` still covers the quotes themselves.
#[derive(Debug, Clone, PartialEq, Display)]
#[display(fmt = "{lexeme}")]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: SourceSpan) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line()
    }

    pub fn column(&self) -> usize {
        self.span.column()
    }

    /// Human-readable description used in syntax errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Identifier => format!("identifier '{}'", self.lexeme),
            TokenKind::Number => format!("number {}", self.lexeme),
            TokenKind::String => format!("string \"{}\"", self.lexeme),
            _ if self.kind.is_keyword() => format!("keyword '{}'", self.lexeme),
            _ => format!("'{}'", self.lexeme),
        }
    }
}
