pub mod csv_codec;
pub mod diagnostics;
pub mod environment;
pub mod file_system;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod source_location;
pub mod syntax;
pub mod token;
pub mod value;
