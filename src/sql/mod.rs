//! MySQL dump to Schema conversion module.

mod lexer;
mod parser;

pub use lexer::Token;
pub use parser::{parse_sql, SqlParseError};
