//! # SmartScript
//!
//! A tiny template language. Literal text is copied through; directives
//! between `{$` and `$}` either open a counted loop or echo the result of a
//! postfix expression:
//!
//! ```text
//! {$ FOR i 1 3 1 $}line {$= i $} squared is {$= i i * $}
//! {$ END $}
//! ```
//!
//! The pipeline is [`Lexer`] → [`SmartScriptParser`] → [`DocumentNode`] →
//! [`ScriptEngine`]. Parsed documents are immutable and may be shared
//! between requests; all interpreter state lives in the engine.

mod engine;
mod functions;
mod lexer;
mod node;
mod parser;
mod value;

pub use engine::{ScriptEngine, ScriptError};
pub use functions::{format_decimal, FunctionRegistry, ScriptFunction};
pub use lexer::{escape_text, Lexer, LexerError, LexerState, Token, TokenKind, TAG_CLOSE, TAG_OPEN};
pub use node::{DocumentNode, EchoNode, Element, ForLoopNode, Node, NodeVisitor, TextNode};
pub use parser::{parse_document, ParseError, SmartScriptParser};
pub use value::{apply_operator, Number, Value};

