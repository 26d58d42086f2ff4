use thiserror::Error;

use super::lexer::{Lexer, LexerError, LexerState, Token, TokenKind};
use super::node::{DocumentNode, EchoNode, Element, ForLoopNode, Node, TextNode};

/// Errors raised while building a [`DocumentNode`]. No partial tree is ever
/// returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("empty directive")]
    EmptyTag,
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
    #[error("expected a loop variable after FOR, found {0}")]
    InvalidLoopVariable(TokenKind),
    #[error("FOR `{variable}` needs 3 or 4 arguments, found {found}")]
    LoopArity { variable: String, found: usize },
    #[error("{0} is not allowed as a FOR argument")]
    InvalidLoopArgument(TokenKind),
    #[error("`=` is not allowed inside an echo")]
    AssignInEcho,
    #[error("unexpected {0} inside a directive")]
    UnexpectedToken(TokenKind),
    #[error("END without a matching FOR")]
    UnmatchedEnd,
    #[error("FOR `{0}` is never closed with END")]
    UnclosedLoop(String),
}

/// Builds a document tree by driving a [`Lexer`] and switching its mode on
/// every tag boundary.
pub struct SmartScriptParser {
    document: DocumentNode,
}

enum Directive {
    Echo(EchoNode),
    For(ForHeader),
    End,
}

struct ForHeader {
    variable: String,
    start: Element,
    end: Element,
    step: Option<Element>,
}

impl SmartScriptParser {
    /// Parse `body` in full.
    ///
    /// # Errors
    ///
    /// Any lexical or syntax error aborts the whole parse.
    pub fn new(body: &str) -> Result<Self, ParseError> {
        let document = parse_document(body)?;
        Ok(Self { document })
    }

    pub fn document(&self) -> &DocumentNode {
        &self.document
    }

    pub fn into_document(self) -> DocumentNode {
        self.document
    }
}

/// Parse `body` into a document.
pub fn parse_document(body: &str) -> Result<DocumentNode, ParseError> {
    let mut lexer = Lexer::new(body);
    // Each open FOR keeps its header and collected children; the root frame
    // has no header.
    let mut frames: Vec<(Option<ForHeader>, Vec<Node>)> = vec![(None, Vec::new())];

    loop {
        match lexer.next_token()? {
            Token::Eof => break,
            Token::Text(text) => push_child(&mut frames, Node::Text(TextNode { text })),
            Token::TagOpen => {
                lexer.set_state(LexerState::Directive);
                let directive = parse_directive(&mut lexer)?;
                lexer.set_state(LexerState::Basic);
                match directive {
                    Directive::Echo(echo) => push_child(&mut frames, Node::Echo(echo)),
                    Directive::For(header) => frames.push((Some(header), Vec::new())),
                    Directive::End => {
                        if frames.len() < 2 {
                            return Err(ParseError::UnmatchedEnd);
                        }
                        if let Some((Some(header), children)) = frames.pop() {
                            let node = ForLoopNode {
                                variable: header.variable,
                                start: header.start,
                                end: header.end,
                                step: header.step,
                                children,
                            };
                            push_child(&mut frames, Node::ForLoop(node));
                        }
                    }
                }
            }
            other => return Err(ParseError::UnexpectedToken(other.kind())),
        }
    }

    if frames.len() > 1 {
        let variable = frames
            .pop()
            .and_then(|(header, _)| header)
            .map(|h| h.variable)
            .unwrap_or_default();
        return Err(ParseError::UnclosedLoop(variable));
    }
    let children = frames.pop().map(|(_, children)| children).unwrap_or_default();
    Ok(DocumentNode { children })
}

fn push_child(frames: &mut [(Option<ForHeader>, Vec<Node>)], node: Node) {
    if let Some((_, children)) = frames.last_mut() {
        children.push(node);
    }
}

/// Parse everything between `{$` and `$}`, consuming the closing marker.
fn parse_directive(lexer: &mut Lexer) -> Result<Directive, ParseError> {
    match lexer.next_token()? {
        Token::Operator('=') => parse_echo(lexer).map(Directive::Echo),
        Token::Variable(name) if name == "END" => match lexer.next_token()? {
            Token::TagClose => Ok(Directive::End),
            other => Err(ParseError::UnexpectedToken(other.kind())),
        },
        Token::Variable(name) if name.eq_ignore_ascii_case("for") => {
            parse_for(lexer).map(Directive::For)
        }
        Token::Variable(name) => Err(ParseError::UnknownTag(name)),
        Token::TagClose => Err(ParseError::EmptyTag),
        other => Err(ParseError::UnexpectedToken(other.kind())),
    }
}

fn parse_echo(lexer: &mut Lexer) -> Result<EchoNode, ParseError> {
    let mut elements = Vec::new();
    loop {
        let element = match lexer.next_token()? {
            Token::TagClose => return Ok(EchoNode { elements }),
            Token::Operator('=') => return Err(ParseError::AssignInEcho),
            Token::Variable(name) => Element::Variable(name),
            Token::Integer(value) => Element::Integer(value),
            Token::Double(value) => Element::Double(value),
            Token::Str(value) => Element::Str(value),
            Token::Function(name) => Element::Function(name),
            Token::Operator(op) => Element::Operator(op),
            other => return Err(ParseError::UnexpectedToken(other.kind())),
        };
        elements.push(element);
    }
}

fn parse_for(lexer: &mut Lexer) -> Result<ForHeader, ParseError> {
    let variable = match lexer.next_token()? {
        Token::Variable(name) => name,
        other => return Err(ParseError::InvalidLoopVariable(other.kind())),
    };

    let mut bounds = Vec::with_capacity(3);
    loop {
        let arg = match lexer.next_token()? {
            Token::TagClose => break,
            Token::Variable(name) => Element::Variable(name),
            Token::Integer(value) => Element::Integer(value),
            Token::Double(value) => Element::Double(value),
            Token::Str(value) => Element::Str(value),
            other => return Err(ParseError::InvalidLoopArgument(other.kind())),
        };
        bounds.push(arg);
    }

    // the loop variable counts as the first argument
    let found = bounds.len() + 1;
    let mut bounds = bounds.into_iter();
    match (bounds.next(), bounds.next(), bounds.next(), bounds.next()) {
        (Some(start), Some(end), step, None) => Ok(ForHeader {
            variable,
            start,
            end,
            step,
        }),
        _ => Err(ParseError::LoopArity { variable, found }),
    }
}
