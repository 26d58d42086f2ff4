//! SmartScript syntax tree.
//!
//! Nodes are built bottom-up by [`crate::script::SmartScriptParser`] and are
//! never mutated afterwards. `Display` on any node yields canonical source
//! text that parses back into an equal tree.

use serde::Serialize;
use std::fmt;

use super::lexer::{escape_string, escape_text, TAG_CLOSE, TAG_OPEN};

/// A single operand or operator inside a directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Element {
    Variable(String),
    Integer(i64),
    Double(f64),
    Str(String),
    Function(String),
    Operator(char),
}

/// Render a double so that the lexer reads it back as a double.
pub(crate) fn format_double(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Variable(name) => f.write_str(name),
            Element::Integer(value) => write!(f, "{value}"),
            Element::Double(value) => f.write_str(&format_double(*value)),
            Element::Str(value) => write!(f, "\"{}\"", escape_string(value)),
            Element::Function(name) => write!(f, "@{name}"),
            Element::Operator(op) => write!(f, "{op}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForLoopNode {
    pub variable: String,
    pub start: Element,
    pub end: Element,
    pub step: Option<Element>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchoNode {
    pub elements: Vec<Element>,
}

/// Any non-root node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Text(TextNode),
    ForLoop(ForLoopNode),
    Echo(EchoNode),
}

/// Root of a parsed script.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DocumentNode {
    pub children: Vec<Node>,
}

/// Double-dispatch visitor over the closed node set.
pub trait NodeVisitor {
    type Error;

    fn visit_document(&mut self, node: &DocumentNode) -> Result<(), Self::Error>;
    fn visit_text(&mut self, node: &TextNode) -> Result<(), Self::Error>;
    fn visit_for_loop(&mut self, node: &ForLoopNode) -> Result<(), Self::Error>;
    fn visit_echo(&mut self, node: &EchoNode) -> Result<(), Self::Error>;
}

impl DocumentNode {
    pub fn accept<V: NodeVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_document(self)
    }
}

impl Node {
    pub fn accept<V: NodeVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        match self {
            Node::Text(node) => visitor.visit_text(node),
            Node::ForLoop(node) => visitor.visit_for_loop(node),
            Node::Echo(node) => visitor.visit_echo(node),
        }
    }
}

impl fmt::Display for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_text(&self.text))
    }
}

impl fmt::Display for ForLoopNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TAG_OPEN} FOR {} {} {}",
            self.variable, self.start, self.end
        )?;
        if let Some(step) = &self.step {
            write!(f, " {step}")?;
        }
        write!(f, " {TAG_CLOSE}")?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "{TAG_OPEN} END {TAG_CLOSE}")
    }
}

impl fmt::Display for EchoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TAG_OPEN} =")?;
        for element in &self.elements {
            write!(f, " {element}")?;
        }
        write!(f, " {TAG_CLOSE}")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(node) => node.fmt(f),
            Node::ForLoop(node) => node.fmt(f),
            Node::Echo(node) => node.fmt(f),
        }
    }
}

impl fmt::Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for child in &self.children {
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_always_has_point() {
        assert_eq!(Element::Double(3.0).to_string(), "3.0");
        assert_eq!(Element::Double(-0.25).to_string(), "-0.25");
    }

    #[test]
    fn test_echo_display() {
        let echo = EchoNode {
            elements: vec![
                Element::Variable("i".into()),
                Element::Str("a\"b".into()),
                Element::Function("dup".into()),
                Element::Operator('+'),
            ],
        };
        assert_eq!(echo.to_string(), r#"{$ = i "a\"b" @dup + $}"#);
    }
}
