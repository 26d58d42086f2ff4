//! Visitor-based interpreter that renders a [`DocumentNode`] into a
//! [`RequestContext`].

use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

use super::functions::FunctionRegistry;
use super::node::{DocumentNode, EchoNode, Element, ForLoopNode, NodeVisitor, TextNode};
use super::value::{apply_operator, parse_number, Number, Value};
use crate::context::{ContextError, RequestContext};

/// Errors that abort rendering. Output already written stays written.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("variable `{0}` is not defined in any enclosing loop")]
    UnknownVariable(String),
    #[error("unknown function `@{0}`")]
    UnknownFunction(String),
    #[error("unknown operator `{0}`")]
    UnknownOperator(char),
    #[error("`{0}` needs more values than the stack holds")]
    StackUnderflow(&'static str),
    #[error("echo must leave exactly one value on the stack, found {0}")]
    UnbalancedEcho(usize),
    #[error("`{0}` is not a number")]
    NotANumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0}")]
    Arithmetic(String),
    #[error("FOR `{0}` has a step of zero")]
    ZeroStep(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Renders one document against one request context.
pub struct ScriptEngine<'a> {
    document: &'a DocumentNode,
    ctx: &'a mut RequestContext,
}

impl<'a> ScriptEngine<'a> {
    pub fn new(document: &'a DocumentNode, ctx: &'a mut RequestContext) -> Self {
        Self { document, ctx }
    }

    /// Walk the whole document, writing output as it goes.
    pub fn execute(self) -> Result<(), ScriptError> {
        let mut renderer = Renderer {
            ctx: self.ctx,
            functions: FunctionRegistry::builtins(),
            scopes: Vec::new(),
        };
        self.document.accept(&mut renderer)
    }
}

struct Renderer<'c> {
    ctx: &'c mut RequestContext,
    functions: &'static FunctionRegistry,
    // loop variable values stored as decimal text so ints stay ints
    scopes: Vec<HashMap<String, String>>,
}

impl Renderer<'_> {
    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        let text = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .ok_or_else(|| ScriptError::UnknownVariable(name.to_string()))?;
        Ok(parse_number(text)?.into())
    }

    fn resolve(&self, element: &Element) -> Result<Number, ScriptError> {
        match element {
            Element::Variable(name) => self.lookup(name)?.to_number(),
            other => match Value::from_constant(other) {
                Some(value) => value.to_number(),
                None => Err(ScriptError::NotANumber(other.to_string())),
            },
        }
    }
}

fn in_range(current: Number, end: Number, ascending: bool) -> bool {
    match (current, end) {
        (Number::Int(c), Number::Int(e)) => {
            if ascending {
                c <= e
            } else {
                c >= e
            }
        }
        _ => {
            let (c, e) = (current.as_f64(), end.as_f64());
            if ascending {
                c <= e
            } else {
                c >= e
            }
        }
    }
}

fn advance(current: Number, step: Number) -> Option<Number> {
    match (current, step) {
        (Number::Int(c), Number::Int(s)) => c.checked_add(s).map(Number::Int),
        _ => Some(Number::Double(current.as_f64() + step.as_f64())),
    }
}

impl Renderer<'_> {
    fn run_loop(
        &mut self,
        node: &ForLoopNode,
        mut current: Number,
        end: Number,
        step: Number,
        ascending: bool,
    ) -> Result<(), ScriptError> {
        while in_range(current, end, ascending) {
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(node.variable.clone(), current.to_string());
            }
            for child in &node.children {
                child.accept(self)?;
            }
            match advance(current, step) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(())
    }
}

impl NodeVisitor for Renderer<'_> {
    type Error = ScriptError;

    fn visit_document(&mut self, node: &DocumentNode) -> Result<(), ScriptError> {
        for child in &node.children {
            child.accept(self)?;
        }
        Ok(())
    }

    fn visit_text(&mut self, node: &TextNode) -> Result<(), ScriptError> {
        self.ctx.write_str(&node.text)?;
        Ok(())
    }

    fn visit_for_loop(&mut self, node: &ForLoopNode) -> Result<(), ScriptError> {
        let start = self.resolve(&node.start)?;
        let end = self.resolve(&node.end)?;
        let step = match &node.step {
            Some(step) => self.resolve(step)?,
            None => Number::Int(1),
        };
        if step.is_zero() {
            return Err(ScriptError::ZeroStep(node.variable.clone()));
        }
        let ascending = !step.is_negative();
        // an int loop value needs both an int start and an int step
        let current = match (start, step) {
            (Number::Int(_), Number::Int(_)) => start,
            _ => Number::Double(start.as_f64()),
        };
        trace!(variable = %node.variable, %start, %end, %step, "entering loop");

        self.scopes.push(HashMap::new());
        let result = self.run_loop(node, current, end, step, ascending);
        self.scopes.pop();
        result
    }

    fn visit_echo(&mut self, node: &EchoNode) -> Result<(), ScriptError> {
        let mut stack: Vec<Value> = Vec::with_capacity(node.elements.len());
        for element in &node.elements {
            match element {
                Element::Variable(name) => stack.push(self.lookup(name)?),
                Element::Function(name) => {
                    let function = self
                        .functions
                        .get(name)
                        .ok_or_else(|| ScriptError::UnknownFunction(name.clone()))?;
                    function(&mut stack, self.ctx)?;
                }
                Element::Operator(op) => {
                    let right = stack.pop().ok_or(ScriptError::StackUnderflow("operator"))?;
                    let left = stack.pop().ok_or(ScriptError::StackUnderflow("operator"))?;
                    stack.push(apply_operator(*op, &left, &right)?);
                }
                constant => {
                    if let Some(value) = Value::from_constant(constant) {
                        stack.push(value);
                    }
                }
            }
        }
        match stack.as_slice() {
            [value] => {
                self.ctx.write_str(&value.to_string())?;
                Ok(())
            }
            _ => Err(ScriptError::UnbalancedEcho(stack.len())),
        }
    }
}
