//! Built-in functions callable from echo directives as `@name`.
//!
//! A function receives the whole value stack and pops its own arguments;
//! the last argument is on top, so arguments come off right-to-left.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::engine::ScriptError;
use super::value::{Number, Value};
use crate::context::RequestContext;

pub type ScriptFunction = fn(&mut Vec<Value>, &mut RequestContext) -> Result<(), ScriptError>;

static BUILTINS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::with_builtins);

/// Name to function table.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, ScriptFunction>,
}

impl FunctionRegistry {
    /// Shared registry holding every built-in.
    pub fn builtins() -> &'static FunctionRegistry {
        &BUILTINS
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register("sin", sin);
        registry.register("decfmt", decfmt);
        registry.register("dup", dup);
        registry.register("swap", swap);
        registry.register("setMimeType", set_mime_type);
        registry.register("paramGet", param_get);
        registry.register("pparamGet", pparam_get);
        registry.register("pparamSet", pparam_set);
        registry.register("pparamDel", pparam_del);
        registry.register("tparamGet", tparam_get);
        registry.register("tparamSet", tparam_set);
        registry.register("tparamDel", tparam_del);
        registry
    }

    pub fn register(&mut self, name: &'static str, function: ScriptFunction) {
        self.functions.insert(name, function);
    }

    pub fn get(&self, name: &str) -> Option<ScriptFunction> {
        self.functions.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn pop(stack: &mut Vec<Value>, function: &'static str) -> Result<Value, ScriptError> {
    stack.pop().ok_or(ScriptError::StackUnderflow(function))
}

fn sin(stack: &mut Vec<Value>, _: &mut RequestContext) -> Result<(), ScriptError> {
    let x = pop(stack, "sin")?.to_number()?.as_f64();
    stack.push(Value::Double(x.to_radians().sin()));
    Ok(())
}

fn decfmt(stack: &mut Vec<Value>, _: &mut RequestContext) -> Result<(), ScriptError> {
    let pattern = pop(stack, "decfmt")?.to_string();
    let x = pop(stack, "decfmt")?.to_number()?;
    stack.push(Value::Str(format_decimal(x, &pattern)));
    Ok(())
}

/// Format with a decimal pattern: `0` is a mandatory digit, `#` an optional
/// one. `"0.000"` always prints three fraction digits, `"#.##"` up to two
/// and no leading zero.
pub fn format_decimal(value: Number, pattern: &str) -> String {
    let (int_pattern, frac_pattern) = pattern.split_once('.').unwrap_or((pattern, ""));
    let count = |s: &str, c: char| s.chars().filter(|x| *x == c).count();
    let min_frac = count(frac_pattern, '0');
    let max_frac = min_frac + count(frac_pattern, '#');
    let min_int = count(int_pattern, '0');

    let number = value.as_f64();
    let rendered = format!("{:.*}", max_frac, number.abs());
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, ""));

    let mut frac = frac_part.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }
    let mut int = int_part.to_string();
    if int.len() < min_int {
        int = format!("{}{int}", "0".repeat(min_int - int.len()));
    }
    if min_int == 0 && int == "0" && !frac.is_empty() {
        int.clear();
    }

    let mut out = String::new();
    let is_zero = int.chars().chain(frac.chars()).all(|c| c == '0');
    if number < 0.0 && !is_zero {
        out.push('-');
    }
    out.push_str(&int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    if out.is_empty() {
        out.push('0');
    }
    out
}

fn dup(stack: &mut Vec<Value>, _: &mut RequestContext) -> Result<(), ScriptError> {
    let top = stack
        .last()
        .cloned()
        .ok_or(ScriptError::StackUnderflow("dup"))?;
    stack.push(top);
    Ok(())
}

fn swap(stack: &mut Vec<Value>, _: &mut RequestContext) -> Result<(), ScriptError> {
    let b = pop(stack, "swap")?;
    let a = pop(stack, "swap")?;
    stack.push(b);
    stack.push(a);
    Ok(())
}

fn set_mime_type(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let mime = pop(stack, "setMimeType")?;
    ctx.set_mime_type(mime.to_string())?;
    Ok(())
}

fn param_get(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let default = pop(stack, "paramGet")?;
    let name = pop(stack, "paramGet")?.to_string();
    let value = ctx
        .parameter(&name)
        .map(|v| Value::Str(v.to_string()))
        .unwrap_or(default);
    stack.push(value);
    Ok(())
}

fn pparam_get(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let default = pop(stack, "pparamGet")?;
    let name = pop(stack, "pparamGet")?.to_string();
    let value = ctx
        .persistent_parameter(&name)
        .map(Value::Str)
        .unwrap_or(default);
    stack.push(value);
    Ok(())
}

fn pparam_set(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let name = pop(stack, "pparamSet")?.to_string();
    let value = pop(stack, "pparamSet")?.to_string();
    ctx.set_persistent_parameter(name, value);
    Ok(())
}

fn pparam_del(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let name = pop(stack, "pparamDel")?.to_string();
    ctx.remove_persistent_parameter(&name);
    Ok(())
}

fn tparam_get(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let default = pop(stack, "tparamGet")?;
    let name = pop(stack, "tparamGet")?.to_string();
    let value = ctx
        .temporary_parameter(&name)
        .map(|v| Value::Str(v.to_string()))
        .unwrap_or(default);
    stack.push(value);
    Ok(())
}

fn tparam_set(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let name = pop(stack, "tparamSet")?.to_string();
    let value = pop(stack, "tparamSet")?.to_string();
    ctx.set_temporary_parameter(name, value);
    Ok(())
}

fn tparam_del(stack: &mut Vec<Value>, ctx: &mut RequestContext) -> Result<(), ScriptError> {
    let name = pop(stack, "tparamDel")?.to_string();
    ctx.remove_temporary_parameter(&name);
    Ok(())
}
