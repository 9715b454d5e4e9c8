//! Guest values and scope chains.
//!
//! The value graph is `Rc`-based and deliberately `!Send`: a rule
//! invocation owns its entire heap on one dedicated thread, and nothing
//! in it can alias host state. Objects keep insertion order, matching
//! what rule authors expect from the dialect.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::interp::{Interpreter, Signal};

/// A guest-side value.
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean.
    Bool(bool),
    /// IEEE-754 double, as in the source dialect.
    Num(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Mutable array with reference semantics.
    Array(Rc<RefCell<Vec<Value>>>),
    /// Mutable, insertion-ordered object with reference semantics.
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    /// A guest closure.
    Function(Rc<Closure>),
    /// A host-provided function.
    Native(Rc<NativeFunction>),
}

/// A guest closure: parameters, body, and the captured scope.
pub struct Closure {
    /// Function name, for error messages.
    pub name: Option<String>,
    /// Parameter names.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Rc<Vec<Stmt>>,
    /// Captured environment.
    pub env: Env,
}

/// A host function callable from guest code.
pub struct NativeFunction {
    /// Name, for error messages and `typeof` display.
    pub name: String,
    /// Implementation; receivers are captured in the closure.
    #[allow(clippy::type_complexity)]
    pub f: Box<dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Signal>>,
}

impl Value {
    /// Build a string value.
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    /// Build an array value.
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    /// Build an object value.
    pub fn object(props: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(props)))
    }

    /// Build a native function value.
    pub fn native(
        name: impl Into<String>,
        f: impl Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Signal> + 'static,
    ) -> Self {
        Value::Native(Rc::new(NativeFunction {
            name: name.into(),
            f: Box::new(f),
        }))
    }

    /// `typeof` result.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Truthiness under the dialect's rules.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Numeric coercion (`+x` semantics).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Num(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Strict equality (`===`).
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Loose equality (`==`): strict within a type, `null == undefined`,
    /// and numeric coercion across number/string/boolean.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Num(_), Value::Num(_))
            | (Value::Str(_), Value::Str(_))
            | (Value::Bool(_), Value::Bool(_)) => self.strict_eq(other),
            (
                Value::Num(_) | Value::Str(_) | Value::Bool(_),
                Value::Num(_) | Value::Str(_) | Value::Bool(_),
            ) => {
                let a = self.to_number();
                let b = other.to_number();
                a == b
            }
            _ => self.strict_eq(other),
        }
    }

    /// String coercion, matching the dialect's `String(x)`.
    pub fn js_to_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(elements) => elements
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.js_to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(f) => match &f.name {
                Some(name) => format!("function {name}() {{ ... }}"),
                None => "function () { ... }".to_string(),
            },
            Value::Native(f) => format!("function {}() {{ [native] }}", f.name),
        }
    }

    /// Convert a JSON tree into a guest value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(elements) => {
                Value::array(elements.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(props) => Value::object(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert a guest value into a JSON tree. `None` for values JSON
    /// cannot represent (`undefined`, functions). Fails on cyclic
    /// structures.
    pub fn to_json(&self) -> Result<Option<serde_json::Value>, ()> {
        self.to_json_depth(256)
    }

    fn to_json_depth(&self, depth: u32) -> Result<Option<serde_json::Value>, ()> {
        if depth == 0 {
            return Err(());
        }
        Ok(match self {
            Value::Undefined | Value::Function(_) | Value::Native(_) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Num(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Value::Str(s) => Some(serde_json::Value::String(s.to_string())),
            Value::Array(elements) => {
                let mut out = Vec::with_capacity(elements.borrow().len());
                for element in elements.borrow().iter() {
                    out.push(
                        element
                            .to_json_depth(depth - 1)?
                            .unwrap_or(serde_json::Value::Null),
                    );
                }
                Some(serde_json::Value::Array(out))
            }
            Value::Object(props) => {
                let mut out = serde_json::Map::new();
                for (key, value) in props.borrow().iter() {
                    if let Some(json) = value.to_json_depth(depth - 1)? {
                        out.insert(key.clone(), json);
                    }
                }
                Some(serde_json::Value::Object(out))
            }
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{s}\""),
            other => write!(f, "{}", other.js_to_string()),
        }
    }
}

/// Render a number the way the dialect prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Build an error object (`{name, message}`), the shape guest `catch`
/// clauses and the host's failure path both understand.
pub fn make_error(name: &str, message: impl Into<String>) -> Value {
    let mut props = IndexMap::new();
    props.insert("name".to_string(), Value::str(name));
    props.insert("message".to_string(), Value::str(message.into()));
    Value::object(props)
}

/// Human-readable message for a thrown value.
pub fn error_message(value: &Value) -> String {
    if let Value::Object(props) = value {
        let props = props.borrow();
        if let Some(message) = props.get("message") {
            let message = message.js_to_string();
            return match props.get("name") {
                Some(name) => format!("{}: {message}", name.js_to_string()),
                None => message,
            };
        }
    }
    value.js_to_string()
}

/// A lexical scope chain node.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Scope>>);

struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Env {
    /// A fresh root scope.
    pub fn new() -> Self {
        Env(Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: None,
        })))
    }

    /// A child scope of `self`.
    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    /// Define (or redefine) a name in this scope.
    pub fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// Look a name up through the scope chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        if let Some(value) = scope.vars.get(name) {
            return Some(value.clone());
        }
        scope.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Assign to an existing binding; returns false when no scope in the
    /// chain declares the name.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        match &scope.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
