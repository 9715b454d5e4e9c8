//! The stepped tree-walking evaluator.
//!
//! Every statement and expression node passes through [`Interpreter::tick`]:
//! each `steps_per_yield` micro-steps the evaluator checks the wall-clock
//! deadline and sleeps for the configured quantum, which is the only
//! mechanism by which a rule releases its thread. Timeouts travel as
//! [`Signal::Timeout`], which no guest `catch` clause can intercept.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::ast::{
    AssignOp, BinaryOp, Expr, LogicalOp, MemberKey, PropKey, Stmt, UnaryOp,
};
use crate::bridge::Bridge;
use crate::builtins;
use crate::value::{error_message, make_error, Closure, Env, Value};

/// Non-local control flow and host-level interrupts.
///
/// `Return`/`Break`/`Continue`/`Throw` are ordinary guest control flow;
/// `Timeout` and `Internal` terminate the run and are never observable
/// from guest code.
#[derive(Debug)]
pub enum Signal {
    /// `return` unwinding to the nearest call frame.
    Return(Value),
    /// `break` unwinding to the nearest loop or switch.
    Break,
    /// `continue` unwinding to the nearest loop.
    Continue,
    /// A thrown guest value, catchable by `try`.
    Throw(Value),
    /// The wall-clock deadline passed.
    Timeout,
    /// A host invariant was violated.
    Internal(String),
}

/// Throw helper for guest-visible type errors.
pub fn type_error(message: impl Into<String>) -> Signal {
    Signal::Throw(make_error("TypeError", message.into()))
}

/// Stepping and limit configuration for one interpreter instance.
#[derive(Debug, Clone)]
pub struct StepLimits {
    /// Micro-steps between cooperative yields.
    pub steps_per_yield: u64,
    /// Sleep duration at each yield point.
    pub sleep: Duration,
    /// Wall-clock budget for the whole run.
    pub max_runtime: Duration,
    /// Maximum guest call depth.
    pub max_call_depth: usize,
}

/// One rule invocation's evaluator. Consumed by [`Interpreter::run`]; a
/// settled instance cannot be rerun.
pub struct Interpreter {
    globals: Env,
    steps: u64,
    steps_per_yield: u64,
    sleep: Duration,
    deadline: Instant,
    depth: usize,
    max_depth: usize,
}

impl Interpreter {
    /// Create an evaluator with the host bridge installed in its global
    /// scope. The deadline starts counting immediately.
    pub fn new(bridge: &Rc<Bridge>, limits: &StepLimits) -> Self {
        let globals = Env::new();
        builtins::install_globals(&globals, bridge);
        Self {
            globals,
            steps: 0,
            steps_per_yield: limits.steps_per_yield.max(1),
            sleep: limits.sleep,
            deadline: Instant::now() + limits.max_runtime,
            depth: 0,
            max_depth: limits.max_call_depth,
        }
    }

    /// Execute a program to completion. Consumes the interpreter: terminal
    /// states are absorbing.
    pub fn run(mut self, program: &[Stmt]) -> Result<(), Signal> {
        let env = self.globals.clone();
        self.exec_block(program, &env)
    }

    /// Account one micro-step; at each yield boundary enforce the deadline
    /// and sleep the quantum (capped to the time remaining).
    fn tick(&mut self) -> Result<(), Signal> {
        self.steps += 1;
        if self.steps % self.steps_per_yield == 0 {
            let now = Instant::now();
            if now >= self.deadline {
                return Err(Signal::Timeout);
            }
            if !self.sleep.is_zero() {
                std::thread::sleep(self.sleep.min(self.deadline - now));
                if Instant::now() >= self.deadline {
                    return Err(Signal::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Execute a statement list with function declarations hoisted.
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<(), Signal> {
        for stmt in stmts {
            if let Stmt::FunctionDecl { name, params, body } = stmt {
                let closure = Value::Function(Rc::new(Closure {
                    name: Some(name.clone()),
                    params: params.clone(),
                    body: body.clone(),
                    env: env.clone(),
                }));
                env.define(name, closure);
            }
        }
        for stmt in stmts {
            self.exec_stmt(stmt, env)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<(), Signal> {
        self.tick()?;
        match stmt {
            Stmt::Empty | Stmt::FunctionDecl { .. } => Ok(()),
            Stmt::VarDecl { decls } => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::Undefined,
                    };
                    env.define(name, value);
                }
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(())
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Err(Signal::Return(value))
            }
            Stmt::Block(stmts) => {
                let scope = env.child();
                self.exec_block(stmts, &scope)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(())
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.truthy() {
                    match self.exec_stmt(body, env) {
                        Err(Signal::Break) => break,
                        Err(Signal::Continue) | Ok(()) => {}
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::DoWhile { body, cond } => {
                loop {
                    match self.exec_stmt(body, env) {
                        Err(Signal::Break) => break,
                        Err(Signal::Continue) | Ok(()) => {}
                        Err(other) => return Err(other),
                    }
                    if !self.eval(cond, env)?.truthy() {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let scope = env.child();
                if let Some(init) = init {
                    self.exec_stmt(init, &scope)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &scope) {
                        Err(Signal::Break) => break,
                        Err(Signal::Continue) | Ok(()) => {}
                        Err(other) => return Err(other),
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                }
                Ok(())
            }
            Stmt::Break => Err(Signal::Break),
            Stmt::Continue => Err(Signal::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                Err(Signal::Throw(value))
            }
            Stmt::Try {
                block,
                catch,
                finally,
            } => {
                let scope = env.child();
                let mut result = self.exec_block(block, &scope);

                let thrown = match (&result, catch) {
                    (Err(Signal::Throw(value)), Some(_)) => Some(value.clone()),
                    _ => None,
                };
                if let (Some(thrown), Some((param, body))) = (thrown, catch) {
                    let catch_scope = env.child();
                    if let Some(param) = param {
                        catch_scope.define(param, thrown);
                    }
                    result = self.exec_block(body, &catch_scope);
                }

                if let Some(finally) = finally {
                    let finally_scope = env.child();
                    // A failing finally block supersedes the earlier result.
                    self.exec_block(finally, &finally_scope)?;
                }
                result
            }
            Stmt::Switch { disc, cases } => {
                let value = self.eval(disc, env)?;
                let scope = env.child();

                let mut start = None;
                for (index, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        if value.strict_eq(&self.eval(test, &scope)?) {
                            start = Some(index);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));

                if let Some(start) = start {
                    'matched: for case in &cases[start..] {
                        for stmt in &case.body {
                            match self.exec_stmt(stmt, &scope) {
                                Err(Signal::Break) => break 'matched,
                                Err(other) => return Err(other),
                                Ok(()) => {}
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, Signal> {
        self.tick()?;
        match expr {
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Ident(name) => env.get(name).ok_or_else(|| {
                Signal::Throw(make_error(
                    "ReferenceError",
                    format!("{name} is not defined"),
                ))
            }),
            Expr::Array(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for element in elements {
                    out.push(self.eval(element, env)?);
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut out = indexmap::IndexMap::new();
                for (key, value) in props {
                    let key = match key {
                        PropKey::Fixed(name) => name.clone(),
                        PropKey::Computed(expr) => self.eval(expr, env)?.js_to_string(),
                    };
                    let value = self.eval(value, env)?;
                    out.insert(key, value);
                }
                Ok(Value::object(out))
            }
            Expr::Function { name, params, body } => {
                // Named function expressions see their own name for
                // recursion without leaking it into the enclosing scope.
                let capture = match name {
                    Some(_) => env.child(),
                    None => env.clone(),
                };
                let closure = Value::Function(Rc::new(Closure {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    env: capture.clone(),
                }));
                if let Some(name) = name {
                    capture.define(name, closure.clone());
                }
                Ok(closure)
            }
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                let key = self.member_key(property, env)?;
                self.member_value(&object, &key)
            }
            Expr::Call { callee, args } => {
                let (function, hint) = match callee.as_ref() {
                    Expr::Member { object, property } => {
                        let receiver = self.eval(object, env)?;
                        let key = self.member_key(property, env)?;
                        let function = self.member_value(&receiver, &key)?;
                        (function, key)
                    }
                    Expr::Ident(name) => {
                        let function = self.eval(callee, env)?;
                        (function, name.clone())
                    }
                    _ => (self.eval(callee, env)?, "expression".to_string()),
                };
                let args = self.eval_args(args, env)?;
                self.call_value(function, args, &hint)
            }
            Expr::New { callee, args } => {
                let hint = match callee.as_ref() {
                    Expr::Ident(name) => name.clone(),
                    _ => "constructor".to_string(),
                };
                let function = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.call_value(function, args, &hint)
            }
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf {
                    // typeof tolerates undeclared identifiers.
                    if let Expr::Ident(name) = operand.as_ref() {
                        return Ok(Value::str(
                            env.get(name).map_or("undefined", |v| v.type_of()),
                        ));
                    }
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Num(-value.to_number()),
                    UnaryOp::Pos => Value::Num(value.to_number()),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }
            Expr::Update {
                delta,
                prefix,
                target,
            } => {
                let old = self.eval(target, env)?.to_number();
                let new = old + delta;
                self.assign_to(target, Value::Num(new), env)?;
                Ok(Value::Num(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                Ok(apply_binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                match op {
                    LogicalOp::And => {
                        if left.truthy() {
                            self.eval(right, env)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOp::Or => {
                        if left.truthy() {
                            Ok(left)
                        } else {
                            self.eval(right, env)
                        }
                    }
                }
            }
            Expr::Assign { op, target, value } => {
                let value = self.eval(value, env)?;
                let value = match op {
                    AssignOp::Assign => value,
                    compound => {
                        let current = self.eval(target, env)?;
                        let binary = match compound {
                            AssignOp::Add => BinaryOp::Add,
                            AssignOp::Sub => BinaryOp::Sub,
                            AssignOp::Mul => BinaryOp::Mul,
                            AssignOp::Div => BinaryOp::Div,
                            AssignOp::Rem => BinaryOp::Rem,
                            AssignOp::Assign => unreachable!("matched above"),
                        };
                        apply_binary(binary, &current, &value)
                    }
                };
                self.assign_to(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::Conditional { cond, then, other } => {
                if self.eval(cond, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(other, env)
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, Signal> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.eval(arg, env)?);
        }
        Ok(out)
    }

    fn member_key(&mut self, property: &MemberKey, env: &Env) -> Result<String, Signal> {
        Ok(match property {
            MemberKey::Dot(name) => name.clone(),
            MemberKey::Bracket(expr) => self.eval(expr, env)?.js_to_string(),
        })
    }

    /// Property read with built-in method dispatch.
    pub(crate) fn member_value(&mut self, object: &Value, key: &str) -> Result<Value, Signal> {
        match object {
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                object.js_to_string()
            ))),
            Value::Object(props) => {
                if let Some(value) = props.borrow().get(key) {
                    return Ok(value.clone());
                }
                Ok(builtins::object_method(object, key).unwrap_or(Value::Undefined))
            }
            Value::Array(elements) => {
                if key == "length" {
                    return Ok(Value::Num(elements.borrow().len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(elements
                        .borrow()
                        .get(index)
                        .cloned()
                        .unwrap_or(Value::Undefined));
                }
                Ok(builtins::array_method(elements, key).unwrap_or(Value::Undefined))
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Num(s.chars().count() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::str(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(builtins::string_method(s, key).unwrap_or(Value::Undefined))
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn set_member(&mut self, object: &Value, key: &str, value: Value) -> Result<(), Signal> {
        match object {
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                object.js_to_string()
            ))),
            Value::Object(props) => {
                props.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(elements) => {
                if key == "length" {
                    let new_len = value.to_number();
                    if new_len.fract() == 0.0 && new_len >= 0.0 {
                        elements.borrow_mut().resize(new_len as usize, Value::Undefined);
                        return Ok(());
                    }
                    return Err(type_error("invalid array length"));
                }
                if let Ok(index) = key.parse::<usize>() {
                    let mut elements = elements.borrow_mut();
                    if index >= elements.len() {
                        elements.resize(index + 1, Value::Undefined);
                    }
                    elements[index] = value;
                }
                // Non-index properties on arrays are silently dropped.
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value, env: &Env) -> Result<(), Signal> {
        match target {
            Expr::Ident(name) => {
                if !env.assign(name, value.clone()) {
                    // Undeclared assignment lands in the global scope.
                    self.globals.define(name, value);
                }
                Ok(())
            }
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                let key = self.member_key(property, env)?;
                self.set_member(&object, &key, value)
            }
            _ => Err(type_error("invalid assignment target")),
        }
    }

    /// Invoke a callable value. Also used by built-ins that take guest
    /// callbacks (`map`, `filter`, …).
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        hint: &str,
    ) -> Result<Value, Signal> {
        self.tick()?;
        match callee {
            Value::Function(closure) => {
                if self.depth >= self.max_depth {
                    return Err(Signal::Throw(make_error(
                        "RangeError",
                        "maximum call depth exceeded",
                    )));
                }
                self.depth += 1;
                let scope = closure.env.child();
                for (index, param) in closure.params.iter().enumerate() {
                    scope.define(param, args.get(index).cloned().unwrap_or(Value::Undefined));
                }
                let result = self.exec_block(&closure.body, &scope);
                self.depth -= 1;
                match result {
                    Ok(()) => Ok(Value::Undefined),
                    Err(Signal::Return(value)) => Ok(value),
                    Err(other) => Err(other),
                }
            }
            Value::Native(native) => (native.f)(self, args),
            _ => Err(type_error(format!("{hint} is not a function"))),
        }
    }
}

/// Apply a (non-short-circuiting) binary operator.
fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| {
                matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_))
            };
            if stringy(left) || stringy(right) {
                Value::str(format!("{}{}", left.js_to_string(), right.js_to_string()))
            } else {
                Value::Num(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Num(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if let (Value::Str(a), Value::Str(b)) = (left, right) {
                Value::Bool(match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                })
            } else {
                let a = left.to_number();
                let b = right.to_number();
                Value::Bool(match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                })
            }
        }
    }
}

/// Map a terminal signal into the guest-facing error message. `Return`,
/// `Break`, and `Continue` escaping the top level are host bugs.
pub fn escaped_signal_message(signal: &Signal) -> String {
    match signal {
        Signal::Throw(value) => error_message(value),
        Signal::Return(_) => "return outside of function".to_string(),
        Signal::Break => "break outside of loop".to_string(),
        Signal::Continue => "continue outside of loop".to_string(),
        Signal::Timeout => "timeout".to_string(),
        Signal::Internal(message) => message.clone(),
    }
}
