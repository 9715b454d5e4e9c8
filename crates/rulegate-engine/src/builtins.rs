//! The guest's standard library and host bridge bindings.
//!
//! Three host-backed names are installed — `getInput`, `setOutput`, and
//! `console` (five methods) — plus the deterministic value-space helpers
//! the dialect needs (`JSON`, `Object`, `Array`, `Math`, conversions).
//! Nothing here touches the network, filesystem, clock, or randomness:
//! `Math` deliberately has no `random`, and there are no timer or eval
//! primitives. Any name not installed resolves to a ReferenceError in
//! the evaluator.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bridge::{Bridge, LogLevel};
use crate::interp::{type_error, Interpreter, Signal};
use crate::value::{make_error, Env, Value};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Install the complete global scope for one rule invocation.
pub fn install_globals(env: &Env, bridge: &Rc<Bridge>) {
    // --- Host bridge ---
    let input = bridge.clone();
    env.define(
        "getInput",
        Value::native("getInput", move |_interp, _args| {
            Ok(Value::str(&input.input))
        }),
    );

    let output = bridge.clone();
    env.define(
        "setOutput",
        Value::native("setOutput", move |_interp, args| match arg(&args, 0) {
            Value::Str(s) => {
                *output.output.borrow_mut() = Some(s.to_string());
                Ok(Value::Undefined)
            }
            other => Err(type_error(format!(
                "setOutput expects a string, got {}",
                other.type_of()
            ))),
        }),
    );

    let mut console = IndexMap::new();
    for (method, level) in [
        ("log", LogLevel::Log),
        ("info", LogLevel::Info),
        ("debug", LogLevel::Debug),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ] {
        let sink = bridge.clone();
        console.insert(
            method.to_string(),
            Value::native(method, move |_interp, args| {
                let msg = args
                    .iter()
                    .map(Value::js_to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.log(level, msg);
                Ok(Value::Undefined)
            }),
        );
    }
    env.define("console", Value::object(console));

    // --- JSON ---
    let mut json = IndexMap::new();
    json.insert(
        "parse".to_string(),
        Value::native("parse", |_interp, args| {
            let text = arg(&args, 0).js_to_string();
            let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                Signal::Throw(make_error("SyntaxError", format!("JSON.parse: {e}")))
            })?;
            Ok(Value::from_json(&parsed))
        }),
    );
    json.insert(
        "stringify".to_string(),
        Value::native("stringify", |_interp, args| {
            let tree = arg(&args, 0)
                .to_json()
                .map_err(|()| type_error("Converting circular structure to JSON"))?
                .unwrap_or(serde_json::Value::Null);
            let pretty = matches!(arg(&args, 2), Value::Num(n) if n > 0.0);
            let text = if pretty {
                serde_json::to_string_pretty(&tree)
            } else {
                serde_json::to_string(&tree)
            }
            .map_err(|e| Signal::Internal(format!("JSON.stringify: {e}")))?;
            Ok(Value::str(text))
        }),
    );
    env.define("JSON", Value::object(json));

    // --- Object ---
    let mut object = IndexMap::new();
    object.insert(
        "keys".to_string(),
        Value::native("keys", |_interp, args| {
            Ok(Value::array(
                own_entries(&arg(&args, 0))
                    .into_iter()
                    .map(|(k, _)| Value::str(k))
                    .collect(),
            ))
        }),
    );
    object.insert(
        "values".to_string(),
        Value::native("values", |_interp, args| {
            Ok(Value::array(
                own_entries(&arg(&args, 0))
                    .into_iter()
                    .map(|(_, v)| v)
                    .collect(),
            ))
        }),
    );
    object.insert(
        "entries".to_string(),
        Value::native("entries", |_interp, args| {
            Ok(Value::array(
                own_entries(&arg(&args, 0))
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                    .collect(),
            ))
        }),
    );
    env.define("Object", Value::object(object));

    // --- Array ---
    let mut array = IndexMap::new();
    array.insert(
        "isArray".to_string(),
        Value::native("isArray", |_interp, args| {
            Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
        }),
    );
    env.define("Array", Value::object(array));

    // --- Math (deterministic methods only; no random) ---
    let mut math = IndexMap::new();
    let unary_math: [(&str, fn(f64) -> f64); 6] = [
        ("abs", f64::abs),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("round", f64::round),
        ("trunc", f64::trunc),
        ("sqrt", f64::sqrt),
    ];
    for (name, f) in unary_math {
        math.insert(
            name.to_string(),
            Value::native(name, move |_interp, args| {
                Ok(Value::Num(f(arg(&args, 0).to_number())))
            }),
        );
    }
    math.insert(
        "min".to_string(),
        Value::native("min", |_interp, args| {
            let mut out = f64::INFINITY;
            for value in &args {
                let n = value.to_number();
                if n.is_nan() {
                    return Ok(Value::Num(f64::NAN));
                }
                out = out.min(n);
            }
            Ok(Value::Num(out))
        }),
    );
    math.insert(
        "max".to_string(),
        Value::native("max", |_interp, args| {
            let mut out = f64::NEG_INFINITY;
            for value in &args {
                let n = value.to_number();
                if n.is_nan() {
                    return Ok(Value::Num(f64::NAN));
                }
                out = out.max(n);
            }
            Ok(Value::Num(out))
        }),
    );
    math.insert(
        "pow".to_string(),
        Value::native("pow", |_interp, args| {
            Ok(Value::Num(
                arg(&args, 0).to_number().powf(arg(&args, 1).to_number()),
            ))
        }),
    );
    env.define("Math", Value::object(math));

    // --- Conversions and numeric helpers ---
    env.define(
        "String",
        Value::native("String", |_interp, args| {
            Ok(Value::str(arg(&args, 0).js_to_string()))
        }),
    );
    env.define(
        "Number",
        Value::native("Number", |_interp, args| {
            Ok(Value::Num(arg(&args, 0).to_number()))
        }),
    );
    env.define(
        "Boolean",
        Value::native("Boolean", |_interp, args| {
            Ok(Value::Bool(arg(&args, 0).truthy()))
        }),
    );
    env.define(
        "parseInt",
        Value::native("parseInt", |_interp, args| {
            Ok(Value::Num(parse_int(
                &arg(&args, 0).js_to_string(),
                arg(&args, 1).to_number(),
            )))
        }),
    );
    env.define(
        "parseFloat",
        Value::native("parseFloat", |_interp, args| {
            Ok(Value::Num(parse_float(&arg(&args, 0).js_to_string())))
        }),
    );
    env.define(
        "isNaN",
        Value::native("isNaN", |_interp, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))
        }),
    );
    env.define(
        "Error",
        Value::native("Error", |_interp, args| {
            let message = match arg(&args, 0) {
                Value::Undefined => String::new(),
                other => other.js_to_string(),
            };
            Ok(make_error("Error", message))
        }),
    );
    env.define("NaN", Value::Num(f64::NAN));
    env.define("Infinity", Value::Num(f64::INFINITY));
}

/// Own enumerable entries of objects, arrays, and strings.
fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(props) => props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(elements) => elements
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_int(text: &str, radix: f64) -> f64 {
    let mut rest = text.trim();
    let mut sign = 1.0;
    if let Some(stripped) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    let radix = if radix.is_nan() || radix == 0.0 {
        if rest.starts_with("0x") || rest.starts_with("0X") {
            rest = &rest[2..];
            16
        } else {
            10
        }
    } else {
        radix as u32
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let digits: String = rest
        .chars()
        .take_while(|c| c.to_digit(radix).is_some())
        .collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut out = 0.0f64;
    for c in digits.chars() {
        out = out * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64;
    }
    sign * out
}

fn parse_float(text: &str) -> f64 {
    let rest = text.trim();
    let mut end = 0;
    let bytes = rest.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || (end == 0 && (c == '+' || c == '-'))
            || (c == '.' && !seen_dot && !seen_exp)
            || ((c == 'e' || c == 'E') && !seen_exp && end > 0)
            || ((c == '+' || c == '-') && end > 0 && matches!(bytes[end - 1] as char, 'e' | 'E'));
        if !ok {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        if c == 'e' || c == 'E' {
            seen_exp = true;
        }
        end += 1;
    }
    rest[..end].parse().unwrap_or(f64::NAN)
}

/// Built-in methods reachable on any object value.
pub fn object_method(object: &Value, key: &str) -> Option<Value> {
    match key {
        "hasOwnProperty" => {
            let receiver = object.clone();
            Some(Value::native("hasOwnProperty", move |_interp, args| {
                let name = arg(&args, 0).js_to_string();
                let Value::Object(props) = &receiver else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(props.borrow().contains_key(&name)))
            }))
        }
        "toString" => {
            let receiver = object.clone();
            Some(Value::native("toString", move |_interp, _args| {
                Ok(Value::str(receiver.js_to_string()))
            }))
        }
        _ => None,
    }
}

/// Built-in string methods. The receiver is captured per access.
pub fn string_method(s: &Rc<str>, key: &str) -> Option<Value> {
    let s = s.clone();
    let method: Box<dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Signal>> = match key {
        "includes" => Box::new(move |_i, args| {
            Ok(Value::Bool(s.contains(&arg(&args, 0).js_to_string())))
        }),
        "startsWith" => Box::new(move |_i, args| {
            Ok(Value::Bool(s.starts_with(&arg(&args, 0).js_to_string())))
        }),
        "endsWith" => Box::new(move |_i, args| {
            Ok(Value::Bool(s.ends_with(&arg(&args, 0).js_to_string())))
        }),
        "indexOf" => Box::new(move |_i, args| {
            let needle = arg(&args, 0).js_to_string();
            Ok(Value::Num(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            }))
        }),
        "lastIndexOf" => Box::new(move |_i, args| {
            let needle = arg(&args, 0).js_to_string();
            Ok(Value::Num(match s.rfind(&needle) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            }))
        }),
        "slice" => Box::new(move |_i, args| {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_range(chars.len(), arg(&args, 0), arg(&args, 1));
            Ok(Value::str(chars[start..end].iter().collect::<String>()))
        }),
        "substring" => Box::new(move |_i, args| {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as f64;
            let a = clamp_index(arg(&args, 0).to_number(), len);
            let b = match arg(&args, 1) {
                Value::Undefined => len as usize,
                other => clamp_index(other.to_number(), len),
            };
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Ok(Value::str(chars[start..end].iter().collect::<String>()))
        }),
        "toLowerCase" => Box::new(move |_i, _args| Ok(Value::str(s.to_lowercase()))),
        "toUpperCase" => Box::new(move |_i, _args| Ok(Value::str(s.to_uppercase()))),
        "trim" => Box::new(move |_i, _args| Ok(Value::str(s.trim()))),
        "charAt" => Box::new(move |_i, args| {
            let index = arg(&args, 0).to_number();
            if index < 0.0 || index.fract() != 0.0 {
                return Ok(Value::str(""));
            }
            Ok(Value::str(
                s.chars()
                    .nth(index as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            ))
        }),
        "split" => Box::new(move |_i, args| {
            let parts = match arg(&args, 0) {
                Value::Undefined => vec![Value::str(s.as_ref())],
                separator => {
                    let separator = separator.js_to_string();
                    if separator.is_empty() {
                        s.chars().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(|part| Value::str(part)).collect()
                    }
                }
            };
            Ok(Value::array(parts))
        }),
        "toString" => Box::new(move |_i, _args| Ok(Value::Str(s.clone()))),
        _ => return None,
    };
    Some(Value::Native(Rc::new(crate::value::NativeFunction {
        name: key.to_string(),
        f: method,
    })))
}

/// Built-in array methods. The receiver `Rc` is captured per access, so
/// mutating methods act on the live array.
pub fn array_method(elements: &Rc<RefCell<Vec<Value>>>, key: &str) -> Option<Value> {
    let this = elements.clone();
    let method: Box<dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Signal>> = match key {
        "push" => Box::new(move |_i, args| {
            let mut elements = this.borrow_mut();
            elements.extend(args);
            Ok(Value::Num(elements.len() as f64))
        }),
        "pop" => Box::new(move |_i, _args| {
            Ok(this.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        "shift" => Box::new(move |_i, _args| {
            let mut elements = this.borrow_mut();
            if elements.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(elements.remove(0))
            }
        }),
        "unshift" => Box::new(move |_i, args| {
            let mut elements = this.borrow_mut();
            for (offset, value) in args.into_iter().enumerate() {
                elements.insert(offset, value);
            }
            Ok(Value::Num(elements.len() as f64))
        }),
        "slice" => Box::new(move |_i, args| {
            let snapshot = this.borrow().clone();
            let (start, end) = slice_range(snapshot.len(), arg(&args, 0), arg(&args, 1));
            Ok(Value::array(snapshot[start..end].to_vec()))
        }),
        "indexOf" => Box::new(move |_i, args| {
            let needle = arg(&args, 0);
            let elements = this.borrow();
            Ok(Value::Num(
                elements
                    .iter()
                    .position(|v| v.strict_eq(&needle))
                    .map_or(-1.0, |i| i as f64),
            ))
        }),
        "includes" => Box::new(move |_i, args| {
            let needle = arg(&args, 0);
            Ok(Value::Bool(
                this.borrow().iter().any(|v| v.strict_eq(&needle)),
            ))
        }),
        "join" => Box::new(move |_i, args| {
            let separator = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.js_to_string(),
            };
            let joined = this
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.js_to_string(),
                })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::str(joined))
        }),
        "concat" => Box::new(move |_i, args| {
            let mut out = this.borrow().clone();
            for value in args {
                match value {
                    Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }),
        "reverse" => Box::new(move |_i, _args| {
            this.borrow_mut().reverse();
            Ok(Value::Array(this.clone()))
        }),
        "map" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (index, element) in snapshot.into_iter().enumerate() {
                out.push(interp.call_value(
                    callback.clone(),
                    vec![element, Value::Num(index as f64), Value::Array(this.clone())],
                    "callback",
                )?);
            }
            Ok(Value::array(out))
        }),
        "filter" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            let mut out = Vec::new();
            for (index, element) in snapshot.into_iter().enumerate() {
                let keep = interp.call_value(
                    callback.clone(),
                    vec![
                        element.clone(),
                        Value::Num(index as f64),
                        Value::Array(this.clone()),
                    ],
                    "callback",
                )?;
                if keep.truthy() {
                    out.push(element);
                }
            }
            Ok(Value::array(out))
        }),
        "forEach" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            for (index, element) in snapshot.into_iter().enumerate() {
                interp.call_value(
                    callback.clone(),
                    vec![element, Value::Num(index as f64), Value::Array(this.clone())],
                    "callback",
                )?;
            }
            Ok(Value::Undefined)
        }),
        "some" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            for (index, element) in snapshot.into_iter().enumerate() {
                let hit = interp.call_value(
                    callback.clone(),
                    vec![element, Value::Num(index as f64), Value::Array(this.clone())],
                    "callback",
                )?;
                if hit.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "every" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            for (index, element) in snapshot.into_iter().enumerate() {
                let hit = interp.call_value(
                    callback.clone(),
                    vec![element, Value::Num(index as f64), Value::Array(this.clone())],
                    "callback",
                )?;
                if !hit.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "find" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            for (index, element) in snapshot.into_iter().enumerate() {
                let hit = interp.call_value(
                    callback.clone(),
                    vec![
                        element.clone(),
                        Value::Num(index as f64),
                        Value::Array(this.clone()),
                    ],
                    "callback",
                )?;
                if hit.truthy() {
                    return Ok(element);
                }
            }
            Ok(Value::Undefined)
        }),
        "findIndex" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            for (index, element) in snapshot.into_iter().enumerate() {
                let hit = interp.call_value(
                    callback.clone(),
                    vec![element, Value::Num(index as f64), Value::Array(this.clone())],
                    "callback",
                )?;
                if hit.truthy() {
                    return Ok(Value::Num(index as f64));
                }
            }
            Ok(Value::Num(-1.0))
        }),
        "reduce" => Box::new(move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = this.borrow().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(seed) => seed.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(type_error("reduce of empty array with no initial value"))
                    }
                },
            };
            for (index, element) in iter {
                acc = interp.call_value(
                    callback.clone(),
                    vec![
                        acc,
                        element,
                        Value::Num(index as f64),
                        Value::Array(this.clone()),
                    ],
                    "callback",
                )?;
            }
            Ok(acc)
        }),
        "toString" => Box::new(move |_i, _args| {
            Ok(Value::str(Value::Array(this.clone()).js_to_string()))
        }),
        _ => return None,
    };
    Some(Value::Native(Rc::new(crate::value::NativeFunction {
        name: key.to_string(),
        f: method,
    })))
}

/// Normalize `slice(start, end)` arguments: negative indices count from
/// the end, everything clamps to `[0, len]`.
fn slice_range(len: usize, start: Value, end: Value) -> (usize, usize) {
    let start = match start {
        Value::Undefined => 0,
        other => clamp_index(other.to_number(), len as f64),
    };
    let end = match end {
        Value::Undefined => len,
        other => clamp_index(other.to_number(), len as f64),
    };
    (start.min(len), end.max(start).min(len))
}

fn clamp_index(index: f64, len: f64) -> usize {
    let index = if index.is_nan() {
        0.0
    } else if index < 0.0 {
        (len + index).max(0.0)
    } else {
        index.min(len)
    };
    index as usize
}
