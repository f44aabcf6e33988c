//! Tree-walking evaluator with a fuel meter.

use std::collections::HashMap;
use std::fmt;

use super::ScriptError;
use super::parser::{BinaryOp, Expr, Stmt, UnaryOp};

pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;
const MAX_STRING_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => f.write_str(&crate::calculator::format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

pub fn run(program: &[Stmt], fuel: u64) -> Result<String, ScriptError> {
    let mut machine = Machine {
        vars: HashMap::new(),
        output: String::new(),
        fuel,
        budget: fuel,
    };
    machine.block(program)?;
    Ok(machine.output)
}

struct Machine {
    vars: HashMap<String, Value>,
    output: String,
    fuel: u64,
    budget: u64,
}

impl Machine {
    fn burn(&mut self) -> Result<(), ScriptError> {
        if self.fuel == 0 {
            return Err(ScriptError::FuelExhausted(self.budget));
        }
        self.fuel -= 1;
        Ok(())
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        self.burn()?;
        match stmt {
            Stmt::Let { name, value } => {
                let v = self.eval(value)?;
                self.vars.insert(name.clone(), v);
            }
            Stmt::Assign { name, value, line } => {
                if !self.vars.contains_key(name) {
                    return Err(ScriptError::runtime(*line, format!("assignment to undeclared '{name}'")));
                }
                let v = self.eval(value)?;
                self.vars.insert(name.clone(), v);
            }
            Stmt::Print(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.eval(arg)?.to_string());
                }
                self.output.push_str(&parts.join(" "));
                self.output.push('\n');
                if self.output.len() > MAX_OUTPUT_BYTES {
                    return Err(ScriptError::OutputLimit(MAX_OUTPUT_BYTES));
                }
            }
            Stmt::If { cond, then, otherwise } => {
                if self.eval(cond)?.truthy() {
                    self.block(then)?;
                } else {
                    self.block(otherwise)?;
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    self.burn()?;
                    self.block(body)?;
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.burn()?;
        match expr {
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Var { name, line } => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(*line, format!("undefined variable '{name}'"))),
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
                    (UnaryOp::Neg, v) => Err(ScriptError::runtime(0, format!("cannot negate {}", v.type_name()))),
                }
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs, .. } => {
                if !self.eval(lhs)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.truthy()))
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs, .. } => {
                if self.eval(lhs)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.truthy()))
            }
            Expr::Binary { op, lhs, rhs, line } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l, r, *line)
            }
            Expr::Call { name, args, line } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                builtin(name, values, *line)
            }
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value, line: usize) -> Result<Value, ScriptError> {
    use Value::*;
    let v = match (op, l, r) {
        (BinaryOp::Add, Str(a), b) => concat(a, &b.to_string(), line)?,
        (BinaryOp::Add, a @ (Num(_) | Bool(_)), Str(b)) => concat(a.to_string(), &b, line)?,
        (BinaryOp::Add, Num(a), Num(b)) => Num(a + b),
        (BinaryOp::Sub, Num(a), Num(b)) => Num(a - b),
        (BinaryOp::Mul, Num(a), Num(b)) => Num(a * b),
        (BinaryOp::Div | BinaryOp::Rem, Num(_), Num(b)) if b == 0.0 => {
            return Err(ScriptError::runtime(line, "division by zero"));
        }
        (BinaryOp::Div, Num(a), Num(b)) => Num(a / b),
        (BinaryOp::Rem, Num(a), Num(b)) => Num(a % b),
        (BinaryOp::Pow, Num(a), Num(b)) => Num(a.powf(b)),
        (BinaryOp::Eq, a, b) => Bool(a == b),
        (BinaryOp::NotEq, a, b) => Bool(a != b),
        (BinaryOp::Lt, Num(a), Num(b)) => Bool(a < b),
        (BinaryOp::LtEq, Num(a), Num(b)) => Bool(a <= b),
        (BinaryOp::Gt, Num(a), Num(b)) => Bool(a > b),
        (BinaryOp::GtEq, Num(a), Num(b)) => Bool(a >= b),
        (BinaryOp::Lt, Str(a), Str(b)) => Bool(a < b),
        (BinaryOp::Gt, Str(a), Str(b)) => Bool(a > b),
        (op, a, b) => {
            return Err(ScriptError::runtime(
                line,
                format!("unsupported operands for {op:?}: {} and {}", a.type_name(), b.type_name()),
            ));
        }
    };
    Ok(v)
}

fn concat(mut a: String, b: &str, line: usize) -> Result<Value, ScriptError> {
    if a.len() + b.len() > MAX_STRING_BYTES {
        return Err(ScriptError::runtime(line, format!("string longer than {MAX_STRING_BYTES} bytes")));
    }
    a.push_str(b);
    Ok(Value::Str(a))
}

fn builtin(name: &str, args: Vec<Value>, line: usize) -> Result<Value, ScriptError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(ScriptError::runtime(
                line,
                format!("{name}() takes {n} argument(s), got {}", args.len()),
            ))
        }
    };
    let number = |v: &Value| match v {
        Value::Num(n) => Ok(*n),
        other => Err(ScriptError::runtime(
            line,
            format!("{name}() expects a number, got {}", other.type_name()),
        )),
    };

    match name {
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
                other => Err(ScriptError::runtime(line, format!("len() of {}", other.type_name()))),
            }
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "abs" => {
            arity(1)?;
            Ok(Value::Num(number(&args[0])?.abs()))
        }
        "sqrt" => {
            arity(1)?;
            let n = number(&args[0])?;
            if n < 0.0 {
                return Err(ScriptError::runtime(line, "sqrt() of a negative number"));
            }
            Ok(Value::Num(n.sqrt()))
        }
        "floor" => {
            arity(1)?;
            Ok(Value::Num(number(&args[0])?.floor()))
        }
        _ => Err(ScriptError::runtime(line, format!("unknown function '{name}'"))),
    }
}
