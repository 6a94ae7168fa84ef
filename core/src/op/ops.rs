use std::cmp::Ordering;
use std::fmt::Display;
use std::rc::Rc;

use anyhow::Result;

use crate::val::Value;
use crate::vm::Vm;

/// `OPR` operand. Ids 0..=20 are binary, 21..=24 unary.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add = 0,
    Sub = 1,
    Div = 2,
    Mul = 3,
    Mod = 4,
    Pow = 5,
    And = 6,
    Or = 7,
    BitAnd = 8,
    BitOr = 9,
    BitXor = 10,
    Shl = 11,
    Shr = 12,
    Eq = 13,
    Ne = 14,
    Lt = 15,
    Gt = 16,
    Le = 17,
    Ge = 18,
    Transform = 19,
    Arrow = 20,
    Not = 21,
    Neg = 22,
    BitNot = 23,
    Pound = 24,
}

impl Operator {
    pub fn from_u8(raw: u8) -> Option<Self> {
        use Operator::*;
        const ALL: [Operator; 25] = [
            Add, Sub, Div, Mul, Mod, Pow, And, Or, BitAnd, BitOr, BitXor, Shl, Shr, Eq, Ne, Lt, Gt, Le, Ge,
            Transform, Arrow, Not, Neg, BitNot, Pound,
        ];
        ALL.get(raw as usize).copied()
    }

    #[inline]
    pub fn is_unary(self) -> bool {
        self as u8 >= Operator::Not as u8
    }

    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge
        )
    }

    /// Attribute-set name an overload is registered under.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub | Operator::Neg => "-",
            Operator::Div => "/",
            Operator::Mul => "*",
            Operator::Mod => "%",
            Operator::Pow => "**",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Transform => "<>",
            Operator::Arrow => "->",
            Operator::Not => "!",
            Operator::BitNot => "~",
            Operator::Pound => "#",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Assignment operator packed into `ARF`/`OSN` operands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Mod = 5,
    Pow = 6,
    BitAnd = 7,
    BitOr = 8,
    BitXor = 9,
    Shl = 10,
    Shr = 11,
}

impl AssignOp {
    pub fn from_u8(raw: u8) -> Option<Self> {
        use AssignOp::*;
        const ALL: [AssignOp; 12] = [Set, Add, Sub, Mul, Div, Mod, Pow, BitAnd, BitOr, BitXor, Shl, Shr];
        ALL.get(raw as usize).copied()
    }

    /// Binary operator a compound assignment applies; `None` for plain `=`.
    pub fn binary(self) -> Option<Operator> {
        Some(match self {
            AssignOp::Set => return None,
            AssignOp::Add => Operator::Add,
            AssignOp::Sub => Operator::Sub,
            AssignOp::Mul => Operator::Mul,
            AssignOp::Div => Operator::Div,
            AssignOp::Mod => Operator::Mod,
            AssignOp::Pow => Operator::Pow,
            AssignOp::BitAnd => Operator::BitAnd,
            AssignOp::BitOr => Operator::BitOr,
            AssignOp::BitXor => Operator::BitXor,
            AssignOp::Shl => Operator::Shl,
            AssignOp::Shr => Operator::Shr,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::Pow => "**=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
        }
    }
}

fn ordering_result(op: Operator, ord: Option<Ordering>) -> Value {
    let b = match (op, ord) {
        (Operator::Ne, None) => true,
        (_, None) => false,
        (Operator::Lt, Some(o)) => o == Ordering::Less,
        (Operator::Gt, Some(o)) => o == Ordering::Greater,
        (Operator::Le, Some(o)) => o != Ordering::Greater,
        (Operator::Ge, Some(o)) => o != Ordering::Less,
        (Operator::Eq, Some(o)) => o == Ordering::Equal,
        (Operator::Ne, Some(o)) => o != Ordering::Equal,
        _ => false,
    };
    Value::Boolean(b)
}

#[inline]
fn int(n: f64) -> i64 {
    n as i64
}

impl Vm {
    /// Evaluate `lhs op rhs`, dispatching on the left operand's kind.
    pub fn binary_op(&mut self, op: Operator, lhs: &Value, rhs: &Value) -> Result<Value> {
        if matches!(op, Operator::Eq | Operator::Ne) && rhs.is_empty() && !matches!(lhs, Value::Object(_)) {
            let equal = lhs.is_empty();
            return Ok(Value::Boolean(if op == Operator::Eq { equal } else { !equal }));
        }
        match lhs {
            Value::Number(a) => self.number_op(op, *a, lhs, rhs),
            Value::Boolean(a) => {
                let a = *a;
                match op {
                    Operator::And => Ok(Value::Boolean(a && self.as_boolean(rhs)?)),
                    Operator::Or => Ok(Value::Boolean(a || self.as_boolean(rhs)?)),
                    Operator::Eq => Ok(Value::Boolean(a == self.as_boolean(rhs)?)),
                    Operator::Ne => Ok(Value::Boolean(a != self.as_boolean(rhs)?)),
                    _ => Err(self.undefined_operator(op, lhs)),
                }
            }
            Value::String(a) => match op {
                Operator::Add => {
                    let b = self.as_string(rhs)?;
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(a);
                    joined.push_str(&b);
                    Ok(Value::String(Rc::from(joined)))
                }
                _ if op.is_comparison() => {
                    let b = self.as_string(rhs)?;
                    Ok(ordering_result(op, Some(a.as_ref().cmp(b.as_ref()))))
                }
                _ => Err(self.undefined_operator(op, lhs)),
            },
            Value::Empty => match op {
                Operator::Eq => Ok(Value::Boolean(rhs.is_empty())),
                Operator::Ne => Ok(Value::Boolean(!rhs.is_empty())),
                _ => Err(self.undefined_operator(op, lhs)),
            },
            Value::Type(a) => {
                let same = matches!(rhs, Value::Type(b) if b.id() == a.id());
                match op {
                    Operator::Eq => Ok(Value::Boolean(same)),
                    Operator::Ne => Ok(Value::Boolean(!same)),
                    _ => Err(self.undefined_operator(op, lhs)),
                }
            }
            Value::Object(obj) => {
                if let Some(overload) = self.attribute(obj, op.symbol()) {
                    return self.call_inner(&overload, &[("value", rhs.clone())], None);
                }
                match op {
                    Operator::Eq => Ok(Value::Boolean(lhs == rhs)),
                    Operator::Ne => Ok(Value::Boolean(lhs != rhs)),
                    _ => Err(self.undefined_operator(op, lhs)),
                }
            }
        }
    }

    fn number_op(&mut self, op: Operator, a: f64, lhs: &Value, rhs: &Value) -> Result<Value> {
        let b = match op {
            Operator::Transform | Operator::Arrow | Operator::And | Operator::Or => {
                return Err(self.undefined_operator(op, lhs));
            }
            _ => self.as_number(rhs)?,
        };
        let result = match op {
            Operator::Add => Value::Number(a + b),
            Operator::Sub => Value::Number(a - b),
            Operator::Div => Value::Number(a / b),
            Operator::Mul => Value::Number(a * b),
            Operator::Mod => Value::Number(a % b),
            Operator::Pow => Value::Number(a.powf(b)),
            Operator::BitAnd => Value::Number((int(a) & int(b)) as f64),
            Operator::BitOr => Value::Number((int(a) | int(b)) as f64),
            Operator::BitXor => Value::Number((int(a) ^ int(b)) as f64),
            Operator::Shl => Value::Number(int(a).wrapping_shl(int(b) as u32) as f64),
            Operator::Shr => Value::Number(int(a).wrapping_shr(int(b) as u32) as f64),
            _ if op.is_comparison() => ordering_result(op, a.partial_cmp(&b)),
            _ => return Err(self.undefined_operator(op, lhs)),
        };
        Ok(result)
    }

    /// Evaluate a unary operator.
    pub fn unary_op(&mut self, op: Operator, value: &Value) -> Result<Value> {
        match (op, value) {
            (Operator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (Operator::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
            (Operator::BitNot, Value::Number(n)) => Ok(Value::Number(!int(*n) as f64)),
            (_, Value::Object(obj)) => match self.attribute(obj, op.symbol()) {
                Some(overload) => self.call_no_args(&overload),
                None => Err(self.undefined_operator(op, value)),
            },
            _ => Err(self.undefined_operator(op, value)),
        }
    }

    /// Compound assignment. `None` means an in-place overload on the current
    /// Object handled it and nothing is stored.
    pub fn compound_assign(
        &mut self,
        op: AssignOp,
        current: &Value,
        value: &Value,
    ) -> Result<Option<Value>> {
        let Some(binary) = op.binary() else {
            return Ok(Some(value.clone()));
        };
        if let Value::Object(obj) = current {
            if let Some(overload) = self.attribute(obj, op.symbol()) {
                self.call_inner(&overload, &[("value", value.clone())], None)?;
                return Ok(None);
            }
        }
        self.binary_op(binary, current, value).map(Some)
    }

    fn undefined_operator(&mut self, op: Operator, operand: &Value) -> anyhow::Error {
        self.raise_message(format!(
            "Operator '{}' is not defined for {}",
            op,
            operand.kind_name()
        ))
    }
}
