use anyhow::Result;

use crate::val::Value;

use super::Vm;
use super::natives::QUERY_BASE;

/// `QRY` operand.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Type = 0,
    Cos = 1,
    Sin = 2,
    Tan = 3,
    Acos = 4,
    Asin = 5,
    Atan = 6,
    Atan2 = 7,
    Sqrt = 8,
    Abs = 9,
    IsNaN = 10,
    Floor = 11,
    Ceil = 12,
    Round = 13,
    ToRadians = 14,
    ToDegrees = 15,
    Length = 16,
    Search = 17,
    SearchAll = 18,
    Contains = 19,
    Replace = 20,
    Count = 21,
    CharCodeAt = 22,
    CharAt = 23,
    SetCharCodeAt = 24,
    SetCharAt = 25,
    RemoveChar = 26,
    Split = 27,
    Format = 28,
    ToUpper = 29,
    ToLower = 30,
    Trim = 31,
    KeyCount = 32,
    Keys = 33,
    Values = 34,
    Pop = 35,
    Attributes = 36,
    Push = 37,
    Insert = 38,
    Remove = 39,
    SetAttributes = 40,
    Sort = 41,
    Subset = 42,
    Filter = 43,
    FindIndex = 44,
    IsA = 45,
    Map = 46,
    Reduce = 47,
    Any = 48,
    All = 49,
    Foreach = 50,
    SetSize = 51,
    SetIsInterface = 52,
    Name = 53,
}

impl Query {
    const ALL: [Query; 54] = {
        use Query::*;
        [
            Type, Cos, Sin, Tan, Acos, Asin, Atan, Atan2, Sqrt, Abs, IsNaN, Floor, Ceil, Round, ToRadians,
            ToDegrees, Length, Search, SearchAll, Contains, Replace, Count, CharCodeAt, CharAt, SetCharCodeAt,
            SetCharAt, RemoveChar, Split, Format, ToUpper, ToLower, Trim, KeyCount, Keys, Values, Pop,
            Attributes, Push, Insert, Remove, SetAttributes, Sort, Subset, Filter, FindIndex, IsA, Map, Reduce,
            Any, All, Foreach, SetSize, SetIsInterface, Name,
        ]
    };

    /// Queries that yield a bound native, in native-table order.
    pub(crate) const PARAMETERIZED: [Query; 29] = {
        use Query::*;
        [
            Atan2, Search, SearchAll, Contains, Replace, Count, CharCodeAt, CharAt, SetCharCodeAt, SetCharAt,
            RemoveChar, Split, Format, Push, Insert, Remove, SetAttributes, Sort, Subset, Filter, FindIndex, IsA,
            Map, Reduce, Any, All, Foreach, SetSize, SetIsInterface,
        ]
    };

    pub fn from_u32(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Position among the parameterized queries, if this is one.
    pub(crate) fn native_slot(self) -> Option<u32> {
        Self::PARAMETERIZED.iter().position(|q| *q == self).map(|i| i as u32)
    }

    pub fn name(self) -> &'static str {
        use Query::*;
        match self {
            Type => "type",
            Cos => "cos",
            Sin => "sin",
            Tan => "tan",
            Acos => "acos",
            Asin => "asin",
            Atan => "atan",
            Atan2 => "atan2",
            Sqrt => "sqrt",
            Abs => "abs",
            IsNaN => "isNaN",
            Floor => "floor",
            Ceil => "ceil",
            Round => "round",
            ToRadians => "toRadians",
            ToDegrees => "toDegrees",
            Length => "length",
            Search => "search",
            SearchAll => "searchAll",
            Contains => "contains",
            Replace => "replace",
            Count => "count",
            CharCodeAt => "charCodeAt",
            CharAt => "charAt",
            SetCharCodeAt => "setCharCodeAt",
            SetCharAt => "setCharAt",
            RemoveChar => "removeChar",
            Split => "split",
            Format => "format",
            ToUpper => "toUpper",
            ToLower => "toLower",
            Trim => "trim",
            KeyCount => "keycount",
            Keys => "keys",
            Values => "values",
            Pop => "pop",
            Attributes => "attributes",
            Push => "push",
            Insert => "insert",
            Remove => "remove",
            SetAttributes => "setAttributes",
            Sort => "sort",
            Subset => "subset",
            Filter => "filter",
            FindIndex => "findIndex",
            IsA => "isa",
            Map => "map",
            Reduce => "reduce",
            Any => "any",
            All => "all",
            Foreach => "foreach",
            SetSize => "setSize",
            SetIsInterface => "setIsInterface",
            Name => "name",
        }
    }
}

impl Vm {
    /// Evaluate query `id` against `base`: an immediate result, or a native
    /// function with `base` bound for the parameterized queries.
    pub fn query(&mut self, base: &Value, id: u32) -> Result<Value> {
        let Some(query) = Query::from_u32(id) else {
            return Err(self.raise_message(format!("Unknown query {}", id)));
        };
        if let Some(slot) = query.native_slot() {
            return self.bound_native(QUERY_BASE + slot, base.clone());
        }
        match query {
            Query::Type => Ok(Value::Type(self.type_of(base))),
            Query::Cos
            | Query::Sin
            | Query::Tan
            | Query::Acos
            | Query::Asin
            | Query::Atan
            | Query::Sqrt
            | Query::Abs
            | Query::IsNaN
            | Query::Floor
            | Query::Ceil
            | Query::Round
            | Query::ToRadians
            | Query::ToDegrees => {
                let Value::Number(n) = base else {
                    return Err(self.base_error(query, "Number", base));
                };
                Ok(numeric_query(query, *n))
            }
            Query::Length => match base {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Object(obj) => Ok(Value::Number(obj.borrow().index_count() as f64)),
                other => Err(self.base_error(query, "String or Object", other)),
            },
            Query::ToUpper | Query::ToLower | Query::Trim => {
                let Value::String(s) = base else {
                    return Err(self.base_error(query, "String", base));
                };
                let out = match query {
                    Query::ToUpper => s.to_uppercase(),
                    Query::ToLower => s.to_lowercase(),
                    _ => s.trim().to_string(),
                };
                Ok(Value::from(out))
            }
            Query::KeyCount | Query::Keys | Query::Values | Query::Pop | Query::Attributes => {
                let Value::Object(obj) = base else {
                    return Err(self.base_error(query, "Object", base));
                };
                match query {
                    Query::KeyCount => Ok(Value::Number(self.object_keys(obj)?.len() as f64)),
                    Query::Keys => {
                        let keys = self.object_keys(obj)?;
                        Ok(self.new_index_object(keys))
                    }
                    Query::Values => {
                        let values = self.object_values(obj)?;
                        Ok(self.new_index_object(values))
                    }
                    Query::Pop => Ok(obj.borrow_mut().indices_mut().pop().unwrap_or_default()),
                    _ => Ok(obj.borrow().attributes().cloned().map(Value::Object).unwrap_or_default()),
                }
            }
            Query::Name => match base {
                Value::Type(ty) => Ok(Value::from(ty.name())),
                other => Err(self.base_error(query, "Type", other)),
            },
            _ => Err(self.raise_message(format!("Query {} has no immediate form", query.name()))),
        }
    }

    fn base_error(&mut self, query: Query, expected: &str, got: &Value) -> anyhow::Error {
        self.raise_message(format!(
            "{} requires a {} base, got {}",
            query.name(),
            expected,
            got.kind_name()
        ))
    }
}

fn numeric_query(query: Query, n: f64) -> Value {
    let out = match query {
        Query::Cos => n.cos(),
        Query::Sin => n.sin(),
        Query::Tan => n.tan(),
        Query::Acos => n.acos(),
        Query::Asin => n.asin(),
        Query::Atan => n.atan(),
        Query::Sqrt => n.sqrt(),
        Query::Abs => n.abs(),
        Query::IsNaN => return Value::Boolean(n.is_nan()),
        Query::Floor => n.floor(),
        Query::Ceil => n.ceil(),
        Query::Round => n.round(),
        Query::ToRadians => n.to_radians(),
        Query::ToDegrees => n.to_degrees(),
        _ => n,
    };
    Value::Number(out)
}
