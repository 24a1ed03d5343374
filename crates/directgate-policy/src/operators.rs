//! Policy operators
//!
//! An operator is an opcode plus a typed signature plus the function that
//! evaluates it. Operators are identified by shape only: opcode and operand
//! types. The process-wide [`OperatorTable`] interns one operator per shape.

use crate::error::{PolicyError, PolicyResult};
use crate::value::{Value, ValueType};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Operator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpCode {
    Equals,
    NotEquals,
    Greater,
    Less,
    Contains,
    NotContains,
    ContainsMatch,
    Empty,
    NotEmpty,
    Size,
    Intersect,
    Union,
    LogicalAnd,
    LogicalOr,
    Not,
    BitwiseAnd,
    BitwiseOr,
}

impl OpCode {
    pub const ALL: [OpCode; 17] = [
        OpCode::Equals,
        OpCode::NotEquals,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Contains,
        OpCode::NotContains,
        OpCode::ContainsMatch,
        OpCode::Empty,
        OpCode::NotEmpty,
        OpCode::Size,
        OpCode::Intersect,
        OpCode::Union,
        OpCode::LogicalAnd,
        OpCode::LogicalOr,
        OpCode::Not,
        OpCode::BitwiseAnd,
        OpCode::BitwiseOr,
    ];

    /// Token used in policy text and in operator names
    pub fn token(&self) -> &'static str {
        match self {
            OpCode::Equals => "=",
            OpCode::NotEquals => "!=",
            OpCode::Greater => ">",
            OpCode::Less => "<",
            OpCode::Contains => "{?}",
            OpCode::NotContains => "{?}!",
            OpCode::ContainsMatch => "{?}$",
            OpCode::Empty => "{}",
            OpCode::NotEmpty => "{}!",
            OpCode::Size => "^",
            OpCode::Intersect => "{∩}",
            OpCode::Union => "{∪}",
            OpCode::LogicalAnd => "&&",
            OpCode::LogicalOr => "||",
            OpCode::Not => "!",
            OpCode::BitwiseAnd => "&",
            OpCode::BitwiseOr => "|",
        }
    }

    /// Descriptive name, accepted by [`OpCode::parse`] as an alternative to the token
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Equals => "equals",
            OpCode::NotEquals => "not_equals",
            OpCode::Greater => "greater",
            OpCode::Less => "less",
            OpCode::Contains => "contains",
            OpCode::NotContains => "not_contains",
            OpCode::ContainsMatch => "contains_match",
            OpCode::Empty => "empty",
            OpCode::NotEmpty => "not_empty",
            OpCode::Size => "size",
            OpCode::Intersect => "intersect",
            OpCode::Union => "union",
            OpCode::LogicalAnd => "and",
            OpCode::LogicalOr => "or",
            OpCode::Not => "not",
            OpCode::BitwiseAnd => "bitwise_and",
            OpCode::BitwiseOr => "bitwise_or",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.token() == token)
    }

    /// Resolve either a token or a descriptive name
    pub fn parse(text: &str) -> PolicyResult<Self> {
        let text = text.trim();
        Self::from_token(text)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|op| op.name().eq_ignore_ascii_case(text))
            })
            .ok_or_else(|| PolicyError::UnknownOperator(text.to_string()))
    }

    /// Number of operands
    pub fn arity(&self) -> usize {
        match self {
            OpCode::Empty | OpCode::NotEmpty | OpCode::Size | OpCode::Not => 1,
            _ => 2,
        }
    }

    /// Whether a chain of operands can be folded left to right
    pub fn is_associative(&self) -> bool {
        matches!(
            self,
            OpCode::Intersect
                | OpCode::Union
                | OpCode::LogicalAnd
                | OpCode::LogicalOr
                | OpCode::BitwiseAnd
                | OpCode::BitwiseOr
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Operand types of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandTypes {
    Unary(ValueType),
    Binary(ValueType, ValueType),
}

impl OperandTypes {
    pub fn from_slice(types: &[ValueType]) -> Option<Self> {
        match *types {
            [operand] => Some(OperandTypes::Unary(operand)),
            [left, right] => Some(OperandTypes::Binary(left, right)),
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            OperandTypes::Unary(_) => 1,
            OperandTypes::Binary(_, _) => 2,
        }
    }
}

impl fmt::Display for OperandTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandTypes::Unary(operand) => write!(f, "{}", operand),
            OperandTypes::Binary(left, right) => write!(f, "{}_{}", left, right),
        }
    }
}

/// Operand and result types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub operands: OperandTypes,
    pub result: ValueType,
}

pub type UnaryFn = fn(&Value) -> PolicyResult<Value>;
pub type BinaryFn = fn(&Value, &Value) -> PolicyResult<Value>;

/// The function an operator applies
#[derive(Debug, Clone, Copy)]
pub enum Evaluator {
    Unary(UnaryFn),
    Binary(BinaryFn),
}

/// Key of the interning table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorKey {
    pub opcode: OpCode,
    pub operands: OperandTypes,
}

/// A typed operator
///
/// Equality and hashing look at the opcode and operand types only; the
/// evaluator and result type do not take part.
#[derive(Debug, Clone)]
pub struct Operator {
    opcode: OpCode,
    signature: Signature,
    evaluator: Evaluator,
}

impl Operator {
    pub fn unary(opcode: OpCode, operand: ValueType, result: ValueType, f: UnaryFn) -> Self {
        Self {
            opcode,
            signature: Signature {
                operands: OperandTypes::Unary(operand),
                result,
            },
            evaluator: Evaluator::Unary(f),
        }
    }

    pub fn binary(
        opcode: OpCode,
        left: ValueType,
        right: ValueType,
        result: ValueType,
        f: BinaryFn,
    ) -> Self {
        Self {
            opcode,
            signature: Signature {
                operands: OperandTypes::Binary(left, right),
                result,
            },
            evaluator: Evaluator::Binary(f),
        }
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn result_type(&self) -> ValueType {
        self.signature.result
    }

    pub fn key(&self) -> OperatorKey {
        OperatorKey {
            opcode: self.opcode,
            operands: self.signature.operands,
        }
    }

    /// Apply a unary operator
    pub fn apply_unary(&self, operand: &Value) -> PolicyResult<Value> {
        match (self.evaluator, self.signature.operands) {
            (Evaluator::Unary(f), OperandTypes::Unary(expected)) => {
                check_operand(expected, operand)?;
                f(operand)
            }
            _ => Err(PolicyError::Evaluation(format!(
                "operator {} is not unary",
                self
            ))),
        }
    }

    /// Apply a binary operator
    pub fn apply_binary(&self, left: &Value, right: &Value) -> PolicyResult<Value> {
        match (self.evaluator, self.signature.operands) {
            (Evaluator::Binary(f), OperandTypes::Binary(left_type, right_type)) => {
                check_operand(left_type, left)?;
                check_operand(right_type, right)?;
                f(left, right)
            }
            _ => Err(PolicyError::Evaluation(format!(
                "operator {} is not binary",
                self
            ))),
        }
    }
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Operator {}

impl Hash for Operator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.opcode.token(), self.signature.operands)
    }
}

fn check_operand(expected: ValueType, actual: &Value) -> PolicyResult<()> {
    if actual.value_type() == expected {
        Ok(())
    } else {
        Err(operand_error(expected, actual))
    }
}

fn operand_error(expected: ValueType, actual: &Value) -> PolicyError {
    PolicyError::Evaluation(format!(
        "expected {} operand, got {}",
        expected,
        actual.value_type()
    ))
}

fn boolean(value: &Value) -> PolicyResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| operand_error(ValueType::Boolean, value))
}

fn integer(value: &Value) -> PolicyResult<i64> {
    value
        .as_integer()
        .ok_or_else(|| operand_error(ValueType::Integer, value))
}

fn string(value: &Value) -> PolicyResult<&str> {
    value
        .as_str()
        .ok_or_else(|| operand_error(ValueType::String, value))
}

fn string_set(value: &Value) -> PolicyResult<&std::collections::BTreeSet<String>> {
    value
        .as_set()
        .ok_or_else(|| operand_error(ValueType::StringSet, value))
}

/// Compile a `{?}$` pattern
pub(crate) fn compile_pattern(pattern: &str) -> PolicyResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| PolicyError::Composition(format!("invalid pattern '{}': {}", pattern, e)))
}

fn equals(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(left == right))
}

fn not_equals(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(left != right))
}

fn greater(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(integer(left)? > integer(right)?))
}

fn less(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(integer(left)? < integer(right)?))
}

fn set_contains(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(string_set(left)?.contains(string(right)?)))
}

fn set_not_contains(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(!string_set(left)?.contains(string(right)?)))
}

fn str_contains(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(string(left)?.contains(string(right)?)))
}

fn str_not_contains(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(!string(left)?.contains(string(right)?)))
}

/// `{?}$` against an already compiled pattern
pub(crate) fn match_compiled(re: &Regex, subject: &Value) -> PolicyResult<Value> {
    match subject {
        Value::String(s) => Ok(Value::Boolean(re.is_match(s))),
        Value::StringSet(items) => Ok(Value::Boolean(items.iter().any(|item| re.is_match(item)))),
        other => Err(operand_error(ValueType::String, other)),
    }
}

fn set_contains_match(left: &Value, right: &Value) -> PolicyResult<Value> {
    let re = compile_pattern(string(right)?).map_err(into_evaluation)?;
    Ok(Value::Boolean(
        string_set(left)?.iter().any(|item| re.is_match(item)),
    ))
}

fn str_contains_match(left: &Value, right: &Value) -> PolicyResult<Value> {
    let re = compile_pattern(string(right)?).map_err(into_evaluation)?;
    Ok(Value::Boolean(re.is_match(string(left)?)))
}

fn into_evaluation(err: PolicyError) -> PolicyError {
    match err {
        PolicyError::Composition(msg) => PolicyError::Evaluation(msg),
        other => other,
    }
}

fn set_empty(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(string_set(operand)?.is_empty()))
}

fn set_not_empty(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(!string_set(operand)?.is_empty()))
}

fn str_empty(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(string(operand)?.is_empty()))
}

fn str_not_empty(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(!string(operand)?.is_empty()))
}

fn set_size(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Integer(string_set(operand)?.len() as i64))
}

fn str_size(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Integer(string(operand)?.chars().count() as i64))
}

fn and(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(boolean(left)? && boolean(right)?))
}

fn or(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(boolean(left)? || boolean(right)?))
}

fn not(operand: &Value) -> PolicyResult<Value> {
    Ok(Value::Boolean(!boolean(operand)?))
}

fn set_intersect(left: &Value, right: &Value) -> PolicyResult<Value> {
    let right = string_set(right)?;
    Ok(Value::StringSet(
        string_set(left)?.intersection(right).cloned().collect(),
    ))
}

fn set_union(left: &Value, right: &Value) -> PolicyResult<Value> {
    let right = string_set(right)?;
    Ok(Value::StringSet(
        string_set(left)?.union(right).cloned().collect(),
    ))
}

fn bitwise_and(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Integer(integer(left)? & integer(right)?))
}

fn bitwise_or(left: &Value, right: &Value) -> PolicyResult<Value> {
    Ok(Value::Integer(integer(left)? | integer(right)?))
}

/// The built-in operator family
pub fn standard_operators() -> Vec<Operator> {
    use OpCode::*;
    use ValueType::{Boolean as B, Integer as I, String as S, StringSet as SS};

    let mut ops = Vec::new();
    for t in [B, I, S, SS] {
        ops.push(Operator::binary(Equals, t, t, B, equals));
        ops.push(Operator::binary(NotEquals, t, t, B, not_equals));
    }
    ops.extend([
        Operator::binary(Greater, I, I, B, greater),
        Operator::binary(Less, I, I, B, less),
        Operator::binary(Contains, SS, S, B, set_contains),
        Operator::binary(Contains, S, S, B, str_contains),
        Operator::binary(NotContains, SS, S, B, set_not_contains),
        Operator::binary(NotContains, S, S, B, str_not_contains),
        Operator::binary(ContainsMatch, SS, S, B, set_contains_match),
        Operator::binary(ContainsMatch, S, S, B, str_contains_match),
        Operator::unary(Empty, SS, B, set_empty),
        Operator::unary(Empty, S, B, str_empty),
        Operator::unary(NotEmpty, SS, B, set_not_empty),
        Operator::unary(NotEmpty, S, B, str_not_empty),
        Operator::unary(Size, SS, I, set_size),
        Operator::unary(Size, S, I, str_size),
        Operator::binary(Intersect, B, B, B, and),
        Operator::binary(Intersect, SS, SS, SS, set_intersect),
        Operator::binary(Union, B, B, B, or),
        Operator::binary(Union, SS, SS, SS, set_union),
        Operator::binary(LogicalAnd, B, B, B, and),
        Operator::binary(LogicalOr, B, B, B, or),
        Operator::unary(Not, B, B, not),
        Operator::binary(BitwiseAnd, I, I, I, bitwise_and),
        Operator::binary(BitwiseOr, I, I, I, bitwise_or),
    ]);
    ops
}

/// Interning table of operators keyed by opcode and operand types
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    operators: HashMap<OperatorKey, Arc<Operator>>,
}

impl OperatorTable {
    /// The process-wide table of built-in operators
    pub fn global() -> &'static OperatorTable {
        static GLOBAL: OnceLock<OperatorTable> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let table = Self::standard();
            debug!(operators = table.len(), "Operator table initialized");
            table
        })
    }

    /// A fresh table holding the built-in operators
    pub fn standard() -> Self {
        Self::builder().extend(standard_operators()).build()
    }

    pub fn builder() -> OperatorTableBuilder {
        OperatorTableBuilder::default()
    }

    /// Start a builder from this table's contents
    pub fn to_builder(&self) -> OperatorTableBuilder {
        OperatorTableBuilder {
            operators: self.operators.clone(),
        }
    }

    pub fn lookup(&self, opcode: OpCode, operands: &[ValueType]) -> Option<Arc<Operator>> {
        let operands = OperandTypes::from_slice(operands)?;
        self.operators
            .get(&OperatorKey { opcode, operands })
            .cloned()
    }

    /// Like [`lookup`](Self::lookup), but a miss is a composition error
    pub fn resolve(&self, opcode: OpCode, operands: &[ValueType]) -> PolicyResult<Arc<Operator>> {
        self.lookup(opcode, operands).ok_or_else(|| {
            let types: Vec<String> = operands.iter().map(ToString::to_string).collect();
            PolicyError::Composition(format!(
                "no operator '{}' accepts ({})",
                opcode.token(),
                types.join(", ")
            ))
        })
    }

    /// Operators ordered by opcode, then operand types
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Operator>> {
        let mut entries: Vec<_> = self.operators.iter().collect();
        entries.sort_by_key(|(key, _)| **key);
        entries.into_iter().map(|(_, op)| op)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Builder for custom operator tables
#[derive(Debug, Default)]
pub struct OperatorTableBuilder {
    operators: HashMap<OperatorKey, Arc<Operator>>,
}

impl OperatorTableBuilder {
    /// Add an operator, replacing any operator of the same shape
    pub fn register(mut self, operator: Operator) -> Self {
        self.operators.insert(operator.key(), Arc::new(operator));
        self
    }

    pub fn extend(self, operators: impl IntoIterator<Item = Operator>) -> Self {
        operators.into_iter().fold(self, Self::register)
    }

    pub fn build(self) -> OperatorTable {
        OperatorTable {
            operators: self.operators,
        }
    }
}
