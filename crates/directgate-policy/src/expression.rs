//! Policy expression trees

use crate::certificate::{AttributeField, AttributeSource};
use crate::error::{PolicyError, PolicyResult};
use crate::operators::{compile_pattern, match_compiled, OpCode, Operator, OperatorTable};
use regex::Regex;
use crate::value::{Value, ValueType};
use std::fmt;
use std::sync::Arc;

/// A type-checked, immutable policy expression
///
/// Operator nodes can only be built through [`Expression::unary`] and
/// [`Expression::binary`] (or their `_with` variants), which resolve the
/// operator for the children's result types. An ill-typed tree therefore
/// never exists.
#[derive(Debug, Clone)]
pub struct Expression {
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Attribute(AttributeField),
    Unary {
        operator: Arc<Operator>,
        operand: Box<Expression>,
    },
    Binary {
        operator: Arc<Operator>,
        left: Box<Expression>,
        right: Box<Expression>,
        /// Literal `{?}$` pattern, compiled once
        pattern: Option<Regex>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self {
            node: Node::Literal(value.into()),
        }
    }

    pub fn attribute(field: AttributeField) -> Self {
        Self {
            node: Node::Attribute(field),
        }
    }

    /// Attribute leaf from a dotted name such as `X509.TBS.Subject.CN`
    pub fn attribute_named(name: &str) -> PolicyResult<Self> {
        AttributeField::parse(name).map(Self::attribute)
    }

    pub fn unary(opcode: OpCode, operand: Expression) -> PolicyResult<Self> {
        Self::unary_with(OperatorTable::global(), opcode, operand)
    }

    pub fn binary(opcode: OpCode, left: Expression, right: Expression) -> PolicyResult<Self> {
        Self::binary_with(OperatorTable::global(), opcode, left, right)
    }

    pub fn unary_with(
        table: &OperatorTable,
        opcode: OpCode,
        operand: Expression,
    ) -> PolicyResult<Self> {
        let operator = table.resolve(opcode, &[operand.result_type()])?;
        Ok(Self {
            node: Node::Unary {
                operator,
                operand: Box::new(operand),
            },
        })
    }

    pub fn binary_with(
        table: &OperatorTable,
        opcode: OpCode,
        left: Expression,
        right: Expression,
    ) -> PolicyResult<Self> {
        let operator = table.resolve(opcode, &[left.result_type(), right.result_type()])?;

        let pattern = match &right.node {
            Node::Literal(Value::String(pattern)) if opcode == OpCode::ContainsMatch => {
                Some(compile_pattern(pattern)?)
            }
            _ => None,
        };

        Ok(Self {
            node: Node::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
                pattern,
            },
        })
    }

    /// Type this expression evaluates to
    pub fn result_type(&self) -> ValueType {
        match &self.node {
            Node::Literal(value) => value.value_type(),
            Node::Attribute(field) => field.value_type(),
            Node::Unary { operator, .. } | Node::Binary { operator, .. } => {
                operator.result_type()
            }
        }
    }

    /// Operator at the root, if this is not a leaf
    pub fn operator(&self) -> Option<&Arc<Operator>> {
        match &self.node {
            Node::Unary { operator, .. } | Node::Binary { operator, .. } => Some(operator),
            _ => None,
        }
    }

    pub fn evaluate<S: AttributeSource + ?Sized>(&self, source: &S) -> PolicyResult<Value> {
        match &self.node {
            Node::Literal(value) => Ok(value.clone()),
            Node::Attribute(field) => Ok(source.extract(field)),
            Node::Unary { operator, operand } => operator.apply_unary(&operand.evaluate(source)?),
            Node::Binary {
                operator,
                left,
                right,
                pattern,
            } => {
                let left = left.evaluate(source)?;
                match pattern {
                    Some(re) => match_compiled(re, &left),
                    None => operator.apply_binary(&left, &right.evaluate(source)?),
                }
            }
        }
    }

    /// Evaluate a Boolean expression
    pub fn matches<S: AttributeSource + ?Sized>(&self, source: &S) -> PolicyResult<bool> {
        let value = self.evaluate(source)?;
        value.as_bool().ok_or_else(|| {
            PolicyError::Evaluation(format!(
                "expected Boolean result, got {}",
                value.value_type()
            ))
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Literal(value) => write!(f, "{}", value),
            Node::Attribute(field) => write!(f, "{}", field),
            Node::Unary { operator, operand } => {
                write!(f, "({} {})", operator.opcode().token(), operand)
            }
            Node::Binary {
                operator,
                left,
                right,
                ..
            } => write!(f, "({} {} {})", left, operator.opcode().token(), right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{key_usage, CertificateAttributes};
    use crate::identifiers::{PublicKeyAlgorithmIdentifier, RdnAttributeIdentifier};

    fn cert() -> CertificateAttributes {
        let mut cert = CertificateAttributes::default()
            .with_subject(RdnAttributeIdentifier::COMMON_NAME, "direct.hospital.example")
            .with_subject(RdnAttributeIdentifier::ORGANIZATION, "Hospital")
            .with_public_key(PublicKeyAlgorithmIdentifier::RSA.oid, 2048);
        cert.key_usage = key_usage::DIGITAL_SIGNATURE | key_usage::KEY_ENCIPHERMENT;
        cert
    }

    fn key_size_at_least(bits: i64) -> Expression {
        Expression::binary(
            OpCode::Greater,
            Expression::attribute(AttributeField::PublicKeySize),
            Expression::literal(bits - 1),
        )
        .unwrap()
    }

    #[test]
    fn test_evaluate_comparison() {
        assert!(key_size_at_least(2048).matches(&cert()).unwrap());
        assert!(!key_size_at_least(4096).matches(&cert()).unwrap());
    }

    #[test]
    fn test_intersect_of_predicates() {
        let org = Expression::binary(
            OpCode::Contains,
            Expression::attribute_named("X509.TBS.Subject.O").unwrap(),
            Expression::literal("Hospital"),
        )
        .unwrap();
        let policy = Expression::binary(OpCode::Intersect, org, key_size_at_least(2048)).unwrap();

        assert_eq!(policy.result_type(), ValueType::Boolean);
        assert!(policy.matches(&cert()).unwrap());
    }

    #[test]
    fn test_key_usage_mask() {
        let masked = Expression::binary(
            OpCode::BitwiseAnd,
            Expression::attribute(AttributeField::KeyUsage),
            Expression::literal(key_usage::DIGITAL_SIGNATURE),
        )
        .unwrap();
        let policy = Expression::binary(
            OpCode::Equals,
            masked,
            Expression::literal(key_usage::DIGITAL_SIGNATURE),
        )
        .unwrap();
        assert!(policy.matches(&cert()).unwrap());
    }

    #[test]
    fn test_type_mismatch_fails_at_construction() {
        let err = Expression::binary(
            OpCode::Intersect,
            Expression::literal(true),
            Expression::attribute(AttributeField::PublicKeySize),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Composition(_)));

        let err = Expression::unary(OpCode::Not, Expression::literal("x")).unwrap_err();
        assert!(matches!(err, PolicyError::Composition(_)));
    }

    #[test]
    fn test_invalid_literal_pattern_fails_at_construction() {
        let err = Expression::binary(
            OpCode::ContainsMatch,
            Expression::attribute(AttributeField::SubjectAltName),
            Expression::literal("[unclosed"),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Composition(_)));
    }

    #[test]
    fn test_literal_pattern_compiled_once() {
        let cert = cert().with_subject(RdnAttributeIdentifier::COMMON_NAME, "direct.clinic.example");
        let policy = Expression::binary(
            OpCode::ContainsMatch,
            Expression::attribute_named("X509.TBS.Subject.CN").unwrap(),
            Expression::literal(r"^direct\.hospital\."),
        )
        .unwrap();
        assert!(matches!(&policy.node, Node::Binary { pattern: Some(_), .. }));
        assert!(policy.matches(&cert).unwrap());

        let policy = Expression::binary(
            OpCode::ContainsMatch,
            Expression::attribute_named("X509.TBS.Subject.CN").unwrap(),
            Expression::literal(r"^mail\."),
        )
        .unwrap();
        assert!(!policy.matches(&cert).unwrap());

        // Pattern taken from the certificate itself is compiled per evaluation
        let dynamic = Expression::binary(
            OpCode::ContainsMatch,
            Expression::literal("direct.hospital.example"),
            Expression::attribute(AttributeField::SerialNumber),
        )
        .unwrap();
        assert!(matches!(&dynamic.node, Node::Binary { pattern: None, .. }));
        assert!(dynamic.matches(&cert).unwrap());
    }

    #[test]
    fn test_matches_requires_boolean() {
        let size = Expression::unary(
            OpCode::Size,
            Expression::attribute(AttributeField::ExtendedKeyUsage),
        )
        .unwrap();
        assert_eq!(size.evaluate(&cert()).unwrap(), Value::Integer(0));
        assert!(matches!(
            size.matches(&cert()),
            Err(PolicyError::Evaluation(_))
        ));
    }

    #[test]
    fn test_shared_operator_instances() {
        let a = key_size_at_least(1024);
        let b = key_size_at_least(2048);
        assert!(Arc::ptr_eq(a.operator().unwrap(), b.operator().unwrap()));
    }

    #[test]
    fn test_concurrent_evaluation() {
        let policy = Arc::new(key_size_at_least(2048));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || policy.matches(&cert()).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_display() {
        let policy = Expression::unary(OpCode::Not, key_size_at_least(2048)).unwrap();
        assert_eq!(
            policy.to_string(),
            "(! (X509.TBS.SubjectPublicKeyInfo.Size > 2047))"
        );
    }
}
