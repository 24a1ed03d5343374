//! Policy compiler
//!
//! Turns serde policy definitions (TOML or JSON) into type-checked
//! [`Expression`]s, and filters certificates with the result.

use crate::certificate::{AttributeSource, CertificateAttributes};
use crate::error::{PolicyError, PolicyResult};
use crate::expression::Expression;
use crate::operators::{OpCode, OperatorTable};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Literal operand of a policy definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    StringSet(Vec<String>),
}

impl From<LiteralValue> for Value {
    fn from(literal: LiteralValue) -> Self {
        match literal {
            LiteralValue::Boolean(b) => Value::Boolean(b),
            LiteralValue::Integer(i) => Value::Integer(i),
            LiteralValue::String(s) => Value::String(s),
            LiteralValue::StringSet(items) => Value::set(items),
        }
    }
}

/// Serialized form of a policy expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyDefinition {
    Literal {
        literal: LiteralValue,
    },
    Attribute {
        attribute: String,
    },
    Operation {
        op: String,
        operands: Vec<PolicyDefinition>,
    },
}

impl PolicyDefinition {
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        serde_json::from_str(json).map_err(|e| PolicyError::Definition(e.to_string()))
    }
}

/// Compile a definition against the global operator table
pub fn compile(definition: &PolicyDefinition) -> PolicyResult<Expression> {
    compile_with(OperatorTable::global(), definition)
}

/// Compile a definition against a custom operator table
///
/// Associative operators accept two or more operands and fold left.
pub fn compile_with(table: &OperatorTable, definition: &PolicyDefinition) -> PolicyResult<Expression> {
    match definition {
        PolicyDefinition::Literal { literal } => Ok(Expression::literal(literal.clone())),
        PolicyDefinition::Attribute { attribute } => Expression::attribute_named(attribute),
        PolicyDefinition::Operation { op, operands } => {
            let opcode = OpCode::parse(op)?;
            let mut compiled = operands
                .iter()
                .map(|operand| compile_with(table, operand))
                .collect::<PolicyResult<Vec<_>>>()?;

            match (opcode.arity(), compiled.len()) {
                (1, 1) => Expression::unary_with(table, opcode, compiled.remove(0)),
                (2, 2) => {
                    let right = compiled.remove(1);
                    Expression::binary_with(table, opcode, compiled.remove(0), right)
                }
                (2, n) if n > 2 && opcode.is_associative() => {
                    let mut operands = compiled.into_iter();
                    let first = operands
                        .next()
                        .ok_or_else(|| PolicyError::Definition("missing operand".to_string()))?;
                    operands.try_fold(first, |acc, next| {
                        Expression::binary_with(table, opcode, acc, next)
                    })
                }
                (arity, n) => Err(PolicyError::Definition(format!(
                    "operator '{}' takes {} operand(s), got {}",
                    opcode.token(),
                    arity,
                    n
                ))),
            }
        }
    }
}

/// One named policy from a policy file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: PolicyDefinition,
}

/// A policy file: a list of `[[policy]]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default, rename = "policy")]
    pub policies: Vec<PolicyEntry>,
}

impl PolicySet {
    pub fn from_toml_str(content: &str) -> PolicyResult<Self> {
        toml::from_str(content).map_err(|e| PolicyError::Definition(e.to_string()))
    }

    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PolicyError::Definition(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Compile every policy; each one must produce a Boolean
    pub fn compile_all(&self) -> PolicyResult<Vec<CompiledPolicy>> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(self.policies.len());

        for entry in &self.policies {
            if !seen.insert(entry.name.as_str()) {
                return Err(PolicyError::Definition(format!(
                    "duplicate policy name '{}'",
                    entry.name
                )));
            }

            let expression = compile(&entry.expression).map_err(|e| {
                PolicyError::Composition(format!("policy '{}': {}", entry.name, e))
            })?;
            if expression.result_type() != ValueType::Boolean {
                return Err(PolicyError::Composition(format!(
                    "policy '{}' yields {}, expected Boolean",
                    entry.name,
                    expression.result_type()
                )));
            }

            debug!(policy = %entry.name, expression = %expression, "Compiled policy");
            compiled.push(CompiledPolicy {
                name: entry.name.clone(),
                description: entry.description.clone(),
                expression,
            });
        }

        info!(count = compiled.len(), "Loaded trust policies");
        Ok(compiled)
    }
}

/// A named, Boolean-typed policy expression
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub name: String,
    pub description: Option<String>,
    pub expression: Expression,
}

impl CompiledPolicy {
    pub fn matches<S: AttributeSource + ?Sized>(&self, source: &S) -> PolicyResult<bool> {
        self.expression.matches(source)
    }
}

/// Applies a compiled policy to candidate certificates
#[derive(Debug, Clone)]
pub struct PolicyFilter {
    policy: CompiledPolicy,
}

impl PolicyFilter {
    pub fn new(policy: CompiledPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    /// Evaluation errors count as non-compliant
    pub fn is_compliant(&self, cert: &CertificateAttributes) -> bool {
        match self.policy.matches(cert) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    policy = %self.policy.name,
                    serial = %cert.serial_number,
                    error = %e,
                    "Policy evaluation failed, treating certificate as non-compliant"
                );
                false
            }
        }
    }

    /// The certificates that satisfy the policy, in input order
    pub fn filter_compliant<'a, I>(&self, certs: I) -> Vec<&'a CertificateAttributes>
    where
        I: IntoIterator<Item = &'a CertificateAttributes>,
    {
        certs
            .into_iter()
            .filter(|cert| self.is_compliant(cert))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{PublicKeyAlgorithmIdentifier, RdnAttributeIdentifier};
    use pretty_assertions::assert_eq;

    const POLICIES: &str = r#"
[[policy]]
name = "strong-rsa"
description = "RSA keys of at least 2048 bits"

[policy.expression]
op = "&&"
operands = [
    { op = "=", operands = [
        { attribute = "X509.TBS.SubjectPublicKeyInfo.Algorithm" },
        { literal = "1.2.840.113549.1.1.1" },
    ] },
    { op = ">", operands = [
        { attribute = "X509.TBS.SubjectPublicKeyInfo.Size" },
        { literal = 2047 },
    ] },
    { op = "{}!", operands = [{ attribute = "X509.TBS.Subject.CN" }] },
]

[[policy]]
name = "hospital-org"

[policy.expression]
op = "contains"
operands = [{ attribute = "X509.TBS.Subject.O" }, { literal = "Hospital" }]
"#;

    fn cert(size: i64) -> CertificateAttributes {
        CertificateAttributes::default()
            .with_subject(RdnAttributeIdentifier::COMMON_NAME, "hospital.example")
            .with_subject(RdnAttributeIdentifier::ORGANIZATION, "Hospital")
            .with_public_key(PublicKeyAlgorithmIdentifier::RSA.oid, size)
    }

    #[test]
    fn test_compile_policy_set() {
        let set = PolicySet::from_toml_str(POLICIES).unwrap();
        let compiled = set.compile_all().unwrap();

        let names: Vec<_> = compiled.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["strong-rsa", "hospital-org"]);
        assert!(compiled[0].matches(&cert(2048)).unwrap());
        assert!(!compiled[0].matches(&cert(1024)).unwrap());
        assert!(compiled[1].matches(&cert(1024)).unwrap());
    }

    #[test]
    fn test_filter_compliant() {
        let compiled = PolicySet::from_toml_str(POLICIES)
            .unwrap()
            .compile_all()
            .unwrap();
        let filter = PolicyFilter::new(compiled[0].clone());

        let certs = vec![cert(1024), cert(2048), cert(4096)];
        let sizes: Vec<_> = filter
            .filter_compliant(&certs)
            .iter()
            .map(|c| c.public_key_size)
            .collect();
        assert_eq!(sizes, vec![2048, 4096]);
    }

    #[test]
    fn test_json_definition() {
        let definition = PolicyDefinition::from_json(
            r#"{"op": "{?}", "operands": [{"attribute": "X509.TBS.EXTENSION.ExtendedKeyUsage"}, {"literal": "1.3.6.1.5.5.7.3.4"}]}"#,
        )
        .unwrap();
        let expression = compile(&definition).unwrap();

        let mut with_eku = cert(2048);
        with_eku.extended_key_usage = vec!["1.3.6.1.5.5.7.3.4".to_string()];
        assert!(expression.matches(&with_eku).unwrap());
        assert!(!expression.matches(&cert(2048)).unwrap());
    }

    #[test]
    fn test_set_literal() {
        let definition = PolicyDefinition::from_json(
            r#"{"op": "{∩}", "operands": [{"attribute": "X509.TBS.Subject.CN"}, {"literal": ["hospital.example", "clinic.example"]}]}"#,
        )
        .unwrap();
        let expression = compile(&definition).unwrap();
        assert_eq!(
            expression.evaluate(&cert(2048)).unwrap(),
            Value::set(["hospital.example"])
        );
    }

    #[test]
    fn test_unknown_attribute_is_an_error() {
        let definition = PolicyDefinition::Attribute {
            attribute: "X509.TBS.Subject.CN.".to_string(),
        };
        assert!(matches!(
            compile(&definition),
            Err(PolicyError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_wrong_arity() {
        let definition = PolicyDefinition::Operation {
            op: "!".to_string(),
            operands: vec![],
        };
        assert!(matches!(
            compile(&definition),
            Err(PolicyError::Definition(_))
        ));

        let definition = PolicyDefinition::from_json(
            r#"{"op": ">", "operands": [{"literal": 1}, {"literal": 2}, {"literal": 3}]}"#,
        )
        .unwrap();
        assert!(matches!(
            compile(&definition),
            Err(PolicyError::Definition(_))
        ));
    }

    #[test]
    fn test_non_boolean_policy_rejected() {
        let set = PolicySet::from_toml_str(
            r#"
[[policy]]
name = "size"
expression = { op = "^", operands = [{ attribute = "X509.TBS.Subject.CN" }] }
"#,
        )
        .unwrap();
        assert!(matches!(
            set.compile_all(),
            Err(PolicyError::Composition(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let set = PolicySet::from_toml_str(
            r#"
[[policy]]
name = "a"
expression = { literal = true }

[[policy]]
name = "a"
expression = { literal = false }
"#,
        )
        .unwrap();
        assert!(matches!(set.compile_all(), Err(PolicyError::Definition(_))));
    }
}
