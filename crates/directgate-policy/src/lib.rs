//! DirectGate Policy - Trust policy expression engine
//!
//! Policies are trees of typed operators evaluated against attributes
//! extracted from certificates. Operator shapes are interned in a
//! process-wide table keyed by opcode and operand types, so compiled
//! policies share evaluators and malformed trees are rejected when they
//! are built rather than when they are evaluated.

pub mod certificate;
pub mod compiler;
pub mod error;
pub mod expression;
pub mod identifiers;
pub mod operators;
pub mod value;

pub use certificate::{key_usage, AttributeField, AttributeSource, CertificateAttributes};
pub use compiler::{
    compile, compile_with, CompiledPolicy, LiteralValue, PolicyDefinition, PolicyEntry,
    PolicyFilter, PolicySet,
};
pub use error::{PolicyError, PolicyResult};
pub use expression::Expression;
pub use identifiers::{
    ExtendedKeyUsageIdentifier, PublicKeyAlgorithmIdentifier, RdnAttributeIdentifier,
    SignatureAlgorithmIdentifier,
};
pub use operators::{
    Evaluator, OpCode, OperandTypes, Operator, OperatorKey, OperatorTable, OperatorTableBuilder,
    Signature,
};
pub use value::{Value, ValueType};
