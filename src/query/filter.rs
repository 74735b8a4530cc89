//! Subscription filters.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Key path that addresses the document identity instead of a body field.
pub const DOCUMENT_ID_KEY: &str = "$id";

/// Comparison applied by a simple filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    ArrayContains,
}

impl Relation {
    fn code(self) -> &'static str {
        match self {
            Relation::Equal => "eq",
            Relation::GreaterThan => "gt",
            Relation::GreaterThanOrEqual => "gte",
            Relation::LessThan => "lt",
            Relation::LessThanOrEqual => "lte",
            Relation::Contains => "cnt",
            Relation::StartsWith => "pref",
            Relation::EndsWith => "suf",
            Relation::ArrayContains => "arr-cnt",
        }
    }
}

/// Logical operator joining compound filter operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOperator {
    And,
    Or,
    Not,
}

impl CompoundOperator {
    fn code(self) -> &'static str {
        match self {
            CompoundOperator::And => "and",
            CompoundOperator::Or => "or",
            CompoundOperator::Not => "not",
        }
    }
}

/// A filter expression evaluated by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Simple {
        key_path: String,
        relation: Relation,
        value: serde_json::Value,
    },
    Compound {
        operator: CompoundOperator,
        operands: Vec<Filter>,
    },
}

/// Visitor over the filter tree.
pub trait FilterVisitor {
    type Output;

    fn visit_simple(
        &mut self,
        key_path: &str,
        relation: Relation,
        value: &serde_json::Value,
    ) -> Self::Output;

    fn visit_compound(&mut self, operator: CompoundOperator, operands: &[Filter]) -> Self::Output;
}

impl Filter {
    pub fn simple(
        key_path: impl Into<String>,
        relation: Relation,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Filter::Simple {
            key_path: key_path.into(),
            relation,
            value: value.into(),
        }
    }

    pub fn equal(key_path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::simple(key_path, Relation::Equal, value)
    }

    /// Match a single document by identity.
    pub fn document_id(id: impl Into<String>) -> Self {
        Self::equal(DOCUMENT_ID_KEY, id.into())
    }

    pub fn and(operands: Vec<Filter>) -> Self {
        Filter::Compound {
            operator: CompoundOperator::And,
            operands,
        }
    }

    pub fn or(operands: Vec<Filter>) -> Self {
        Filter::Compound {
            operator: CompoundOperator::Or,
            operands,
        }
    }

    pub fn not(operand: Filter) -> Self {
        Filter::Compound {
            operator: CompoundOperator::Not,
            operands: vec![operand],
        }
    }

    /// Dispatch to the visitor method matching this node.
    pub fn accept<V: FilterVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Filter::Simple {
                key_path,
                relation,
                value,
            } => visitor.visit_simple(key_path, *relation, value),
            Filter::Compound { operator, operands } => visitor.visit_compound(*operator, operands),
        }
    }

    /// Deterministic textual form used inside subscription fingerprints.
    pub fn fingerprint(&self) -> String {
        self.accept(&mut FingerprintRenderer)
    }

    /// Reject filters the server could never evaluate.
    pub fn validate(&self) -> Result<()> {
        self.accept(&mut Validator)
    }
}

struct FingerprintRenderer;

impl FilterVisitor for FingerprintRenderer {
    type Output = String;

    fn visit_simple(
        &mut self,
        key_path: &str,
        relation: Relation,
        value: &serde_json::Value,
    ) -> String {
        // serde_json renders scalars canonically and keeps object keys sorted
        format!("{}-{}-{}", key_path, relation.code(), value)
    }

    fn visit_compound(&mut self, operator: CompoundOperator, operands: &[Filter]) -> String {
        let parts: Vec<String> = operands.iter().map(|f| f.accept(self)).collect();
        format!("{}({})", operator.code(), parts.join("|"))
    }
}

struct Validator;

impl FilterVisitor for Validator {
    type Output = Result<()>;

    fn visit_simple(
        &mut self,
        key_path: &str,
        _relation: Relation,
        _value: &serde_json::Value,
    ) -> Result<()> {
        if key_path.is_empty() {
            return Err(SyncError::InvalidData("filter key path is empty".into()));
        }
        Ok(())
    }

    fn visit_compound(&mut self, operator: CompoundOperator, operands: &[Filter]) -> Result<()> {
        if operands.is_empty() {
            return Err(SyncError::InvalidData(format!(
                "compound filter '{}' has no operands",
                operator.code()
            )));
        }
        if operator == CompoundOperator::Not && operands.len() > 1 {
            return Err(SyncError::InvalidData(
                "'not' filter takes exactly one operand".into(),
            ));
        }
        operands.iter().try_for_each(|f| f.accept(self))
    }
}
