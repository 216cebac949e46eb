//! RDF-style statements exchanged with the template store.
//!
//! # Responsibility
//! - Define the `(subject, predicate, object, context)` tuple shared by all
//!   template statement sets.
//! - Provide graph rewriting helpers used before every write.
//!
//! # Invariants
//! - Predicates are always IRIs.
//! - Subjects are IRIs or blank nodes, never literals.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Predicate linking a reference template resource to its parent template.
pub const TEMPLATE_PREDICATE: &str = "http://linkedpipes.com/ontology/template";

/// One node of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
    Iri { value: String },
    Blank { value: String },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri {
            value: value.into(),
        }
    }

    pub fn blank(value: impl Into<String>) -> Self {
        Self::Blank {
            value: value.into(),
        }
    }

    /// Plain literal without language tag or datatype.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Lexical value regardless of term kind.
    pub fn value(&self) -> &str {
        match self {
            Self::Iri { value } | Self::Blank { value } | Self::Literal { value, .. } => value,
        }
    }

    /// Returns the IRI text when this term is an IRI.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iri { value } => write!(f, "<{value}>"),
            Self::Blank { value } => write!(f, "_:{value}"),
            Self::Literal {
                value,
                language: Some(language),
                ..
            } => write!(f, "\"{value}\"@{language}"),
            Self::Literal {
                value,
                datatype: Some(datatype),
                ..
            } => write!(f, "\"{value}\"^^<{datatype}>"),
            Self::Literal { value, .. } => write!(f, "\"{value}\""),
        }
    }
}

/// Subject-predicate-object-context tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
    /// Owning graph. `None` means the default graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Statement {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            context: None,
        }
    }

    /// Returns a copy of this statement placed into `graph`.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.context = Some(graph.into());
        self
    }

    /// `(subject, predicate)` pair used as the replacement key when patching.
    pub fn attribute(&self) -> (&Term, &str) {
        (&self.subject, self.predicate.as_str())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " <{context}>")?;
        }
        write!(f, " .")
    }
}

/// Rewrites the context of every statement to `graph`.
pub fn force_context<I>(statements: I, graph: &str) -> Vec<Statement>
where
    I: IntoIterator<Item = Statement>,
{
    statements
        .into_iter()
        .map(|statement| statement.in_graph(graph))
        .collect()
}

/// Canonical graph holding a template's configuration.
pub fn configuration_graph(template_iri: &str) -> String {
    format!("{template_iri}/configuration")
}

/// Canonical graph holding a template's description.
pub fn description_graph(template_iri: &str) -> String {
    format!("{template_iri}/description")
}
