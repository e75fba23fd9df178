use std::any::Any;
use std::sync::Arc;

use crate::payload::{MessageType, Payload};

type Predicate = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

/// A directed connection routing one executor's output to another's input.
#[derive(Clone)]
pub struct Edge {
    /// Source executor id.
    pub from: String,
    /// Target executor id.
    pub to: String,
    condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Clone)]
enum EdgeCondition {
    /// Always traverse this edge.
    Always,
    /// Traverse if the predicate holds for the source's output.
    When {
        message_type: MessageType,
        predicate: Predicate,
    },
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge guarded by a predicate over the source's output.
    ///
    /// `T` must be the source executor's output type; this is checked when the
    /// workflow is built.
    pub fn when<T, F>(from: impl Into<String>, to: impl Into<String>, predicate: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate =
            Arc::new(move |p: &Payload| p.downcast_ref::<T>().is_some_and(|v| predicate(v)));
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::When {
                message_type: MessageType::of::<T>(),
                predicate,
            },
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.condition, EdgeCondition::When { .. })
    }

    /// Type inspected by the predicate, if any.
    pub fn predicate_type(&self) -> Option<MessageType> {
        match &self.condition {
            EdgeCondition::Always => None,
            EdgeCondition::When { message_type, .. } => Some(*message_type),
        }
    }

    /// Whether a message leaving the source should travel along this edge.
    pub fn fires(&self, message: &Payload) -> bool {
        match &self.condition {
            EdgeCondition::Always => true,
            EdgeCondition::When { predicate, .. } => predicate(message),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("conditional", &self.is_conditional())
            .finish()
    }
}
