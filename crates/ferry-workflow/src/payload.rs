use std::any::{Any, TypeId};
use std::sync::Arc;

/// Static description of a message type, used to check edges at build time.
#[derive(Debug, Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// An immutable, type-erased message flowing through a workflow.
///
/// Cloning is cheap (shared `Arc`), so fan-out hands the same value to every
/// target.
#[derive(Clone)]
pub struct Payload {
    message_type: MessageType,
    value: Arc<dyn Any + Send + Sync>,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            message_type: MessageType::of::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn type_name(&self) -> &'static str {
        self.message_type.name()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.message_type.type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.value).downcast_ref::<T>()
    }

    /// Clone the inner value out, if it is a `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name())
            .finish()
    }
}
