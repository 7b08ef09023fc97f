use super::ProcessorKind;
use crate::error::CallbackError;
use std::fmt;
use std::sync::Arc;

/// A lifecycle callback. Runs synchronously on the caller's thread.
pub type Callback<O> = Arc<dyn Fn(&mut O) + Send + Sync>;

struct Entry<O> {
    name: String,
    callback: Callback<O>,
}

enum Position<'a> {
    Last,
    Before(&'a str),
    After(&'a str),
}

/// An ordered chain of named callbacks for one operation kind.
pub struct Processor<O> {
    kind: ProcessorKind,
    entries: Vec<Entry<O>>,
}

impl<O: 'static> Processor<O> {
    pub(super) fn new(kind: ProcessorKind) -> Self {
        Self {
            kind,
            entries: vec![Entry {
                name: kind.anchor().to_string(),
                callback: Arc::new(|_: &mut O| {}),
            }],
        }
    }

    /// Append a callback at the end of the chain.
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F) -> Result<(), CallbackError>
    where
        F: Fn(&mut O) + Send + Sync + 'static,
    {
        self.insert(Position::Last, name.into(), Arc::new(callback))
    }

    /// Start a registration placed immediately before `anchor`.
    pub fn before<'a>(&'a mut self, anchor: &'a str) -> Registration<'a, O> {
        Registration {
            processor: self,
            position: Position::Before(anchor),
        }
    }

    /// Start a registration placed immediately after `anchor`.
    pub fn after<'a>(&'a mut self, anchor: &'a str) -> Registration<'a, O> {
        Registration {
            processor: self,
            position: Position::After(anchor),
        }
    }

    /// Replace the callback registered under `name`, keeping its position.
    pub fn replace<F>(&mut self, name: &str, callback: F) -> Result<(), CallbackError>
    where
        F: Fn(&mut O) + Send + Sync + 'static,
    {
        let idx = self.position_of(name)?;
        self.entries[idx].callback = Arc::new(callback);
        Ok(())
    }

    /// Remove the callback registered under `name`.
    pub fn remove(&mut self, name: &str) -> Result<(), CallbackError> {
        let idx = self.position_of(name)?;
        self.entries.remove(idx);
        Ok(())
    }

    /// Run every callback in order.
    pub fn execute(&self, op: &mut O) {
        for entry in &self.entries {
            (entry.callback)(op);
        }
    }

    fn insert(
        &mut self,
        position: Position<'_>,
        name: String,
        callback: Callback<O>,
    ) -> Result<(), CallbackError> {
        if self.contains(&name) {
            return Err(CallbackError::DuplicateName {
                processor: self.kind.as_str(),
                name,
            });
        }

        let idx = match position {
            Position::Last => self.entries.len(),
            Position::Before(anchor) => self.position_of(anchor)?,
            Position::After(anchor) => self.position_of(anchor)? + 1,
        };
        self.entries.insert(idx, Entry { name, callback });
        Ok(())
    }

    fn position_of(&self, name: &str) -> Result<usize, CallbackError> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| CallbackError::UnknownHookPoint {
                processor: self.kind.as_str(),
                anchor: name.to_string(),
            })
    }
}

impl<O> Processor<O> {
    pub fn kind(&self) -> ProcessorKind {
        self.kind
    }

    /// Whether a callback named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Callback names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<O> fmt::Debug for Processor<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("kind", &self.kind)
            .field("callbacks", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// A pending registration relative to an anchor, created by [`Processor::before`] or
/// [`Processor::after`].
#[must_use = "call `register` to add the callback"]
pub struct Registration<'a, O> {
    processor: &'a mut Processor<O>,
    position: Position<'a>,
}

impl<O: 'static> Registration<'_, O> {
    /// Register `callback` under `name`.
    ///
    /// Fails if `name` is taken or the anchor does not exist.
    pub fn register<F>(self, name: impl Into<String>, callback: F) -> Result<(), CallbackError>
    where
        F: Fn(&mut O) + Send + Sync + 'static,
    {
        self.processor
            .insert(self.position, name.into(), Arc::new(callback))
    }
}
