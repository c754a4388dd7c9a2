//! Named custom task handlers
//!
//! Handlers take and return JSON values. Closures registered on a table are
//! visible to the in-process strategies (fallback and thread context); handlers
//! submitted with `inventory` are also visible to worker processes, since they
//! are compiled into the binary.

use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// A custom task handler
pub type CustomHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Statically registered custom task
///
/// ```ignore
/// inventory::submit! {
///     framelens_core::CustomTaskDef::new("frame_histogram", frame_histogram)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CustomTaskDef {
    /// Task name
    pub name: &'static str,
    /// Handler
    pub handler: fn(Value) -> Result<Value, String>,
}

impl CustomTaskDef {
    /// Define a handler
    pub const fn new(name: &'static str, handler: fn(Value) -> Result<Value, String>) -> Self {
        Self { name, handler }
    }
}

/// Name to handler lookup shared by every executor of one dispatcher
#[derive(Clone, Default)]
pub struct CustomTaskTable {
    handlers: FxHashMap<String, CustomHandler>,
}

impl CustomTaskTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with every `inventory`-registered [`CustomTaskDef`]
    pub fn with_registered() -> Self {
        let mut table = Self::new();
        for def in inventory::iter::<CustomTaskDef> {
            let handler = def.handler;
            table.register(def.name, move |data| handler(data));
        }
        table
    }

    /// Add or replace a handler
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Look up a handler
    pub fn get(&self, name: &str) -> Option<&CustomHandler> {
        self.handlers.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table has no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CustomTaskTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomTaskTable")
            .field("handlers", &self.names())
            .finish()
    }
}
