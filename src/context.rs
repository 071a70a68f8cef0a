//! Shared execution context.
//!
//! One namespace per server, shared by reference between every console
//! session and the host process. Console sessions run on a multi-threaded
//! runtime, so the map sits behind a lock: each individual read or write is
//! atomic, and interleaved read-modify-write sequences from different writers
//! are last-write-wins.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// A mutable name-to-value namespace shared between sessions.
///
/// Cloning produces another handle to the same namespace, never a copy.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    vars: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl SharedContext {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.read(|vars| vars.get(name).cloned())
    }

    /// Bind `name` to `value`, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write(|vars| vars.insert(name.into(), value.into()))
    }

    /// Remove `name`, returning its value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.write(|vars| vars.remove(name))
    }

    /// Check whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.read(|vars| vars.contains_key(name))
    }

    /// Sorted list of bound names.
    pub fn names(&self) -> Vec<String> {
        self.read(|vars| vars.keys().cloned().collect())
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.read(|vars| vars.len())
    }

    /// Check whether the namespace is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the whole namespace.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.read(|vars| vars.clone())
    }

    /// Apply `f` to the value bound to `name` while holding the write lock.
    ///
    /// This is the only way to do an atomic read-modify-write. A missing
    /// name is passed in as `Value::Null` and stored afterwards.
    pub fn update<F, T>(&self, name: &str, f: F) -> T
    where
        F: FnOnce(&mut Value) -> T,
    {
        self.write(|vars| f(vars.entry(name.to_string()).or_insert(Value::Null)))
    }

    /// Check whether two handles refer to the same namespace.
    pub fn ptr_eq(&self, other: &SharedContext) -> bool {
        Arc::ptr_eq(&self.vars, &other.vars)
    }

    // A poisoned lock only means another writer panicked mid-call; the map
    // itself is still structurally valid, so keep serving it.
    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Value>) -> T) -> T {
        let vars = self.vars.read().unwrap_or_else(PoisonError::into_inner);
        f(&vars)
    }

    fn write<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Value>) -> T) -> T {
        let mut vars = self.vars.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut vars)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SharedContext {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let vars = iter.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            vars: Arc::new(RwLock::new(vars)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_is_empty() {
        let ctx = SharedContext::new();
        assert!(ctx.is_empty());
        assert_eq!(ctx.len(), 0);
        assert!(ctx.get("x").is_none());
    }

    #[test]
    fn test_set_get_remove() {
        let ctx = SharedContext::new();
        assert_eq!(ctx.set("x", 1), None);
        assert_eq!(ctx.set("x", 2), Some(json!(1)));
        assert_eq!(ctx.get("x"), Some(json!(2)));
        assert!(ctx.contains("x"));

        assert_eq!(ctx.remove("x"), Some(json!(2)));
        assert!(!ctx.contains("x"));
        assert_eq!(ctx.remove("x"), None);
    }

    #[test]
    fn test_clone_shares_namespace() {
        let host = SharedContext::new();
        let session = host.clone();

        session.set("speed", 0.5);
        assert_eq!(host.get("speed"), Some(json!(0.5)));
        assert!(host.ptr_eq(&session));
        assert!(!host.ptr_eq(&SharedContext::new()));
    }

    #[test]
    fn test_names_sorted() {
        let ctx: SharedContext = [("b", json!(2)), ("a", json!(1)), ("c", json!(3))]
            .into_iter()
            .collect();
        assert_eq!(ctx.names(), vec!["a", "b", "c"]);
        assert_eq!(ctx.snapshot().len(), 3);
    }

    #[test]
    fn test_update_inserts_null() {
        let ctx = SharedContext::new();
        let was_null = ctx.update("counter", |v| {
            let was_null = v.is_null();
            *v = json!(1);
            was_null
        });
        assert!(was_null);
        assert_eq!(ctx.get("counter"), Some(json!(1)));
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let ctx = SharedContext::new();
        ctx.set("n", 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        ctx.update("n", |v| *v = json!(v.as_u64().unwrap_or(0) + 1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.get("n"), Some(json!(800)));
    }
}
