// Callback registry: named, ordered hook chains per persistence operation.
// Features register hooks with relative before/after constraints; the
// effective order is a stable topological sort computed on first resolve
// and cached until the next mutation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::scope::Scope;

const LOCK_POISONED: &str = "callback chain lock poisoned";

/// Persistence operations with their own callback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Query,
    Update,
    Delete,
}

/// A unit of behavior attached to a lifecycle point of a persistence
/// operation. Hooks record failures on the scope instead of returning them;
/// the chain executor skips remaining hooks once the scope holds an error.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn call(&self, scope: &mut Scope);
}

/// Adapter registering a plain synchronous closure as a callback
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&mut Scope) + Send + Sync,
{
    async fn call(&self, scope: &mut Scope) {
        (self.0)(scope)
    }
}

/// Registry configuration failures. These are startup misconfiguration, not
/// per-request errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback \"{name}\" is already registered for {operation:?}")]
    DuplicateName { operation: Operation, name: String },

    #[error("callback \"{name}\" is not registered for {operation:?}")]
    UnknownCallback { operation: Operation, name: String },

    #[error("cyclic ordering constraint among {operation:?} callbacks: {names:?}")]
    CyclicConstraint { operation: Operation, names: Vec<String> },
}

/// A named hook with its ordering constraints. Entries live in registration
/// order; removal preserves the relative order of the rest.
#[derive(Clone)]
pub struct RegisteredCallback {
    name: String,
    callback: Arc<dyn Callback>,
    before: Vec<String>,
    after: Vec<String>,
}

impl std::fmt::Debug for RegisteredCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCallback")
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

impl RegisteredCallback {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &Arc<dyn Callback> {
        &self.callback
    }
}

/// The resolved execution order for one chain
pub type ResolvedChain = Arc<Vec<Arc<RegisteredCallback>>>;

struct CallbackChain {
    operation: Operation,
    entries: Vec<RegisteredCallback>,
    cached: Option<ResolvedChain>,
}

impl CallbackChain {
    fn new(operation: Operation) -> Self {
        Self { operation, entries: Vec::new(), cached: None }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    fn register(
        &mut self,
        name: String,
        callback: Arc<dyn Callback>,
        before: Vec<String>,
        after: Vec<String>,
    ) -> Result<(), CallbackError> {
        if self.position(&name).is_some() {
            return Err(CallbackError::DuplicateName { operation: self.operation, name });
        }
        tracing::debug!("Registered callback '{}' for {:?}", name, self.operation);
        self.entries.push(RegisteredCallback { name, callback, before, after });
        self.cached = None;
        Ok(())
    }

    fn replace(&mut self, name: &str, callback: Arc<dyn Callback>) -> Result<(), CallbackError> {
        let position = self.position(name).ok_or_else(|| CallbackError::UnknownCallback {
            operation: self.operation,
            name: name.to_string(),
        })?;
        tracing::debug!("Replaced callback '{}' for {:?}", name, self.operation);
        self.entries[position].callback = callback;
        self.cached = None;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), CallbackError> {
        let position = self.position(name).ok_or_else(|| CallbackError::UnknownCallback {
            operation: self.operation,
            name: name.to_string(),
        })?;
        tracing::debug!("Removed callback '{}' for {:?}", name, self.operation);
        self.entries.remove(position);
        for entry in &mut self.entries {
            entry.before.retain(|peer| peer != name);
            entry.after.retain(|peer| peer != name);
        }
        self.cached = None;
        Ok(())
    }

    fn resolve(&mut self) -> Result<ResolvedChain, CallbackError> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let order = self.sort()?;
        let resolved: ResolvedChain =
            Arc::new(order.into_iter().map(|i| Arc::new(self.entries[i].clone())).collect());
        self.cached = Some(resolved.clone());
        Ok(resolved)
    }

    /// Stable topological sort: before/after constraints become edges,
    /// registration order breaks ties among unconstrained peers.
    /// Constraints naming unregistered hooks are held but inert.
    fn sort(&self) -> Result<Vec<usize>, CallbackError> {
        let count = self.entries.len();
        let index: HashMap<&str, usize> =
            self.entries.iter().enumerate().map(|(i, e)| (e.name.as_str(), i)).collect();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut indegree = vec![0usize; count];
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();
        let mut add_edge = |from: usize, to: usize,
                            successors: &mut Vec<Vec<usize>>,
                            indegree: &mut Vec<usize>| {
            if seen_edges.insert((from, to)) {
                successors[from].push(to);
                indegree[to] += 1;
            }
        };

        for (i, entry) in self.entries.iter().enumerate() {
            for peer in &entry.before {
                if let Some(&j) = index.get(peer.as_str()) {
                    add_edge(i, j, &mut successors, &mut indegree);
                }
            }
            for peer in &entry.after {
                if let Some(&j) = index.get(peer.as_str()) {
                    add_edge(j, i, &mut successors, &mut indegree);
                }
            }
        }

        // entries are stored in registration order, so ascending index order
        // is registration order
        let mut ready: BTreeSet<usize> =
            (0..count).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &succ in &successors[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() != count {
            let names: Vec<String> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, e)| e.name.clone())
                .collect();
            return Err(CallbackError::CyclicConstraint { operation: self.operation, names });
        }
        Ok(order)
    }
}

/// Owns the four callback chains, one per operation kind.
///
/// Built once at process initialization as features self-register hooks,
/// resolved on every operation invocation, and safely mutable at runtime:
/// chains sit behind locks and any mutation drops the cached order, so a
/// concurrent resolve never observes a stale or partially built chain.
pub struct CallbackRegistry {
    create: RwLock<CallbackChain>,
    query: RwLock<CallbackChain>,
    update: RwLock<CallbackChain>,
    delete: RwLock<CallbackChain>,
}

impl CallbackRegistry {
    /// Create a registry with empty chains
    pub fn new() -> Self {
        Self {
            create: RwLock::new(CallbackChain::new(Operation::Create)),
            query: RwLock::new(CallbackChain::new(Operation::Query)),
            update: RwLock::new(CallbackChain::new(Operation::Update)),
            delete: RwLock::new(CallbackChain::new(Operation::Delete)),
        }
    }

    /// Create a registry preloaded with the built-in operation chains
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        crate::callback::create::register_defaults(&registry)
            .expect("built-in create chain is internally consistent");
        crate::callback::query::register_defaults(&registry)
            .expect("built-in query chain is internally consistent");
        crate::callback::update::register_defaults(&registry)
            .expect("built-in update chain is internally consistent");
        crate::callback::delete::register_defaults(&registry)
            .expect("built-in delete chain is internally consistent");
        registry
    }

    fn chain_lock(&self, operation: Operation) -> &RwLock<CallbackChain> {
        match operation {
            Operation::Create => &self.create,
            Operation::Query => &self.query,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    /// Builder for the create chain
    pub fn create(&self) -> ChainBuilder<'_> {
        self.on(Operation::Create)
    }

    /// Builder for the query chain
    pub fn query(&self) -> ChainBuilder<'_> {
        self.on(Operation::Query)
    }

    /// Builder for the update chain
    pub fn update(&self) -> ChainBuilder<'_> {
        self.on(Operation::Update)
    }

    /// Builder for the delete chain
    pub fn delete(&self) -> ChainBuilder<'_> {
        self.on(Operation::Delete)
    }

    /// Builder for an arbitrary operation's chain
    pub fn on(&self, operation: Operation) -> ChainBuilder<'_> {
        ChainBuilder { registry: self, operation, before: Vec::new(), after: Vec::new() }
    }

    /// Delete a named hook and every constraint referencing it
    pub fn remove(&self, operation: Operation, name: &str) -> Result<(), CallbackError> {
        self.chain_lock(operation).write().expect(LOCK_POISONED).remove(name)
    }

    /// Compute (or fetch the cached) execution order for one chain.
    ///
    /// Cycles among ordering constraints surface here, on first use after a
    /// mutation, since constraints may reference names registered later.
    pub fn resolve(&self, operation: Operation) -> Result<ResolvedChain, CallbackError> {
        {
            let chain = self.chain_lock(operation).read().expect(LOCK_POISONED);
            if let Some(cached) = &chain.cached {
                return Ok(cached.clone());
            }
        }
        self.chain_lock(operation).write().expect(LOCK_POISONED).resolve()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain access with pending before/after constraints, consumed by a
/// register/replace/remove call
pub struct ChainBuilder<'a> {
    registry: &'a CallbackRegistry,
    operation: Operation,
    before: Vec<String>,
    after: Vec<String>,
}

impl<'a> ChainBuilder<'a> {
    /// Constrain the hook being registered to run before the named peer.
    /// The peer may be registered later; unresolved names stay inert.
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Constrain the hook being registered to run after the named peer
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    /// Add a hook under a unique name
    pub fn register(
        self,
        name: impl Into<String>,
        callback: impl Callback + 'static,
    ) -> Result<(), CallbackError> {
        self.registry.chain_lock(self.operation).write().expect(LOCK_POISONED).register(
            name.into(),
            Arc::new(callback),
            self.before,
            self.after,
        )
    }

    /// Substitute the function body of an existing hook, preserving its
    /// registration position and ordering constraints
    pub fn replace(
        self,
        name: &str,
        callback: impl Callback + 'static,
    ) -> Result<(), CallbackError> {
        self.registry
            .chain_lock(self.operation)
            .write()
            .expect(LOCK_POISONED)
            .replace(name, Arc::new(callback))
    }

    /// Delete a named hook and every constraint referencing it
    pub fn remove(self, name: &str) -> Result<(), CallbackError> {
        self.registry.remove(self.operation, name)
    }
}
