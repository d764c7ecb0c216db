use crate::scope::Scope;

/// Entity lifecycle points dispatched through `Scope::call_method`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleMethod {
    BeforeSave,
    BeforeCreate,
    AfterCreate,
    AfterSave,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterQuery,
}

/// Optional entity-level lifecycle methods.
///
/// Every method defaults to a no-op; an entity participates in a lifecycle
/// point by overriding the matching method. Methods signal failure by
/// recording an error on the scope, which short-circuits the rest of the
/// operation.
pub trait ModelEvents: Send {
    fn before_save(&mut self, _scope: &mut Scope) {}
    fn after_save(&mut self, _scope: &mut Scope) {}
    fn before_create(&mut self, _scope: &mut Scope) {}
    fn after_create(&mut self, _scope: &mut Scope) {}
    fn before_update(&mut self, _scope: &mut Scope) {}
    fn after_update(&mut self, _scope: &mut Scope) {}
    fn before_delete(&mut self, _scope: &mut Scope) {}
    fn after_delete(&mut self, _scope: &mut Scope) {}
    fn after_query(&mut self, _scope: &mut Scope) {}
}
