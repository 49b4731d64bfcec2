//! Resources and the pool that tracks them. A resource bundles the items
//! cooperating around one editable element of the host page and relays
//! messages between them, the pool looks resources up by host page node
//! and fans extension messages out to them.

pub mod item;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use web_sys::Element;

use self::item::ResourceItem;
use crate::message::{Internal, Message, Respond};

/// Whether the compose application of a resource is injected.
/// The in-between loading phase is not modelled here, it is a property
/// of the button displaying it, not of the resource.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ResourceState {
    Close,
    Open,
}

/// The fixed set of roles a resource item can fill. Each resource holds
/// at most one item per role.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Controller,
    Target,
    Button,
    Tooltip,
    TtlSelect,
    App,
}

/// Opaque identifier distinguishing resources across a browser session,
/// unique even between content script instances in different frames.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

thread_local! {
    static ID_COUNT: Cell<u64> = const { Cell::new(0) };
}

impl ResourceId {
    /// Generates an identifier from entropy, the wall clock, and an
    /// instance counter. No single source is collision free on its own,
    /// frames share neither entropy state nor the counter.
    pub fn generate() -> Self {
        let count = ID_COUNT.with(|count| {
            let current = count.get();
            count.set(current.wrapping_add(1));
            current
        });
        let random = (js_sys::Math::random() * f64::from(u32::MAX)) as u64;
        let timestamp = js_sys::Date::now() as u64;
        Self(format!("{random:x}{timestamp:x}{count:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The items and shared state surrounding one editable element.
pub struct Resource {
    weak_self: Weak<Resource>,
    id: ResourceId,
    pool: Weak<ResourcePool>,
    state: Cell<ResourceState>,
    ttl: RefCell<Option<String>>,
    instances: RefCell<BTreeMap<Role, Rc<dyn ResourceItem>>>,
}

impl Resource {
    /// Creates a detached resource tied to the given pool.
    /// [Resource::attach] actually makes it discoverable.
    pub fn new(pool: &Rc<ResourcePool>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            id: ResourceId::generate(),
            pool: Rc::downgrade(pool),
            state: Cell::new(ResourceState::Close),
            ttl: RefCell::new(None),
            instances: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Registers the resource with its pool, a no-op if already attached.
    pub fn attach(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.insert(&self.strong_self());
        }
    }

    /// Removes the resource from its pool, a no-op if already detached.
    pub fn detach(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.remove(self);
        }
    }

    /// Fills a role with an item, attaching it to this resource.
    /// A previous occupant of the role is detached first.
    pub fn set_instance(&self, role: Role, item: Rc<dyn ResourceItem>) {
        let previous = self.instances.borrow_mut().insert(role, Rc::clone(&item));
        if let Some(previous) = previous {
            previous.detach_resource();
        }
        item.attach_resource(&self.strong_self());
    }

    pub fn instance(&self, role: Role) -> Option<Rc<dyn ResourceItem>> {
        self.instances.borrow().get(&role).cloned()
    }

    /// Removes and detaches the item keyed by the given host page node,
    /// returning whether one was found.
    pub fn remove_instance_by_node(&self, node: &Element) -> bool {
        let role = self
            .instances
            .borrow()
            .iter()
            .find(|(_, item)| item.node().as_ref() == Some(node))
            .map(|(role, _)| *role);
        let Some(role) = role else { return false };
        let removed = self.instances.borrow_mut().remove(&role);
        if let Some(removed) = removed {
            removed.detach_resource();
        }
        true
    }

    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    /// Records the state and notifies all items. The broadcast is not
    /// deduplicated, a repeated report re-runs the items' reactions.
    pub fn set_state(&self, state: ResourceState) {
        self.state.set(state);
        self.broadcast_internal(Internal::StateChanged { state });
    }

    /// The time-to-live selected for the next post, [None] for the
    /// application default.
    pub fn ttl(&self) -> Option<String> {
        self.ttl.borrow().clone()
    }

    pub fn set_ttl(&self, ttl: Option<String>) {
        *self.ttl.borrow_mut() = ttl;
    }

    /// Whether the editable element of the resource is still usable.
    /// Only the target item decides, injected nodes are recreated or
    /// re-appended as needed.
    pub fn is_valid(&self) -> bool {
        self.instance(Role::Target)
            .is_none_or(|target| target.is_valid())
    }

    /// Notifies items, detaches the resource from its pool, and releases
    /// all items. The resource is unusable afterwards.
    pub fn destroy(&self) {
        self.broadcast_internal(Internal::ResourceDestroyed);
        self.detach();
        let instances = std::mem::take(&mut *self.instances.borrow_mut());
        for item in instances.into_values() {
            Rc::clone(&item).detach_resource();
            item.destroy();
        }
    }

    /// Fans a message out to all items, returning whether any of them
    /// keeps the response channel open.
    pub fn on_message(&self, message: &Message, respond: Respond) -> bool {
        let mut keep_open = false;
        for item in self.snapshot() {
            keep_open |= item.on_message(message, &mut *respond);
        }
        keep_open
    }

    /// Broadcasts a message originating from within the resource,
    /// discarding responses.
    pub fn broadcast_internal(&self, message: Internal) {
        self.on_message(&Message::Internal(message), &mut |_| ());
    }

    // Items are snapshotted before fan-out, handlers may attach or
    // detach instances of the same resource while running.
    fn snapshot(&self) -> Vec<Rc<dyn ResourceItem>> {
        self.instances.borrow().values().cloned().collect()
    }

    fn strong_self(&self) -> Rc<Self> {
        self.weak_self
            .upgrade()
            .expect("resource methods are called through a strong reference")
    }
}

/// All resources of one content script instance.
#[derive(Default)]
pub struct ResourcePool {
    entries: RefCell<Vec<Rc<Resource>>>,
}

impl ResourcePool {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn insert(&self, resource: &Rc<Resource>) {
        if !self.contains(resource) {
            self.entries.borrow_mut().push(Rc::clone(resource));
        }
    }

    pub fn remove(&self, resource: &Resource) {
        self.entries
            .borrow_mut()
            .retain(|entry| !std::ptr::eq(Rc::as_ptr(entry), resource));
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| std::ptr::eq(Rc::as_ptr(entry), resource))
    }

    pub fn get_by_id(&self, id: &ResourceId) -> Option<Rc<Resource>> {
        self.entries
            .borrow()
            .iter()
            .find(|resource| resource.id() == id)
            .cloned()
    }

    /// Finds the resource whose item of the given role is keyed by the
    /// given host page node. A match that has gone invalid, usually by
    /// its node being removed from the document, is destroyed instead of
    /// returned.
    pub fn get_by_node(&self, role: Role, node: &Element) -> Option<Rc<Resource>> {
        let found = self.entries.borrow().iter().cloned().find(|resource| {
            resource
                .instance(role)
                .and_then(|item| item.node())
                .as_ref()
                == Some(node)
        })?;
        if !found.is_valid() {
            found.destroy();
            return None;
        }
        Some(found)
    }

    /// Relays a message to every resource, or to one resource when a
    /// target identifier is given. Returns whether any receiver keeps
    /// the response channel open.
    pub fn broadcast(
        &self,
        message: &Message,
        target: Option<&ResourceId>,
        respond: Respond,
    ) -> bool {
        if let Some(target) = target {
            let Some(resource) = self.get_by_id(target) else { return false };
            return resource.on_message(message, respond);
        }
        let snapshot: Vec<_> = self.entries.borrow().clone();
        let mut keep_open = false;
        for resource in snapshot {
            keep_open |= resource.on_message(message, &mut *respond);
        }
        keep_open
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::any::Any;
    use std::collections::HashSet;

    use strum::IntoEnumIterator;
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    #[derive(Default)]
    struct StubItem {
        attach_count: Cell<usize>,
        detach_count: Cell<usize>,
        destroy_count: Cell<usize>,
        keeps_channel_open: Cell<bool>,
        valid: Cell<bool>,
        node: Option<Element>,
        received: RefCell<Vec<Internal>>,
    }

    impl StubItem {
        fn new() -> Rc<Self> {
            let stub = Self::default();
            stub.valid.set(true);
            Rc::new(stub)
        }

        fn with_node(node: Element) -> Rc<Self> {
            let stub = Self { node: Some(node), ..Self::default() };
            stub.valid.set(true);
            Rc::new(stub)
        }
    }

    impl ResourceItem for StubItem {
        fn attach_resource(self: Rc<Self>, _resource: &Rc<Resource>) {
            self.attach_count.set(self.attach_count.get() + 1);
        }

        fn detach_resource(self: Rc<Self>) {
            self.detach_count.set(self.detach_count.get() + 1);
        }

        fn destroy(self: Rc<Self>) {
            self.destroy_count.set(self.destroy_count.get() + 1);
        }

        fn is_valid(&self) -> bool {
            self.valid.get()
        }

        fn node(&self) -> Option<Element> {
            self.node.clone()
        }

        fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
            if let Message::Internal(internal) = message {
                self.received.borrow_mut().push(internal.clone());
            }
            self.keeps_channel_open.get()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[wasm_bindgen_test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<_> = (0..10_000).map(|_| ResourceId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[wasm_bindgen_test]
    fn test_roles_display_distinctly() {
        let names: HashSet<_> = Role::iter().map(|role| role.to_string()).collect();
        assert_eq!(names.len(), Role::iter().count());
    }

    #[wasm_bindgen_test]
    fn test_attach_and_detach_are_idempotent() {
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        resource.attach();
        resource.attach();
        assert_eq!(pool.len(), 1);
        resource.detach();
        resource.detach();
        assert!(pool.is_empty());
        resource.attach();
        assert_eq!(pool.len(), 1);
    }

    #[wasm_bindgen_test]
    fn test_replaced_instance_is_detached_once() {
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let first = StubItem::new();
        let second = StubItem::new();
        resource.set_instance(Role::Button, Rc::clone(&first) as Rc<dyn ResourceItem>);
        resource.set_instance(Role::Button, Rc::clone(&second) as Rc<dyn ResourceItem>);
        assert_eq!(first.attach_count.get(), 1);
        assert_eq!(first.detach_count.get(), 1);
        assert_eq!(second.attach_count.get(), 1);
        assert_eq!(second.detach_count.get(), 0);
    }

    #[wasm_bindgen_test]
    fn test_message_fan_out_merges_channel_decisions() {
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let quiet = StubItem::new();
        let responsive = StubItem::new();
        resource.set_instance(Role::Button, Rc::clone(&quiet) as Rc<dyn ResourceItem>);
        resource.set_instance(Role::App, Rc::clone(&responsive) as Rc<dyn ResourceItem>);
        let message = Message::Internal(Internal::TargetActivated);
        assert!(!resource.on_message(&message, &mut |_| ()));
        responsive.keeps_channel_open.set(true);
        assert!(resource.on_message(&message, &mut |_| ()));
        assert_eq!(quiet.received.borrow().len(), 2);
        assert_eq!(responsive.received.borrow().len(), 2);
    }

    #[wasm_bindgen_test]
    fn test_set_state_broadcasts_every_call() {
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let stub = StubItem::new();
        resource.set_instance(Role::Button, Rc::clone(&stub) as Rc<dyn ResourceItem>);
        resource.set_state(ResourceState::Open);
        resource.set_state(ResourceState::Open);
        assert_eq!(resource.state(), ResourceState::Open);
        // a repeated report reaches the items again
        assert_eq!(
            *stub.received.borrow(),
            vec![
                Internal::StateChanged { state: ResourceState::Open },
                Internal::StateChanged { state: ResourceState::Open },
            ]
        );
    }

    #[wasm_bindgen_test]
    fn test_validity_follows_the_target_only() {
        let document = crate::util::document().unwrap();
        let node = document.create_element("textarea").unwrap();
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        resource.attach();
        let target = StubItem::with_node(node.clone());
        let button = StubItem::new();
        resource.set_instance(Role::Target, Rc::clone(&target) as Rc<dyn ResourceItem>);
        resource.set_instance(Role::Button, Rc::clone(&button) as Rc<dyn ResourceItem>);

        // a lost injected node must not take the resource down
        button.valid.set(false);
        assert!(resource.is_valid());
        assert!(pool.get_by_node(Role::Target, &node).is_some());
        assert_eq!(pool.len(), 1);

        target.valid.set(false);
        assert!(!resource.is_valid());
    }

    #[wasm_bindgen_test]
    fn test_remove_instance_by_node_detaches_the_item() {
        let document = crate::util::document().unwrap();
        let node = document.create_element("div").unwrap();
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let stub = StubItem::with_node(node.clone());
        resource.set_instance(Role::Button, Rc::clone(&stub) as Rc<dyn ResourceItem>);

        let other = document.create_element("div").unwrap();
        assert!(!resource.remove_instance_by_node(&other));
        assert!(resource.remove_instance_by_node(&node));
        assert_eq!(stub.detach_count.get(), 1);
        assert!(resource.instance(Role::Button).is_none());
    }

    #[wasm_bindgen_test]
    fn test_destroy_releases_items_and_pool_entry() {
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        resource.attach();
        let stub = StubItem::new();
        resource.set_instance(Role::Target, Rc::clone(&stub) as Rc<dyn ResourceItem>);
        resource.destroy();
        assert!(pool.is_empty());
        assert_eq!(stub.detach_count.get(), 1);
        assert_eq!(stub.destroy_count.get(), 1);
        assert_eq!(*stub.received.borrow(), vec![Internal::ResourceDestroyed]);
        assert!(resource.instance(Role::Target).is_none());
    }

    #[wasm_bindgen_test]
    fn test_invalid_lookup_hit_is_destroyed_lazily() {
        let document = crate::util::document().unwrap();
        let node = document.create_element("textarea").unwrap();
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        resource.attach();
        let stub = StubItem::with_node(node.clone());
        resource.set_instance(Role::Target, Rc::clone(&stub) as Rc<dyn ResourceItem>);

        assert!(pool.get_by_node(Role::Target, &node).is_some());
        stub.valid.set(false);
        assert!(pool.get_by_node(Role::Target, &node).is_none());
        assert!(pool.is_empty());
        assert_eq!(stub.destroy_count.get(), 1);
    }

    #[wasm_bindgen_test]
    fn test_pool_broadcast_honours_target_id() {
        let pool = ResourcePool::new();
        let addressed = Resource::new(&pool);
        let bystander = Resource::new(&pool);
        addressed.attach();
        bystander.attach();
        let heard = StubItem::new();
        let unheard = StubItem::new();
        addressed.set_instance(Role::Button, Rc::clone(&heard) as Rc<dyn ResourceItem>);
        bystander.set_instance(Role::Button, Rc::clone(&unheard) as Rc<dyn ResourceItem>);

        let message = Message::Internal(Internal::CloseRequested);
        pool.broadcast(&message, Some(addressed.id()), &mut |_| ());
        assert_eq!(heard.received.borrow().len(), 1);
        assert!(unheard.received.borrow().is_empty());

        pool.broadcast(&message, None, &mut |_| ());
        assert_eq!(heard.received.borrow().len(), 2);
        assert_eq!(unheard.received.borrow().len(), 1);
    }
}
