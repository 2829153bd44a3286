//! Integration tests for the component tree: attach rules, routing, hooks and pub/sub.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bouncebox_engine::{callback, handler, BusError, Callback, Component, HookRegistry};
use bouncebox_events::{BaseEvent, Event, EventKind, EventRef, EventSeries, END_EVENT, EVENT};

static PRICE: EventKind = EventKind::new("Price", Some(&EVENT));
static BID: EventKind = EventKind::new("Bid", Some(&PRICE));

fn counter() -> (Rc<Cell<usize>>, Callback) {
    let count = Rc::new(Cell::new(0));
    let hits = count.clone();
    (
        count,
        callback(move |_| {
            hits.set(hits.get() + 1);
            Ok(())
        }),
    )
}

fn listening(name: &str) -> (Component, Rc<Cell<usize>>) {
    let (hits, cb) = counter();
    let component = Component::builder(name).listen(&EVENT, cb).build();
    (component, hits)
}

fn event() -> EventRef {
    BaseEvent::new(&EVENT).into_ref()
}

// ---------------------------------------------------------------------------
// Attach rules
// ---------------------------------------------------------------------------

#[test]
fn populated_subtree_is_rejected() {
    let root = Component::new("Root");
    let branch = Component::new("Branch");
    branch.add_component(&Component::new("Leaf")).unwrap();

    let err = root.add_component(&branch).unwrap_err();
    assert!(matches!(err, BusError::PopulatedSubtree { children: 1, .. }));
    assert!(root.components().is_empty());
    assert!(!branch.is_attached());
}

#[test]
fn double_attach_is_rejected() {
    let first = Component::new("First");
    let second = Component::new("Second");
    let child = Component::new("Child");

    first.add_component(&child).unwrap();
    let err = second.add_contained(&child).unwrap_err();

    assert!(matches!(err, BusError::AlreadyAttached(ref id) if id == child.id()));
    assert!(child.parent().unwrap().same(&first));
    assert!(second.components().is_empty());
}

#[test]
fn failed_hook_leaves_child_attached_and_wired() {
    let parent = Component::builder("Parent")
        .hook(|_: &Component, _: &Component| -> bouncebox_engine::Result<()> {
            Err(BusError::Config("hook refused".into()))
        })
        .build();
    let (hits, on_event) = counter();
    let (ends, on_end) = counter();
    let child = Component::builder("Child")
        .listen(&PRICE, on_event)
        .on_end(on_end)
        .build();

    let err = parent.add_component(&child).unwrap_err();
    assert!(matches!(err, BusError::Config(_)));
    assert!(child.is_attached());
    assert_eq!(parent.components().len(), 1);

    parent.broadcast(BaseEvent::new(&PRICE).into_ref()).unwrap();
    parent.broadcast(BaseEvent::new(&END_EVENT).into_ref()).unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(ends.get(), 1);

    assert!(matches!(
        parent.add_component(&child),
        Err(BusError::AlreadyAttached(_))
    ));
}

#[test]
fn children_keep_attach_order() {
    let root = Component::new("Root");
    let a = Component::new("A");
    let b = Component::new("B");
    root.add_component(&a).unwrap();
    root.add_contained(&b).unwrap();

    let names: Vec<_> = root.components().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(!a.is_contained());
    assert!(b.is_contained());
}

// ---------------------------------------------------------------------------
// Front resolution
// ---------------------------------------------------------------------------

#[test]
fn shared_child_binds_on_the_front_router() {
    let root = Component::new("Root");
    let branch = Component::new("Branch");
    root.add_component(&branch).unwrap();

    let (shared, shared_hits) = listening("Shared");
    branch.add_component(&shared).unwrap();

    assert!(shared.front().unwrap().same(&root));
    assert!(shared.controlling_router().same(root.router()));

    root.router().send(event()).unwrap();
    assert_eq!(shared_hits.get(), 1);

    branch.router().send(event()).unwrap();
    assert_eq!(shared_hits.get(), 1);
}

#[test]
fn contained_child_binds_on_the_parent_router() {
    let root = Component::new("Root");
    let branch = Component::new("Branch");
    root.add_component(&branch).unwrap();

    let (contained, contained_hits) = listening("Contained");
    branch.add_contained(&contained).unwrap();

    assert!(contained.front().unwrap().same(&branch));
    assert!(contained.controlling_router().same(branch.router()));

    root.router().send(event()).unwrap();
    assert_eq!(contained_hits.get(), 0);

    branch.router().send(event()).unwrap();
    assert_eq!(contained_hits.get(), 1);
}

#[test]
fn contained_broadcast_stays_under_its_parent() {
    let root = Component::new("Root");
    let (watcher, watcher_hits) = listening("Watcher");
    let branch = Component::new("Branch");
    root.add_component(&watcher).unwrap();
    root.add_component(&branch).unwrap();

    let speaker = Component::new("Speaker");
    let (sibling, sibling_hits) = listening("Sibling");
    branch.add_contained(&speaker).unwrap();
    branch.add_contained(&sibling).unwrap();

    speaker.broadcast(event()).unwrap();
    assert_eq!(sibling_hits.get(), 1);
    assert_eq!(watcher_hits.get(), 0);
}

#[test]
fn grandchild_of_contained_child_shares_its_scope() {
    let root = Component::new("Root");
    let scope = Component::new("Scope");
    let inner = Component::new("Inner");
    root.add_component(&scope).unwrap();
    scope.add_contained(&inner).unwrap();

    let (leaf, leaf_hits) = listening("Leaf");
    inner.add_component(&leaf).unwrap();

    assert!(leaf.front().unwrap().same(&scope));
    leaf.broadcast(event()).unwrap();
    assert_eq!(leaf_hits.get(), 1);
    assert_eq!(root.router().event_dispatcher().bindings().len(), 0);
}

#[test]
fn broadcast_reaches_siblings_through_the_front() {
    let root = Component::new("Root");
    let speaker = Component::new("Speaker");
    let (listener, hits) = listening("Listener");
    root.add_component(&speaker).unwrap();
    root.add_component(&listener).unwrap();

    speaker.broadcast(event()).unwrap();
    assert_eq!(hits.get(), 1);
}

// ---------------------------------------------------------------------------
// Listeners and hooks
// ---------------------------------------------------------------------------

#[test]
fn runtime_listeners_added_before_attach_are_bound() {
    let root = Component::new("Root");
    let child = Component::new("Child");
    let (hits, cb) = counter();
    let (series_hits, series_cb) = counter();
    child.add_event_listener(&PRICE, cb);
    child.add_series_binding(BID.class_series(), series_cb);
    root.add_component(&child).unwrap();

    root.broadcast(BaseEvent::new(&BID).into_ref()).unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(series_hits.get(), 1);
}

#[test]
fn method_handlers_bind_through_weak_references() {
    struct Tally {
        prices: Cell<usize>,
    }

    impl Tally {
        fn on_price(&self, _event: &EventRef) -> anyhow::Result<()> {
            self.prices.set(self.prices.get() + 1);
            Ok(())
        }
    }

    let tally = Rc::new(Tally { prices: Cell::new(0) });
    let root = Component::new("Root");
    let child = Component::builder("Tally")
        .listen(&PRICE, handler(&tally, Tally::on_price))
        .build();
    root.add_component(&child).unwrap();

    root.broadcast(BaseEvent::new(&PRICE).into_ref()).unwrap();
    root.broadcast(BaseEvent::new(&EVENT).into_ref()).unwrap();
    assert_eq!(tally.prices.get(), 1);
}

#[test]
fn instance_hooks_fire_before_registry_hooks() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let registry = HookRegistry::new();

    let log = order.clone();
    registry.add(move |_: &Component, child: &Component| -> bouncebox_engine::Result<()> {
        log.borrow_mut().push(format!("registry:{}", child.name()));
        Ok(())
    });

    let log = order.clone();
    let parent = Component::builder("Parent")
        .registry(registry.clone())
        .hook(move |_: &Component, child: &Component| -> bouncebox_engine::Result<()> {
            log.borrow_mut().push(format!("instance:{}", child.name()));
            Ok(())
        })
        .build();

    parent.add_component(&Component::new("Child")).unwrap();
    assert_eq!(*order.borrow(), vec!["instance:Child", "registry:Child"]);
}

#[test]
fn registry_is_shared_across_components() {
    let registry = HookRegistry::new();
    let attaches = Rc::new(Cell::new(0));
    let count = attaches.clone();
    registry.add(move |_: &Component, _: &Component| -> bouncebox_engine::Result<()> {
        count.set(count.get() + 1);
        Ok(())
    });

    let left = Component::builder("Left").registry(registry.clone()).build();
    let right = Component::builder("Right").registry(registry.clone()).build();
    let plain = Component::new("Plain");

    left.add_component(&Component::new("A")).unwrap();
    right.add_component(&Component::new("B")).unwrap();
    plain.add_component(&Component::new("C")).unwrap();

    assert_eq!(attaches.get(), 2);
    assert_eq!(registry.len(), 1);
}

#[test]
fn end_handler_is_bound_on_attach() {
    let root = Component::new("Root");
    let (ends, on_end) = counter();
    let child = Component::builder("Child").on_end(on_end).build();
    root.add_component(&child).unwrap();

    root.broadcast(BaseEvent::new(&PRICE).into_ref()).unwrap();
    assert_eq!(ends.get(), 0);
    root.broadcast(BaseEvent::new(&END_EVENT).into_ref()).unwrap();
    assert_eq!(ends.get(), 1);
}

#[test]
fn component_bind_targets_its_own_router() {
    let comp = Component::new("Comp");
    let (hits, cb) = counter();
    let series = EventSeries::builder().label("ticks").build();
    comp.bind(&series, cb, "series").unwrap();

    assert_eq!(comp.router().series_dispatcher().registered(series.id()).len(), 1);
    assert!(matches!(
        comp.bind(&EVENT, callback(|_| Ok(())), "series"),
        Err(BusError::ExchangeMismatch { .. })
    ));
    assert_eq!(hits.get(), 0);
}

// ---------------------------------------------------------------------------
// Pub/sub and broadcast log
// ---------------------------------------------------------------------------

#[test]
fn subscribers_filter_by_kind_hierarchy() {
    let comp = Component::new("Publisher");
    let (all, on_all) = counter();
    let (prices, on_price) = counter();
    comp.subscribe(on_all, None);
    comp.subscribe(on_price, Some(&PRICE));

    comp.publish(&BaseEvent::new(&BID).into_ref()).unwrap();
    comp.publish(&event()).unwrap();

    assert_eq!(all.get(), 2);
    assert_eq!(prices.get(), 1);
}

#[test]
fn publish_does_not_touch_the_router() {
    let comp = Component::new("Publisher");
    comp.router().start_logging();
    let (hits, cb) = counter();
    comp.subscribe(cb, None);

    comp.publish(&event()).unwrap();
    assert_eq!(hits.get(), 1);
    assert!(comp.router().logs().is_empty());

    comp.broadcast(event()).unwrap();
    assert_eq!(hits.get(), 2);
    assert_eq!(comp.router().logs().len(), 1);
}

#[test]
fn broadcast_log_records_in_order() {
    let comp = Component::builder("Logged").log_broadcasts(true).build();
    let first = event();
    let second = BaseEvent::new(&PRICE).into_ref();
    comp.broadcast(first.clone()).unwrap();
    comp.broadcast(second.clone()).unwrap();

    let log = comp.broadcast_log();
    assert_eq!(log.len(), 2);
    assert!(std::sync::Arc::ptr_eq(&log[0], &first));
    assert!(std::sync::Arc::ptr_eq(&log[1], &second));
}

// ---------------------------------------------------------------------------
// Internal router
// ---------------------------------------------------------------------------

#[test]
fn handle_event_runs_only_own_callbacks() {
    let root = Component::new("Root");
    let (sibling, sibling_hits) = listening("Sibling");
    let (comp, comp_hits) = listening("Comp");
    root.add_component(&sibling).unwrap();
    root.add_component(&comp).unwrap();

    comp.handle_event(event()).unwrap();
    assert_eq!(comp_hits.get(), 1);
    assert_eq!(sibling_hits.get(), 0);
}

#[test]
fn internal_router_is_built_once() {
    let (comp, hits) = listening("Comp");
    let first = comp.internal_router();
    let second = comp.internal_router();
    assert!(first.same(&second));
    assert!(!first.same(comp.router()));

    comp.handle_event(event()).unwrap();
    comp.handle_event(event()).unwrap();
    assert_eq!(hits.get(), 2);
}

#[test]
fn weak_component_broadcasts_from_a_callback() {
    let root = Component::new("Root");
    let relay = Component::new("Relay");
    let me = relay.downgrade();
    relay.add_event_listener(
        &PRICE,
        callback(move |_| {
            if let Some(me) = me.upgrade() {
                me.broadcast(BaseEvent::new(&END_EVENT).into_ref())?;
            }
            Ok(())
        }),
    );
    let (ends, on_end) = counter();
    let sink = Component::builder("Sink").on_end(on_end).build();
    root.add_component(&relay).unwrap();
    root.add_component(&sink).unwrap();

    root.broadcast(BaseEvent::new(&PRICE).into_ref()).unwrap();
    assert_eq!(ends.get(), 1);
}
