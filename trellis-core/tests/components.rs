//! Integration Tests for Components
//!
//! These tests mount component trees into the in-memory backend and check
//! rendering, reactive updates and the lifecycle end to end.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::error::{BoxError, Error};
use trellis_core::reactive::{Reactive, Value};
use trellis_core::render::{h, Component, Context, LifecycleState, MemoryBackend, NodeId, VNode};
use trellis_core::scheduler::Deferred;
use trellis_core::{create_app, flush_microtasks, App, AppOptions};

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static GATE: RefCell<Option<Deferred>> = const { RefCell::new(None) };
    static FLAKY: Cell<bool> = const { Cell::new(false) };
}

fn log(entry: impl Into<String>) {
    LOG.with(|l| l.borrow_mut().push(entry.into()));
}

fn take_log() -> Vec<String> {
    LOG.with(|l| std::mem::take(&mut *l.borrow_mut()))
}

fn state_of(ctx: &Context) -> Result<Reactive, BoxError> {
    ctx.prop("state")
        .as_reactive()
        .cloned()
        .ok_or_else(|| "missing state prop".into())
}

fn app(ssr: bool) -> (Rc<MemoryBackend>, NodeId, App) {
    let backend = Rc::new(MemoryBackend::new());
    let root = backend.create_root();
    let app = create_app(backend.clone(), root, AppOptions { ssr });
    (backend, root, app)
}

struct Counter;

impl Component for Counter {
    fn setup(_ctx: &Context) -> Self {
        Counter
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        let state = state_of(ctx)?;
        let count = state.get("count").as_i64().unwrap_or(0);
        Ok(h("button")
            .prop("class", "counter")
            .on("click", move |_| {
                state.set("count", count + 1);
            })
            .child(count.to_string()))
    }
}

#[test]
fn clicks_re_render_the_counter() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("count", Value::from(0))]);
    app.render::<Counter, _, _>([("state", Value::from(&state))]).unwrap();
    assert_eq!(backend.to_html(root), r#"<button class="counter">0</button>"#);

    let button = backend.children(root)[0];
    backend.dispatch(button, "click", &Value::Null);
    flush_microtasks();
    assert_eq!(backend.to_html(root), r#"<button class="counter">1</button>"#);

    // the same element is patched, not recreated
    assert_eq!(backend.children(root), vec![button]);
    backend.dispatch(button, "click", &Value::Null);
    flush_microtasks();
    assert_eq!(state.get("count"), Value::from(2));
}

struct Label;

impl Component for Label {
    fn setup(_ctx: &Context) -> Self {
        Label
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        log("label");
        Ok(h("span").child(ctx.prop("text").to_string()))
    }
}

struct Panel;

impl Component for Panel {
    fn setup(_ctx: &Context) -> Self {
        Panel
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        log("panel");
        let state = state_of(ctx)?;
        Ok(h("div")
            .child(VNode::component::<Label>().prop("text", state.get("title")))
            .child(state.get("other").to_string()))
    }
}

#[test]
fn children_re_render_only_when_their_props_change() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("title", Value::from("a")), ("other", Value::from(0))]);
    app.render::<Panel, _, _>([("state", Value::from(&state))]).unwrap();
    assert_eq!(backend.to_html(root), "<div><span>a</span>0</div>");
    assert_eq!(take_log(), vec!["panel", "label"]);

    state.set("other", 1);
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<div><span>a</span>1</div>");
    assert_eq!(take_log(), vec!["panel"]);

    state.set("title", "b");
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<div><span>b</span>1</div>");
    assert_eq!(take_log(), vec!["panel", "label"]);
}

struct Probe;

impl Component for Probe {
    fn setup(_ctx: &Context) -> Self {
        log("probe setup");
        Probe
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Ok(h("em").child("probe"))
    }

    fn mounted(&self, _ctx: &Context) {
        log("probe mounted");
    }

    fn before_unmount(&self, _ctx: &Context) {
        log("probe before_unmount");
    }

    fn unmounted(&self, _ctx: &Context) {
        log("probe unmounted");
    }
}

struct Toggle;

impl Component for Toggle {
    fn setup(_ctx: &Context) -> Self {
        Toggle
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        let state = state_of(ctx)?;
        let probe = (state.get("show") == Value::from(true)).then(VNode::component::<Probe>);
        Ok(h("div").optional_child(probe).child("end"))
    }

    fn mounted(&self, _ctx: &Context) {
        log("toggle mounted");
    }

    fn before_unmount(&self, _ctx: &Context) {
        log("toggle before_unmount");
    }

    fn unmounted(&self, _ctx: &Context) {
        log("toggle unmounted");
    }
}

#[test]
fn conditional_children_mount_and_unmount() {
    take_log();
    let (backend, root, app) = app(false);
    let state = Reactive::record([("show", Value::from(false))]);
    app.render::<Toggle, _, _>([("state", Value::from(&state))]).unwrap();
    assert_eq!(backend.to_html(root), "<div>end</div>");
    assert_eq!(take_log(), vec!["toggle mounted"]);

    state.set("show", true);
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<div><em>probe</em>end</div>");
    assert_eq!(take_log(), vec!["probe setup", "probe mounted"]);

    state.set("show", false);
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<div>end</div>");
    assert_eq!(take_log(), vec!["probe before_unmount", "probe unmounted"]);

    state.set("show", true);
    flush_microtasks();
    take_log();
    app.unmount();
    assert_eq!(backend.to_html(root), "");
    assert_eq!(
        take_log(),
        vec![
            "toggle before_unmount",
            "probe before_unmount",
            "probe unmounted",
            "toggle unmounted",
        ]
    );
}

struct Modal;

impl Component for Modal {
    fn setup(_ctx: &Context) -> Self {
        Modal
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Ok(h("dialog").child("hi"))
    }

    fn before_mount(&self, ctx: &Context) -> Option<NodeId> {
        log("before_mount");
        let raw = ctx.prop("target").as_i64()?;
        u64::try_from(raw).ok().map(NodeId::from_raw)
    }
}

#[test]
fn teleported_content_renders_into_the_target() {
    let (backend, root, app) = app(false);
    let target = backend.create_root();
    let renderer = app
        .render::<Modal, _, _>([("target", Value::from(target.raw() as i64))])
        .unwrap();

    assert!(renderer.is_teleported());
    assert_eq!(backend.to_html(root), "<!---->");
    assert_eq!(backend.to_html(target), "<dialog>hi</dialog>");

    app.unmount();
    assert_eq!(backend.to_html(root), "");
    assert_eq!(backend.to_html(target), "");
}

#[test]
fn server_side_rendering_skips_events_and_teleports() {
    let (backend, root, app) = app(true);
    let target = backend.create_root();
    take_log();
    let renderer = app
        .render::<Modal, _, _>([("target", Value::from(target.raw() as i64))])
        .unwrap();
    // the hook still runs; only its teleport target is ignored
    assert_eq!(take_log(), vec!["before_mount"]);
    assert!(!renderer.is_teleported());
    assert_eq!(backend.to_html(root), "<dialog>hi</dialog>");
    assert_eq!(backend.to_html(target), "");

    let (backend, root, app) = app_with_counter(true);
    let button = backend.children(root)[0];
    assert_eq!(backend.listener_count(button, "click"), 0);
    drop(app);
}

fn app_with_counter(ssr: bool) -> (Rc<MemoryBackend>, NodeId, App) {
    let (backend, root, app) = app(ssr);
    let state = Reactive::record([("count", Value::from(0))]);
    app.render::<Counter, _, _>([("state", Value::from(&state))]).unwrap();
    (backend, root, app)
}

struct Fading;

impl Component for Fading {
    fn setup(_ctx: &Context) -> Self {
        Fading
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Ok(h("p").child("bye"))
    }

    fn before_remove(&self, _ctx: &Context) -> Option<Deferred> {
        let gate = Deferred::new();
        GATE.with(|g| *g.borrow_mut() = Some(gate.clone()));
        Some(gate)
    }
}

#[test]
fn removal_waits_for_before_remove() {
    let (backend, root, app) = app(false);
    let renderer = app.mount::<Fading>().unwrap();

    app.unmount();
    assert_eq!(renderer.state(), LifecycleState::Unloaded);
    assert_eq!(backend.to_html(root), "<p>bye</p>");

    flush_microtasks();
    assert_eq!(backend.to_html(root), "<p>bye</p>");

    GATE.with(|g| g.borrow_mut().take()).unwrap().resolve();
    flush_microtasks();
    assert_eq!(backend.to_html(root), "");
}

struct Broken;

impl Component for Broken {
    fn setup(_ctx: &Context) -> Self {
        Broken
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Err("nope".into())
    }
}

struct Guarded;

impl Component for Guarded {
    fn setup(_ctx: &Context) -> Self {
        Guarded
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Err("nope".into())
    }

    fn on_error(&self, _ctx: &Context, error: &Error) -> Option<VNode> {
        log(error.to_string());
        Some(h("p").child("fallback"))
    }
}

struct Shell;

impl Component for Shell {
    fn setup(_ctx: &Context) -> Self {
        Shell
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        Ok(h("div").child(VNode::component::<Broken>()))
    }
}

#[test]
fn build_errors_propagate_unless_handled() {
    let (backend, root, app) = app(false);
    let result = app.mount::<Broken>();
    assert!(matches!(result, Err(Error::Build { component: "Broken", .. })));
    assert_eq!(backend.to_html(root), "");
    assert!(app.root().is_none());

    take_log();
    app.mount::<Guarded>().unwrap();
    assert_eq!(backend.to_html(root), "<p>fallback</p>");
    assert_eq!(take_log(), vec!["component `Guarded` failed to build"]);
}

#[test]
fn failed_children_leave_a_placeholder() {
    let (backend, root, app) = app(false);
    let result = app.mount::<Shell>();
    assert!(matches!(result, Err(Error::Build { component: "Broken", .. })));
    assert_eq!(backend.to_html(root), "<div><!----></div>");
    assert!(app.root().is_some());
}

#[test]
fn deactivated_components_catch_up_once() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("count", Value::from(0))]);
    let renderer = app.render::<Counter, _, _>([("state", Value::from(&state))]).unwrap();

    renderer.deactivate();
    assert_eq!(renderer.state(), LifecycleState::Deactivated);
    assert_eq!(backend.to_html(root), "<!---->");

    state.set("count", 4);
    flush_microtasks();
    state.set("count", 5);
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<!---->");

    renderer.activate();
    assert_eq!(renderer.state(), LifecycleState::Activated);
    assert_eq!(backend.to_html(root), r#"<button class="counter">5</button>"#);
}

struct Card;

impl Component for Card {
    fn setup(_ctx: &Context) -> Self {
        Card
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        Ok(h("section").children(ctx.children()))
    }
}

struct Page;

impl Component for Page {
    fn setup(_ctx: &Context) -> Self {
        Page
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        let state = state_of(ctx)?;
        Ok(VNode::component::<Card>().child(h("h1").child(state.get("title").to_string())))
    }
}

#[test]
fn slot_children_follow_the_parent() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("title", Value::from("one"))]);
    app.render::<Page, _, _>([("state", Value::from(&state))]).unwrap();
    assert_eq!(backend.to_html(root), "<section><h1>one</h1></section>");

    state.set("title", "two");
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<section><h1>two</h1></section>");
}

#[test]
fn forced_update_and_repeated_unmount() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("count", Value::from(0))]);
    let renderer = app.render::<Counter, _, _>([("state", Value::from(&state))]).unwrap();

    app.update().unwrap();
    assert_eq!(backend.to_html(root), r#"<button class="counter">0</button>"#);

    renderer.unmount();
    renderer.unmount();
    assert_eq!(renderer.state(), LifecycleState::Unloaded);
    assert_eq!(backend.to_html(root), "");
    // a dead root updates as a no-op
    renderer.update().unwrap();
}

struct Reader;

impl Component for Reader {
    fn setup(_ctx: &Context) -> Self {
        Reader
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        log("reader");
        let state = state_of(ctx)?;
        Ok(h("b").child(state.get("watched").to_string()))
    }
}

#[test]
fn rebuilds_follow_only_the_properties_read() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("watched", Value::from(0)), ("ignored", Value::from(0))]);
    let renderer = app.render::<Reader, _, _>([("state", Value::from(&state))]).unwrap();
    take_log();

    state.set("ignored", 1);
    flush_microtasks();
    assert!(take_log().is_empty());

    state.set("watched", 1);
    state.set("watched", 2);
    flush_microtasks();
    assert_eq!(take_log(), vec!["reader"]);
    assert_eq!(backend.to_html(root), "<b>2</b>");
    assert!(renderer.dependency_count() >= 2);
}

struct Flaky;

impl Component for Flaky {
    fn setup(_ctx: &Context) -> Self {
        Flaky
    }

    fn build(&self, _ctx: &Context) -> Result<VNode, BoxError> {
        if FLAKY.with(Cell::get) {
            panic!("flaky build");
        }
        Ok(h("i"))
    }

    fn on_error(&self, _ctx: &Context, error: &Error) -> Option<VNode> {
        log(error.to_string());
        None
    }
}

struct Host;

impl Component for Host {
    fn setup(_ctx: &Context) -> Self {
        Host
    }

    fn build(&self, ctx: &Context) -> Result<VNode, BoxError> {
        let n = state_of(ctx)?.get("n").as_i64().unwrap_or(0);
        Ok(h("div")
            .child(n.to_string())
            .optional_child((n != 0).then(VNode::component::<Flaky>)))
    }
}

#[test]
fn panicking_child_builds_do_not_detach_the_parent() {
    let (backend, root, app) = app(false);
    let state = Reactive::record([("n", Value::from(0))]);
    app.render::<Host, _, _>([("state", Value::from(&state))]).unwrap();
    assert_eq!(backend.to_html(root), "<div>0</div>");
    take_log();

    FLAKY.with(|f| f.set(true));
    state.set("n", 1);
    flush_microtasks();
    assert_eq!(take_log(), vec!["component `Flaky` failed to build"]);
    assert_eq!(backend.to_html(root), "<div>1<!----></div>");

    FLAKY.with(|f| f.set(false));
    state.set("n", 2);
    flush_microtasks();
    assert_eq!(backend.to_html(root), "<div>2<i></i></div>");
    assert_eq!(backend.children(root).len(), 1);
}
