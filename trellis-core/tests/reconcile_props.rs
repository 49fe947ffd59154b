//! Property-based tests for the reconciler
//!
//! Random pairs of trees are created and patched against the in-memory
//! backend. Whatever the old tree was, the patched output must match a fresh
//! render of the new tree, and attribute diffs must touch only the keys
//! that differ.

use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;

use trellis_core::reactive::Value;
use trellis_core::render::{h, text, Backend, MemoryBackend, Op, Reconciler, VNode};
use trellis_core::AppOptions;

// =============================================================================
// Helper Functions
// =============================================================================

fn element(attrs: &BTreeMap<String, i64>) -> VNode {
    attrs
        .iter()
        .fold(h("div"), |node, (key, value)| node.prop(key.clone(), Value::from(*value)))
}

fn list(items: &[Option<(bool, String)>]) -> VNode {
    h("ul").children(items.iter().map(|item| {
        item.as_ref().map(|(is_text, label)| {
            if *is_text {
                text(label.as_str())
            } else {
                h("li").child(label.as_str())
            }
        })
    }))
}

fn fresh_html(vnode: VNode) -> String {
    let backend = Rc::new(MemoryBackend::new());
    let root = backend.create_root();
    let mut reconciler = Reconciler::new(backend.clone(), AppOptions::default());
    let mut vnode = vnode;
    let node = reconciler.create(&mut vnode);
    backend.append_child(root, node);
    backend.to_html(root)
}

fn attrs_strategy() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[a-e]", 0i64..3, 0..5)
}

fn items_strategy() -> impl Strategy<Value = Vec<Option<(bool, String)>>> {
    prop::collection::vec(prop::option::of((any::<bool>(), "[xyz]{1,2}")), 0..6)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_attribute_diff_is_minimal(old in attrs_strategy(), new in attrs_strategy()) {
        let backend = Rc::new(MemoryBackend::new());
        let root = backend.create_root();
        let mut reconciler = Reconciler::new(backend.clone(), AppOptions::default());
        let mut mounted = element(&old);
        let node = reconciler.create(&mut mounted);
        backend.append_child(root, node);
        backend.take_ops();

        let _patched = reconciler.patch(mounted, element(&new));
        let ops = backend.take_ops();

        let removed = old.keys().filter(|k| !new.contains_key(*k)).count();
        let written = new.iter().filter(|(k, v)| old.get(*k) != Some(*v)).count();
        prop_assert_eq!(ops.len(), removed + written);
        prop_assert!(ops.iter().all(|op| matches!(op, Op::SetAttribute { .. } | Op::RemoveAttribute { .. })), "patch emitted a non-attribute op");

        for (key, value) in &new {
            prop_assert_eq!(backend.attribute(node, key), Some(value.to_string()));
        }
        for key in old.keys().filter(|k| !new.contains_key(*k)) {
            prop_assert_eq!(backend.attribute(node, key), None);
        }
    }

    #[test]
    fn prop_patched_children_match_a_fresh_render(old in items_strategy(), new in items_strategy()) {
        let backend = Rc::new(MemoryBackend::new());
        let root = backend.create_root();
        let mut reconciler = Reconciler::new(backend.clone(), AppOptions::default());
        let mut mounted = list(&old);
        let node = reconciler.create(&mut mounted);
        backend.append_child(root, node);

        let patched = reconciler.patch(mounted, list(&new));
        prop_assert_eq!(backend.to_html(root), fresh_html(list(&new)));
        prop_assert_eq!(patched.children.len(), new.len());
        prop_assert_eq!(patched.node(), Some(node));
    }

    #[test]
    fn prop_patching_twice_is_stable(items in items_strategy()) {
        let backend = Rc::new(MemoryBackend::new());
        let root = backend.create_root();
        let mut reconciler = Reconciler::new(backend.clone(), AppOptions::default());
        let mut mounted = list(&items);
        let node = reconciler.create(&mut mounted);
        backend.append_child(root, node);
        backend.take_ops();

        let _patched = reconciler.patch(mounted, list(&items));
        prop_assert!(backend.take_ops().is_empty());
    }
}
