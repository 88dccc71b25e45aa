//! Integration tests: drag gestures → snap → layout → history.

use fb_core::events::GraphEvent;
use fb_core::id::BlockId;
use fb_core::model::Point;
use fb_core::snap::SnapTarget;
use fb_editor::canvas::{DropOutcome, FlowCanvas, InputResponse};
use fb_editor::input::InputEvent;
use pretty_assertions::assert_eq;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn attached(outcome: DropOutcome) -> BlockId {
    match outcome {
        DropOutcome::Attached { id, .. } => id,
        other => panic!("expected an attach, got {other:?}"),
    }
}

/// A at (100,100) with children B and C.
fn abc(canvas: &mut FlowCanvas) -> (BlockId, BlockId, BlockId) {
    let a = canvas.add_root("action", Point::new(100.0, 100.0)).unwrap().id;
    let b = attached(canvas.drop_template("action", Point::new(120.0, 260.0)).unwrap());
    let c = attached(canvas.drop_template("action", Point::new(150.0, 190.0)).unwrap());
    (a, b, c)
}

fn x(canvas: &FlowCanvas, id: BlockId) -> f32 {
    canvas.block(id).unwrap().position.x
}

// ─── Scenario ────────────────────────────────────────────────────────────

#[test]
fn build_center_and_delete() {
    init_logs();
    let mut canvas = FlowCanvas::default();
    let row_height = canvas.config().layout.row_height;

    let a = canvas.add_root("action", Point::new(100.0, 100.0)).unwrap().id;
    let outcome = canvas.drop_template("action", Point::new(120.0, 260.0)).unwrap();
    assert_eq!(outcome, DropOutcome::Attached { id: BlockId(2), parent: a });
    let b = BlockId(2);
    assert_eq!(canvas.block(b).unwrap().parent, Some(a));
    assert_eq!(
        canvas.block(b).unwrap().position.y,
        canvas.block(a).unwrap().position.y + row_height
    );

    // Inside A's zone, above B's.
    let c = attached(canvas.drop_template("action", Point::new(150.0, 270.0)).unwrap());
    assert_eq!(canvas.block(c).unwrap().parent, Some(a));
    assert_eq!(x(&canvas, a), (x(&canvas, b) + x(&canvas, c)) / 2.0);
    assert_eq!(canvas.arrows().len(), 2);

    let removed = canvas.delete_blocks(&[a]).unwrap();
    assert_eq!(removed.len(), 3);
    assert!(canvas.graph().is_empty());
    assert!(canvas.arrows().is_empty());
}

// ─── Existing blocks ─────────────────────────────────────────────────────

#[test]
fn re_dragging_a_child_under_its_sibling() {
    let mut canvas = FlowCanvas::default();
    let (a, b, c) = abc(&mut canvas);

    // B sits at (-20, 260); its zone starts at y = 340.
    let target = canvas.drag_existing_block(c, Point::new(-20.0, 360.0)).unwrap();
    assert_eq!(target, SnapTarget::Child { parent: b, index: 0 });

    let outcome = canvas.commit_drag(c, Point::new(-20.0, 360.0)).unwrap();
    assert_eq!(outcome, DropOutcome::Attached { id: c, parent: b });
    assert_eq!(canvas.block(a).unwrap().children.as_slice(), &[b]);
    assert_eq!(canvas.block(c).unwrap().position, Point::new(100.0, 420.0));

    canvas.undo().unwrap();
    assert_eq!(canvas.block(a).unwrap().children.as_slice(), &[b, c]);
    assert_eq!(canvas.block(c).unwrap().position, Point::new(220.0, 260.0));
    assert_eq!(canvas.arrows().get(c).unwrap().from_id, a);
}

#[test]
fn dragging_a_child_to_empty_space_detaches_it() {
    let mut canvas = FlowCanvas::default();
    let (a, b, _c) = abc(&mut canvas);

    let at = Point::new(1500.0, 900.0);
    assert_eq!(canvas.commit_drag(b, at).unwrap(), DropOutcome::NewRoot { id: b, at });
    assert!(canvas.block(b).unwrap().is_root());
    assert_eq!(canvas.block(b).unwrap().position, at);
    assert_eq!(canvas.graph().root_ids(), &[a, b]);
    assert!(canvas.arrows().get(b).is_none());
}

#[test]
fn a_block_cannot_snap_into_its_own_subtree() {
    let mut canvas = FlowCanvas::default();
    let (a, b, c) = abc(&mut canvas);

    // Right below B: B is excluded along with the rest of A's tree.
    let at = Point::new(-20.0, 360.0);
    assert_eq!(
        canvas.drag_existing_block(a, at).unwrap(),
        SnapTarget::Root { at: Point::new(-20.0, 360.0) }
    );
    // Outside the canvas with no target: nothing happens.
    assert_eq!(canvas.commit_drag(a, at).unwrap(), DropOutcome::Cancelled);

    // Moving the root drags its whole tree along.
    let to = Point::new(600.0, 400.0);
    assert_eq!(canvas.commit_drag(a, to).unwrap(), DropOutcome::NewRoot { id: a, at: to });
    assert_eq!(canvas.block(b).unwrap().position.y, 560.0);
    assert_eq!(x(&canvas, a), (x(&canvas, b) + x(&canvas, c)) / 2.0);
    canvas.graph().check_invariants().unwrap();
}

#[test]
fn re_dropping_the_last_child_in_place_is_a_no_op() {
    let mut canvas = FlowCanvas::default();
    let (_a, _b, c) = abc(&mut canvas);
    let depth = canvas.history().len();
    assert_eq!(
        canvas.commit_drag(c, Point::new(150.0, 190.0)).unwrap(),
        DropOutcome::Unchanged { id: c }
    );
    assert_eq!(canvas.history().len(), depth);
}

#[test]
fn separate_trees_are_kept_apart() {
    let mut canvas = FlowCanvas::default();
    let a = canvas.add_root("action", Point::new(100.0, 100.0)).unwrap().id;
    let d = canvas.add_root("action", Point::new(400.0, 100.0)).unwrap().id;

    let b = canvas.drop_template("action", Point::new(120.0, 260.0)).unwrap();
    assert_eq!(canvas.block(attached(b)).unwrap().parent, Some(a));
    // A's second child widens its band to [-20, 420]; D moves out of the way.
    let c = canvas.drop_template("action", Point::new(150.0, 270.0)).unwrap();
    assert_eq!(canvas.block(attached(c)).unwrap().parent, Some(a));
    assert_eq!(canvas.block(d).unwrap().position, Point::new(460.0, 100.0));

    let e = canvas.drop_template("action", Point::new(470.0, 260.0)).unwrap();
    assert_eq!(canvas.block(attached(e)).unwrap().parent, Some(d));

    // A root dropped right on top of A lands after both trees.
    let f = canvas.add_root("action", Point::new(100.0, 100.0)).unwrap();
    assert_eq!(f.position, Point::new(700.0, 100.0));

    let blocks = canvas.graph().iter_preorder();
    for (i, left) in blocks.iter().enumerate() {
        for right in &blocks[i + 1..] {
            let same_tree = canvas.graph().root_of(left.id).unwrap()
                == canvas.graph().root_of(right.id).unwrap();
            assert!(
                same_tree || !left.bounds().intersects(&right.bounds()),
                "{} overlaps {}",
                left.id,
                right.id
            );
        }
    }

    // Undoing the widening drop puts D back where it was dropped.
    canvas.undo().unwrap();
    canvas.undo().unwrap();
    canvas.undo().unwrap();
    assert_eq!(canvas.block(d).unwrap().position, Point::new(400.0, 100.0));
}

// ─── Input events ────────────────────────────────────────────────────────

#[test]
fn preview_leaves_a_gap_for_the_dragged_block() {
    let mut canvas = FlowCanvas::default();
    let (a, b, c) = abc(&mut canvas);
    let before = canvas.export().unwrap();

    assert_eq!(canvas.handle_input(&InputEvent::start_block(b)).unwrap(), InputResponse::Started);
    let response = canvas
        .handle_input(&InputEvent::DragMove { point: Point::new(900.0, 900.0) })
        .unwrap();
    let InputResponse::Preview { preview } = response else {
        panic!("expected a preview, got {response:?}");
    };
    assert!(!preview.positions.contains_key(&b));
    // C alone is centered under A.
    assert_eq!(preview.positions[&c].x, x(&canvas, a));
    // The store itself is untouched while dragging.
    assert_eq!(canvas.export().unwrap(), before);

    assert_eq!(canvas.handle_input(&InputEvent::DragCancel).unwrap(), InputResponse::Cancelled);
    assert_eq!(canvas.export().unwrap(), before);
    assert!(canvas.active_drag().is_none());
}

#[test]
fn template_gesture_creates_a_child() {
    let mut canvas = FlowCanvas::default();
    let a = canvas.add_root("action", Point::new(100.0, 100.0)).unwrap().id;

    canvas.handle_input(&InputEvent::start_template("condition")).unwrap();
    let response = canvas
        .handle_input(&InputEvent::DragEnd { point: Point::new(120.0, 260.0) })
        .unwrap();
    let InputResponse::Dropped { outcome } = response else {
        panic!("expected a drop, got {response:?}");
    };
    let id = attached(outcome);
    assert_eq!(canvas.block(id).unwrap().template.as_str(), "condition");
    assert_eq!(canvas.block(id).unwrap().parent, Some(a));
}

#[test]
fn dragging_an_unknown_block_is_rejected() {
    let mut canvas = FlowCanvas::default();
    assert!(canvas.handle_input(&InputEvent::start_block(BlockId(42))).is_err());
    assert!(canvas.active_drag().is_none());
    assert_eq!(
        canvas
            .handle_input(&InputEvent::DragEnd { point: Point::ORIGIN })
            .unwrap(),
        InputResponse::Ignored
    );
}

#[test]
fn detaching_emits_connection_remove() {
    let mut canvas = FlowCanvas::default();
    let (a, b, _c) = abc(&mut canvas);

    struct Sink(std::rc::Rc<std::cell::RefCell<Vec<GraphEvent>>>);
    impl fb_editor::canvas::CanvasObserver for Sink {
        fn on_events(&mut self, events: &[GraphEvent]) {
            self.0.borrow_mut().extend_from_slice(events);
        }
    }
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    canvas.add_observer(Box::new(Sink(seen.clone())));

    canvas.commit_drag(b, Point::new(1500.0, 900.0)).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![GraphEvent::ConnectionRemoved { from_id: a, to_id: b }]
    );
}
