mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{driven_navigator, navigator, BookFixture};
use epub_stream_nav::cfi::{self, CfiStep, NodeLocation};
use epub_stream_nav::{
    Animation, Lookup, Manifest, ManifestItem, NavigateOutcome, NavigationDirection,
    NavigationRequest, Navigator, NavigatorError, ReaderSettings, SettingsError, TriggeredBy,
    UnsafePosition,
};

/// Three items of three, two and one pages on a 100x100 viewport.
fn book() -> BookFixture {
    BookFixture::paged(&[300.0, 200.0, 100.0], 100.0)
}

fn settings() -> ReaderSettings {
    ReaderSettings::for_viewport(100.0, 100.0)
}

fn x_of(navigator: &Navigator) -> f64 {
    navigator
        .current_record()
        .expect("current record")
        .position
        .x()
}

#[test]
fn spine_item_navigation_lands_on_item_origin() {
    let book = book();
    let (mut navigator, driver) = driven_navigator(&book, settings());

    let outcome = navigator.go_to_spine_item(1);
    let record = outcome.record().expect("published");
    assert_eq!(record.spine_item, 1);
    assert_eq!(record.position.x(), 300.0);
    assert_eq!(record.direction, NavigationDirection::Forward);
    assert_eq!(record.triggered_by(), TriggeredBy::User);
    assert_eq!(record.spine_item_left, Some(300.0));
    assert_eq!(record.spine_item_width, Some(200.0));

    let drive = driver.last().expect("viewport moved");
    assert_eq!((drive.x, drive.y), (300.0, 0.0));
    assert_eq!(drive.animation, Animation::Turn);
}

#[test]
fn unknown_item_id_falls_back_to_book_origin() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    navigator.go_to_spine_item("missing");
    assert_eq!(x_of(&navigator), 0.0);
    assert_eq!(navigator.current_record().expect("record").spine_item, 0);
}

#[test]
fn page_turns_cross_items_and_stop_at_the_ends() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    assert!(navigator.turn_previous().is_none());

    navigator.go_to_spine_item(1);
    navigator.turn_next().expect("turned");
    assert_eq!(x_of(&navigator), 400.0);
    navigator.turn_right().expect("turned");
    assert_eq!(x_of(&navigator), 500.0);
    assert_eq!(navigator.current_record().expect("record").spine_item, 2);
    assert!(navigator.turn_next().is_none());

    navigator.turn_left().expect("turned");
    let record = navigator.current_record().expect("record");
    assert_eq!(record.position.x(), 400.0);
    assert_eq!(record.spine_item, 1);
    assert_eq!(record.direction, NavigationDirection::Backward);
}

#[test]
fn absolute_page_indices_clamp_to_the_last_page() {
    let book = book();
    let mut navigator = navigator(&book, settings());

    navigator.go_to_absolute_page_index(3).expect("page exists");
    let record = navigator.current_record().expect("record");
    assert_eq!(record.spine_item, 1);
    assert_eq!(record.position.x(), 300.0);

    navigator.go_to_absolute_page_index(99).expect("clamped");
    assert_eq!(x_of(&navigator), 500.0);

    navigator.go_to_page_of_spine_item(0, 2);
    assert_eq!(x_of(&navigator), 200.0);
    assert_eq!(
        navigator.current_record().expect("record").direction,
        NavigationDirection::Backward
    );
}

#[test]
fn positions_snap_to_pages_and_repeat_without_moving() {
    let book = book();
    let (mut navigator, driver) = driven_navigator(&book, settings());

    let first = navigator.navigate(NavigationRequest::to_position(UnsafePosition::new(240.0, 0.0)));
    assert_eq!(first.record().expect("published").position.x(), 200.0);
    assert_eq!(driver.len(), 1);

    let again = navigator.navigate(NavigationRequest::to_position(UnsafePosition::new(200.0, 0.0)));
    let record = again.record().expect("published");
    assert_eq!(record.position.x(), 200.0);
    assert_eq!(record.direction, NavigationDirection::Forward);
    assert!(again.drive().is_none());
    assert_eq!(driver.len(), 1);
}

#[test]
fn positions_outside_the_book_are_clamped() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    navigator.navigate(NavigationRequest::to_position(UnsafePosition::new(9_000.0, -40.0)));
    let record = navigator.current_record().expect("record");
    assert_eq!(record.position.x(), 500.0);
    assert_eq!(record.position.y(), 0.0);
    assert_eq!(record.spine_item, 2);
}

#[test]
fn url_fragments_resolve_through_the_renderer() {
    let book = book();
    book.set_fragment(1, "note", Lookup::Found(150.0));
    let mut navigator = navigator(&book, settings());

    let outcome = navigator.go_to_url("text/ch1.xhtml#note");
    let record = outcome.record().expect("published");
    assert_eq!(record.spine_item, 1);
    assert_eq!(record.position.x(), 400.0);
    assert_eq!(record.direction, NavigationDirection::Anchor);
    assert_eq!(record.url.as_deref(), Some("text/ch1.xhtml#note"));

    navigator.go_to_url("text/ch2.xhtml#unknown");
    assert_eq!(x_of(&navigator), 500.0);
}

#[test]
fn pending_fragment_defers_until_the_item_is_ready() {
    let book = book();
    book.set_fragment(2, "end", Lookup::Pending);
    let mut navigator = navigator(&book, settings());

    let outcome = navigator.go_to_url("text/ch2.xhtml#end");
    assert!(matches!(outcome, NavigateOutcome::Deferred(_)));
    assert!(navigator.current_record().is_none());
    assert!(navigator.has_deferred_navigation());

    assert!(matches!(
        navigator.notify_item_ready(2),
        Some(NavigateOutcome::Deferred(_))
    ));

    book.set_fragment(2, "end", Lookup::Found(0.0));
    let retried = navigator.notify_item_ready(2).expect("retried");
    let record = retried.record().expect("published");
    assert_eq!(record.spine_item, 2);
    assert_eq!(record.position.x(), 500.0);
    assert!(!navigator.has_deferred_navigation());
}

#[test]
fn newer_navigation_supersedes_a_deferred_one() {
    let book = book();
    book.set_fragment(2, "end", Lookup::Pending);
    let mut navigator = navigator(&book, settings());

    navigator.go_to_url("text/ch2.xhtml#end");
    navigator.go_to_spine_item(0);
    assert!(!navigator.has_deferred_navigation());

    book.set_fragment(2, "end", Lookup::Found(0.0));
    assert!(navigator.notify_item_ready(2).is_none());
    assert_eq!(x_of(&navigator), 0.0);
}

#[test]
fn cfi_navigation_uses_root_and_offset_hints() {
    let book = book();
    let mut navigator = navigator(&book, settings());

    navigator.go_to_cfi(cfi::generate_root(1, "ch1"));
    assert_eq!(x_of(&navigator), 300.0);

    let address = cfi::generate(
        &NodeLocation::new(0, "ch0")
            .with_steps(vec![CfiStep::new(4), CfiStep::new(6)])
            .with_offset_hint(120.0),
    );
    navigator.go_to_cfi(address.as_str());
    let record = navigator.current_record().expect("record");
    assert_eq!(record.position.x(), 100.0);
    assert_eq!(record.spine_item, 0);
    assert_eq!(record.cfi.as_deref(), Some(address.as_str()));

    book.set_cfi_offset(0, Lookup::Found(250.0));
    navigator.go_to_cfi(address.as_str());
    assert_eq!(x_of(&navigator), 200.0);
}

#[test]
fn garbage_cfi_keeps_the_current_item() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    navigator.go_to_spine_item(2);
    navigator.go_to_cfi("epubcfi(/6/");
    let record = navigator.current_record().expect("record");
    assert_eq!(record.spine_item, 2);
    assert_eq!(record.position.x(), 500.0);
}

#[test]
fn subscribers_see_published_records_until_unsubscribed() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = navigator.subscribe(move |record| sink.borrow_mut().push(record.id));

    let outcome = navigator.go_to_spine_item(1);
    let id = outcome.record().expect("published").id;
    assert_eq!(seen.borrow().as_slice(), &[id]);

    assert!(navigator.unsubscribe(subscription));
    assert!(!navigator.unsubscribe(subscription));
    navigator.go_to_spine_item(2);
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn preload_window_surrounds_the_visible_items() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    assert_eq!(navigator.preload_window(), 0..2);
    navigator.go_to_spine_item(1);
    assert_eq!(navigator.preload_window(), 0..3);
}

#[test]
fn invalid_settings_and_manifests_are_rejected() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    let err = navigator
        .set_settings(ReaderSettings::for_viewport(0.0, 100.0))
        .expect_err("zero width");
    assert_eq!(
        err,
        NavigatorError::Settings(SettingsError::InvalidViewport {
            width: 0.0,
            height: 100.0
        })
    );
    assert_eq!(navigator.settings().viewport.width, 100.0);

    let duplicate = Manifest::new(vec![
        ManifestItem::new("a", "a.xhtml"),
        ManifestItem::new("a", "b.xhtml"),
    ]);
    let err = Navigator::new(&duplicate, settings(), book.renderer())
        .err()
        .expect("duplicate id");
    assert_eq!(err, NavigatorError::DuplicateItemId("a".to_string()));
}

#[test]
fn failed_measure_keeps_the_last_known_size() {
    let book = book();
    let mut navigator = navigator(&book, settings());
    let before = book.measure_calls();

    book.set_size(1, None);
    let outcome = navigator.layout();
    assert!(!outcome.has_changed);
    assert_eq!(book.measure_calls(), before + 3);
    let item = navigator.layout_snapshot().item(1).expect("item");
    assert_eq!(item.layout_box.width, 200.0);
}
