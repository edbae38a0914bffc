use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use md_live::template::{extract_body, page};
use md_live::{
    DocumentViewController, HtmlView, MarkdownRenderer, NotifyWatchService, Render, ViewState,
    ViewerError, WatchEvent, WatchHandle, WatchId, WatchService,
};

#[derive(Clone, Default)]
struct RecordingView {
    pages: Rc<RefCell<Vec<String>>>,
    bases: Rc<RefCell<Vec<String>>>,
    titles: Rc<RefCell<Vec<(String, Option<String>)>>>,
}

impl RecordingView {
    fn count(&self) -> usize {
        self.pages.borrow().len()
    }

    fn last(&self) -> String {
        self.pages.borrow().last().cloned().unwrap_or_default()
    }
}

impl HtmlView for RecordingView {
    fn display(&mut self, html: &str, base_reference: &str) -> Result<(), ViewerError> {
        self.pages.borrow_mut().push(html.to_string());
        self.bases.borrow_mut().push(base_reference.to_string());
        Ok(())
    }

    fn set_title(&mut self, title: &str, subtitle: Option<&str>) {
        self.titles
            .borrow_mut()
            .push((title.to_string(), subtitle.map(str::to_string)));
    }
}

struct Armed {
    id: WatchId,
    path: PathBuf,
    active: Rc<Cell<bool>>,
}

/// Watch service that lets the test play the filesystem.
#[derive(Clone, Default)]
struct ScriptedWatches {
    armed: Rc<RefCell<Vec<Armed>>>,
    next: Rc<Cell<u64>>,
}

impl ScriptedWatches {
    /// Events the platform would deliver for a modification of `path`.
    fn modify(&self, path: &Path) -> Vec<WatchEvent> {
        self.armed
            .borrow()
            .iter()
            .filter(|w| w.active.get() && w.path == path)
            .map(|w| WatchEvent {
                id: w.id,
                path: w.path.clone(),
            })
            .collect()
    }

    fn active_count(&self) -> usize {
        self.armed.borrow().iter().filter(|w| w.active.get()).count()
    }
}

struct ScriptedHandle {
    id: WatchId,
    active: Rc<Cell<bool>>,
}

impl WatchHandle for ScriptedHandle {
    fn id(&self) -> WatchId {
        self.id
    }

    fn cancel(&mut self) {
        self.active.set(false);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl WatchService for ScriptedWatches {
    fn watch(&mut self, path: &Path) -> Result<Box<dyn WatchHandle>, ViewerError> {
        self.next.set(self.next.get() + 1);
        let id = WatchId::new(self.next.get());
        let active = Rc::new(Cell::new(true));
        self.armed.borrow_mut().push(Armed {
            id,
            path: path.to_path_buf(),
            active: Rc::clone(&active),
        });
        Ok(Box::new(ScriptedHandle { id, active }))
    }
}

/// Saves new content to the file at the moment the watch is armed.
struct SaveWhileArming {
    inner: ScriptedWatches,
    text: &'static str,
}

impl WatchService for SaveWhileArming {
    fn watch(&mut self, path: &Path) -> Result<Box<dyn WatchHandle>, ViewerError> {
        let handle = self.inner.watch(path)?;
        fs::write(path, self.text).unwrap();
        Ok(handle)
    }
}

type Controller = DocumentViewController<MarkdownRenderer, RecordingView, ScriptedWatches>;

fn controller() -> (Controller, RecordingView, ScriptedWatches) {
    let view = RecordingView::default();
    let watches = ScriptedWatches::default();
    let ctl = DocumentViewController::new(MarkdownRenderer::default(), view.clone(), watches.clone());
    (ctl, view, watches)
}

fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path.canonicalize().unwrap()
}

#[test]
fn renders_heading_and_emphasis_into_dark_page() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "# Title\n\nHello *world*.");
    let (mut ctl, view, _) = controller();

    ctl.open(Some(file.as_path())).unwrap();

    let html = view.last();
    let body = extract_body(&html).unwrap();
    assert!(body.contains("<h1 id=\"title\">Title</h1>"), "{body}");
    assert!(body.contains("<em>world</em>"), "{body}");
    assert!(html.contains("background-color: #002b36"));
    assert_eq!(view.bases.borrow().last().unwrap(), "file:///");
    assert_eq!(ctl.state(), ViewState::Loaded);
}

#[test]
fn sets_title_to_name_and_absolute_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "notes.md", "x");
    let (mut ctl, view, _) = controller();

    ctl.open(Some(file.as_path())).unwrap();

    let titles = view.titles.borrow();
    let (title, subtitle) = titles.last().unwrap();
    assert_eq!(title, "notes.md");
    assert_eq!(subtitle.as_deref(), Some(file.to_str().unwrap()));
    assert_eq!(ctl.path(), Some(file.as_path()));
}

#[test]
fn missing_path_shows_render_of_empty_text() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ctl, view, watches) = controller();
    let blank = page(&MarkdownRenderer::default().render("").unwrap());

    ctl.open(Some(dir.path().join("nope.md").as_path())).unwrap();
    assert_eq!(view.last(), blank);
    assert_eq!(ctl.state(), ViewState::Empty);
    assert_eq!(watches.active_count(), 0);

    ctl.open(None).unwrap();
    assert_eq!(view.last(), blank);
    assert_eq!(ctl.document().raw_text, "");
}

#[test]
fn opening_another_file_cancels_the_first_watch() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.md", "alpha");
    let b = write(&dir, "b.md", "beta");
    let (mut ctl, view, watches) = controller();

    ctl.open(Some(a.as_path())).unwrap();
    let stale = watches.modify(&a);
    ctl.open(Some(b.as_path())).unwrap();
    assert_eq!(watches.active_count(), 1);

    let shown = view.count();
    assert!(watches.modify(&a).is_empty());
    for event in &stale {
        ctl.on_external_change(event).unwrap();
    }
    assert_eq!(view.count(), shown);

    let events = watches.modify(&b);
    assert_eq!(events.len(), 1);
    ctl.on_external_change(&events[0]).unwrap();
    assert_eq!(view.count(), shown + 1);
    assert!(view.last().contains("beta"));
}

#[test]
fn save_during_arming_is_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "before the save");
    let view = RecordingView::default();
    let watches = SaveWhileArming {
        inner: ScriptedWatches::default(),
        text: "saved while arming",
    };
    let mut ctl = DocumentViewController::new(MarkdownRenderer::default(), view.clone(), watches);

    ctl.open(Some(file.as_path())).unwrap();

    assert_eq!(fs::read_to_string(&file).unwrap(), "saved while arming");
    assert!(view.last().contains("<p>saved while arming</p>"), "{}", view.last());
    assert_eq!(ctl.document().raw_text, "saved while arming");
}

#[test]
fn watch_id_reported_only_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "text");
    let (mut ctl, _, watches) = controller();
    ctl.open(Some(file.as_path())).unwrap();

    let armed = watches.armed.borrow().last().map(|w| (w.id, Rc::clone(&w.active)));
    let (id, active) = armed.unwrap();
    assert_eq!(ctl.watch_id(), Some(id));

    active.set(false);
    assert_eq!(ctl.watch_id(), None);
}

#[test]
fn every_change_rereads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "first");
    let (mut ctl, view, watches) = controller();
    ctl.open(Some(file.as_path())).unwrap();

    fs::write(&file, "second").unwrap();
    for event in watches.modify(&file) {
        ctl.on_external_change(&event).unwrap();
    }
    assert!(view.last().contains("<p>second</p>"));

    fs::write(&file, "third").unwrap();
    for event in watches.modify(&file) {
        ctl.on_external_change(&event).unwrap();
    }
    assert!(view.last().contains("<p>third</p>"));
    assert_eq!(ctl.document().raw_text, "third");
    assert_eq!(watches.active_count(), 1);
}

#[test]
fn queued_notifications_each_reload() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "one");
    let (mut ctl, view, watches) = controller();
    ctl.open(Some(file.as_path())).unwrap();
    let before = view.count();

    // both arrive before the first reload re-arms the watch
    let first = watches.modify(&file);
    let second = watches.modify(&file);
    fs::write(&file, "two").unwrap();
    ctl.on_external_change(&first[0]).unwrap();
    ctl.on_external_change(&second[0]).unwrap();

    assert_eq!(view.count(), before + 2);
    assert!(view.last().contains("<p>two</p>"));
}

#[test]
fn reopening_an_old_file_ignores_its_earlier_watch() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.md", "alpha");
    let b = write(&dir, "b.md", "beta");
    let (mut ctl, view, watches) = controller();

    ctl.open(Some(a.as_path())).unwrap();
    let old = watches.modify(&a);
    ctl.open(Some(b.as_path())).unwrap();
    ctl.open(Some(a.as_path())).unwrap();

    let shown = view.count();
    ctl.on_external_change(&old[0]).unwrap();
    assert_eq!(view.count(), shown);

    let fresh = watches.modify(&a);
    ctl.on_external_change(&fresh[0]).unwrap();
    assert_eq!(view.count(), shown + 1);
}

#[test]
fn body_round_trips_through_template() {
    let dir = tempfile::tempdir().unwrap();
    let text = "## Costs\n\nIt is $5 or ${price}, $$ even.\n\n```\n$body\n```\n";
    let file = write(&dir, "doc.md", text);
    let (mut ctl, _, _) = controller();
    ctl.open(Some(file.as_path())).unwrap();

    let rendered = MarkdownRenderer::default().render(text).unwrap();
    let html = ctl.refresh().unwrap();
    assert_eq!(extract_body(&html), Some(rendered.as_str()));
    assert_eq!(html.matches(rendered.as_str()).count(), 1);
}

#[test]
fn invalid_utf8_is_reported_not_blank() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bin.md");
    fs::write(&file, [0xff, 0xfe, 0x00, 0x41]).unwrap();
    let (mut ctl, view, watches) = controller();

    let err = ctl.open(Some(file.as_path())).unwrap_err();

    assert!(matches!(err, ViewerError::ReadFailure { .. }));
    let body = extract_body(&view.last()).unwrap().to_string();
    assert!(body.contains("Not valid UTF-8"), "{body}");
    // still watched, so fixing the file brings the document back
    fs::write(&file, "fixed").unwrap();
    let file = file.canonicalize().unwrap();
    for event in watches.modify(&file) {
        ctl.on_external_change(&event).unwrap();
    }
    assert!(view.last().contains("<p>fixed</p>"));
}

#[test]
fn nothing_reloads_after_dispose() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "text");
    let (mut ctl, view, watches) = controller();
    ctl.open(Some(file.as_path())).unwrap();
    let pending = watches.modify(&file);

    ctl.dispose();
    assert_eq!(ctl.state(), ViewState::Disposed);
    assert_eq!(watches.active_count(), 0);

    let shown = view.count();
    for event in &pending {
        ctl.on_external_change(event).unwrap();
    }
    ctl.reload().unwrap();
    assert_eq!(view.count(), shown);
}

#[test]
fn deleted_file_falls_back_to_blank() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "doc.md", "soon gone");
    let (mut ctl, view, watches) = controller();
    ctl.open(Some(file.as_path())).unwrap();

    let events = watches.modify(&file);
    fs::remove_file(&file).unwrap();
    ctl.on_external_change(&events[0]).unwrap();

    assert_eq!(ctl.state(), ViewState::Empty);
    assert!(!view.last().contains("soon gone"));
    assert_eq!(watches.active_count(), 0);
}

#[test]
fn platform_watcher_delivers_and_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "live.md", "v1");
    let (mut service, rx) = NotifyWatchService::with_channel(Duration::from_millis(50));

    let mut handle = service.watch(&file).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    fs::write(&file, "v2").unwrap();

    let event = rx.recv_timeout(Duration::from_secs(5)).expect("change event");
    assert_eq!(event.id, handle.id());
    assert_eq!(event.path, file);

    handle.cancel();
    while rx.recv_timeout(Duration::from_millis(300)).is_ok() {}
    fs::write(&file, "v3").unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}
