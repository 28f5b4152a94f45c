use super::*;

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use shared::domain::ViewState;
use tokio::sync::{broadcast, oneshot};

#[derive(Clone, Default)]
struct RecordingView {
    state: Arc<Mutex<ViewState>>,
    panel_updates: Arc<Mutex<Vec<Panel>>>,
}

impl RecordingView {
    fn snapshot(&self) -> ViewState {
        self.state.lock().expect("view state").clone()
    }

    fn rows_as_str(&self) -> Vec<Vec<String>> {
        self.snapshot()
            .rows
            .iter()
            .map(|row| row.cells().to_vec())
            .collect()
    }
}

impl ViewPort for RecordingView {
    fn set_panel(&mut self, panel: Panel) {
        self.state.lock().expect("view state").panel = panel;
        self.panel_updates.lock().expect("panel updates").push(panel);
    }

    fn set_greeting(&mut self, greeting: Option<&str>) {
        self.state.lock().expect("view state").greeting = greeting.map(str::to_string);
    }

    fn set_rows(&mut self, rows: &[TableRow]) {
        self.state.lock().expect("view state").rows = rows.to_vec();
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn alerts(&self) -> Vec<String> {
        self.alerts.lock().expect("alerts").clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().expect("alerts").push(message.to_string());
    }
}

struct ScriptedIdentity {
    sign_in_results: Mutex<VecDeque<Result<SessionInfo, AuthError>>>,
    sign_out_failure: Option<AuthError>,
    current: Mutex<Option<SessionInfo>>,
    events: Mutex<Option<broadcast::Sender<Option<SessionInfo>>>>,
    sign_out_calls: AtomicUsize,
}

impl ScriptedIdentity {
    fn new(restored: Option<SessionInfo>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            sign_in_results: Mutex::new(VecDeque::new()),
            sign_out_failure: None,
            current: Mutex::new(restored),
            events: Mutex::new(Some(events)),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    fn with_sign_in(self, result: Result<SessionInfo, AuthError>) -> Self {
        self.sign_in_results
            .lock()
            .expect("sign in results")
            .push_back(result);
        self
    }

    fn with_sign_out_failure(mut self, err: AuthError) -> Self {
        self.sign_out_failure = Some(err);
        self
    }

    fn push(&self, session: Option<SessionInfo>) {
        *self.current.lock().expect("current") = session.clone();
        if let Some(events) = self.events.lock().expect("events").as_ref() {
            let _ = events.send(session);
        }
    }

    fn close(&self) {
        self.events.lock().expect("events").take();
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn sign_in_interactive(&self) -> Result<SessionInfo, AuthError> {
        let result = self
            .sign_in_results
            .lock()
            .expect("sign in results")
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::interactive("no scripted sign-in")));
        if let Ok(info) = &result {
            self.push(Some(info.clone()));
        }
        result
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.sign_out_failure {
            return Err(err.clone());
        }
        let was_signed_in = self.current.lock().expect("current").is_some();
        if was_signed_in {
            self.push(None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<SessionInfo>> {
        match self.events.lock().expect("events").as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    fn current(&self) -> Option<SessionInfo> {
        self.current.lock().expect("current").clone()
    }
}

type StoreResponse = Result<Vec<Record>, FetchError>;

/// Answers fetches in call order. A gated response waits until the test
/// releases it.
#[derive(Default)]
struct ScriptedStore {
    responses: Mutex<VecDeque<oneshot::Receiver<StoreResponse>>>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    fn ready(self, response: StoreResponse) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(response);
        self.responses.lock().expect("responses").push_back(rx);
        self
    }

    fn gated(&self) -> oneshot::Sender<StoreResponse> {
        let (tx, rx) = oneshot::channel();
        self.responses.lock().expect("responses").push_back(rx);
        tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().expect("responses").pop_front();
        match next {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(FetchError::new(name, "response dropped"))),
            None => Ok(Vec::new()),
        }
    }
}

struct Harness {
    controller: SessionViewController,
    view: RecordingView,
    identity: Arc<ScriptedIdentity>,
    store: Arc<ScriptedStore>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(identity: ScriptedIdentity, store: ScriptedStore) -> Harness {
    let view = RecordingView::default();
    let identity = Arc::new(identity);
    let store = Arc::new(store);
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = SessionViewController::new(
        identity.clone(),
        store.clone(),
        notifier.clone(),
        Box::new(view.clone()),
        "people",
    );
    Harness {
        controller,
        view,
        identity,
        store,
        notifier,
    }
}

fn record(id: &str, bloom: &str, first_name: &str, song: &str, year: &str) -> Record {
    Record {
        id: id.into(),
        bloom: Some(bloom.into()),
        first_name: Some(first_name.into()),
        song: Some(song.into()),
        year: Some(year.into()),
    }
}

fn two_records() -> Vec<Record> {
    vec![
        record("a1", "x", "Jo", "S1", "2020"),
        record("a2", "y", "Al", "S2", "2021"),
    ]
}

fn signed_in(name: &str) -> Session {
    Session::SignedIn(SessionInfo::new(name, format!("uid-{name}")))
}

async fn wait_for_calls(store: &ScriptedStore, calls: usize) {
    for _ in 0..200 {
        if store.calls() >= calls {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store saw {} calls, expected {calls}", store.calls());
}

async fn wait_for_rows(view: &RecordingView, rows: usize) {
    for _ in 0..200 {
        if view.snapshot().rows.len() == rows {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("view never reached {rows} rows");
}

#[test]
fn exactly_one_panel_matches_each_transition() {
    let h = harness(ScriptedIdentity::new(None), ScriptedStore::default());
    let sequence = [
        signed_in("Jo"),
        Session::SignedOut,
        Session::SignedOut,
        signed_in("Al"),
        signed_in("Jo"),
        Session::SignedOut,
    ];

    for session in sequence {
        let expected = Panel::for_session(&session);
        h.controller.on_session_change(session);
        assert_eq!(h.view.snapshot().panel, expected);
    }
    assert_eq!(h.view.panel_updates.lock().expect("panel updates").len(), 6);
}

#[test]
fn signed_in_sets_greeting_verbatim_and_issues_ticket() {
    let h = harness(ScriptedIdentity::new(None), ScriptedStore::default());

    let ticket = h
        .controller
        .on_session_change(signed_in("<b>Jo</b>"))
        .expect("fetch ticket");

    assert_eq!(ticket.epoch, Epoch(1));
    assert_eq!(ticket.collection, "people");
    let state = h.view.snapshot();
    assert_eq!(state.panel, Panel::SignedIn);
    assert_eq!(state.greeting.as_deref(), Some("Welcome, <b>Jo</b>!"));
    assert!(state.rows.is_empty());
}

#[tokio::test]
async fn fetched_records_render_in_received_order() {
    let h = harness(
        ScriptedIdentity::new(None),
        ScriptedStore::default().ready(Ok(two_records())),
    );

    let ticket = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    let outcome = h.controller.complete_fetch(ticket).await.expect("fetch");

    assert_eq!(outcome, FetchOutcome::Applied { rows: 2 });
    assert_eq!(
        h.view.rows_as_str(),
        vec![
            vec!["a1", "x", "Jo", "S1", "2020"],
            vec!["a2", "y", "Al", "S2", "2021"],
        ]
    );
}

#[tokio::test]
async fn empty_collection_renders_zero_rows() {
    let h = harness(
        ScriptedIdentity::new(None),
        ScriptedStore::default().ready(Ok(Vec::new())),
    );

    let ticket = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    let outcome = h.controller.complete_fetch(ticket).await.expect("fetch");

    assert_eq!(outcome, FetchOutcome::Applied { rows: 0 });
    assert!(h.view.snapshot().rows.is_empty());
}

#[tokio::test]
async fn sign_out_clears_table_and_greeting_synchronously() {
    let h = harness(
        ScriptedIdentity::new(None),
        ScriptedStore::default().ready(Ok(two_records())),
    );
    let ticket = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    h.controller.complete_fetch(ticket).await.expect("fetch");
    assert_eq!(h.view.snapshot().rows.len(), 2);

    assert!(h.controller.on_session_change(Session::SignedOut).is_none());

    assert_eq!(h.view.snapshot(), ViewState::default());
    assert_eq!(h.controller.session(), Session::SignedOut);
}

#[tokio::test]
async fn stale_fetch_after_sign_out_is_discarded() {
    let store = ScriptedStore::default();
    let release = store.gated();
    let h = harness(ScriptedIdentity::new(None), store);

    let ticket = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.complete_fetch(ticket).await });
    wait_for_calls(&h.store, 1).await;

    h.controller.on_session_change(Session::SignedOut);
    release.send(Ok(two_records())).expect("release fetch");

    let outcome = pending.await.expect("join").expect("fetch");
    assert_eq!(
        outcome,
        FetchOutcome::Discarded {
            issued: Epoch(1),
            current: Epoch(2),
        }
    );
    assert_eq!(h.view.snapshot(), ViewState::default());
}

#[tokio::test]
async fn stale_fetch_does_not_overwrite_newer_sign_in() {
    let store = ScriptedStore::default();
    let slow = store.gated();
    let store = store.ready(Ok(vec![record("b1", "z", "Al", "S9", "1999")]));
    let h = harness(ScriptedIdentity::new(None), store);

    let first = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.complete_fetch(first).await });
    wait_for_calls(&h.store, 1).await;

    h.controller.on_session_change(Session::SignedOut);
    let second = h.controller.on_session_change(signed_in("Al")).expect("ticket");
    let applied = h.controller.complete_fetch(second).await.expect("fetch");
    assert_eq!(applied, FetchOutcome::Applied { rows: 1 });

    slow.send(Ok(two_records())).expect("release fetch");
    let outcome = pending.await.expect("join").expect("fetch");
    assert!(matches!(outcome, FetchOutcome::Discarded { .. }));

    assert_eq!(h.view.rows_as_str(), vec![vec!["b1", "z", "Al", "S9", "1999"]]);
    assert_eq!(h.view.snapshot().greeting.as_deref(), Some("Welcome, Al!"));
}

#[tokio::test]
async fn fetch_failure_leaves_table_empty() {
    let h = harness(
        ScriptedIdentity::new(None),
        ScriptedStore::default().ready(Err(FetchError::new("people", "permission denied"))),
    );

    let ticket = h.controller.on_session_change(signed_in("Jo")).expect("ticket");
    let err = h.controller.complete_fetch(ticket).await.expect_err("fetch fails");

    assert_eq!(err.message, "permission denied");
    let state = h.view.snapshot();
    assert_eq!(state.panel, Panel::SignedIn);
    assert!(state.rows.is_empty());
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn sign_in_failure_notifies_user_and_keeps_session() {
    let h = harness(
        ScriptedIdentity::new(None).with_sign_in(Err(AuthError::interactive_with_code(
            "popup_closed_by_user",
            "popup_closed_by_user",
        ))),
        ScriptedStore::default(),
    );
    h.controller.on_session_change(Session::SignedOut);
    let before = h.view.snapshot();

    let err = h.controller.request_sign_in().await.expect_err("sign in fails");

    assert_eq!(err.code(), Some("popup_closed_by_user"));
    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("popup_closed_by_user"));
    assert_eq!(h.controller.session(), Session::SignedOut);
    assert_eq!(h.controller.epoch(), Epoch(1));
    assert_eq!(h.view.snapshot(), before);
}

#[tokio::test]
async fn sign_in_success_does_not_touch_view_directly() {
    let info = SessionInfo::new("Jo", "uid-jo");
    let h = harness(
        ScriptedIdentity::new(None).with_sign_in(Ok(info.clone())),
        ScriptedStore::default(),
    );

    let returned = h.controller.request_sign_in().await.expect("sign in");

    assert_eq!(returned, info);
    assert_eq!(h.controller.epoch(), Epoch(0));
    assert_eq!(h.view.snapshot(), ViewState::default());
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn sign_out_while_signed_out_is_a_no_op() {
    let h = harness(ScriptedIdentity::new(None), ScriptedStore::default());
    let mut events = h.identity.subscribe();
    h.controller.on_session_change(Session::SignedOut);
    let before = h.view.snapshot();

    h.controller.request_sign_out().await.expect("sign out");
    h.controller.request_sign_out().await.expect("sign out again");

    assert_eq!(h.identity.sign_out_calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(h.view.snapshot(), before);
    assert_eq!(h.controller.epoch(), Epoch(1));
}

#[tokio::test]
async fn sign_out_failure_is_returned_without_notifying() {
    let h = harness(
        ScriptedIdentity::new(Some(SessionInfo::new("Jo", "uid-jo")))
            .with_sign_out_failure(AuthError::sign_out("network down")),
        ScriptedStore::default(),
    );

    let err = h.controller.request_sign_out().await.expect_err("sign out fails");

    assert_eq!(err.message(), "network down");
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn session_loop_starts_from_restored_session() {
    let h = harness(
        ScriptedIdentity::new(Some(SessionInfo::new("Jo", "uid-jo"))),
        ScriptedStore::default().ready(Ok(two_records())),
    );

    let running = tokio::spawn(h.controller.clone().run_session_loop());
    wait_for_rows(&h.view, 2).await;
    assert_eq!(h.view.snapshot().greeting.as_deref(), Some("Welcome, Jo!"));

    h.identity.close();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("loop ends once provider closes")
        .expect("join");
}

#[tokio::test]
async fn session_loop_drops_slow_fetch_from_previous_sign_in() {
    let store = ScriptedStore::default();
    let slow = store.gated();
    let store = store.ready(Ok(vec![record("b1", "z", "Al", "S9", "1999")]));
    let h = harness(ScriptedIdentity::new(None), store);

    let running = tokio::spawn(h.controller.clone().run_session_loop());
    for _ in 0..200 {
        if h.controller.epoch() == Epoch(1) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.identity.push(Some(SessionInfo::new("Jo", "uid-jo")));
    wait_for_calls(&h.store, 1).await;
    h.identity.push(None);
    h.identity.push(Some(SessionInfo::new("Al", "uid-al")));
    wait_for_rows(&h.view, 1).await;

    slow.send(Ok(two_records())).expect("release fetch");
    h.identity.close();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("loop ends once provider closes")
        .expect("join");

    assert_eq!(h.controller.epoch(), Epoch(4));
    assert_eq!(h.view.rows_as_str(), vec![vec!["b1", "z", "Al", "S9", "1999"]]);
}

#[tokio::test]
async fn session_loop_survives_lagging_behind_provider() {
    let h = harness(ScriptedIdentity::new(None), ScriptedStore::default());

    let running = tokio::spawn(h.controller.clone().run_session_loop());
    for _ in 0..200 {
        if h.controller.epoch() == Epoch(1) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.controller.epoch(), Epoch(1));

    // The runtime is single threaded, so none of these are consumed before
    // the channel overflows and the oldest four are dropped.
    for n in 0..20 {
        let name = format!("User{n}");
        h.identity
            .push(Some(SessionInfo::new(name.clone(), format!("uid-{name}"))));
    }

    for _ in 0..200 {
        if h.controller.epoch() == Epoch(17) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.controller.epoch(), Epoch(17));
    assert_eq!(h.controller.session(), signed_in("User19"));
    assert_eq!(h.view.snapshot().greeting.as_deref(), Some("Welcome, User19!"));
    assert_eq!(h.view.snapshot().panel, Panel::SignedIn);

    h.identity.close();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("loop ends once provider closes")
        .expect("join");
    assert_eq!(h.store.calls(), 16);
}
