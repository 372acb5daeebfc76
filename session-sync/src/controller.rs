//! Composition root for one displayed session.
//!
//! The controller owns the process-wide write-back queue and one connection
//! monitor for whichever session is currently on screen. User edits become
//! queue entries; every other mutating action first flushes the queue so
//! the server acts on what the user actually typed; inbound change
//! notifications are reconciled by refetching the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use shared::{ApiError, ModelSettings, Response, Session, SessionId, WorkbenchApi};

use crate::error::SyncError;
use crate::monitor::{ConnectionState, MonitorEvent, SessionMonitor};
use crate::queue::WriteBackQueue;
use crate::transport::{ChangeStreamConnector, PersistenceTransport};

/// The session field the write-back queue persists.
pub const PROMPT_FIELD: &str = "prompt";

/// What the controller reports back to the view layer.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Server-side state changed; carries the refetched session.
    Updated(Session),
    /// Connectivity changed; rendered as a non-blocking badge.
    Connection(ConnectionState),
    /// The session disappeared server-side; the caller should navigate
    /// away.
    SessionGone,
}

struct ActiveSession<C: ChangeStreamConnector> {
    monitor: SessionMonitor<C>,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    session: Session,
    /// Whether this monitor has connected before; a later `Connected` is a
    /// reconnection and warrants a proactive refetch.
    seen_connected: bool,
}

/// Keeps one open session's local representation consistent with the
/// server and writes local edits back.
pub struct SessionController<A, C>
where
    A: WorkbenchApi + PersistenceTransport + 'static,
    C: ChangeStreamConnector + Clone,
{
    api: Arc<A>,
    connector: C,
    queue: WriteBackQueue<Arc<A>>,
    active: Option<ActiveSession<C>>,
}

impl<A, C> SessionController<A, C>
where
    A: WorkbenchApi + PersistenceTransport + 'static,
    C: ChangeStreamConnector + Clone,
{
    pub fn new(api: Arc<A>, connector: C) -> Self {
        let queue = WriteBackQueue::new(Arc::clone(&api), PROMPT_FIELD);
        Self {
            api,
            connector,
            queue,
            active: None,
        }
    }

    /// Like [`SessionController::new`] with a custom queue flush window.
    pub fn with_flush_window(api: Arc<A>, connector: C, window: Duration) -> Self {
        let queue = WriteBackQueue::with_window(Arc::clone(&api), PROMPT_FIELD, window);
        Self {
            api,
            connector,
            queue,
            active: None,
        }
    }

    /// Make `id` the displayed session: stop any previous monitor, fetch
    /// the session, and start a fresh monitor for it.
    pub async fn open(&mut self, id: SessionId) -> Result<&Session, SyncError> {
        self.close();
        let session = self.fetch(&id).await?;
        let (monitor, events) = SessionMonitor::new(id, self.connector.clone());
        monitor.start();
        let active = self.active.insert(ActiveSession {
            monitor,
            events,
            session,
            seen_connected: false,
        });
        Ok(&active.session)
    }

    /// Stop monitoring the open session, if any. Pending prompt edits are
    /// not lost; they still flush on the queue's own window.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(session_id = %active.session.id, "stopping session monitor");
            active.monitor.stop();
        }
    }

    /// The local representation of the open session.
    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|active| &active.session)
    }

    /// Connectivity of the open session's change stream; `Idle` when no
    /// session is open.
    pub fn connection_state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|active| active.monitor.state())
            .unwrap_or(ConnectionState::Idle)
    }

    /// Record a prompt edit. Synchronous; the write reaches the server at
    /// the end of the current flush window at the latest.
    pub fn edit_prompt(&mut self, text: impl Into<String>) -> Result<(), SyncError> {
        let active = self.active.as_mut().ok_or(SyncError::NoOpenSession)?;
        let text = text.into();
        active.session.prompt = text.clone();
        self.queue.enqueue(&active.session.id, text);
        Ok(())
    }

    /// Ask the server to generate a response for the current prompt.
    pub async fn submit_prompt(&mut self) -> Result<Response, SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        let response = self.api.create_response(&id).await?;
        self.refresh().await?;
        Ok(response)
    }

    pub async fn delete_response(&mut self, response_id: &str) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.delete_response(&id, response_id).await?;
        self.refresh().await
    }

    pub async fn abort_response(&mut self, response_id: &str) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.abort_response(&id, response_id).await?;
        self.refresh().await
    }

    /// Append a user reply to a response.
    pub async fn reply(&mut self, response_id: &str, text: &str) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.create_message(&id, response_id, text).await?;
        self.refresh().await
    }

    pub async fn continue_response(&mut self, response_id: &str) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.continue_response(&id, response_id).await?;
        self.refresh().await
    }

    pub async fn delete_message(
        &mut self,
        response_id: &str,
        message_id: &str,
    ) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.delete_message(&id, response_id, message_id).await?;
        self.refresh().await
    }

    pub async fn set_model_settings(&mut self, settings: ModelSettings) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.put_model_settings(&id, &settings).await?;
        if let Some(active) = self.active.as_mut() {
            active.session.model_settings = settings;
        }
        Ok(())
    }

    pub async fn delete_attached_file(&mut self, filename: &str) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.delete_attached_file(&id, filename).await?;
        self.refresh().await
    }

    /// Delete the open session and stop monitoring it.
    pub async fn delete_session(&mut self) -> Result<(), SyncError> {
        let id = self.active_id()?;
        self.queue.flush().await;
        self.api.delete_session(&id).await?;
        self.close();
        Ok(())
    }

    /// Wait for the next thing the view layer should react to.
    ///
    /// Change notifications and reconnections both trigger a refetch and
    /// surface as [`ControllerEvent::Updated`]; other connectivity
    /// transitions surface as [`ControllerEvent::Connection`]. Returns
    /// `None` once the session is closed and its events drained.
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        loop {
            let event = self.active.as_mut()?.events.recv().await?;
            match event {
                MonitorEvent::StateChanged(ConnectionState::Connected) => {
                    let active = self.active.as_mut()?;
                    if !active.seen_connected {
                        active.seen_connected = true;
                        return Some(ControllerEvent::Connection(ConnectionState::Connected));
                    }
                    // Notifications may have been missed during the outage;
                    // refetch instead of trusting stream completeness.
                    match self.refresh().await {
                        Ok(()) => {
                            return Some(ControllerEvent::Updated(
                                self.active.as_ref()?.session.clone(),
                            ));
                        }
                        Err(SyncError::SessionGone(_)) => {
                            self.close();
                            return Some(ControllerEvent::SessionGone);
                        }
                        Err(e) => {
                            warn!("refetch after reconnect failed: {e}");
                            return Some(ControllerEvent::Connection(ConnectionState::Connected));
                        }
                    }
                }
                MonitorEvent::StateChanged(state) => {
                    return Some(ControllerEvent::Connection(state));
                }
                MonitorEvent::Change(payload) => {
                    debug!(payload, "change notification, refetching session");
                    match self.refresh().await {
                        Ok(()) => {
                            return Some(ControllerEvent::Updated(
                                self.active.as_ref()?.session.clone(),
                            ));
                        }
                        Err(SyncError::SessionGone(_)) => {
                            self.close();
                            return Some(ControllerEvent::SessionGone);
                        }
                        Err(e) => {
                            // Transient fetch failure; the next notification
                            // or reconnection will retry.
                            warn!("refetch after change notification failed: {e}");
                        }
                    }
                }
            }
        }
    }

    fn active_id(&self) -> Result<SessionId, SyncError> {
        self.active
            .as_ref()
            .map(|active| active.session.id.clone())
            .ok_or(SyncError::NoOpenSession)
    }

    async fn fetch(&self, id: &SessionId) -> Result<Session, SyncError> {
        match self.api.get_session(id).await {
            Ok(session) => Ok(session),
            Err(ApiError::NotFound(_)) => Err(SyncError::SessionGone(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Refetch the open session. An unflushed local prompt edit outranks
    /// whatever the server last saw, so a slow flush cannot clobber text
    /// the user is still typing.
    async fn refresh(&mut self) -> Result<(), SyncError> {
        let id = self.active_id()?;
        let mut session = self.fetch(&id).await?;
        if let Some(pending) = self.queue.pending_value(&id) {
            session.prompt = pending;
        }
        if let Some(active) = self.active.as_mut() {
            active.session = session;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use shared::{
        ModelOverview, ModelSettingsSnapshot, PresetOverview, ResponseStatus, SessionOverview,
        TemplateOverview,
    };

    use crate::transport::ChangeStream;

    /// Window long enough that scheduled flushes never fire inside a test.
    const PARKED: Duration = Duration::from_secs(600);

    fn sample_session(id: &str, title: &str, prompt: &str) -> Session {
        Session {
            id: SessionId::from(id),
            creation_timestamp: Utc::now(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            responses: vec![],
            model_settings: ModelSettings::default(),
            attached_files: vec![],
        }
    }

    fn sample_response(id: &str) -> Response {
        Response {
            id: id.to_string(),
            creation_timestamp: Utc::now(),
            status: ResponseStatus::Pending,
            messages: vec![],
            model_settings_snapshot: ModelSettingsSnapshot {
                model_id: None,
                template_id: None,
                preset_id: None,
                model_name: "model".to_string(),
                template_name: "template".to_string(),
                preset_name: "preset".to_string(),
            },
        }
    }

    /// Records every call in order and serves a single canned session.
    struct MockApi {
        calls: Mutex<Vec<String>>,
        session: Mutex<Session>,
        gone: AtomicBool,
    }

    impl MockApi {
        fn new(session: Session) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                session: Mutex::new(session),
                gone: AtomicBool::new(false),
            }
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn set_session(&self, session: Session) {
            *self.session.lock().unwrap() = session;
        }

        fn mark_gone(&self) {
            self.gone.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl WorkbenchApi for MockApi {
        async fn ping(&self) -> Result<(), ApiError> {
            self.log("ping");
            Ok(())
        }

        async fn session_overview(&self) -> Result<SessionOverview, ApiError> {
            self.log("session_overview");
            Ok(SessionOverview {
                session_summaries: vec![],
            })
        }

        async fn create_session(
            &self,
            _defaults: Option<ModelSettings>,
        ) -> Result<Session, ApiError> {
            self.log("create_session");
            Ok(self.session.lock().unwrap().clone())
        }

        async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError> {
            self.log("get_session");
            if self.gone.load(Ordering::SeqCst) {
                return Err(ApiError::NotFound(format!("session {}", id)));
            }
            Ok(self.session.lock().unwrap().clone())
        }

        async fn delete_session(&self, _id: &SessionId) -> Result<(), ApiError> {
            self.log("delete_session");
            Ok(())
        }

        async fn put_model_settings(
            &self,
            _id: &SessionId,
            settings: &ModelSettings,
        ) -> Result<(), ApiError> {
            self.log(format!("put_model_settings {}", settings.model_id));
            Ok(())
        }

        async fn create_response(&self, _id: &SessionId) -> Result<Response, ApiError> {
            self.log("create_response");
            Ok(sample_response("r-new"))
        }

        async fn delete_response(
            &self,
            _id: &SessionId,
            response_id: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("delete_response {}", response_id));
            Ok(())
        }

        async fn abort_response(
            &self,
            _id: &SessionId,
            response_id: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("abort_response {}", response_id));
            Ok(())
        }

        async fn create_message(
            &self,
            _id: &SessionId,
            response_id: &str,
            _text: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("create_message {}", response_id));
            Ok(())
        }

        async fn continue_response(
            &self,
            _id: &SessionId,
            response_id: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("continue_response {}", response_id));
            Ok(())
        }

        async fn delete_message(
            &self,
            _id: &SessionId,
            response_id: &str,
            message_id: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("delete_message {} {}", response_id, message_id));
            Ok(())
        }

        async fn delete_attached_file(
            &self,
            _id: &SessionId,
            filename: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("delete_attached_file {}", filename));
            Ok(())
        }

        async fn model_overview(&self) -> Result<ModelOverview, ApiError> {
            self.log("model_overview");
            Ok(ModelOverview { models: vec![] })
        }

        async fn scan_models(&self) -> Result<ModelOverview, ApiError> {
            self.log("scan_models");
            Ok(ModelOverview { models: vec![] })
        }

        async fn template_overview(&self) -> Result<TemplateOverview, ApiError> {
            self.log("template_overview");
            Ok(TemplateOverview { templates: vec![] })
        }

        async fn preset_overview(&self) -> Result<PresetOverview, ApiError> {
            self.log("preset_overview");
            Ok(PresetOverview { presets: vec![] })
        }
    }

    #[async_trait]
    impl PersistenceTransport for MockApi {
        async fn write_field(
            &self,
            _session_id: &SessionId,
            field: &str,
            value: &str,
        ) -> Result<(), ApiError> {
            self.log(format!("write_field {}={}", field, value));
            Ok(())
        }
    }

    struct TestStream {
        rx: mpsc::UnboundedReceiver<Result<String, ApiError>>,
    }

    #[async_trait]
    impl ChangeStream for TestStream {
        async fn next(&mut self) -> Option<Result<String, ApiError>> {
            self.rx.recv().await
        }
    }

    /// Always connects; tests drive the latest stream by hand.
    #[derive(Clone, Default)]
    struct TestConnector {
        senders: Arc<Mutex<Vec<mpsc::UnboundedSender<Result<String, ApiError>>>>>,
    }

    impl TestConnector {
        fn emit_change(&self) {
            self.senders
                .lock()
                .unwrap()
                .last()
                .expect("no connection yet")
                .send(Ok(shared::protocol::CHANGE_NOTIFICATION.to_string()))
                .unwrap();
        }

        fn drop_connection(&self) {
            self.senders.lock().unwrap().pop();
        }

        fn connections(&self) -> usize {
            self.senders.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChangeStreamConnector for TestConnector {
        type Stream = TestStream;

        async fn connect(&self, _session_id: &SessionId) -> Result<TestStream, ApiError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(TestStream { rx })
        }
    }

    type TestController = SessionController<MockApi, TestConnector>;

    async fn open_and_connect(
        controller: &mut TestController,
        id: &str,
    ) {
        controller.open(SessionId::from(id)).await.unwrap();
        loop {
            match next(controller).await {
                ControllerEvent::Connection(ConnectionState::Connected) => break,
                ControllerEvent::Connection(_) => continue,
                other => panic!("unexpected event while connecting: {:?}", other),
            }
        }
    }

    async fn next(controller: &mut TestController) -> ControllerEvent {
        tokio::time::timeout(Duration::from_secs(2), controller.next_event())
            .await
            .expect("timed out waiting for controller event")
            .expect("controller closed")
    }

    #[tokio::test]
    async fn pending_edit_flushes_before_dependent_action() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), TestConnector::default(), PARKED);

        controller.open(SessionId::from("s-1")).await.unwrap();
        controller.edit_prompt("a").unwrap();
        controller.edit_prompt("ab").unwrap();
        controller.edit_prompt("abcd").unwrap();
        controller.submit_prompt().await.unwrap();

        let calls = api.calls();
        let writes: Vec<_> = calls.iter().filter(|c| c.starts_with("write_field")).collect();
        assert_eq!(writes, ["write_field prompt=abcd"]);

        let write_at = calls.iter().position(|c| c.starts_with("write_field")).unwrap();
        let respond_at = calls.iter().position(|c| c == "create_response").unwrap();
        assert!(write_at < respond_at, "flush must precede the response call");
    }

    #[tokio::test]
    async fn change_notification_triggers_refetch() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let connector = TestConnector::default();
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), connector.clone(), PARKED);

        open_and_connect(&mut controller, "s-1").await;
        assert_eq!(api.calls().iter().filter(|c| *c == "get_session").count(), 1);

        api.set_session(sample_session("s-1", "Renamed", "server text"));
        connector.emit_change();

        match next(&mut controller).await {
            ControllerEvent::Updated(session) => {
                assert_eq!(session.title, "Renamed");
                assert_eq!(session.prompt, "server text");
            }
            other => panic!("expected Updated, got {:?}", other),
        }
        assert_eq!(api.calls().iter().filter(|c| *c == "get_session").count(), 2);
    }

    #[tokio::test]
    async fn refetch_keeps_unflushed_prompt_edit() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "old")));
        let connector = TestConnector::default();
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), connector.clone(), PARKED);

        open_and_connect(&mut controller, "s-1").await;
        controller.edit_prompt("still typing").unwrap();

        connector.emit_change();
        match next(&mut controller).await {
            ControllerEvent::Updated(session) => {
                assert_eq!(session.prompt, "still typing");
            }
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn vanished_session_surfaces_as_gone() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let connector = TestConnector::default();
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), connector.clone(), PARKED);

        open_and_connect(&mut controller, "s-1").await;
        api.mark_gone();
        connector.emit_change();

        assert!(matches!(
            next(&mut controller).await,
            ControllerEvent::SessionGone
        ));
        assert!(controller.session().is_none());
        assert_eq!(controller.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn reconnection_refetches_proactively() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let connector = TestConnector::default();
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), connector.clone(), PARKED);

        open_and_connect(&mut controller, "s-1").await;

        // The session changed while the connection was down.
        api.set_session(sample_session("s-1", "After outage", ""));
        connector.drop_connection();

        loop {
            match next(&mut controller).await {
                ControllerEvent::Updated(session) => {
                    assert_eq!(session.title, "After outage");
                    break;
                }
                ControllerEvent::Connection(_) => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn switching_sessions_replaces_the_monitor() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let connector = TestConnector::default();
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), connector.clone(), PARKED);

        open_and_connect(&mut controller, "s-1").await;

        api.set_session(sample_session("s-2", "Second", ""));
        open_and_connect(&mut controller, "s-2").await;
        assert_eq!(controller.session().unwrap().id, SessionId::from("s-2"));
        assert_eq!(connector.connections(), 2);
    }

    #[tokio::test]
    async fn delete_session_stops_monitoring() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), TestConnector::default(), PARKED);

        open_and_connect(&mut controller, "s-1").await;
        controller.delete_session().await.unwrap();

        assert!(api.calls().contains(&"delete_session".to_string()));
        assert!(controller.session().is_none());
        assert_eq!(controller.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn actions_without_an_open_session_are_rejected() {
        let api = Arc::new(MockApi::new(sample_session("s-1", "First", "")));
        let mut controller =
            TestController::with_flush_window(Arc::clone(&api), TestConnector::default(), PARKED);

        assert!(matches!(
            controller.edit_prompt("text"),
            Err(SyncError::NoOpenSession)
        ));
        assert!(matches!(
            controller.submit_prompt().await,
            Err(SyncError::NoOpenSession)
        ));
    }
}
