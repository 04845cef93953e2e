use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use sensorline_core::key::SeriesKey;
use sensorline_core::model::sample::Sample;
use sensorline_core::time::now_ms;
use sensorline_ingest::Clock;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::feed::{HistorySource, LiveFeed};
use crate::window::LiveMergeWindow;

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum WindowCommand {
    SelectRange(Duration),
    SelectKey(SeriesKey),
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowView {
    pub key: SeriesKey,
    pub range_ms: i64,
    pub now_ms: i64,
    pub points: Vec<Sample>,
    pub error: Option<String>,
}

impl WindowView {
    pub fn is_awaiting_data(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.points.last()
    }
}

enum Input {
    Command(Option<WindowCommand>),
    Live(Option<Sample>),
    Reconnect,
}

pub struct WindowSession {
    window: LiveMergeWindow,
    history: Arc<dyn HistorySource>,
    feed: Arc<dyn LiveFeed>,
    live: BoxStream<'static, Sample>,
    clock: Clock,
    last_error: Option<String>,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
    view_tx: watch::Sender<WindowView>,
}

impl WindowSession {
    pub fn new(
        window: LiveMergeWindow,
        history: Arc<dyn HistorySource>,
        feed: Arc<dyn LiveFeed>,
    ) -> Self {
        let clock: Clock = Arc::new(now_ms);
        let initial = render(&window, clock(), None);
        let (view_tx, _) = watch::channel(initial);
        Self {
            window,
            history,
            feed,
            live: futures::stream::pending().boxed(),
            clock,
            last_error: None,
            reconnect_at: None,
            reconnect_delay: RECONNECT_MIN,
            view_tx,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.publish();
        self
    }

    pub fn window(&self) -> &LiveMergeWindow {
        &self.window
    }

    pub fn subscribe(&self) -> watch::Receiver<WindowView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> WindowView {
        render(&self.window, (self.clock)(), self.last_error.clone())
    }

    pub async fn start(&mut self) {
        self.open_feed();
        info!(series = %self.window.key(), range_ms = self.window.range_ms(), "window session started");
        self.refresh().await;
    }

    pub async fn apply(&mut self, command: WindowCommand) {
        match command {
            WindowCommand::SelectRange(range) => {
                self.window.select_range(range);
                self.refresh().await;
            }
            WindowCommand::SelectKey(key) => {
                if &key == self.window.key() {
                    debug!(series = %key, "key unchanged");
                    return;
                }
                self.live = futures::stream::pending().boxed();
                self.window.reset(key);
                self.reconnect_delay = RECONNECT_MIN;
                self.open_feed();
                self.last_error = None;
                self.refresh().await;
            }
            WindowCommand::Refresh => {
                if self.reconnect_at.is_some() {
                    self.open_feed();
                }
                self.refresh().await;
            }
        }
    }

    pub fn on_live(&mut self, sample: Sample) {
        self.reconnect_delay = RECONNECT_MIN;
        self.window.push_live(sample);
        self.publish();
    }

    pub async fn refresh(&mut self) {
        let now = (self.clock)();
        let from = now.saturating_sub(self.window.range_ms());
        let key = self.window.key().clone();
        match self.history.fetch(&key, from, now).await {
            Ok(points) => {
                let taken = self.window.seed(points);
                debug!(series = %key, taken, buffered = self.window.len(), "window seeded");
                self.last_error = None;
            }
            Err(e) => {
                warn!(series = %key, error = %e, "history fetch failed");
                self.last_error = Some(e.to_string());
            }
        }
        self.publish();
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<WindowCommand>) {
        self.start().await;
        loop {
            let reconnect_at = self.reconnect_at;
            let input = tokio::select! {
                cmd = commands.recv() => Input::Command(cmd),
                sample = self.live.next() => Input::Live(sample),
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() => Input::Reconnect,
            };
            match input {
                Input::Command(Some(cmd)) => self.apply(cmd).await,
                Input::Command(None) => break,
                Input::Live(Some(sample)) => self.on_live(sample),
                Input::Live(None) => self.feed_ended(),
                Input::Reconnect => {
                    info!(series = %self.window.key(), "reopening live feed");
                    self.open_feed();
                    self.refresh().await;
                }
            }
        }
        info!(series = %self.window.key(), "window session stopped");
    }

    fn open_feed(&mut self) {
        self.reconnect_at = None;
        self.live = self.feed.open_stream(self.window.key());
    }

    fn feed_ended(&mut self) {
        let delay = self.reconnect_delay;
        warn!(series = %self.window.key(), retry_in = ?delay, "live feed ended");
        self.live = futures::stream::pending().boxed();
        self.reconnect_at = Some(Instant::now() + delay);
        self.reconnect_delay = (delay * 2).min(RECONNECT_MAX);
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }
}

fn render(window: &LiveMergeWindow, now_ms: i64, error: Option<String>) -> WindowView {
    WindowView {
        key: window.key().clone(),
        range_ms: window.range_ms(),
        now_ms,
        points: window.displayed(now_ms),
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use sensorline_core::error::{Result, SensorlineError};
    use sensorline_ingest::LiveHub;

    use super::*;
    use crate::window::DEFAULT_CAPACITY;

    const NOW: i64 = 1_000_000;

    #[derive(Default)]
    struct FixedHistory {
        points: Vec<Sample>,
        fail: bool,
        requests: Mutex<Vec<(String, i64, i64)>>,
    }

    impl HistorySource for FixedHistory {
        fn fetch(
            &self,
            key: &SeriesKey,
            from_ms: i64,
            to_ms: i64,
        ) -> BoxFuture<'static, Result<Vec<Sample>>> {
            self.requests
                .lock()
                .unwrap()
                .push((key.as_str().to_string(), from_ms, to_ms));
            let result = if self.fail {
                Err(SensorlineError::Source("history unavailable".into()))
            } else {
                Ok(self.points.clone())
            };
            Box::pin(async move { result })
        }
    }

    struct DroppingFeed {
        hub: LiveHub,
        opens: AtomicUsize,
    }

    impl LiveFeed for DroppingFeed {
        fn open_stream(&self, key: &SeriesKey) -> BoxStream<'static, Sample> {
            if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::stream::empty().boxed()
            } else {
                self.hub.open_stream(key)
            }
        }
    }

    fn dropping_session(feed: Arc<DroppingFeed>) -> WindowSession {
        let window = LiveMergeWindow::new(key("singapore"), Duration::from_secs(60), DEFAULT_CAPACITY);
        WindowSession::new(window, Arc::new(FixedHistory::default()), feed)
            .with_clock(Arc::new(|| NOW))
    }

    fn key(raw: &str) -> SeriesKey {
        SeriesKey::parse(raw).unwrap()
    }

    fn session(history: Arc<FixedHistory>, hub: &LiveHub) -> WindowSession {
        let window = LiveMergeWindow::new(key("singapore"), Duration::from_secs(60), DEFAULT_CAPACITY);
        WindowSession::new(window, history, Arc::new(hub.clone())).with_clock(Arc::new(|| NOW))
    }

    async fn wait_for(
        rx: &mut watch::Receiver<WindowView>,
        pred: impl Fn(&WindowView) -> bool,
    ) -> WindowView {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let view = rx.borrow_and_update();
                    if pred(&view) {
                        return view.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn start_seeds_the_selected_range() {
        let history = Arc::new(FixedHistory {
            points: vec![Sample::new(NOW - 120_000, 1.0), Sample::new(NOW - 30_000, 2.0)],
            ..Default::default()
        });
        let hub = LiveHub::new(16);
        let mut session = session(history.clone(), &hub);
        session.start().await;

        let view = session.view();
        assert_eq!(view.points, vec![Sample::new(NOW - 30_000, 2.0)]);
        assert_eq!(
            history.requests.lock().unwrap().as_slice(),
            &[("singapore".to_string(), NOW - 60_000, NOW)]
        );
        assert_eq!(hub.subscriber_count(&key("singapore")), 1);
    }

    #[tokio::test]
    async fn live_samples_reach_the_view() {
        let hub = LiveHub::new(16);
        let session = session(Arc::new(FixedHistory::default()), &hub);
        let mut views = session.subscribe();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(session.run(rx));

        wait_for(&mut views, |_| true).await;
        assert!(views.borrow().is_awaiting_data());
        while hub.subscriber_count(&key("singapore")) == 0 {
            tokio::task::yield_now().await;
        }

        hub.publish(&key("singapore"), Sample::new(NOW, 27.0));
        let view = wait_for(&mut views, |v| !v.is_awaiting_data()).await;
        assert_eq!(view.latest(), Some(&Sample::new(NOW, 27.0)));

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn selecting_a_key_resets_and_refetches() {
        let history = Arc::new(FixedHistory::default());
        let hub = LiveHub::new(16);
        let mut session = session(history.clone(), &hub);
        session.start().await;
        session.on_live(Sample::new(NOW, 1.0));
        assert_eq!(session.window().len(), 1);

        session.apply(WindowCommand::SelectKey(key("Oslo"))).await;

        assert!(session.window().is_empty());
        assert_eq!(session.view().key, key("oslo"));
        assert_eq!(hub.subscriber_count(&key("singapore")), 0);
        assert_eq!(hub.subscriber_count(&key("oslo")), 1);
        assert_eq!(history.requests.lock().unwrap().len(), 2);

        session.apply(WindowCommand::SelectKey(key("OSLO"))).await;
        assert_eq!(history.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn widening_the_range_refetches_history() {
        let history = Arc::new(FixedHistory {
            points: vec![Sample::new(NOW - 3_600_000, 5.0)],
            ..Default::default()
        });
        let hub = LiveHub::new(16);
        let mut session = session(history.clone(), &hub);
        session.start().await;
        assert!(session.view().is_awaiting_data());

        session
            .apply(WindowCommand::SelectRange(Duration::from_secs(6 * 3600)))
            .await;
        assert_eq!(session.view().points, vec![Sample::new(NOW - 3_600_000, 5.0)]);
        assert_eq!(
            history.requests.lock().unwrap().last().map(|r| r.1),
            Some(NOW - 6 * 3_600_000)
        );
    }

    #[tokio::test]
    async fn history_failure_is_reported_in_the_view() {
        let history = Arc::new(FixedHistory {
            fail: true,
            ..Default::default()
        });
        let hub = LiveHub::new(16);
        let mut session = session(history, &hub);
        session.start().await;

        let view = session.view();
        assert!(view.is_awaiting_data());
        assert!(view.error.unwrap().contains("history unavailable"));

        session.on_live(Sample::new(NOW, 3.0));
        assert_eq!(session.view().points.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_feed_is_reopened_after_a_delay() {
        let hub = LiveHub::new(16);
        let feed = Arc::new(DroppingFeed {
            hub: hub.clone(),
            opens: AtomicUsize::new(0),
        });
        let session = dropping_session(feed.clone());
        let mut views = session.subscribe();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(session.run(rx));

        while hub.subscriber_count(&key("singapore")) == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(feed.opens.load(Ordering::SeqCst), 2);

        hub.publish(&key("singapore"), Sample::new(NOW, 31.0));
        let view = wait_for(&mut views, |v| !v.is_awaiting_data()).await;
        assert_eq!(view.latest(), Some(&Sample::new(NOW, 31.0)));

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn refresh_reopens_an_ended_feed() {
        let hub = LiveHub::new(16);
        let feed = Arc::new(DroppingFeed {
            hub: hub.clone(),
            opens: AtomicUsize::new(0),
        });
        let mut session = dropping_session(feed.clone());
        session.start().await;
        assert!(session.live.next().await.is_none());
        session.feed_ended();

        session.apply(WindowCommand::Refresh).await;

        assert_eq!(feed.opens.load(Ordering::SeqCst), 2);
        assert_eq!(hub.subscriber_count(&key("singapore")), 1);
        hub.publish(&key("singapore"), Sample::new(NOW, 4.0));
        let sample = session.live.next().await;
        assert_eq!(sample, Some(Sample::new(NOW, 4.0)));
    }
}
