//! Shared server harness for integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lotus_core::config::StreamingConfig;
use lotus_core::storage::{AccessPolicy, AllowAll, VideoCatalog};
use lotus_core::streaming::{StreamEngine, StreamStats};
use lotus_web::AppState;
use tokio::net::TcpListener;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Server bound to an ephemeral localhost port for the duration of a test.
pub struct TestServer {
    pub addr: SocketAddr,
    pub stats: Arc<StreamStats>,
}

impl TestServer {
    pub async fn start(catalog: Arc<dyn VideoCatalog>) -> Self {
        Self::start_with(catalog, Arc::new(AllowAll), StreamingConfig::default()).await
    }

    pub async fn start_with(
        catalog: Arc<dyn VideoCatalog>,
        policy: Arc<dyn AccessPolicy>,
        config: StreamingConfig,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = AppState::new(StreamEngine::new(catalog, policy, config));
        let stats = state.engine.stats().clone();
        tokio::spawn(lotus_web::serve(listener, state));

        Self { addr, stats }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Counts events seen on the current thread, split by level.
///
/// Only sees what the test's own runtime thread emits, so tests using it must
/// run on the default current-thread runtime.
#[derive(Clone, Default)]
pub struct EventCounter {
    total: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl EventCounter {
    /// Installs the counter as this thread's subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing_subscriber::registry().with(self.clone()).set_default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for EventCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if *event.metadata().level() == Level::ERROR {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}
