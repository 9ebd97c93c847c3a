#![forbid(unsafe_code)]

//! Scheduler configuration.
//!
//! | Variable | Effect | Default |
//! |----------|--------|---------|
//! | `RXUI_TEST_MODE` | `1`, `true`, `yes`, `on` enable test mode | off |
//! | `RXUI_BACKGROUND_THREADS` | worker count of the background pool | available parallelism |
//!
//! Test mode is a probe rather than a plain flag so that a harness can flip
//! it after the context has been built.

use std::sync::Arc;

type TestModeProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Configuration for a [`SchedulerContext`](crate::context::SchedulerContext).
#[derive(Clone)]
pub struct SchedulerConfig {
    test_mode: TestModeProbe,
    background_threads: usize,
    deferred_thread_name: String,
    background_thread_name: String,
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("test_mode", &self.test_mode())
            .field("background_threads", &self.background_threads)
            .field("deferred_thread_name", &self.deferred_thread_name)
            .field("background_thread_name", &self.background_thread_name)
            .finish()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            test_mode: Arc::new(|| false),
            background_threads: default_background_threads(),
            deferred_thread_name: "rxui-deferred".to_string(),
            background_thread_name: "rxui-background".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_flag("RXUI_TEST_MODE") {
            config = config.with_test_mode(true);
        }
        if let Some(threads) = env_usize("RXUI_BACKGROUND_THREADS") {
            config.background_threads = threads.max(1);
        }
        config
    }

    /// Test mode on, one background worker.
    pub fn for_tests() -> Self {
        Self::default()
            .with_test_mode(true)
            .with_background_threads(1)
    }

    /// Fixed test-mode answer.
    #[must_use]
    pub fn with_test_mode(self, enabled: bool) -> Self {
        self.with_test_mode_probe(move || enabled)
    }

    /// Test-mode answer computed on every scheduler write.
    #[must_use]
    pub fn with_test_mode_probe(mut self, probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.test_mode = Arc::new(probe);
        self
    }

    #[must_use]
    pub fn with_background_threads(mut self, threads: usize) -> Self {
        self.background_threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn with_deferred_thread_name(mut self, name: impl Into<String>) -> Self {
        self.deferred_thread_name = name.into();
        self
    }

    #[must_use]
    pub fn with_background_thread_name(mut self, name: impl Into<String>) -> Self {
        self.background_thread_name = name.into();
        self
    }

    /// Current answer of the test-mode probe.
    pub fn test_mode(&self) -> bool {
        (self.test_mode)()
    }

    pub fn background_threads(&self) -> usize {
        self.background_threads
    }

    pub fn deferred_thread_name(&self) -> &str {
        &self.deferred_thread_name
    }

    pub fn background_thread_name(&self) -> &str {
        &self.background_thread_name
    }
}

fn default_background_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
