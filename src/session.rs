//! A merge session: collector, debouncer and merger behind one owner.
//!
//! The host drives a session with two calls, both taking the current time:
//! [`MergeSession::notify`] for every reported change and
//! [`MergeSession::poll`] whenever the pending deadline may have passed.
//! Everything is single-threaded; the session is the only owner of the queue
//! and the timer. A run happens inside `poll`/`flush`, which hold the session
//! mutably, so no notification can arrive mid-run through this type.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::collect::{ChangeCollector, Notification};
use crate::config::MergeOptions;
use crate::debounce::{DebounceState, Debouncer};
use crate::error::MergeError;
use crate::merger::{ArtifactMerger, RunReport};

pub struct MergeSession {
    merger: ArtifactMerger,
    collector: ChangeCollector,
    debouncer: Debouncer,
    closed: bool,
}

impl MergeSession {
    #[must_use]
    pub fn new(options: MergeOptions) -> Self {
        Self::with_merger(ArtifactMerger::new(options))
    }

    #[must_use]
    pub fn with_merger(merger: ArtifactMerger) -> Self {
        let cfg = &merger.options().config;
        let collector = ChangeCollector::new(cfg.input.clone(), cfg.output.clone());
        let debouncer = Debouncer::new(cfg.debounce());
        let closed = cfg.is_close;
        Self {
            merger,
            collector,
            debouncer,
            closed,
        }
    }

    /// Handle one change report. `next` is always called exactly once,
    /// after the change is recorded, so the host pipeline can continue.
    pub fn notify(&mut self, notification: &Notification, now: Instant, next: impl FnOnce()) {
        if !self.closed {
            self.collector.record(notification);
            let armed = self.debouncer.arm(now);
            debug!(?armed, queued = self.collector.len(), "timer armed");
        }
        next();
    }

    /// Run the merge if the timer has fired by `now`.
    ///
    /// Returns `Ok(None)` when nothing was due or the primary tree is not
    /// built yet (the timer is re-armed and the queue kept in that case).
    ///
    /// # Errors
    /// Any non-recoverable [`MergeError`]. The session is left idle; the next
    /// notification starts a clean retry.
    pub fn poll(&mut self, now: Instant) -> Result<Option<RunReport>, MergeError> {
        if self.closed || !self.debouncer.due(now) {
            return Ok(None);
        }
        self.fire(now)
    }

    /// Run a pending merge immediately, ignoring the deadline.
    ///
    /// # Errors
    /// As [`Self::poll`].
    pub fn flush(&mut self, now: Instant) -> Result<Option<RunReport>, MergeError> {
        if self.closed || self.debouncer.next_deadline().is_none() {
            return Ok(None);
        }
        self.fire(now)
    }

    fn fire(&mut self, now: Instant) -> Result<Option<RunReport>, MergeError> {
        if !self.debouncer.begin_run() {
            return Ok(None);
        }

        let bridge = match self.merger.prepare() {
            Ok(bridge) => bridge,
            Err(MergeError::NotBuiltYet { entry }) => {
                info!(entry = %entry.display(), "primary tree not built yet, waiting");
                self.debouncer.finish_run(now, true);
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "merge run aborted before copying");
                self.debouncer.finish_run(now, false);
                return Err(e);
            }
        };

        let queue = self.collector.drain();
        let result = self.merger.apply(bridge, &queue);
        self.debouncer.finish_run(now, false);

        match result {
            Ok(report) => {
                info!(
                    strategy = ?report.strategy,
                    files_copied = report.files_copied,
                    overlay = report.overlay.is_some(),
                    "merge run complete"
                );
                Ok(Some(report))
            }
            Err(e) => {
                warn!(error = %e, "merge run failed");
                Err(e)
            }
        }
    }

    /// The pending deadline, for a driver loop to sleep until.
    #[must_use]
    pub const fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    #[must_use]
    pub const fn state(&self) -> DebounceState {
        self.debouncer.state()
    }

    #[must_use]
    pub fn queued(&self) -> &[std::path::PathBuf] {
        self.collector.queue()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn merger(&self) -> &ArtifactMerger {
        &self.merger
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::FileKind;
    use crate::config::MergeConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    fn session(is_close: bool) -> MergeSession {
        let cfg = MergeConfig {
            input: PathBuf::from("/nowhere/src"),
            output: PathBuf::from("/nowhere/dist"),
            target: PathBuf::from("/nowhere/out"),
            is_close,
            ..MergeConfig::default()
        };
        MergeSession::new(MergeOptions::new(cfg).unwrap())
    }

    #[test]
    fn next_called_exactly_once_even_when_closed() {
        for closed in [false, true] {
            let mut s = session(closed);
            let mut calls = 0;
            s.notify(
                &Notification::new("/nowhere/dist/a.js", FileKind::Script),
                Instant::now(),
                || calls += 1,
            );
            assert_eq!(calls, 1);
        }
    }

    #[test]
    fn closed_session_records_nothing() {
        let mut s = session(true);
        let t0 = Instant::now();
        s.notify(&Notification::new("/nowhere/dist/a.js", FileKind::Script), t0, || {});
        assert!(s.queued().is_empty());
        assert_eq!(s.state(), DebounceState::Idle);
        assert!(s.poll(t0 + Duration::from_secs(5)).unwrap().is_none());
    }

    #[test]
    fn not_built_yet_rearms_and_keeps_queue() {
        let mut s = session(false);
        let t0 = Instant::now();
        s.notify(&Notification::new("/nowhere/dist/a.js", FileKind::Script), t0, || {});

        let fired = t0 + Duration::from_millis(500);
        assert!(s.poll(fired).unwrap().is_none());

        assert_eq!(s.next_deadline(), Some(fired + Duration::from_millis(500)));
        assert_eq!(s.queued().len(), 1);
    }

    #[test]
    fn relative_config_matches_absolute_reports() {
        let cwd = std::env::current_dir().unwrap();
        let cfg = MergeConfig {
            target: PathBuf::from("out"),
            ..MergeConfig::default()
        };
        let mut s = MergeSession::new(MergeOptions::new(cfg).unwrap());
        let t0 = Instant::now();
        s.notify(
            &Notification::new(cwd.join("src/pages/a.wxml"), FileKind::Markup),
            t0,
            || {},
        );
        s.notify(
            &Notification::new(cwd.join("dist/pages/a.js"), FileKind::Script),
            t0,
            || {},
        );
        assert_eq!(
            s.queued(),
            &[cwd.join("dist/pages/a.wxml"), cwd.join("dist/pages/a.js")]
        );
    }

    #[test]
    fn flush_ignores_deadline() {
        let mut s = session(false);
        let t0 = Instant::now();
        assert!(s.flush(t0).unwrap().is_none());
        s.notify(&Notification::new("/nowhere/dist/a.js", FileKind::Script), t0, || {});
        // Not built: flush attempts the run and re-arms.
        assert!(s.flush(t0).unwrap().is_none());
        assert!(s.next_deadline().is_some());
    }
}
