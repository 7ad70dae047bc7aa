//! Full pagination on a worker thread.
//!
//! One run at a time. A run paginates every chapter, checking its token
//! between chapters, then publishes under the session lock only if the token
//! is still live and the session is the one it was started for.

use crate::cache::LayoutCache;
use crate::cancellation::{Cancelled, CancellationToken};
use crate::pagination::{PageTable, chapter_pages};
use crate::session::{PaginationJob, SharedSession, lock_session};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationOutcome {
    Published { generation: u64, pages: usize },
    /// The session was closed or reopened while the run was in flight.
    Stale,
    Cancelled,
}

/// Paginate every chapter of `job`, bailing out between chapters on cancel.
pub fn run_job(job: &PaginationJob, token: &CancellationToken) -> Result<PageTable, Cancelled> {
    let mut table = PageTable::default();
    for chapter in job.chapters.iter() {
        token.check_cancelled("chapter")?;
        table.extend(chapter_pages(chapter.index, &chapter.text, &job.params, 0));
    }
    token.check_cancelled("publish")?;
    Ok(table)
}

/// Swap `table` into the shared session if this run is still current.
pub fn publish(
    shared: &SharedSession,
    job: &PaginationJob,
    token: &CancellationToken,
    table: PageTable,
) -> PaginationOutcome {
    let mut guard = lock_session(shared);
    if token.is_cancelled() {
        return PaginationOutcome::Cancelled;
    }
    match guard.as_mut() {
        Some(session)
            if session.generation() == job.generation
                && session.identity() == &job.identity =>
        {
            let pages = table.len();
            session.replace_page_table(table);
            PaginationOutcome::Published {
                generation: job.generation,
                pages,
            }
        }
        _ => PaginationOutcome::Stale,
    }
}

struct RunningJob {
    token: CancellationToken,
    handle: JoinHandle<()>,
    generation: u64,
}

#[derive(Default)]
pub struct BackgroundProcessor {
    running: Option<RunningJob>,
}

impl BackgroundProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run for `job`, cancelling any earlier one first.
    ///
    /// `notify` is called on the worker thread once the run finishes, whatever
    /// its outcome.
    pub fn start<F>(
        &mut self,
        job: PaginationJob,
        shared: SharedSession,
        cache: LayoutCache,
        notify: F,
    ) where
        F: FnOnce(PaginationOutcome) + Send + 'static,
    {
        self.cancel();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let generation = job.generation;
        info!(
            generation,
            chapters = job.chapters.len(),
            "Starting background pagination"
        );
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let outcome = match run_job(&job, &worker_token) {
                Ok(table) => {
                    let stored = table.clone();
                    let outcome = publish(&shared, &job, &worker_token, table);
                    if matches!(outcome, PaginationOutcome::Published { .. }) {
                        if let Err(err) = cache.put(&job.identity, &job.params_hash, &stored) {
                            warn!("Keeping in-memory page table: {err}");
                        }
                    }
                    outcome
                }
                Err(cancelled) => {
                    debug!("Background pagination stopped: {cancelled}");
                    PaginationOutcome::Cancelled
                }
            };
            info!(
                generation = job.generation,
                ?outcome,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Background pagination finished"
            );
            notify(outcome);
        });
        self.running = Some(RunningJob {
            token,
            handle,
            generation,
        });
    }

    /// Cancel the current run, if any, and wait for its thread to exit.
    pub fn cancel(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.token.cancel();
        if running.handle.join().is_err() {
            warn!(generation = running.generation, "Pagination worker panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn shutdown(&mut self) {
        self.cancel();
    }
}

impl Drop for BackgroundProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BookSession;
    use crate::session::tests::{Fixture, chapter_text};
    use std::path::Path;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn open_shared(fx: &Fixture, initial_pages: usize) -> (SharedSession, PaginationJob) {
        let (session, job) =
            BookSession::open(Path::new("/books/fake.epub"), &fx.ctx(initial_pages)).expect("open");
        (
            Arc::new(Mutex::new(Some(session))),
            job.expect("partial table needs a job"),
        )
    }

    #[test]
    fn completed_run_publishes_and_caches() {
        let fx = Fixture::new(
            "background_publish",
            vec![chapter_text(30), chapter_text(20), chapter_text(10)],
        );
        let (shared, job) = open_shared(&fx, 30);
        let identity = job.identity.clone();
        let generation = job.generation;
        let (tx, rx) = mpsc::channel();

        let mut processor = BackgroundProcessor::new();
        processor.start(job, Arc::clone(&shared), fx.cache.clone(), move |outcome| {
            let _ = tx.send(outcome);
        });
        let outcome = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("worker reports");
        processor.shutdown();

        assert_eq!(
            outcome,
            PaginationOutcome::Published {
                generation,
                pages: 60
            }
        );
        let guard = lock_session(&shared);
        let session = guard.as_ref().expect("session present");
        assert!(!session.is_partial());
        assert_eq!(session.page_table(), &fx.full_table());
        assert_eq!(
            fx.cache.get(&identity, &fx.params.params_hash()),
            Some(fx.full_table())
        );
    }

    #[test]
    fn cancelled_run_never_publishes() {
        let fx = Fixture::new("background_cancel", vec![chapter_text(10), chapter_text(10)]);
        let (shared, job) = open_shared(&fx, 4);
        let token = CancellationToken::new();
        token.cancel();

        assert!(run_job(&job, &token).is_err());
        let table = run_job(&job, &CancellationToken::new()).expect("full run");
        assert_eq!(
            publish(&shared, &job, &token, table),
            PaginationOutcome::Cancelled
        );
        assert!(lock_session(&shared).as_ref().is_some_and(|s| s.is_partial()));
    }

    #[test]
    fn stale_generation_is_not_published() {
        let fx = Fixture::new("background_stale", vec![chapter_text(10), chapter_text(10)]);
        let (shared, old_job) = open_shared(&fx, 4);
        let (reopened, _) =
            BookSession::open(Path::new("/books/fake.epub"), &fx.ctx(4)).expect("reopen");
        *lock_session(&shared) = Some(reopened);

        let table = run_job(&old_job, &CancellationToken::new()).expect("full run");
        let outcome = publish(&shared, &old_job, &CancellationToken::new(), table);

        assert_eq!(outcome, PaginationOutcome::Stale);
        assert!(lock_session(&shared).as_ref().is_some_and(|s| s.is_partial()));

        *lock_session(&shared) = None;
        let table = run_job(&old_job, &CancellationToken::new()).expect("full run");
        assert_eq!(
            publish(&shared, &old_job, &CancellationToken::new(), table),
            PaginationOutcome::Stale
        );
    }

    #[test]
    fn restarting_cancels_the_previous_run() {
        let fx = Fixture::new("background_restart", vec![chapter_text(40), chapter_text(40)]);
        let (shared, job) = open_shared(&fx, 4);
        let (tx, rx) = mpsc::channel();

        let mut processor = BackgroundProcessor::new();
        let first_tx = tx.clone();
        processor.start(job.clone(), Arc::clone(&shared), fx.cache.clone(), move |outcome| {
            let _ = first_tx.send(outcome);
        });
        processor.start(job, Arc::clone(&shared), fx.cache.clone(), move |outcome| {
            let _ = tx.send(outcome);
        });
        let outcomes: Vec<PaginationOutcome> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(10)).expect("worker reports"))
            .collect();
        processor.shutdown();

        let published = outcomes
            .iter()
            .filter(|o| matches!(o, PaginationOutcome::Published { .. }))
            .count();
        assert!(published >= 1);
        assert!(!processor.is_running());
        assert!(lock_session(&shared).as_ref().is_some_and(|s| !s.is_partial()));
    }
}
