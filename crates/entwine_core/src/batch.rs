//! Fan-in of concurrent write closures into shared write transactions.
//!
//! Single write transactions pay a full commit (and fsync) each; the batch
//! coordinator amortizes that cost by coalescing closures from many threads
//! into one backend write transaction. A worker thread is spawned when the
//! first request arrives and exits when the queue drains.

use crate::context::Context;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::store::StoreShared;
use crate::transaction::{Transaction, TxnInner};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// A queued write closure.
///
/// Closures may run more than once: when any member of a batch fails, the
/// shared transaction is rolled back and every member is re-run in a
/// transaction of its own, so one caller's error cannot discard another
/// caller's writes.
type BatchFn<T> = Box<dyn FnMut(&mut Transaction<T>) -> Result<()> + Send>;

/// How often a waiting caller without a deadline rechecks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

pub(crate) struct BatchCoordinator<T: Entity> {
    shared: Arc<StoreShared>,
    state: Arc<Mutex<BatchState<T>>>,
    wakeup: Arc<Condvar>,
    window: Duration,
    limit: usize,
}

struct BatchState<T: Entity> {
    pending: VecDeque<Arc<BatchRequest<T>>>,
    worker_running: bool,
    worker: Option<JoinHandle<()>>,
    shutdown: bool,
}

struct BatchRequest<T: Entity> {
    /// The caller's closure; `None` once claimed by the worker or withdrawn
    /// by a cancelled caller.
    work: Mutex<Option<BatchFn<T>>>,
    ctx: Context,
    result: Mutex<Option<Result<()>>>,
    done: Condvar,
}

impl<T: Entity> BatchRequest<T> {
    fn finish(&self, outcome: Result<()>) {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(outcome);
            self.done.notify_all();
        }
    }
}

impl<T: Entity> BatchCoordinator<T> {
    pub(crate) fn new(shared: Arc<StoreShared>, window: Duration, limit: usize) -> Self {
        Self {
            shared,
            state: Arc::new(Mutex::new(BatchState {
                pending: VecDeque::new(),
                worker_running: false,
                worker: None,
                shutdown: false,
            })),
            wakeup: Arc::new(Condvar::new()),
            window,
            limit,
        }
    }

    /// Enqueues `work` and blocks until its result is delivered or `ctx`
    /// withdraws it.
    pub(crate) fn run<F>(&self, ctx: Context, work: F) -> Result<()>
    where
        F: FnMut(&mut Transaction<T>) -> Result<()> + Send + 'static,
    {
        ctx.check()?;
        let request = Arc::new(BatchRequest {
            work: Mutex::new(Some(Box::new(work) as BatchFn<T>)),
            ctx: ctx.clone(),
            result: Mutex::new(None),
            done: Condvar::new(),
        });

        {
            let mut state = self.state.lock();
            if state.shutdown {
                return Err(Error::Closed);
            }
            state.pending.push_back(Arc::clone(&request));
            debug!(pending = state.pending.len(), "batch.enqueue");
            if state.worker_running {
                self.wakeup.notify_one();
            } else {
                state.worker_running = true;
                let shared = Arc::clone(&self.shared);
                let worker_state = Arc::clone(&self.state);
                let wakeup = Arc::clone(&self.wakeup);
                let (window, limit) = (self.window, self.limit);
                state.worker = Some(thread::spawn(move || {
                    worker_loop(&shared, &worker_state, &wakeup, window, limit);
                }));
            }
        }

        self.wait(&ctx, &request)
    }

    fn wait(&self, ctx: &Context, request: &Arc<BatchRequest<T>>) -> Result<()> {
        let mut result = request.result.lock();
        loop {
            if let Some(outcome) = result.take() {
                return outcome;
            }

            if let Err(cancel) = ctx.check() {
                // Withdraw the closure if the worker hasn't claimed it yet;
                // once it is running, the closure observes cancellation at
                // its next suspension point and delivers the result itself.
                if request.work.lock().take().is_some() {
                    return Err(cancel);
                }
                request.done.wait_for(&mut result, CANCEL_POLL);
                continue;
            }

            match ctx.deadline() {
                Some(deadline) => {
                    request.done.wait_until(&mut result, deadline);
                }
                None => {
                    request.done.wait_for(&mut result, CANCEL_POLL);
                }
            }
        }
    }

    /// Stops accepting new requests and joins the worker after it drains.
    pub(crate) fn shutdown(&self) {
        let worker = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.worker.take()
        };
        self.wakeup.notify_all();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

fn worker_loop<T: Entity>(
    shared: &Arc<StoreShared>,
    state: &Arc<Mutex<BatchState<T>>>,
    wakeup: &Arc<Condvar>,
    window: Duration,
    limit: usize,
) {
    loop {
        let mut batch = Vec::new();
        {
            let mut guard = state.lock();
            match guard.pending.pop_front() {
                Some(first) => batch.push(first),
                None => {
                    guard.worker_running = false;
                    debug!("batch.worker_exit");
                    return;
                }
            }
        }
        coalesce(state, wakeup, &mut batch, window, limit);
        execute(shared, batch);
    }
}

/// Waits out the accumulation window, absorbing late arrivals up to the
/// batch size cap.
fn coalesce<T: Entity>(
    state: &Arc<Mutex<BatchState<T>>>,
    wakeup: &Arc<Condvar>,
    batch: &mut Vec<Arc<BatchRequest<T>>>,
    window: Duration,
    limit: usize,
) {
    let start = Instant::now();
    while batch.len() < limit {
        let Some(remaining) = window.checked_sub(start.elapsed()) else {
            break;
        };
        if remaining.is_zero() {
            break;
        }
        let mut guard = state.lock();
        if guard.pending.is_empty() {
            if guard.shutdown {
                break;
            }
            let waited = wakeup.wait_for(&mut guard, remaining);
            if waited.timed_out() && guard.pending.is_empty() {
                break;
            }
        }
        if let Some(request) = guard.pending.pop_front() {
            batch.push(request);
        }
    }
}

fn execute<T: Entity>(shared: &Arc<StoreShared>, batch: Vec<Arc<BatchRequest<T>>>) {
    // Claim each caller's closure; cancelled callers have already withdrawn
    // theirs.
    let mut members: Vec<(Arc<BatchRequest<T>>, BatchFn<T>)> = Vec::new();
    for request in batch {
        let work = request.work.lock().take();
        match work {
            Some(work) => members.push((request, work)),
            None => request.finish(Err(Error::Cancelled)),
        }
    }
    if members.is_empty() {
        return;
    }
    debug!(callers = members.len(), "batch.execute");

    let writer = match shared.engine.begin_write() {
        Ok(writer) => writer,
        Err(err) => {
            let err = Arc::new(Error::Storage(err));
            for (request, _) in &members {
                request.finish(Err(Error::BatchFailed(Arc::clone(&err))));
            }
            return;
        }
    };

    let mut txn = Transaction::new(TxnInner::Write(writer), Arc::clone(shared), Context::background());
    let mut any_failed = false;
    for (request, work) in &mut members {
        txn.set_context(request.ctx.clone());
        if work(&mut txn).is_err() {
            any_failed = true;
        }
    }
    // The commit is a suspension point for every member; a caller whose
    // context died after its closure ran must not have its writes committed.
    if members.iter().any(|(request, _)| request.ctx.check().is_err()) {
        any_failed = true;
    }

    if any_failed {
        // Roll the shared transaction back and isolate each caller, so a
        // failing closure cannot take the others down with it.
        drop(txn);
        debug!(callers = members.len(), "batch.isolate");
        for (request, work) in &mut members {
            request.finish(run_isolated(shared, &request.ctx, work));
        }
        return;
    }

    let commit = match txn.into_inner() {
        TxnInner::Write(writer) => writer.commit().map_err(Error::from),
        TxnInner::Read(_) => Ok(()),
    };
    match commit {
        Ok(()) => {
            for (request, _) in &members {
                request.finish(Ok(()));
            }
        }
        Err(err) => {
            debug!(error = %err, "batch.commit_failed");
            let err = Arc::new(err);
            for (request, _) in &members {
                request.finish(Err(Error::BatchFailed(Arc::clone(&err))));
            }
        }
    }
}

fn run_isolated<T: Entity>(
    shared: &Arc<StoreShared>,
    ctx: &Context,
    work: &mut BatchFn<T>,
) -> Result<()> {
    ctx.check()?;
    let writer = shared.engine.begin_write()?;
    let mut txn = Transaction::new(TxnInner::Write(writer), Arc::clone(shared), ctx.clone());
    work(&mut txn)?;
    ctx.check()?;
    match txn.into_inner() {
        TxnInner::Write(writer) => writer.commit()?,
        TxnInner::Read(_) => {}
    }
    Ok(())
}
