//! Engine instances.
//!
//! An [`Isolate`] is a handle to a dedicated engine thread. Operations from
//! other threads are posted to that thread and the caller blocks until the
//! reply comes back, so at most one operation runs per isolate at any time.
//! Operations issued by the engine thread itself (a resolver calling back
//! into script) run inline.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crate::config::IsolateConfig;
use crate::error::{BridgeError, Result};
use crate::runtime::{self, Job, Message, Runtime};
use crate::snapshot::Snapshot;

static NEXT_ISOLATE_ID: AtomicU32 = AtomicU32::new(1);

/// One independent engine instance.
///
/// Cloning is cheap; the engine thread shuts down once the last clone (and
/// every context created on it) is gone.
#[derive(Clone)]
pub struct Isolate {
    shared: Arc<IsolateShared>,
}

struct IsolateShared {
    id: u32,
    sender: Mutex<Sender<Message>>,
    interrupt: Arc<AtomicBool>,
    /// Number of `terminate` calls so far.
    terminations: Arc<AtomicUsize>,
    thread_id: ThreadId,
    join: Option<JoinHandle<()>>,
}

impl Isolate {
    /// Start an isolate with the default configuration.
    pub fn new() -> Result<Self> {
        Self::spawn(IsolateConfig::default(), None)
    }

    /// Start an isolate; the snapshot named by `config.snapshot` is loaded
    /// and validated first.
    pub fn with_config(config: IsolateConfig) -> Result<Self> {
        let snapshot = match &config.snapshot {
            Some(path) => Some(Snapshot::load(path)?),
            None => None,
        };
        Self::spawn(config, snapshot)
    }

    /// Start an isolate whose contexts all run `snapshot` first.
    pub fn with_snapshot(snapshot: Snapshot) -> Result<Self> {
        Self::spawn(IsolateConfig::default(), Some(snapshot))
    }

    fn spawn(config: IsolateConfig, snapshot: Option<Snapshot>) -> Result<Self> {
        let id = NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, inbox) = mpsc::channel();
        let waker = sender.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let agent_config = config.agent_config();
        let terminations = Arc::new(AtomicUsize::new(0));
        let engine_terminations = Arc::clone(&terminations);

        let join = thread::Builder::new()
            .name(format!("kpio-isolate-{}", id))
            .stack_size(config.stack_size)
            .spawn(move || {
                runtime::engine_main(
                    id,
                    agent_config,
                    snapshot,
                    inbox,
                    waker,
                    engine_terminations,
                    ready_tx,
                )
            })?;
        let interrupt = ready_rx.recv().map_err(|_| BridgeError::Disposed)?;

        log::debug!("[KPIO JSBridge] Spawned isolate {}", id);
        Ok(Isolate {
            shared: Arc::new(IsolateShared {
                id,
                sender: Mutex::new(sender),
                interrupt,
                terminations,
                thread_id: join.thread().id(),
                join: Some(join),
            }),
        })
    }

    /// Process-unique id of this isolate.
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Abort the script running on this isolate, along with every operation
    /// already waiting for it.
    ///
    /// Safe from any thread, including while another thread waits on the
    /// isolate. An aborted operation fails with an
    /// `Uncaught exception: execution terminated` report. Operations issued
    /// after the call are unaffected, so terminating an idle isolate does
    /// nothing.
    pub fn terminate(&self) {
        log::debug!("[KPIO JSBridge] Terminate requested on isolate {}", self.shared.id);
        self.shared.terminations.fetch_add(1, Ordering::SeqCst);
        self.shared.interrupt.store(true, Ordering::SeqCst);
    }

    /// Run `f` with the isolate released.
    ///
    /// Called from a resolver, `f` runs on a helper thread while this engine
    /// thread keeps serving other operations; the suspended script resumes
    /// once `f` returns. Anywhere else `f` simply runs.
    pub fn unlocked<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let Some(rt) = Runtime::current_for(self.shared.id) else {
            return Ok(f());
        };

        let done = AtomicBool::new(false);
        let waker = rt.waker();
        thread::scope(|scope| {
            let worker = scope.spawn(|| {
                let _signal = DoneSignal {
                    done: &done,
                    waker,
                };
                f()
            });
            while !done.load(Ordering::Acquire) {
                rt.serve_one()?;
            }
            match worker.join() {
                Ok(value) => Ok(value),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }

    /// Run `f` on the engine thread and return its result.
    pub(crate) fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Runtime) -> R + Send + 'static,
    {
        let current = Runtime::current();
        if let Some(rt) = current.as_ref().filter(|rt| rt.isolate_id() == self.shared.id) {
            let rt: &Runtime = rt;
            return Ok(rt.operation(rt.terminations(), || f(rt)));
        }

        let issued = self.shared.terminations.load(Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        let mut reply = Reply {
            tx: Some(tx),
            waker: current.as_ref().map(|rt| rt.waker()),
        };
        let job: Job = Box::new(move |rt: &Runtime| {
            let value = rt.operation(issued, || f(rt));
            reply.send(value);
        });
        self.post(Message::Job(job))?;

        match current {
            // Another isolate's engine thread keeps its own queue moving
            // while it waits.
            Some(rt) => loop {
                match rx.try_recv() {
                    Ok(value) => return Ok(value),
                    Err(TryRecvError::Empty) => rt.serve_one()?,
                    Err(TryRecvError::Disconnected) => return Err(BridgeError::Disposed),
                }
            },
            None => rx.recv().map_err(|_| BridgeError::Disposed),
        }
    }

    fn post(&self, message: Message) -> Result<()> {
        let sender = self.shared.sender.lock().map_err(|_| BridgeError::Disposed)?;
        sender.send(message).map_err(|_| BridgeError::Disposed)
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate").field("id", &self.shared.id).finish()
    }
}

impl Drop for IsolateShared {
    fn drop(&mut self) {
        log::debug!("[KPIO JSBridge] Shutting down isolate {}", self.id);
        if let Ok(sender) = self.sender.get_mut() {
            let _ = sender.send(Message::Shutdown);
        }
        // Dropped from its own engine thread (inside a resolver): the thread
        // exits after the running job, nothing to join.
        if let Some(join) = self.join.take() {
            if thread::current().id() != self.thread_id {
                let _ = join.join();
            }
        }
    }
}

/// Reply slot of a posted job. Dropping it (sent or not) wakes the waiting
/// engine thread, if the waiter is one.
struct Reply<R> {
    tx: Option<Sender<R>>,
    waker: Option<Sender<Message>>,
}

impl<R> Reply<R> {
    fn send(&mut self, value: R) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(value);
        }
    }
}

impl<R> Drop for Reply<R> {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(waker) = self.waker.take() {
            let _ = waker.send(Message::Wake);
        }
    }
}

struct DoneSignal<'a> {
    done: &'a AtomicBool,
    waker: Sender<Message>,
}

impl Drop for DoneSignal<'_> {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        let _ = self.waker.send(Message::Wake);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn jobs_run_on_the_engine_thread() {
        let isolate = Isolate::new().unwrap();
        let caller = thread::current().id();
        let engine = isolate.run(|_| thread::current().id()).unwrap();
        assert_ne!(caller, engine);
        assert_eq!(isolate.run(|_| thread::current().id()).unwrap(), engine);
    }

    #[test]
    fn nested_runs_are_inline() {
        let isolate = Isolate::new().unwrap();
        let inner = isolate.clone();
        let value = isolate
            .run(move |_| inner.run(|_| 41).map(|v| v + 1))
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn cross_isolate_waits_serve_the_waiting_queue() {
        let a = Isolate::new().unwrap();
        let b = Isolate::new().unwrap();
        let (a2, b2) = (a.clone(), b.clone());
        // a -> b -> a: b's job posts back to a while a is waiting on b.
        let value = a
            .run(move |_| b2.run(move |_| a2.run(|_| 7)).map(|r| r.map(|v| v * 6)))
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn unlocked_outside_engine_just_runs() {
        let isolate = Isolate::new().unwrap();
        assert_eq!(isolate.unlocked(|| 5).unwrap(), 5);
    }

    #[test]
    fn unlocked_lets_other_threads_in() {
        let isolate = Isolate::new().unwrap();
        let worker = isolate.clone();
        let value = isolate
            .run(move |_| {
                let other = worker.clone();
                worker.unlocked(move || {
                    // Runs off the engine thread; the engine is free to take
                    // this job meanwhile.
                    other.run(|_| 10).unwrap()
                })
            })
            .unwrap()
            .unwrap();
        assert_eq!(value, 10);
    }

    #[test]
    fn terminate_while_idle_is_harmless() {
        let isolate = Isolate::new().unwrap();
        isolate.terminate();
        thread::sleep(Duration::from_millis(1));
        assert_eq!(isolate.run(|_| 1).unwrap(), 1);
    }

    #[test]
    fn terminate_reaches_operations_waiting_in_the_queue() {
        let isolate = Isolate::new().unwrap();
        let ctx = crate::context::Context::new(&isolate).unwrap();

        // Hold the engine thread so the script below has to queue.
        let (open_tx, open_rx) = mpsc::channel::<()>();
        let blocker = isolate.clone();
        let holder = thread::spawn(move || {
            blocker
                .run(move |_| {
                    let _ = open_rx.recv();
                })
                .unwrap()
        });
        thread::sleep(Duration::from_millis(50));

        let queued = ctx.clone();
        let waiter = thread::spawn(move || {
            queued.execute("var n = 0; for (var i = 0; i < 1000; i++) { n++; } n", "")
        });
        thread::sleep(Duration::from_millis(100));

        isolate.terminate();
        open_tx.send(()).unwrap();
        holder.join().unwrap();

        let err = waiter.join().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Uncaught exception: execution terminated");

        // Requests issued after the terminate are untouched.
        assert_eq!(ctx.execute("1 + 1", "").unwrap(), "2");
    }
}
