//! The typechecker thread and its task queue.

use crate::typechecker::Typechecker;
use crossbeam_channel::{bounded, unbounded, Sender};
use std::thread::JoinHandle;
use tracing::debug;

type Task = Box<dyn FnOnce(&mut Typechecker) + Send + 'static>;

enum Message {
    Run(Task),
    Shutdown,
}

/// Owns the typechecker thread; everything that touches [`Typechecker`]
/// state goes through here and runs serialized, in submission order.
///
/// `sync_run` is the blocking lane: fast-path edits, initialization,
/// queries, and fence round-trips. `async_run` is the non-blocking lane for
/// slow-path edits, which must leave the coordinator free to process the
/// edit that may cancel them.
pub struct TypecheckerCoordinator {
    tx: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl TypecheckerCoordinator {
    pub fn new(typechecker: Typechecker) -> Self {
        let (tx, rx) = unbounded::<Message>();
        let handle = std::thread::Builder::new()
            .name("moss-typechecker".to_string())
            .spawn(move || {
                let mut typechecker = typechecker;
                while let Ok(message) = rx.recv() {
                    match message {
                        Message::Run(task) => task(&mut typechecker),
                        Message::Shutdown => break,
                    }
                }
                debug!("typechecker thread exiting");
            })
            .expect("failed to spawn the typechecker thread");
        TypecheckerCoordinator {
            tx,
            handle: Some(handle),
        }
    }

    /// Run `task` on the typechecker thread and block until it completes.
    pub fn sync_run(&self, task: impl FnOnce(&mut Typechecker) + Send + 'static) {
        let (done_tx, done_rx) = bounded::<()>(1);
        self.tx
            .send(Message::Run(Box::new(move |typechecker| {
                task(typechecker);
                let _ = done_tx.send(());
            })))
            .expect("typechecker thread is gone");
        done_rx
            .recv()
            .expect("typechecker thread dropped a sync task");
    }

    /// Enqueue `task` on the typechecker thread and return immediately.
    pub fn async_run(&self, task: impl FnOnce(&mut Typechecker) + Send + 'static) {
        self.tx
            .send(Message::Run(Box::new(task)))
            .expect("typechecker thread is gone");
    }
}

impl Drop for TypecheckerCoordinator {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
