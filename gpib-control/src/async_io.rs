//! Asynchronous transfers.
//!
//! The classic driver notifies completion through callbacks invoked from a
//! foreign execution context. Here an asynchronous operation returns an
//! [`AsyncOperation`] handle owning a completion channel: the caller
//! retrieves the outcome with [`Board::wait_complete`], observes progress
//! with [`Board::wait`], or cancels with [`Board::abort`]. One operation
//! may be pending per board; everything else reports in-progress.

use crate::board::{Board, Unit};
use crate::result::{Completion, Failure};
use crate::Transport;
use gpib_protocol::{SendEnd, StatusWord, error::ErrorCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
pub(crate) struct PendingState {
    aborted: AtomicBool,
    done: AtomicBool,
}

impl PendingState {
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

type Outcome = Result<(Option<Vec<u8>>, StatusWord, usize), Failure>;

/// Handle for one in-flight asynchronous transfer.
///
/// Dropping the handle does not cancel the transfer; it merely discards the
/// outcome. Cancellation goes through [`Board::abort`].
pub struct AsyncOperation {
    rx: Receiver<Outcome>,
    pending: Arc<PendingState>,
}

impl AsyncOperation {
    /// Whether the transfer has finished (successfully or not).
    pub fn is_done(&self) -> bool {
        self.pending.is_done()
    }
}

impl<T: Transport + 'static> Board<T> {
    /// Starts an asynchronous write to a unit using its configured
    /// end-of-transfer mode and returns immediately.
    pub fn write_async(&self, unit: Unit, data: Vec<u8>) -> AsyncOperation {
        self.start_async("write", move |board| {
            let view = board.view(unit)?;
            let end = if view.send_eoi { SendEnd::Eoi } else { SendEnd::None };
            let count = board.do_unit_write(&view, &data, end)?;
            Ok((None, StatusWord::empty(), count))
        })
    }

    /// Starts an asynchronous read of up to `max` bytes from a unit.
    pub fn read_async(&self, unit: Unit, max: usize) -> AsyncOperation {
        self.start_async("read", move |board| {
            let view = board.view(unit)?;
            let (data, flags) = board.do_unit_read(&view, max)?;
            let count = data.len();
            Ok((Some(data), flags, count))
        })
    }

    /// Starts sending interface command bytes asynchronously.
    pub fn command_async(&self, commands: Vec<u8>) -> AsyncOperation {
        self.start_async("command", move |board| {
            let count = board.do_commands(&commands)?;
            Ok((None, StatusWord::empty(), count))
        })
    }

    fn start_async(
        &self,
        kind: &'static str,
        job: impl FnOnce(&Board<T>) -> Outcome + Send + 'static,
    ) -> AsyncOperation {
        let (tx, rx): (Sender<Outcome>, Receiver<Outcome>) = channel();
        let pending = Arc::new(PendingState::default());

        {
            let mut inner = self.lock();
            if inner.pending.is_some() {
                drop(inner);
                let failure = Failure::new(ErrorCode::InProgress);
                self.fail(Failure::new(ErrorCode::InProgress));
                pending.done.store(true, Ordering::SeqCst);
                let _ = tx.send(Err(failure));
                return AsyncOperation { rx, pending };
            }
            inner.pending = Some(pending.clone());
        }

        log::debug!("starting asynchronous {}", kind);
        Completion::success(self.role_flags(), 0).record();

        let board = self.clone_handle();
        let worker_pending = pending.clone();
        std::thread::spawn(move || {
            let mut outcome = job(&board);
            if worker_pending.aborted.load(Ordering::SeqCst) {
                outcome = Err(Failure::new(ErrorCode::Aborted));
            }
            {
                let mut inner = board.lock();
                if inner
                    .pending
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &worker_pending))
                {
                    inner.pending = None;
                }
            }
            worker_pending.done.store(true, Ordering::SeqCst);
            // The receiver may be gone; the outcome is then discarded.
            let _ = tx.send(outcome);
        });

        AsyncOperation { rx, pending }
    }

    /// Blocks until the asynchronous transfer finishes, then records and
    /// returns its outcome. Read data, when present, comes back alongside
    /// the completion.
    pub fn wait_complete(&self, operation: AsyncOperation) -> (Option<Vec<u8>>, Completion) {
        match operation.rx.recv() {
            Ok(Ok((data, flags, count))) => (data, self.finish(Ok((flags, count)))),
            Ok(Err(failure)) => (None, self.fail(failure)),
            Err(_) => (None, self.fail(Failure::new(ErrorCode::System))),
        }
    }

    /// Blocks until one of the masked status conditions holds or the board
    /// timeout expires. An empty mask returns the current status
    /// immediately. Expiry reports through the timeout flag: as a plain
    /// status when the flag is part of the mask, as an aborted error
    /// otherwise. A second concurrent wait reports wait-in-progress.
    pub fn wait(&self, mask: StatusWord) -> Completion {
        {
            let mut inner = self.lock();
            if inner.waiting {
                drop(inner);
                return self.fail(Failure::new(ErrorCode::WaitInProgress));
            }
            inner.waiting = true;
        }
        let completion = self.do_wait(mask);
        self.lock().waiting = false;
        completion
    }

    fn do_wait(&self, mask: StatusWord) -> Completion {
        let view = match self.view(Unit::BOARD) {
            Ok(view) => view,
            Err(failure) => return self.fail(failure),
        };
        let deadline = view.timeout.duration().map(|limit| Instant::now() + limit);
        loop {
            let status = self.current_status();
            if mask == StatusWord::empty() || status.intersects(mask) {
                return self.finish(Ok((status, 0)));
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                if mask.timed_out() {
                    return self.finish(Ok((status.with(StatusWord::TIMO), 0)));
                }
                return self.fail(Failure {
                    code: ErrorCode::Aborted,
                    flags: StatusWord::TIMO,
                    count: 0,
                });
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    /// The live status of the board: role flags plus I/O-complete when no
    /// asynchronous transfer is pending.
    fn current_status(&self) -> StatusWord {
        let mut status = self.role_flags();
        let idle = self
            .lock()
            .pending
            .as_ref()
            .is_none_or(|pending| pending.is_done());
        if idle {
            status |= StatusWord::CMPL;
        }
        status
    }

    /// Aborts any in-flight transfer and resynchronizes the board to idle.
    ///
    /// Always safe to call: with nothing pending this is a successful
    /// no-op. The aborted operation's own completion reports the aborted
    /// error; `abort` itself succeeds once the board is idle again.
    pub fn abort(&self) -> Completion {
        let pending = self.lock().pending.clone();
        if let Some(pending) = pending {
            log::debug!("aborting in-flight operation");
            pending.abort();
            while !pending.is_done() {
                std::thread::sleep(Duration::from_micros(50));
            }
        }
        self.lock().pending = None;
        self.finish(Ok((StatusWord::empty(), 0)))
    }
}
