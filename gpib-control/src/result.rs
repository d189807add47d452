//! Thread-scoped operation results.
//!
//! The classic driver keeps its status variables in process globals with
//! admittedly unreliable semantics under concurrency. Here the triple is
//! strictly thread-local: every operation overwrites the calling thread's
//! copy before returning, and no thread can observe another's results.

use crate::TransportError;
use gpib_protocol::{StatusWord, error::ErrorCode};
use std::cell::Cell;

thread_local! {
    static LAST: Cell<(StatusWord, Option<ErrorCode>, usize)> =
        const { Cell::new((StatusWord::empty(), None, 0)) };
}

/// The status word of the calling thread's most recent operation.
pub fn last_status() -> StatusWord {
    LAST.with(|last| last.get().0)
}

/// The error code of the calling thread's most recent operation. Meaningful
/// only while [`last_status`] has the error flag set; the invariant is that
/// this is `Some` exactly when that flag is set.
pub fn last_error() -> Option<ErrorCode> {
    LAST.with(|last| last.get().1)
}

/// Bytes moved by the calling thread's most recent transfer. Meaningful
/// regardless of the error state; partial transfers are possible.
pub fn last_count() -> usize {
    LAST.with(|last| last.get().2)
}

/// The outcome of a single operation: the status word, the error code that
/// accompanies a set error flag, and the transfer count.
///
/// Construction goes through [`success`](Completion::success) and
/// [`failure`](Completion::failure) only, so the error flag is set if and
/// only if an error code is present.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Completion {
    status: StatusWord,
    error: Option<ErrorCode>,
    count: usize,
}

impl Completion {
    pub(crate) fn success(flags: StatusWord, count: usize) -> Completion {
        Completion {
            status: flags.with(StatusWord::CMPL).without(StatusWord::ERR),
            error: None,
            count,
        }
    }

    pub(crate) fn failure(error: ErrorCode, flags: StatusWord, count: usize) -> Completion {
        Completion {
            status: flags.with(StatusWord::CMPL).with(StatusWord::ERR),
            error: Some(error),
            count,
        }
    }

    /// Stores this outcome as the calling thread's most recent result.
    pub(crate) fn record(self) -> Completion {
        LAST.with(|last| last.set((self.status, self.error, self.count)));
        self
    }

    /// The status word.
    pub fn status(&self) -> StatusWord {
        self.status
    }

    /// The error code; `Some` exactly when the status error flag is set.
    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Bytes moved by the operation.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Internal failure carrier: the error code plus any status flags and the
/// partial count accumulated before the failure.
#[derive(Debug)]
pub(crate) struct Failure {
    pub code: ErrorCode,
    pub flags: StatusWord,
    pub count: usize,
}

impl Failure {
    pub(crate) fn new(code: ErrorCode) -> Failure {
        Failure {
            code,
            flags: StatusWord::empty(),
            count: 0,
        }
    }

    #[must_use]
    pub(crate) fn counted(mut self, count: usize) -> Failure {
        self.count = count;
        self
    }
}

impl From<ErrorCode> for Failure {
    fn from(code: ErrorCode) -> Failure {
        Failure::new(code)
    }
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Failure {
        let code = match &error {
            TransportError::Timeout => ErrorCode::Aborted,
            TransportError::NoListener => ErrorCode::NoListener,
            TransportError::Bus => ErrorCode::Bus,
            TransportError::Dma => ErrorCode::Dma,
            TransportError::PowerLoss => ErrorCode::PowerLoss,
            TransportError::System(_) => ErrorCode::System,
        };
        let flags = match &error {
            TransportError::Timeout => StatusWord::TIMO,
            _ => StatusWord::empty(),
        };
        Failure {
            code,
            flags,
            count: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_flag_iff_error_code() {
        let ok = Completion::success(StatusWord::empty(), 4);
        assert!(!ok.status().err());
        assert_eq!(ok.error(), None);

        let bad = Completion::failure(ErrorCode::NoListener, StatusWord::empty(), 0);
        assert!(bad.status().err());
        assert_eq!(bad.error(), Some(ErrorCode::NoListener));
    }

    #[test]
    fn record_overwrites_the_thread_copy() {
        Completion::success(StatusWord::END, 7).record();
        assert!(last_status().end());
        assert_eq!(last_error(), None);
        assert_eq!(last_count(), 7);

        Completion::failure(ErrorCode::Aborted, StatusWord::TIMO, 2).record();
        assert!(last_status().err());
        assert!(last_status().timed_out());
        assert_eq!(last_error(), Some(ErrorCode::Aborted));
        assert_eq!(last_count(), 2);
    }

    #[test]
    fn timeouts_map_to_aborted_with_the_timo_flag() {
        let failure = Failure::from(TransportError::Timeout);
        assert_eq!(failure.code, ErrorCode::Aborted);
        assert!(failure.flags.timed_out());
    }

    #[test]
    fn threads_do_not_share_results() {
        Completion::success(StatusWord::empty(), 123).record();
        std::thread::spawn(|| {
            assert_eq!(last_count(), 0);
            Completion::failure(ErrorCode::Bus, StatusWord::empty(), 9).record();
            assert_eq!(last_count(), 9);
        })
        .join()
        .unwrap();
        assert_eq!(last_count(), 123);
        assert_eq!(last_error(), None);
    }
}
