use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    Error,
    notification::Notifier,
    recurring::{RecurringTransaction, RecurringTransactionId},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SentNotice {
    Transient {
        id: RecurringTransactionId,
        error: String,
        retry_count: u32,
    },
    Permanent {
        id: RecurringTransactionId,
        error: String,
    },
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A notifier that records the attempt and then reports a failure.
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, notice: SentNotice) -> Result<(), Error> {
        self.sent.lock().unwrap().push(notice);

        if self.fail.load(Ordering::SeqCst) {
            Err(Error::NotificationFailed("delivery refused".to_owned()))
        } else {
            Ok(())
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify_recurring_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
        retry_count: u32,
    ) -> Result<(), Error> {
        self.record(SentNotice::Transient {
            id: recurring_transaction.id,
            error: error.to_owned(),
            retry_count,
        })
    }

    fn notify_permanent_failure(
        &self,
        recurring_transaction: &RecurringTransaction,
        error: &str,
    ) -> Result<(), Error> {
        self.record(SentNotice::Permanent {
            id: recurring_transaction.id,
            error: error.to_owned(),
        })
    }
}
