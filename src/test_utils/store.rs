use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use time::OffsetDateTime;

use crate::{
    Error,
    recurring::{RecurringStore, RecurringTransaction, RecurringTransactionId, Schedule},
    transaction::{Transaction, TransactionBuilder},
    user::UserId,
};

pub(crate) fn test_recurring_transaction(
    id: RecurringTransactionId,
    schedule: Schedule,
) -> RecurringTransaction {
    RecurringTransaction {
        id,
        user_id: UserId::new(1),
        account_id: 1,
        category_id: 1,
        amount: -9.99,
        description: "Streaming".to_owned(),
        last_run: None,
        next_run: Some(schedule.start_date),
        active: true,
        created_at: schedule.start_date,
        updated_at: schedule.start_date,
        schedule,
    }
}

/// An in-memory [RecurringStore] whose failures can be switched on per test.
#[derive(Default)]
pub(crate) struct FakeStore {
    rules: Mutex<Vec<RecurringTransaction>>,
    created: Mutex<Vec<TransactionBuilder>>,
    failing_creates: Mutex<HashSet<RecurringTransactionId>>,
    fail_updates: AtomicBool,
    fail_fetch: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    pub(crate) fn new(rules: Vec<RecurringTransaction>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Default::default()
        }
    }

    pub(crate) fn fail_creates_for(&self, id: RecurringTransactionId) {
        self.failing_creates.lock().unwrap().insert(id);
    }

    pub(crate) fn stop_failing_creates(&self) {
        self.failing_creates.lock().unwrap().clear();
    }

    pub(crate) fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Make every `create_transaction` call block its thread for `delay`.
    pub(crate) fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn set_active(&self, id: RecurringTransactionId, active: bool) {
        if let Some(rule) = self.rules.lock().unwrap().iter_mut().find(|rule| rule.id == id) {
            rule.active = active;
        }
    }

    pub(crate) fn delete(&self, id: RecurringTransactionId) {
        self.rules.lock().unwrap().retain(|rule| rule.id != id);
    }

    pub(crate) fn created(&self) -> Vec<TransactionBuilder> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn rule(&self, id: RecurringTransactionId) -> RecurringTransaction {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| rule.id == id)
            .cloned()
            .expect("no rule with that id")
    }
}

impl RecurringStore for FakeStore {
    fn get_due_recurring_transactions(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<RecurringTransaction>, Error> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::DatabaseLockError);
        }

        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|rule| rule.is_due(now))
            .cloned()
            .collect())
    }

    fn get_recurring_transaction(
        &self,
        id: RecurringTransactionId,
    ) -> Result<RecurringTransaction, Error> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| rule.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn create_transaction(&self, builder: TransactionBuilder) -> Result<Transaction, Error> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let fails = builder
            .recurring_transaction_id
            .is_some_and(|id| self.failing_creates.lock().unwrap().contains(&id));
        if fails {
            return Err(Error::InvalidForeignKey);
        }

        let mut created = self.created.lock().unwrap();
        created.push(builder.clone());

        Ok(Transaction {
            id: created.len() as i64,
            user_id: builder.user_id,
            account_id: builder.account_id,
            category_id: builder.category_id,
            amount: builder.amount,
            date: builder.date,
            description: builder.description,
            recurring_transaction_id: builder.recurring_transaction_id,
        })
    }

    fn update_last_run(
        &self,
        id: RecurringTransactionId,
        last_run: OffsetDateTime,
        next_run: Option<OffsetDateTime>,
    ) -> Result<(), Error> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::UpdateMissingRecurringTransaction);
        }

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or(Error::UpdateMissingRecurringTransaction)?;
        rule.last_run = Some(last_run);
        rule.next_run = next_run;
        rule.updated_at = last_run;

        Ok(())
    }
}
