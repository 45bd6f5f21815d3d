use uuid::Uuid;

use crate::error::{ExamError, ExamResult};
use crate::models::{Eligibility, Module};
use crate::store::Datastore;

/// Read-only check that every lesson of a module is completed before its exam.
#[derive(Clone)]
pub struct EligibilityGate {
    store: Datastore,
}

impl EligibilityGate {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    pub async fn can_start(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Eligibility> {
        let module = self
            .store
            .module(module_id)
            .await?
            .ok_or(ExamError::ModuleNotFound(module_id))?;
        self.eligibility_for(user_id, &module).await
    }

    pub async fn eligibility_for(&self, user_id: Uuid, module: &Module) -> ExamResult<Eligibility> {
        let tally = self.store.lesson_tally(user_id, module.id).await?;
        Ok(Eligibility::from(tally))
    }
}
