//! In-memory collaborators for tests, demos and local runs.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ExternalCollaborators;
use crate::context::SubjectContext;
use crate::core::{ExecutionRecord, SubjectId};
use crate::errors::CollaboratorError;
use crate::utils::{now_utc, Timestamp};

/// One line of the cost ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEntry {
    /// The subject the cost is billed to.
    pub subject_id: SubjectId,
    /// The component that incurred it.
    pub component_name: String,
    /// Cost units.
    pub cost_units: f64,
    /// When it was recorded.
    pub recorded_at: Timestamp,
}

/// A [`ExternalCollaborators`] backed by concurrent maps.
///
/// Fault injection toggles let tests exercise every failure path of the
/// engine without a real database.
#[derive(Debug, Default)]
pub struct InMemoryCollaborators {
    subjects: DashMap<SubjectId, SubjectContext>,
    payloads: DashMap<(SubjectId, String), serde_json::Value>,
    final_records: DashMap<SubjectId, ExecutionRecord>,
    cost_ledger: Mutex<Vec<CostEntry>>,
    unavailable: AtomicBool,
    rejected_components: DashSet<String>,
    reject_final_status: AtomicBool,
}

impl InMemoryCollaborators {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subject.
    #[must_use]
    pub fn with_subject(self, subject: SubjectContext) -> Self {
        self.insert_subject(subject);
        self
    }

    /// Adds or replaces a subject.
    pub fn insert_subject(&self, subject: SubjectContext) {
        self.subjects.insert(subject.subject_id().clone(), subject);
    }

    /// Makes every call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes payload writes for a component fail with `Rejected`.
    pub fn reject_component(&self, component_name: impl Into<String>) {
        self.rejected_components.insert(component_name.into());
    }

    /// Makes final status writes fail with `Rejected`.
    pub fn set_reject_final_status(&self, reject: bool) {
        self.reject_final_status.store(reject, Ordering::SeqCst);
    }

    /// Returns a persisted payload.
    #[must_use]
    pub fn payload(&self, subject_id: &SubjectId, component_name: &str) -> Option<serde_json::Value> {
        self.payloads
            .get(&(subject_id.clone(), component_name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Returns the number of persisted payloads for a subject.
    #[must_use]
    pub fn payload_count(&self, subject_id: &SubjectId) -> usize {
        self.payloads.iter().filter(|entry| &entry.key().0 == subject_id).count()
    }

    /// Returns the last persisted final record for a subject.
    #[must_use]
    pub fn final_record(&self, subject_id: &SubjectId) -> Option<ExecutionRecord> {
        self.final_records.get(subject_id).map(|entry| entry.value().clone())
    }

    /// Returns the cost ledger for a subject.
    #[must_use]
    pub fn cost_entries(&self, subject_id: &SubjectId) -> Vec<CostEntry> {
        self.cost_ledger
            .lock()
            .iter()
            .filter(|entry| &entry.subject_id == subject_id)
            .cloned()
            .collect()
    }

    /// Returns the summed cost for a subject.
    #[must_use]
    pub fn total_cost(&self, subject_id: &SubjectId) -> f64 {
        self.cost_entries(subject_id).iter().map(|e| e.cost_units).sum()
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalCollaborators for InMemoryCollaborators {
    async fn load_subject_context(&self, subject_id: &SubjectId) -> Result<SubjectContext, CollaboratorError> {
        self.check_available()?;
        self.subjects
            .get(subject_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CollaboratorError::NotFound(subject_id.clone()))
    }

    async fn persist_component_result(
        &self,
        subject_id: &SubjectId,
        component_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        self.check_available()?;
        if self.rejected_components.contains(component_name) {
            return Err(CollaboratorError::Rejected(format!(
                "payload for '{component_name}' refused"
            )));
        }
        self.payloads
            .insert((subject_id.clone(), component_name.to_string()), payload.clone());
        Ok(())
    }

    async fn persist_final_status(
        &self,
        subject_id: &SubjectId,
        record: &ExecutionRecord,
    ) -> Result<(), CollaboratorError> {
        self.check_available()?;
        if self.reject_final_status.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected("final status refused".to_string()));
        }
        self.final_records.insert(subject_id.clone(), record.clone());
        Ok(())
    }

    async fn record_cost(
        &self,
        subject_id: &SubjectId,
        component_name: &str,
        cost_units: f64,
    ) -> Result<(), CollaboratorError> {
        self.check_available()?;
        self.cost_ledger.lock().push(CostEntry {
            subject_id: subject_id.clone(),
            component_name: component_name.to_string(),
            cost_units,
            recorded_at: now_utc(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subject(id: &str) -> SubjectContext {
        SubjectContext::new(SubjectId::from(id)).with_field("website", json!("https://example.com"))
    }

    #[tokio::test]
    async fn test_load_subject() {
        let store = InMemoryCollaborators::new().with_subject(subject("lead-1"));

        let ctx = store.load_subject_context(&SubjectId::from("lead-1")).await.unwrap();
        assert_eq!(ctx.get_str("website"), Some("https://example.com"));

        let err = store.load_subject_context(&SubjectId::from("ghost")).await.unwrap_err();
        assert_eq!(err, CollaboratorError::NotFound(SubjectId::from("ghost")));
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = InMemoryCollaborators::new().with_subject(subject("lead-1"));
        store.set_unavailable(true);

        let id = SubjectId::from("lead-1");
        assert!(matches!(
            store.load_subject_context(&id).await,
            Err(CollaboratorError::Unavailable(_))
        ));
        assert!(store.persist_component_result(&id, "a", &json!({})).await.is_err());
        assert!(store.record_cost(&id, "a", 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_persist_and_reject_payloads() {
        let store = InMemoryCollaborators::new();
        let id = SubjectId::from("lead-1");
        store.reject_component("semrush_seo");

        store.persist_component_result(&id, "pagespeed", &json!({"score": 90})).await.unwrap();
        let err = store
            .persist_component_result(&id, "semrush_seo", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, CollaboratorError::Rejected(_)));
        assert_eq!(store.payload(&id, "pagespeed"), Some(json!({"score": 90})));
        assert_eq!(store.payload_count(&id), 1);
    }

    #[tokio::test]
    async fn test_cost_ledger() {
        let store = InMemoryCollaborators::new();
        let id = SubjectId::from("lead-1");

        store.record_cost(&id, "visual_analysis", 1.5).await.unwrap();
        store.record_cost(&id, "content_generation", 2.0).await.unwrap();
        store.record_cost(&SubjectId::from("other"), "pagespeed", 9.0).await.unwrap();

        assert_eq!(store.cost_entries(&id).len(), 2);
        assert!((store.total_cost(&id) - 3.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_final_status() {
        let store = InMemoryCollaborators::new();
        let id = SubjectId::from("lead-1");
        let record = ExecutionRecord::new(id.clone());

        store.persist_final_status(&id, &record).await.unwrap();
        assert_eq!(store.final_record(&id), Some(record.clone()));

        store.set_reject_final_status(true);
        assert!(store.persist_final_status(&id, &record).await.is_err());
    }
}
