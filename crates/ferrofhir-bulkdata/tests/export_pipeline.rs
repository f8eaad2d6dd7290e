//! End-to-end export pipeline tests over the in-memory backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use ferrofhir_bulkdata::{
    ExportFormat, ExportJob, JobControl, JobExecution, JobParameters, JobStatus, TypeFilter,
    run_export,
};
use ferrofhir_config::{BulkDataConfig, ProviderKind, StorageProviderConfig};
use ferrofhir_core::ExportedResource;
use ferrofhir_storage::{
    MemoryObjectStore, MemorySearchBackend, ObjectStore, SearchBackend, SearchPage, SearchQuery,
    StorageError,
};
use serde_json::json;
use time::OffsetDateTime;

fn seeded_backend() -> Arc<MemorySearchBackend> {
    let backend = MemorySearchBackend::new();
    for i in 0..8 {
        let gender = if i < 5 { "female" } else { "male" };
        backend.insert(ExportedResource::new(
            "Patient",
            format!("p{i:02}"),
            OffsetDateTime::from_unix_timestamp(1000 + i).unwrap(),
            json!({"resourceType": "Patient", "id": format!("p{i:02}"), "gender": gender}),
        ));
    }
    for i in 0..4 {
        backend.insert(ExportedResource::new(
            "Observation",
            format!("o{i:02}"),
            OffsetDateTime::from_unix_timestamp(2000 + i).unwrap(),
            json!({"resourceType": "Observation", "id": format!("o{i:02}"), "status": "final"}),
        ));
    }
    Arc::new(backend)
}

fn bulk_config() -> BulkDataConfig {
    let mut provider = HashMap::new();
    provider.insert(
        "default".to_string(),
        StorageProviderConfig {
            kind: ProviderKind::Memory,
            root: None,
            container: "exports".to_string(),
            duplicates_possible: false,
        },
    );
    BulkDataConfig {
        max_partitions: 2,
        page_size: 2,
        max_objects_per_part: 2,
        max_part_size_bytes: 64 * 1024,
        provider,
    }
}

fn job_params(resource_types: &[&str], type_filters: Vec<TypeFilter>) -> JobParameters {
    JobParameters {
        tenant_id: "acme".to_string(),
        datastore_id: "default".to_string(),
        request_url: "https://fhir.example.com/$export".to_string(),
        resource_types: resource_types.iter().map(|t| (*t).to_string()).collect(),
        since: None,
        till: None,
        type_filters,
        format: ExportFormat::Ndjson,
        source: "default".to_string(),
        path_prefix: "job1".to_string(),
    }
}

async fn object_lines(store: &MemoryObjectStore, key: &str) -> Vec<String> {
    match store.get_object("exports", key).await.unwrap() {
        Some(bytes) => String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

#[tokio::test]
async fn test_full_export_produces_exit_status_and_objects() {
    let store = Arc::new(MemoryObjectStore::new());
    let job = ExportJob {
        params: job_params(&["Patient", "Observation"], Vec::new()),
        bulk: bulk_config(),
        search: seeded_backend(),
        store: store.clone(),
    };
    let mut execution = JobExecution::new();

    let exit = run_export(&job, &mut execution).await.unwrap();
    assert_eq!(exit.as_deref(), Some("Patient[8]:Observation[4]"));
    assert_eq!(execution.control.status(), JobStatus::Completed);

    assert_eq!(
        object_lines(&store, "job1/Patient_1.ndjson").await.len(),
        8
    );
    assert_eq!(
        object_lines(&store, "job1/Observation_1.ndjson").await.len(),
        4
    );
}

#[tokio::test]
async fn test_overlapping_type_filters_deduplicate() {
    let store = Arc::new(MemoryObjectStore::new());
    let filters = vec![
        TypeFilter::parse("Patient?gender=female").unwrap(),
        TypeFilter::parse("Patient").unwrap(),
    ];
    let job = ExportJob {
        params: job_params(&["Patient"], filters),
        bulk: bulk_config(),
        search: seeded_backend(),
        store: store.clone(),
    };
    let mut execution = JobExecution::new();

    let exit = run_export(&job, &mut execution).await.unwrap();
    // First clause exports the five female records; the unconstrained
    // second clause only contributes the three the first did not cover.
    assert_eq!(exit.as_deref(), Some("Patient[5,3]"));

    let mut ids: Vec<String> = object_lines(&store, "job1/Patient_1.ndjson")
        .await
        .iter()
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect();
    let emitted = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(emitted, ids.len(), "duplicate resources exported");
    assert_eq!(emitted, 8);
}

#[tokio::test]
async fn test_zero_match_type_is_excluded_from_exit_status() {
    let store = Arc::new(MemoryObjectStore::new());
    let job = ExportJob {
        params: job_params(&["Patient", "Encounter"], Vec::new()),
        bulk: bulk_config(),
        search: seeded_backend(),
        store: store.clone(),
    };
    let mut execution = JobExecution::new();

    let exit = run_export(&job, &mut execution).await.unwrap();
    assert_eq!(exit.as_deref(), Some("Patient[8]"));
    assert!(
        store
            .get_object("exports", "job1/Encounter_1.ndjson")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_empty_type_list_completes_with_nothing_processed() {
    let job = ExportJob {
        params: job_params(&[], Vec::new()),
        bulk: bulk_config(),
        search: seeded_backend(),
        store: Arc::new(MemoryObjectStore::new()),
    };
    let mut execution = JobExecution::new();

    let exit = run_export(&job, &mut execution).await.unwrap();
    assert!(exit.is_none());
    assert_eq!(execution.control.status(), JobStatus::Completed);
}

/// Requests a job stop after a fixed number of searches, then delegates.
struct StopAfter {
    inner: Arc<MemorySearchBackend>,
    control: JobControl,
    remaining: AtomicI64,
}

#[async_trait]
impl SearchBackend for StopAfter {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, StorageError> {
        let result = self.inner.search_page(query).await;
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.control.request_stop();
        }
        result
    }
}

#[tokio::test]
async fn test_stop_and_resume_exports_everything_exactly_once() {
    let store = Arc::new(MemoryObjectStore::new());
    let backend = seeded_backend();
    let mut execution = JobExecution::new();

    // First run: the stop lands during the second search, so only the
    // first chunk commits.
    let stopping_job = ExportJob {
        params: job_params(&["Patient"], Vec::new()),
        bulk: bulk_config(),
        search: Arc::new(StopAfter {
            inner: backend.clone(),
            control: execution.control.clone(),
            remaining: AtomicI64::new(2),
        }),
        store: store.clone(),
    };

    let exit = run_export(&stopping_job, &mut execution).await.unwrap();
    assert!(exit.is_none(), "stopped job reports nothing processed");
    assert_eq!(execution.control.status(), JobStatus::Stopped);

    let checkpoint = execution.checkpoint_for("Patient").expect("checkpoint");
    assert_eq!(checkpoint.page_num, 1);
    assert_eq!(checkpoint.uploaded, 2);

    let first_segment = object_lines(&store, "job1/Patient_1.ndjson").await;
    assert_eq!(first_segment.len(), 2);

    // Resume with the same execution: the reader restores from the
    // checkpoint and the remaining pages land in a fresh object.
    let resumed_job = ExportJob {
        params: job_params(&["Patient"], Vec::new()),
        bulk: bulk_config(),
        search: backend,
        store: store.clone(),
    };

    let exit = run_export(&resumed_job, &mut execution).await.unwrap();
    assert_eq!(exit.as_deref(), Some("Patient[8]"));
    assert_eq!(execution.control.status(), JobStatus::Completed);

    let second_segment = object_lines(&store, "job1/Patient_2.ndjson").await;
    assert_eq!(second_segment.len(), 6);

    let mut ids: Vec<String> = first_segment
        .iter()
        .chain(second_segment.iter())
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect();
    let emitted = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(emitted, 8);
    assert_eq!(ids.len(), 8, "a resource was exported twice or lost");
}
