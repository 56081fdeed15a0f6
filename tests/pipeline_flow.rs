// Cross-module flow: table shaping through dedup, dispatch and state.
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use leadhound::errors::NotifyError;
use leadhound::extraction::tables::assemble_leads;
use leadhound::keys::DEFAULT_KEY_HASH_LEN;
use leadhound::notify::NotificationSink;
use leadhound::pipeline;
use leadhound::state::{load_seen_keys, save_seen_keys, SeenKeys};
use leadhound::types::Lead;

const URL: &str = "https://partners.example.com/home/leads";

/// Records deliveries; keys listed in `failing` are rejected.
#[derive(Default)]
struct FakeSink {
    delivered: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl FakeSink {
    fn failing(keys: &[&str]) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn deliver(&self, lead: &Lead) -> Result<(), NotifyError> {
        if self.failing.contains(&lead.key) {
            return Err(NotifyError {
                key: lead.key.clone(),
                reason: "sink down".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(lead.key.clone());
        Ok(())
    }
}

fn sample_leads() -> Vec<Lead> {
    let headers = vec!["Numéro d'Installation".to_string(), "Nom".to_string()];
    let rows = vec![
        vec!["INS42".to_string(), "Dupont".to_string()],
        vec!["INS43".to_string(), "Martin".to_string()],
    ];
    assemble_leads("portal.example.com", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN)
}

#[tokio::test]
async fn first_run_dispatches_everything_once() {
    let leads = sample_leads();
    let sink = FakeSink::default();
    let mut seen = SeenKeys::new();

    let new_count = pipeline::process(&leads, &mut seen, &sink).await;

    assert_eq!(new_count, 2);
    assert_eq!(sink.delivered(), vec!["INS42", "INS43"]);
    assert!(seen.contains("INS42"));
    assert!(seen.contains("INS43"));
}

#[tokio::test]
async fn unchanged_leads_are_not_redispatched() {
    let leads = sample_leads();
    let sink = FakeSink::default();
    let mut seen = SeenKeys::new();

    pipeline::process(&leads, &mut seen, &sink).await;
    let snapshot = seen.clone();
    let second = pipeline::process(&leads, &mut seen, &sink).await;

    assert_eq!(second, 0);
    assert_eq!(seen, snapshot);
    assert_eq!(sink.delivered().len(), 2);
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let leads = sample_leads();

    // First run: the sink rejects INS42.
    let broken = FakeSink::failing(&["INS42"]);
    let mut seen = load_seen_keys(&state_path);
    let first = pipeline::process(&leads, &mut seen, &broken).await;
    save_seen_keys(&state_path, &seen).unwrap();

    assert_eq!(first, 1);
    assert!(!load_seen_keys(&state_path).contains("INS42"));
    assert!(load_seen_keys(&state_path).contains("INS43"));

    // Next run with a healthy sink picks the failed lead back up.
    let healthy = FakeSink::default();
    let mut seen = load_seen_keys(&state_path);
    let second = pipeline::process(&leads, &mut seen, &healthy).await;
    save_seen_keys(&state_path, &seen).unwrap();

    assert_eq!(second, 1);
    assert_eq!(healthy.delivered(), vec!["INS42"]);
    assert!(load_seen_keys(&state_path).contains("INS42"));
}

#[tokio::test]
async fn dispatch_preserves_table_then_row_order() {
    let headers = vec!["Id".to_string()];
    let first_table = assemble_leads(
        "portal.example.com",
        URL,
        &headers,
        &[vec!["a1".to_string()], vec!["a2".to_string()]],
        DEFAULT_KEY_HASH_LEN,
    );
    let second_table = assemble_leads(
        "shop.example.com",
        URL,
        &headers,
        &[vec!["b1".to_string()]],
        DEFAULT_KEY_HASH_LEN,
    );
    let leads: Vec<Lead> = first_table.into_iter().chain(second_table).collect();

    let sink = FakeSink::default();
    let mut seen = SeenKeys::new();
    pipeline::process(&leads, &mut seen, &sink).await;

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 3);
    let positions: Vec<usize> = leads
        .iter()
        .map(|l| delivered.iter().position(|k| k == &l.key).unwrap())
        .collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn empty_extraction_is_a_quiet_no_op() {
    let sink = FakeSink::default();
    let mut seen = SeenKeys::new();

    let new_count = pipeline::process(&[], &mut seen, &sink).await;

    assert_eq!(new_count, 0);
    assert!(seen.is_empty());
    assert!(sink.delivered().is_empty());
}
