// Pure shaping of raw table text into leads.
use chrono::Utc;

use crate::keys::resolve_key;
use crate::normalize::normalize_key;
use crate::types::{ExtractedRow, Lead};

/// Assemble leads from one table's raw header and body-cell text.
///
/// Headers are normalized to canonical keys. Body rows that do not line up
/// with the header width are dropped silently; scraped markup is allowed to
/// be ragged without failing the run. `row_index` counts the rows that
/// survived, in document order.
pub fn assemble_leads(
    source: &str,
    url: &str,
    raw_headers: &[String],
    raw_rows: &[Vec<String>],
    hash_len: usize,
) -> Vec<Lead> {
    let headers: Vec<String> = raw_headers.iter().map(|h| normalize_key(h)).collect();
    if headers.is_empty() {
        return Vec::new();
    }

    let fetched_at = Utc::now();
    let mut leads = Vec::new();
    for cells in raw_rows {
        if cells.len() != headers.len() {
            continue;
        }
        let row: ExtractedRow = headers.iter().cloned().zip(cells.iter().cloned()).collect();
        let key = resolve_key(&row, hash_len);
        leads.push(Lead {
            source: source.to_string(),
            key,
            fetched_at,
            url: url.to_string(),
            row_index: leads.len(),
            row,
        });
    }
    leads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::DEFAULT_KEY_HASH_LEN;

    const URL: &str = "https://partners.example.com/home/leads";

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn shapes_one_table_end_to_end() {
        let headers = strings(&["Numéro d'Installation", "Nom"]);
        let rows = vec![strings(&["INS42", "Dupont"])];

        let leads = assemble_leads("portal.example.com", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN);

        assert_eq!(leads.len(), 1);
        let lead = &leads[0];
        assert_eq!(lead.source, "portal.example.com");
        assert_eq!(lead.key, "INS42");
        assert_eq!(lead.url, URL);
        assert_eq!(lead.row_index, 0);
        assert_eq!(lead.row.get("numero_d_installation").unwrap(), "INS42");
        assert_eq!(lead.row.get("nom").unwrap(), "Dupont");
    }

    #[test]
    fn mismatched_rows_are_dropped_not_fatal() {
        let headers = strings(&["A", "B", "C", "D"]);
        let rows = vec![
            strings(&["1", "2", "3"]),
            strings(&["1", "2", "3", "4"]),
            strings(&["1", "2", "3", "4", "5"]),
        ];

        let leads = assemble_leads("src", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN);

        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].row.get("a").unwrap(), "1");
    }

    #[test]
    fn all_mismatched_rows_yield_zero_leads() {
        let headers = strings(&["A", "B", "C", "D"]);
        let rows = vec![strings(&["1", "2", "3"]), strings(&["x"])];
        assert!(assemble_leads("src", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN).is_empty());
    }

    #[test]
    fn headerless_table_yields_zero_leads() {
        let rows = vec![strings(&[])];
        assert!(assemble_leads("src", URL, &[], &rows, DEFAULT_KEY_HASH_LEN).is_empty());
    }

    #[test]
    fn row_index_counts_surviving_rows() {
        let headers = strings(&["Id"]);
        let rows = vec![
            strings(&["one"]),
            strings(&["broken", "row"]),
            strings(&["two"]),
        ];

        let leads = assemble_leads("src", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN);

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].row_index, 0);
        assert_eq!(leads[1].row_index, 1);
    }

    #[test]
    fn rows_without_preferred_fields_get_hash_keys() {
        let headers = strings(&["Nom", "Ville"]);
        let rows = vec![strings(&["Dupont", "Paris"])];

        let leads = assemble_leads("src", URL, &headers, &rows, DEFAULT_KEY_HASH_LEN);

        assert_eq!(leads[0].key.len(), DEFAULT_KEY_HASH_LEN);
        assert!(leads[0].key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
