// Webhook payload documentation, regenerated from a live example.
use std::fs;
use std::path::Path;

use tracing::info;

use crate::types::Lead;

/// Rewrite the payload documentation from one example lead. Called after
/// every run that produced at least one lead, so the doc always reflects
/// what the webhook actually receives.
pub fn write_payload_doc(example: &Lead, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let payload = serde_json::to_string_pretty(example)?;
    let fields: String = example
        .row
        .iter()
        .map(|(k, v)| {
            let description = if v.is_empty() { "Empty string" } else { v.as_str() };
            format!("- `{k}`: {description}\n")
        })
        .collect();

    let content = format!(
        "# Portal Leads Webhook\n\
         \n\
         ## Description\n\
         JSON payload POSTed to the configured webhook for each new lead detected.\n\
         \n\
         ## Payload\n\
         ```json\n\
         {payload}\n\
         ```\n\
         \n\
         ## Fields\n\
         \n\
         - `source`: source table label, assigned by table position\n\
         - `key`: stable lead identifier\n\
         - `fetched_at`: ISO-8601 extraction timestamp\n\
         - `url`: portal address the lead came from\n\
         - `row_index`: row position within its source table\n\
         - `row`: extracted fields (below)\n\
         \n\
         ### Row fields\n\
         \n\
         {fields}\
         \n\
         ## Notes\n\
         \n\
         - Header keys are normalized: lowercase, accents stripped, punctuation and spaces folded to underscores.\n\
         - Key selection order: `numero_d_installation`, `numero_de_confirmation`, `id`, then a truncated SHA-256 of the sorted row content.\n"
    );

    fs::write(path, content)?;
    info!("webhook payload doc rewritten at {}", path.display());
    Ok(())
}
