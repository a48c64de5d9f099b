use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use answerboard_types::api::{ConfigPatch, DisplaySettingsPatch};
use answerboard_types::models::{BoardConfig, CONFIG_VERSION, ColumnMapping, DisplaySettings};

use crate::error::{BoardError, BoardResult};
use crate::header::{ANSWER_SHEET_FIELDS, HeaderIndex, resolve_with_mapping};

/// Applies a partial update. Anything the patch leaves out keeps its prior
/// value; nested settings, mappings and confidence merge field by field.
pub fn merge_config(prior: &BoardConfig, patch: &ConfigPatch) -> BoardConfig {
    let mut merged = prior.clone();
    merged.version = CONFIG_VERSION;

    if let Some(v) = patch.is_published {
        merged.is_published = v;
    }
    if let Some(v) = patch.allow_anonymous {
        merged.allow_anonymous = v;
    }
    if let Some(v) = &patch.published_sheet_name {
        merged.published_sheet_name = Some(v.clone());
    }
    if let Some(v) = &patch.published_spreadsheet_id {
        merged.published_spreadsheet_id = Some(v.clone());
    }
    if let Some(v) = &patch.display_settings {
        merge_display_settings(&mut merged.display_settings, v);
    }
    if let Some(v) = &patch.column_mapping {
        merge_column_mapping(&mut merged.column_mapping, v);
    }
    if let Some(v) = &patch.confidence {
        merged.confidence = merge_confidence(&prior.confidence, v);
    }
    if let Some(v) = &patch.form_url {
        merged.form_url = Some(v.clone());
    }
    if let Some(v) = patch.setup_status {
        merged.setup_status = v;
    }
    merged
}

/// Per-key merge; scores are clamped to 100.
pub fn merge_confidence(
    prior: &BTreeMap<String, u8>,
    update: &BTreeMap<String, u8>,
) -> BTreeMap<String, u8> {
    let mut merged = prior.clone();
    for (field, score) in update {
        merged.insert(field.clone(), (*score).min(100));
    }
    merged
}

fn merge_display_settings(current: &mut DisplaySettings, patch: &DisplaySettingsPatch) {
    if let Some(v) = patch.show_names {
        current.show_names = v;
    }
    if let Some(v) = patch.show_reactions {
        current.show_reactions = v;
    }
    if let Some(v) = patch.show_counts {
        current.show_counts = v;
    }
    if let Some(v) = &patch.theme {
        current.theme = Some(v.clone());
    }
}

fn merge_column_mapping(current: &mut ColumnMapping, patch: &ColumnMapping) {
    for (slot, value) in [
        (&mut current.answer, &patch.answer),
        (&mut current.reason, &patch.reason),
        (&mut current.class, &patch.class),
        (&mut current.name, &patch.name),
    ] {
        if let Some(header) = value {
            *slot = Some(header.clone());
        }
    }
}

/// SHA-256 hex digest of the config with its etag cleared.
pub fn compute_etag(config: &BoardConfig) -> String {
    let mut unsigned = config.clone();
    unsigned.etag = None;
    let bytes = serde_json::to_vec(&unsigned).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Stamps the modification time and a fresh etag.
pub fn seal(mut config: BoardConfig, now: DateTime<Utc>) -> BoardConfig {
    config.last_modified = Some(now);
    config.etag = Some(compute_etag(&config));
    config
}

/// Once a stored config carries an etag, updates must present that etag.
pub fn check_etag(stored: &BoardConfig, presented: Option<&str>) -> BoardResult<()> {
    match (stored.etag.as_deref(), presented) {
        (None, _) => Ok(()),
        (Some(current), Some(presented)) if current == presented => Ok(()),
        (Some(_), Some(_)) => Err(BoardError::Conflict(
            "settings were changed elsewhere; reload and try again".to_string(),
        )),
        (Some(_), None) => Err(BoardError::Conflict("etag is required".to_string())),
    }
}

/// A config can be published only when it names a sheet and that sheet's
/// header row yields an answer column.
pub fn validate_for_publish(config: &BoardConfig, headers: &[String]) -> BoardResult<HeaderIndex> {
    if config
        .published_spreadsheet_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty())
    {
        return Err(BoardError::validation("no spreadsheet selected"));
    }
    if config
        .published_sheet_name
        .as_deref()
        .is_none_or(|name| name.trim().is_empty())
    {
        return Err(BoardError::validation("no sheet selected"));
    }

    resolve_with_mapping(headers, ANSWER_SHEET_FIELDS, &config.column_mapping).map_err(|e| {
        let missing: Vec<&str> = e.missing.iter().map(|f| f.as_str()).collect();
        BoardError::validation(format!("column mapping incomplete: {}", missing.join(", ")))
    })
}
