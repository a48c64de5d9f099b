//! Maps a sheet's header row to semantic fields.
//!
//! Matching ignores case, whitespace and full-width/half-width differences.
//! Explicit header names from the column mapping win, then exact synonym
//! matches, then "contains" matches. A column is never given to two fields,
//! and ties go to the leftmost column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use answerboard_types::models::{ColumnMapping, Field, ReactionKind};

pub const LIKE_HEADER: &str = "いいね！";
pub const UNDERSTAND_HEADER: &str = "なるほど！";
pub const CURIOUS_HEADER: &str = "もっと知りたい！";
pub const HIGHLIGHT_HEADER: &str = "ハイライト";

/// Columns the board appends to an answer sheet, in append order.
pub const SYSTEM_COLUMNS: [(Field, &str); 4] = [
    (Field::Understand, UNDERSTAND_HEADER),
    (Field::Like, LIKE_HEADER),
    (Field::Curious, CURIOUS_HEADER),
    (Field::Highlight, HIGHLIGHT_HEADER),
];

const EXACT_CONFIDENCE: u8 = 100;
const PARTIAL_CONFIDENCE: u8 = 80;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub synonyms: &'static [&'static str],
    pub required: bool,
    /// Allow "header contains synonym" matches.
    pub fuzzy: bool,
}

/// Fields of an answer sheet. Order matters for partial matches: narrower
/// fields come first so a header like "回答の理由" lands on `reason`.
pub const ANSWER_SHEET_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: Field::Reason,
        synonyms: &["理由", "根拠", "そう考える理由", "reason", "why"],
        required: false,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Class,
        synonyms: &["クラス", "学級", "組", "class"],
        required: false,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Name,
        synonyms: &["名前", "氏名", "お名前", "name"],
        required: false,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Email,
        synonyms: &["メールアドレス", "email", "e-mail", "emailaddress"],
        required: false,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Timestamp,
        synonyms: &["タイムスタンプ", "日時", "timestamp"],
        required: false,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Answer,
        synonyms: &["回答", "答え", "解答", "意見", "考え", "answer", "response"],
        required: true,
        fuzzy: true,
    },
    FieldSpec {
        field: Field::Understand,
        synonyms: &[UNDERSTAND_HEADER],
        required: false,
        fuzzy: false,
    },
    FieldSpec {
        field: Field::Like,
        synonyms: &[LIKE_HEADER],
        required: false,
        fuzzy: false,
    },
    FieldSpec {
        field: Field::Curious,
        synonyms: &[CURIOUS_HEADER],
        required: false,
        fuzzy: false,
    },
    FieldSpec {
        field: Field::Highlight,
        synonyms: &[HIGHLIGHT_HEADER],
        required: false,
        fuzzy: false,
    },
];

/// Resolved columns (0-based) with a detection confidence per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderIndex {
    pub columns: BTreeMap<Field, usize>,
    pub confidence: BTreeMap<Field, u8>,
}

impl HeaderIndex {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn reaction(&self, kind: ReactionKind) -> Option<usize> {
        self.get(kind.field())
    }

    /// Every field of `specs`, unresolved ones as `None`.
    pub fn semantic_map(&self, specs: &[FieldSpec]) -> BTreeMap<Field, Option<usize>> {
        specs.iter().map(|s| (s.field, self.get(s.field))).collect()
    }

    /// Confidence keyed by field name, the shape stored in the board config.
    pub fn confidence_by_name(&self) -> BTreeMap<String, u8> {
        self.confidence
            .iter()
            .map(|(field, score)| (field.as_str().to_string(), *score))
            .collect()
    }

    fn assign(&mut self, field: Field, column: usize, confidence: u8) {
        self.columns.insert(field, column);
        self.confidence.insert(field, confidence);
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("missing required columns: {missing:?}")]
pub struct MissingFields {
    pub missing: Vec<Field>,
    /// Whatever did resolve.
    pub partial: HeaderIndex,
}

/// Case-, whitespace- and width-insensitive form of a header.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .map(fold_width)
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn fold_width(c: char) -> char {
    match c as u32 {
        0xFF01..=0xFF5E => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        0x3000 => ' ',
        _ => c,
    }
}

pub fn resolve(headers: &[String], specs: &[FieldSpec]) -> Result<HeaderIndex, MissingFields> {
    resolve_with_mapping(headers, specs, &ColumnMapping::default())
}

pub fn resolve_with_mapping(
    headers: &[String],
    specs: &[FieldSpec],
    mapping: &ColumnMapping,
) -> Result<HeaderIndex, MissingFields> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut claimed = vec![false; normalized.len()];
    let mut index = HeaderIndex::default();

    let mut claim = |index: &mut HeaderIndex, field: Field, confidence: u8, pred: &dyn Fn(&str) -> bool| {
        let column = normalized
            .iter()
            .enumerate()
            .find(|(i, h)| !claimed[*i] && !h.is_empty() && pred(h))
            .map(|(i, _)| i);
        if let Some(column) = column {
            claimed[column] = true;
            index.assign(field, column, confidence);
        }
    };

    for spec in specs {
        if let Some(wanted) = mapping.get(spec.field).map(normalize_header) {
            if !wanted.is_empty() {
                claim(&mut index, spec.field, EXACT_CONFIDENCE, &|h| h == wanted);
            }
        }
    }

    for spec in specs {
        if index.get(spec.field).is_some() {
            continue;
        }
        let synonyms: Vec<String> = spec.synonyms.iter().map(|s| normalize_header(s)).collect();
        claim(&mut index, spec.field, EXACT_CONFIDENCE, &|h| synonyms.iter().any(|s| h == s));
    }

    for spec in specs.iter().filter(|s| s.fuzzy) {
        if index.get(spec.field).is_some() {
            continue;
        }
        let synonyms: Vec<String> = spec.synonyms.iter().map(|s| normalize_header(s)).collect();
        claim(&mut index, spec.field, PARTIAL_CONFIDENCE, &|h| {
            synonyms.iter().any(|s| h.contains(s.as_str()))
        });
    }

    let missing: Vec<Field> = specs
        .iter()
        .filter(|s| s.required && index.get(s.field).is_none())
        .map(|s| s.field)
        .collect();

    if missing.is_empty() {
        Ok(index)
    } else {
        Err(MissingFields {
            missing,
            partial: index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn every_answer_synonym_resolves() {
        let answer_spec = ANSWER_SHEET_FIELDS
            .iter()
            .find(|s| s.field == Field::Answer)
            .unwrap();

        for synonym in answer_spec.synonyms {
            for position in 0..3 {
                let mut row = headers(&["タイムスタンプ", "名前", "クラス"]);
                row.insert(position, synonym.to_string());
                let index = resolve(&row, ANSWER_SHEET_FIELDS).unwrap();
                assert_eq!(index.get(Field::Answer), Some(position), "synonym {synonym}");
            }
        }
    }

    #[test]
    fn missing_answer_is_reported() {
        let err = resolve(&headers(&["名前", "クラス", "理由"]), ANSWER_SHEET_FIELDS).unwrap_err();
        assert_eq!(err.missing, vec![Field::Answer]);
        assert_eq!(err.partial.get(Field::Name), Some(0));
    }

    #[test]
    fn optional_fields_degrade_to_none() {
        let index = resolve(&headers(&["回答"]), ANSWER_SHEET_FIELDS).unwrap();
        let map = index.semantic_map(ANSWER_SHEET_FIELDS);
        assert_eq!(map[&Field::Answer], Some(0));
        assert_eq!(map[&Field::Reason], None);
        assert_eq!(map[&Field::Name], None);
    }

    #[test]
    fn matching_ignores_case_width_and_whitespace() {
        let index = resolve(
            &headers(&["Ｔｉｍｅｓｔａｍｐ", " A N S W E R ", "回　答の理由"]),
            ANSWER_SHEET_FIELDS,
        )
        .unwrap();
        assert_eq!(index.get(Field::Timestamp), Some(0));
        assert_eq!(index.get(Field::Answer), Some(1));
        assert_eq!(index.get(Field::Reason), Some(2));
    }

    #[test]
    fn leftmost_column_wins_ties() {
        let index = resolve(&headers(&["名前", "回答", "回答"]), ANSWER_SHEET_FIELDS).unwrap();
        assert_eq!(index.get(Field::Answer), Some(1));
    }

    #[test]
    fn partial_matches_prefer_narrow_fields() {
        let index = resolve(
            &headers(&["あなたの回答の理由", "あなたの回答", "クラス名"]),
            ANSWER_SHEET_FIELDS,
        )
        .unwrap();
        assert_eq!(index.get(Field::Reason), Some(0));
        assert_eq!(index.get(Field::Answer), Some(1));
        assert_eq!(index.get(Field::Class), Some(2));
        assert_eq!(index.confidence[&Field::Answer], PARTIAL_CONFIDENCE);
    }

    #[test]
    fn explicit_mapping_overrides_synonyms() {
        let mapping = ColumnMapping {
            answer: Some("Q1: What did you notice?".to_string()),
            ..ColumnMapping::default()
        };
        let index = resolve_with_mapping(
            &headers(&["回答", "Q1: what did you notice?"]),
            ANSWER_SHEET_FIELDS,
            &mapping,
        )
        .unwrap();
        assert_eq!(index.get(Field::Answer), Some(1));
        assert_eq!(index.confidence[&Field::Answer], EXACT_CONFIDENCE);
    }

    #[test]
    fn stale_mapping_falls_back_to_detection() {
        let mapping = ColumnMapping {
            answer: Some("renamed away".to_string()),
            ..ColumnMapping::default()
        };
        let index =
            resolve_with_mapping(&headers(&["回答"]), ANSWER_SHEET_FIELDS, &mapping).unwrap();
        assert_eq!(index.get(Field::Answer), Some(0));
    }

    #[test]
    fn system_columns_match_exactly() {
        let index = resolve(
            &headers(&["回答", "いいね!", "なるほど！", "もっと知りたい！", "ハイライト"]),
            ANSWER_SHEET_FIELDS,
        )
        .unwrap();
        assert_eq!(index.reaction(ReactionKind::Like), Some(1));
        assert_eq!(index.reaction(ReactionKind::Understand), Some(2));
        assert_eq!(index.reaction(ReactionKind::Curious), Some(3));
        assert_eq!(index.get(Field::Highlight), Some(4));
    }
}
