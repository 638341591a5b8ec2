//! Version / Diff Engine (C6, spec §4.6): pure diff computation between two
//! [`TokenDocument`]s. Persistence of the result is
//! [`crate::store::tokens::write_version`]'s job; this module only decides
//! what changed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consensus::tokens::TokenDocument;
use crate::css::color::{delta_e_2000, parse_css_color, rgba8_to_lab};
use crate::model::{ChangeType, TokenCategory};
use crate::store::tokens::ChangeInput;

/// A color difference below this ΔE is not a modification (spec §4.6).
const COLOR_MODIFICATION_THRESHOLD: f64 = 1.0;

fn category_from_name(name: &str) -> TokenCategory {
    match name {
        "color" => TokenCategory::Color,
        "typography" => TokenCategory::Typography,
        "dimension" => TokenCategory::Dimension,
        "shadow" => TokenCategory::Shadow,
        "radius" => TokenCategory::Radius,
        "motion" => TokenCategory::Motion,
        _ => TokenCategory::Dimension,
    }
}

fn category_of_path(path: &str) -> TokenCategory {
    category_from_name(path.split('.').next().unwrap_or(""))
}

/// DTCG `$value` leaves are always JSON strings in this implementation
/// (spec §9's tagged-union design note); unwrap rather than compare quoted
/// JSON text.
fn leaf_text(value: &serde_json::Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn values_equal(category: TokenCategory, old: &str, new: &str) -> bool {
    if old == new {
        return true;
    }
    match category {
        TokenCategory::Color => match (parse_css_color(old), parse_css_color(new)) {
            (Some(a), Some(b)) => {
                delta_e_2000(rgba8_to_lab(a), rgba8_to_lab(b)) < COLOR_MODIFICATION_THRESHOLD
            }
            _ => false,
        },
        TokenCategory::Typography => {
            // Family lists: index-wise string equality over comma segments.
            let a: Vec<&str> = old.split(',').map(str::trim).collect();
            let b: Vec<&str> = new.split(',').map(str::trim).collect();
            a == b
        }
        _ => false, // any numeric difference for dimensions/durations is a modification
    }
}

/// One human-readable changelog entry (spec §4.6 `changelog_json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub path: String,
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// The full result of diffing two token documents: ready-to-persist
/// [`ChangeInput`] rows plus the serialized changelog.
pub struct Diff {
    pub changes: Vec<ChangeInput>,
    pub changelog_json: String,
}

/// Computes the diff between `previous` (absent for a site's first scan)
/// and `current`, per the per-category equality rules in spec §4.6.
pub fn diff(previous: Option<&TokenDocument>, current: &TokenDocument) -> crate::error::Result<Diff> {
    let old_paths: BTreeMap<String, String> = previous
        .map(|doc| {
            doc.paths()
                .into_iter()
                .map(|(path, leaf)| (path, leaf_text(&leaf.value)))
                .collect()
        })
        .unwrap_or_default();
    let new_paths: BTreeMap<String, String> = current
        .paths()
        .into_iter()
        .map(|(path, leaf)| (path, leaf_text(&leaf.value)))
        .collect();

    let mut entries = Vec::new();

    for (path, new_value) in &new_paths {
        let category = category_of_path(path);
        match old_paths.get(path) {
            None => entries.push(ChangelogEntry {
                path: path.clone(),
                change_type: ChangeType::Added,
                old_value: None,
                new_value: Some(new_value.clone()),
            }),
            Some(old_value) => {
                if !values_equal(category, old_value, new_value) {
                    entries.push(ChangelogEntry {
                        path: path.clone(),
                        change_type: ChangeType::Modified,
                        old_value: Some(old_value.clone()),
                        new_value: Some(new_value.clone()),
                    });
                }
            }
        }
    }

    for (path, old_value) in &old_paths {
        if !new_paths.contains_key(path) {
            entries.push(ChangelogEntry {
                path: path.clone(),
                change_type: ChangeType::Removed,
                old_value: Some(old_value.clone()),
                new_value: None,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let changes = entries
        .iter()
        .map(|e| ChangeInput {
            token_path: e.path.clone(),
            change_type: e.change_type,
            category: category_of_path(&e.path),
            old_value: e.old_value.clone(),
            new_value: e.new_value.clone(),
        })
        .collect();

    let changelog_json = serde_json::to_string(&entries)?;

    Ok(Diff { changes, changelog_json })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::tokens::{CanonicalToken, ConsensusToken};

    fn color_token(name: &str, value: &str) -> ConsensusToken {
        ConsensusToken {
            name: name.to_string(),
            token: CanonicalToken::Color { value: value.to_string(), semantic: None },
            confidence: 0.9,
            usage: 42,
        }
    }

    #[test]
    fn first_scan_has_no_changes_relative_to_none() {
        let doc = TokenDocument::from_tokens(vec![color_token("primary", "#635bff")]);
        let result = diff(None, &doc).unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].change_type, ChangeType::Added);
    }

    #[test]
    fn distinct_color_beyond_delta_e_is_modified() {
        let old = TokenDocument::from_tokens(vec![color_token("primary", "#635bff")]);
        let new = TokenDocument::from_tokens(vec![color_token("primary", "#6358ef")]);
        let result = diff(Some(&old), &new).unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn near_identical_color_is_not_a_change() {
        let old = TokenDocument::from_tokens(vec![color_token("primary", "#635bff")]);
        let new = TokenDocument::from_tokens(vec![color_token("primary", "#635bfe")]);
        let result = diff(Some(&old), &new).unwrap();
        assert!(result.changes.is_empty());
    }

    #[test]
    fn added_and_removed_tokens_are_reported() {
        let old = TokenDocument::from_tokens(vec![color_token("primary", "#635bff")]);
        let new = TokenDocument::from_tokens(vec![color_token("accent", "#00d924")]);
        let result = diff(Some(&old), &new).unwrap();
        assert_eq!(result.changes.len(), 2);
        assert!(result.changes.iter().any(|c| c.change_type == ChangeType::Added));
        assert!(result.changes.iter().any(|c| c.change_type == ChangeType::Removed));
    }
}
