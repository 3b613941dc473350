use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::data::InputFiles;
use crate::error::{ErrorKind, LocalizeResult};
use crate::models::ModelContext;
use crate::ocr::Point;

mod pages;
mod srt;
mod subtitle;

pub use pages::ImageStage;
pub use srt::{format_time, srt_document, write_srt};
pub use subtitle::SubtitleStage;

/// The closed set of operations a request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Replace the text of every page.
    Translate,
    /// Replace the text, then colorize the page.
    Both,
    /// Transcribe a video and emit translated SRT captions.
    Subtitle,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Translate => "translate",
            OperationKind::Both => "both",
            OperationKind::Subtitle => "subtitle",
        }
    }

    /// Runs the scan stage for this kind.
    pub async fn scan(
        self,
        context: &ModelContext,
        inputs: &InputFiles,
        source_lang: &str,
        target_lang: &str,
    ) -> LocalizeResult<ScanOutput> {
        match self {
            OperationKind::Translate => {
                ImageStage::translate()
                    .scan(context, inputs, source_lang, target_lang)
                    .await
            }
            OperationKind::Both => {
                ImageStage::colorize()
                    .scan(context, inputs, source_lang, target_lang)
                    .await
            }
            OperationKind::Subtitle => {
                SubtitleStage
                    .scan(context, inputs, source_lang, target_lang)
                    .await
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ErrorKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "translate" => Ok(OperationKind::Translate),
            "both" => Ok(OperationKind::Both),
            "subtitle" => Ok(OperationKind::Subtitle),
            other => Err(ErrorKind::UnsupportedOperationType(other.to_string())),
        }
    }
}

/// One reviewable unit: a bubble on a page or a caption segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: usize,
    pub image_name: String,
    pub original: String,
    pub translated: String,
}

/// A caller's replacement text for the review item with id `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub index: usize,
    pub text: String,
}

/// Scan results for one page. `groups[i]` holds the member polygons of bubble
/// `i`; `originals` and `translated_texts` run parallel to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub image_name: String,
    pub groups: Vec<Vec<Vec<Point>>>,
    pub originals: Vec<String>,
    pub translated_texts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub start: f64,
    pub end: f64,
    pub original: String,
    pub translated: String,
}

/// Snapshot produced by a scan and consumed by exactly one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "snake_case")]
pub enum ReviewState {
    Translate {
        pages: Vec<PageState>,
    },
    Both {
        pages: Vec<PageState>,
    },
    Subtitle {
        segments: Vec<SubtitleSegment>,
        filename: String,
    },
}

impl ReviewState {
    pub fn kind(&self) -> OperationKind {
        match self {
            ReviewState::Translate { .. } => OperationKind::Translate,
            ReviewState::Both { .. } => OperationKind::Both,
            ReviewState::Subtitle { .. } => OperationKind::Subtitle,
        }
    }

    /// Review items as they were at scan time, ids included.
    pub fn review_items(&self) -> Vec<ReviewItem> {
        match self {
            ReviewState::Translate { pages } | ReviewState::Both { pages } => {
                let mut items = Vec::new();
                for page in pages {
                    for (original, translated) in page.originals.iter().zip(&page.translated_texts) {
                        items.push(ReviewItem {
                            id: items.len(),
                            image_name: page.image_name.clone(),
                            original: original.clone(),
                            translated: translated.clone(),
                        });
                    }
                }
                items
            }
            ReviewState::Subtitle { segments, .. } => segments
                .iter()
                .enumerate()
                .map(|(id, segment)| subtitle::review_item(id, segment, None))
                .collect(),
        }
    }

    /// Runs the render stage this snapshot was scanned for.
    pub fn render(
        &self,
        context: &ModelContext,
        inputs: &InputFiles,
        modifications: &[Modification],
    ) -> LocalizeResult<RenderOutput> {
        match self {
            ReviewState::Translate { pages } => {
                ImageStage::translate().render(context, inputs, pages, modifications)
            }
            ReviewState::Both { pages } => {
                ImageStage::colorize().render(context, inputs, pages, modifications)
            }
            ReviewState::Subtitle { segments, filename } => {
                SubtitleStage.render(segments, filename, modifications)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub review_items: Vec<ReviewItem>,
    pub state: ReviewState,
    /// Absorbed failures, one line each.
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub outputs: InputFiles,
    pub diagnostics: Vec<String>,
    /// Final text per output, in bubble or segment order.
    pub rendered_texts: BTreeMap<String, Vec<String>>,
}

/// Sparse id → text overrides; a later entry for the same id wins.
pub(crate) fn modification_map(modifications: &[Modification]) -> HashMap<usize, &str> {
    modifications
        .iter()
        .map(|m| (m.index, m.text.as_str()))
        .collect()
}

/// Final per-page texts: stored translations with modifications laid over
/// them. Ids count up across pages in order, matching the scan.
pub fn resolve_page_texts(pages: &[PageState], modifications: &[Modification]) -> Vec<Vec<String>> {
    let overrides = modification_map(modifications);
    let mut next_id = 0usize;
    pages
        .iter()
        .map(|page| {
            page.translated_texts
                .iter()
                .map(|stored| {
                    let id = next_id;
                    next_id += 1;
                    overrides
                        .get(&id)
                        .map(|text| text.to_string())
                        .unwrap_or_else(|| stored.clone())
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(name: &str, texts: &[&str]) -> PageState {
        PageState {
            image_name: name.to_string(),
            groups: texts.iter().map(|_| Vec::new()).collect(),
            originals: texts.iter().map(|t| format!("src {}", t)).collect(),
            translated_texts: texts.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn operation_kind_parses_known_names_only() {
        assert_eq!("translate".parse::<OperationKind>().unwrap(), OperationKind::Translate);
        assert_eq!(" Both ".parse::<OperationKind>().unwrap(), OperationKind::Both);
        assert_eq!("subtitle".parse::<OperationKind>().unwrap(), OperationKind::Subtitle);
        let err = "dubbing".parse::<OperationKind>().unwrap_err();
        assert!(matches!(err, ErrorKind::UnsupportedOperationType(name) if name == "dubbing"));
    }

    #[test]
    fn empty_modifications_keep_stored_texts() {
        let pages = vec![page("a.png", &["one", "two"]), page("b.png", &["three"])];
        assert_eq!(
            resolve_page_texts(&pages, &[]),
            vec![vec!["one", "two"], vec!["three"]]
        );
    }

    #[test]
    fn modification_ids_span_pages() {
        let pages = vec![page("a.png", &["one", "two"]), page("b.png", &["three"])];
        let mods = vec![
            Modification {
                index: 2,
                text: "THREE".into(),
            },
            Modification {
                index: 9,
                text: "ignored".into(),
            },
        ];
        assert_eq!(
            resolve_page_texts(&pages, &mods),
            vec![vec!["one", "two"], vec!["THREE"]]
        );
    }

    #[test]
    fn later_modification_for_same_id_wins() {
        let pages = vec![page("a.png", &["one"])];
        let mods = vec![
            Modification {
                index: 0,
                text: "first".into(),
            },
            Modification {
                index: 0,
                text: "second".into(),
            },
        ];
        assert_eq!(resolve_page_texts(&pages, &mods), vec![vec!["second"]]);
    }

    #[test]
    fn review_items_are_relisted_from_state() {
        let state = ReviewState::Translate {
            pages: vec![page("a.png", &["one"]), page("b.png", &[]), page("c.png", &["two"])],
        };
        let items = state.review_items();
        insta::assert_json_snapshot!(items, @r#"
        [
          {
            "id": 0,
            "image_name": "a.png",
            "original": "src one",
            "translated": "one"
          },
          {
            "id": 1,
            "image_name": "c.png",
            "original": "src two",
            "translated": "two"
          }
        ]
        "#);
    }

    #[test]
    fn state_is_tagged_by_operation_type() {
        let state = ReviewState::Subtitle {
            segments: vec![SubtitleSegment {
                start: 0.0,
                end: 1.5,
                original: "hola".into(),
                translated: "hello".into(),
            }],
            filename: "clip".into(),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["operation_type"], "subtitle");
        assert_eq!(value["filename"], "clip");
        let back: ReviewState = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), OperationKind::Subtitle);
    }
}
