use std::collections::BTreeMap;

use super::geom::union_box;
use super::{LineBox, OcrLine};

#[derive(Clone)]
struct WordToken {
    text: String,
    bbox: LineBox,
    conf: f32,
    len: usize,
}

/// Groups tesseract TSV word rows (level 5) into lines keyed by
/// (page, block, paragraph, line), in tesseract's own reading order.
pub(super) fn parse_tsv_lines(tsv: &str) -> Vec<OcrLine> {
    let mut word_map: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 || width == 0 || height == 0 {
            continue;
        }

        let key = (page_num, block_num, par_num, line_num);
        word_map.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            bbox: LineBox {
                x: left,
                y: top,
                w: width,
                h: height,
            },
            conf,
            len: text.chars().count().max(1),
        });
    }

    word_map
        .into_values()
        .filter_map(|mut words| {
            words.sort_by_key(|word| word.bbox.x);
            build_line(&words)
        })
        .collect()
}

fn build_line(words: &[WordToken]) -> Option<OcrLine> {
    let text = words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut bbox_opt: Option<LineBox> = None;
    let mut conf_sum = 0.0;
    let mut len_sum = 0.0;
    for word in words {
        bbox_opt = Some(match bbox_opt.take() {
            Some(bbox) => union_box(&bbox, &word.bbox),
            None => word.bbox.clone(),
        });
        let weight = word.len as f32;
        conf_sum += word.conf * weight;
        len_sum += weight;
    }
    let bbox = bbox_opt?;
    let conf = if len_sum > 0.0 { conf_sum / len_sum } else { 0.0 };

    Some(OcrLine {
        text: text.to_string(),
        bbox,
        conf,
    })
}
