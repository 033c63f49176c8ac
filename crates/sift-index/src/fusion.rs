use crate::types::Evidence;

/// Merge per-modality ranked lists into one comparable ranking.
///
/// Raw scores from different encoders live on different scales, so each
/// modality's result set is min-max normalized to [0, 1] before merging.
/// Degenerate sets (one candidate, or all scores equal) map to 1.0 — a
/// lone result is the best its collection has to offer. Ordering ties are
/// broken by `doc_id` so fusion is deterministic.
#[must_use]
pub fn fuse(mut per_modality: Vec<Vec<Evidence>>, k_final: usize) -> Vec<Evidence> {
    for list in &mut per_modality {
        normalize(list);
    }

    let mut merged: Vec<Evidence> = per_modality.into_iter().flatten().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    merged.truncate(k_final);
    merged
}

fn normalize(list: &mut [Evidence]) {
    let Some(first) = list.first() else {
        return;
    };
    let mut min = first.score;
    let mut max = first.score;
    for e in list.iter() {
        min = min.min(e.score);
        max = max.max(e.score);
    }
    let span = max - min;
    for e in list.iter_mut() {
        e.score = if span > f32::EPSILON {
            (e.score - min) / span
        } else {
            1.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Modality, Provenance};

    fn evidence(doc_id: &str, modality: Modality, score: f32) -> Evidence {
        Evidence {
            doc_id: doc_id.into(),
            modality,
            snippet: String::new(),
            score,
            rerank_score: None,
            provenance: Provenance::default(),
            image_data: None,
        }
    }

    #[test]
    fn normalizes_each_modality_to_unit_range() {
        let text = vec![
            evidence("t1", Modality::Text, 10.0),
            evidence("t2", Modality::Text, 5.0),
            evidence("t3", Modality::Text, 0.0),
        ];
        let fused = fuse(vec![text], 10);
        assert!((fused[0].score - 1.0).abs() < f32::EPSILON);
        assert!((fused[1].score - 0.5).abs() < f32::EPSILON);
        assert!((fused[2].score - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn merges_across_scales() {
        // Text encoder scores in tens, image encoder in fractions: raw
        // comparison would drown the image results entirely.
        let text = vec![
            evidence("t1", Modality::Text, 40.0),
            evidence("t2", Modality::Text, 20.0),
        ];
        let image = vec![
            evidence("i1", Modality::Image, 0.9),
            evidence("i2", Modality::Image, 0.1),
        ];
        let fused = fuse(vec![text, image], 10);
        assert_eq!(fused.len(), 4);
        // Both top candidates normalize to 1.0 and interleave by doc_id.
        assert_eq!(fused[0].doc_id, "i1");
        assert_eq!(fused[1].doc_id, "t1");
    }

    #[test]
    fn truncates_to_k_final() {
        let text = (0..10u8)
            .map(|i| evidence(&format!("t{i}"), Modality::Text, f32::from(i)))
            .collect();
        let fused = fuse(vec![text], 3);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].doc_id, "t9");
    }

    #[test]
    fn single_candidate_normalizes_to_one() {
        let fused = fuse(vec![vec![evidence("only", Modality::Screen, 0.37)]], 5);
        assert!((fused[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn constant_scores_normalize_to_one() {
        let screen = vec![
            evidence("s1", Modality::Screen, 0.5),
            evidence("s2", Modality::Screen, 0.5),
        ];
        let fused = fuse(vec![screen], 5);
        assert!(fused.iter().all(|e| (e.score - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(fuse(vec![], 5).is_empty());
        assert!(fuse(vec![vec![], vec![]], 5).is_empty());
    }

    #[test]
    fn ties_break_by_doc_id() {
        let a = vec![evidence("b", Modality::Text, 1.0)];
        let b = vec![evidence("a", Modality::Image, 1.0)];
        let fused = fuse(vec![a, b], 5);
        assert_eq!(fused[0].doc_id, "a");
        assert_eq!(fused[1].doc_id, "b");
    }
}
