//! Offline timeline segmentation by dynamic programming.
//!
//! When quota tracking is disabled there is no real-time state to replay,
//! so a whole session is partitioned retrospectively: every observed
//! timestamp is assigned to exactly one of K contiguous segments, one per
//! step, maximizing the number of candidate labels that land in their own
//! segment.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

/// Longest/shortest segment ratio accepted by the balance tie-break
pub const BALANCE_RATIO_LIMIT: f64 = 5.0;

/// Cap on enumerated tying optimal boundary sets
pub const MAX_TIE_PATHS: usize = 64;

/// Partition timestamped candidate labels into contiguous segments.
///
/// `data` maps each observed timestamp to the 0-based candidate step
/// labels seen at that instant; K is `max label + 1`. Returns the K−1
/// boundary timestamps, each the first timestamp of the segment it opens,
/// or `None` when no partition exists (fewer timestamps than segments).
/// K ≤ 1 yields an empty boundary list.
pub fn segment(data: &BTreeMap<i64, Vec<u32>>) -> Option<Vec<i64>> {
    let keys: Vec<i64> = data.keys().copied().collect();
    let n = keys.len();
    let Some(max_label) = data.values().flatten().copied().max() else {
        return Some(Vec::new());
    };
    let k = max_label as usize + 1;
    if k <= 1 {
        return Some(Vec::new());
    }
    if n < k {
        debug!(n, k, "not enough timestamps to form one segment per step");
        return None;
    }

    // Prefix counts: count[label][i] = occurrences of `label` among the
    // first i timestamps.
    let mut count = vec![vec![0i64; n + 1]; k];
    for (i, key) in keys.iter().enumerate() {
        for label in 0..k {
            count[label][i + 1] = count[label][i];
        }
        for &v in &data[key] {
            if (v as usize) < k {
                count[v as usize][i + 1] += 1;
            }
        }
    }

    // dp[seg][i] = best score partitioning the first i timestamps into
    // `seg` segments; NONE marks infeasible states.
    const NONE_SCORE: i64 = i64::MIN;
    let mut dp = vec![vec![NONE_SCORE; n + 1]; k + 1];
    let mut choice = vec![vec![usize::MAX; n + 1]; k + 1];
    dp[0][0] = 0;
    for seg in 1..=k {
        let label = seg - 1;
        for i in seg..=n {
            let mut best = NONE_SCORE;
            let mut best_cut = usize::MAX;
            for j in (seg - 1)..i {
                if dp[seg - 1][j] == NONE_SCORE {
                    continue;
                }
                let score = dp[seg - 1][j] + count[label][i] - count[label][j];
                if score > best {
                    best = score;
                    best_cut = j;
                }
            }
            dp[seg][i] = best;
            choice[seg][i] = best_cut;
        }
    }
    if dp[k][n] == NONE_SCORE {
        return None;
    }

    // Greedy optimum via the stored argmax cuts. Segment starts collected
    // from the last segment backwards; index 0 opens segment 0 and is not
    // a boundary.
    let mut greedy_starts = Vec::with_capacity(k);
    let mut seg = k;
    let mut end = n;
    while seg > 0 {
        let cut = choice[seg][end];
        if cut == usize::MAX {
            break;
        }
        greedy_starts.push(cut);
        end = cut;
        seg -= 1;
    }
    greedy_starts.reverse();
    let greedy: Vec<i64> = greedy_starts.iter().skip(1).map(|&j| keys[j]).collect();

    // Multiple boundary sets can tie at the maximum score; enumerate a
    // bounded number of them and prefer the most balanced.
    let mut tied_starts: Vec<Vec<usize>> = Vec::new();
    let mut cuts_memo: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    collect_tied(
        k,
        n,
        &dp,
        &count,
        &mut cuts_memo,
        &mut Vec::new(),
        &mut tied_starts,
    );

    let mut best_balanced: Option<Vec<i64>> = None;
    let mut best_ratio = f64::MAX;
    for starts in &tied_starts {
        let mut lengths = Vec::with_capacity(k);
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(n);
            lengths.push(end - start);
        }
        let longest = *lengths.iter().max().unwrap_or(&0) as f64;
        let shortest = *lengths.iter().min().unwrap_or(&0) as f64;
        if shortest == 0.0 {
            continue;
        }
        let ratio = longest / shortest;
        if ratio <= BALANCE_RATIO_LIMIT && ratio < best_ratio {
            best_ratio = ratio;
            best_balanced = Some(starts.iter().skip(1).map(|&j| keys[j]).collect());
        }
    }

    Some(best_balanced.unwrap_or(greedy))
}

/// Enumerate segment-start index vectors of optimal partitions, capped at
/// [`MAX_TIE_PATHS`]. `trail` holds the starts of the segments chosen so
/// far, last segment first.
fn collect_tied(
    seg: usize,
    idx: usize,
    dp: &[Vec<i64>],
    count: &[Vec<i64>],
    cuts_memo: &mut HashMap<(usize, usize), Vec<usize>>,
    trail: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if out.len() >= MAX_TIE_PATHS {
        return;
    }
    if seg == 0 {
        if idx == 0 {
            let mut starts = trail.clone();
            starts.reverse();
            out.push(starts);
        }
        return;
    }
    let cuts = cuts_memo
        .entry((seg, idx))
        .or_insert_with(|| optimal_cuts(seg, idx, dp, count))
        .clone();
    for j in cuts {
        trail.push(j);
        collect_tied(seg - 1, j, dp, count, cuts_memo, trail, out);
        trail.pop();
    }
}

/// All cut points that achieve `dp[seg][idx]`.
fn optimal_cuts(seg: usize, idx: usize, dp: &[Vec<i64>], count: &[Vec<i64>]) -> Vec<usize> {
    let label = seg - 1;
    let target = dp[seg][idx];
    let mut cuts = Vec::new();
    if target == i64::MIN {
        return cuts;
    }
    for j in (seg - 1)..idx {
        if dp[seg - 1][j] == i64::MIN {
            continue;
        }
        if dp[seg - 1][j] + count[label][idx] - count[label][j] == target {
            cuts.push(j);
        }
    }
    cuts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(entries: &[(i64, &[u32])]) -> BTreeMap<i64, Vec<u32>> {
        entries
            .iter()
            .map(|(ts, labels)| (*ts, labels.to_vec()))
            .collect()
    }

    #[test]
    fn test_three_segment_partition() {
        // Three steps observed cleanly in order: boundaries open the
        // second and third segments.
        let input = data(&[
            (0, &[0]),
            (1000, &[0]),
            (2000, &[1]),
            (3000, &[1]),
            (4000, &[2]),
        ]);
        assert_eq!(segment(&input), Some(vec![2000, 4000]));
    }

    #[test]
    fn test_boundary_count_is_segments_minus_one() {
        let input = data(&[
            (0, &[0]),
            (10, &[1]),
            (20, &[2]),
            (30, &[3]),
            (40, &[3]),
        ]);
        let boundaries = segment(&input).unwrap();
        assert_eq!(boundaries.len(), 3);
    }

    #[test]
    fn test_single_label_needs_no_boundaries() {
        let input = data(&[(0, &[0]), (500, &[0])]);
        assert_eq!(segment(&input), Some(Vec::new()));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(segment(&BTreeMap::new()), Some(Vec::new()));
    }

    #[test]
    fn test_infeasible_when_fewer_timestamps_than_segments() {
        let input = data(&[(0, &[0, 1, 2])]);
        assert_eq!(segment(&input), None);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let input = data(&[
            (0, &[0]),
            (100, &[1, 0]),
            (200, &[1]),
            (300, &[0, 1]),
            (400, &[1]),
        ]);
        let first = segment(&input);
        let second = segment(&input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tie_break_prefers_balanced_segments() {
        // Labels only pin the first and last timestamps, so every cut
        // between them scores the same; the balance rule picks the middle.
        let input = data(&[(0, &[0]), (10, &[]), (20, &[]), (30, &[1])]);
        assert_eq!(segment(&input), Some(vec![20]));
    }

    #[test]
    fn test_unbalanced_ties_fall_back_to_greedy() {
        // Both optimal partitions of two timestamps into two segments have
        // ratio 1; sanity-check the fallback path never panics on minimal
        // input.
        let input = data(&[(0, &[0]), (10, &[1])]);
        assert_eq!(segment(&input), Some(vec![10]));
    }
}
