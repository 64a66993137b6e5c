/// Finds non-overlapping matching token blocks between two lines
use crate::tokenizer::Token;

/// A correspondence between equal slices of two token sequences.
/// `a_end - a_start == b_end - b_start == len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
    pub len: usize,
}

struct Candidate {
    block: Block,
    score: usize,
}

/// Return the blocks shared by `a` and `b`, ordered by `a_start`, with
/// no overlap on either side.
///
/// The table holds longest common runs ending at each token pair, so a
/// shared run of length N also produces its shorter suffixes as
/// candidates; the greedy sweep admits the long run first and the
/// suffixes are rejected as overlaps. Candidates are scored by
/// `len + non-delimiter count`, which favors long, information-dense
/// runs while tolerating reordered segments. Candidates with no
/// significant word are dropped.
pub fn match_blocks(a: &[Token], b: &[Token]) -> Vec<Block> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let mut prev = vec![0usize; m + 1];
    let mut cur = vec![0usize; m + 1];
    let mut candidates: Vec<Candidate> = Vec::new();

    for i in 1..=n {
        for j in 1..=m {
            cur[j] = if a[i - 1].text == b[j - 1].text {
                prev[j - 1] + 1
            } else {
                0
            };
            let len = cur[j];
            if len == 0 {
                continue;
            }
            let a_start = i - len;
            let b_start = j - len;
            let slice = &a[a_start..i];
            if !slice.iter().any(Token::is_significant) {
                continue;
            }
            let non_delim = slice.iter().filter(|t| !t.is_delimiter).count();
            candidates.push(Candidate {
                block: Block {
                    a_start,
                    a_end: i,
                    b_start,
                    b_end: j,
                    len,
                },
                score: len + non_delim,
            });
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    // Stable sort keeps equal-score candidates in table order.
    candidates.sort_by(|x, y| y.score.cmp(&x.score));

    let mut used_a = vec![false; n];
    let mut used_b = vec![false; m];
    let mut admitted: Vec<Block> = Vec::new();

    for candidate in candidates {
        let bl = candidate.block;
        if used_a[bl.a_start..bl.a_end].iter().any(|&u| u) {
            continue;
        }
        if used_b[bl.b_start..bl.b_end].iter().any(|&u| u) {
            continue;
        }
        for u in &mut used_a[bl.a_start..bl.a_end] {
            *u = true;
        }
        for u in &mut used_b[bl.b_start..bl.b_end] {
            *u = true;
        }
        admitted.push(bl);
    }

    admitted.sort_by_key(|bl| bl.a_start);
    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn blocks_of(a: &str, b: &str) -> Vec<Block> {
        match_blocks(&tokenize(a), &tokenize(b))
    }

    fn a_text(line: &str, block: &Block) -> String {
        let tokens = tokenize(line);
        tokens[block.a_start..block.a_end]
            .iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_identical_lines_single_block() {
        let line = "connection reset by peer";
        let blocks = blocks_of(line, line);
        assert_eq!(blocks.len(), 1);
        assert_eq!(a_text(line, &blocks[0]), line);
    }

    #[test]
    fn test_ordered_and_disjoint() {
        let a = "User john logged in from 192.168.1.1";
        let b = "User admin logged in from 10.0.0.5";
        let blocks = blocks_of(a, b);
        assert!(!blocks.is_empty());
        for pair in blocks.windows(2) {
            assert!(pair[0].a_start < pair[1].a_start);
            assert!(pair[0].a_end <= pair[1].a_start);
        }
        // B ranges are disjoint too, though not necessarily ordered.
        let mut seen_b = vec![false; tokenize(b).len()];
        for bl in &blocks {
            for used in &mut seen_b[bl.b_start..bl.b_end] {
                assert!(!*used);
                *used = true;
            }
        }
    }

    #[test]
    fn test_insignificant_matches_rejected() {
        // Only single-char words and delimiters in common.
        let blocks = blocks_of("a . 1", "b . 1");
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_reordering_tolerated() {
        let blocks = blocks_of("alpha beta", "beta alpha");
        assert_eq!(blocks.len(), 2);
        assert_eq!(a_text("alpha beta", &blocks[0]), "alpha");
        assert_eq!(a_text("alpha beta", &blocks[1]), "beta");
        // The B side is in the opposite order.
        assert!(blocks[0].b_start > blocks[1].b_start);
    }

    #[test]
    fn test_long_block_beats_fragments() {
        let a = "request failed with status 500 for user bob";
        let b = "request failed with status 404 for user alice";
        let blocks = blocks_of(a, b);
        assert_eq!(a_text(a, &blocks[0]), "request failed with status ");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(blocks_of("", "anything here").is_empty());
        assert!(blocks_of("anything here", "").is_empty());
    }
}
