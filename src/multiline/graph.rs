use once_cell::sync::Lazy;

use super::token::Token;
use super::tokenizer::tokenize;

/// Minimum number of tokens (input length and best-run length) for a
/// sequence to be considered a timestamp candidate at all.
pub(crate) const MINIMUM_TOKEN_LENGTH: usize = 8;

/// Known timestamp formats used to build the token graph. Similar or
/// partially duplicate formats are harmless since related transitions are
/// inherently deduped in the graph.
const KNOWN_TIMESTAMP_FORMATS: &[&str] = &[
    "2024-03-28T13:45:30.123456Z",
    "28/Mar/2024:13:45:30",
    "Sun, 28 Mar 2024 13:45:30",
    "2024-03-28 13:45:30",
    "2024-03-28 13:45:30,123",
    "02 Jan 06 15:04 MST",
    "2024-03-28T14:33:53.743350Z",
    "2024-03-28T15:19:38.578639+00:00",
    "2024-03-28 15:44:53",
    "2024-08-20'T'13:20:10*633+0000",
    "2024 Mar 03 05:12:41.211 PDT",
    "Jan 21 18:20:11 +0000 2024",
    "19/Apr/2024:06:36:15",
    "Dec 2, 2024 2:39:58 AM",
    "Jun 09 2024 15:28:14",
    "Apr 20 00:00:35 2010",
    "Sep 28 19:00:00 +0000",
    "Mar 16 08:12:04",
    "Jul 1 09:00:55",
    "2024-10-14T22:11:20+0000",
    "2024-07-01T14:59:55.711",
    "2024-07-01T14:59:55.711Z",
    "2024-08-19 12:17:55-0400",
    "2024-06-26 02:31:29,573",
    "2024/04/12*19:37:50",
    "2024 Apr 13 22:08:13.211*PDT",
    "2024 Mar 10 01:44:20.392",
    "2024-03-10 14:30:12,655+0000",
    "2024-02-27 15:35:20.311",
    "2024-07-22'T'16:28:55.444",
    "2024-11-22'T'10:10:15.455",
    "2024-02-11'T'18:31:44",
    "2024-10-30*02:47:33:899",
    "2024-07-04*13:23:55",
    "24-02-11 16:47:35,985 +0000",
    "24-06-26 02:31:29,573",
    "24-04-19 12:00:17",
    "06/01/24 04:11:05",
    "08/10/24*13:33:56",
    "11/24/2024*05:13:11",
    "05/09/2024*08:22:14*612",
    "04/23/24 04:34:22 +0000",
    "2024/04/25 14:57:42",
    "11:42:35.173",
    "11:42:35,173",
    "23/Apr 11:42:35,173",
    "23/Apr/2024:11:42:35",
    "23/Apr/2024 11:42:35",
    "23-Apr-2024 11:42:35",
    "23-Apr-2024 11:42:35.883",
    "23 Apr 2024 11:42:35",
    "23 Apr 2024 10:32:35*311",
    "8/5/2024 3:31:18 AM:234",
    "9/28/2024 2:23:15 PM",
    "2023-03.28T14-33:53-7430Z",
    "2017-05-16_13:53:08",
];

/// Process-wide token graph trained on the known timestamp formats.
pub(crate) static TIMESTAMP_GRAPH: Lazy<TokenGraph> = Lazy::new(|| {
    let sequences: Vec<Vec<Token>> = KNOWN_TIMESTAMP_FORMATS
        .iter()
        .map(|f| tokenize(f.as_bytes()))
        .collect();
    TokenGraph::new(MINIMUM_TOKEN_LENGTH, &sequences)
});

/// Result of scoring a token sequence against the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct MatchContext {
    pub(crate) probability: f64,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// A directed graph over the token alphabet that models which token
/// transitions occur in known timestamp formats. Scoring finds the densest
/// contiguous run of known transitions in an unknown sequence.
pub(crate) struct TokenGraph {
    adjacency: Vec<[bool; Token::COUNT]>,
    minimum_token_length: usize,
}

impl TokenGraph {
    pub(crate) fn new(minimum_token_length: usize, sequences: &[Vec<Token>]) -> Self {
        let mut graph = TokenGraph {
            adjacency: vec![[false; Token::COUNT]; Token::COUNT],
            minimum_token_length,
        };
        for seq in sequences {
            graph.add(seq);
        }
        graph
    }

    fn add(&mut self, tokens: &[Token]) {
        for pair in tokens.windows(2) {
            self.adjacency[pair[0].index()][pair[1].index()] = true;
        }
    }

    /// Probability that a token sequence is represented by the graph:
    /// +1 for each adjacent pair whose transition is known, -1 otherwise,
    /// maximised over contiguous subsequences (modified Kadane), then
    /// averaged over the best run's length.
    pub(crate) fn match_probability(&self, tokens: &[Token]) -> MatchContext {
        if tokens.len() < self.minimum_token_length {
            return MatchContext::default();
        }

        let scores: Vec<i64> = tokens
            .windows(2)
            .map(|pair| {
                if self.adjacency[pair[0].index()][pair[1].index()] {
                    1
                } else {
                    -1
                }
            })
            .collect();

        let (average, start, end) = max_average_subsequence(&scores);
        if end - start < self.minimum_token_length {
            return MatchContext::default();
        }

        MatchContext {
            probability: average,
            start,
            end,
        }
    }
}

/// Modified Kadane's algorithm: returns the average, start, and end (end is
/// exclusive on the score array, i.e. one past the last pair index) of the
/// maximum-sum contiguous subsequence.
fn max_average_subsequence(scores: &[i64]) -> (f64, usize, usize) {
    if scores.is_empty() {
        return (0.0, 0, 0);
    }

    let mut max_sum = scores[0];
    let mut current_sum = scores[0];
    let mut start = 0usize;
    let mut end = 0usize;
    let mut temp_start = 0usize;

    for (i, &v) in scores.iter().enumerate().skip(1) {
        if v > current_sum + v {
            current_sum = v;
            temp_start = i;
        } else {
            current_sum += v;
        }

        if current_sum > max_sum {
            max_sum = current_sum;
            start = temp_start;
            end = i;
        }
    }

    end += 1;
    (max_sum as f64 / (end - start) as f64, start, end)
}
