//! Fixed-depth prefix-tree log clustering (the Drain algorithm).
//!
//! Lines are tokenised, routed through a shallow prefix tree keyed on token
//! count and leading tokens, and matched against the clusters at the leaf by
//! positional similarity. A matching cluster generalises differing positions
//! to the wildcard; a non-matching line starts a new cluster.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// The literal wildcard token used in generalised patterns.
pub const WILDCARD: &str = "<*>";

/// Configuration for the Drain clusterer.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Total tree depth; the prefix tree consumes the first `depth - 2`
    /// tokens below the length layer.
    pub depth: usize,
    /// Similarity threshold for joining an existing cluster.
    pub sim_th: f64,
    /// Maximum children per internal node before new tokens route through
    /// the wildcard child.
    pub max_children: usize,
    /// Extra token boundaries on top of whitespace.
    pub extra_delimiters: Vec<char>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            depth: 4,
            sim_th: 0.4,
            max_children: 100,
            extra_delimiters: vec!['|', '=', ','],
        }
    }
}

/// A discovered template: stable identity, generalised pattern, match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: Uuid,
    pub pattern: String,
    pub count: u64,
}

/// Split a line the way the clusterer does: extra delimiters become spaces,
/// then the result is split on whitespace runs.
pub(crate) fn split_tokens(line: &str, extra_delimiters: &[char]) -> Vec<String> {
    line.split(|c: char| c.is_whitespace() || extra_delimiters.contains(&c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_digits(token: &str) -> bool {
    token.bytes().any(|b| b.is_ascii_digit())
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, usize>,
    clusters: Vec<usize>,
}

#[derive(Debug)]
struct Cluster {
    id: Uuid,
    tokens: Vec<String>,
    count: u64,
}

struct DrainTree {
    max_node_depth: usize,
    sim_th: f64,
    max_children: usize,
    /// Token count → index of the first-layer node.
    length_roots: HashMap<usize, usize>,
    nodes: Vec<Node>,
    clusters: Vec<Cluster>,
}

impl DrainTree {
    fn new(config: &DrainConfig) -> Self {
        Self {
            max_node_depth: config.depth.saturating_sub(2),
            sim_th: config.sim_th,
            max_children: config.max_children,
            length_roots: HashMap::new(),
            nodes: Vec::new(),
            clusters: Vec::new(),
        }
    }

    fn add_line(&mut self, tokens: Vec<String>) {
        if let Some(leaf) = self.search_leaf(&tokens) {
            if let Some(cluster_idx) = self.best_match(leaf, &tokens) {
                self.merge_into(cluster_idx, &tokens);
                return;
            }
        }

        let cluster_idx = self.clusters.len();
        self.clusters.push(Cluster {
            id: Uuid::new_v4(),
            tokens,
            count: 1,
        });
        let leaf = self.insert_path(cluster_idx);
        self.nodes[leaf].clusters.push(cluster_idx);
    }

    /// Non-mutating descent: follow the length layer and the leading tokens,
    /// taking the wildcard child when the literal token is absent.
    fn search_leaf(&self, tokens: &[String]) -> Option<usize> {
        let mut node = *self.length_roots.get(&tokens.len())?;

        for token in tokens.iter().take(self.max_node_depth) {
            let children = &self.nodes[node].children;
            node = match children.get(token.as_str()) {
                Some(&next) => next,
                None => *children.get(WILDCARD)?,
            };
        }

        Some(node)
    }

    /// The leaf cluster most similar to the token sequence, if any reaches
    /// the similarity threshold. Similarity counts positions where the
    /// cluster token equals the line token or is the wildcard, divided by
    /// the token count; ties break toward more wildcards.
    fn best_match(&self, leaf: usize, tokens: &[String]) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_sim = -1.0f64;
        let mut best_wildcards = -1i64;

        for &cluster_idx in &self.nodes[leaf].clusters {
            let cluster = &self.clusters[cluster_idx];
            if cluster.tokens.len() != tokens.len() {
                continue;
            }

            let mut matched = 0i64;
            let mut wildcards = 0i64;
            for (have, want) in cluster.tokens.iter().zip(tokens) {
                if have == WILDCARD {
                    matched += 1;
                    wildcards += 1;
                } else if have == want {
                    matched += 1;
                }
            }

            let sim = matched as f64 / tokens.len() as f64;
            if sim > best_sim || (sim == best_sim && wildcards > best_wildcards) {
                best_sim = sim;
                best_wildcards = wildcards;
                best = Some(cluster_idx);
            }
        }

        if best_sim >= self.sim_th { best } else { None }
    }

    fn merge_into(&mut self, cluster_idx: usize, tokens: &[String]) {
        let cluster = &mut self.clusters[cluster_idx];
        for (have, want) in cluster.tokens.iter_mut().zip(tokens) {
            if have != want {
                *have = WILDCARD.to_string();
            }
        }
        cluster.count += 1;
    }

    /// Mutating descent for a freshly created cluster: inserts the length
    /// node and token nodes as needed. Numeric-looking tokens route through
    /// the wildcard child; a full internal node routes new tokens through
    /// the wildcard as well, creating it in the last slot.
    fn insert_path(&mut self, cluster_idx: usize) -> usize {
        let tokens = std::mem::take(&mut self.clusters[cluster_idx].tokens);

        let len = tokens.len();
        let mut node = match self.length_roots.get(&len).copied() {
            Some(idx) => idx,
            None => {
                let idx = self.new_node();
                self.length_roots.insert(len, idx);
                idx
            }
        };

        for token in tokens.iter().take(self.max_node_depth) {
            node = self.descend_or_insert(node, token);
        }

        self.clusters[cluster_idx].tokens = tokens;
        node
    }

    fn descend_or_insert(&mut self, node: usize, token: &str) -> usize {
        if let Some(next) = self.nodes[node].children.get(token).copied() {
            return next;
        }

        if has_digits(token) {
            return match self.nodes[node].children.get(WILDCARD).copied() {
                Some(next) => next,
                None => self.insert_child(node, WILDCARD),
            };
        }

        match self.nodes[node].children.get(WILDCARD).copied() {
            Some(wildcard) => {
                if self.nodes[node].children.len() < self.max_children {
                    self.insert_child(node, token)
                } else {
                    wildcard
                }
            }
            None => {
                if self.nodes[node].children.len() + 1 < self.max_children {
                    self.insert_child(node, token)
                } else {
                    // Last slot is reserved for the wildcard.
                    self.insert_child(node, WILDCARD)
                }
            }
        }
    }

    fn insert_child(&mut self, parent: usize, token: &str) -> usize {
        let idx = self.new_node();
        self.nodes[parent].children.insert(token.to_string(), idx);
        idx
    }

    fn new_node(&mut self) -> usize {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }
}

/// Online Drain clusterer with stable template UUIDs.
///
/// Mutable state is mutex-guarded; typical usage is a single batch feed
/// followed by a [`DrainClusterer::templates`] snapshot.
pub struct DrainClusterer {
    extra_delimiters: Vec<char>,
    tree: Mutex<DrainTree>,
}

impl DrainClusterer {
    pub fn new(config: DrainConfig) -> Self {
        Self {
            tree: Mutex::new(DrainTree::new(&config)),
            extra_delimiters: config.extra_delimiters,
        }
    }

    /// Process a batch of log lines through the clustering algorithm.
    pub fn feed<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = self.tree.lock().expect("drain tree lock poisoned");
        for line in lines {
            let tokens = split_tokens(line.as_ref(), &self.extra_delimiters);
            tree.add_line(tokens);
        }
    }

    /// Snapshot all clusters discovered so far, in creation order.
    pub fn templates(&self) -> Vec<Template> {
        let tree = self.tree.lock().expect("drain tree lock poisoned");
        tree.clusters
            .iter()
            .map(|c| Template {
                id: c.id,
                pattern: c.tokens.join(" "),
                count: c.count,
            })
            .collect()
    }
}
