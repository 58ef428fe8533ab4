//! HNSW (Hierarchical Navigable Small World) index over cosine distance.
//!
//! The index keeps its own copy of every vector and a layered neighbour graph. It is
//! purely in-memory; the owning store persists the records and rebuilds the graph from
//! them. Node levels are derived from the record id, so rebuilding from the same
//! records in the same order reproduces the same graph.
//!
//! ## Staging
//!
//! Inserts made between [`HnswIndex::begin_staging`] and
//! [`HnswIndex::commit_staged`] can be undone with [`HnswIndex::rollback_staged`].
//! While staging, every neighbour list that is about to change is journaled first.
//! Rollback replays the journal backwards and truncates the staged nodes, leaving the
//! graph exactly as it was when staging began.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::distance::{cosine_with_norms, norm};
use crate::error::VectorError;

/// Default maximum links per node on upper layers (layer 0 keeps twice as many).
pub const DEFAULT_MAX_CONNECTIVITY: usize = 16;
/// Default beam width while inserting.
pub const DEFAULT_CONSTRUCTION_BREADTH: usize = 64;
/// Default beam width while querying.
pub const DEFAULT_SEARCH_BREADTH: usize = 40;

/// Levels above this are clamped.
const MAX_LEVEL: usize = 16;

/// Build and query parameters for [`HnswIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HnswConfig {
    /// Maximum links per node on layers above 0. Higher improves recall at the cost
    /// of memory and insert time.
    pub max_connectivity: usize,
    /// Beam width used to find neighbours for a new node. Higher costs more at build
    /// time and yields a better connected graph.
    pub construction_breadth: usize,
    /// Default beam width for queries. Can be overridden per query.
    pub search_breadth: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connectivity: DEFAULT_MAX_CONNECTIVITY,
            construction_breadth: DEFAULT_CONSTRUCTION_BREADTH,
            search_breadth: DEFAULT_SEARCH_BREADTH,
        }
    }
}

impl HnswConfig {
    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<(), VectorError> {
        if self.max_connectivity < 2 {
            return Err(VectorError::InvalidArgument(format!(
                "max connectivity must be at least 2, got {}",
                self.max_connectivity
            )));
        }
        if self.construction_breadth == 0 {
            return Err(VectorError::InvalidArgument(
                "construction breadth must be at least 1".to_string(),
            ));
        }
        if self.search_breadth == 0 {
            return Err(VectorError::InvalidArgument(
                "search breadth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_connectivity * 2
        } else {
            self.max_connectivity
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn level_multiplier(&self) -> f64 {
        1.0 / (self.max_connectivity.max(2) as f64).ln()
    }
}

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Id the vector was inserted under.
    pub id: u64,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f32,
}

/// Summary of an index, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of indexed vectors.
    pub len: usize,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Highest populated layer.
    pub max_level: usize,
    /// Parameters the index was built with.
    pub config: HnswConfig,
}

struct Node {
    id: u64,
    vector: Vec<f32>,
    norm: f32,
    /// `links[layer]` holds neighbour node indices; `links.len() - 1` is the node level.
    links: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    node: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

struct Journal {
    node_count: usize,
    entry_point: Option<u32>,
    max_level: usize,
    links: Vec<(u32, usize, Vec<u32>)>,
}

/// Approximate nearest-neighbour index ranking by cosine similarity.
pub struct HnswIndex {
    dimension: usize,
    config: HnswConfig,
    nodes: Vec<Node>,
    lookup: HashMap<u64, u32>,
    entry_point: Option<u32>,
    max_level: usize,
    journal: Option<Journal>,
}

impl HnswIndex {
    /// Creates an empty index for vectors of `dimension` elements.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            dimension,
            config,
            nodes: Vec::new(),
            lookup: HashMap::new(),
            entry_point: None,
            max_level: 0,
            journal: None,
        }
    }

    /// Builds an index from `(id, vector)` pairs, inserting them in iteration order.
    pub fn build<I>(dimension: usize, config: HnswConfig, entries: I) -> Result<Self, VectorError>
    where
        I: IntoIterator<Item = (u64, Vec<f32>)>,
    {
        let mut index = Self::new(dimension, config);
        for (id, vector) in entries {
            index.insert(id, &vector)?;
        }
        Ok(index)
    }

    /// Returns the vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the build parameters.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Returns the number of indexed vectors.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` is indexed.
    pub fn contains(&self, id: u64) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Returns the indexed vector for `id`.
    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.lookup
            .get(&id)
            .map(|&node| self.nodes[node as usize].vector.as_slice())
    }

    /// Returns a summary of the index.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            len: self.nodes.len(),
            dimension: self.dimension,
            max_level: self.max_level,
            config: self.config,
        }
    }

    /// Returns `true` while a staging session is open.
    pub fn is_staging(&self) -> bool {
        self.journal.is_some()
    }

    /// Opens a staging session. Inserts made from now on can be rolled back.
    pub fn begin_staging(&mut self) -> Result<(), VectorError> {
        if self.journal.is_some() {
            return Err(VectorError::InvalidArgument(
                "a staging session is already open".to_string(),
            ));
        }
        self.journal = Some(Journal {
            node_count: self.nodes.len(),
            entry_point: self.entry_point,
            max_level: self.max_level,
            links: Vec::new(),
        });
        Ok(())
    }

    /// Keeps everything inserted since [`HnswIndex::begin_staging`].
    pub fn commit_staged(&mut self) {
        self.journal = None;
    }

    /// Discards everything inserted since [`HnswIndex::begin_staging`].
    ///
    /// Returns the number of entries removed. Does nothing outside a session.
    pub fn rollback_staged(&mut self) -> usize {
        let Some(journal) = self.journal.take() else {
            return 0;
        };

        for (node, layer, previous) in journal.links.into_iter().rev() {
            self.nodes[node as usize].links[layer] = previous;
        }

        let removed = self.nodes.len() - journal.node_count;
        for node in self.nodes.drain(journal.node_count..) {
            self.lookup.remove(&node.id);
        }
        self.entry_point = journal.entry_point;
        self.max_level = journal.max_level;
        removed
    }

    /// Adds `vector` under `id`.
    pub fn insert(&mut self, id: u64, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.lookup.contains_key(&id) {
            return Err(VectorError::DuplicateId(id));
        }
        let node_count = u32::try_from(self.nodes.len())
            .map_err(|_| VectorError::InvalidArgument("index is full".to_string()))?;

        let level = self.level_for(id);
        let query_norm = norm(vector);
        self.nodes.push(Node {
            id,
            vector: vector.to_vec(),
            norm: query_norm,
            links: vec![Vec::new(); level + 1],
        });
        self.lookup.insert(id, node_count);
        let new_node = node_count;

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(new_node);
            self.max_level = level;
            return Ok(());
        };

        let mut current = entry;
        for layer in (level + 1..=self.max_level).rev() {
            current = self.greedy_closest(vector, query_norm, current, layer);
        }

        let mut entry_points = vec![current];
        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(
                vector,
                query_norm,
                &entry_points,
                self.config.construction_breadth,
                layer,
            );
            let selected: Vec<u32> = candidates
                .iter()
                .filter(|c| c.node != new_node)
                .take(self.config.max_connectivity)
                .map(|c| c.node)
                .collect();

            self.nodes[new_node as usize].links[layer].clone_from(&selected);
            for &neighbor in &selected {
                self.connect(neighbor, new_node, layer);
            }

            entry_points = candidates.into_iter().map(|c| c.node).collect();
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(new_node);
        }
        Ok(())
    }

    /// Returns up to `k` entries ordered by descending similarity, ties by ascending id.
    ///
    /// `search_breadth` is the beam width on the bottom layer; it is raised to `k`
    /// when smaller. Indexes no larger than the beam are scanned exhaustively.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        search_breadth: usize,
    ) -> Result<Vec<Neighbor>, VectorError> {
        if k == 0 {
            return Err(VectorError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let query_norm = norm(query);
        let breadth = search_breadth.max(k);

        let mut hits: Vec<Neighbor> = if self.nodes.len() <= breadth {
            (0..self.nodes.len())
                .map(|node| self.neighbor(query, query_norm, node))
                .collect()
        } else {
            let mut current = entry;
            for layer in (1..=self.max_level).rev() {
                current = self.greedy_closest(query, query_norm, current, layer);
            }
            self.search_layer(query, query_norm, &[current], breadth, 0)
                .into_iter()
                .map(|c| self.neighbor(query, query_norm, c.node as usize))
                .collect()
        };

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn neighbor(&self, query: &[f32], query_norm: f32, node: usize) -> Neighbor {
        let n = &self.nodes[node];
        Neighbor {
            id: n.id,
            similarity: cosine_with_norms(query, query_norm, &n.vector, n.norm),
        }
    }

    fn distance(&self, query: &[f32], query_norm: f32, node: u32) -> f32 {
        let n = &self.nodes[node as usize];
        1.0 - cosine_with_norms(query, query_norm, &n.vector, n.norm)
    }

    /// Walks `layer` greedily towards `query`, one best neighbour at a time.
    fn greedy_closest(&self, query: &[f32], query_norm: f32, start: u32, layer: usize) -> u32 {
        let mut best = Candidate {
            distance: self.distance(query, query_norm, start),
            node: start,
        };
        loop {
            let mut improved = false;
            let links = self.nodes[best.node as usize]
                .links
                .get(layer)
                .map_or(&[][..], Vec::as_slice);
            for &neighbor in links {
                let candidate = Candidate {
                    distance: self.distance(query, query_norm, neighbor),
                    node: neighbor,
                };
                if candidate < best {
                    best = candidate;
                    improved = true;
                }
            }
            if !improved {
                return best.node;
            }
        }
    }

    /// Beam search on one layer. Returns candidates sorted nearest first.
    fn search_layer(
        &self,
        query: &[f32],
        query_norm: f32,
        entry_points: &[u32],
        breadth: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let candidate = Candidate {
                    distance: self.distance(query, query_norm, ep),
                    node: ep,
                };
                frontier.push(Reverse(candidate));
                results.push(candidate);
            }
        }
        while results.len() > breadth {
            results.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(furthest) = results.peek() {
                if results.len() >= breadth && current.distance > furthest.distance {
                    break;
                }
            }

            let links = self.nodes[current.node as usize]
                .links
                .get(layer)
                .map_or(&[][..], Vec::as_slice);
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance(query, query_norm, neighbor),
                    node: neighbor,
                };
                let admit = results.len() < breadth
                    || results.peek().is_some_and(|furthest| candidate < *furthest);
                if admit {
                    frontier.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > breadth {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Adds a back link `node -> new_node` on `layer`, pruning to the layer capacity.
    fn connect(&mut self, node: u32, new_node: u32, layer: usize) {
        let capacity = self.config.layer_capacity(layer);
        let current = &self.nodes[node as usize].links[layer];

        let mut updated = current.clone();
        updated.push(new_node);
        if updated.len() > capacity {
            let base = &self.nodes[node as usize];
            let mut ranked: Vec<Candidate> = updated
                .iter()
                .map(|&other| Candidate {
                    distance: self.distance(&base.vector, base.norm, other),
                    node: other,
                })
                .collect();
            ranked.sort_unstable();
            updated = ranked
                .into_iter()
                .take(capacity)
                .map(|c| c.node)
                .collect();
        }

        let slot = &mut self.nodes[node as usize].links[layer];
        let previous = std::mem::replace(slot, updated);
        if let Some(journal) = self.journal.as_mut() {
            journal.links.push((node, layer, previous));
        }
    }

    /// Deterministic level for `id`: an exponential draw seeded by a splitmix64 hash.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn level_for(&self, id: u64) -> usize {
        let mut x = id.wrapping_add(0x9E37_79B9_7F4A_7C15);
        x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^= x >> 31;

        // uniform in (0, 1]
        let uniform = ((x >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let level = (-uniform.ln() * self.config.level_multiplier()).floor() as usize;
        level.min(MAX_LEVEL)
    }
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("len", &self.nodes.len())
            .field("max_level", &self.max_level)
            .field("staging", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}
