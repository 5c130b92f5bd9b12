//! In-memory link graph for one site.
//!
//! Pages are nodes keyed by normalized URL; links are edges between node
//! indices, so cycles never create ownership loops.

use crate::model::{LinkRecord, PageRecord};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeKind {
    pub internal: bool,
    pub nofollow: bool,
}

#[derive(Debug, Default)]
pub struct LinkGraph {
    graph: DiGraph<String, EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
    crawled: HashSet<NodeIndex>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from persisted pages and their outbound links.
    pub fn from_records(pages: &[PageRecord], links: &[LinkRecord]) -> Self {
        let mut graph = Self::new();
        let mut by_id = HashMap::with_capacity(pages.len());
        for page in pages {
            graph.mark_crawled(&page.url);
            by_id.insert(page.id, page.url.as_str());
        }
        for link in links {
            let Some(source) = by_id.get(&link.source_page_id) else {
                continue;
            };
            graph.add_link(source, &link.target_url, link.is_internal, link.is_nofollow);
        }
        graph
    }

    fn insert_or_get_node(&mut self, url: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(url) {
            return *idx;
        }
        let idx = self.graph.add_node(url.to_string());
        self.nodes.insert(url.to_string(), idx);
        idx
    }

    pub fn mark_crawled(&mut self, url: &str) {
        let idx = self.insert_or_get_node(url);
        self.crawled.insert(idx);
    }

    /// Add a directed edge. Self-links and repeated edges are ignored.
    pub fn add_link(&mut self, source: &str, target: &str, internal: bool, nofollow: bool) {
        if source == target {
            return;
        }
        let from = self.insert_or_get_node(source);
        let to = self.insert_or_get_node(target);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, EdgeKind { internal, nofollow });
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.nodes.contains_key(url)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of distinct pages with an internal link to `url`.
    pub fn inbound_count(&self, url: &str) -> usize {
        let Some(idx) = self.nodes.get(url) else {
            return 0;
        };
        self.graph
            .edges_directed(*idx, Direction::Incoming)
            .filter(|edge| edge.weight().internal)
            .count()
    }

    pub fn outbound_internal(&self, url: &str) -> Vec<&str> {
        let Some(idx) = self.nodes.get(url) else {
            return Vec::new();
        };
        let mut targets: Vec<&str> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .filter(|edge| edge.weight().internal)
            .map(|edge| self.graph[edge.target()].as_str())
            .collect();
        targets.sort_unstable();
        targets
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.nodes.get(source), self.nodes.get(target)) {
            (Some(from), Some(to)) => self.graph.find_edge(*from, *to).is_some(),
            _ => false,
        }
    }

    /// Crawled pages that no other crawled page links to. The root is never an orphan.
    pub fn orphans(&self, root_url: &str) -> Vec<String> {
        let mut orphans: Vec<String> = self
            .crawled
            .iter()
            .filter(|idx| self.graph[**idx] != root_url)
            .filter(|idx| {
                !self
                    .graph
                    .neighbors_directed(**idx, Direction::Incoming)
                    .any(|source| self.crawled.contains(&source))
            })
            .map(|idx| self.graph[*idx].clone())
            .collect();
        orphans.sort();
        orphans
    }
}
