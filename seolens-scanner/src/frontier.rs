// Frontier and dedup store for a single crawl job.
//
// Not synchronized on its own: the crawler keeps it behind one mutex together with
// the job counters, so dedup and budget checks happen under a single lock.

use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierItem {
    pub url: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    Duplicate,
    TooDeep,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    /// Dispatch this item; the caller must later call `complete`.
    Ready(FrontierItem),
    /// Nothing can be dispatched right now but work is still in flight.
    Wait,
    /// Queue drained (or closed, or budget spent) and nothing in flight.
    Done,
}

#[derive(Debug)]
pub struct Frontier {
    max_depth: usize,
    max_pages: usize,
    levels: BTreeMap<usize, VecDeque<String>>,
    seen: HashSet<String>,
    in_flight: BTreeMap<usize, usize>,
    dispatched: usize,
    closed: bool,
    paused: bool,
}

impl Frontier {
    pub fn new(max_depth: usize, max_pages: usize) -> Self {
        Self {
            max_depth,
            max_pages,
            levels: BTreeMap::new(),
            seen: HashSet::new(),
            in_flight: BTreeMap::new(),
            dispatched: 0,
            closed: false,
            paused: false,
        }
    }

    /// Queue a normalized URL unless it was already queued or fetched for this job.
    pub fn push(&mut self, url: String, depth: usize) -> Enqueue {
        if self.closed {
            return Enqueue::Closed;
        }
        if depth > self.max_depth {
            return Enqueue::TooDeep;
        }
        if !self.seen.insert(url.clone()) {
            return Enqueue::Duplicate;
        }
        self.levels.entry(depth).or_default().push_back(url);
        Enqueue::Queued
    }

    /// Next URL in breadth-first order.
    ///
    /// A URL at depth `d` is only released once no page at depth `d - 2` or shallower is
    /// still in flight, so every depth `d - 1` URL has been discovered before depth `d`
    /// starts draining.
    pub fn pop(&mut self) -> Pop {
        let in_flight = self.in_flight_count();

        if self.closed || self.dispatched >= self.max_pages {
            return if in_flight == 0 { Pop::Done } else { Pop::Wait };
        }
        if self.paused {
            return Pop::Wait;
        }

        let Some((&depth, _)) = self.levels.iter().find(|(_, queue)| !queue.is_empty()) else {
            return if in_flight == 0 { Pop::Done } else { Pop::Wait };
        };

        let shallowest_in_flight = self.in_flight.keys().next().copied();
        if let Some(shallowest) = shallowest_in_flight
            && shallowest + 1 < depth
        {
            return Pop::Wait;
        }

        let Some(url) = self.levels.get_mut(&depth).and_then(|q| q.pop_front()) else {
            return Pop::Wait;
        };
        self.dispatched += 1;
        *self.in_flight.entry(depth).or_insert(0) += 1;
        Pop::Ready(FrontierItem { url, depth })
    }

    /// Mark a dispatched item as finished.
    pub fn complete(&mut self, depth: usize) {
        if let Some(count) = self.in_flight.get_mut(&depth) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&depth);
            }
        }
    }

    /// Finish a dispatched item without charging it to the page budget (robots skips).
    pub fn skip(&mut self, depth: usize) {
        self.complete(depth);
        self.dispatched = self.dispatched.saturating_sub(1);
    }

    /// Stop handing out work. Queued URLs are discarded, in-flight work may drain.
    pub fn close(&mut self) {
        self.closed = true;
        self.levels.clear();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn queued(&self) -> usize {
        self.levels.values().map(VecDeque::len).sum()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.values().sum()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn budget_left(&self) -> usize {
        self.max_pages.saturating_sub(self.dispatched)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(pop: Pop) -> FrontierItem {
        match pop {
            Pop::Ready(item) => item,
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_push_dedups() {
        let mut frontier = Frontier::new(3, 10);
        assert_eq!(frontier.push("https://a.com/".into(), 0), Enqueue::Queued);
        assert_eq!(frontier.push("https://a.com/".into(), 1), Enqueue::Duplicate);
        assert_eq!(frontier.queued(), 1);
    }

    #[test]
    fn test_push_respects_max_depth() {
        let mut frontier = Frontier::new(1, 10);
        assert_eq!(frontier.push("https://a.com/x".into(), 2), Enqueue::TooDeep);
        assert!(!frontier.contains("https://a.com/x"));
    }

    #[test]
    fn test_pop_prefers_shallow_depth() {
        let mut frontier = Frontier::new(5, 10);
        frontier.push("https://a.com/deep".into(), 2);
        frontier.push("https://a.com/".into(), 0);
        assert_eq!(ready(frontier.pop()).depth, 0);
    }

    #[test]
    fn test_pop_waits_for_shallower_in_flight() {
        let mut frontier = Frontier::new(5, 10);
        frontier.push("https://a.com/".into(), 0);
        let root = ready(frontier.pop());

        frontier.push("https://a.com/b".into(), 1);
        frontier.push("https://a.com/c".into(), 2);

        // depth 1 may start while the root is in flight, depth 2 may not
        let b = ready(frontier.pop());
        assert_eq!(b.depth, 1);
        assert_eq!(frontier.pop(), Pop::Wait);

        frontier.complete(root.depth);
        assert_eq!(ready(frontier.pop()).depth, 2);
    }

    #[test]
    fn test_budget_stops_dispatch() {
        let mut frontier = Frontier::new(5, 2);
        for i in 0..5 {
            frontier.push(format!("https://a.com/{}", i), 1);
        }
        let a = ready(frontier.pop());
        let b = ready(frontier.pop());
        assert_eq!(frontier.pop(), Pop::Wait);
        frontier.complete(a.depth);
        frontier.complete(b.depth);
        assert_eq!(frontier.pop(), Pop::Done);
        assert_eq!(frontier.dispatched(), 2);
    }

    #[test]
    fn test_skip_refunds_budget() {
        let mut frontier = Frontier::new(5, 1);
        frontier.push("https://a.com/private".into(), 0);
        frontier.push("https://a.com/public".into(), 0);
        let first = ready(frontier.pop());
        frontier.skip(first.depth);
        let second = ready(frontier.pop());
        assert_eq!(second.url, "https://a.com/public");
    }

    #[test]
    fn test_close_discards_queue_but_lets_in_flight_drain() {
        let mut frontier = Frontier::new(5, 10);
        frontier.push("https://a.com/".into(), 0);
        frontier.push("https://a.com/x".into(), 0);
        let item = ready(frontier.pop());

        frontier.close();
        assert_eq!(frontier.pop(), Pop::Wait);
        assert_eq!(frontier.push("https://a.com/y".into(), 1), Enqueue::Closed);

        frontier.complete(item.depth);
        assert_eq!(frontier.pop(), Pop::Done);
    }

    #[test]
    fn test_paused_frontier_waits() {
        let mut frontier = Frontier::new(5, 10);
        frontier.push("https://a.com/".into(), 0);
        frontier.set_paused(true);
        assert_eq!(frontier.pop(), Pop::Wait);
        frontier.set_paused(false);
        assert!(matches!(frontier.pop(), Pop::Ready(_)));
    }
}
