//! # Prefix Tree Module
//!
//! Longest-prefix matcher used to identify symbolic operator tokens.
//! Words that share a prefix share a path, so `/` and `//` coexist and a
//! query against `"//x"` resolves to the longer one. Lookups walk the tree
//! byte by byte and allocate nothing.

// -----------------------------------------------------------------------------
// PREFIX TREE
// -----------------------------------------------------------------------------

/// One node per byte of every inserted word; `nodes[0]` is the root.
struct Node<T> {
    /// Payload of the word ending at this node, if any.
    payload: Option<T>,
    /// Child edges as (byte, node index) pairs.
    children: Vec<(u8, usize)>,
}

/// A set of (word, payload) pairs supporting longest-prefix queries.
pub struct PrefixTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> PrefixTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                payload: None,
                children: Vec::new(),
            }],
        }
    }

    /// Inserts `word` with `payload`, replacing any existing payload.
    /// Empty words are ignored.
    pub fn insert(&mut self, word: &str, payload: T) {
        if word.is_empty() {
            return;
        }

        let mut at = 0;
        for &byte in word.as_bytes() {
            at = match self.nodes[at].children.iter().find(|(b, _)| *b == byte) {
                Some(&(_, next)) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node {
                        payload: None,
                        children: Vec::new(),
                    });
                    self.nodes[at].children.push((byte, next));
                    next
                }
            };
        }
        self.nodes[at].payload = Some(payload);
    }

    /// Finds the longest prefix of `input` present in the tree.
    ///
    /// Returns the payload of that word and its byte length. Allocates
    /// nothing.
    pub fn longest_match(&self, input: &str) -> Option<(&T, usize)> {
        let mut at = 0;
        let mut found = None;

        for (i, &byte) in input.as_bytes().iter().enumerate() {
            match self.nodes[at].children.iter().find(|(b, _)| *b == byte) {
                Some(&(_, next)) => at = next,
                None => break,
            }
            if let Some(payload) = &self.nodes[at].payload {
                found = Some((payload, i + 1));
            }
        }
        found
    }
}

impl<T> Default for PrefixTree<T> {
    fn default() -> Self {
        Self::new()
    }
}
