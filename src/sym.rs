//! Symbol stacks: a chained hash table combined with a LIFO scope spine.
//!
//! Symbols are pushed at the head of their hash bucket, so an inner
//! declaration shadows an outer one, and popping a scope restores the
//! previous bucket head. The arena itself is the scope spine: a marker is
//! just its length, and a bulk pop truncates back to the marker.

use crate::gen::Storage;
use crate::types::CType;

pub const SYM_HASH_SIZE: usize = 8192;

#[derive(Debug)]
pub struct Sym {
    pub name: String,
    pub t: CType,
    pub st: Storage,
    pub c: i64,
    pub sec: Option<usize>,
    prev_tok: Option<usize>,
    bucket: usize,
}

pub struct SymStack {
    buckets: Vec<Option<usize>>,
    syms: Vec<Sym>,
}

impl SymStack {
    pub fn new() -> Self {
        Self {
            buckets: vec![None; SYM_HASH_SIZE],
            syms: Vec::new(),
        }
    }

    fn hash(name: &str) -> usize {
        let h = name
            .bytes()
            .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
        h as usize & (SYM_HASH_SIZE - 1)
    }

    /// Scope marker for a later `pop_to`.
    pub fn mark(&self) -> usize {
        self.syms.len()
    }

    /// Insert a symbol at its bucket head, shadowing earlier entries.
    pub fn push(&mut self, name: String, t: CType, st: Storage, c: i64) -> usize {
        let bucket = Self::hash(&name);
        let idx = self.syms.len();
        let prev_tok = self.buckets[bucket];
        self.buckets[bucket] = Some(idx);
        self.syms.push(Sym {
            name,
            t,
            st,
            c,
            sec: None,
            prev_tok,
            bucket,
        });
        idx
    }

    /// Pop every symbol pushed after `mark`, restoring shadowed entries.
    pub fn pop_to(&mut self, mark: usize) {
        while self.syms.len() > mark {
            let Some(sym) = self.syms.pop() else { break };
            self.buckets[sym.bucket] = sym.prev_tok;
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        let mut next = self.buckets[Self::hash(name)];
        while let Some(i) = next {
            if self.syms[i].name == name {
                return Some(i);
            }
            next = self.syms[i].prev_tok;
        }
        None
    }

    pub fn get(&self, idx: usize) -> &Sym {
        &self.syms[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Sym {
        &mut self.syms[idx]
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

impl Default for SymStack {
    fn default() -> Self {
        Self::new()
    }
}
