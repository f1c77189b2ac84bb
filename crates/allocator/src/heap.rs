// Copyright (c) 2025 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions.
// For more details, see the LICENSE, LICENSE.additional, and CONTRIBUTING files.

use mule_isa::ARENA_SIZE_IN_WORDS;

use crate::{HeapError, HeapErrorType};

/// A heap block record. The block's words live in the arena; the
/// record only describes them.
///
/// `owner` is the module-table index of the allocating module, or 0
/// for a free block. Allocation state is encoded entirely by `owner`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Block {
    address: usize,
    size: usize,
    owner: u8,
}

/// First-fit heap allocator for the top end of the arena.
///
/// The heap grows downward: the lower bound `H` starts at the arena
/// top and is lowered whenever no free block satisfies a request.
/// Block records are kept sorted by strictly decreasing address, so
/// the record list reads top-of-arena first. A size-0 free sentinel
/// pinned at the arena top keeps the list edge cases trivial.
///
/// Free neighbors are coalesced eagerly, so the list never contains
/// two physically adjacent free blocks (the sentinel aside), and a
/// free block touching the lower bound is given back to the stack
/// region by raising `H`.
pub struct Heap {
    blocks: Vec<Block>,
    lower_bound: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            blocks: vec![Block {
                address: ARENA_SIZE_IN_WORDS,
                size: 0,
                owner: 0,
            }],
            lower_bound: ARENA_SIZE_IN_WORDS,
        }
    }

    /// The lowest arena address in use by the heap (`H`).
    #[inline]
    pub fn lower_bound(&self) -> usize {
        self.lower_bound
    }

    /// Allocates `words` words for `owner` and returns the block
    /// address. `stack_top` is the current `S`; the heap refuses to
    /// grow into the procedure stack.
    pub fn allocate(
        &mut self,
        owner: u8,
        words: usize,
        stack_top: usize,
    ) -> Result<usize, HeapError> {
        let words = if words == 0 { 1 } else { words };

        // first fit, walking from the arena top downward.
        // index 0 is the size-0 sentinel and never matches.
        let found = self
            .blocks
            .iter()
            .position(|block| block.owner == 0 && block.size >= words);

        if let Some(index) = found {
            let block = self.blocks[index];
            if block.size > words {
                // split: the request is carved from the low end, the
                // free remainder keeps the high end and stays in place.
                let remainder = Block {
                    address: block.address + words,
                    size: block.size - words,
                    owner: 0,
                };
                self.blocks[index] = remainder;
                self.blocks.insert(
                    index + 1,
                    Block {
                        address: block.address,
                        size: words,
                        owner,
                    },
                );
                Ok(block.address)
            } else {
                self.blocks[index].owner = owner;
                Ok(block.address)
            }
        } else {
            // no fit: extend the heap downward
            if self.lower_bound < words || self.lower_bound - words <= stack_top {
                return Err(HeapError::new(HeapErrorType::Overflow { requested: words }));
            }
            self.lower_bound -= words;
            self.blocks.push(Block {
                address: self.lower_bound,
                size: words,
                owner,
            });
            Ok(self.lower_bound)
        }
    }

    /// Frees the block starting at `address`, coalescing with free
    /// neighbors and giving boundary space back to the stack region.
    pub fn free(&mut self, address: usize) -> Result<(), HeapError> {
        let index = self
            .blocks
            .iter()
            .position(|block| block.address == address)
            .ok_or(HeapError::new(HeapErrorType::UnknownBlock { address }))?;

        if self.blocks[index].owner == 0 {
            return Err(HeapError::new(HeapErrorType::BlockAlreadyFree { address }));
        }

        self.blocks[index].owner = 0;
        self.coalesce_and_trim(index);
        Ok(())
    }

    /// Frees every block owned by `owner` with `address <= limit`.
    /// Used to release a module's blocks in bulk at unload time.
    pub fn free_all(&mut self, owner: u8, limit: usize) {
        loop {
            let found = self
                .blocks
                .iter()
                .position(|block| block.owner == owner && block.owner != 0 && block.address <= limit);
            match found {
                Some(index) => {
                    self.blocks[index].owner = 0;
                    self.coalesce_and_trim(index);
                }
                None => break,
            }
        }
    }

    // merges the free block at `index` with physically adjacent free
    // neighbors, then releases it to the stack region if it ends up
    // at the heap boundary. the sentinel (list head) never merges.
    fn coalesce_and_trim(&mut self, index: usize) {
        let mut index = index;

        // neighbor above (higher address, earlier in the list)
        if index > 1 {
            let above = self.blocks[index - 1];
            let this = self.blocks[index];
            if above.owner == 0 && this.address + this.size == above.address {
                self.blocks[index - 1] = Block {
                    address: this.address,
                    size: this.size + above.size,
                    owner: 0,
                };
                self.blocks.remove(index);
                index -= 1;
            }
        }

        // neighbor below (lower address, later in the list)
        if index + 1 < self.blocks.len() {
            let below = self.blocks[index + 1];
            let this = self.blocks[index];
            if below.owner == 0 && below.address + below.size == this.address {
                self.blocks[index] = Block {
                    address: below.address,
                    size: below.size + this.size,
                    owner: 0,
                };
                self.blocks.remove(index + 1);
            }
        }

        // a free block at the boundary shrinks the heap
        if index == self.blocks.len() - 1 && index > 0 && self.blocks[index].address == self.lower_bound
        {
            self.lower_bound += self.blocks[index].size;
            self.blocks.remove(index);
        }
    }

    /// Checks the structural invariants. Meant for tests and debug
    /// assertions; a violation is a bug in the allocator, never in
    /// guest code.
    pub fn check_invariants(&self) -> bool {
        // sentinel pinned at the top
        let sentinel_ok = self.blocks[0]
            == Block {
                address: ARENA_SIZE_IN_WORDS,
                size: 0,
                owner: 0,
            };

        // strictly decreasing addresses
        let ordered = self
            .blocks
            .windows(2)
            .all(|pair| pair[0].address > pair[1].address);

        // no two physically adjacent free blocks below the sentinel
        let coalesced = self.blocks[1..].windows(2).all(|pair| {
            !(pair[0].owner == 0
                && pair[1].owner == 0
                && pair[1].address + pair[1].size == pair[0].address)
        });

        // H is the lowest address in use
        let bound_ok = match self.blocks.last() {
            Some(block) if self.blocks.len() > 1 => block.address == self.lower_bound,
            _ => self.lower_bound == ARENA_SIZE_IN_WORDS,
        };

        sentinel_ok && ordered && coalesced && bound_ok
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
