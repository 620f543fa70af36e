//! Register allocation for the x86-64 emitter.
//!
//! A free-pool allocator over the general-purpose registers. `rsp` and
//! `rbp` anchor the frame and are never handed out; `rax` is reserved for
//! return values and `rdx` for the `idiv` setup. Caller-saved registers
//! are preferred and handed out before the callee-saved set. When the pool
//! runs dry the oldest live register is spilled to a fresh stack slot
//! below the frame and its temporary is reloaded later through the
//! recorded offset.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// General-purpose registers, excluding the frame anchors rsp/rbp.
pub const GENERAL_PURPOSE: [&str; 14] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

/// Registers the caller must save across a call.
pub const CALLER_SAVED: [&str; 9] = [
    "rax", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11",
];

/// Registers a callee must preserve.
pub const CALLEE_SAVED: [&str; 5] = ["rbx", "r12", "r13", "r14", "r15"];

/// Registers kept out of the pool: rax carries return values, rdx is
/// clobbered by the sign-extension in the division sequence.
const RESERVED: [&str; 2] = ["rax", "rdx"];

/// First spill slot, just below the fixed 64-byte local frame.
const SPILL_BASE: i64 = -72;

pub struct RegisterAllocator {
    available: VecDeque<&'static str>,
    /// Live registers in allocation order; the front is the spill victim.
    in_use: Vec<&'static str>,
    temp_bindings: FxHashMap<String, &'static str>,
    spill_offsets: FxHashMap<String, i64>,
    next_spill_offset: i64,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        let mut available = VecDeque::new();
        for reg in CALLER_SAVED {
            if !RESERVED.contains(&reg) {
                available.push_back(reg);
            }
        }
        for reg in CALLEE_SAVED {
            available.push_back(reg);
        }
        Self {
            available,
            in_use: Vec::new(),
            temp_bindings: FxHashMap::default(),
            spill_offsets: FxHashMap::default(),
            next_spill_offset: SPILL_BASE,
        }
    }

    /// Hand out a free register, spilling the oldest live one if the pool
    /// is empty.
    pub fn allocate(&mut self) -> &'static str {
        if let Some(reg) = self.available.pop_front() {
            self.in_use.push(reg);
            return reg;
        }
        // Evict the least recently allocated register and hand it to the
        // new owner.
        let victim = self.in_use.remove(0);
        self.spill(victim);
        self.in_use.push(victim);
        victim
    }

    /// Allocate a register bound to `temp`, reusing an existing binding.
    pub fn allocate_for(&mut self, temp: &str) -> &'static str {
        if let Some(&reg) = self.temp_bindings.get(temp) {
            return reg;
        }
        let reg = self.allocate();
        self.temp_bindings.insert(temp.to_string(), reg);
        reg
    }

    /// Return a register to the pool and drop any temp bound to it.
    pub fn free(&mut self, reg: &'static str) {
        if let Some(pos) = self.in_use.iter().position(|&r| r == reg) {
            self.in_use.remove(pos);
            self.available.push_back(reg);
            self.temp_bindings.retain(|_, &mut r| r != reg);
        }
    }

    /// Evict the temp held in `reg` to a fresh stack slot. The register
    /// stays live for its new owner.
    fn spill(&mut self, reg: &'static str) {
        let victim_temp = self
            .temp_bindings
            .iter()
            .find(|(_, &r)| r == reg)
            .map(|(t, _)| t.clone());
        if let Some(temp) = victim_temp {
            self.spill_offsets.insert(temp.clone(), self.next_spill_offset);
            self.next_spill_offset -= 8;
            self.temp_bindings.remove(&temp);
        }
    }

    /// Stack slot of a spilled temporary, for reloads.
    pub fn spill_slot(&self, temp: &str) -> Option<i64> {
        self.spill_offsets.get(temp).copied()
    }

    pub fn binding(&self, temp: &str) -> Option<&'static str> {
        self.temp_bindings.get(temp).copied()
    }

    pub fn has_available(&self) -> bool {
        !self.available.is_empty()
    }

    /// Forget all state; called at every function boundary.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_anchors_and_reserved_regs_never_allocated() {
        let mut regs = RegisterAllocator::new();
        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(regs.allocate());
        }
        for banned in ["rsp", "rbp", "rax", "rdx"] {
            assert!(!seen.contains(&banned));
        }
    }

    #[test]
    fn test_caller_saved_handed_out_first() {
        let mut regs = RegisterAllocator::new();
        let first = regs.allocate();
        assert!(CALLER_SAVED.contains(&first));
    }

    #[test]
    fn test_free_returns_register_to_pool() {
        let mut regs = RegisterAllocator::new();
        let reg = regs.allocate();
        regs.free(reg);
        // Exhausting the pool without spilling proves the register came back.
        for _ in 0..12 {
            regs.allocate();
        }
        assert!(!regs.has_available());
    }

    #[test]
    fn test_binding_is_reused() {
        let mut regs = RegisterAllocator::new();
        let a = regs.allocate_for("t0");
        let b = regs.allocate_for("t0");
        assert_eq!(a, b);
        assert_eq!(regs.binding("t0"), Some(a));
    }

    #[test]
    fn test_exhaustion_spills_oldest_binding() {
        let mut regs = RegisterAllocator::new();
        // 12 pool registers: bind them all, then one more forces a spill.
        for i in 0..12 {
            regs.allocate_for(&format!("t{i}"));
        }
        let reg = regs.allocate_for("t12");
        assert!(GENERAL_PURPOSE.contains(&reg));
        assert_eq!(regs.spill_slot("t0"), Some(-72));
        assert!(regs.binding("t0").is_none());
        // A second spill lands on the next slot down.
        regs.allocate_for("t13");
        assert_eq!(regs.spill_slot("t1"), Some(-80));
    }

    #[test]
    fn test_reset_restores_full_pool() {
        let mut regs = RegisterAllocator::new();
        for i in 0..13 {
            regs.allocate_for(&format!("t{i}"));
        }
        regs.reset();
        assert!(regs.has_available());
        assert!(regs.binding("t0").is_none());
        assert!(regs.spill_slot("t0").is_none());
    }
}
