//! Object arena with mark-and-sweep garbage collection.
//!
//! Objects live in slots addressed by [`Handle`]. A handle carries the
//! generation of the slot it was issued for, so a handle that outlived
//! its object no longer resolves once the slot is reused.
use std::fmt;

use crate::{
    constants::GC_GROW_FACTOR,
    error::{EmberError, EmberResult},
    object::{Object, Upvalue},
    value::Value,
    vm::{CallFrame, VmConf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Entry {
    object: Object,
    marked: bool,
    size: usize,
}

/// Statistics about collector activity.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    pub collections: u64,
    pub objects_freed: u64,
    pub bytes_freed: u64,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    gray: Vec<Handle>,
    bytes_allocated: usize,
    next_gc: usize,
    gc_threshold: usize,
    /// Collection is suspended while greater than zero.
    no_gc: usize,
    gc_stress: bool,
    gc_debug: bool,
    function_cache: bool,
    stack_size: usize,
    frame_count: usize,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: Box<[Option<Value>]>,
    /// Upvalues still pointing into the stack.
    pub(crate) open_upvalues: Vec<Handle>,
    stats: GcStats,
}

impl Heap {
    pub fn new(conf: &VmConf) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: conf.gc_threshold,
            gc_threshold: conf.gc_threshold,
            no_gc: 0,
            gc_stress: conf.gc_stress,
            gc_debug: conf.gc_debug,
            function_cache: conf.function_cache,
            stack_size: conf.stack_size,
            frame_count: conf.frame_count,
            stack: Vec::with_capacity(conf.stack_size.min(1024)),
            frames: Vec::with_capacity(conf.frame_count.min(64)),
            globals: vec![None; conf.global_count].into_boxed_slice(),
            open_upvalues: Vec::new(),
            stats: GcStats::default(),
        }
    }

    /// Move an object into the heap.
    ///
    /// May collect garbage first. Values the object refers to are kept
    /// alive by that collection even though the object is not reachable yet.
    pub fn alloc(&mut self, object: Object) -> Handle {
        let size = object.estimate_size();

        if self.no_gc == 0 && (self.gc_stress || self.bytes_allocated + size > self.next_gc) {
            let mut pending = Vec::new();
            object.trace(self.function_cache, &mut pending);
            self.collect_with(&pending);
        }

        self.bytes_allocated += size;
        let entry = Entry {
            object,
            marked: false,
            size,
        };

        // Try to reuse a free slot
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            Handle {
                index,
                generation: 0,
            }
        }
    }

    #[inline]
    pub fn get(&self, handle: Handle) -> Option<&Object> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| &entry.object)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
            .map(|entry| &mut entry.object)
    }

    /// Whether the handle still refers to a live object.
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn function_cache(&self) -> bool {
        self.function_cache
    }

    /// Suspend collection until a matching [`Heap::resume_gc`].
    pub fn pause_gc(&mut self) {
        self.no_gc += 1;
    }

    pub fn resume_gc(&mut self) {
        self.no_gc = self.no_gc.saturating_sub(1);
    }

    // ------------------------------------------------------------------------
    // Stacks

    #[inline]
    pub fn push(&mut self, value: Value) -> EmberResult<()> {
        if self.stack.len() >= self.stack_size {
            return Err(EmberError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn push_frame(&mut self, frame: CallFrame) -> EmberResult<()> {
        if self.frames.len() >= self.frame_count {
            return Err(EmberError::FrameOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn global(&self, slot: usize) -> Option<Value> {
        self.globals.get(slot).copied().flatten()
    }

    pub fn set_global(&mut self, slot: usize, value: Value) -> EmberResult<()> {
        match self.globals.get_mut(slot) {
            Some(global) => {
                *global = Some(value);
                Ok(())
            }
            None => Err(EmberError::GlobalOverflow),
        }
    }

    /// Values on the stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn open_upvalues(&self) -> &[Handle] {
        &self.open_upvalues
    }

    /// Clear the execution state, keeping globals and objects.
    pub fn reset_stacks(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    /// Drop every object and global.
    pub fn reset(&mut self) {
        self.reset_stacks();
        self.globals.iter_mut().for_each(|g| *g = None);
        // Slots survive with bumped generations so old handles stay stale.
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
        self.gray.clear();
        self.bytes_allocated = 0;
        self.next_gc = self.gc_threshold;
        self.no_gc = 0;
    }

    // ------------------------------------------------------------------------
    // Collection

    pub fn collect(&mut self) {
        self.collect_with(&[]);
    }

    /// Collect garbage, treating the given handles as extra roots.
    pub fn collect_with(&mut self, extra_roots: &[Handle]) {
        let before = self.bytes_allocated;
        let live_before = self.live_objects();
        if self.gc_debug {
            log::debug!("-- gc begin, {before} bytes in {live_before} objects");
        }

        self.mark_roots(extra_roots);
        self.trace_references();
        let freed = self.sweep();

        self.next_gc = self.bytes_allocated.max(self.next_gc) * GC_GROW_FACTOR;
        self.stats.collections += 1;

        if self.gc_debug {
            log::debug!(
                "-- gc end, freed {freed} objects, {} bytes (from {before} to {}) next at {}",
                before - self.bytes_allocated,
                self.bytes_allocated,
                self.next_gc
            );
        } else {
            log::trace!("gc freed {freed} objects");
        }
    }

    fn mark_roots(&mut self, extra_roots: &[Handle]) {
        let mut roots: Vec<Handle> = Vec::new();

        roots.extend(self.stack.iter().filter_map(Value::as_object));
        roots.extend(self.frames.iter().flat_map(|f| [f.closure, f.function_object]));
        roots.extend(self.globals.iter().flatten().filter_map(Value::as_object));
        roots.extend(self.open_upvalues.iter().copied());
        roots.extend(extra_roots.iter().copied());

        // Memoized results stay alive as long as caching is enabled.
        if self.function_cache {
            for slot in &self.slots {
                if let Some(Entry {
                    object: Object::Function(f),
                    ..
                }) = &slot.entry
                {
                    roots.extend(f.cache.values().flatten().filter_map(Value::as_object));
                }
            }
        }

        for handle in roots {
            self.mark_object(handle);
        }
    }

    fn mark_object(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation != handle.generation {
                return;
            }
            if let Some(entry) = slot.entry.as_mut() {
                if !entry.marked {
                    entry.marked = true;
                    self.gray.push(handle);
                }
            }
        }
    }

    fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(handle) = self.gray.pop() {
            self.blacken(handle, &mut children);
        }
    }

    fn blacken(&mut self, handle: Handle, children: &mut Vec<Handle>) {
        children.clear();
        if let Some(object) = self.get(handle) {
            object.trace(self.function_cache, children);
        }
        for child in children.drain(..) {
            self.mark_object(child);
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if entry.marked {
                entry.marked = false;
            } else {
                self.bytes_allocated -= entry.size;
                self.stats.bytes_freed += entry.size as u64;
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }

        self.stats.objects_freed += freed as u64;
        freed
    }

    // ------------------------------------------------------------------------
    // Upvalues

    /// Find or create the open upvalue for a stack slot.
    pub fn capture_upvalue(&mut self, slot: usize) -> Handle {
        let existing = self.open_upvalues.iter().copied().find(|h| {
            matches!(self.get(*h), Some(Object::Upvalue(Upvalue::Open(s))) if *s == slot)
        });
        if let Some(handle) = existing {
            return handle;
        }
        let handle = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.push(handle);
        handle
    }

    /// Close every open upvalue pointing at or above the given slot.
    pub fn close_upvalues(&mut self, from_slot: usize) {
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let handle = self.open_upvalues[index];
            let slot = match self.get(handle) {
                Some(Object::Upvalue(Upvalue::Open(slot))) => Some(*slot),
                _ => None,
            };
            match slot {
                Some(slot) if slot >= from_slot => {
                    let value = self.stack.get(slot).copied().unwrap_or(Value::Null);
                    if let Some(Object::Upvalue(upvalue)) = self.get_mut(handle) {
                        *upvalue = Upvalue::Closed(value);
                    }
                    self.open_upvalues.swap_remove(index);
                }
                Some(_) => index += 1,
                None => {
                    self.open_upvalues.swap_remove(index);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn heap() -> Heap {
        Heap::new(&VmConf::default())
    }

    #[test]
    fn test_unreachable_objects_are_swept() {
        let mut heap = heap();
        let kept = heap.alloc(Object::Str("kept".into()));
        let dropped = heap.alloc(Object::Str("dropped".into()));
        heap.push(Value::Object(kept)).unwrap();

        heap.collect();

        assert!(heap.contains(kept));
        assert!(!heap.contains(dropped));
        assert_eq!(heap.live_objects(), 1);
        assert_eq!(heap.stats().collections, 1);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut heap = heap();
        let old = heap.alloc(Object::Str("old".into()));
        heap.collect();
        let new = heap.alloc(Object::Str("new".into()));

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(heap.get(old).is_none());
        assert!(matches!(heap.get(new), Some(Object::Str(s)) if s == "new"));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = heap();
        let a = heap.alloc(Object::Array(vec![]));
        let b = heap.alloc(Object::Array(vec![Value::Object(a)]));
        if let Some(Object::Array(items)) = heap.get_mut(a) {
            items.push(Value::Object(b));
        }

        heap.push(Value::Object(a)).unwrap();
        heap.collect();
        assert!(heap.contains(a) && heap.contains(b));

        heap.stack.clear();
        heap.collect();
        assert!(!heap.contains(a) && !heap.contains(b));
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn test_pending_children_survive_stress_collection() {
        let conf = VmConf {
            gc_stress: true,
            ..VmConf::default()
        };
        let mut heap = Heap::new(&conf);
        let s = heap.alloc(Object::Str("child".into()));
        // Not rooted anywhere except by the array being allocated.
        let array = heap.alloc(Object::Array(vec![Value::Object(s)]));

        assert!(heap.contains(s));
        assert!(heap.contains(array));
    }

    #[test]
    fn test_threshold_grows() {
        let conf = VmConf {
            gc_threshold: 64,
            ..VmConf::default()
        };
        let mut heap = Heap::new(&conf);
        heap.collect();
        assert_eq!(heap.next_gc(), 64 * GC_GROW_FACTOR);
    }

    #[test]
    fn test_globals_capacity() {
        let conf = VmConf {
            global_count: 2,
            ..VmConf::default()
        };
        let mut heap = Heap::new(&conf);
        heap.set_global(1, Value::I64(1)).unwrap();
        assert!(matches!(
            heap.set_global(2, Value::I64(2)),
            Err(EmberError::GlobalOverflow)
        ));
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut heap = heap();
        let old = heap.alloc(Object::Str("old".into()));
        heap.reset();
        let new = heap.alloc(Object::Str("new".into()));

        assert_eq!(new.index(), old.index());
        assert!(!heap.contains(old));
        assert!(heap.contains(new));
    }

    #[test]
    fn test_close_upvalues_above_slot() {
        let mut heap = heap();
        heap.push(Value::I64(1)).unwrap();
        heap.push(Value::I64(2)).unwrap();
        let low = heap.capture_upvalue(0);
        let high = heap.capture_upvalue(1);
        assert_eq!(heap.capture_upvalue(1), high);

        heap.stack[1] = Value::I64(5);
        heap.close_upvalues(1);

        assert_eq!(heap.open_upvalues(), &[low]);
        assert!(matches!(
            heap.get(high),
            Some(Object::Upvalue(Upvalue::Closed(Value::I64(5))))
        ));
    }
}
