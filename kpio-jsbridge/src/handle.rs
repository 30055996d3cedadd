//! Host handles to engine values.
//!
//! A [`Handle`] is a plain token; the value it names lives in its context's
//! [`HandleTable`] on the engine thread until the host releases it. Slots
//! are generation-tagged, so a released handle (or a second release) is
//! rejected instead of reaching whatever value reused the slot.

use kpio_jsvm::Value;

use crate::error::{BridgeError, Result};

/// Opaque reference to a value held for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    context: u32,
    index: u32,
    generation: u32,
}

impl Handle {
    /// Id of the context that owns the handle.
    pub fn context_id(&self) -> u32 {
        self.context
    }
}

struct Slot {
    generation: u32,
    value: Option<Value>,
}

/// Generation-tagged arena of held values.
pub(crate) struct HandleTable {
    context: u32,
    /// Slot storage.
    slots: Vec<Slot>,
    /// Free list.
    free_list: Vec<u32>,
}

impl HandleTable {
    pub fn new(context: u32) -> Self {
        HandleTable {
            context,
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Hold `value` and return its handle.
    pub fn insert(&mut self, value: Value) -> Handle {
        let index = match self.free_list.pop() {
            Some(index) => {
                self.slots[index as usize].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };
        Handle {
            context: self.context,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn slot(&self, handle: Handle) -> Result<&Slot> {
        if handle.context != self.context {
            return Err(BridgeError::ForeignHandle {
                handle: handle.context,
                context: self.context,
            });
        }
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => Ok(slot),
            _ => Err(BridgeError::Released),
        }
    }

    /// The value `handle` refers to.
    pub fn get(&self, handle: Handle) -> Result<Value> {
        self.slot(handle)?
            .value
            .clone()
            .ok_or(BridgeError::Released)
    }

    /// Point `handle` at a different value.
    pub fn rebind(&mut self, handle: Handle, value: Value) -> Result<()> {
        self.slot(handle)?;
        self.slots[handle.index as usize].value = Some(value);
        Ok(())
    }

    /// Drop the value behind `handle`; the handle becomes stale.
    pub fn remove(&mut self, handle: Handle) -> Result<Value> {
        self.slot(handle)?;
        let slot = &mut self.slots[handle.index as usize];
        let value = slot.value.take().ok_or(BridgeError::Released)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Ok(value)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Release every handle. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_handles_are_stale() {
        let mut table = HandleTable::new(1);
        let a = table.insert(Value::number(1.0));
        assert_eq!(table.remove(a).unwrap().to_number(), 1.0);
        assert!(matches!(table.get(a), Err(BridgeError::Released)));
        assert!(matches!(table.remove(a), Err(BridgeError::Released)));
    }

    #[test]
    fn reused_slot_does_not_revive_old_handle() {
        let mut table = HandleTable::new(1);
        let a = table.insert(Value::string("a"));
        table.remove(a).unwrap();
        let b = table.insert(Value::string("b"));
        assert_ne!(a, b);
        assert!(table.get(a).is_err());
        assert_eq!(table.get(b).unwrap().to_display_string(), "b");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut one = HandleTable::new(1);
        let two = HandleTable::new(2);
        let h = one.insert(Value::null());
        assert!(matches!(
            two.get(h),
            Err(BridgeError::ForeignHandle { handle: 1, context: 2 })
        ));
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut table = HandleTable::new(7);
        let handles: Vec<Handle> = (0..4).map(|i| table.insert(Value::number(i as f64))).collect();
        table.clear();
        assert_eq!(table.len(), 0);
        for h in handles {
            assert!(table.get(h).is_err());
        }
    }

    #[test]
    fn rebind_keeps_the_handle_valid() {
        let mut table = HandleTable::new(1);
        let h = table.insert(Value::number(1.0));
        table.rebind(h, Value::number(2.0)).unwrap();
        assert_eq!(table.get(h).unwrap().to_number(), 2.0);
    }
}
