//! Object attribute set.
//!
//! The ordered entry list is the only authoritative state. Class, key type
//! and the boolean bitmask are views recomputed from it after every
//! mutation, so the cached booleans can never diverge from the explicit
//! entries.

use bytes::Bytes;

use crate::abi::blob::{decode_records, encode_object, AttrRecord, RECORD_HEAD_SIZE};
use crate::abi::ids::{
    boolprop_shift, KeyType, ObjectClass, CKA_CLASS, CKA_KEY_TYPE, CK_FALSE, CK_TRUE,
    UNDEFINED_ID,
};
use crate::error::{P11Error, Result};

/// One attribute entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: u32,
    pub value: Vec<u8>,
}

/// Boolean property bitmask, two 32-bit words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoolProps {
    lo: u32,
    hi: u32,
}

impl BoolProps {
    pub fn get(self, shift: u32) -> bool {
        match shift {
            0..=31 => self.lo & (1 << shift) != 0,
            32..=63 => self.hi & (1 << (shift - 32)) != 0,
            _ => false,
        }
    }

    fn set(&mut self, shift: u32) {
        match shift {
            0..=31 => self.lo |= 1 << shift,
            32..=63 => self.hi |= 1 << (shift - 32),
            _ => {}
        }
    }

    pub fn lo(self) -> u32 {
        self.lo
    }

    pub fn hi(self) -> u32 {
        self.hi
    }
}

/// Ordered attribute list with derived class/type/boolean views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSet {
    entries: Vec<Attribute>,
    class: u32,
    key_type: u32,
    bools: BoolProps,
}

impl Default for AttributeSet {
    fn default() -> Self {
        Self::new()
    }
}

fn u32_value(value: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = value.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

impl AttributeSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            class: UNDEFINED_ID,
            key_type: UNDEFINED_ID,
            bools: BoolProps::default(),
        }
    }

    /// Decode an already canonical object (nested template, stored object).
    ///
    /// No policy validation happens here; untrusted input goes through the
    /// sanitizer instead.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut set = Self::new();
        for r in decode_records(buf)? {
            set.entries.push(Attribute {
                id: r.id,
                value: r.value.to_vec(),
            });
        }
        set.refresh();
        Ok(set)
    }

    /// Serialize into the object-head layout.
    pub fn to_bytes(&self) -> Result<Bytes> {
        encode_object(self.entries.iter().map(|a| AttrRecord {
            id: a.id,
            value: &a.value,
        }))
    }

    fn refresh(&mut self) {
        self.class = self.get(CKA_CLASS).and_then(u32_value).unwrap_or(UNDEFINED_ID);
        self.key_type = self
            .get(CKA_KEY_TYPE)
            .and_then(u32_value)
            .unwrap_or(UNDEFINED_ID);

        let mut bools = BoolProps::default();
        let mut seen = BoolProps::default();
        for a in &self.entries {
            if let Some(shift) = boolprop_shift(a.id) {
                if seen.get(shift) {
                    continue;
                }
                seen.set(shift);
                if a.value.first().is_some_and(|b| *b != CK_FALSE) {
                    bools.set(shift);
                }
            }
        }
        self.bools = bools;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Byte length of the encoded attribute region.
    pub fn attrs_size(&self) -> usize {
        self.entries
            .iter()
            .map(|a| RECORD_HEAD_SIZE + a.value.len())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    /// Raw class id, `UNDEFINED_ID` when absent.
    pub fn class_raw(&self) -> u32 {
        self.class
    }

    pub fn class(&self) -> Option<ObjectClass> {
        ObjectClass::from_u32(self.class)
    }

    /// Raw key type id, `UNDEFINED_ID` when absent.
    pub fn key_type_raw(&self) -> u32 {
        self.key_type
    }

    pub fn key_type(&self) -> Option<KeyType> {
        KeyType::from_u32(self.key_type)
    }

    pub fn bools(&self) -> BoolProps {
        self.bools
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|a| a.id == id)
    }

    /// First value stored under `id`.
    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.value.as_slice())
    }

    /// Every value stored under `id`, in order.
    pub fn get_all(&self, id: u32) -> impl Iterator<Item = &[u8]> {
        self.entries
            .iter()
            .filter(move |a| a.id == id)
            .map(|a| a.value.as_slice())
    }

    /// Copy a value into a caller buffer of exactly the value's size.
    pub fn copy_into(&self, id: u32, buf: &mut [u8]) -> Result<usize> {
        let value = self.get(id).ok_or(P11Error::NotFound(id))?;
        if buf.len() != value.len() {
            return Err(P11Error::BufferTooSmall {
                required: value.len(),
            });
        }
        buf.copy_from_slice(value);
        Ok(value.len())
    }

    pub fn get_u32(&self, id: u32) -> Result<u32> {
        let value = self.get(id).ok_or(P11Error::NotFound(id))?;
        u32_value(value).ok_or_else(|| {
            P11Error::AttributeValueInvalid(format!("attribute {id:#x} is not a u32"))
        })
    }

    /// Boolean from the bitmask; false for absent or non-boolean ids.
    pub fn get_bool(&self, id: u32) -> bool {
        boolprop_shift(id).is_some_and(|shift| self.bools.get(shift))
    }

    /// Boolean from the explicit entry, `None` when absent.
    pub fn bool_value(&self, id: u32) -> Option<bool> {
        self.get(id)
            .and_then(|v| v.first())
            .map(|b| *b != CK_FALSE)
    }

    /// Decode a nested attribute list.
    pub fn nested(&self, id: u32) -> Result<Option<AttributeSet>> {
        self.get(id).map(AttributeSet::from_bytes).transpose()
    }

    /// Append an entry.
    pub fn add(&mut self, id: u32, value: &[u8]) {
        self.entries.push(Attribute {
            id,
            value: value.to_vec(),
        });
        self.refresh();
    }

    pub fn add_u32(&mut self, id: u32, value: u32) {
        self.add(id, &value.to_le_bytes());
    }

    pub fn add_bool(&mut self, id: u32, value: bool) {
        self.add(id, &[if value { CK_TRUE } else { CK_FALSE }]);
    }

    /// Replace the first entry for `id`, or append one.
    pub fn set(&mut self, id: u32, value: &[u8]) {
        match self.entries.iter_mut().find(|a| a.id == id) {
            Some(a) => a.value = value.to_vec(),
            None => self.entries.push(Attribute {
                id,
                value: value.to_vec(),
            }),
        }
        self.refresh();
    }

    pub fn set_bool(&mut self, id: u32, value: bool) {
        self.set(id, &[if value { CK_TRUE } else { CK_FALSE }]);
    }

    /// Remove the single entry for `id`.
    pub fn remove(&mut self, id: u32) -> Result<Vec<u8>> {
        let mut found = self.entries.iter().enumerate().filter(|(_, a)| a.id == id);
        let (pos, _) = found.next().ok_or(P11Error::NotFound(id))?;
        if found.next().is_some() {
            return Err(P11Error::TemplateInconsistent(format!(
                "attribute {id:#x} is present more than once"
            )));
        }
        let removed = self.entries.remove(pos);
        self.refresh();
        Ok(removed.value)
    }

    /// Remove entries for `id` whose value is empty. Returns how many went.
    pub fn remove_if_empty(&mut self, id: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|a| !(a.id == id && a.value.is_empty()));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.refresh();
        }
        removed
    }

    /// Remove every entry for `id`, failing if there are more than `max`.
    ///
    /// Nothing is removed on failure.
    pub fn remove_checked(&mut self, id: u32, max: usize) -> Result<usize> {
        let count = self.entries.iter().filter(|a| a.id == id).count();
        if count > max {
            return Err(P11Error::TemplateInconsistent(format!(
                "attribute {id:#x} found {count} times, at most {max} allowed"
            )));
        }
        if count > 0 {
            self.entries.retain(|a| a.id != id);
            self.refresh();
        }
        Ok(count)
    }

    /// True when every attribute of `reference` is present here with an equal value.
    pub fn matches(&self, reference: &AttributeSet) -> bool {
        reference
            .iter()
            .all(|r| self.get_all(r.id).any(|v| v == r.value.as_slice()))
    }
}
