//! Slotted heap page.
//!
//! Layout (exactly `page_size` bytes):
//!
//! ```text
//! | header bitmap (ceil(slots / 8) bytes) | slot 0 | slot 1 | ... | unused tail |
//! ```
//!
//! Bit `i` of the header (LSB-first within each byte) is set iff slot `i`
//! holds a tuple. Every slot is `schema.byte_size()` bytes wide. Each tuple
//! costs `width * 8 + 1` bits of the page, which fixes the slot count.

use crate::access::{serialize_values, deserialize_values, RecordId, Schema, Tuple};
use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use std::sync::Arc;

/// Number of tuple slots that fit in a page.
pub fn slots_per_page(page_size: usize, tuple_width: usize) -> usize {
    (page_size * 8) / (tuple_width * 8 + 1)
}

/// Number of header bytes needed to cover `num_slots` bits.
pub fn header_len(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

pub struct HeapPage {
    id: PageId,
    schema: Arc<Schema>,
    data: Vec<u8>,
    num_slots: usize,
    header_len: usize,
    tuple_width: usize,
    dirty: bool,
}

impl HeapPage {
    /// Interpret `data` as a page of tuples conforming to `schema`.
    pub fn from_data(id: PageId, schema: Arc<Schema>, data: Vec<u8>) -> Result<Self> {
        let tuple_width = schema.byte_size();
        let num_slots = slots_per_page(data.len(), tuple_width);
        if num_slots == 0 {
            return Err(DbError::InvalidArgument(format!(
                "page of {} bytes cannot hold a {}-byte tuple",
                data.len(),
                tuple_width
            )));
        }
        if num_slots > u16::MAX as usize + 1 {
            return Err(DbError::InvalidArgument(format!(
                "page of {} bytes would need {} slots",
                data.len(),
                num_slots
            )));
        }

        Ok(Self {
            id,
            schema,
            data,
            num_slots,
            header_len: header_len(num_slots),
            tuple_width,
            dirty: false,
        })
    }

    /// A freshly zeroed page: no slot is occupied.
    pub fn empty(id: PageId, schema: Arc<Schema>, page_size: usize) -> Result<Self> {
        Self::from_data(id, schema, Self::empty_page_data(page_size))
    }

    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The encoded page, exactly `page_size` bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.header_len + slot * self.tuple_width;
        start..start + self.tuple_width
    }

    /// Store `tuple` in the first free slot and stamp it with its RecordId.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if !tuple.schema().same_types(&self.schema) {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                actual: tuple.schema().to_string(),
            });
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or(DbError::PageFull(self.id))?;

        let bytes = serialize_values(tuple.values(), &self.schema.types())?;
        let range = self.slot_range(slot);
        self.data[range].copy_from_slice(&bytes);
        self.set_slot_used(slot, true);
        self.dirty = true;

        let record_id = RecordId::new(self.id, slot as u16);
        tuple.set_record_id(Some(record_id));
        Ok(record_id)
    }

    /// Clear the slot named by `record_id`. The slot bytes are left as they are.
    pub fn delete_tuple(&mut self, record_id: RecordId) -> Result<()> {
        let slot = record_id.slot_id as usize;
        if record_id.page_id != self.id || !self.is_slot_used(slot) {
            return Err(DbError::RecordNotFound(record_id));
        }

        self.set_slot_used(slot, false);
        self.dirty = true;
        Ok(())
    }

    /// Decode the tuple in an occupied slot.
    pub fn tuple_at(&self, slot: usize) -> Result<Tuple> {
        if !self.is_slot_used(slot) {
            return Err(DbError::RecordNotFound(RecordId::new(self.id, slot as u16)));
        }
        let values = deserialize_values(&self.data[self.slot_range(slot)], &self.schema.types())?;
        Ok(Tuple::new(self.schema.clone(), values)?
            .with_record_id(RecordId::new(self.id, slot as u16)))
    }

    /// First occupied slot at or after `from`.
    pub fn next_used_slot(&self, from: usize) -> Option<usize> {
        (from..self.num_slots).find(|&i| self.is_slot_used(i))
    }

    /// Occupied tuples in ascending slot order. Call again to restart.
    pub fn iter(&self) -> HeapPageIter<'_> {
        HeapPageIter {
            page: self,
            next_slot: 0,
        }
    }
}

pub struct HeapPageIter<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl Iterator for HeapPageIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.page.next_used_slot(self.next_slot)?;
        self.next_slot = slot + 1;
        Some(self.page.tuple_at(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ColumnInfo, DataType, Value};
    use crate::storage::page::TableId;

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![ColumnInfo::new("a", DataType::Int32)]))
    }

    fn pid(page_no: u32) -> PageId {
        PageId::new(TableId(1), page_no)
    }

    fn int_tuple(schema: &Arc<Schema>, n: i32) -> Tuple {
        Tuple::new(schema.clone(), vec![Value::Int32(n)]).unwrap()
    }

    fn contents(page: &HeapPage) -> Result<Vec<i32>> {
        page.iter()
            .map(|t| Ok(t?.value(0)?.as_i32().unwrap_or_default()))
            .collect()
    }

    #[test]
    fn test_capacity_formula() {
        for width in [1usize, 4, 8, 132, 136] {
            for page_size in [16usize, 64, 4096, 8192] {
                let slots = slots_per_page(page_size, width);
                assert_eq!(slots, (8 * page_size) / (8 * width + 1));
                assert_eq!(header_len(slots), slots.div_ceil(8));
                assert!(header_len(slots) + slots * width <= page_size);
            }
        }
        assert_eq!(slots_per_page(4096, 4), 992);
        assert_eq!(header_len(992), 124);
        assert_eq!(slots_per_page(16, 4), 3);
    }

    #[test]
    fn test_heap_page_initialization() -> anyhow::Result<()> {
        let page = HeapPage::empty(pid(42), int_schema(), 4096)?;
        assert_eq!(page.id(), pid(42));
        assert_eq!(page.num_slots(), 992);
        assert_eq!(page.header_len(), 124);
        assert_eq!(page.num_empty_slots(), 992);
        assert_eq!(page.iter().count(), 0);
        assert!(!page.is_dirty());
        Ok(())
    }

    #[test]
    fn test_page_too_small() {
        let schema = Arc::new(Schema::from_types(&[DataType::Char]));
        assert!(HeapPage::empty(pid(0), schema, 64).is_err());
    }

    #[test]
    fn test_insert_sets_record_id_and_bit() -> anyhow::Result<()> {
        let schema = int_schema();
        let mut page = HeapPage::empty(pid(1), schema.clone(), 64)?;

        let mut t = int_tuple(&schema, 10);
        let rid = page.insert_tuple(&mut t)?;
        assert_eq!(rid, RecordId::new(pid(1), 0));
        assert_eq!(t.record_id(), Some(rid));
        assert!(page.is_slot_used(0));
        assert_eq!(page.data()[0] & 1, 1);
        assert!(page.is_dirty());

        let rid2 = page.insert_tuple(&mut int_tuple(&schema, 20))?;
        assert_eq!(rid2.slot_id, 1);
        assert_eq!(page.num_empty_slots(), page.num_slots() - 2);
        assert_eq!(contents(&page)?, vec![10, 20]);
        Ok(())
    }

    #[test]
    fn test_page_full() -> anyhow::Result<()> {
        let schema = int_schema();
        let mut page = HeapPage::empty(pid(1), schema.clone(), 16)?;
        assert_eq!(page.num_slots(), 3);

        for n in 0..3 {
            page.insert_tuple(&mut int_tuple(&schema, n))?;
        }
        assert_eq!(page.num_empty_slots(), 0);

        let result = page.insert_tuple(&mut int_tuple(&schema, 99));
        assert!(matches!(result, Err(DbError::PageFull(id)) if id == pid(1)));
        assert_eq!(contents(&page)?, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_delete_tuple() -> anyhow::Result<()> {
        let schema = int_schema();
        let mut page = HeapPage::empty(pid(1), schema.clone(), 64)?;
        let mut rids = Vec::new();
        for n in 0..4 {
            rids.push(page.insert_tuple(&mut int_tuple(&schema, n))?);
        }

        page.delete_tuple(rids[1])?;
        assert_eq!(contents(&page)?, vec![0, 2, 3]);
        assert!(!page.is_slot_used(1));

        // Deleting the same slot again fails
        assert!(matches!(
            page.delete_tuple(rids[1]),
            Err(DbError::RecordNotFound(_))
        ));

        // A freed slot is reused first
        let rid = page.insert_tuple(&mut int_tuple(&schema, 7))?;
        assert_eq!(rid.slot_id, 1);
        assert_eq!(contents(&page)?, vec![0, 7, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_delete_wrong_page() -> anyhow::Result<()> {
        let schema = int_schema();
        let mut page = HeapPage::empty(pid(1), schema.clone(), 64)?;
        page.insert_tuple(&mut int_tuple(&schema, 1))?;

        let foreign = RecordId::new(pid(2), 0);
        assert!(matches!(
            page.delete_tuple(foreign),
            Err(DbError::RecordNotFound(rid)) if rid == foreign
        ));
        Ok(())
    }

    #[test]
    fn test_schema_mismatch_on_insert() -> anyhow::Result<()> {
        let mut page = HeapPage::empty(pid(1), int_schema(), 64)?;
        let other = Arc::new(Schema::from_types(&[DataType::Int32, DataType::Int32]));
        let mut t = Tuple::new(other, vec![Value::Int32(1), Value::Int32(2)])?;
        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(DbError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_iterator_yields_record_ids() -> anyhow::Result<()> {
        let schema = int_schema();
        let mut page = HeapPage::empty(pid(5), schema.clone(), 64)?;
        for n in 0..3 {
            page.insert_tuple(&mut int_tuple(&schema, n))?;
        }
        page.delete_tuple(RecordId::new(pid(5), 0))?;

        let rids: Vec<_> = page
            .iter()
            .map(|t| t.map(|t| t.record_id()))
            .collect::<Result<_>>()?;
        assert_eq!(
            rids,
            vec![
                Some(RecordId::new(pid(5), 1)),
                Some(RecordId::new(pid(5), 2))
            ]
        );

        // Restartable
        assert_eq!(page.iter().count(), 2);
        assert_eq!(page.iter().count(), 2);
        Ok(())
    }

    #[test]
    fn test_from_existing_data() -> anyhow::Result<()> {
        let schema = Arc::new(Schema::from_types(&[DataType::Int32, DataType::Char]));
        let mut page = HeapPage::empty(pid(123), schema.clone(), 1024)?;
        for n in 0..5 {
            let mut t = Tuple::new(
                schema.clone(),
                vec![Value::Int32(n), Value::String(format!("row{}", n))],
            )?;
            page.insert_tuple(&mut t)?;
        }
        page.delete_tuple(RecordId::new(pid(123), 3))?;

        let bytes = page.data().to_vec();
        let reloaded = HeapPage::from_data(pid(123), schema, bytes.clone())?;
        assert_eq!(reloaded.data(), bytes.as_slice());
        assert_eq!(reloaded.num_empty_slots(), page.num_empty_slots());
        assert_eq!(reloaded.iter().count(), 4);
        assert_eq!(
            reloaded.tuple_at(4)?.values(),
            &[Value::Int32(4), Value::String("row4".to_string())]
        );
        Ok(())
    }

    #[test]
    fn test_unset_slots_are_not_read() -> anyhow::Result<()> {
        let schema = int_schema();
        // Garbage everywhere except the header
        let mut data = vec![0xFFu8; 16];
        data[0] = 0b0000_0010;
        let page = HeapPage::from_data(pid(0), schema, data)?;
        assert_eq!(page.num_empty_slots(), 2);
        assert_eq!(contents(&page)?, vec![-1]);
        assert!(page.tuple_at(0).is_err());
        Ok(())
    }
}
