use shopmate_core::{CartActionRecord, ShopId};

/// Last successful cart mutation of a conversation; each new one replaces it.
#[derive(Clone, Debug, Default)]
pub struct CartActionMemory {
    record: Option<CartActionRecord>,
}

impl CartActionMemory {
    pub fn replace(&mut self, record: CartActionRecord) {
        self.record = Some(record);
    }

    pub fn current(&self) -> Option<&CartActionRecord> {
        self.record.as_ref()
    }

    pub fn shop_ids(&self) -> &[ShopId] {
        self.record.as_ref().map(|record| record.shop_ids.as_slice()).unwrap_or_default()
    }
}
