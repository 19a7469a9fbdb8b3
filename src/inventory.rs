//! Reading and writing [`InventoryRecord`]s on live objects

use kapply_inventory::{InventoryRecord, INVENTORY_ANNOTATION, INVENTORY_HASH_ANNOTATION};
use serde_json::Value;

use crate::resource::{annotation, remove_annotation, set_annotation};

pub fn read_record(object: &Value) -> kapply_inventory::Result<InventoryRecord> {
    InventoryRecord::decode(
        annotation(object, INVENTORY_ANNOTATION),
        annotation(object, INVENTORY_HASH_ANNOTATION),
    )
}

pub fn write_record(object: &mut Value, record: &InventoryRecord) {
    set_annotation(object, INVENTORY_ANNOTATION, record.encode());
    match &record.hash {
        Some(hash) => set_annotation(object, INVENTORY_HASH_ANNOTATION, hash.clone()),
        None => remove_annotation(object, INVENTORY_HASH_ANNOTATION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::{config_map, inventory};

    #[test]
    fn write_then_read() {
        let declared = inventory(&["cm1"], "1234567");
        let mut record = read_record(declared.object()).unwrap();
        assert_eq!(record.hash.as_deref(), Some("1234567"));
        assert!(record.current.contains(config_map("cm1").reference()));

        record = record.roll_forward(Default::default(), None);
        let mut object = declared.object().clone();
        write_record(&mut object, &record);
        assert_eq!(read_record(&object).unwrap(), record);
        assert_eq!(annotation(&object, INVENTORY_HASH_ANNOTATION), None);
    }

    #[test]
    fn missing_annotations() {
        let record = read_record(config_map("cm1").object()).unwrap();
        assert_eq!(record, InventoryRecord::default());
    }
}
