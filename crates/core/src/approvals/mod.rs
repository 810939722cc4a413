//! Pure helpers used when an approved request is replayed against a
//! resource collection.

pub mod normalize;
pub mod patch;

pub use normalize::{coerce_numbers, money_fields, normalize_datetime};
pub use patch::{
    apply_fields, attachments_in, merge_attachments, strip_control_keys,
    take_deleted_attachments, CONTROL_KEYS,
};
