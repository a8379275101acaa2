// Principal and session ids are UUIDv7 so that rows sort by creation time
// without a separate index on `created_at`.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
