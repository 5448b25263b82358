use chrono::NaiveDate;

use crate::commands::{respond, CommandResponse};
use crate::db::Database;
use crate::models::BatchTracking;
use crate::services::batches::{self, NewBatch};

pub fn register_batch(db: &Database, request: NewBatch) -> CommandResponse<BatchTracking> {
    respond(
        "register_batch",
        db.transaction(|tx| batches::register_batch(tx, request)),
    )
}

pub fn list_batches(db: &Database, product_id: i64) -> CommandResponse<Vec<BatchTracking>> {
    let response = respond(
        "list_batches",
        db.read(|conn| batches::list_batches(conn, product_id)),
    );
    if response.data.as_ref().is_some_and(Vec::is_empty) {
        response.with_message("no batch data for this product")
    } else {
        response
    }
}

pub fn expire_batches(db: &Database, as_of: NaiveDate) -> CommandResponse<Vec<BatchTracking>> {
    respond(
        "expire_batches",
        db.transaction(|tx| batches::expire_batches(tx, as_of)),
    )
}
