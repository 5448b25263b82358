use crate::commands::{respond, CommandResponse};
use crate::db::Database;
use crate::models::{Return, SaleWithDetails};
use crate::services::returns::{self, ReturnRequest};
use crate::services::sales::{self, NewSale};

pub fn create_sale(db: &Database, request: NewSale) -> CommandResponse<SaleWithDetails> {
    let response = respond("create_sale", sales::checkout(db, request));
    let change = response
        .data
        .as_ref()
        .map_or(0, |details| details.sale.change_given_cents);
    if change > 0 {
        response.with_message(format!("change due: {}.{:02}", change / 100, change % 100))
    } else {
        response
    }
}

pub fn get_sale(db: &Database, sale_id: i64) -> CommandResponse<SaleWithDetails> {
    respond("get_sale", db.read(|conn| sales::get_sale(conn, sale_id)))
}

pub fn process_return(db: &Database, request: ReturnRequest) -> CommandResponse<Return> {
    respond(
        "process_return",
        db.transaction(|tx| returns::process_return(tx, request)),
    )
}

pub fn request_return(db: &Database, request: ReturnRequest) -> CommandResponse<Return> {
    respond(
        "request_return",
        db.transaction(|tx| returns::request_return(tx, request)),
    )
}

pub fn approve_return(db: &Database, return_id: i64) -> CommandResponse<Return> {
    respond(
        "approve_return",
        db.transaction(|tx| returns::approve_return(tx, return_id)),
    )
}

pub fn reject_return(db: &Database, return_id: i64) -> CommandResponse<Return> {
    respond(
        "reject_return",
        db.transaction(|tx| returns::reject_return(tx, return_id)),
    )
}
