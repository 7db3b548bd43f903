use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::{order_lines, orders};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrderRow {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub item_count: i64,
    pub total_minor: i64,
    pub synced: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub created_at: NaiveDateTime,
    pub item_count: i64,
    pub total_minor: i64,
    pub synced: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrderLineRow {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    pub unit_price_minor: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub order_id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    pub unit_price_minor: i64,
}
