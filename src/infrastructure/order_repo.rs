use chrono::{SubsecRound, TimeZone, Utc};
use diesel::prelude::*;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{LineItem, Order, OrderId, ValidatedOrder};
use crate::domain::ports::OrderLedger;
use crate::schema::{order_lines, orders};

use super::models::{NewOrderLineRow, NewOrderRow, OrderLineRow, OrderRow};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::PersistenceFailure(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::PersistenceFailure(e.to_string())
    }
}

fn into_order(row: OrderRow, lines: Vec<OrderLineRow>) -> Order {
    Order {
        id: row.id,
        created_at: Utc.from_utc_datetime(&row.created_at),
        line_items: lines
            .into_iter()
            .map(|l| LineItem {
                variant_id: l.variant_id,
                quantity: l.quantity,
                unit_price_minor: l.unit_price_minor,
            })
            .collect(),
        total_minor: row.total_minor,
        item_count: row.item_count,
        synced: row.synced,
    }
}

// ── Ledger ───────────────────────────────────────────────────────────────────

/// SQLite-backed ledger. Writes run in immediate transactions so concurrent
/// writers queue on the database lock instead of interleaving.
pub struct DieselOrderLedger {
    pool: DbPool,
}

impl DieselOrderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderLedger for DieselOrderLedger {
    fn insert(&self, order: &ValidatedOrder) -> Result<Order, DomainError> {
        if order.line_items.is_empty() {
            return Err(DomainError::PersistenceFailure(
                "refusing to record an order without line items".to_string(),
            ));
        }

        let mut conn = self.pool.get()?;
        let created_at = Utc::now().trunc_subsecs(0);

        let id = conn.immediate_transaction::<_, DomainError, _>(|conn| {
            // 1. Insert the order header
            let id: i64 = diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    created_at: created_at.naive_utc(),
                    item_count: order.item_count,
                    total_minor: order.total_minor,
                    synced: false,
                })
                .returning(orders::id)
                .get_result(conn)?;

            // 2. Insert its lines with the prices locked at validation time
            let new_lines: Vec<NewOrderLineRow> = order
                .line_items
                .iter()
                .map(|l| NewOrderLineRow {
                    order_id: id,
                    variant_id: l.variant_id,
                    quantity: l.quantity,
                    unit_price_minor: l.unit_price_minor,
                })
                .collect();
            diesel::insert_into(order_lines::table)
                .values(&new_lines)
                .execute(conn)?;

            Ok(id)
        })?;

        log::info!("created order {id}");

        Ok(Order {
            id,
            created_at,
            line_items: order.line_items.clone(),
            total_minor: order.total_minor,
            item_count: order.item_count,
            synced: false,
        })
    }

    fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let order = orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(order) = order else {
            return Ok(None);
        };

        let lines = OrderLineRow::belonging_to(&order)
            .select(OrderLineRow::as_select())
            .order(order_lines::id.asc())
            .load(&mut conn)?;

        Ok(Some(into_order(order, lines)))
    }

    fn mark_synced(&self, id: OrderId) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        let updated = conn.immediate_transaction::<_, DomainError, _>(|conn| {
            Ok(diesel::update(orders::table.find(id))
                .set(orders::synced.eq(true))
                .execute(conn)?)
        })?;

        if updated == 0 {
            return Err(DomainError::OrderNotFound(id));
        }
        Ok(())
    }

    fn list_unsynced(&self) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let rows = orders::table
                .filter(orders::synced.eq(false))
                .select(OrderRow::as_select())
                .order(orders::id.asc())
                .load(conn)?;

            let lines = OrderLineRow::belonging_to(&rows)
                .select(OrderLineRow::as_select())
                .order(order_lines::id.asc())
                .load(conn)?;

            Ok(lines
                .grouped_by(&rows)
                .into_iter()
                .zip(rows)
                .map(|(lines, row)| into_order(row, lines))
                .collect())
        })
    }

    fn count_all(&self) -> Result<i64, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(orders::table.count().get_result(&mut conn)?)
    }

    fn count_unsynced(&self) -> Result<i64, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(orders::table
            .filter(orders::synced.eq(false))
            .count()
            .get_result(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use diesel::prelude::*;
    use tempfile::TempDir;

    use super::DieselOrderLedger;
    use crate::db::{create_pool, DbPool};
    use crate::domain::errors::DomainError;
    use crate::domain::order::{LineItem, ValidatedOrder};
    use crate::domain::ports::OrderLedger;
    use crate::schema::{order_lines, orders};

    fn setup_db() -> (TempDir, DbPool) {
        let dir = TempDir::new().expect("temp dir");
        let pool = open(&dir);
        (dir, pool)
    }

    fn open(dir: &TempDir) -> DbPool {
        let path = dir.path().join("ledger.db");
        let pool = create_pool(&path.to_string_lossy()).expect("Failed to create pool");
        crate::run_migrations(&pool).expect("Failed to run migrations");
        pool
    }

    fn line(variant_id: i64, quantity: i64, unit_price_minor: i64) -> LineItem {
        LineItem {
            variant_id,
            quantity,
            unit_price_minor,
        }
    }

    fn make_order(lines: Vec<LineItem>) -> ValidatedOrder {
        ValidatedOrder {
            total_minor: lines.iter().map(|l| l.quantity * l.unit_price_minor).sum(),
            item_count: lines.iter().map(|l| l.quantity).sum(),
            line_items: lines,
            receipt_lines: vec![],
        }
    }

    fn row_counts(pool: &DbPool) -> (i64, i64) {
        let mut conn = pool.get().expect("connection");
        let orders: i64 = orders::table.count().get_result(&mut conn).expect("count");
        let lines: i64 = order_lines::table.count().get_result(&mut conn).expect("count");
        (orders, lines)
    }

    #[test]
    fn insert_and_find_by_id_roundtrip() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool);

        let created = ledger
            .insert(&make_order(vec![line(7, 2, 3500), line(8, 1, 1999)]))
            .expect("insert failed");

        let found = ledger
            .find_by_id(created.id)
            .expect("find failed")
            .expect("order should exist");

        assert_eq!(found, created);
        assert_eq!(found.total_minor, 8999);
        assert_eq!(found.item_count, 3);
        assert!(!found.synced);
    }

    #[test]
    fn order_ids_increase_in_creation_order() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool);

        let first = ledger.insert(&make_order(vec![line(1, 1, 100)])).expect("insert");
        let second = ledger.insert(&make_order(vec![line(1, 1, 100)])).expect("insert");

        assert!(second.id > first.id);
    }

    #[test]
    fn failed_line_insert_leaves_no_rows() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool.clone());

        // The second line violates the quantity CHECK constraint mid-transaction.
        let broken = ValidatedOrder {
            line_items: vec![line(7, 1, 3500), line(8, 0, 1999)],
            total_minor: 3500,
            item_count: 1,
            receipt_lines: vec![],
        };

        let result = ledger.insert(&broken);

        assert!(matches!(result, Err(DomainError::PersistenceFailure(_))));
        assert_eq!(row_counts(&pool), (0, 0));
    }

    #[test]
    fn insert_refuses_orders_without_lines() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool.clone());

        let result = ledger.insert(&make_order(vec![]));

        assert!(matches!(result, Err(DomainError::PersistenceFailure(_))));
        assert_eq!(row_counts(&pool), (0, 0));
    }

    #[test]
    fn mark_synced_is_idempotent() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool);
        let order = ledger.insert(&make_order(vec![line(7, 1, 3500)])).expect("insert");

        ledger.mark_synced(order.id).expect("first mark");
        ledger.mark_synced(order.id).expect("second mark");

        let found = ledger.find_by_id(order.id).expect("find").expect("exists");
        assert!(found.synced);
        assert_eq!(ledger.count_all().expect("count"), 1);
        assert_eq!(ledger.count_unsynced().expect("count"), 0);
    }

    #[test]
    fn mark_synced_reports_unknown_order() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool);

        assert!(matches!(
            ledger.mark_synced(404),
            Err(DomainError::OrderNotFound(404))
        ));
    }

    #[test]
    fn list_unsynced_returns_oldest_first_until_delivered() {
        let (_dir, pool) = setup_db();
        let ledger = DieselOrderLedger::new(pool);

        let ids: Vec<i64> = (1..=4)
            .map(|n| {
                ledger
                    .insert(&make_order(vec![line(n, n, 100), line(99, 1, 50)]))
                    .expect("insert")
                    .id
            })
            .collect();

        let unsynced = ledger.list_unsynced().expect("list");
        assert_eq!(unsynced.iter().map(|o| o.id).collect::<Vec<_>>(), ids);
        assert!(unsynced.iter().all(|o| o.line_items.len() == 2));
        assert_eq!(unsynced[2].line_items[0], line(3, 3, 100));

        for id in &ids {
            ledger.mark_synced(*id).expect("mark");
        }

        assert!(ledger.list_unsynced().expect("list").is_empty());
        assert_eq!(ledger.count_all().expect("count"), 4);
    }

    #[test]
    fn orders_survive_reopening_the_database() {
        let dir = TempDir::new().expect("temp dir");
        let id = {
            let ledger = DieselOrderLedger::new(open(&dir));
            ledger.insert(&make_order(vec![line(7, 2, 3500)])).expect("insert").id
        };

        let ledger = DieselOrderLedger::new(open(&dir));
        let unsynced = ledger.list_unsynced().expect("list");

        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, id);
        assert_eq!(unsynced[0].total_minor, 7000);
    }

    #[test]
    fn concurrent_mark_synced_writes_are_all_kept() {
        let (_dir, pool) = setup_db();
        let ledger = Arc::new(DieselOrderLedger::new(pool));
        let ids: Vec<i64> = (0..8)
            .map(|_| ledger.insert(&make_order(vec![line(7, 1, 3500)])).expect("insert").id)
            .collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || ledger.mark_synced(*id).expect("mark"));
            }
        });

        assert_eq!(ledger.count_unsynced().expect("count"), 0);
    }
}
