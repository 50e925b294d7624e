use anyhow::Result;
use rusqlite::Connection;

use crate::catalog::ScrapedListing;
use crate::extract::RawListing;

const DB_PATH: &str = "data/zikom.sqlite";

pub fn connect() -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

#[cfg(test)]
pub fn connect_in_memory() -> Result<Connection> {
    Ok(Connection::open_in_memory()?)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            id           INTEGER PRIMARY KEY,
            page         INTEGER NOT NULL,
            position     INTEGER NOT NULL,
            processor    TEXT,
            disk         TEXT,
            ram          TEXT,
            os           TEXT,
            condition    TEXT,
            graphic_card TEXT,
            price        REAL,
            scraped_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(page, position)
        );
        CREATE INDEX IF NOT EXISTS idx_listings_priced ON listings(price);
        ",
    )?;
    Ok(())
}

/// Replace the stored dataset with a freshly scraped one. A walk is all or
/// nothing (fail-fast upstream), so stale rows from the previous walk must not
/// survive alongside new ones.
pub fn replace_listings(conn: &Connection, rows: &[ScrapedListing]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM listings", [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO listings
             (page, position, processor, disk, ram, os, condition, graphic_card, price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for row in rows {
            let l = &row.listing;
            count += stmt.execute(rusqlite::params![
                row.page as i64,
                row.position as i64,
                l.processor,
                l.disk,
                l.ram,
                l.os,
                l.condition,
                l.graphic_card,
                l.price,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// The full dataset in scrape order: page, then listing position within the
/// page. Deterministic regardless of fetch concurrency.
pub fn fetch_listings(conn: &Connection) -> Result<Vec<RawListing>> {
    let mut stmt = conn.prepare(
        "SELECT processor, disk, ram, os, condition, graphic_card, price
         FROM listings ORDER BY page, position",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RawListing {
                processor: row.get(0)?,
                disk: row.get(1)?,
                ram: row.get(2)?,
                os: row.get(3)?,
                condition: row.get(4)?,
                graphic_card: row.get(5)?,
                price: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub total: usize,
    pub priced: usize,
    pub pages: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0))?;
    let priced: usize = conn.query_row(
        "SELECT COUNT(*) FROM listings WHERE price IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let pages: usize = conn.query_row(
        "SELECT COUNT(DISTINCT page) FROM listings",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        priced,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(processor: &str, price: Option<f64>) -> RawListing {
        RawListing {
            processor: Some(processor.to_string()),
            price,
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_preserves_scrape_order() {
        let conn = connect_in_memory().unwrap();
        init_schema(&conn).unwrap();

        // Inserted out of order; reads must come back page-then-position.
        let rows = vec![
            ScrapedListing { page: 2, position: 0, listing: listing("Xeon E5", None) },
            ScrapedListing { page: 1, position: 1, listing: listing("Ryzen 5 3600", Some(1500.0)) },
            ScrapedListing { page: 1, position: 0, listing: listing("Intel i5-4570", Some(800.0)) },
        ];
        assert_eq!(replace_listings(&conn, &rows).unwrap(), 3);

        let back = fetch_listings(&conn).unwrap();
        assert_eq!(back[0].processor.as_deref(), Some("Intel i5-4570"));
        assert_eq!(back[1].processor.as_deref(), Some("Ryzen 5 3600"));
        assert_eq!(back[2].processor.as_deref(), Some("Xeon E5"));
        assert_eq!(back[2].price, None);
    }

    #[test]
    fn replace_discards_the_previous_walk() {
        let conn = connect_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let first = vec![ScrapedListing { page: 1, position: 0, listing: listing("old", Some(1.0)) }];
        replace_listings(&conn, &first).unwrap();
        let second = vec![ScrapedListing { page: 1, position: 0, listing: listing("new", Some(2.0)) }];
        replace_listings(&conn, &second).unwrap();

        let back = fetch_listings(&conn).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].processor.as_deref(), Some("new"));
    }

    #[test]
    fn stats_count_priced_rows() {
        let conn = connect_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let rows = vec![
            ScrapedListing { page: 1, position: 0, listing: listing("a", Some(100.0)) },
            ScrapedListing { page: 1, position: 1, listing: listing("b", None) },
            ScrapedListing { page: 3, position: 0, listing: listing("c", Some(300.0)) },
        ];
        replace_listings(&conn, &rows).unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.priced, 2);
        assert_eq!(stats.pages, 2);
    }
}
