//! Sales Store - the single-table SQLite database behind every query
//!
//! The pipeline never writes to it. Writes only happen here, once, when the
//! table is created and seeded.

use crate::error::{AgentError, Result};
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::info;

pub const TABLE_NAME: &str = "ventas";

pub const SELLERS: [&str; 8] = [
    "Carlos Ruiz",
    "María López",
    "Juan Pérez",
    "Ana García",
    "Luis Martínez",
    "Sofia Torres",
    "Pedro Ramírez",
    "Laura Fernández",
];

pub const SITES: [&str; 4] = ["Bogotá", "Medellín", "Cali", "Barranquilla"];

pub const PRODUCTS: [&str; 10] = [
    "Laptop Dell",
    "Mouse Logitech",
    "Teclado Mecánico",
    "Monitor Samsung",
    "Audífonos Sony",
    "Webcam HD",
    "SSD 1TB",
    "RAM 16GB",
    "Impresora HP",
    "Router TP-Link",
];

pub const SEED_ROWS: usize = 500;
pub const SEED_WINDOW_DAYS: i64 = 180;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ventas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendedor TEXT NOT NULL,
    sede TEXT NOT NULL,
    producto TEXT NOT NULL,
    cantidad INTEGER NOT NULL,
    precio REAL NOT NULL,
    fecha DATE NOT NULL
)
"#;

/// One row of `ventas`, without the store-assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
    pub vendedor: String,
    pub sede: String,
    pub producto: String,
    pub cantidad: i64,
    pub precio: f64,
    pub fecha: NaiveDate,
}

/// Handle on the sales database file
pub struct SalesStore {
    path: PathBuf,
    conn: Connection,
}

impl SalesStore {
    /// Open (or create) the database file and make sure `ventas` exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)
            .map_err(|e| AgentError::Execution(format!("Failed to open database {}: {}", path.display(), e)))?;
        conn.execute(CREATE_TABLE, [])?;

        Ok(Self { path, conn })
    }

    /// Read-only connection used for every pipeline query
    pub fn open_read_only(path: &Path) -> Result<Connection> {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AgentError::Execution(format!("Failed to open database {}: {}", path.display(), e)))
    }

    pub fn row_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM ventas", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Insert rows in one transaction. Ids are assigned by SQLite.
    pub fn insert_sales(&mut self, sales: &[NewSale]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ventas (vendedor, sede, producto, cantidad, precio, fecha) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for sale in sales {
                stmt.execute(params![
                    sale.vendedor,
                    sale.sede,
                    sale.producto,
                    sale.cantidad,
                    sale.precio,
                    sale.fecha.format("%Y-%m-%d").to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(sales.len())
    }

    /// Fill an empty table with synthetic sales. Returns the rows inserted,
    /// which is 0 when the table already had data.
    pub fn seed<R: Rng>(&mut self, rng: &mut R, today: NaiveDate) -> Result<usize> {
        let existing = self.row_count()?;
        if existing > 0 {
            info!(existing, "Sales table already seeded");
            return Ok(0);
        }

        let start = today - Duration::days(SEED_WINDOW_DAYS);
        let sales: Vec<NewSale> = (0..SEED_ROWS)
            .map(|_| random_sale(rng, start))
            .collect();

        let inserted = self.insert_sales(&sales)?;
        info!(inserted, path = %self.path.display(), "Seeded sales table");
        Ok(inserted)
    }
}

fn pick<R: Rng>(rng: &mut R, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

fn random_sale<R: Rng>(rng: &mut R, start: NaiveDate) -> NewSale {
    let precio: f64 = rng.gen_range(50_000.0..2_500_000.0);

    NewSale {
        vendedor: pick(rng, &SELLERS),
        sede: pick(rng, &SITES),
        producto: pick(rng, &PRODUCTS),
        cantidad: rng.gen_range(1..=20),
        precio: (precio * 100.0).round() / 100.0,
        fecha: start + Duration::days(rng.gen_range(0..=SEED_WINDOW_DAYS)),
    }
}

/// Schema text embedded in every synthesis prompt
pub fn schema_description() -> String {
    format!(
        r#"Table '{table}':
- id: INTEGER (primary key)
- vendedor: TEXT (seller name)
- sede: TEXT (city: {sites})
- producto: TEXT (product name)
- cantidad: INTEGER (units sold)
- precio: REAL (unit price)
- fecha: DATE (format YYYY-MM-DD)

Example queries:
- Top products: SELECT producto, SUM(cantidad) AS total FROM ventas GROUP BY producto ORDER BY total DESC LIMIT 5
- Sales by site: SELECT sede, SUM(cantidad*precio) AS total_ventas FROM ventas GROUP BY sede"#,
        table = TABLE_NAME,
        sites = SITES.join(", "),
    )
}
