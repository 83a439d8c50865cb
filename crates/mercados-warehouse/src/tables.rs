//! Table catalogue: column layouts, natural keys and the row abstraction
//! the loader writes.

use ::duckdb::types::Value;

use crate::duckdb::quote_ident;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Double,
    BigInt,
    Date,
}

impl ColumnType {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Double => "DOUBLE",
            Self::BigInt => "BIGINT",
            Self::Date => "DATE",
        }
    }

    /// Placeholder used for this column in a parameterized `INSERT`.
    ///
    /// Dates travel as ISO `YYYY-MM-DD` text and are cast on the way in.
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Date => "CAST(? AS DATE)",
            _ => "?",
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Text,
    }
}

const fn double(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Double,
    }
}

const fn bigint(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::BigInt,
    }
}

const fn date(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Date,
    }
}

/// Layout of a target table.
///
/// `key_columns` is the natural key the loader deduplicates on. Snapshot
/// tables have none and are appended to unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub key_columns: Option<&'static [&'static str]>,
}

impl TableSpec {
    #[must_use]
    pub const fn is_keyed(&self) -> bool {
        self.key_columns.is_some()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table in `schema`.
    ///
    /// No uniqueness constraint is declared; the loader owns that invariant.
    #[must_use]
    pub fn create_sql(&self, schema: &str) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("    {} {}", quote_ident(column.name), column.ty.sql()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\n{columns}\n);",
            quote_ident(schema),
            quote_ident(self.name)
        )
    }

    /// Quoted, comma separated column list in declaration order.
    #[must_use]
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| quote_ident(column.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One `(?, ?, ...)` group matching [`TableSpec::column_list`].
    #[must_use]
    pub fn row_placeholders(&self) -> String {
        let inner = self
            .columns
            .iter()
            .map(|column| column.ty.placeholder())
            .collect::<Vec<_>>()
            .join(", ");
        format!("({inner})")
    }
}

/// Natural key of a row, rendered as text in key-column order.
///
/// Dates render as `YYYY-MM-DD`, which is also how `DuckDB` casts a `DATE`
/// to `VARCHAR`, so keys read back from the store compare equal.
pub type KeyTuple = Vec<String>;

/// A row that can be written to a table.
pub trait TableRow {
    /// Values in the table's column order.
    fn values(&self) -> Vec<Value>;

    /// Natural key, for rows of keyed tables.
    fn key(&self) -> Option<KeyTuple> {
        None
    }
}

pub const ACTIVOS: TableSpec = TableSpec {
    name: "activos",
    columns: &[
        text("ticker"),
        text("market"),
        text("name"),
        text("short name"),
        text("business summary"),
        text("website"),
        text("Phone"),
        text("address"),
        text("city"),
        text("state"),
        text("pc"),
        text("country"),
        text("industry"),
        text("sector"),
        text("quote type"),
        text("currency"),
        text("language"),
        text("region"),
    ],
    key_columns: None,
};

pub const MERCADO_DIARIO: TableSpec = TableSpec {
    name: "mercado_diario",
    columns: &[
        text("ticker"),
        text("market"),
        date("date"),
        double("open price"),
        double("high price"),
        double("low price"),
        double("closing price"),
        bigint("volume"),
    ],
    key_columns: Some(&["ticker", "date"]),
};

pub const RENDIMIENTO_FINANCIERO: TableSpec = TableSpec {
    name: "rendimiento_financiero",
    columns: &[
        text("ticker"),
        text("market"),
        double("market cap"),
        double("avg price 50 days"),
        double("avg price 200 days"),
        double("change percent 52 weeks"),
    ],
    key_columns: None,
};

pub const ESTADOS_FINANCIEROS: TableSpec = TableSpec {
    name: "estados_financieros",
    columns: &[
        text("ticker"),
        text("market"),
        double("total cash"),
        double("total debt"),
        double("total revenue"),
        double("profit margins"),
        double("gross profits"),
        double("free cash flow"),
        double("operating cash flow"),
        double("revenue growth"),
        double("ebitda"),
        double("net income to common"),
        text("financial currency"),
        double("price to sale ratio 12 months"),
        double("enterprise to revenue"),
        double("enterprise to_ebitda"),
        double("price to earnings"),
        double("per futuro"),
        double("price to book"),
        double("debt to equity"),
        double("roa"),
        double("roe"),
        double("eps ttm"),
        double("eps fordward"),
    ],
    key_columns: None,
};

pub const DIVIDENDOS: TableSpec = TableSpec {
    name: "dividendos",
    columns: &[
        date("Date"),
        text("ticker"),
        double("divident"),
        text("market"),
    ],
    key_columns: Some(&["ticker", "Date"]),
};

pub const SPLITS: TableSpec = TableSpec {
    name: "splits",
    columns: &[
        date("Date"),
        text("ticker"),
        double("split ratio"),
        text("market"),
    ],
    key_columns: Some(&["ticker", "Date"]),
};

pub const RECOMENDACIONES: TableSpec = TableSpec {
    name: "recomendaciones",
    columns: &[
        text("ticker"),
        text("market"),
        date("Date"),
        text("period"),
        bigint("strongBuy"),
        bigint("buy"),
        bigint("hold"),
        bigint("sell"),
        bigint("strongSell"),
    ],
    key_columns: Some(&["ticker", "Date"]),
};

pub const CONSENSO_ANALISTAS: TableSpec = TableSpec {
    name: "consenso_analistas",
    columns: &[
        text("ticker"),
        text("market"),
        double("average analyst recommendation rating"),
        bigint("number of analysts"),
        bigint("average price"),
    ],
    key_columns: None,
};

/// Every table, in the order a run writes them.
pub const ALL_TABLES: [&TableSpec; 8] = [
    &ACTIVOS,
    &MERCADO_DIARIO,
    &RENDIMIENTO_FINANCIERO,
    &ESTADOS_FINANCIEROS,
    &DIVIDENDOS,
    &SPLITS,
    &RECOMENDACIONES,
    &CONSENSO_ANALISTAS,
];

/// Tables with a `(ticker, date)` natural key.
pub const DATE_KEYED_TABLES: [&TableSpec; 4] =
    [&MERCADO_DIARIO, &DIVIDENDOS, &SPLITS, &RECOMENDACIONES];

/// Look a table up by name.
#[must_use]
pub fn table_by_name(name: &str) -> Option<&'static TableSpec> {
    ALL_TABLES.into_iter().find(|table| table.name == name)
}
