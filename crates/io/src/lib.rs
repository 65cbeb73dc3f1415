// Tabular data service: delimited text in, structured tables out

pub mod csv;
pub mod table;

pub use table::{CellValue, Column, ColumnType, DataTable, Row};
