// File I/O for reconciliation: reading source tables, rendering reports

pub mod render;
pub mod table;

pub use render::{render_csv, render_workbook, RenderError};
pub use table::{read_table, TableFormat};
